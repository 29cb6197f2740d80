/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Subscribers: named periodic data consumers bound to hardware.

use crate::topic::TickFrame;

/// A named sink invoked once per tick, after every Topic has published.
///
/// The hardware behind a Subscriber (physical or simulated) is opaque to the
/// scheduler; it only sees the success flag returned by
/// [`initialize_hardware`](Self::initialize_hardware).
pub trait Subscriber: Send {
    /// Name as declared.  The scheduler may register the Subscriber under a
    /// disambiguated name if another Subscriber already uses this one.
    fn name(&self) -> &str;

    /// Bind to hardware.  Called exactly once, during `initialize`.
    ///
    /// Returns `false` if the hardware did not come up.
    fn initialize_hardware(&mut self) -> bool;

    /// Receive the scheduler's simulation flag.  Called once, right after
    /// hardware initialisation.
    fn set_sim(&mut self, _is_sim: bool) {}

    /// Per-tick step.  `frame` holds every publication of this tick.
    fn periodic(&mut self, frame: &TickFrame) -> anyhow::Result<()>;

    /// Release hardware.  Called once from `shutdown`.
    fn shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the Pyros scheduler.
//!
//! Three error enums model the three lifecycle phases:
//!
//! * [`InitError`] – the configuration is not startable.  Every variant is
//!   detected inside [`Scheduler::initialize()`](super::Scheduler::initialize)
//!   and none of them is recoverable: misconfiguration aborts startup rather
//!   than degrading at runtime.
//! * [`TickError`] – a collaborator failed inside
//!   [`RunningScheduler::periodic()`](super::RunningScheduler::periodic).
//!   The tick is not retried or rolled back; the error propagates to the
//!   caller.
//! * [`ShutdownError`] – a Subscriber's shutdown hook failed.
//!
//! Collaborators (Topics, Subscribers, Commands) report failures as
//! `anyhow::Error`; the scheduler wraps them here so the caller always knows
//! *which* component failed.

use std::path::PathBuf;

use thiserror::Error;

// ── Name collisions ───────────────────────────────────────────────────────────

/// Which pair of components shares a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionKind {
    /// Two Topics are registered under the same name.
    TopicTopic,
    /// A Topic and a Subscriber share a name.
    TopicSubscriber,
}

impl std::fmt::Display for CollisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollisionKind::TopicTopic => write!(f, "two or more Topics"),
            CollisionKind::TopicSubscriber => write!(f, "a Topic and a Subscriber"),
        }
    }
}

// ── Startup errors ────────────────────────────────────────────────────────────

/// Fatal startup error returned from
/// [`Scheduler::initialize()`](super::Scheduler::initialize).
#[derive(Debug, Error)]
pub enum InitError {
    /// The Topic dependency graph contains at least one cycle.
    ///
    /// `topics` lists every Topic that could not be ordered (members of a
    /// cycle and everything downstream of one), in registration order.
    #[error("circular dependency between topics {topics:?}, aborting init")]
    CircularDependency { topics: Vec<String> },

    /// A Topic declares a dependency on a name no registered Topic carries.
    #[error("topic '{topic}' depends on unknown topic '{dependency}'")]
    UnknownDependency { topic: String, dependency: String },

    /// Two Topics, or a Topic and a Subscriber, share a name.
    #[error("{kind} cannot have the same name: '{name}', please check your configuration")]
    NameCollision { name: String, kind: CollisionKind },

    /// A Subscriber's hardware did not come up and the fail-fast policy is
    /// enabled.
    #[error("hardware for subscriber '{subscriber}' failed to initialize, aborting init")]
    HardwareInitFailure { subscriber: String },

    /// The tick log could not be created.
    #[error("cannot create tick log '{}'", path.display())]
    LogCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ── Tick errors ───────────────────────────────────────────────────────────────

/// Error returned from
/// [`RunningScheduler::periodic()`](super::RunningScheduler::periodic).
#[derive(Debug, Error)]
pub enum TickError {
    /// The current command's `first_run` or `periodic` step failed.
    #[error("command '{command}' failed")]
    Command {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    /// A Topic's production step failed.
    #[error("topic '{topic}' failed to publish")]
    Topic {
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    /// A Subscriber's per-tick step failed.
    #[error("subscriber '{subscriber}' failed")]
    Subscriber {
        subscriber: String,
        #[source]
        source: anyhow::Error,
    },

    /// A message could not be encoded for the tick log.
    #[error("cannot encode message of topic '{topic}' for the tick log")]
    Encode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    /// Appending the tick record to the log failed.
    #[error("cannot append to tick log '{}'", path.display())]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ── Shutdown errors ───────────────────────────────────────────────────────────

/// Error returned from
/// [`RunningScheduler::shutdown()`](super::RunningScheduler::shutdown).
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// A Subscriber's shutdown hook failed.  Hooks of the remaining
    /// Subscribers still ran; this is the first failure observed.
    #[error("subscriber '{subscriber}' failed to shut down")]
    Subscriber {
        subscriber: String,
        #[source]
        source: anyhow::Error,
    },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Topics: named, dependency-ordered periodic data producers.
//!
//! ```text
//!            ┌──────────── TickFrame (this tick) ────────────┐
//! Topic A ──►│ "A" → Publication                             │──► Subscribers
//! Topic B ──►│ "B" → Publication   (B read "A" from frame)   │
//!            └───────────────────────────────────────────────┘
//! ```
//!
//! A Topic never holds references to other Topics.  It declares the names it
//! depends on, the scheduler orders production so those names are already in
//! the [`TickFrame`], and the Topic reads them from there.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;

// ── Message ───────────────────────────────────────────────────────────────────

/// Opaque, serialisable payload produced by a Topic on one tick.
///
/// Stored as a JSON value so heterogeneous Topics can share one frame and the
/// tick log can write any payload without knowing its type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message(serde_json::Value);

impl Message {
    /// Encode any `Serialize` value as a message.
    ///
    /// # Errors
    /// Fails if `payload` cannot be represented as JSON (e.g. a map with
    /// non-string keys).
    pub fn new<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(payload).map(Self)
    }

    /// Decode the payload back into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }

    /// Raw JSON view of the payload.
    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }

    /// Compact JSON text of the payload.  The tick log uses
    /// [`crate::log::to_log_json`] instead.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

impl From<serde_json::Value> for Message {
    fn from(v: serde_json::Value) -> Self {
        Self(v)
    }
}

// ── Publication ───────────────────────────────────────────────────────────────

/// One Topic's output for one tick: the `(message, time, delta)` triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub message: Message,
    /// Wall-clock time of production, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Seconds since the Topic's previous production (`0.0` on the first).
    pub delta_time: f64,
}

impl Publication {
    pub fn new(message: Message, timestamp: f64, delta_time: f64) -> Self {
        Self {
            message,
            timestamp,
            delta_time,
        }
    }
}

// ── TickFrame ─────────────────────────────────────────────────────────────────

/// Publications produced during one tick, in production (topological) order.
///
/// Topics see the frame as it is being filled; Subscribers see the completed
/// frame.  Topics skipped this tick (simulation replay) are absent.
#[derive(Debug, Clone, Default)]
pub struct TickFrame {
    tick: u64,
    entries: Vec<(String, Publication)>,
}

impl TickFrame {
    /// Empty frame for tick number `tick` (0-based).
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            entries: Vec::new(),
        }
    }

    /// The tick this frame belongs to.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Publication of `topic` this tick, if it has been produced.
    pub fn get(&self, topic: &str) -> Option<&Publication> {
        self.entries
            .iter()
            .find(|(name, _)| name == topic)
            .map(|(_, p)| p)
    }

    /// Decode the message of `topic` into `T`.
    ///
    /// Returns `None` if the topic has not published this tick.
    pub fn decode<T: DeserializeOwned>(&self, topic: &str) -> Option<Result<T, serde_json::Error>> {
        self.get(topic).map(|p| p.message.decode())
    }

    /// Iterate over `(topic name, publication)` in production order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Publication)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push(&mut self, topic: String, publication: Publication) {
        self.entries.push((topic, publication));
    }
}

// ── Topic capability ──────────────────────────────────────────────────────────

/// A named periodic data producer.
///
/// Identity is the name; it must be unique across all Topics and Subscribers
/// registered with one scheduler.
pub trait Topic: Send {
    /// Unique name of this Topic.
    fn name(&self) -> &str;

    /// Names of the Topics this one reads.  Used for ordering only.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// In simulation mode, recall prior output instead of computing fresh.
    fn replace_message_with_log(&self) -> bool {
        false
    }

    /// Produce this tick's message.
    ///
    /// `frame` already contains every dependency's publication for this tick.
    fn publish_periodic(&mut self, frame: &TickFrame) -> anyhow::Result<Publication>;
}

// ── Time helpers ──────────────────────────────────────────────────────────────

/// Current wall-clock time in seconds since the Unix epoch.
///
/// A clock set before 1970 reads as `0.0`.
pub fn unix_time_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Timing helper a Topic can embed to fill the `(time, delta)` part of its
/// [`Publication`].
#[derive(Debug, Clone, Default)]
pub struct PublishClock {
    last: Option<f64>,
}

impl PublishClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(now, seconds since previous call)` using the wall clock.
    pub fn tick(&mut self) -> (f64, f64) {
        self.tick_at(unix_time_seconds())
    }

    /// Same as [`tick`](Self::tick) with an explicit `now`.
    ///
    /// Delta is `0.0` on the first call and never negative.
    pub fn tick_at(&mut self, now: f64) -> (f64, f64) {
        let delta = self.last.map_or(0.0, |last| (now - last).max(0.0));
        self.last = Some(now);
        (now, delta)
    }

    /// Wrap `message` into a [`Publication`] stamped with the wall clock.
    pub fn publish(&mut self, message: Message) -> Publication {
        let (now, delta) = self.tick();
        Publication::new(message, now, delta)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

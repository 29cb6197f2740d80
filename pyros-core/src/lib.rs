/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pyros – fixed-rate control-loop scheduler
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── graph         – stable topological ordering of topics, cycle detection
//! ├── topic         – Topic capability, Message, TickFrame, PublishClock
//! ├── subscriber    – Subscriber capability
//! ├── command       – Command capability and the sequential CommandChain
//! ├── scheduler/    – initialize / periodic / shutdown, error taxonomy
//! ├── log           – append-only CSV tick log and its reader
//! ├── config/       – YAML scheduler configuration
//! └── driver        – async fixed-rate tick loop
//! ```

pub mod command;
pub mod config;
pub mod driver;
pub mod graph;
pub mod log;
pub mod scheduler;
pub mod subscriber;
pub mod topic;

pub use command::{Command, CommandChain};
pub use config::SchedulerConfig;
pub use scheduler::{RunningScheduler, Scheduler};
pub use subscriber::Subscriber;
pub use topic::{Message, Publication, PublishClock, TickFrame, Topic};

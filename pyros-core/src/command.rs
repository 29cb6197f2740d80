/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Commands and the sequential command chain.
//!
//! A chain is an ordered `Vec` of commands plus a cursor.  Advancing the chain
//! is a cursor increment; no command owns its successor.
//!
//! # Per-node state machine
//! ```text
//!   Pending ──first_run()──► Active ──is_complete()──► Complete
//!                              │  ▲
//!                              └──┘ periodic() once per tick
//! ```
//!
//! # One chain step (called once per tick)
//! 1. If the current node is `Pending`, run its `first_run`.
//! 2. If the current node reports complete, move the cursor to the next node
//!    (at most one advance per step).
//! 3. If a node is current, run `first_run` if it is still `Pending` (the node
//!    just advanced to), then its `periodic`.
//!
//! So `first_run` always precedes a node's first `periodic`, and a node that
//! has reported completion never sees another `periodic`.

use tracing::{debug, info};

use crate::scheduler::error::TickError;

// ── Command capability ────────────────────────────────────────────────────────

/// A self-terminating unit of sequential work.
pub trait Command: Send {
    /// Name used in diagnostics and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// One-time setup.  Runs exactly once, before the first `periodic`.
    fn first_run(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Per-tick step while this command is current.
    fn periodic(&mut self) -> anyhow::Result<()>;

    /// Completion predicate over the command's own state.
    fn is_complete(&self) -> bool;
}

// ── Node state ────────────────────────────────────────────────────────────────

/// Lifecycle state of one chain node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// `first_run` has not fired yet.
    Pending,
    /// `first_run` fired; not yet complete.
    Active,
    /// Reported completion; the chain has moved past it.
    Complete,
}

struct Node {
    command: Box<dyn Command>,
    state: NodeState,
}

impl Node {
    fn first_run_if_pending(&mut self) -> Result<(), TickError> {
        if self.state != NodeState::Pending {
            return Ok(());
        }
        debug!(command = self.command.name(), "first run");
        // Marked before the call: first_run is attempted at most once even if
        // it fails
        self.state = NodeState::Active;
        self.command.first_run().map_err(|source| TickError::Command {
            command: self.command.name().to_string(),
            source,
        })
    }
}

// ── CommandChain ──────────────────────────────────────────────────────────────

/// Ordered sequence of commands with a cursor on the current one.
#[derive(Default)]
pub struct CommandChain {
    nodes: Vec<Node>,
    cursor: usize,
    exhaustion_reported: bool,
}

impl std::fmt::Debug for CommandChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChain")
            .field("commands", &self.names())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl CommandChain {
    /// Empty chain; every step is a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `command` as the last link.  Builder-style.
    pub fn then(mut self, command: impl Command + 'static) -> Self {
        self.push(Box::new(command));
        self
    }

    /// Append an already boxed command.
    pub fn push(&mut self, command: Box<dyn Command>) {
        self.nodes.push(Node {
            command,
            state: NodeState::Pending,
        });
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the current command, or `None` once the chain is exhausted.
    pub fn current_index(&self) -> Option<usize> {
        (self.cursor < self.nodes.len()).then_some(self.cursor)
    }

    /// Name of the current command.
    pub fn current_name(&self) -> Option<&str> {
        self.nodes.get(self.cursor).map(|n| n.command.name())
    }

    /// `true` when no command is current.
    pub fn is_exhausted(&self) -> bool {
        self.current_index().is_none()
    }

    /// State of node `index`.
    pub fn state(&self, index: usize) -> Option<NodeState> {
        self.nodes.get(index).map(|n| n.state)
    }

    /// Names of all commands in chain order.
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.command.name()).collect()
    }

    /// Run one chain step.
    ///
    /// # Errors
    /// [`TickError::Command`] if the current command's `first_run` or
    /// `periodic` fails.  The cursor is left where it was at the time of the
    /// failure.
    pub fn step(&mut self) -> Result<(), TickError> {
        // 1. first run of the current node
        if let Some(node) = self.nodes.get_mut(self.cursor) {
            node.first_run_if_pending()?;
        }

        // 2. advance past a completed node
        if let Some(node) = self.nodes.get_mut(self.cursor) {
            if node.command.is_complete() {
                node.state = NodeState::Complete;
                info!(
                    command = node.command.name(),
                    index = self.cursor,
                    "command complete"
                );
                self.cursor += 1;
            }
        }

        // 3. per-tick step of whatever is current now
        match self.nodes.get_mut(self.cursor) {
            Some(node) => {
                node.first_run_if_pending()?;
                node.command.periodic().map_err(|source| TickError::Command {
                    command: node.command.name().to_string(),
                    source,
                })
            }
            None => {
                if self.exhaustion_reported {
                    debug!("No further command to execute");
                } else {
                    info!("No further command to execute");
                    self.exhaustion_reported = true;
                }
                Ok(())
            }
        }
    }
}

impl FromIterator<Box<dyn Command>> for CommandChain {
    fn from_iter<T: IntoIterator<Item = Box<dyn Command>>>(iter: T) -> Self {
        let mut chain = Self::new();
        for command in iter {
            chain.push(command);
        }
        chain
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! The Pyros control-loop scheduler.
//!
//! [`Scheduler`] collects Topics, Subscribers and a [`CommandChain`], then
//! [`initialize`](Scheduler::initialize) validates the whole configuration
//! and turns it into a [`RunningScheduler`] that is ticked by the caller.
//!
//! # Lifecycle
//! ```text
//! Scheduler ──initialize()──► RunningScheduler ──periodic()*──► shutdown()
//!     │                              ▲
//!     └── Err(InitError) ────────────┘ never reached: no tick can run
//! ```
//! The states are distinct types, so ticking an uninitialised scheduler or
//! ticking after shutdown does not compile.
//!
//! # initialize()
//! 1. Order Topics topologically (stable); a cycle is fatal.
//! 2. Create the tick log (skipped in simulation mode).
//! 3. Bind Subscriber hardware, disambiguating duplicate Subscriber names.
//! 4. Reject Topic/Topic and Topic/Subscriber name collisions.
//!
//! Every step is fatal.  If step 3 or 4 fails, the log created in step 2 is
//! removed again.
//!
//! # periodic() – one tick
//! 1–3. Step the command chain (first run, advance, per-tick step).
//! 4. Produce every Topic in resolved order into a fresh [`TickFrame`].
//! 5. Append one log record (non-simulation mode, non-empty frame).
//! 6. Run every Subscriber in registration order.
//!
//! # Concurrency
//! Everything runs synchronously on the caller's thread.  `RunningScheduler`
//! is `Send`; callers sharing it between tasks must serialise `periodic()`,
//! e.g. behind a `Mutex`.

pub mod error;

pub use error::{CollisionKind, InitError, ShutdownError, TickError};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace, warn};

use crate::command::CommandChain;
use crate::config::SchedulerConfig;
use crate::graph::{DependencyGraph, GraphError};
use crate::log::TickLog;
use crate::subscriber::Subscriber;
use crate::topic::{unix_time_seconds, Topic, TickFrame};

// ── Scheduler (configuring) ───────────────────────────────────────────────────

/// A scheduler being assembled.  Nothing runs until
/// [`initialize`](Self::initialize).
pub struct Scheduler {
    topics: Vec<Box<dyn Topic>>,
    subscribers: Vec<Box<dyn Subscriber>>,
    chain: CommandChain,
    is_sim: bool,
    fail_fast_on_hardware_failure: bool,
    log_dir: PathBuf,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl Scheduler {
    /// Empty scheduler: live mode, fail-fast, log in the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty scheduler with mode flags and log directory from `config`.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            topics: Vec::new(),
            subscribers: Vec::new(),
            chain: CommandChain::new(),
            is_sim: config.is_sim,
            fail_fast_on_hardware_failure: config.fail_fast_on_hardware_failure,
            log_dir: config.log_dir.clone(),
        }
    }

    pub fn set_sim(&mut self, is_sim: bool) -> &mut Self {
        self.is_sim = is_sim;
        self
    }

    pub fn set_fail_fast_on_hardware_failure(&mut self, fail_fast: bool) -> &mut Self {
        self.fail_fast_on_hardware_failure = fail_fast;
        self
    }

    pub fn set_log_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.log_dir = dir.into();
        self
    }

    /// Register one Topic.  Registration order is the tie-break order for
    /// Topics without a dependency between them.
    pub fn add_topic(&mut self, topic: impl Topic + 'static) -> &mut Self {
        self.topics.push(Box::new(topic));
        self
    }

    /// Register Topics in order.
    pub fn add_topics(&mut self, topics: impl IntoIterator<Item = Box<dyn Topic>>) -> &mut Self {
        self.topics.extend(topics);
        self
    }

    /// Register one Subscriber.  Subscribers run in registration order.
    pub fn add_subscriber(&mut self, subscriber: impl Subscriber + 'static) -> &mut Self {
        self.subscribers.push(Box::new(subscriber));
        self
    }

    /// Register Subscribers in order.
    pub fn add_subscribers(
        &mut self,
        subscribers: impl IntoIterator<Item = Box<dyn Subscriber>>,
    ) -> &mut Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Install the command chain.  Replaces any previously installed chain.
    pub fn set_command_group(&mut self, chain: CommandChain) -> &mut Self {
        self.chain = chain;
        self
    }

    /// Validate the configuration and start the scheduler.
    ///
    /// # Errors
    /// * [`InitError::UnknownDependency`] / [`InitError::CircularDependency`]
    ///   – the Topic graph cannot be ordered.
    /// * [`InitError::LogCreate`] – the tick log cannot be created.
    /// * [`InitError::HardwareInitFailure`] – a Subscriber's hardware failed
    ///   and fail-fast is enabled.
    /// * [`InitError::NameCollision`] – duplicate Topic name, or a Topic and a
    ///   Subscriber sharing a name.
    pub fn initialize(self) -> Result<RunningScheduler, InitError> {
        let Self {
            topics,
            subscribers,
            chain,
            is_sim,
            fail_fast_on_hardware_failure,
            log_dir,
        } = self;

        info!(
            topics = topics.len(),
            subscribers = subscribers.len(),
            commands = chain.len(),
            is_sim,
            "=== Scheduler::initialize() ==="
        );

        // ── 1. Topic ordering ─────────────────────────────────────────────────
        let topics = order_topics(topics)?;
        for (i, topic) in topics.iter().enumerate() {
            info!(order = i, "Topic name: {}", topic.name());
        }

        // ── 2. Tick log ───────────────────────────────────────────────────────
        let log = if is_sim {
            debug!("simulation mode, tick log disabled");
            None
        } else {
            Some(TickLog::create(&log_dir, unix_time_seconds() as u64)?)
        };

        // ── 3 + 4. Hardware and names; undo the log on failure ────────────────
        let bound = bind_subscribers(subscribers, is_sim, fail_fast_on_hardware_failure)
            .and_then(|subs| check_name_collisions(&topics, &subs).map(|()| subs));
        let subscribers = match bound {
            Ok(subs) => subs,
            Err(e) => {
                if let Some(log) = log {
                    log.discard();
                }
                return Err(e);
            }
        };

        info!("=== Scheduler initialized ===");

        Ok(RunningScheduler {
            topics,
            subscribers,
            chain,
            is_sim,
            log,
            ticks: 0,
            last_frame: TickFrame::default(),
        })
    }
}

// ── initialize() helpers ──────────────────────────────────────────────────────

/// Step 1: reorder `topics` into stable topological order.
fn order_topics(topics: Vec<Box<dyn Topic>>) -> Result<Vec<Box<dyn Topic>>, InitError> {
    let graph = DependencyGraph::from_names(topics.iter().map(|t| (t.name(), t.dependencies())))
        .map_err(|e| graph_error(&topics, e))?;
    let order = graph
        .topological_order()
        .map_err(|e| graph_error(&topics, e))?;

    // rank[i] = execution position of registered topic i
    let mut rank = vec![0usize; order.len()];
    for (pos, &i) in order.iter().enumerate() {
        rank[i] = pos;
    }

    let mut ranked: Vec<(usize, Box<dyn Topic>)> = topics
        .into_iter()
        .enumerate()
        .map(|(i, t)| (rank[i], t))
        .collect();
    ranked.sort_by_key(|(r, _)| *r);
    Ok(ranked.into_iter().map(|(_, t)| t).collect())
}

fn graph_error(topics: &[Box<dyn Topic>], e: GraphError) -> InitError {
    match e {
        GraphError::Cycle { unresolved } => {
            let topics: Vec<String> = unresolved
                .into_iter()
                .map(|i| topics[i].name().to_string())
                .collect();
            warn!(?topics, "There is a circular dependency in the topics, aborting init");
            InitError::CircularDependency { topics }
        }
        GraphError::UnknownDependency { node, dependency } => InitError::UnknownDependency {
            topic: topics[node].name().to_string(),
            dependency,
        },
    }
}

/// Step 3: bind hardware for every Subscriber in registration order.
fn bind_subscribers(
    subscribers: Vec<Box<dyn Subscriber>>,
    is_sim: bool,
    fail_fast: bool,
) -> Result<Vec<SubscriberSlot>, InitError> {
    let mut taken: HashSet<String> = HashSet::with_capacity(subscribers.len());
    let mut slots = Vec::with_capacity(subscribers.len());

    for mut inner in subscribers {
        let declared = inner.name().to_string();
        let mut name = declared.clone();
        while taken.contains(&name) {
            name.push('0');
        }
        if name != declared {
            warn!(declared = %declared, renamed = %name, "duplicate subscriber name, renamed");
        }

        let hardware_ok = inner.initialize_hardware();
        if !hardware_ok {
            if fail_fast {
                return Err(InitError::HardwareInitFailure { subscriber: name });
            }
            warn!(
                subscriber = %name,
                "hardware failed to initialize, continuing degraded"
            );
        }
        inner.set_sim(is_sim);
        debug!(subscriber = %name, hardware_ok, "subscriber bound");

        taken.insert(name.clone());
        slots.push(SubscriberSlot {
            name,
            hardware_ok,
            inner,
        });
    }
    Ok(slots)
}

/// Step 4: Topic names are pairwise distinct and disjoint from Subscriber
/// names.
fn check_name_collisions(
    topics: &[Box<dyn Topic>],
    subscribers: &[SubscriberSlot],
) -> Result<(), InitError> {
    let subscriber_names: HashSet<&str> = subscribers.iter().map(|s| s.name.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(topics.len());

    for topic in topics {
        let name = topic.name();
        if !seen.insert(name) {
            return Err(InitError::NameCollision {
                name: name.to_string(),
                kind: CollisionKind::TopicTopic,
            });
        }
        if subscriber_names.contains(name) {
            return Err(InitError::NameCollision {
                name: name.to_string(),
                kind: CollisionKind::TopicSubscriber,
            });
        }
    }
    Ok(())
}

// ── RunningScheduler ──────────────────────────────────────────────────────────

/// A Subscriber with the name it is registered under.
struct SubscriberSlot {
    name: String,
    hardware_ok: bool,
    inner: Box<dyn Subscriber>,
}

/// An initialised scheduler.  Call [`periodic`](Self::periodic) once per
/// tick, then [`shutdown`](Self::shutdown) once.
pub struct RunningScheduler {
    /// In resolved topological order.
    topics: Vec<Box<dyn Topic>>,
    subscribers: Vec<SubscriberSlot>,
    chain: CommandChain,
    is_sim: bool,
    /// `None` in simulation mode.
    log: Option<TickLog>,
    ticks: u64,
    last_frame: TickFrame,
}

impl RunningScheduler {
    /// Run one tick.
    ///
    /// # Errors
    /// The first collaborator or log failure, wrapped in [`TickError`].  The
    /// rest of the tick is abandoned; nothing is retried or rolled back.
    pub fn periodic(&mut self) -> Result<(), TickError> {
        let present_time = unix_time_seconds();
        trace!(tick = self.ticks, is_sim = self.is_sim, "tick start");

        // ── 1–3. Command chain ────────────────────────────────────────────────
        self.chain.step()?;

        // ── 4. Topics in resolved order ───────────────────────────────────────
        let mut frame = TickFrame::new(self.ticks);
        for topic in &mut self.topics {
            if self.is_sim && topic.replace_message_with_log() {
                // Replay from a prior log is not supported; the topic is
                // absent from this tick's frame
                trace!(topic = topic.name(), "replay topic skipped in simulation");
                continue;
            }
            let publication = topic
                .publish_periodic(&frame)
                .map_err(|source| TickError::Topic {
                    topic: topic.name().to_string(),
                    source,
                })?;
            frame.push(topic.name().to_string(), publication);
        }

        // ── 5. Log ────────────────────────────────────────────────────────────
        if let Some(log) = self.log.as_mut() {
            log.append(present_time, &frame)?;
        }

        // ── 6. Subscribers in registration order ──────────────────────────────
        for slot in &mut self.subscribers {
            slot.inner
                .periodic(&frame)
                .map_err(|source| TickError::Subscriber {
                    subscriber: slot.name.clone(),
                    source,
                })?;
        }

        self.last_frame = frame;
        self.ticks += 1;
        Ok(())
    }

    /// Run every Subscriber's shutdown hook in registration order.
    ///
    /// All hooks run even if one fails; the first failure is returned.
    pub fn shutdown(self) -> Result<(), ShutdownError> {
        let Self {
            subscribers,
            log,
            ticks,
            ..
        } = self;

        let mut first_err = None;
        for mut slot in subscribers {
            if let Err(source) = slot.inner.shutdown() {
                warn!(subscriber = %slot.name, error = %source, "shutdown hook failed");
                if first_err.is_none() {
                    first_err = Some(ShutdownError::Subscriber {
                        subscriber: slot.name,
                        source,
                    });
                }
            }
        }

        info!(
            ticks,
            log = ?log.as_ref().map(TickLog::path),
            records = log.as_ref().map_or(0, TickLog::records),
            "=== Scheduler shut down ==="
        );

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Completed ticks.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn is_sim(&self) -> bool {
        self.is_sim
    }

    /// Topic names in resolved execution order.
    pub fn topic_order(&self) -> Vec<&str> {
        self.topics.iter().map(|t| t.name()).collect()
    }

    /// Registered (disambiguated) Subscriber names in registration order.
    pub fn subscriber_names(&self) -> Vec<&str> {
        self.subscribers.iter().map(|s| s.name.as_str()).collect()
    }

    /// Subscribers whose hardware failed to initialise (fail-fast disabled).
    /// They are still ticked.
    pub fn degraded_subscribers(&self) -> Vec<&str> {
        self.subscribers
            .iter()
            .filter(|s| !s.hardware_ok)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Path of the tick log; `None` in simulation mode.
    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(TickLog::path)
    }

    /// Name of the current command, `None` once the chain is exhausted.
    pub fn current_command(&self) -> Option<&str> {
        self.chain.current_name()
    }

    pub fn command_chain(&self) -> &CommandChain {
        &self.chain
    }

    /// Frame produced by the last completed tick.
    pub fn last_frame(&self) -> &TickFrame {
        &self.last_frame
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

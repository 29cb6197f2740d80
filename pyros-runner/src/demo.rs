/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Simulated differential-drive robot used by the runner.
//!
//! ```text
//!  Drive commands ──► Setpoint ──► wheel_encoders ──► odometry ──► drive_base
//!  (CommandChain)     (shared)     (Topic)            (Topic)      (Subscriber)
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use pyros_core::{
    Command, CommandChain, Message, Publication, PublishClock, Subscriber, TickFrame, Topic,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Encoder resolution.
pub const COUNTS_PER_METER: f64 = 1_000.0;
/// Distance between the wheels in metres.
pub const WHEEL_BASE_M: f64 = 0.5;

pub const ENCODERS_TOPIC: &str = "wheel_encoders";
pub const ODOMETRY_TOPIC: &str = "odometry";
pub const DRIVE_BASE: &str = "drive_base";

// ── Shared setpoint ───────────────────────────────────────────────────────────

/// Commanded wheel speeds in m/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelSpeeds {
    pub left: f64,
    pub right: f64,
}

/// Written by commands, read by the encoder simulation.
#[derive(Debug, Clone, Default)]
pub struct Setpoint(Arc<Mutex<WheelSpeeds>>);

impl Setpoint {
    pub fn get(&self) -> WheelSpeeds {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, speeds: WheelSpeeds) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = speeds;
    }
}

// ── Topics ────────────────────────────────────────────────────────────────────

/// Cumulative encoder counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EncoderCounts {
    pub left: i64,
    pub right: i64,
}

/// Integrates the setpoint into encoder counts using the nominal tick period.
pub struct WheelEncoders {
    setpoint: Setpoint,
    tick_seconds: f64,
    // Fractional travel not yet turned into whole counts
    travel_m: (f64, f64),
    clock: PublishClock,
}

impl WheelEncoders {
    pub fn new(setpoint: Setpoint, tick_seconds: f64) -> Self {
        Self {
            setpoint,
            tick_seconds,
            travel_m: (0.0, 0.0),
            clock: PublishClock::new(),
        }
    }
}

impl Topic for WheelEncoders {
    fn name(&self) -> &str {
        ENCODERS_TOPIC
    }

    fn publish_periodic(&mut self, _frame: &TickFrame) -> anyhow::Result<Publication> {
        let speeds = self.setpoint.get();
        self.travel_m.0 += speeds.left * self.tick_seconds;
        self.travel_m.1 += speeds.right * self.tick_seconds;

        let counts = EncoderCounts {
            left: (self.travel_m.0 * COUNTS_PER_METER).round() as i64,
            right: (self.travel_m.1 * COUNTS_PER_METER).round() as i64,
        };
        Ok(self.clock.publish(Message::new(&counts)?))
    }
}

/// Planar pose: metres and radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// Dead-reckoning from encoder deltas.
#[derive(Debug, Default)]
pub struct Odometry {
    pose: Pose,
    last: Option<EncoderCounts>,
    clock: PublishClock,
}

impl Odometry {
    pub fn new() -> Self {
        Self::default()
    }

    fn integrate(&mut self, counts: EncoderCounts) {
        let last = self.last.replace(counts).unwrap_or_default();
        let dl = (counts.left - last.left) as f64 / COUNTS_PER_METER;
        let dr = (counts.right - last.right) as f64 / COUNTS_PER_METER;

        let distance = (dl + dr) / 2.0;
        let dtheta = (dr - dl) / WHEEL_BASE_M;
        // Midpoint heading for the translation
        let mid = self.pose.heading + dtheta / 2.0;
        self.pose.x += distance * mid.cos();
        self.pose.y += distance * mid.sin();
        self.pose.heading += dtheta;
    }
}

impl Topic for Odometry {
    fn name(&self) -> &str {
        ODOMETRY_TOPIC
    }

    fn dependencies(&self) -> Vec<String> {
        vec![ENCODERS_TOPIC.to_string()]
    }

    fn publish_periodic(&mut self, frame: &TickFrame) -> anyhow::Result<Publication> {
        let counts: EncoderCounts = frame
            .decode(ENCODERS_TOPIC)
            .ok_or_else(|| anyhow::anyhow!("'{ENCODERS_TOPIC}' has not published this tick"))??;
        self.integrate(counts);
        Ok(self.clock.publish(Message::new(&self.pose)?))
    }
}

// ── Subscriber ────────────────────────────────────────────────────────────────

/// Reports the robot pose.  The "hardware" is simulated and always binds.
pub struct DriveBase {
    is_sim: bool,
    report_every: u64,
}

impl DriveBase {
    pub fn new(report_every: u64) -> Self {
        Self {
            is_sim: false,
            report_every: report_every.max(1),
        }
    }
}

impl Subscriber for DriveBase {
    fn name(&self) -> &str {
        DRIVE_BASE
    }

    fn initialize_hardware(&mut self) -> bool {
        debug!("drive base bound to simulated motors");
        true
    }

    fn set_sim(&mut self, is_sim: bool) {
        self.is_sim = is_sim;
    }

    fn periodic(&mut self, frame: &TickFrame) -> anyhow::Result<()> {
        let Some(pose) = frame.decode::<Pose>(ODOMETRY_TOPIC).transpose()? else {
            return Ok(());
        };
        if frame.tick() % self.report_every == 0 {
            info!(
                tick = frame.tick(),
                x = format!("{:.3}", pose.x),
                y = format!("{:.3}", pose.y),
                heading_deg = format!("{:.1}", pose.heading.to_degrees()),
                sim = self.is_sim,
                "pose"
            );
        }
        Ok(())
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Holds wheel speeds for a fixed number of ticks.  The setpoint stays put
/// until the next command's `first_run`, so end a chain with [`Drive::idle`].
pub struct Drive {
    label: &'static str,
    speeds: WheelSpeeds,
    ticks: u64,
    done: u64,
    setpoint: Setpoint,
}

impl Drive {
    pub fn straight(setpoint: &Setpoint, speed: f64, ticks: u64) -> Self {
        Self::new("drive_straight", WheelSpeeds { left: speed, right: speed }, ticks, setpoint)
    }

    /// Turn in place; positive `speed` turns counter-clockwise.
    pub fn turn(setpoint: &Setpoint, speed: f64, ticks: u64) -> Self {
        Self::new("turn", WheelSpeeds { left: -speed, right: speed }, ticks, setpoint)
    }

    /// Zero the setpoint and finish.
    pub fn idle(setpoint: &Setpoint) -> Self {
        Self::new("idle", WheelSpeeds::default(), 1, setpoint)
    }

    fn new(label: &'static str, speeds: WheelSpeeds, ticks: u64, setpoint: &Setpoint) -> Self {
        Self {
            label,
            speeds,
            ticks,
            done: 0,
            setpoint: setpoint.clone(),
        }
    }
}

impl Command for Drive {
    fn name(&self) -> &str {
        self.label
    }

    fn first_run(&mut self) -> anyhow::Result<()> {
        info!(command = self.label, ticks = self.ticks, speeds = ?self.speeds, "command start");
        self.setpoint.set(self.speeds);
        Ok(())
    }

    fn periodic(&mut self) -> anyhow::Result<()> {
        self.done += 1;
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.done >= self.ticks
    }
}

/// Drive a square-ish path: forward, quarter turn, forward, idle.
pub fn square_leg(setpoint: &Setpoint, rate_hz: f64) -> CommandChain {
    let secs = |s: f64| (s * rate_hz).round().max(1.0) as u64;
    // Wheel speed for a quarter turn in one second: (π/2 · base/2) m/s
    let turn_speed = std::f64::consts::FRAC_PI_2 * WHEEL_BASE_M / 2.0;

    CommandChain::new()
        .then(Drive::straight(setpoint, 0.5, secs(2.0)))
        .then(Drive::turn(setpoint, turn_speed, secs(1.0)))
        .then(Drive::straight(setpoint, 0.5, secs(2.0)))
        .then(Drive::idle(setpoint))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pyros_core::Scheduler;

    const RATE_HZ: f64 = 50.0;

    fn robot(setpoint: &Setpoint) -> Scheduler {
        let mut s = Scheduler::new();
        s.set_sim(true)
            .add_topic(Odometry::new())
            .add_topic(WheelEncoders::new(setpoint.clone(), 1.0 / RATE_HZ))
            .add_subscriber(DriveBase::new(10));
        s
    }

    fn pose_of(frame: &TickFrame) -> Pose {
        frame.decode(ODOMETRY_TOPIC).unwrap().unwrap()
    }

    #[test]
    fn encoders_are_ordered_before_odometry() {
        let running = robot(&Setpoint::default()).initialize().unwrap();
        assert_eq!(running.topic_order(), vec![ENCODERS_TOPIC, ODOMETRY_TOPIC]);
    }

    #[test]
    fn straight_drive_moves_along_x() {
        let setpoint = Setpoint::default();
        let mut s = robot(&setpoint);
        s.set_command_group(
            CommandChain::new()
                .then(Drive::straight(&setpoint, 1.0, 50))
                .then(Drive::idle(&setpoint)),
        );
        let mut running = s.initialize().unwrap();

        for _ in 0..60 {
            running.periodic().unwrap();
        }
        let pose = pose_of(running.last_frame());
        // 50 ticks at 1 m/s, 20 ms each → 1 m
        assert!((pose.x - 1.0).abs() < 1e-6, "{pose:?}");
        assert!(pose.y.abs() < 1e-9);
        assert!(pose.heading.abs() < 1e-9);
        assert_eq!(setpoint.get(), WheelSpeeds::default(), "idle zeroes the setpoint");
    }

    #[test]
    fn turn_changes_heading_only() {
        let setpoint = Setpoint::default();
        let mut s = robot(&setpoint);
        let turn_speed = std::f64::consts::FRAC_PI_2 * WHEEL_BASE_M / 2.0;
        s.set_command_group(
            CommandChain::new()
                .then(Drive::turn(&setpoint, turn_speed, 50))
                .then(Drive::idle(&setpoint)),
        );
        let mut running = s.initialize().unwrap();

        for _ in 0..60 {
            running.periodic().unwrap();
        }
        let pose = pose_of(running.last_frame());
        // Encoder quantisation: 1 count = 1 mm
        assert!((pose.heading - std::f64::consts::FRAC_PI_2).abs() < 0.01, "{pose:?}");
        assert!(pose.x.abs() < 1e-9 && pose.y.abs() < 1e-9);
    }

    #[test]
    fn square_leg_runs_to_completion() {
        let setpoint = Setpoint::default();
        let chain = square_leg(&setpoint, RATE_HZ);
        assert_eq!(chain.names(), vec!["drive_straight", "turn", "drive_straight", "idle"]);

        let mut s = robot(&setpoint);
        s.set_command_group(chain);
        let mut running = s.initialize().unwrap();
        for _ in 0..(5.0 * RATE_HZ) as usize + 10 {
            running.periodic().unwrap();
        }
        assert_eq!(running.current_command(), None);

        let pose = pose_of(running.last_frame());
        assert!((pose.x - 1.0).abs() < 0.02, "{pose:?}");
        assert!((pose.y - 1.0).abs() < 0.02, "{pose:?}");
    }

    #[test]
    fn odometry_requires_encoder_input() {
        let mut lone = Odometry::new();
        let err = lone.publish_periodic(&TickFrame::new(0)).unwrap_err();
        assert!(err.to_string().contains(ENCODERS_TOPIC));
    }

    #[test]
    fn drive_base_binds_and_reports() {
        let setpoint = Setpoint::default();
        let mut s = robot(&setpoint);
        s.set_fail_fast_on_hardware_failure(true);
        let mut running = s.initialize().unwrap();
        assert_eq!(running.subscriber_names(), vec![DRIVE_BASE]);
        assert!(running.degraded_subscribers().is_empty());
        for _ in 0..20 {
            running.periodic().unwrap();
        }
        running.shutdown().unwrap();
    }
}

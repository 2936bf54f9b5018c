//! The two-phase rotation sequence.
//!
//! Phase one sweeps the rig through a fixed number of increments,
//! photographing each stop. Phase two waits for the collaborator's
//! per-axis targets, then moves to each and optionally photographs it.
//! A command failure or acknowledgment timeout aborts the whole run; the
//! camera is released exactly once on every path out.

use std::thread;
use std::time::{Duration, Instant};

use error_stack::{Report, Result, ResultExt};
use tracing::{info, warn};

use crate::camera::{angle_photo_name, sweep_photo_name};
use crate::config::{Config, MotorConfig, SequenceConfig};
use crate::notifier::RotationKind;
use crate::state::{AngleSet, AngleStore};
use crate::{Rig, RigError};

pub const SWEEP_STEPS: u32 = 90;
pub const SWEEP_ACK_TIMEOUT: Duration = Duration::from_secs(10);
pub const MOVE_ACK_TIMEOUT: Duration = Duration::from_secs(30);
pub const ANGLE_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
pub const ANGLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumIs)]
pub enum Phase {
    Idle,
    FullSweep,
    AwaitTargets,
    AnglePrecision,
    Complete,
}

/// One rotation run. Not reentrant; the caller serializes access to the
/// rig.
pub struct Sequencer<'a> {
    rig: &'a mut Rig,
    angles: &'a AngleStore,
    seq: &'a SequenceConfig,
    motor: &'a MotorConfig,
    phase: Phase,
    photos: u32,
}

impl<'a> Sequencer<'a> {
    pub fn new(rig: &'a mut Rig, angles: &'a AngleStore, config: &'a Config) -> Self {
        Self {
            rig,
            angles,
            seq: &config.sequence,
            motor: &config.motor,
            phase: Phase::Idle,
            photos: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs to completion or returns a descriptive failure. The camera is
    /// released before this returns, on success and on every abort path.
    pub fn run_sequence(&mut self) -> Result<String, RigError> {
        info!(
            "rotation sequence starting: {} sweep steps",
            self.seq.sweep_steps
        );
        self.notify(0, "rotation sequence started");

        let result = self.run_phases();
        self.rig.camera.release();

        match &result {
            Ok(message) => {
                self.phase = Phase::Complete;
                self.angles.set_status(message);
                self.notify(0, message);
                info!("{message}");
            }
            Err(report) => {
                self.phase = Phase::Idle;
                let summary = format!("sequence failed: {report}");
                self.angles.set_status(&summary);
                self.notify(0, &summary);
                warn!("{summary}");
            }
        }

        result
    }

    fn run_phases(&mut self) -> Result<String, RigError> {
        self.enter(Phase::FullSweep, "running full sweep");
        for step in 1..=self.seq.sweep_steps {
            self.sweep_step(step)?;
        }
        if self.seq.return_to_start {
            self.rig.motor.send_command(&self.motor.return_command)?;
        }

        self.enter(Phase::AwaitTargets, "waiting for angle targets");
        let targets = self.wait_for_angles()?;

        self.enter(Phase::AnglePrecision, "moving to target angles");
        for (axis, angle) in targets.iter().enumerate() {
            self.angle_step(axis, angle)?;
        }
        if self.seq.return_to_start {
            self.rig.motor.send_command(&self.motor.return_command)?;
        }

        Ok(format!(
            "rotation sequence complete: {} sweep steps, {targets} reached, {} photos",
            self.seq.sweep_steps, self.photos
        ))
    }

    fn sweep_step(&mut self, step: u32) -> Result<(), RigError> {
        self.rig
            .motor
            .send_command(&self.motor.step_command)
            .attach_printable_lazy(|| format!("sweep step {step} command failed"))?;

        if !self.rig.motor.await_ack(self.seq.sweep_ack_timeout())? {
            return Err(Report::new(RigError::AckTimeout)
                .attach_printable(format!("no acknowledgment for sweep step {step}")));
        }

        let photo = self.rig.camera.capture(&sweep_photo_name(step))?;
        self.photos += 1;

        // upload failure is non-fatal; the sweep keeps going
        if let Err(report) = self.rig.notifier.send_photo(&photo, step, RotationKind::Sweep) {
            warn!("photo upload failed, continuing sweep: {report}");
        }
        Ok(())
    }

    fn wait_for_angles(&mut self) -> Result<AngleSet, RigError> {
        let deadline = Instant::now() + self.seq.angle_wait();

        loop {
            if let Some(targets) = self.angles.take_fresh() {
                info!("angle targets ready: {targets}");
                return Ok(targets);
            }
            if Instant::now() >= deadline {
                return Err(Report::new(RigError::AngleWaitTimeout).attach_printable(format!(
                    "no angle set arrived within {} s",
                    self.seq.angle_wait_secs
                )));
            }
            thread::sleep(self.seq.poll_interval());
        }
    }

    fn angle_step(&mut self, axis: usize, angle: u16) -> Result<(), RigError> {
        self.rig
            .motor
            .send_angle(angle)
            .attach_printable_lazy(|| format!("axis {} move to {angle} failed", axis + 1))?;

        if !self.rig.motor.await_ack(self.seq.move_ack_timeout())? {
            return Err(Report::new(RigError::AckTimeout).attach_printable(format!(
                "no acknowledgment for axis {} at {angle} degrees",
                axis + 1
            )));
        }

        if self.seq.capture_angle_photos {
            let photo = self.rig.camera.capture(&angle_photo_name(axis, angle))?;
            self.photos += 1;
            if let Err(report) =
                self.rig
                    .notifier
                    .send_photo(&photo, axis as u32 + 1, RotationKind::Angle)
            {
                warn!("photo upload failed, continuing moves: {report}");
            }
        }
        Ok(())
    }

    fn enter(&mut self, phase: Phase, status: &str) {
        self.phase = phase;
        info!("entering phase {phase}");
        self.angles.set_status(status);
    }

    fn notify(&self, rotation_number: u32, status: &str) {
        if let Err(report) = self.rig.notifier.send_status(rotation_number, status) {
            warn!("status update not delivered: {report}");
        }
    }
}

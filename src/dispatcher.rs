//! Outgoing command state.
//!
//! Producers on any thread write desired setpoints through a
//! [`CommandHandle`]. The control loop owns the [`CommandDispatcher`], which
//! turns every dirty channel into command frames and clears the flag once the
//! frames have been written to the link.

use crate::answers::ArmJointCalibration;
use crate::base::Result;
use crate::cmds::*;
use crate::types::{GripAction, LiftAction};
use crate::utils::radians_to_ticks;
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Changes smaller than this are treated as no change.
pub const SETPOINT_TOLERANCE: f64 = 0.01;

/// Desired base motion.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Velocity {
    /// m/s
    pub linear: f64,
    /// rad/s
    pub angular: f64,
}

impl Velocity {
    fn approx_eq(&self, other: &Velocity) -> bool {
        (self.linear - other.linear).abs() < SETPOINT_TOLERANCE
            && (self.angular - other.angular).abs() < SETPOINT_TOLERANCE
    }

    fn is_zero(&self) -> bool {
        self.linear.abs() < SETPOINT_TOLERANCE && self.angular.abs() < SETPOINT_TOLERANCE
    }
}

/// One controllable channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CommandChannel {
    MotorEnable,
    Velocity,
    Grip,
    Lift,
    SonarPower,
    ArmTargets,
}

#[derive(Debug, Clone)]
struct Setpoint<T> {
    value: Option<T>,
    dirty: bool,
    generation: u64,
    marked_at: Option<Instant>,
}

impl<T> Default for Setpoint<T> {
    fn default() -> Self {
        Setpoint {
            value: None,
            dirty: false,
            generation: 0,
            marked_at: None,
        }
    }
}

impl<T: Clone> Setpoint<T> {
    fn mark(&mut self, value: T, now: Instant) {
        self.value = Some(value);
        self.dirty = true;
        self.generation += 1;
        self.marked_at = Some(now);
    }

    /// Stores `value` and marks the channel dirty unless `same` says it
    /// equals the current value.
    fn update(&mut self, value: T, now: Instant, same: impl Fn(&T, &T) -> bool) -> bool {
        if let Some(current) = &self.value {
            if same(current, &value) {
                return false;
            }
        }
        self.mark(value, now);
        true
    }

    fn pending(&self) -> Option<(T, u64)> {
        match (&self.value, self.dirty) {
            (Some(value), true) => Some((value.clone(), self.generation)),
            _ => None,
        }
    }

    fn acknowledge(&mut self, generation: u64) {
        if self.generation == generation {
            self.dirty = false;
        }
    }
}

/// Desired setpoints, each with its own dirty flag.
#[derive(Debug, Clone)]
pub struct PendingCommandState {
    velocity: Setpoint<Velocity>,
    motor_enable: Setpoint<bool>,
    grip: Setpoint<GripAction>,
    lift: Setpoint<LiftAction>,
    sonar_power: Setpoint<bool>,
    arm_targets: Setpoint<Vec<f64>>,
    velocity_refresh: Duration,
}

impl PendingCommandState {
    fn new(velocity_refresh: Duration) -> PendingCommandState {
        PendingCommandState {
            velocity: Setpoint::default(),
            motor_enable: Setpoint::default(),
            grip: Setpoint::default(),
            lift: Setpoint::default(),
            sonar_power: Setpoint::default(),
            arm_targets: Setpoint::default(),
            velocity_refresh,
        }
    }

    fn set_velocity(&mut self, velocity: Velocity, now: Instant) -> bool {
        if self.velocity.update(velocity, now, Velocity::approx_eq) {
            return true;
        }
        // the firmware drops a commanded velocity after a while
        let stale = self
            .velocity
            .marked_at
            .map_or(true, |at| now.saturating_duration_since(at) > self.velocity_refresh);
        if !velocity.is_zero() && stale {
            debug!("Re-asserting unchanged velocity {:?}", velocity);
            self.velocity.mark(velocity, now);
            return true;
        }
        false
    }

    fn acknowledge(&mut self, channel: CommandChannel, generation: u64) {
        match channel {
            CommandChannel::MotorEnable => self.motor_enable.acknowledge(generation),
            CommandChannel::Velocity => self.velocity.acknowledge(generation),
            CommandChannel::Grip => self.grip.acknowledge(generation),
            CommandChannel::Lift => self.lift.acknowledge(generation),
            CommandChannel::SonarPower => self.sonar_power.acknowledge(generation),
            CommandChannel::ArmTargets => self.arm_targets.acknowledge(generation),
        }
    }

    fn is_dirty(&self, channel: CommandChannel) -> bool {
        match channel {
            CommandChannel::MotorEnable => self.motor_enable.dirty,
            CommandChannel::Velocity => self.velocity.dirty,
            CommandChannel::Grip => self.grip.dirty,
            CommandChannel::Lift => self.lift.dirty,
            CommandChannel::SonarPower => self.sonar_power.dirty,
            CommandChannel::ArmTargets => self.arm_targets.dirty,
        }
    }
}

/// Cloneable, thread-safe writer of desired setpoints.
///
/// Setters return `true` when the value was accepted as a change and will be
/// sent on the next control cycle.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    inner: Arc<Mutex<PendingCommandState>>,
}

impl CommandHandle {
    pub fn new(velocity_refresh: Duration) -> CommandHandle {
        CommandHandle {
            inner: Arc::new(Mutex::new(PendingCommandState::new(velocity_refresh))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingCommandState> {
        // setpoints stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Desired base velocity: `linear` in m/s, `angular` in rad/s.
    pub fn set_velocity(&self, linear: f64, angular: f64) -> bool {
        self.set_velocity_at(linear, angular, Instant::now())
    }

    pub fn set_velocity_at(&self, linear: f64, angular: f64, now: Instant) -> bool {
        self.lock().set_velocity(Velocity { linear, angular }, now)
    }

    pub fn set_motor_enable(&self, enable: bool) -> bool {
        self.set_motor_enable_at(enable, Instant::now())
    }

    pub fn set_motor_enable_at(&self, enable: bool, now: Instant) -> bool {
        self.lock().motor_enable.update(enable, now, |a, b| a == b)
    }

    pub fn set_grip(&self, action: GripAction) -> bool {
        self.lock().grip.update(action, Instant::now(), |a, b| a == b)
    }

    pub fn set_lift(&self, action: LiftAction) -> bool {
        self.lock().lift.update(action, Instant::now(), |a, b| a == b)
    }

    /// Switches the sonar array. Only a change from the current power state
    /// is sent.
    pub fn set_sonar_power(&self, on: bool) -> bool {
        self.lock().sonar_power.update(on, Instant::now(), |a, b| a == b)
    }

    /// Records the sonar power the robot was configured with, without
    /// sending anything.
    pub(crate) fn seed_sonar_power(&self, on: bool) {
        let mut state = self.lock();
        state.sonar_power.value = Some(on);
        state.sonar_power.dirty = false;
    }

    /// Desired arm joint angles in radians, joint 0 first.
    pub fn set_arm_targets(&self, radians: &[f64]) -> bool {
        self.lock().arm_targets.update(radians.to_vec(), Instant::now(), |a, b| {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| (x - y).abs() < SETPOINT_TOLERANCE)
        })
    }

    pub fn is_dirty(&self, channel: CommandChannel) -> bool {
        self.lock().is_dirty(channel)
    }
}

/// Frames that bring one channel up to date.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub channel: CommandChannel,
    pub generation: u64,
    pub frames: Vec<CommandFrame>,
    /// The requested velocity exceeded a limit and was clamped.
    pub thresholded: bool,
    arm_ticks: Vec<(usize, u8)>,
}

impl PendingCommand {
    fn new(channel: CommandChannel, generation: u64, frames: Vec<CommandFrame>) -> Self {
        PendingCommand {
            channel,
            generation,
            frames,
            thresholded: false,
            arm_ticks: Vec::new(),
        }
    }
}

/// Speed limits applied to velocity commands, mm/s and deg/s.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VelocityLimits {
    pub max_trans_mm_s: f64,
    pub max_rot_deg_s: f64,
}

/// Calibration the arm path needs to turn angles into servo ticks.
#[derive(Debug, Copy, Clone)]
pub struct ArmContext<'a> {
    pub calibration: &'a [ArmJointCalibration],
    pub inverted_joints: usize,
}

/// Drains dirty channels into command frames. Owned by the control loop.
#[derive(Debug)]
pub struct CommandDispatcher {
    handle: CommandHandle,
    limits: VelocityLimits,
    last_arm_ticks: Vec<Option<u8>>,
}

fn clamp_magnitude(value: f64, max: f64) -> (f64, bool) {
    if value.abs() > max {
        (max.copysign(value), true)
    } else {
        (value, false)
    }
}

impl CommandDispatcher {
    pub fn new(handle: CommandHandle, limits: VelocityLimits) -> CommandDispatcher {
        let word_max = f64::from(i16::MAX);
        CommandDispatcher {
            handle,
            limits: VelocityLimits {
                max_trans_mm_s: limits.max_trans_mm_s.clamp(0.0, word_max),
                max_rot_deg_s: limits.max_rot_deg_s.clamp(0.0, word_max),
            },
            last_arm_ticks: Vec::new(),
        }
    }

    pub fn handle(&self) -> &CommandHandle {
        &self.handle
    }

    /// `VEL` and `RVEL` frames for a desired velocity, and whether either
    /// component had to be clamped.
    pub fn velocity_frames(&self, velocity: Velocity) -> Result<(Vec<CommandFrame>, bool)> {
        let (vx, x_clamped) =
            clamp_magnitude((velocity.linear * 1e3).trunc(), self.limits.max_trans_mm_s.trunc());
        if x_clamped {
            warn!(
                "Translational velocity {} mm/s thresholded to {}",
                (velocity.linear * 1e3).trunc(),
                vx
            );
        }
        let (va, a_clamped) = clamp_magnitude(
            velocity.angular.to_degrees().round(),
            self.limits.max_rot_deg_s.trunc(),
        );
        if a_clamped {
            warn!(
                "Rotational velocity {} deg/s thresholded to {}",
                velocity.angular.to_degrees().round(),
                va
            );
        }
        let frames = vec![
            CommandFrame::build(P2OS_CMD_VEL, ArgType::SignedWord, vx as i32)?,
            CommandFrame::build(P2OS_CMD_RVEL, ArgType::SignedWord, va as i32)?,
        ];
        Ok((frames, x_clamped || a_clamped))
    }

    fn arm_command(
        &self,
        targets: &[f64],
        generation: u64,
        arm: ArmContext<'_>,
    ) -> PendingCommand {
        let mut command = PendingCommand::new(CommandChannel::ArmTargets, generation, Vec::new());
        for (joint, (&target, cal)) in targets.iter().zip(arm.calibration).enumerate() {
            let ticks = radians_to_ticks(cal, joint < arm.inverted_joints, target);
            if self.last_arm_ticks.get(joint).copied().flatten() == Some(ticks) {
                continue;
            }
            command.frames.push(CommandFrame::byte_pair(
                P2OS_CMD_ARM_POS,
                ticks,
                (joint + 1) as u8,
            ));
            command.arm_ticks.push((joint, ticks));
        }
        command
    }

    /// Commands for every dirty channel, in sending order. Flags stay set
    /// until [`acknowledge`](Self::acknowledge) is called.
    ///
    /// Arm targets wait until `arm` is available.
    pub fn drain(&self, arm: Option<ArmContext<'_>>) -> Result<Vec<PendingCommand>> {
        let state = self.handle.lock().clone();
        let mut commands = Vec::new();

        if let Some((velocity, generation)) = state.velocity.pending() {
            let (frames, thresholded) = self.velocity_frames(velocity)?;
            let mut command = PendingCommand::new(CommandChannel::Velocity, generation, frames);
            command.thresholded = thresholded;
            commands.push(command);
        }
        if let Some((enable, generation)) = state.motor_enable.pending() {
            let frame = CommandFrame::word(P2OS_CMD_ENABLE, u16::from(enable));
            commands.push(PendingCommand::new(CommandChannel::MotorEnable, generation, vec![frame]));
        }
        if let Some((action, generation)) = state.grip.pending() {
            let frame = CommandFrame::word(P2OS_CMD_GRIPPER, action as u16);
            commands.push(PendingCommand::new(CommandChannel::Grip, generation, vec![frame]));
        }
        if let Some((action, generation)) = state.lift.pending() {
            let frame = CommandFrame::word(P2OS_CMD_GRIPPER, action as u16);
            commands.push(PendingCommand::new(CommandChannel::Lift, generation, vec![frame]));
        }
        if let Some((on, generation)) = state.sonar_power.pending() {
            let frame = CommandFrame::word(P2OS_CMD_SONAR, u16::from(on));
            commands.push(PendingCommand::new(CommandChannel::SonarPower, generation, vec![frame]));
        }
        if let (Some((targets, generation)), Some(arm)) = (state.arm_targets.pending(), arm) {
            commands.push(self.arm_command(&targets, generation, arm));
        }
        Ok(commands)
    }

    /// Marks a drained command as written to the link.
    pub fn acknowledge(&mut self, command: &PendingCommand) {
        for &(joint, ticks) in &command.arm_ticks {
            if self.last_arm_ticks.len() <= joint {
                self.last_arm_ticks.resize(joint + 1, None);
            }
            self.last_arm_ticks[joint] = Some(ticks);
        }
        self.handle
            .lock()
            .acknowledge(command.channel, command.generation);
    }
}

//! # P2OS Driver
//!
//! `p2os` drives robots running the P2OS controller firmware (the Pioneer
//! family) over a serial line or a TCP bridge. It performs the sync
//! handshake, configures the controller, turns the status packets it streams
//! into a typed [`TelemetrySnapshot`](types::TelemetrySnapshot), and sends
//! the setpoints other threads write through a [`CommandHandle`].

extern crate byteorder;
extern crate log;

pub mod answers;
pub mod base;
mod checksum;
pub mod cmds;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
mod parsers;
pub mod protocol;
pub mod publisher;
pub mod robot_params;
pub mod sync;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod utils;

pub use crate::base::{Channel, Error, Message, Result};
pub use crate::config::DriverConfig;
pub use crate::dispatcher::CommandHandle;
pub use crate::protocol::P2osHostProtocol;
pub use crate::publisher::TelemetrySink;
pub use crate::telemetry::TelemetryUpdate;
pub use crate::transport::{Link, SerialLink, TcpLink};

use crate::cmds::*;
use crate::dispatcher::{ArmContext, CommandDispatcher, VelocityLimits};
use crate::robot_params::RobotParams;
use crate::sync::{synchronize, SyncSettings};
use crate::telemetry::TelemetryDecoder;
use crate::types::{RobotIdentity, TelemetrySnapshot};
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Baud rate a serial port is opened at before the handshake picks one.
const P2OS_INITIAL_BAUD: u32 = 9600;

/// Highest valid bumper stall policy.
const P2OS_MAX_BUMPSTALL: i32 = 3;

/// A synchronized and configured P2OS robot.
///
/// One thread owns the device and calls [`cycle`](Self::cycle) (or
/// [`run`](Self::run)); any number of others write setpoints through the
/// [`CommandHandle`] returned by [`command_handle`](Self::command_handle).
///
/// Dropping the device runs [`shutdown`](Self::shutdown).
pub struct P2osDevice<T: Link + ?Sized> {
    channel: Option<Channel<P2osHostProtocol, T>>,
    config: DriverConfig,
    identity: RobotIdentity,
    telemetry: TelemetryDecoder,
    dispatcher: CommandDispatcher,
    last_send: Instant,
}

impl P2osDevice<dyn Link> {
    /// Opens the link the configuration names, then synchronizes and
    /// configures the robot.
    ///
    /// # Example
    /// ```no_run
    /// use p2os::{DriverConfig, P2osDevice};
    ///
    /// let device = P2osDevice::connect(DriverConfig::default())?;
    /// device.command_handle().set_motor_enable(true);
    /// # Ok::<(), p2os::Error>(())
    /// ```
    pub fn connect(config: DriverConfig) -> Result<P2osDevice<dyn Link>> {
        let conn = &config.connection;
        let link: Box<dyn Link> = if conn.use_tcp {
            Box::new(TcpLink::connect(&conn.tcp_remote_host, conn.tcp_remote_port)?)
        } else {
            let baud = conn.bauds.first().copied().unwrap_or(P2OS_INITIAL_BAUD);
            Box::new(SerialLink::open(
                &conn.port,
                baud,
                config.timing.sync_receive_timeout(),
            )?)
        };
        P2osDevice::from_link(link, config)
    }
}

impl<T: Link + ?Sized> P2osDevice<T> {
    /// Synchronizes and configures the robot on an already open link.
    ///
    /// The link is dropped, and thereby closed, when the handshake fails.
    pub fn from_link(link: Box<T>, config: DriverConfig) -> Result<P2osDevice<T>> {
        info!("Connecting to robot on {}", link.describe());
        let mut channel = Channel::new(P2osHostProtocol::new(), link);
        let report = synchronize(&mut channel, &SyncSettings::from_config(&config))?;
        debug!(
            "Handshake took {} round trips (baud {:?}, stale session closed: {})",
            report.round_trips, report.baud, report.sent_close
        );

        let params = *robot_params::lookup(&report.identity.class, &report.identity.subtype);
        let limits = velocity_limits(&config, &params);
        let handle = CommandHandle::new(Duration::from_secs_f64(
            config.motion.velocity_refresh.max(0.0),
        ));

        let mut device = P2osDevice {
            channel: Some(channel),
            identity: report.identity,
            telemetry: TelemetryDecoder::new(params),
            dispatcher: CommandDispatcher::new(handle, limits),
            config,
            last_send: Instant::now(),
        };
        device.activate()?;
        Ok(device)
    }

    fn channel(&mut self) -> Result<&mut Channel<P2osHostProtocol, T>> {
        self.channel.as_mut().ok_or(Error::NotConnected)
    }

    fn write(&mut self, msg: &Message) -> Result<()> {
        trace!("Sending command {}", msg.cmd);
        self.channel()?.write(msg)?;
        self.last_send = Instant::now();
        Ok(())
    }

    fn pause(&self) {
        sleep(self.config.timing.cycle_time());
    }

    /// Opens the controller session and applies the configured settings.
    fn activate(&mut self) -> Result<()> {
        self.write(&Message::new(P2OS_CMD_OPEN))?;
        self.pause();
        self.write(&Message::new(P2OS_CMD_PULSE))?;
        self.pause();

        self.send_receive(Some(CommandFrame::word(P2OS_CMD_SONAR, 0).into()))?;

        let motion = self.config.motion.clone();
        let accel_limits = [
            (P2OS_CMD_SETA, motion.max_xaccel, motion.max_xdecel),
            (P2OS_CMD_SETRA, motion.max_yawaccel, motion.max_yawdecel),
        ];
        for (opcode, accel, decel) in accel_limits {
            if accel > 0 {
                let frame = CommandFrame::build(opcode, ArgType::SignedWord, accel)?;
                self.send_receive(Some(frame.into()))?;
            }
            if decel != 0 {
                let frame = CommandFrame::build(opcode, ArgType::SignedWord, -decel.abs())?;
                self.send_receive(Some(frame.into()))?;
            }
        }

        let pid = self.config.pid.clone();
        let gains = [
            (P2OS_CMD_ROTKP, pid.rot_kp),
            (P2OS_CMD_ROTKV, pid.rot_kv),
            (P2OS_CMD_ROTKI, pid.rot_ki),
            (P2OS_CMD_TRANSKP, pid.trans_kp),
            (P2OS_CMD_TRANSKV, pid.trans_kv),
            (P2OS_CMD_TRANSKI, pid.trans_ki),
        ];
        for (opcode, gain) in gains {
            if gain >= 0 {
                let frame = CommandFrame::build(opcode, ArgType::UnsignedWord, gain)?;
                self.send_receive(Some(frame.into()))?;
            }
        }

        let bumpstall = self.config.bumpstall;
        if bumpstall > P2OS_MAX_BUMPSTALL {
            warn!(
                "Ignoring bumpstall value {}; should be 0, 1, 2, or 3",
                bumpstall
            );
        } else if bumpstall >= 0 {
            info!("Setting bumpstall to {}", bumpstall);
            let frame = CommandFrame::build(P2OS_CMD_BUMP_STALL, ArgType::UnsignedWord, bumpstall)?;
            self.send_receive(Some(frame.into()))?;
        }

        let use_sonar = self.config.features.use_sonar;
        if use_sonar {
            self.send_receive(Some(CommandFrame::word(P2OS_CMD_SONAR, 1).into()))?;
            debug!("Sonar array powered on");
        }
        self.dispatcher.handle().seed_sonar_power(use_sonar);

        if self.config.features.use_arm {
            // the arm only talks over the controller's serial port
            if self.channel()?.stream_mut().supports_baud_rate() {
                self.telemetry.request_arm(true);
                debug!("Arm interface enabled, requesting ARMINFOPAC");
                self.send_receive(Some(Message::new(P2OS_CMD_ARM_INFO)))?;
            } else {
                warn!("Arm is not supported over TCP, disabling it");
                self.config.features.use_arm = false;
            }
        }

        self.write(&Message::new(P2OS_CMD_SETO))?;
        self.telemetry.reset_odometry();

        info!("Completed setup of {}", self.identity.hardware_id());
        Ok(())
    }

    fn power_arm(&mut self) -> Result<()> {
        debug!("Turning arm power on");
        self.send_receive(Some(CommandFrame::word(P2OS_CMD_ARM_POWER, 1).into()))?;
        self.send_receive(Some(CommandFrame::word(P2OS_CMD_ARM_STATUS, 2).into()))?;
        Ok(())
    }

    /// Sends `request` if given, then waits for the next packet and applies
    /// it to the snapshot.
    ///
    /// A missing packet is a lost link. Packets whose contents do not parse
    /// are logged and dropped.
    pub fn send_receive(&mut self, request: Option<Message>) -> Result<TelemetryUpdate> {
        if let Some(msg) = &request {
            self.write(msg)?;
        }

        let timeout = self.config.timing.link_timeout();
        let msg = match self.channel()?.receive(timeout) {
            Ok(msg) => msg,
            Err(Error::Decode(e)) => {
                error!("Receive error: {}", e);
                return Err(Error::LinkLost(e));
            }
            Err(e) => return Err(e),
        };

        let update = match self.telemetry.apply(&msg) {
            Ok(update) => update,
            Err(e) => {
                warn!("Dropping packet {:#04x}: {}", msg.cmd, e);
                TelemetryUpdate::Unexpected(msg.cmd)
            }
        };
        if let TelemetryUpdate::ArmDetected { .. } = update {
            self.power_arm()?;
        }
        Ok(update)
    }

    /// Writes the frames of every dirty setpoint. Returns whether any reply
    /// changed the snapshot.
    fn flush_commands<S>(&mut self, sink: &mut S) -> Result<bool>
    where
        S: TelemetrySink + ?Sized,
    {
        let arm_ready =
            self.telemetry.snapshot().arm.is_some() && !self.telemetry.arm_calibration().is_empty();
        let arm_calibration = self.telemetry.arm_calibration().to_vec();
        let arm = arm_ready.then(|| ArmContext {
            calibration: &arm_calibration,
            inverted_joints: self.telemetry.params().arm_inverted_joints,
        });

        let mut changed = false;
        for command in self.dispatcher.drain(arm)? {
            trace!(
                "Flushing {:?} (generation {}, {} frames)",
                command.channel,
                command.generation,
                command.frames.len()
            );
            for frame in &command.frames {
                let update = self.send_receive(Some(frame.to_message()))?;
                changed |= update.changed_snapshot();
                if let TelemetryUpdate::AuxSerial(data) = &update {
                    sink.aux_serial(data);
                }
            }
            self.dispatcher.acknowledge(&command);
        }
        Ok(changed)
    }

    /// One control loop iteration: flush setpoints, keep the link alive,
    /// receive one packet and publish the snapshot if it changed.
    ///
    /// Any receive failure ends the loop with [`Error::LinkLost`].
    pub fn cycle<S>(&mut self, sink: &mut S) -> Result<TelemetryUpdate>
    where
        S: TelemetrySink + ?Sized,
    {
        let mut changed = self.flush_commands(sink)?;

        let pulse = self.config.timing.pulse_interval();
        if self.config.timing.pulse > 0.0 && self.last_send.elapsed() >= pulse {
            trace!("Sending keep-alive");
            self.write(&Message::new(P2OS_CMD_PULSE))?;
        }

        let update = self.send_receive(None)?;
        changed |= update.changed_snapshot();
        if let TelemetryUpdate::AuxSerial(data) = &update {
            sink.aux_serial(data);
        }
        if changed {
            sink.publish(self.telemetry.snapshot(), &update);
        }
        Ok(update)
    }

    /// Runs [`cycle`](Self::cycle) at the configured frequency until `stop`
    /// is set or the link fails, then shuts the robot down.
    pub fn run<S>(&mut self, stop: &AtomicBool, sink: &mut S) -> Result<()>
    where
        S: TelemetrySink + ?Sized,
    {
        let period = self.config.timing.loop_period();
        info!("Control loop running every {:?}", period);

        let result = loop {
            if stop.load(Ordering::Relaxed) {
                info!("Stop requested");
                break Ok(());
            }
            let started = Instant::now();
            if let Err(e) = self.cycle(&mut *sink) {
                error!("Control loop aborted: {}", e);
                break Err(e);
            }
            let elapsed = started.elapsed();
            if elapsed < period {
                sleep(period - elapsed);
            }
        };

        self.shutdown();
        result
    }

    /// Stops the robot and ends the session. Failures are logged, and calling
    /// it again does nothing.
    pub fn shutdown(&mut self) {
        if self.channel.is_none() {
            return;
        }
        if let Err(e) = self.write(&Message::new(P2OS_CMD_STOP)) {
            warn!("Failed to send STOP: {}", e);
        }
        self.pause();
        if let Err(e) = self.write(&Message::new(P2OS_CMD_CLOSE)) {
            warn!("Failed to send CLOSE: {}", e);
        }
        self.pause();
        self.channel = None;
        info!("P2OS has been shutdown");
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// A handle for writing setpoints from other threads.
    pub fn command_handle(&self) -> CommandHandle {
        self.dispatcher.handle().clone()
    }

    pub fn snapshot(&self) -> &TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn identity(&self) -> &RobotIdentity {
        &self.identity
    }

    pub fn hardware_id(&self) -> String {
        self.identity.hardware_id()
    }

    pub fn robot_params(&self) -> &RobotParams {
        self.telemetry.params()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl<T: Link + ?Sized> Drop for P2osDevice<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Configured speed limits, falling back to the robot model's.
fn velocity_limits(config: &DriverConfig, params: &RobotParams) -> VelocityLimits {
    VelocityLimits {
        max_trans_mm_s: config
            .motion
            .max_xspeed
            .map_or(params.max_trans_vel, |v| v * 1e3),
        max_rot_deg_s: config
            .motion
            .max_yawspeed
            .map_or(params.max_rot_vel, f64::to_degrees),
    }
}

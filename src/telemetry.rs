use crate::answers::*;
use crate::base::{Message, Result};
use crate::parsers::arm_parser::{parse_arm_info, parse_arm_status};
use crate::parsers::standard_parser::parse_standard_sip;
use crate::robot_params::RobotParams;
use crate::types::*;
use crate::utils::{ms_per_tick_to_rads_per_sec, position_change, ticks_to_radians, POSITION_WRAP};
use log::{debug, info, trace, warn};
use std::f64::consts::PI;

/// Odometry steps larger than this (mm) between two packets are discarded.
const MAX_ODOMETRY_STEP_MM: f64 = 100.0;

// gripper byte
const GRIP_OPEN: u8 = 0x01;
const GRIP_CLOSED: u8 = 0x02;
const GRIP_MOVING: u8 = 0x04;
const LIFT_UP: u8 = 0x10;
const LIFT_DOWN: u8 = 0x20;

// digital inputs wired to the gripper
const DIGIN_OUTER_BEAM: u8 = 0x04;
const DIGIN_INNER_BEAM: u8 = 0x08;
const DIGIN_LEFT_PADDLE: u8 = 0x10;
const DIGIN_RIGHT_PADDLE: u8 = 0x20;

/// What a decoded packet changed.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryUpdate {
    /// A standard status packet refreshed the snapshot.
    Standard,
    /// Joint state refreshed.
    ArmState,
    /// Arm calibration received, nothing to activate.
    ArmInfo,
    /// An arm was reported for the first time while arm support is
    /// requested; it needs powering up.
    ArmDetected { joints: usize },
    /// Bytes forwarded from the auxiliary serial port.
    AuxSerial(Vec<u8>),
    /// Valid packet of a type the decoder does not handle; nothing changed.
    Unexpected(u8),
}

impl TelemetryUpdate {
    /// Whether the snapshot differs from before.
    pub fn changed_snapshot(&self) -> bool {
        matches!(
            self,
            TelemetryUpdate::Standard
                | TelemetryUpdate::ArmState
                | TelemetryUpdate::ArmDetected { .. }
        )
    }
}

/// Turns validated packets into the typed [`TelemetrySnapshot`].
#[derive(Debug, Clone)]
pub struct TelemetryDecoder {
    params: RobotParams,
    snapshot: TelemetrySnapshot,
    raw_position: Option<(u16, u16)>,
    arm_requested: bool,
    arm_calibration: Vec<ArmJointCalibration>,
}

impl TelemetryDecoder {
    pub fn new(params: RobotParams) -> TelemetryDecoder {
        TelemetryDecoder {
            params,
            snapshot: TelemetrySnapshot::default(),
            raw_position: None,
            arm_requested: false,
            arm_calibration: Vec::new(),
        }
    }

    pub fn params(&self) -> &RobotParams {
        &self.params
    }

    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    /// Calibration of each arm joint, empty until an `ARMINFOPAC` arrived.
    pub fn arm_calibration(&self) -> &[ArmJointCalibration] {
        &self.arm_calibration
    }

    /// Arm activation only happens after this is set.
    pub fn request_arm(&mut self, requested: bool) {
        self.arm_requested = requested;
    }

    /// Forgets accumulated odometry, matching a `SETO` sent to the robot.
    pub fn reset_odometry(&mut self) {
        self.raw_position = None;
        self.snapshot.odometry.x_mm = 0.0;
        self.snapshot.odometry.y_mm = 0.0;
    }

    /// Applies one packet to the snapshot.
    ///
    /// Malformed payloads return an error and leave the snapshot untouched.
    pub fn apply(&mut self, msg: &Message) -> Result<TelemetryUpdate> {
        match msg.cmd {
            ty if is_standard_sip(ty) => {
                let sip = parse_standard_sip(&msg.data)?;
                self.apply_standard(&sip);
                Ok(TelemetryUpdate::Standard)
            }
            P2OS_ANS_TYPE_SERAUX => Ok(TelemetryUpdate::AuxSerial(msg.data.clone())),
            P2OS_ANS_TYPE_ARMPAC => {
                let status = parse_arm_status(&msg.data)?;
                Ok(self.apply_arm_status(&status))
            }
            P2OS_ANS_TYPE_ARMINFOPAC => {
                let arm_info = parse_arm_info(&msg.data)?;
                Ok(self.apply_arm_info(arm_info))
            }
            other => {
                warn!("Dropping unexpected packet type {:#04x}", other);
                Ok(TelemetryUpdate::Unexpected(other))
            }
        }
    }

    fn integrate_axis(&self, accumulated: &mut f64, from: u16, to: u16, axis: &str) {
        let change = (f64::from(position_change(from, to)) * self.params.dist_conv).round();
        if change.abs() > MAX_ODOMETRY_STEP_MM {
            warn!(
                "Invalid odometry change {} mm on {}; odometry values are tainted",
                change, axis
            );
        } else {
            *accumulated += change;
        }
    }

    fn apply_standard(&mut self, sip: &StandardSip) {
        let wrap = POSITION_WRAP as u16;
        let xpos = sip.xpos % wrap;
        let ypos = sip.ypos % wrap;
        let mut x_mm = self.snapshot.odometry.x_mm;
        let mut y_mm = self.snapshot.odometry.y_mm;
        match self.raw_position {
            Some((raw_x, raw_y)) => {
                self.integrate_axis(&mut x_mm, raw_x, xpos, "x");
                self.integrate_axis(&mut y_mm, raw_y, ypos, "y");
            }
            None => {
                x_mm = 0.0;
                y_mm = 0.0;
            }
        }
        self.raw_position = Some((xpos, ypos));

        let left = (f64::from(sip.left_velocity) * self.params.vel_conv).round();
        let right = (f64::from(sip.right_velocity) * self.params.vel_conv).round();
        self.snapshot.odometry = Odometry {
            x_mm,
            y_mm,
            heading_deg: (f64::from(sip.angle) * self.params.angle_conv * 180.0 / PI).round(),
            left_wheel_mm_s: left,
            right_wheel_mm_s: right,
            linear: (left + right) / 2.0 / 1e3,
            angular: (right - left) * self.params.diff_conv / 2.0,
        };

        self.snapshot.battery = BatteryState { raw: sip.battery };
        self.snapshot.motors = MotorState {
            enabled: sip.flags & P2OS_SIP_FLAG_MOTORS_ENABLED != 0,
            left_stalled: sip.left_stall_bumpers & P2OS_SIP_STALL_BIT != 0,
            right_stalled: sip.right_stall_bumpers & P2OS_SIP_STALL_BIT != 0,
        };
        self.snapshot.bumpers = Bumpers {
            front: sip.right_stall_bumpers >> 1,
            rear: sip.left_stall_bumpers >> 1,
        };
        self.snapshot.compass = sip.compass;

        self.apply_sonar(&sip.sonars);

        self.snapshot.io = IoState {
            digital_in: sip.digin,
            digital_out: sip.digout,
            analog_raw: sip.analog,
        };
        self.snapshot.gripper = decode_gripper(sip.timer.to_le_bytes()[0], sip.digin);
    }

    fn apply_sonar(&mut self, readings: &[(u8, u16)]) {
        let sonar = &mut self.snapshot.sonar;
        sonar.updated.clear();
        for &(index, range) in readings {
            let index = index as usize;
            if index >= self.params.sonar_count {
                trace!("Ignoring reading of sonar {} beyond the array", index);
                continue;
            }
            if sonar.ranges_mm.len() <= index {
                sonar.ranges_mm.resize(index + 1, 0);
            }
            sonar.ranges_mm[index] = (f64::from(range) * self.params.range_conv).round() as u16;
            sonar.updated.push(index);
        }
    }

    fn apply_arm_info(&mut self, arm_info: ArmInfo) -> TelemetryUpdate {
        debug!("Arm version: {}", arm_info.version);
        let has_arm = arm_info.has_arm();
        let ArmInfo { version, joints } = arm_info;
        self.arm_calibration = joints;
        let count = self.arm_calibration.len();

        if let Some(arm) = self.snapshot.arm.as_mut() {
            if arm.joints.len() != count {
                debug!("Arm now reports {} joints, was {}", count, arm.joints.len());
                arm.joints.resize(count, idle_joint());
            }
            arm.version = version;
            return TelemetryUpdate::ArmInfo;
        }
        if !has_arm || !self.arm_requested {
            return TelemetryUpdate::ArmInfo;
        }

        info!("Arm detected ({}), {} joints", version, count);
        self.snapshot.arm = Some(ArmState {
            version,
            powered: false,
            connected: false,
            joints: vec![idle_joint(); count],
        });
        TelemetryUpdate::ArmDetected { joints: count }
    }

    fn apply_arm_status(&mut self, status: &ArmStatus) -> TelemetryUpdate {
        let inverted = self.params.arm_inverted_joints;
        let Some(arm) = self.snapshot.arm.as_mut() else {
            trace!("Arm status before arm activation, ignoring");
            return TelemetryUpdate::Unexpected(P2OS_ANS_TYPE_ARMPAC);
        };
        arm.powered = status.status & P2OS_ARM_STATUS_POWER != 0;
        arm.connected = status.status & P2OS_ARM_STATUS_CONNECTED != 0;

        for (i, (joint, cal)) in arm
            .joints
            .iter_mut()
            .zip(self.arm_calibration.iter())
            .enumerate()
            .take(P2OS_ARM_JOINTS)
        {
            let ticks = status.joint_ticks[i];
            let moving = status.motion & (1 << i) != 0;
            *joint = ArmJointState {
                ticks,
                moving,
                position: ticks_to_radians(cal, i < inverted, ticks),
                velocity: if moving {
                    ms_per_tick_to_rads_per_sec(cal, cal.speed)
                } else {
                    0.0
                },
                effort: -1.0,
            };
        }
        TelemetryUpdate::ArmState
    }
}

/// Joint with no status received yet.
fn idle_joint() -> ArmJointState {
    ArmJointState {
        effort: -1.0,
        ..Default::default()
    }
}

/// Gripper and lift state from the SIP gripper byte and the digital inputs
/// the gripper sensors are wired to.
fn decode_gripper(bits: u8, digin: u8) -> GripperState {
    let grip_status = if bits & GRIP_OPEN != 0 && bits & GRIP_CLOSED != 0 {
        GripStatus::Error
    } else if bits & GRIP_MOVING != 0 {
        GripStatus::Moving
    } else if bits & GRIP_OPEN != 0 {
        GripStatus::Open
    } else if bits & GRIP_CLOSED != 0 {
        GripStatus::Closed
    } else {
        GripStatus::Error
    };

    let (lift_status, position) = match (bits & LIFT_UP != 0, bits & LIFT_DOWN != 0) {
        (true, true) => (LiftStatus::Error, -1.0),
        (true, false) => (LiftStatus::Up, 1.0),
        (false, true) => (LiftStatus::Down, 0.0),
        (false, false) => (LiftStatus::Moving, -1.0),
    };

    GripperState {
        grip: GripState {
            status: grip_status,
            inner_beam: digin & DIGIN_INNER_BEAM != 0,
            outer_beam: digin & DIGIN_OUTER_BEAM != 0,
            // paddle switches pull low on contact
            left_contact: digin & DIGIN_LEFT_PADDLE == 0,
            right_contact: digin & DIGIN_RIGHT_PADDLE == 0,
        },
        lift: LiftState {
            status: lift_status,
            position,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::standard_parser::tests::sip_payload;
    use approx::assert_relative_eq;

    fn params() -> RobotParams {
        RobotParams {
            class: "Test",
            subtype: "unit",
            angle_conv: PI / 2048.0,
            dist_conv: 1.0,
            vel_conv: 1.0,
            diff_conv: 0.0056,
            range_conv: 1.0,
            sonar_count: 16,
            max_trans_vel: 1000.0,
            max_rot_vel: 360.0,
            arm_inverted_joints: 3,
        }
    }

    fn sip_message(sip: &StandardSip) -> Message {
        Message::with_data(0x32, &sip_payload(sip))
    }

    fn base_sip() -> StandardSip {
        StandardSip {
            xpos: 1000,
            ypos: 2000,
            angle: 512,
            left_velocity: 100,
            right_velocity: 300,
            battery: 121,
            left_stall_bumpers: 0x05,
            right_stall_bumpers: 0x00,
            flags: 0x0001,
            compass: 45,
            timer: 0x0011,
            analog: 102,
            digin: 0x3C,
            digout: 0x01,
            ..Default::default()
        }
    }

    #[test]
    fn standard_packet_fills_snapshot() {
        let mut decoder = TelemetryDecoder::new(params());
        let update = decoder.apply(&sip_message(&base_sip())).unwrap();
        assert_eq!(update, TelemetryUpdate::Standard);

        let snapshot = decoder.snapshot();
        assert_eq!(snapshot.odometry.x_mm, 0.0);
        assert_eq!(snapshot.odometry.heading_deg, 45.0);
        assert_relative_eq!(snapshot.odometry.linear, 0.2);
        assert_relative_eq!(snapshot.odometry.angular, 200.0 * 0.0056 / 2.0);
        assert_relative_eq!(snapshot.battery.voltage(), 12.1);
        assert!(snapshot.motors.enabled);
        assert!(snapshot.motors.left_stalled);
        assert!(!snapshot.motors.right_stalled);
        assert_eq!(snapshot.bumpers.rear, 0x02);
        assert_eq!(snapshot.gripper.grip.status, GripStatus::Open);
        assert_eq!(snapshot.gripper.lift.status, LiftStatus::Up);
        assert_eq!(snapshot.gripper.lift.position, 1.0);
        assert!(snapshot.gripper.grip.inner_beam);
        assert!(!snapshot.gripper.grip.left_contact);
        assert_relative_eq!(snapshot.io.analog_voltage(), 2.0);
    }

    #[test]
    fn sonar_readings_only_touch_their_entries() {
        let mut decoder = TelemetryDecoder::new(params());
        decoder.apply(&sip_message(&base_sip())).unwrap();
        let before = decoder.snapshot().clone();

        let with_sonar = StandardSip {
            sonars: vec![(0, 1500), (1, 3000)],
            ..base_sip()
        };
        decoder.apply(&sip_message(&with_sonar)).unwrap();
        let after = decoder.snapshot();

        assert_eq!(after.sonar.ranges_mm.len(), 2);
        assert_eq!(after.sonar.range(0), Some(1.5));
        assert_eq!(after.sonar.range(1), Some(3.0));
        assert_eq!(after.sonar.updated, vec![0, 1]);

        let mut expected = before;
        expected.sonar = after.sonar.clone();
        assert_eq!(after, &expected);
    }

    #[test]
    fn sonar_beyond_array_is_ignored() {
        let mut decoder = TelemetryDecoder::new(params());
        let sip = StandardSip {
            sonars: vec![(3, 800), (40, 900)],
            ..base_sip()
        };
        decoder.apply(&sip_message(&sip)).unwrap();
        assert_eq!(decoder.snapshot().sonar.ranges_mm, vec![0, 0, 0, 800]);
    }

    #[test]
    fn odometry_wraps_and_rejects_jumps() {
        let mut decoder = TelemetryDecoder::new(params());
        let at = |xpos, ypos| {
            sip_message(&StandardSip {
                xpos,
                ypos,
                ..base_sip()
            })
        };
        decoder.apply(&at(4090, 10)).unwrap();
        decoder.apply(&at(20, 10)).unwrap();
        assert_eq!(decoder.snapshot().odometry.x_mm, 26.0);

        // 500 mm in one step is not believable
        decoder.apply(&at(520, 10)).unwrap();
        assert_eq!(decoder.snapshot().odometry.x_mm, 26.0);

        decoder.apply(&at(530, 5)).unwrap();
        assert_eq!(decoder.snapshot().odometry.x_mm, 36.0);
        assert_eq!(decoder.snapshot().odometry.y_mm, -5.0);

        decoder.reset_odometry();
        decoder.apply(&at(600, 600)).unwrap();
        assert_eq!(decoder.snapshot().odometry.x_mm, 0.0);
    }

    fn arm_info_with_joints(version: &str, joints: u8) -> Message {
        let mut data = version.as_bytes().to_vec();
        data.push(0);
        data.push(joints);
        for _ in 0..joints {
            data.extend_from_slice(&[20, 100, 0, 100, 200, 90]);
        }
        Message::with_data(P2OS_ANS_TYPE_ARMINFOPAC, &data)
    }

    fn arm_info_message(version: &str) -> Message {
        arm_info_with_joints(version, 2)
    }

    #[test]
    fn arm_detected_once_when_requested() {
        let mut decoder = TelemetryDecoder::new(params());
        assert_eq!(
            decoder.apply(&arm_info_message("P2 Arm")).unwrap(),
            TelemetryUpdate::ArmInfo
        );
        assert!(decoder.snapshot().arm.is_none());

        decoder.request_arm(true);
        assert_eq!(
            decoder.apply(&arm_info_message("P2 Arm")).unwrap(),
            TelemetryUpdate::ArmDetected { joints: 2 }
        );
        assert_eq!(
            decoder.apply(&arm_info_message("P2 Arm")).unwrap(),
            TelemetryUpdate::ArmInfo
        );
    }

    #[test]
    fn no_arm_version_never_activates() {
        let mut decoder = TelemetryDecoder::new(params());
        decoder.request_arm(true);
        assert_eq!(
            decoder.apply(&arm_info_message("No arm")).unwrap(),
            TelemetryUpdate::ArmInfo
        );
        assert!(decoder.snapshot().arm.is_none());
    }

    #[test]
    fn arm_status_converts_joint_ticks() {
        let mut decoder = TelemetryDecoder::new(params());
        decoder.request_arm(true);
        decoder.apply(&arm_info_message("P2 Arm")).unwrap();

        let status = Message::with_data(
            P2OS_ANS_TYPE_ARMPAC,
            &[0x03, 0x02, 145, 145, 0, 0, 0, 0],
        );
        assert_eq!(decoder.apply(&status).unwrap(), TelemetryUpdate::ArmState);

        let arm = decoder.snapshot().arm.as_ref().unwrap();
        assert!(arm.powered && arm.connected);
        assert_eq!(arm.joints.len(), 2);
        assert_relative_eq!(arm.joints[0].position, (-45f64).to_radians());
        assert_eq!(arm.joints[0].velocity, 0.0);
        assert!(arm.joints[1].moving);
        assert_relative_eq!(arm.joints[1].velocity, 50f64.to_radians(), epsilon = 1e-12);
        assert_eq!(arm.joints[1].effort, -1.0);
    }

    #[test]
    fn joint_list_follows_later_arm_info() {
        let mut decoder = TelemetryDecoder::new(params());
        decoder.request_arm(true);
        decoder.apply(&arm_info_message("P2 Arm")).unwrap();

        assert_eq!(
            decoder.apply(&arm_info_with_joints("P2 Arm v2", 1)).unwrap(),
            TelemetryUpdate::ArmInfo
        );
        let arm = decoder.snapshot().arm.as_ref().unwrap();
        assert_eq!(arm.version, "P2 Arm v2");
        assert_eq!(arm.joints.len(), 1);
        assert_eq!(decoder.arm_calibration().len(), 1);

        let status = Message::with_data(
            P2OS_ANS_TYPE_ARMPAC,
            &[0x03, 0x02, 145, 145, 0, 0, 0, 0],
        );
        decoder.apply(&status).unwrap();
        let arm = decoder.snapshot().arm.as_ref().unwrap();
        assert_eq!(arm.joints.len(), 1);
        assert_relative_eq!(arm.joints[0].position, (-45f64).to_radians());

        decoder.apply(&arm_info_with_joints("P2 Arm v2", 3)).unwrap();
        let arm = decoder.snapshot().arm.as_ref().unwrap();
        assert_eq!(arm.joints.len(), 3);
        assert_eq!(arm.joints[2].effort, -1.0);
        assert!(!arm.joints[2].moving);
    }

    #[test]
    fn unknown_packets_are_reported_not_applied() {
        let mut decoder = TelemetryDecoder::new(params());
        assert_eq!(
            decoder.apply(&Message::new(0x77)).unwrap(),
            TelemetryUpdate::Unexpected(0x77)
        );
        assert_eq!(
            decoder.apply(&Message::with_data(P2OS_ANS_TYPE_SERAUX, &[1, 2])).unwrap(),
            TelemetryUpdate::AuxSerial(vec![1, 2])
        );
        assert!(decoder.apply(&Message::with_data(0x32, &[0; 4])).is_err());
        assert_eq!(decoder.snapshot(), &TelemetrySnapshot::default());
    }
}

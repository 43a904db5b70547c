// Incoming packet types

/// Lowest standard status (SIP) packet type. The low nibble flags whether
/// the motors are stopped, so five types are in use.
pub const P2OS_ANS_TYPE_SIP_FIRST: u8 = 0x30;

/// Highest standard status (SIP) packet type.
pub const P2OS_ANS_TYPE_SIP_LAST: u8 = 0x34;

/// Bytes forwarded from the robot's auxiliary serial port.
pub const P2OS_ANS_TYPE_SERAUX: u8 = 0xB0;

/// Arm joint state.
pub const P2OS_ANS_TYPE_ARMPAC: u8 = 0xA0;

/// Arm capabilities and calibration.
pub const P2OS_ANS_TYPE_ARMINFOPAC: u8 = 0xA1;

/// Returns `true` if `ty` is one of the standard status packet types.
#[inline]
pub fn is_standard_sip(ty: u8) -> bool {
    (P2OS_ANS_TYPE_SIP_FIRST..=P2OS_ANS_TYPE_SIP_LAST).contains(&ty)
}

/// Number of joints an `ARMPAC` always reports.
pub const P2OS_ARM_JOINTS: usize = 6;

// SIP bit fields

/// Set in the SIP flags word while the drive motors are enabled.
pub const P2OS_SIP_FLAG_MOTORS_ENABLED: u16 = 0x0001;

/// Wheel stall bit in the low bit of each stall/bumper byte.
pub const P2OS_SIP_STALL_BIT: u8 = 0x01;

// ARMPAC status bits

pub const P2OS_ARM_STATUS_POWER: u8 = 0x01;
pub const P2OS_ARM_STATUS_CONNECTED: u8 = 0x02;

/// A standard status packet with every field in its wire units.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StandardSip {
    /// 12-bit wrapping wheel position counters.
    pub xpos: u16,
    pub ypos: u16,
    /// Heading in controller angle units.
    pub angle: i16,
    pub left_velocity: i16,
    pub right_velocity: i16,
    /// Battery voltage in tenths of a volt.
    pub battery: u8,
    /// Bit 0 left wheel stall, upper bits rear bumpers.
    pub left_stall_bumpers: u8,
    /// Bit 0 right wheel stall, upper bits front bumpers.
    pub right_stall_bumpers: u8,
    pub control: i16,
    pub flags: u16,
    pub compass: u8,
    /// Sonar readings present in this packet as (index, raw range).
    pub sonars: Vec<(u8, u16)>,
    /// Gripper state in the low byte.
    pub timer: u16,
    pub analog: u8,
    pub digin: u8,
    pub digout: u8,
}

/// Joint state reported by an `ARMPAC`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArmStatus {
    pub status: u8,
    /// One bit per joint, set while the joint is moving.
    pub motion: u8,
    pub joint_ticks: [u8; P2OS_ARM_JOINTS],
}

/// Per-joint calibration from an `ARMINFOPAC`.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ArmJointCalibration {
    /// Servo speed, milliseconds per tick.
    pub speed: u8,
    pub home: u8,
    pub min: u8,
    pub centre: u8,
    pub max: u8,
    pub ticks_per_90: u8,
}

/// Arm description from an `ARMINFOPAC`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArmInfo {
    pub version: String,
    pub joints: Vec<ArmJointCalibration>,
}

impl ArmInfo {
    /// The firmware reports `"No arm"` when nothing is attached.
    pub fn has_arm(&self) -> bool {
        !self.version.contains("No arm")
    }
}

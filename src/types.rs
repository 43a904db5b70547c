use std::f64::consts::PI;

/// Identity strings the robot reports at the end of the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RobotIdentity {
    pub name: String,
    pub class: String,
    pub subtype: String,
}

impl RobotIdentity {
    /// The `"<name>: <class>/<subtype>"` string used as the hardware id in
    /// diagnostics.
    pub fn hardware_id(&self) -> String {
        format!("{}: {}/{}", self.name, self.class, self.subtype)
    }
}

/// Integrated wheel odometry and the current twist.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Odometry {
    /// Accumulated position in millimetres since the last reset.
    pub x_mm: f64,
    pub y_mm: f64,
    /// Heading in whole degrees, as the controller reports it.
    pub heading_deg: f64,
    pub left_wheel_mm_s: f64,
    pub right_wheel_mm_s: f64,
    /// Forward speed, m/s.
    pub linear: f64,
    /// Yaw rate, rad/s.
    pub angular: f64,
}

impl Odometry {
    #[inline]
    pub fn x(&self) -> f64 {
        self.x_mm / 1e3
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.y_mm / 1e3
    }

    /// Heading in radians.
    #[inline]
    pub fn yaw(&self) -> f64 {
        self.heading_deg * PI / 180.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct BatteryState {
    /// Voltage in tenths of a volt.
    pub raw: u8,
}

impl BatteryState {
    #[inline]
    pub fn voltage(&self) -> f64 {
        f64::from(self.raw) / 10.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct MotorState {
    pub enabled: bool,
    pub left_stalled: bool,
    pub right_stalled: bool,
}

/// Bumper bits, one per bumper segment.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Bumpers {
    pub front: u8,
    pub rear: u8,
}

/// Sonar ranges indexed by physical transducer number.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SonarState {
    /// Ranges in millimetres. Grows to the highest index seen so far.
    pub ranges_mm: Vec<u16>,
    /// Indices refreshed by the most recent status packet.
    pub updated: Vec<usize>,
}

impl SonarState {
    /// Range of transducer `index` in metres.
    pub fn range(&self, index: usize) -> Option<f64> {
        self.ranges_mm.get(index).map(|&mm| f64::from(mm) / 1e3)
    }
}

/// Digital and analog IO lines.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct IoState {
    pub digital_in: u8,
    pub digital_out: u8,
    pub analog_raw: u8,
}

impl IoState {
    /// State of the eight digital inputs, bit 0 first.
    pub fn digital_inputs(&self) -> [bool; 8] {
        let mut bits = [false; 8];
        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = self.digital_in & (1 << i) != 0;
        }
        bits
    }

    /// Analog input voltage on a 0..5 V scale.
    pub fn analog_voltage(&self) -> f64 {
        f64::from(self.analog_raw) / 255.0 * 5.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum GripStatus {
    #[default]
    Open,
    Closed,
    Moving,
    Error,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LiftStatus {
    #[default]
    Up,
    Down,
    Moving,
    Error,
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct GripState {
    pub status: GripStatus,
    pub inner_beam: bool,
    pub outer_beam: bool,
    pub left_contact: bool,
    pub right_contact: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct LiftState {
    pub status: LiftStatus,
    /// 1.0 fully up, 0.0 fully down, -1.0 in between or unknown.
    pub position: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct GripperState {
    pub grip: GripState,
    pub lift: LiftState,
}

/// Gripper paddle commands (argument of the `GRIPPER` opcode).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GripAction {
    Open = 1,
    Close = 2,
    Stop = 3,
}

/// Lift commands (argument of the `GRIPPER` opcode).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LiftAction {
    Up = 4,
    Down = 5,
    Stop = 6,
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ArmJointState {
    pub ticks: u8,
    pub moving: bool,
    /// Joint angle, radians.
    pub position: f64,
    /// Estimated speed while moving, rad/s.
    pub velocity: f64,
    /// No effort sensing exists; always -1.
    pub effort: f64,
}

/// Arm state assembled from `ARMINFOPAC` and `ARMPAC` packets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArmState {
    pub version: String,
    pub powered: bool,
    pub connected: bool,
    pub joints: Vec<ArmJointState>,
}

/// Everything the driver knows about the robot, refreshed by each decoded
/// packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub odometry: Odometry,
    pub battery: BatteryState,
    pub motors: MotorState,
    pub bumpers: Bumpers,
    pub compass: u8,
    pub sonar: SonarState,
    pub io: IoState,
    pub gripper: GripperState,
    /// Present once the arm has been detected and activated.
    pub arm: Option<ArmState>,
}

use log::warn;

/// Calibration of one robot model.
///
/// Conversion factors turn raw SIP units into millimetres, mm/s, degrees
/// and so on. Maximum speeds are in mm/s and deg/s.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RobotParams {
    pub class: &'static str,
    pub subtype: &'static str,
    /// Controller angle units to radians.
    pub angle_conv: f64,
    /// Wheel position counts to millimetres.
    pub dist_conv: f64,
    /// Raw wheel velocity to mm/s.
    pub vel_conv: f64,
    /// Wheel speed difference to rad/s, 1/mm.
    pub diff_conv: f64,
    /// Raw sonar reading to millimetres.
    pub range_conv: f64,
    pub sonar_count: usize,
    pub max_trans_vel: f64,
    pub max_rot_vel: f64,
    /// Arm joints `0..arm_inverted_joints` are mounted mirrored and have
    /// their angle sign flipped.
    pub arm_inverted_joints: usize,
}

const fn pioneer(
    subtype: &'static str,
    dist_conv: f64,
    diff_conv: f64,
    sonar_count: usize,
    max_trans_vel: f64,
    max_rot_vel: f64,
) -> RobotParams {
    RobotParams {
        class: "Pioneer",
        subtype,
        angle_conv: 0.001534,
        dist_conv,
        vel_conv: 1.0,
        diff_conv,
        range_conv: 1.0,
        sonar_count,
        max_trans_vel,
        max_rot_vel,
        arm_inverted_joints: 3,
    }
}

/// Known robot models. Entry 0 is the fallback for unknown models.
pub static ROBOT_PARAMS: &[RobotParams] = &[
    pioneer("p2de", 0.969, 0.0056, 16, 1000.0, 360.0),
    pioneer("p2dx", 0.840, 0.0056, 16, 1000.0, 360.0),
    pioneer("p2at", 1.32, 0.0034, 16, 1200.0, 300.0),
    pioneer("p3dx-sh", 0.485, 0.0056, 16, 1500.0, 360.0),
    pioneer("p3at-sh", 0.465, 0.0034, 16, 1200.0, 300.0),
    pioneer("peoplebot-sh", 0.485, 0.0056, 24, 1200.0, 360.0),
    pioneer("powerbot", 0.5, 0.00373, 32, 2200.0, 100.0),
    pioneer("amigo", 0.5083, 0.011, 8, 1000.0, 360.0),
];

/// Finds the profile for a robot by case-insensitive (class, subtype)
/// match, falling back to the first entry.
pub fn lookup(class: &str, subtype: &str) -> &'static RobotParams {
    ROBOT_PARAMS
        .iter()
        .find(|p| p.class.eq_ignore_ascii_case(class) && p.subtype.eq_ignore_ascii_case(subtype))
        .unwrap_or_else(|| {
            warn!(
                "Unknown robot model {}/{}, using {} parameters",
                class, subtype, ROBOT_PARAMS[0].subtype
            );
            &ROBOT_PARAMS[0]
        })
}

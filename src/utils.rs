use crate::answers::ArmJointCalibration;

/// Wheel position counters wrap at this value.
pub const POSITION_WRAP: i32 = 4096;

/// Signed change between two wrapping 12-bit position readings, taking
/// whichever direction around the wrap is shorter.
pub fn position_change(from: u16, to: u16) -> i32 {
    let (from, to) = (i32::from(from), i32::from(to));
    let direct = to - from;
    let wrapped = if to > from {
        direct - POSITION_WRAP
    } else {
        direct + POSITION_WRAP
    };
    if direct.abs() < wrapped.abs() {
        direct
    } else {
        wrapped
    }
}

/// Joint angle in degrees for a raw servo position.
///
/// Joints mounted mirrored (`inverted`) have their sign flipped.
pub fn ticks_to_degrees(cal: &ArmJointCalibration, inverted: bool, ticks: u8) -> f64 {
    if cal.ticks_per_90 == 0 {
        return 0.0;
    }
    let offset = f64::from(ticks) - f64::from(cal.centre);
    let degrees = 90.0 / f64::from(cal.ticks_per_90) * offset;
    if inverted {
        -degrees
    } else {
        degrees
    }
}

/// Servo position for a joint angle, saturated to the joint's limits.
pub fn degrees_to_ticks(cal: &ArmJointCalibration, inverted: bool, degrees: f64) -> u8 {
    let mut ticks = (f64::from(cal.ticks_per_90) * degrees / 90.0).round();
    if inverted {
        ticks = -ticks;
    }
    ticks += f64::from(cal.centre);
    // limits come from the robot and are not guaranteed to be ordered
    let (min, max) = (f64::from(cal.min), f64::from(cal.max));
    if ticks < min {
        cal.min
    } else if ticks > max {
        cal.max
    } else {
        ticks as u8
    }
}

#[inline]
pub fn ticks_to_radians(cal: &ArmJointCalibration, inverted: bool, ticks: u8) -> f64 {
    ticks_to_degrees(cal, inverted, ticks).to_radians()
}

#[inline]
pub fn radians_to_ticks(cal: &ArmJointCalibration, inverted: bool, radians: f64) -> u8 {
    degrees_to_ticks(cal, inverted, radians.to_degrees())
}

/// Joint speed in rad/s for a servo speed given in milliseconds per tick.
pub fn ms_per_tick_to_rads_per_sec(cal: &ArmJointCalibration, ms_per_tick: u8) -> f64 {
    if ms_per_tick == 0 || cal.ticks_per_90 == 0 {
        return 0.0;
    }
    let ticks_per_sec = 1000.0 / f64::from(ms_per_tick);
    let ticks_per_degree = f64::from(cal.ticks_per_90) / 90.0;
    (ticks_per_sec / ticks_per_degree).to_radians()
}

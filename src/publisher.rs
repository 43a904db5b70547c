//! Outbound boundary: what the control loop hands to the hosting
//! application once per cycle, and the shapes the per-sensor messages take.

use crate::telemetry::TelemetryUpdate;
use crate::types::{ArmState, TelemetrySnapshot};

/// Field of view of one sonar transducer, radians.
pub const SONAR_FIELD_OF_VIEW: f64 = (15.0 / 180.0) * 3.14;

pub const SONAR_MIN_RANGE: f64 = 0.0;

pub const SONAR_MAX_RANGE: f64 = 10.0;

/// Receives the refreshed snapshot after every packet that changed it.
///
/// Called on the control loop's thread; implementations should return
/// quickly.
pub trait TelemetrySink {
    fn publish(&mut self, snapshot: &TelemetrySnapshot, update: &TelemetryUpdate);

    /// Bytes the robot forwarded from its auxiliary serial port.
    fn aux_serial(&mut self, _data: &[u8]) {}
}

impl<F> TelemetrySink for F
where
    F: FnMut(&TelemetrySnapshot, &TelemetryUpdate),
{
    fn publish(&mut self, snapshot: &TelemetrySnapshot, update: &TelemetryUpdate) {
        self(snapshot, update)
    }
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn publish(&mut self, _snapshot: &TelemetrySnapshot, _update: &TelemetryUpdate) {}
}

/// Range reading of one sonar transducer.
#[derive(Debug, Clone, PartialEq)]
pub struct SonarReading {
    /// `/Sonar_<n>`, numbered from 1.
    pub frame_id: String,
    pub field_of_view: f64,
    pub min_range: f64,
    pub max_range: f64,
    /// Metres.
    pub range: f64,
}

/// One reading per physically indexed transducer, in index order.
pub fn sonar_readings(snapshot: &TelemetrySnapshot) -> Vec<SonarReading> {
    snapshot
        .sonar
        .ranges_mm
        .iter()
        .enumerate()
        .map(|(i, &mm)| SonarReading {
            frame_id: format!("/Sonar_{}", i + 1),
            field_of_view: SONAR_FIELD_OF_VIEW,
            min_range: SONAR_MIN_RANGE,
            max_range: SONAR_MAX_RANGE,
            range: f64::from(mm) / 1e3,
        })
        .collect()
}

/// Digital and analog IO vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct IoReading {
    pub digital: Vec<bool>,
    /// Volts.
    pub analog: Vec<f64>,
}

pub fn io_reading(snapshot: &TelemetrySnapshot) -> IoReading {
    IoReading {
        digital: snapshot.io.digital_inputs().to_vec(),
        analog: vec![snapshot.io.analog_voltage()],
    }
}

/// Arm joint state in parallel arrays, joint 0 first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JointStates {
    pub names: Vec<String>,
    /// Radians.
    pub position: Vec<f64>,
    /// rad/s, estimated from the configured joint speed.
    pub velocity: Vec<f64>,
    /// Always -1; the arm has no effort sensing.
    pub effort: Vec<f64>,
}

pub fn joint_states(arm: &ArmState) -> JointStates {
    let mut states = JointStates::default();
    for (i, joint) in arm.joints.iter().enumerate() {
        states.names.push(format!("Joint{}", i));
        states.position.push(joint.position);
        states.velocity.push(joint.velocity);
        states.effort.push(joint.effort);
    }
    states
}

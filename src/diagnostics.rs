//! Health checks evaluated on demand from the latest snapshot.

use crate::types::TelemetrySnapshot;
use std::fmt;

/// Below this the battery is reported as an error.
pub const BATTERY_CRITICAL_VOLTS: f64 = 11.0;

/// Below this the battery is reported as a warning.
pub const BATTERY_LOW_VOLTS: f64 = 11.75;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticLevel::Ok => "OK",
            DiagnosticLevel::Warn => "WARN",
            DiagnosticLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Result of one check, with the values it was based on.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticStatus {
    pub name: &'static str,
    pub level: DiagnosticLevel,
    pub message: &'static str,
    pub hardware_id: Option<String>,
    pub values: Vec<(&'static str, String)>,
}

impl DiagnosticStatus {
    fn new(name: &'static str, level: DiagnosticLevel, message: &'static str) -> Self {
        DiagnosticStatus {
            name,
            level,
            message,
            hardware_id: None,
            values: Vec::new(),
        }
    }

    fn with_value(mut self, key: &'static str, value: impl ToString) -> Self {
        self.values.push((key, value.to_string()));
        self
    }

    pub fn with_hardware_id(mut self, hardware_id: impl Into<String>) -> Self {
        self.hardware_id = Some(hardware_id.into());
        self
    }
}

impl fmt::Display for DiagnosticStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.name, self.message)?;
        for (key, value) in &self.values {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

pub fn check_voltage(snapshot: &TelemetrySnapshot) -> DiagnosticStatus {
    let voltage = snapshot.battery.voltage();
    let (level, message) = if voltage < BATTERY_CRITICAL_VOLTS {
        (DiagnosticLevel::Error, "Battery voltage critically low.")
    } else if voltage < BATTERY_LOW_VOLTS {
        (DiagnosticLevel::Warn, "Battery voltage low.")
    } else {
        (DiagnosticLevel::Ok, "Battery voltage OK.")
    };
    DiagnosticStatus::new("Battery Voltage", level, message).with_value("Voltage", voltage)
}

pub fn check_stall(snapshot: &TelemetrySnapshot) -> DiagnosticStatus {
    let motors = &snapshot.motors;
    let (level, message) = if motors.left_stalled || motors.right_stalled {
        (DiagnosticLevel::Error, "Wheel stalled.")
    } else {
        (DiagnosticLevel::Ok, "Wheel not stalled.")
    };
    DiagnosticStatus::new("Motor Stall", level, message)
        .with_value("Left wheel stall", motors.left_stalled)
        .with_value("Right wheel stall", motors.right_stalled)
}

/// Every check, tagged with `hardware_id`.
pub fn run_all(snapshot: &TelemetrySnapshot, hardware_id: &str) -> Vec<DiagnosticStatus> {
    vec![
        check_stall(snapshot).with_hardware_id(hardware_id),
        check_voltage(snapshot).with_hardware_id(hardware_id),
    ]
}

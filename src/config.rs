//! Driver configuration
//!
//! Loaded from a TOML file. Every section and field has a default, so an
//! empty file describes a serial robot on `/dev/ttyS0`.

use crate::base::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level driver configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DriverConfig {
    pub connection: ConnectionConfig,
    pub timing: TimingConfig,
    pub motion: MotionConfig,
    pub pid: PidConfig,
    /// Bumper stall policy: 0 never, 1 front, 2 rear, 3 either. Negative leaves
    /// the firmware setting alone.
    pub bumpstall: i32,
    pub features: FeatureConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            connection: ConnectionConfig::default(),
            timing: TimingConfig::default(),
            motion: MotionConfig::default(),
            pid: PidConfig::default(),
            bumpstall: -1,
            features: FeatureConfig::default(),
        }
    }
}

/// Serial or TCP endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub use_tcp: bool,
    /// Serial device path
    pub port: String,
    /// Baud rates tried in order until the robot answers
    pub bauds: Vec<u32>,
    pub tcp_remote_host: String,
    pub tcp_remote_port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            use_tcp: false,
            port: "/dev/ttyS0".to_string(),
            bauds: vec![9600, 38400, 19200, 115200, 57600],
            tcp_remote_host: "localhost".to_string(),
            tcp_remote_port: 10002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Control loop rate, Hz
    pub frequency: f64,
    /// Keep-alive interval in seconds, measured from the last packet sent.
    /// The default is five loop periods at the default frequency; scale
    /// it with `frequency` to keep the same number of silent cycles.
    /// Zero or less disables the keep-alive.
    pub pulse: f64,
    /// Pause between handshake and activation steps
    pub cycle_time_ms: u64,
    /// Failed handshake receives tolerated per baud rate
    pub sync_attempts: usize,
    pub sync_receive_timeout_ms: u64,
    /// Receive deadline once the link is up; missing it ends the control loop
    pub link_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            frequency: 10.0,
            pulse: 0.5,
            cycle_time_ms: 200,
            sync_attempts: 4,
            sync_receive_timeout_ms: 200,
            link_timeout_ms: 5000,
        }
    }
}

impl TimingConfig {
    pub fn cycle_time(&self) -> Duration {
        Duration::from_millis(self.cycle_time_ms)
    }

    pub fn sync_receive_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_receive_timeout_ms)
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    pub fn pulse_interval(&self) -> Duration {
        Duration::from_secs_f64(self.pulse.max(0.0))
    }

    pub fn loop_period(&self) -> Duration {
        if self.frequency > 0.0 {
            Duration::from_secs_f64(1.0 / self.frequency)
        } else {
            Duration::ZERO
        }
    }
}

/// Speed and acceleration limits
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionConfig {
    /// m/s; the robot model's limit when unset
    pub max_xspeed: Option<f64>,
    /// rad/s; the robot model's limit when unset
    pub max_yawspeed: Option<f64>,
    /// mm/s², 0 leaves the firmware setting alone
    pub max_xaccel: i32,
    pub max_xdecel: i32,
    /// deg/s², 0 leaves the firmware setting alone
    pub max_yawaccel: i32,
    pub max_yawdecel: i32,
    /// A nonzero velocity left unchanged this long (seconds) is sent again
    pub velocity_refresh: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            max_xspeed: None,
            max_yawspeed: None,
            max_xaccel: 0,
            max_xdecel: 0,
            max_yawaccel: 0,
            max_yawdecel: 0,
            velocity_refresh: 5.0,
        }
    }
}

/// Controller gains; negative values are not sent
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PidConfig {
    pub rot_kp: i32,
    pub rot_kv: i32,
    pub rot_ki: i32,
    pub trans_kp: i32,
    pub trans_kv: i32,
    pub trans_ki: i32,
}

impl Default for PidConfig {
    fn default() -> Self {
        PidConfig {
            rot_kp: -1,
            rot_kv: -1,
            rot_ki: -1,
            trans_kp: -1,
            trans_kv: -1,
            trans_ki: -1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub use_sonar: bool,
    pub use_arm: bool,
}

impl DriverConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use p2os::config::DriverConfig;
    ///
    /// let config = DriverConfig::load("p2os.toml")?;
    /// # Ok::<(), p2os::Error>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }
}

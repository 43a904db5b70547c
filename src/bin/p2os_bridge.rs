//! p2os-bridge - runs the P2OS control loop and logs what the robot reports
//!
//! Usage: `p2os-bridge --config p2os.toml [--tcp host:port | --port /dev/ttyS0]`

use clap::Parser;
use log::{debug, error, info, warn};
use p2os::diagnostics::{self, DiagnosticLevel, DiagnosticStatus};
use p2os::publisher::{io_reading, joint_states, sonar_readings};
use p2os::types::TelemetrySnapshot;
use p2os::{DriverConfig, Error, P2osDevice, Result, TelemetrySink, TelemetryUpdate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "p2os-bridge")]
#[command(about = "Drive a P2OS robot over a serial line or TCP")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Connect over TCP instead of the serial port, e.g. `10.0.0.5:10002`
    #[arg(long)]
    tcp: Option<String>,

    /// Serial device path
    #[arg(short, long)]
    port: Option<String>,

    /// Control loop rate in Hz
    #[arg(short, long)]
    frequency: Option<f64>,
}

impl Args {
    fn driver_config(&self) -> Result<DriverConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Using config: {}", path);
                DriverConfig::load(path)?
            }
            None => DriverConfig::default(),
        };

        if let Some(tcp) = &self.tcp {
            let (host, port) = tcp
                .rsplit_once(':')
                .ok_or_else(|| Error::Config(format!("expected host:port, got {}", tcp)))?;
            config.connection.use_tcp = true;
            config.connection.tcp_remote_host = host.to_string();
            config.connection.tcp_remote_port = port
                .parse()
                .map_err(|e| Error::Config(format!("invalid TCP port {}: {}", port, e)))?;
        }
        if let Some(port) = &self.port {
            config.connection.use_tcp = false;
            config.connection.port = port.clone();
        }
        if let Some(frequency) = self.frequency {
            config.timing.frequency = frequency;
        }
        Ok(config)
    }
}

/// Logs every published snapshot and the health checks whenever one of them
/// changes level.
struct LogSink {
    hardware_id: String,
    levels: HashMap<&'static str, DiagnosticLevel>,
}

impl LogSink {
    fn new(hardware_id: String) -> Self {
        LogSink {
            hardware_id,
            levels: HashMap::new(),
        }
    }

    fn report(&mut self, status: DiagnosticStatus) {
        if self.levels.insert(status.name, status.level) == Some(status.level) {
            return;
        }
        match status.level {
            DiagnosticLevel::Ok => info!("{} ({})", status, self.hardware_id),
            DiagnosticLevel::Warn => warn!("{} ({})", status, self.hardware_id),
            DiagnosticLevel::Error => error!("{} ({})", status, self.hardware_id),
        }
    }
}

impl TelemetrySink for LogSink {
    fn publish(&mut self, snapshot: &TelemetrySnapshot, update: &TelemetryUpdate) {
        let odom = &snapshot.odometry;
        debug!(
            "{:?}: pose ({:.3}, {:.3}, {:.3}) twist ({:.3}, {:.3}) battery {:.1} V",
            update,
            odom.x(),
            odom.y(),
            odom.yaw(),
            odom.linear,
            odom.angular,
            snapshot.battery.voltage()
        );
        for sonar in sonar_readings(snapshot) {
            debug!("{}: {:.3} m", sonar.frame_id, sonar.range);
        }
        let io = io_reading(snapshot);
        debug!("dio {:?} aio {:?}", io.digital, io.analog);
        debug!("gripper {:?}", snapshot.gripper);
        if let Some(arm) = &snapshot.arm {
            let joints = joint_states(arm);
            debug!("arm {:?} {:?}", joints.names, joints.position);
        }

        for status in diagnostics::run_all(snapshot, &self.hardware_id) {
            self.report(status);
        }
    }

    fn aux_serial(&mut self, data: &[u8]) {
        debug!("Aux serial: {:02X?}", data);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.driver_config()?;

    let stop = Arc::new(AtomicBool::new(false));
    let s = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        s.store(true, Ordering::Relaxed);
    })
    .map_err(|e| Error::Config(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut device = P2osDevice::connect(config)?;
    let mut sink = LogSink::new(device.hardware_id());
    device.run(&stop, &mut sink)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

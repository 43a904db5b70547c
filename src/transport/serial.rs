use super::Link;
use crate::base::{ConnectError, Result};
use log::{debug, info};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Stand-in for "no timeout"; the serialport API always takes one.
const BLOCKING_READ_TIMEOUT: Duration = Duration::from_secs(3600);

/// Serial line to the robot controller (8N1, no flow control).
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialLink {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyS0")
    /// * `baud_rate` - Initial baud rate
    /// * `timeout` - Initial read timeout
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> std::result::Result<Self, ConnectError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|source| ConnectError::Serial {
                path: path.to_owned(),
                source,
            })?;

        info!("Opened serial port: {} at {} baud", path, baud_rate);
        Ok(SerialLink {
            port,
            path: path.to_owned(),
        })
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Link for SerialLink {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.port
            .set_timeout(timeout.unwrap_or(BLOCKING_READ_TIMEOUT))?;
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        debug!("{}: switching to {} baud", self.path, baud_rate);
        self.port.set_baud_rate(baud_rate)?;
        Ok(())
    }

    fn supports_baud_rate(&self) -> bool {
        true
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

//! Simulated robot controller for unit testing

use super::Link;
use crate::base::{DecodeStep, Message, ProtocolDecoder, ProtocolEncoder, Result};
use crate::cmds::*;
use crate::protocol::P2osHostProtocol;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Behaviour knobs for [`SimulatedRobot`].
#[derive(Clone)]
pub struct RobotScript {
    pub identity: (String, String, String),
    /// Behave like a serial line: baud rates can be switched.
    pub serial: bool,
    /// Echo sync requests only at this baud rate; `None` echoes at any rate.
    pub baud: Option<u32>,
    /// Answer the first SYNC0 with an unrelated frame, as a robot still in
    /// a previous session would.
    pub stale_first_reply: bool,
    /// Never answer anything.
    pub silent: bool,
    /// Status packet streamed once the session is open.
    pub sip: Option<Message>,
    /// Reply to `ARM_INFO`.
    pub arm_info: Option<Message>,
}

impl Default for RobotScript {
    fn default() -> Self {
        RobotScript {
            identity: ("Pioneer".into(), "Pioneer".into(), "p3dx-sh".into()),
            serial: false,
            baud: None,
            stale_first_reply: false,
            silent: false,
            sip: None,
            arm_info: None,
        }
    }
}

struct Inner {
    script: RobotScript,
    decoder: P2osHostProtocol,
    encoder: P2osHostProtocol,
    pending: VecDeque<u8>,
    sent: Vec<Message>,
    baud_history: Vec<u32>,
    current_baud: Option<u32>,
    read_timeouts: Vec<Option<Duration>>,
    sync0_seen: usize,
    /// SYNC2 answered; opcode 1 now means OPEN rather than SYNC1.
    synced: bool,
    open: bool,
}

impl Inner {
    fn queue(&mut self, msg: &Message) {
        let mut bytes = Vec::new();
        if self.encoder.write_to(msg, &mut bytes).is_ok() {
            self.pending.extend(bytes);
        }
    }

    fn echoes_at_current_baud(&self) -> bool {
        match (self.script.baud, self.current_baud) {
            (Some(wanted), Some(current)) => wanted == current,
            _ => true,
        }
    }

    fn handle(&mut self, msg: Message) {
        let cmd = msg.cmd;
        let handshake = !self.open;
        self.sent.push(msg);
        if self.script.silent {
            return;
        }

        if handshake {
            match cmd {
                P2OS_CMD_OPEN if self.synced => self.open = true,
                P2OS_SYNC0 => {
                    self.synced = false;
                    self.sync0_seen += 1;
                    if self.script.stale_first_reply && self.sync0_seen == 1 {
                        self.queue(&Message::with_data(0x32, &[0; 4]));
                    } else if self.echoes_at_current_baud() {
                        self.queue(&Message::new(P2OS_SYNC0));
                    }
                }
                P2OS_SYNC1 if self.echoes_at_current_baud() => {
                    self.queue(&Message::new(P2OS_SYNC1))
                }
                P2OS_SYNC2 if self.echoes_at_current_baud() => {
                    let (name, class, subtype) = self.script.identity.clone();
                    let mut data = Vec::new();
                    for part in [name, class, subtype] {
                        data.extend_from_slice(part.as_bytes());
                        data.push(0);
                    }
                    self.queue(&Message::with_data(P2OS_SYNC2, &data));
                    self.synced = true;
                }
                _ => {}
            }
            return;
        }

        match cmd {
            P2OS_CMD_CLOSE => {
                self.open = false;
                self.synced = false;
            }
            P2OS_CMD_ARM_INFO => {
                if let Some(info) = self.script.arm_info.clone() {
                    self.queue(&info);
                }
            }
            _ => {}
        }
    }
}

/// A `Link` that decodes everything written to it and answers like a
/// P2OS controller would. Clones share state, so a test can keep one and
/// hand the other to the driver.
#[derive(Clone)]
pub struct SimulatedRobot {
    inner: Arc<Mutex<Inner>>,
}

impl SimulatedRobot {
    pub fn new(script: RobotScript) -> Self {
        SimulatedRobot {
            inner: Arc::new(Mutex::new(Inner {
                script,
                decoder: P2osHostProtocol::new(),
                encoder: P2osHostProtocol::new(),
                pending: VecDeque::new(),
                sent: Vec::new(),
                baud_history: Vec::new(),
                current_baud: None,
                read_timeouts: Vec::new(),
                sync0_seen: 0,
                synced: false,
                open: false,
            })),
        }
    }

    /// Every frame the driver has written so far.
    pub fn sent(&self) -> Vec<Message> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn sent_opcodes(&self) -> Vec<u8> {
        self.sent().iter().map(|m| m.cmd).collect()
    }

    pub fn clear_sent(&self) {
        self.inner.lock().unwrap().sent.clear();
    }

    pub fn baud_history(&self) -> Vec<u32> {
        self.inner.lock().unwrap().baud_history.clone()
    }

    pub fn read_timeouts(&self) -> Vec<Option<Duration>> {
        self.inner.lock().unwrap().read_timeouts.clone()
    }

    /// Queues a frame for the driver to read.
    pub fn inject(&self, msg: &Message) {
        self.inner.lock().unwrap().queue(msg);
    }

    /// Replaces the streamed status packet.
    pub fn set_sip(&self, sip: Option<Message>) {
        self.inner.lock().unwrap().script.sip = sip;
    }
}

impl Read for SimulatedRobot {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pending.is_empty() && inner.open && !inner.script.silent {
            if let Some(sip) = inner.script.sip.clone() {
                inner.queue(&sip);
            }
        }
        if inner.pending.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        let count = inner.pending.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(inner.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl Write for SimulatedRobot {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let mut offset = 0;
        while offset < buf.len() {
            let (consumed, step) = inner.decoder.decode(&buf[offset..]);
            offset += consumed;
            if let DecodeStep::Frame(msg) = step {
                inner.handle(msg);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for SimulatedRobot {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.inner.lock().unwrap().read_timeouts.push(timeout);
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.current_baud = Some(baud_rate);
        inner.baud_history.push(baud_rate);
        Ok(())
    }

    fn supports_baud_rate(&self) -> bool {
        self.inner.lock().unwrap().script.serial
    }

    fn clear_input(&mut self) -> Result<()> {
        self.inner.lock().unwrap().pending.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "simulated robot".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(msg: &Message) -> Vec<u8> {
        let mut bytes = Vec::new();
        P2osHostProtocol::new().write_to(msg, &mut bytes).unwrap();
        bytes
    }

    fn read_all(robot: &mut SimulatedRobot) -> Vec<u8> {
        let mut buf = [0u8; 256];
        match robot.read(&mut buf) {
            Ok(n) => buf[..n].to_vec(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn opcode_one_opens_only_after_sync2() {
        let sip = Message::with_data(0x32, &[0; 4]);
        let mut robot = SimulatedRobot::new(RobotScript {
            sip: Some(sip.clone()),
            ..Default::default()
        });

        robot.write_all(&frame(&Message::new(P2OS_SYNC0))).unwrap();
        assert_eq!(read_all(&mut robot), frame(&Message::new(P2OS_SYNC0)));
        robot.write_all(&frame(&Message::new(P2OS_SYNC1))).unwrap();
        assert_eq!(read_all(&mut robot), frame(&Message::new(P2OS_SYNC1)));
        robot.write_all(&frame(&Message::new(P2OS_SYNC2))).unwrap();
        assert!(!read_all(&mut robot).is_empty());

        robot.write_all(&frame(&Message::new(P2OS_CMD_OPEN))).unwrap();
        assert_eq!(read_all(&mut robot), frame(&sip));

        robot.write_all(&frame(&Message::new(P2OS_CMD_CLOSE))).unwrap();
        assert!(read_all(&mut robot).is_empty());
        // a fresh session starts with the sync sequence again
        robot.write_all(&frame(&Message::new(P2OS_SYNC1))).unwrap();
        assert_eq!(read_all(&mut robot), frame(&Message::new(P2OS_SYNC1)));
    }
}

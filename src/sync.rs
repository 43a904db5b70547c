//! Link synchronization.
//!
//! Before a P2OS controller accepts commands the host must walk it through
//! three sync exchanges. The robot may still be in a session opened by a
//! previous client, and (on serial lines) may be listening at any of several
//! baud rates, so the handshake retries, closes stale sessions and falls back
//! across baud rates.

use crate::base::{Channel, DecodeError, Error, Message, Result};
use crate::cmds::{P2OS_CMD_CLOSE, P2OS_SYNC0, P2OS_SYNC1, P2OS_SYNC2};
use crate::config::DriverConfig;
use crate::parsers::FieldReader;
use crate::protocol::P2osHostProtocol;
use crate::transport::Link;
use crate::types::RobotIdentity;
use log::{debug, info, warn};
use std::thread::sleep;
use std::time::Duration;

/// Identity strings are cut to this many characters.
const IDENTITY_FIELD_LEN: usize = 19;

/// Handshake progress.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkState {
    NoSync,
    AfterFirstSync,
    AfterSecondSync,
    Ready,
}

/// Effect of a received packet on the handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transition {
    Advance(LinkState),
    /// A repeated echo of the previous step.
    Stay,
    /// Anything else: the robot is not where the handshake thinks it is.
    Unexpected,
}

impl LinkState {
    /// The sync request sent while in this state.
    pub fn request(self) -> Option<u8> {
        match self {
            LinkState::NoSync => Some(P2OS_SYNC0),
            LinkState::AfterFirstSync => Some(P2OS_SYNC1),
            LinkState::AfterSecondSync => Some(P2OS_SYNC2),
            LinkState::Ready => None,
        }
    }

    /// Transition table keyed on the received packet type.
    pub fn on_reply(self, reply: u8) -> Transition {
        use LinkState::*;
        match (self, reply) {
            (NoSync, P2OS_SYNC0) => Transition::Advance(AfterFirstSync),
            (AfterFirstSync, P2OS_SYNC1) => Transition::Advance(AfterSecondSync),
            (AfterSecondSync, P2OS_SYNC2) => Transition::Advance(Ready),
            (AfterFirstSync, P2OS_SYNC0) | (AfterSecondSync, P2OS_SYNC1) => Transition::Stay,
            _ => Transition::Unexpected,
        }
    }
}

/// Handshake pacing and retry limits.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Tried in order on links with a baud rate.
    pub bauds: Vec<u32>,
    /// Failed receives tolerated per baud rate.
    pub attempts: usize,
    /// Pause after each request.
    pub cycle: Duration,
    /// Receive deadline while unsynchronized.
    pub receive_timeout: Duration,
    /// Receive deadline once the robot has answered.
    pub link_timeout: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &DriverConfig) -> SyncSettings {
        SyncSettings {
            bauds: config.connection.bauds.clone(),
            attempts: config.timing.sync_attempts.max(1),
            cycle: config.timing.cycle_time(),
            receive_timeout: config.timing.sync_receive_timeout(),
            link_timeout: config.timing.link_timeout(),
        }
    }
}

/// Outcome of a successful handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub identity: RobotIdentity,
    /// Sync requests sent in total.
    pub round_trips: usize,
    /// Baud rate the robot answered at, for serial links.
    pub baud: Option<u32>,
    /// A stale session had to be closed first.
    pub sent_close: bool,
}

/// Parses the `name\0class\0subtype\0` payload of the final sync echo.
pub fn parse_identity(data: &[u8]) -> RobotIdentity {
    let mut reader = FieldReader::new("SYNC2", data);
    let mut field = || reader.c_string().chars().take(IDENTITY_FIELD_LEN).collect::<String>();
    let name = field();
    let class = field();
    let subtype = field();
    RobotIdentity {
        name,
        class,
        subtype,
    }
}

struct Handshake<'a, T: ?Sized> {
    channel: &'a mut Channel<P2osHostProtocol, T>,
    settings: &'a SyncSettings,
    round_trips: usize,
    sent_close: bool,
}

impl<'a, T> Handshake<'a, T>
where
    T: Link + ?Sized,
{
    /// Drops whatever is in flight and starts over from `NoSync`.
    fn restart(&mut self) -> Result<LinkState> {
        self.channel.stream_mut().clear_input()?;
        self.channel.reset();
        self.channel
            .stream_mut()
            .set_read_timeout(Some(self.settings.receive_timeout))?;
        Ok(LinkState::NoSync)
    }

    /// Sends `CLOSE` the first time it is needed. Returns `false` if it was
    /// already sent during this setup.
    fn close_stale_session(&mut self) -> Result<bool> {
        if self.sent_close {
            return Ok(false);
        }
        info!("Robot appears to be in a previous session, sending CLOSE");
        self.channel.write(&Message::new(P2OS_CMD_CLOSE))?;
        self.sent_close = true;
        sleep(self.settings.cycle * 2);
        Ok(true)
    }

    /// Runs the handshake at the current line speed.
    fn run(&mut self) -> Result<Option<RobotIdentity>> {
        let mut state = self.restart()?;
        let mut budget = self.settings.attempts;

        while budget > 0 {
            let Some(request) = state.request() else {
                break;
            };
            debug!("Sending SYNC{} in {:?}", request, state);
            self.channel.write(&Message::new(request))?;
            self.round_trips += 1;
            sleep(self.settings.cycle);

            let timeout = if state == LinkState::NoSync {
                self.settings.receive_timeout
            } else {
                self.settings.link_timeout
            };
            let reply = match self.channel.receive(timeout) {
                Ok(reply) => reply,
                Err(Error::Decode(DecodeError::Timeout)) => {
                    debug!("No answer to SYNC{}", request);
                    if state != LinkState::NoSync {
                        self.close_stale_session()?;
                        state = self.restart()?;
                    }
                    budget -= 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match state.on_reply(reply.cmd) {
                Transition::Advance(next) => {
                    info!("SYNC{}", request);
                    if state == LinkState::NoSync {
                        self.channel
                            .stream_mut()
                            .set_read_timeout(Some(self.settings.link_timeout))?;
                    }
                    state = next;
                    if state == LinkState::Ready {
                        return Ok(Some(parse_identity(&reply.data)));
                    }
                }
                Transition::Stay => {
                    debug!("Repeated echo {} in {:?}", reply.cmd, state);
                    budget -= 1;
                }
                Transition::Unexpected => {
                    warn!(
                        "Unexpected packet {:#04x} while in {:?}",
                        reply.cmd, state
                    );
                    if !self.close_stale_session()? {
                        budget -= 1;
                    }
                    state = self.restart()?;
                }
            }
        }
        Ok(None)
    }
}

/// Walks the robot through the sync exchanges, trying each configured baud
/// rate in order on links that have one.
///
/// Fails with [`Error::SyncFailed`] once every baud rate (or the single
/// attempt on TCP) has used up its retry budget.
pub fn synchronize<T>(
    channel: &mut Channel<P2osHostProtocol, T>,
    settings: &SyncSettings,
) -> Result<SyncReport>
where
    T: Link + ?Sized,
{
    let bauds: Vec<Option<u32>> = if channel.stream_mut().supports_baud_rate() {
        settings.bauds.iter().copied().map(Some).collect()
    } else {
        vec![None]
    };

    let mut handshake = Handshake {
        channel,
        settings,
        round_trips: 0,
        sent_close: false,
    };

    for baud in bauds {
        if let Some(rate) = baud {
            info!("Trying {} baud", rate);
            handshake.channel.stream_mut().set_baud_rate(rate)?;
        }
        if let Some(identity) = handshake.run()? {
            info!(
                "Connected to {}, a {} {}",
                identity.name, identity.class, identity.subtype
            );
            return Ok(SyncReport {
                identity,
                round_trips: handshake.round_trips,
                baud,
                sent_close: handshake.sent_close,
            });
        }
    }

    Err(Error::SyncFailed {
        attempts: handshake.round_trips,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{RobotScript, SimulatedRobot};

    fn settings(bauds: &[u32]) -> SyncSettings {
        SyncSettings {
            bauds: bauds.to_vec(),
            attempts: 2,
            cycle: Duration::ZERO,
            receive_timeout: Duration::from_millis(5),
            link_timeout: Duration::from_millis(20),
        }
    }

    fn channel(robot: &SimulatedRobot) -> Channel<P2osHostProtocol, SimulatedRobot> {
        Channel::new(P2osHostProtocol::new(), Box::new(robot.clone()))
    }

    #[test]
    fn transition_table() {
        use LinkState::*;
        assert_eq!(NoSync.on_reply(P2OS_SYNC0), Transition::Advance(AfterFirstSync));
        assert_eq!(AfterFirstSync.on_reply(P2OS_SYNC1), Transition::Advance(AfterSecondSync));
        assert_eq!(AfterSecondSync.on_reply(P2OS_SYNC2), Transition::Advance(Ready));
        assert_eq!(AfterFirstSync.on_reply(P2OS_SYNC0), Transition::Stay);
        assert_eq!(NoSync.on_reply(P2OS_SYNC1), Transition::Unexpected);
        assert_eq!(AfterSecondSync.on_reply(0x32), Transition::Unexpected);
        assert_eq!(Ready.request(), None);
    }

    #[test]
    fn echoing_robot_syncs_in_three_round_trips() {
        for bauds in [[9600, 38400, 115200], [115200, 38400, 9600]] {
            let robot = SimulatedRobot::new(RobotScript {
                serial: true,
                ..Default::default()
            });
            let report = synchronize(&mut channel(&robot), &settings(&bauds)).unwrap();

            assert_eq!(report.round_trips, 3);
            assert!(!report.sent_close);
            assert_eq!(report.baud, Some(bauds[0]));
            assert_eq!(report.identity.subtype, "p3dx-sh");
            assert_eq!(robot.sent_opcodes(), [P2OS_SYNC0, P2OS_SYNC1, P2OS_SYNC2]);
        }
    }

    #[test]
    fn stale_session_is_closed_once() {
        let robot = SimulatedRobot::new(RobotScript {
            stale_first_reply: true,
            ..Default::default()
        });
        let report = synchronize(&mut channel(&robot), &settings(&[])).unwrap();

        assert!(report.sent_close);
        assert_eq!(report.round_trips, 4);
        // CLOSE and SYNC2 share an opcode
        assert_eq!(
            robot.sent_opcodes(),
            [P2OS_SYNC0, P2OS_CMD_CLOSE, P2OS_SYNC0, P2OS_SYNC1, P2OS_SYNC2]
        );
    }

    #[test]
    fn falls_back_to_the_answering_baud_rate() {
        let robot = SimulatedRobot::new(RobotScript {
            serial: true,
            baud: Some(38400),
            ..Default::default()
        });
        let report = synchronize(&mut channel(&robot), &settings(&[9600, 38400, 19200])).unwrap();

        assert_eq!(report.baud, Some(38400));
        assert_eq!(report.round_trips, 5);
        assert_eq!(robot.baud_history(), [9600, 38400]);
        assert!(robot
            .read_timeouts()
            .contains(&Some(Duration::from_millis(20))));
    }

    #[test]
    fn silent_robot_fails_after_budget() {
        let robot = SimulatedRobot::new(RobotScript {
            silent: true,
            ..Default::default()
        });
        match synchronize(&mut channel(&robot), &settings(&[9600, 38400])) {
            Err(Error::SyncFailed { attempts }) => assert_eq!(attempts, 2),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(robot.sent_opcodes(), [P2OS_SYNC0, P2OS_SYNC0]);
    }

    #[test]
    fn identity_fields_are_truncated() {
        let identity = parse_identity(b"A-very-long-robot-name-indeed\0Pioneer\0p3dx-sh\0");
        assert_eq!(identity.name, "A-very-long-robot-n");
        assert_eq!(identity.class, "Pioneer");
        assert_eq!(identity.subtype, "p3dx-sh");
    }
}

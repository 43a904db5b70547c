use crate::base::{EncodeError, Message};

// Handshake

/// First synchronization request; the robot echoes it back.
pub const P2OS_SYNC0: u8 = 0;

/// Second synchronization request.
pub const P2OS_SYNC1: u8 = 1;

/// Third synchronization request; the echo carries the robot's identity strings.
pub const P2OS_SYNC2: u8 = 2;

// Session control

/// Keep-alive. Resets the firmware watchdog without changing anything.
pub const P2OS_CMD_PULSE: u8 = 0;

/// Starts the controller session; telemetry begins to stream.
pub const P2OS_CMD_OPEN: u8 = 1;

/// Ends the session.
pub const P2OS_CMD_CLOSE: u8 = 2;

/// Enables (1) or disables (0) the drive motors.
pub const P2OS_CMD_ENABLE: u8 = 4;

/// Translational acceleration (positive argument) or deceleration (negative), mm/s².
pub const P2OS_CMD_SETA: u8 = 5;

/// Resets the controller's odometry origin.
pub const P2OS_CMD_SETO: u8 = 7;

/// Translational velocity, mm/s.
pub const P2OS_CMD_VEL: u8 = 11;

/// Rotational velocity, deg/s.
pub const P2OS_CMD_RVEL: u8 = 21;

/// Rotational acceleration (positive argument) or deceleration (negative), deg/s².
pub const P2OS_CMD_SETRA: u8 = 23;

/// Powers the sonar array on (1) or off (0).
pub const P2OS_CMD_SONAR: u8 = 28;

/// Stops the robot and keeps it stopped.
pub const P2OS_CMD_STOP: u8 = 29;

/// Gripper/lift action, see [`crate::types::GripAction`] and [`crate::types::LiftAction`].
pub const P2OS_CMD_GRIPPER: u8 = 33;

/// Bumper stall policy: 0 never, 1 front, 2 rear, 3 either bumper.
pub const P2OS_CMD_BUMP_STALL: u8 = 44;

// Arm

/// Requests an `ARMINFOPAC`.
pub const P2OS_CMD_ARM_INFO: u8 = 70;

/// Selects arm status streaming: 2 requests a continuous `ARMPAC` stream.
pub const P2OS_CMD_ARM_STATUS: u8 = 71;

/// Arm servo power on (1) or off (0).
pub const P2OS_CMD_ARM_POWER: u8 = 74;

/// Joint position. Low argument byte is the tick target, high byte the 1-based joint number.
pub const P2OS_CMD_ARM_POS: u8 = 77;

// PID overrides

pub const P2OS_CMD_ROTKP: u8 = 82;
pub const P2OS_CMD_ROTKV: u8 = 83;
pub const P2OS_CMD_ROTKI: u8 = 84;
pub const P2OS_CMD_TRANSKP: u8 = 85;
pub const P2OS_CMD_TRANSKV: u8 = 86;
pub const P2OS_CMD_TRANSKI: u8 = 87;

// Argument type tags

/// Positive (or unsigned) integer argument follows.
pub const P2OS_ARGINT: u8 = 0x3B;

/// Negative integer argument follows, encoded as its magnitude.
pub const P2OS_ARGNINT: u8 = 0x1B;

/// Declared shape of a command argument.
///
/// Signed arguments travel in sign-magnitude form: the tag selects the sign
/// and the argument bytes hold the absolute value, low byte first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArgType {
    /// The frame is the bare opcode.
    None,
    SignedByte,
    UnsignedByte,
    SignedWord,
    UnsignedWord,
}

impl ArgType {
    /// Inclusive range of values this argument type can carry.
    pub fn range(self) -> (i32, i32) {
        match self {
            ArgType::None => (0, 0),
            ArgType::SignedByte => (-(i8::MAX as i32), i8::MAX as i32),
            ArgType::UnsignedByte => (0, u8::MAX as i32),
            ArgType::SignedWord => (-(i16::MAX as i32), i16::MAX as i32),
            ArgType::UnsignedWord => (0, u16::MAX as i32),
        }
    }

    fn width(self) -> usize {
        match self {
            ArgType::None => 0,
            ArgType::SignedByte | ArgType::UnsignedByte => 1,
            ArgType::SignedWord | ArgType::UnsignedWord => 2,
        }
    }
}

/// An outgoing command before framing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub opcode: u8,
    pub arg_type: ArgType,
    pub value: i32,
}

impl CommandFrame {
    /// Builds a command, checking `value` against the range of `arg_type`.
    pub fn build(opcode: u8, arg_type: ArgType, value: i32) -> Result<CommandFrame, EncodeError> {
        let (min, max) = arg_type.range();
        if value < min || value > max {
            return Err(EncodeError::ArgumentOutOfRange {
                opcode,
                arg_type,
                value,
            });
        }
        Ok(CommandFrame {
            opcode,
            arg_type,
            value,
        })
    }

    /// A command without argument.
    pub fn bare(opcode: u8) -> CommandFrame {
        CommandFrame {
            opcode,
            arg_type: ArgType::None,
            value: 0,
        }
    }

    /// A two-byte positive argument, the form the firmware expects for most
    /// switches and setpoints.
    pub fn word(opcode: u8, value: u16) -> CommandFrame {
        CommandFrame {
            opcode,
            arg_type: ArgType::UnsignedWord,
            value: i32::from(value),
        }
    }

    /// A word argument split into its two bytes, as used by `ARM_POS`.
    pub fn byte_pair(opcode: u8, low: u8, high: u8) -> CommandFrame {
        CommandFrame::word(opcode, u16::from_le_bytes([low, high]))
    }

    /// The packet payload for this command.
    pub fn to_message(&self) -> Message {
        let width = self.arg_type.width();
        if width == 0 {
            return Message::new(self.opcode);
        }
        let tag = if self.value < 0 {
            P2OS_ARGNINT
        } else {
            P2OS_ARGINT
        };
        let magnitude = self.value.unsigned_abs().to_le_bytes();
        let mut data = Vec::with_capacity(1 + width);
        data.push(tag);
        data.extend_from_slice(&magnitude[..width]);
        Message { cmd: self.opcode, data }
    }

    /// Reads a command back from a packet payload, given the argument type it
    /// was declared with. Returns `None` if the payload does not have that shape.
    pub fn parse(msg: &Message, arg_type: ArgType) -> Option<CommandFrame> {
        let width = arg_type.width();
        if width == 0 {
            return msg.data.is_empty().then(|| CommandFrame::bare(msg.cmd));
        }
        if msg.data.len() != 1 + width {
            return None;
        }
        let magnitude = msg.data[1..]
            .iter()
            .rev()
            .fold(0i32, |acc, &b| acc << 8 | i32::from(b));
        let value = match msg.data[0] {
            P2OS_ARGINT => magnitude,
            P2OS_ARGNINT => -magnitude,
            _ => return None,
        };
        CommandFrame::build(msg.cmd, arg_type, value).ok()
    }
}

impl From<CommandFrame> for Message {
    fn from(frame: CommandFrame) -> Message {
        frame.to_message()
    }
}

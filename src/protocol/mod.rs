//! Line codec for the panel's serial protocol.
//!
//! Device → host:
//! - `READY`
//! - `RBTN.<id>=1` / `RBTN.<id>=0` (press / release)
//! - `RVAL.<id>=<delta>` (signed knob rotation)
//!
//! Host → device:
//! - `RST`
//! - `RLED.<target>=<color>` where color `0` clears the LED
//!
//! Lines are newline-terminated on the wire; the codec works on a single
//! already-trimmed line.

mod types;

pub use types::{Button, Color, ColorError, Command, Control, DeviceMessage, Led};

use std::fmt;
use thiserror::Error;

const READY: &str = "READY";
const RESET: &str = "RST";
const BUTTON_PREFIX: &str = "RBTN.";
const KNOB_PREFIX: &str = "RVAL.";
const LED_PREFIX: &str = "RLED.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unexpected message from device: {0:?}")]
    UnexpectedMessage(String),
    #[error("malformed command line: {0:?}")]
    MalformedCommand(String),
    #[error("LED target {0} out of range")]
    UnknownLed(u8),
    #[error(transparent)]
    Color(#[from] ColorError),
}

/// Parse one line received from the device.
pub fn parse_message(line: &str) -> Result<DeviceMessage, ProtocolError> {
    let unexpected = || ProtocolError::UnexpectedMessage(line.to_string());

    if line == READY {
        return Ok(DeviceMessage::Ready);
    }

    if let Some(rest) = line.strip_prefix(BUTTON_PREFIX) {
        let (id, value) = split_assignment(rest).ok_or_else(unexpected)?;
        let control = id.parse::<i32>().map_err(|_| unexpected())?;
        return match value {
            "1" => Ok(DeviceMessage::ButtonPressed { control }),
            "0" => Ok(DeviceMessage::ButtonReleased { control }),
            _ => Err(unexpected()),
        };
    }

    if let Some(rest) = line.strip_prefix(KNOB_PREFIX) {
        let (id, value) = split_assignment(rest).ok_or_else(unexpected)?;
        let control = id.parse::<i32>().map_err(|_| unexpected())?;
        let delta = value.parse::<i32>().map_err(|_| unexpected())?;
        return Ok(DeviceMessage::KnobTurned { control, delta });
    }

    Err(unexpected())
}

/// Render a command as a wire line, without the trailing newline.
pub fn serialize(cmd: &Command) -> String {
    match cmd {
        Command::Reset => RESET.to_string(),
        Command::ClearLed { target } => format!("{}{}=0", LED_PREFIX, target.index()),
        Command::SetLed { target, color } => format!("{}{}={}", LED_PREFIX, target.index(), color),
    }
}

/// Inverse of [`serialize`]. `RLED.<t>=0` always reads back as `ClearLed`.
pub fn parse_command(line: &str) -> Result<Command, ProtocolError> {
    let malformed = || ProtocolError::MalformedCommand(line.to_string());

    if line == RESET {
        return Ok(Command::Reset);
    }

    let rest = line.strip_prefix(LED_PREFIX).ok_or_else(malformed)?;
    let (target, value) = split_assignment(rest).ok_or_else(malformed)?;
    let index = target.parse::<u8>().map_err(|_| malformed())?;
    let target = Led::from_index(index).ok_or(ProtocolError::UnknownLed(index))?;

    let mut chars = value.chars();
    let code = match (chars.next(), chars.next()) {
        (Some(code), None) => code,
        _ => return Err(malformed()),
    };

    if code == Color::OFF.as_char() {
        Ok(Command::ClearLed { target })
    } else {
        Ok(Command::SetLed {
            target,
            color: Color::new(code)?,
        })
    }
}

fn split_assignment(s: &str) -> Option<(&str, &str)> {
    let (key, value) = s.split_once('=')?;
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}

impl DeviceMessage {
    /// Render the message the way the device sends it. Used by loopback
    /// tooling and tests.
    pub fn to_line(&self) -> String {
        match self {
            DeviceMessage::Ready => READY.to_string(),
            DeviceMessage::ButtonPressed { control } => format!("{}{}=1", BUTTON_PREFIX, control),
            DeviceMessage::ButtonReleased { control } => format!("{}{}=0", BUTTON_PREFIX, control),
            DeviceMessage::KnobTurned { control, delta } => {
                format!("{}{}={}", KNOB_PREFIX, control, delta)
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize(self))
    }
}

impl fmt::Display for DeviceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

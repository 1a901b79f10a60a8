//! Typed vocabulary of the serial link: controls, LEDs, colors, messages and commands.

use std::fmt;
use thiserror::Error;

// =============================================================================
// Controls
// =============================================================================

/// One of the three discrete buttons next to the knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    TopLeft,
    BottomLeft,
    BottomRight,
}

impl Button {
    pub const ALL: [Button; 3] = [Button::TopLeft, Button::BottomLeft, Button::BottomRight];

    /// Dense index into per-button state tables.
    pub fn index(self) -> usize {
        match self {
            Button::TopLeft => 0,
            Button::BottomLeft => 1,
            Button::BottomRight => 2,
        }
    }

    /// The LED built into this button.
    pub fn led(self) -> Led {
        match self {
            Button::TopLeft => Led::TopLeft,
            Button::BottomLeft => Led::BottomLeft,
            Button::BottomRight => Led::BottomRight,
        }
    }
}

/// A physically addressable input. The knob doubles as a push switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Knob,
    Button(Button),
}

impl Control {
    /// Map a wire control id onto a known control.
    pub fn from_id(id: i32) -> Option<Control> {
        match id {
            0 => Some(Control::Knob),
            1 => Some(Control::Button(Button::TopLeft)),
            2 => Some(Control::Button(Button::BottomLeft)),
            3 => Some(Control::Button(Button::BottomRight)),
            _ => None,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Control::Knob => 0,
            Control::Button(Button::TopLeft) => 1,
            Control::Button(Button::BottomLeft) => 2,
            Control::Button(Button::BottomRight) => 3,
        }
    }
}

// =============================================================================
// LEDs and colors
// =============================================================================

/// LED target address. The first four sit inside the controls, the rest are
/// the status row (numbered right to left on the panel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Led {
    Knob = 0,
    TopLeft = 1,
    BottomLeft = 2,
    BottomRight = 3,
    Status5 = 4,
    Status4 = 5,
    Status3 = 6,
    Status2 = 7,
    Status1 = 8,
}

impl Led {
    pub const COUNT: usize = 9;

    pub const ALL: [Led; Led::COUNT] = [
        Led::Knob,
        Led::TopLeft,
        Led::BottomLeft,
        Led::BottomRight,
        Led::Status5,
        Led::Status4,
        Led::Status3,
        Led::Status2,
        Led::Status1,
    ];

    /// The status row ordered from Status1 to Status5.
    pub const STATUS: [Led; 5] = [
        Led::Status1,
        Led::Status2,
        Led::Status3,
        Led::Status4,
        Led::Status5,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: u8) -> Option<Led> {
        Led::ALL.get(usize::from(index)).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("color code {0:?} is not printable ASCII")]
    NotPrintable(char),
    #[error("color code '=' is reserved by the line format")]
    Reserved,
}

/// A single printable ASCII color code. The device interprets it; the codec
/// treats it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(u8);

impl Color {
    pub const RED: Color = Color(b'R');
    pub const GREEN: Color = Color(b'G');
    pub const YELLOW: Color = Color(b'Y');
    /// Plain "on" for single-color status LEDs.
    pub const ON: Color = Color(b'1');
    /// Sent as a color this clears the LED.
    pub const OFF: Color = Color(b'0');

    pub fn new(code: char) -> Result<Color, ColorError> {
        if code == '=' {
            return Err(ColorError::Reserved);
        }
        if !code.is_ascii_graphic() {
            return Err(ColorError::NotPrintable(code));
        }
        Ok(Color(code as u8))
    }

    pub fn as_char(self) -> char {
        char::from(self.0)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

// =============================================================================
// Messages and commands
// =============================================================================

/// An event reported by the panel. Control ids are kept as they appear on the
/// wire; resolving them is up to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMessage {
    Ready,
    ButtonPressed { control: i32 },
    ButtonReleased { control: i32 },
    KnobTurned { control: i32, delta: i32 },
}

/// An instruction for the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    ClearLed { target: Led },
    SetLed { target: Led, color: Color },
}

impl Command {
    pub fn set(target: Led, color: Color) -> Command {
        Command::SetLed { target, color }
    }

    pub fn clear(target: Led) -> Command {
        Command::ClearLed { target }
    }

    /// Status LEDs are single color: lit with `ON`, otherwise cleared.
    pub fn toggle(target: Led, on: bool) -> Command {
        if on {
            Command::set(target, Color::ON)
        } else {
            Command::clear(target)
        }
    }
}

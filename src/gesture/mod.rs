//! Gesture recognizer: raw device messages in, intents out.
//!
//! The recognizer is a plain synchronous state machine. It never sleeps and
//! never talks to the device; time only enters through long-press timers,
//! which it asks the caller to arm and later hands back via
//! [`GestureRecognizer::long_press_elapsed`].

mod state;

pub use state::{ButtonState, KnobState};

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::protocol::{Button, Control, DeviceMessage};

/// What the user meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// First `READY` of the session
    Startup,
    /// Knob pushed and released without turning
    KnobTap,
    /// Knob released, whatever happened during the press
    KnobReleased,
    /// Knob turned while not pushed
    Rotate { delta: i32 },
    /// Knob turned while pushed, in the direction of the first turn
    Seek { delta: i32 },
    /// Too many turns against the direction of the first turn
    DirectionError,
    ButtonTap(Button),
    LongPress(Button),
    /// Button pushed while the knob is held
    Combo(Button),
    /// All three buttons held at once
    Shutdown,
}

/// A long-press check the caller must schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongPressTimer {
    pub button: Button,
    pub generation: u64,
    pub after: Duration,
}

/// Outcome of feeding one event to the recognizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub intents: Vec<Intent>,
    pub timer: Option<LongPressTimer>,
}

impl Reaction {
    fn emit(&mut self, intent: Intent) {
        debug!("Intent: {:?}", intent);
        self.intents.push(intent);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureConfig {
    /// Hold time after which a button press becomes a long press
    pub long_press: Duration,
    /// Mismatched turns tolerated during one knob press before each further
    /// one is reported
    pub direction_error_threshold: u32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            long_press: Duration::from_millis(250),
            direction_error_threshold: 5,
        }
    }
}

pub struct GestureRecognizer {
    config: GestureConfig,
    ready: bool,
    terminated: bool,
    knob: KnobState,
    buttons: [ButtonState; 3],
    generation: u64,
}

impl GestureRecognizer {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            ready: false,
            terminated: false,
            knob: KnobState::default(),
            buttons: Default::default(),
            generation: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// True once the shutdown chord has been seen.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn knob(&self) -> &KnobState {
        &self.knob
    }

    /// Feed one message from the device.
    pub fn handle(&mut self, msg: &DeviceMessage) -> Reaction {
        let mut reaction = Reaction::default();

        if self.terminated {
            debug!("Ignoring {} after shutdown", msg);
            return reaction;
        }

        if let DeviceMessage::Ready = msg {
            if self.ready {
                debug!("Ignoring repeated READY");
            } else {
                info!("Panel ready");
                self.ready = true;
                self.knob = KnobState::default();
                self.buttons = Default::default();
                reaction.emit(Intent::Startup);
            }
            return reaction;
        }

        if !self.ready {
            debug!("Ignoring {} before READY", msg);
            return reaction;
        }

        match *msg {
            DeviceMessage::Ready => {}
            DeviceMessage::ButtonPressed { control } => match Control::from_id(control) {
                Some(Control::Knob) => self.knob_pressed(),
                Some(Control::Button(button)) => self.button_pressed(button, &mut reaction),
                None => warn!("Ignoring press from unknown control {}", control),
            },
            DeviceMessage::ButtonReleased { control } => match Control::from_id(control) {
                Some(Control::Knob) => self.knob_released(&mut reaction),
                Some(Control::Button(button)) => self.button_released(button, &mut reaction),
                None => warn!("Ignoring release from unknown control {}", control),
            },
            DeviceMessage::KnobTurned { control, delta } => match Control::from_id(control) {
                Some(Control::Knob) => self.knob_turned(delta, &mut reaction),
                Some(other) => warn!("Ignoring turn reported by {:?}", other),
                None => warn!("Ignoring turn from unknown control {}", control),
            },
        }

        if self.buttons.iter().all(|b| b.pressed) {
            info!("Shutdown chord");
            self.terminated = true;
            reaction.emit(Intent::Shutdown);
        }

        reaction
    }

    /// A timer armed by an earlier [`Reaction`] has run out.
    ///
    /// Stale timers (released, re-pressed or already consumed) do nothing.
    pub fn long_press_elapsed(&mut self, timer: LongPressTimer) -> Reaction {
        let mut reaction = Reaction::default();
        if self.terminated || !self.ready {
            return reaction;
        }

        let state = &mut self.buttons[timer.button.index()];
        if !state.pressed || state.generation != timer.generation || state.suppress_release {
            debug!("Stale long-press timer for {:?}", timer.button);
            return reaction;
        }

        state.suppress_release = true;
        if self.knob.pressed {
            // Button held, then the knob: neither control taps on release
            debug!("Long press of {:?} swallowed, knob is held", timer.button);
            self.knob.suppress_release = true;
        } else {
            reaction.emit(Intent::LongPress(timer.button));
        }
        reaction
    }

    fn knob_pressed(&mut self) {
        self.knob.pressed = true;
        self.knob.reset_press();
    }

    fn knob_released(&mut self, reaction: &mut Reaction) {
        if !self.knob.turned_while_pressed && !self.knob.suppress_release {
            reaction.emit(Intent::KnobTap);
        }
        reaction.emit(Intent::KnobReleased);
        self.knob.pressed = false;
        self.knob.reset_press();
    }

    fn knob_turned(&mut self, delta: i32, reaction: &mut Reaction) {
        if delta == 0 {
            return;
        }
        if !self.knob.pressed {
            reaction.emit(Intent::Rotate { delta });
            return;
        }

        let direction = delta.signum();
        if !self.knob.turned_while_pressed {
            self.knob.turned_while_pressed = true;
            self.knob.direction_while_pressed = direction;
        }

        if direction == self.knob.direction_while_pressed {
            reaction.emit(Intent::Seek { delta });
            return;
        }

        self.knob.direction_errors += 1;
        debug!(
            "Turn against seek direction ({} so far)",
            self.knob.direction_errors
        );
        if self.knob.direction_errors > self.config.direction_error_threshold {
            reaction.emit(Intent::DirectionError);
        }
    }

    fn button_pressed(&mut self, button: Button, reaction: &mut Reaction) {
        self.generation += 1;
        let state = &mut self.buttons[button.index()];
        state.pressed = true;
        state.generation = self.generation;
        state.suppress_release = false;

        if self.knob.pressed {
            state.suppress_release = true;
            self.knob.suppress_release = true;
            reaction.emit(Intent::Combo(button));
        } else {
            reaction.timer = Some(LongPressTimer {
                button,
                generation: self.generation,
                after: self.config.long_press,
            });
        }
    }

    fn button_released(&mut self, button: Button, reaction: &mut Reaction) {
        let state = &mut self.buttons[button.index()];
        state.pressed = false;
        let suppressed = std::mem::take(&mut state.suppress_release);
        if !suppressed && !self.knob.pressed {
            reaction.emit(Intent::ButtonTap(button));
        }
    }
}

//! Per-control state tracked between device messages.

/// Knob push switch plus everything that happens while it is held.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnobState {
    pub pressed: bool,
    /// Set by the first turn of a press; such a press never taps.
    pub turned_while_pressed: bool,
    /// Sign of the first turn of the current press, 0 before it.
    pub direction_while_pressed: i32,
    /// Turns against the latched direction during the current press.
    pub direction_errors: u32,
    /// The next release must not tap (a combo happened).
    pub suppress_release: bool,
}

impl KnobState {
    /// Back to the neutral baseline, keeping only `pressed`.
    pub fn reset_press(&mut self) {
        self.turned_while_pressed = false;
        self.direction_while_pressed = 0;
        self.direction_errors = 0;
        self.suppress_release = false;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub pressed: bool,
    /// The next release must not tap (long press or combo already handled).
    pub suppress_release: bool,
    /// Generation of the press currently (or last) held; a long-press timer
    /// only counts when it carries the same value.
    pub generation: u64,
}

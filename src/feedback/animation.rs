//! Timed command sequences played on session start and exit.

use std::time::Duration;

use super::Feedback;
use crate::protocol::{Color, Command, Led};

/// Default pause between animation frames.
pub const FRAME_DELAY: Duration = Duration::from_millis(75);

/// One frame: send `command`, then wait `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub command: Command,
    pub delay: Duration,
}

impl Step {
    fn new(command: Command, delay: Duration) -> Self {
        Self { command, delay }
    }
}

/// Cycle the knob through red, green and yellow, then clear the control LEDs
/// and the status row one by one.
pub fn intro(delay: Duration) -> Vec<Step> {
    let mut steps: Vec<Step> = [Color::RED, Color::GREEN, Color::YELLOW]
        .into_iter()
        .map(|color| Step::new(Command::set(Led::Knob, color), delay))
        .collect();

    let (controls, status) = Led::ALL.split_at(4);
    steps.extend(controls.iter().map(|&led| Step::new(Command::clear(led), delay)));
    if let Some(last) = steps.last_mut() {
        last.delay += delay;
    }
    steps.extend(status.iter().map(|&led| Step::new(Command::clear(led), delay)));
    steps
}

/// Light the status row from Status1 to Status5 with the knob in red, then
/// clear everything back to dark.
pub fn outro(delay: Duration) -> Vec<Step> {
    let mut steps = vec![Step::new(Command::set(Led::Knob, Color::RED), delay)];
    steps.extend(
        Led::STATUS
            .iter()
            .map(|&led| Step::new(Command::toggle(led, true), delay)),
    );
    steps.extend(
        Led::STATUS
            .iter()
            .rev()
            .chain(std::iter::once(&Led::Knob))
            .map(|&led| Step::new(Command::clear(led), delay)),
    );
    steps
}

/// Play `steps` through the raw passthrough.
pub async fn play(feedback: &Feedback, steps: &[Step]) {
    for step in steps {
        feedback.send(step.command).await;
        tokio::time::sleep(step.delay).await;
    }
}

//! rotaryboard - serial rotary-knob control panel driver
//!
//! A small panel (one push-knob with an RGB LED, three buttons, five status
//! LEDs) talks newline-delimited ASCII over a serial port. This library turns
//! its raw events into gestures, maps gestures to actions on a media player
//! and the desktop, and reflects external state back on the LEDs.
//!
//! - `protocol`: line codec for device messages and LED commands
//! - `transport`: serial link, read/write loops
//! - `gesture`: press/turn/release to intents
//! - `feedback`: LED multiplexer, blinking, animations
//! - `subscription`: reconnecting, de-duplicated state feeds
//! - `integrations`: foobar2000, NotHub, IRC file, desktop commands
//! - `controller`: dispatch loop and gesture bindings

pub mod config;
pub mod controller;
pub mod feedback;
pub mod gesture;
pub mod integrations;
pub mod protocol;
pub mod subscription;
pub mod transport;

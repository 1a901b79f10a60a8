//! Notification indicators on the status row.
//!
//! NotHub and the IRC file each report a [`NotificationFlags`]; the board ORs
//! them and blinks:
//! - Status1 for a pending commit
//! - Status5/Status4 alternating for a highlight or private message
//! - Status5 alone for plain channel activity

use crate::feedback::blink::BlinkPattern;
use crate::protocol::Led;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationFlags {
    pub channel_highlight: bool,
    pub channel_message: bool,
    pub private_message: bool,
    pub commit: bool,
}

impl NotificationFlags {
    pub fn merge(self, other: NotificationFlags) -> NotificationFlags {
        NotificationFlags {
            channel_highlight: self.channel_highlight || other.channel_highlight,
            channel_message: self.channel_message || other.channel_message,
            private_message: self.private_message || other.private_message,
            commit: self.commit || other.commit,
        }
    }
}

/// Latest flags per notification source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationBoard {
    pub nothub: NotificationFlags,
    pub irc: NotificationFlags,
}

impl BlinkPattern for NotificationBoard {
    fn render(&self, phase: bool) -> Vec<(Led, bool)> {
        let flags = self.nothub.merge(self.irc);
        let (status5, status4) = if flags.channel_highlight || flags.private_message {
            (phase, !phase)
        } else if flags.channel_message {
            (phase, false)
        } else {
            (false, false)
        };
        vec![
            (Led::Status1, flags.commit && phase),
            (Led::Status5, status5),
            (Led::Status4, status4),
        ]
    }
}

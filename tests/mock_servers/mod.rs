//! Mock servers for integration testing
//!
//! These mock servers simulate the HTTP services the panel talks to (beefweb
//! for foobar2000, NotHub) so the integrations can be exercised end to end
//! without the real software running.

pub mod beefweb;
pub mod nothub;

pub use beefweb::MockBeefweb;
pub use nothub::MockNotHub;

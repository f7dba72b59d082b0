//! Controller firmware support
//!
//! Only the TinyG JSON protocol is implemented. `connection_watch` holds the
//! watchdog that notices a board which never answers the build query.

pub mod connection_watch;
pub mod tinyg;

pub use connection_watch::ConnectionWatchdog;
pub use tinyg::{ControlSignal, ProtocolMode, ResponseFooter, ResponseParser, TinygDriver};

//! TinyG protocol engine
//!
//! TinyG speaks line-delimited JSON once `jv` is set; before that, and after
//! some errors, it falls back to plain text. The parser follows both modes.

pub mod driver;
pub mod footer;
pub mod mnemonics;
pub mod response_parser;

pub use driver::TinygDriver;
pub use footer::{is_benign_status, status_message, ResponseFooter};
pub use mnemonics::ControlSignal;
pub use response_parser::{ProtocolMode, ResponseParser};

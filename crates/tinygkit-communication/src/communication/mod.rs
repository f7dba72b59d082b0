//! Byte-level plumbing between the host and the controller
//!
//! - `framer`: splits the inbound byte stream into lines
//! - `accounting`: receive-buffer budget and throttle state
//! - `buffered`: flow-controlled outbound writer
//! - `serial`: serial port transport

pub mod accounting;
pub mod buffered;
pub mod framer;
pub mod serial;

pub use accounting::{BufferAccounting, FooterOutcome, Reservation};
pub use buffered::{
    CommandPayload, CommandSink, FlowControlledWriter, OutboundCommand, COMMENT_SENTINEL,
    FILE_DONE_SENTINEL,
};
pub use framer::LineFramer;
pub use serial::{list_ports, SerialPortInfo, SerialTransport, Transport};

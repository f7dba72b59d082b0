//! # TinyGKit Communication
//!
//! Serial transport and protocol engine for TinyG motion controllers:
//! line framing, flow-controlled command streaming against the board's
//! receive buffer, and a dual-mode parser that turns responses into
//! [`RoutingEvent`](tinygkit_core::RoutingEvent)s and decoded settings.
//!
//! [`TinygDriver`] is the entry point.

pub mod communication;
pub mod firmware;

pub use communication::{
    list_ports, BufferAccounting, CommandPayload, CommandSink, FlowControlledWriter, LineFramer,
    OutboundCommand, Reservation, SerialPortInfo, SerialTransport, Transport,
};

pub use firmware::{
    ConnectionWatchdog, ControlSignal, ProtocolMode, ResponseFooter, ResponseParser, TinygDriver,
};

//! Error handling for TinyGKit
//!
//! Provides error types for the layers of the serial engine:
//! - Connection errors (port handling, link state)
//! - Protocol errors (framing and decoding of device responses)
//!
//! Protocol errors are contained inside the engine: they are logged and the
//! offending line or field is dropped. Only connection errors cross the
//! driver's public API.

use thiserror::Error;

/// Connection error type
///
/// Represents errors related to the serial link to the controller.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// No link is open
    #[error("Controller not connected")]
    NotConnected,

    /// A link is already open
    #[error("Controller already connected")]
    AlreadyConnected,

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Protocol error type
///
/// Represents problems decoding what the device sent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A structured line could not be decoded
    #[error("Malformed frame: {reason}")]
    MalformedFrame {
        /// Decoder message.
        reason: String,
    },

    /// A key that no mnemonic table knows about
    #[error("Unknown mnemonic: {key}")]
    UnknownMnemonic {
        /// The raw key as received.
        key: String,
    },

    /// A footer array with the wrong shape
    #[error("Invalid footer: {reason}")]
    InvalidFooter {
        /// What was wrong with it.
        reason: String,
    },

    /// An inbound line exceeded the framer's accumulator
    #[error("Line exceeds {limit} bytes")]
    LineOverflow {
        /// The accumulator capacity.
        limit: usize,
    },
}

/// Main error type for TinyGKit
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

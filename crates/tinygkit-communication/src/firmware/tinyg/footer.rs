//! Response footer and status codes
//!
//! Most TinyG responses end with `"f":[protocol, status, rx, checksum]`.
//! A footer is decoded fresh from every response and never shared.

use serde_json::Value;
use tinygkit_core::ProtocolError;

/// Status code for success
pub const STATUS_OK: i64 = 0;

/// Status code for a move too short to execute
pub const STATUS_ZERO_LENGTH_MOVE: i64 = 60;

/// Decoded footer array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFooter {
    /// Footer/protocol revision
    pub protocol_version: i64,
    /// Status code of the command this response acknowledges
    pub status_code: i64,
    /// Bytes freed in the device receive buffer
    pub rx_delta: i64,
    /// Checksum of the response body
    pub checksum: i64,
}

impl ResponseFooter {
    /// Decode a footer from its JSON array
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let items = value.as_array().ok_or_else(|| ProtocolError::InvalidFooter {
            reason: format!("expected array, got {}", value),
        })?;
        if items.len() != 4 {
            return Err(ProtocolError::InvalidFooter {
                reason: format!("expected 4 elements, got {}", items.len()),
            });
        }

        let mut fields = [0i64; 4];
        for (slot, item) in fields.iter_mut().zip(items) {
            *slot = item.as_i64().ok_or_else(|| ProtocolError::InvalidFooter {
                reason: format!("non-integer element {}", item),
            })?;
        }

        Ok(Self {
            protocol_version: fields[0],
            status_code: fields[1],
            rx_delta: fields[2],
            checksum: fields[3],
        })
    }

    /// Human-readable status
    pub fn status_message(&self) -> &'static str {
        status_message(self.status_code)
    }
}

/// Whether a status code leaves the writer flowing
///
/// 0 is always benign. 60 (zero-length move) is benign unless
/// `throttle_on_zero_length_move` is set.
pub fn is_benign_status(code: i64, throttle_on_zero_length_move: bool) -> bool {
    code == STATUS_OK || (code == STATUS_ZERO_LENGTH_MOVE && !throttle_on_zero_length_move)
}

/// Description of a TinyG status code
pub fn status_message(code: i64) -> &'static str {
    match code {
        0 => "OK",
        1 => "Error",
        2 => "Eagain",
        3 => "No operation performed",
        4 => "Completed operation",
        5 => "Operation terminated",
        6 => "Operation was hard reset",
        7 => "Returned end-of-line",
        8 => "Returned end-of-file",
        9 => "File not open",
        10 => "Max file size exceeded",
        11 => "No such device",
        12 => "Buffer empty",
        13 => "Buffer full",
        14 => "Buffer full - fatal",
        15 => "Initializing",
        16 => "Entering boot loader",
        17 => "Function is stubbed",
        20 => "Internal error",
        21 => "Internal range error",
        22 => "Floating point error",
        23 => "Divide by zero",
        24 => "Invalid address",
        25 => "Read-only address",
        26 => "Initialization failure",
        27 => "System alarmed - shutdown",
        28 => "Failed to get planner buffer",
        29 => "Generic exception report",
        40 => "Unrecognized command",
        41 => "Expected command letter",
        42 => "Bad number format",
        43 => "Input exceeds max length",
        44 => "Input value too small",
        45 => "Input value too large",
        46 => "Input value range error",
        47 => "Input value unsupported",
        48 => "JSON syntax error",
        49 => "JSON input has too many pairs",
        50 => "JSON output too long",
        51 => "Out of buffer space",
        60 => "Zero length move",
        61 => "G-code block skipped",
        62 => "G-code input error",
        63 => "G-code feedrate error",
        64 => "G-code axis word missing",
        65 => "G-code modal group violation",
        66 => "Homing cycle failed",
        67 => "Max travel exceeded",
        68 => "Max spindle speed exceeded",
        69 => "Arc specification error",
        _ => "Unknown status code",
    }
}

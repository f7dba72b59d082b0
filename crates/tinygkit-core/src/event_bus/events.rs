//! Routed event definitions.
//!
//! Everything the protocol engine reports upward travels as a
//! [`RoutingEvent`]. Events are cloneable and serializable for logging/replay.

use serde::{Deserialize, Serialize};

use crate::setting::{Setting, SettingGroup};

/// Event published by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoutingEvent {
    /// A status report was applied; consumers re-read machine state
    StatusReport,
    /// A settings group was decoded and applied
    SettingsGroup {
        /// Owning group
        group: SettingGroup,
        /// The settings, in wire order
        settings: Vec<Setting>,
    },
    /// Receive-buffer budget after a footer was applied
    BufferUpdate(usize),
    /// Free-text message from the device
    UserMessage(String),
    /// No build number reply inside the watchdog window
    ConnectionTimeout,
    /// Firmware build is new enough
    BuildOk(f64),
    /// Firmware build is older than the configured minimum
    BuildError(f64),
    /// Limit switch / alarm shutdown; carries the raw line
    EmergencyShutdown(String),
    /// Text-mode line, or a mode transition notice
    TextModeLine(String),
    /// Footer carried a non-benign status code
    FooterError {
        /// Status code
        code: i64,
        /// Human-readable description
        message: String,
    },
    /// Inline comment that was queued for display
    Comment(String),
    /// The file-complete marker left the outbound queue
    FileSendComplete,
    /// The transport failed; queues were cleared
    ConnectionLost(String),
}

impl RoutingEvent {
    /// Get the kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            RoutingEvent::StatusReport => EventKind::StatusReport,
            RoutingEvent::SettingsGroup { .. } => EventKind::SettingsGroup,
            RoutingEvent::BufferUpdate(_) => EventKind::BufferUpdate,
            RoutingEvent::UserMessage(_) => EventKind::UserMessage,
            RoutingEvent::ConnectionTimeout => EventKind::ConnectionTimeout,
            RoutingEvent::BuildOk(_) | RoutingEvent::BuildError(_) => EventKind::Build,
            RoutingEvent::EmergencyShutdown(_) => EventKind::EmergencyShutdown,
            RoutingEvent::TextModeLine(_) => EventKind::TextModeLine,
            RoutingEvent::FooterError { .. } => EventKind::FooterError,
            RoutingEvent::Comment(_) => EventKind::Comment,
            RoutingEvent::FileSendComplete => EventKind::FileSendComplete,
            RoutingEvent::ConnectionLost(_) => EventKind::ConnectionLost,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            RoutingEvent::StatusReport => "Status report".to_string(),
            RoutingEvent::SettingsGroup { group, settings } => {
                format!("Settings group {} ({} fields)", group, settings.len())
            }
            RoutingEvent::BufferUpdate(n) => format!("Buffer budget {}", n),
            RoutingEvent::UserMessage(msg) => format!("Message: {}", msg),
            RoutingEvent::ConnectionTimeout => "Connection timeout".to_string(),
            RoutingEvent::BuildOk(v) => format!("Firmware build {} ok", v),
            RoutingEvent::BuildError(v) => format!("Firmware build {} too old", v),
            RoutingEvent::EmergencyShutdown(raw) => format!("Emergency shutdown: {}", raw),
            RoutingEvent::TextModeLine(text) => text.clone(),
            RoutingEvent::FooterError { code, message } => {
                format!("Status {}: {}", code, message)
            }
            RoutingEvent::Comment(text) => format!("Comment: {}", text),
            RoutingEvent::FileSendComplete => "File send complete".to_string(),
            RoutingEvent::ConnectionLost(reason) => format!("Connection lost: {}", reason),
        }
    }
}

/// Event kind for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// [`RoutingEvent::StatusReport`]
    StatusReport,
    /// [`RoutingEvent::SettingsGroup`]
    SettingsGroup,
    /// [`RoutingEvent::BufferUpdate`]
    BufferUpdate,
    /// [`RoutingEvent::UserMessage`]
    UserMessage,
    /// [`RoutingEvent::ConnectionTimeout`]
    ConnectionTimeout,
    /// [`RoutingEvent::BuildOk`] and [`RoutingEvent::BuildError`]
    Build,
    /// [`RoutingEvent::EmergencyShutdown`]
    EmergencyShutdown,
    /// [`RoutingEvent::TextModeLine`]
    TextModeLine,
    /// [`RoutingEvent::FooterError`]
    FooterError,
    /// [`RoutingEvent::Comment`]
    Comment,
    /// [`RoutingEvent::FileSendComplete`]
    FileSendComplete,
    /// [`RoutingEvent::ConnectionLost`]
    ConnectionLost,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(RoutingEvent::BuildOk(440.2).kind(), EventKind::Build);
        assert_eq!(RoutingEvent::BuildError(300.0).kind(), EventKind::Build);
        assert_eq!(
            RoutingEvent::SettingsGroup {
                group: SettingGroup::System,
                settings: vec![],
            }
            .kind(),
            EventKind::SettingsGroup
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = RoutingEvent::SettingsGroup {
            group: SettingGroup::Axis('x'),
            settings: vec![Setting::new(SettingGroup::Axis('x'), "vm", "1200")],
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: RoutingEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(event.description(), "Settings group x (1 fields)");
    }
}

//! # TinyGKit
//!
//! Host-side link to TinyG CNC motion controllers.
//!
//! ## Architecture
//!
//! TinyGKit is organized as a workspace with multiple crates:
//!
//! 1. **tinygkit-core** - errors, driver configuration, settings, routed events
//! 2. **tinygkit-communication** - serial transport, flow-controlled writer,
//!    response parser, mnemonic translation, driver facade
//! 3. **tinygkit** - console binary built on the two

pub mod cli;

pub use tinygkit_communication::{
    list_ports, ControlSignal, SerialPortInfo, TinygDriver, Transport,
};
pub use tinygkit_core::{
    ConnectionError, DriverConfig, Error, EventFilter, MachineModel, MemoryMachineModel,
    NoOpMachineModel, Result, RoutingEvent, Setting, SettingGroup,
};

use anyhow::Context;
use std::path::Path;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Output on stderr, leaving stdout to routed events
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("logging already initialized")?;

    Ok(())
}

/// Load a driver configuration from a TOML file
///
/// Missing keys take their defaults.
pub fn load_config(path: &Path) -> anyhow::Result<DriverConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: DriverConfig =
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// One-line console rendering of a routed event
pub fn format_event(event: &RoutingEvent) -> String {
    match event {
        RoutingEvent::TextModeLine(text) => text.clone(),
        RoutingEvent::UserMessage(text) => format!("[msg] {}", text),
        RoutingEvent::SettingsGroup { group, settings } => {
            let body = settings
                .iter()
                .map(|s| format!("{}={}", s.key, s.value))
                .collect::<Vec<_>>()
                .join(" ");
            format!("[{}] {}", group, body)
        }
        RoutingEvent::FooterError { code, message } => format!("[error {}] {}", code, message),
        RoutingEvent::EmergencyShutdown(raw) => format!("[SHUTDOWN] {}", raw),
        other => format!("[{}]", other.description()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "buffer_capacity = 200").unwrap();
        writeln!(file, "throttle_on_zero_length_move = true").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.buffer_capacity, 200);
        assert!(config.throttle_on_zero_length_move);
        assert_eq!(config.max_line_length, DriverConfig::default().max_line_length);
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "buffer_capacity = 0").unwrap();
        assert!(load_config(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "buffer_capacity = \"lots\"").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_format_event() {
        let event = RoutingEvent::SettingsGroup {
            group: SettingGroup::Axis('x'),
            settings: vec![Setting::new(SettingGroup::Axis('x'), "vm", "1200")],
        };
        assert_eq!(format_event(&event), "[x] vm=1200");
        assert_eq!(
            format_event(&RoutingEvent::TextModeLine("ok".to_string())),
            "ok"
        );
    }
}

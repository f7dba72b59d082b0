//! TinyG Response Parser
//!
//! Consumes framed lines and routes them. Lines whose first byte is `{` are
//! JSON responses; anything else is console text, which TinyG prints before
//! JSON mode is set up and after some resets. The parser latches which mode
//! the board is in and announces each transition once. The latch follows the
//! first byte, so a garbled JSON line still ends text mode.
//!
//! JSON responses are walked key by key in wire order:
//!
//! | key | handling |
//! |-----|----------|
//! | `r` | recurse into the response body |
//! | `sr` | status report fast path |
//! | `f` | footer: credit the buffer budget |
//! | `tgfx` | watchdog loopback: connection timeout |
//! | `er` | emergency shutdown |
//! | `sys`, `1`-`4`, `x`..`c` | settings group |
//! | anything else | bare mnemonic, re-wrapped into its group |

use crate::communication::accounting::BufferAccounting;
use crate::communication::buffered::{CommandSink, OutboundCommand};
use crate::firmware::tinyg::footer::{status_message, ResponseFooter};
use crate::firmware::tinyg::mnemonics::{
    is_known_in_group, is_master_group_object, lookup_single_group, requery_commands,
};
use crossbeam_channel::Receiver;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tinygkit_core::{
    EventDispatcher, MachineModel, ProtocolError, RoutingEvent, Setting, SettingGroup,
};

/// Notice emitted when the board starts printing console text
pub const ENTERING_TEXT_MODE: &str = "entering text mode";

/// Notice emitted when JSON responses resume
pub const LEAVING_TEXT_MODE: &str = "leaving text mode";

/// Which kind of line the board last sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    /// JSON responses
    Structured,
    /// Console text
    Text,
}

/// Dual-mode response parser
pub struct ResponseParser {
    accounting: Arc<BufferAccounting>,
    model: Arc<dyn MachineModel>,
    sink: Arc<dyn CommandSink>,
    events: EventDispatcher,
    min_build_version: f64,
    mode: ProtocolMode,
}

impl ResponseParser {
    /// Create a parser in structured mode
    pub fn new(
        accounting: Arc<BufferAccounting>,
        model: Arc<dyn MachineModel>,
        sink: Arc<dyn CommandSink>,
        events: EventDispatcher,
        min_build_version: f64,
    ) -> Self {
        Self {
            accounting,
            model,
            sink,
            events,
            min_build_version,
            mode: ProtocolMode::Structured,
        }
    }

    /// Current mode latch
    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    /// Run the parser on its own thread until every sender of `lines` is gone
    pub fn spawn(mut self, lines: Receiver<String>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("tinyg-parser".to_string())
            .spawn(move || {
                tracing::debug!("Parser worker started");
                while let Ok(line) = lines.recv() {
                    self.handle_line(&line);
                }
                tracing::debug!("Parser worker stopped");
            })
    }

    /// Route one framed line
    pub fn handle_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return;
        }
        tracing::debug!("<< {}", line);

        if line.starts_with('{') {
            self.handle_structured(line);
        } else {
            self.handle_text(line);
        }
    }

    fn handle_text(&mut self, line: &str) {
        if self.mode == ProtocolMode::Structured {
            self.mode = ProtocolMode::Text;
            tracing::info!("Controller switched to text mode");
            self.events
                .emit(RoutingEvent::TextModeLine(ENTERING_TEXT_MODE.to_string()));
        }
        self.events.emit(RoutingEvent::TextModeLine(line.to_string()));
    }

    fn handle_structured(&mut self, line: &str) {
        if self.mode == ProtocolMode::Text {
            self.mode = ProtocolMode::Structured;
            tracing::info!("Controller back in JSON mode; re-reading settings");
            self.events
                .emit(RoutingEvent::TextModeLine(LEAVING_TEXT_MODE.to_string()));
            self.requery_settings();
        }

        let root = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(root)) => root,
            Ok(other) => {
                let err = ProtocolError::MalformedFrame {
                    reason: format!("expected an object, got {}", other),
                };
                tracing::warn!("Dropping line {:?}: {}", line, err);
                return;
            }
            Err(e) => {
                let err = ProtocolError::MalformedFrame {
                    reason: e.to_string(),
                };
                tracing::warn!("Dropping line {:?}: {}", line, err);
                return;
            }
        };

        self.dispatch_object(&root, line);
    }

    fn requery_settings(&self) {
        for command in requery_commands() {
            if !self.sink.enqueue(OutboundCommand::new(command.as_str())) {
                tracing::warn!("Settings query {} not queued", command);
            }
        }
    }

    fn dispatch_object(&self, object: &Map<String, Value>, raw: &str) {
        for (key, value) in object {
            match key.as_str() {
                "r" => match value {
                    Value::Object(body) => self.dispatch_object(body, raw),
                    other => tracing::debug!("Ignoring non-object response body {}", other),
                },
                "sr" => self.handle_status_report(value),
                "f" => self.handle_footer(value),
                "tgfx" => {
                    tracing::warn!("No reply from controller");
                    self.events.emit(RoutingEvent::ConnectionTimeout);
                }
                "er" => {
                    tracing::error!("Controller reported shutdown: {}", raw);
                    self.events
                        .emit(RoutingEvent::EmergencyShutdown(raw.to_string()));
                }
                group_key if is_master_group_object(group_key) => {
                    let Some(group) = SettingGroup::from_group_key(group_key) else {
                        continue;
                    };
                    match value {
                        Value::Object(fields) => self.handle_group(group, fields),
                        // query echo such as {"x":null}
                        _ => tracing::trace!("Ignoring scalar value for group {}", group),
                    }
                }
                bare => self.handle_bare_key(bare, value, raw),
            }
        }
    }

    fn handle_status_report(&self, value: &Value) {
        let Value::Object(fields) = value else {
            tracing::trace!("Ignoring status report echo {}", value);
            return;
        };
        for (key, field) in fields {
            let setting = Setting::new(SettingGroup::StatusReport, key.as_str(), value_text(field));
            self.model.apply_status(&setting);
        }
        self.events.emit(RoutingEvent::StatusReport);
    }

    fn handle_footer(&self, value: &Value) {
        let footer = match ResponseFooter::from_value(value) {
            Ok(footer) => footer,
            Err(e) => {
                tracing::warn!("Ignoring footer: {}", e);
                return;
            }
        };

        let outcome = self.accounting.apply_footer(&footer);
        self.events.emit(RoutingEvent::BufferUpdate(outcome.budget));

        if let Some(code) = outcome.error_code {
            let message = status_message(code);
            tracing::warn!("Controller status {}: {}", code, message);
            self.events.emit(RoutingEvent::FooterError {
                code,
                message: message.to_string(),
            });
        }
    }

    fn handle_group(&self, group: SettingGroup, fields: &Map<String, Value>) {
        let mut settings = Vec::new();
        let mut build = None;

        for (key, value) in fields {
            match key.as_str() {
                "msg" => {
                    self.events.emit(RoutingEvent::UserMessage(value_text(value)));
                }
                "rx" => match value.as_u64() {
                    Some(rx) => {
                        let rx = usize::try_from(rx).unwrap_or(usize::MAX);
                        let budget = self.accounting.rebaseline(rx);
                        self.events.emit(RoutingEvent::BufferUpdate(budget));
                    }
                    None => tracing::debug!("Ignoring non-numeric rx {}", value),
                },
                known if is_known_in_group(group, known) => {
                    let setting = Setting::new(group, known, value_text(value));
                    self.model.apply_setting(&setting);
                    if group == SettingGroup::System && known == "fb" {
                        build = value.as_f64();
                    }
                    settings.push(setting);
                }
                unknown => {
                    let err = ProtocolError::UnknownMnemonic {
                        key: format!("{}{}", group.wire_prefix(), unknown),
                    };
                    tracing::debug!("Dropping setting in group {}: {}", group, err);
                }
            }
        }

        if !settings.is_empty() {
            self.events
                .emit(RoutingEvent::SettingsGroup { group, settings });
        }

        if let Some(version) = build {
            if version >= self.min_build_version {
                tracing::info!("Firmware build {} accepted", version);
                self.events.emit(RoutingEvent::BuildOk(version));
            } else {
                tracing::warn!(
                    "Firmware build {} is older than required {}",
                    version,
                    self.min_build_version
                );
                self.events.emit(RoutingEvent::BuildError(version));
            }
        }
    }

    fn handle_bare_key(&self, key: &str, value: &Value, raw: &str) {
        match lookup_single_group(key) {
            Some((group, mnemonic)) => {
                let mut fields = Map::new();
                fields.insert(mnemonic, value.clone());
                let mut wrapped = Map::new();
                wrapped.insert(group.group_key(), Value::Object(fields));
                self.dispatch_object(&wrapped, raw);
            }
            None => {
                let err = ProtocolError::UnknownMnemonic {
                    key: key.to_string(),
                };
                tracing::debug!("Dropping {}", err);
            }
        }
    }
}

/// Wire spelling of a value; strings lose their quotes
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! TinyG mnemonic registry and command translator
//!
//! TinyG names every setting with a short mnemonic. Axis and motor settings
//! carry a one-character owner prefix on the wire (`xvm` is "x axis velocity
//! maximum", `1sa` is "motor 1 step angle"); system settings and status report
//! fields are bare. Inside a group object (`{"x":{"vm":1200}}`) the prefix is
//! dropped.
//!
//! This module classifies keys into owner groups and turns [`Setting`]s back
//! into the exact JSON the board accepts.

use tinygkit_core::{Setting, SettingGroup};

/// Keys whose value is an object bundling one group's settings
pub const MASTER_GROUPS: [&str; 11] = ["sys", "1", "2", "3", "4", "x", "y", "z", "a", "b", "c"];

/// Fields that appear in status reports
pub const STATUS_REPORT_KEYS: &[&str] = &[
    "line", "posx", "posy", "posz", "posa", "posb", "posc", "mpox", "mpoy", "mpoz", "mpoa",
    "mpob", "mpoc", "ofsx", "ofsy", "ofsz", "ofsa", "vel", "feed", "stat", "unit", "coor",
    "momo", "plan", "path", "dist", "frmo", "tool", "hold", "homx", "homy", "homz", "homa",
    "qr", "qi", "qo",
];

/// System group mnemonics
pub const SYSTEM_KEYS: &[&str] = &[
    "fb", "fv", "hp", "hv", "id", "ja", "ct", "sl", "st", "mt", "ej", "jv", "js", "tv", "qv",
    "sv", "si", "ic", "ec", "ee", "ex", "baud", "net", "gpl", "gun", "gco", "gpa", "gdi", "rx",
    "msg", "gc",
];

/// Axis mnemonics (without the axis letter)
pub const AXIS_KEYS: &[&str] = &[
    "am", "vm", "fr", "tn", "tm", "jm", "jh", "jd", "ra", "sn", "sx", "sv", "lv", "lb", "zb",
];

/// Motor mnemonics (without the motor number)
pub const MOTOR_KEYS: &[&str] = &["ma", "sa", "tr", "mi", "po", "pm"];

/// Fields requested in the status report format pushed on connect
pub const STATUS_REPORT_FIELDS: &[&str] = &[
    "line", "posx", "posy", "posz", "posa", "vel", "unit", "stat", "feed", "coor", "momo",
    "plan", "path", "dist", "mpox", "mpoy", "mpoz", "mpoa",
];

/// Local echo off
pub const CMD_DISABLE_LOCAL_ECHO: &str = r#"{"ee":0}"#;
/// JSON verbosity: footers, messages, configs and line numbers
pub const CMD_JSON_VERBOSITY: &str = r#"{"jv":4}"#;
/// Text verbosity off
pub const CMD_TEXT_VERBOSITY: &str = r#"{"tv":0}"#;
/// Device-side flow control off; the host accounts for the buffer itself
pub const CMD_FLOW_CONTROL: &str = r#"{"ex":0}"#;
/// Firmware build number query
pub const CMD_QUERY_BUILD: &str = r#"{"fb":null}"#;
/// Hardware platform query
pub const CMD_QUERY_PLATFORM: &str = r#"{"hp":null}"#;
/// Hardware version query
pub const CMD_QUERY_HARDWARE_VERSION: &str = r#"{"hv":null}"#;
/// Status report query
pub const CMD_QUERY_STATUS_REPORT: &str = r#"{"sr":null}"#;

/// Out-of-band single-byte controls, sent on the priority path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Feed hold
    Pause,
    /// Cycle start / resume
    Resume,
    /// Flush the planner queue (only valid while held)
    QueueFlush,
    /// Soft reset
    Reset,
}

impl ControlSignal {
    /// Wire byte
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Pause => b'!',
            Self::Resume => b'~',
            Self::QueueFlush => b'%',
            Self::Reset => 0x18,
        }
    }
}

/// Whether `key` names a group object
pub fn is_master_group_object(key: &str) -> bool {
    MASTER_GROUPS.contains(&key)
}

/// Whether `key` is a known mnemonic inside `group`
pub fn is_known_in_group(group: SettingGroup, key: &str) -> bool {
    match group {
        SettingGroup::System => SYSTEM_KEYS.contains(&key),
        SettingGroup::StatusReport => STATUS_REPORT_KEYS.contains(&key),
        SettingGroup::Axis(_) => AXIS_KEYS.contains(&key),
        SettingGroup::Motor(_) => MOTOR_KEYS.contains(&key),
    }
}

/// Classify a bare key into its owner group
///
/// Returns the group and the mnemonic with any owner prefix removed, or
/// `None` for keys no table knows about.
pub fn lookup_single_group(raw_key: &str) -> Option<(SettingGroup, String)> {
    if STATUS_REPORT_KEYS.contains(&raw_key) {
        return Some((SettingGroup::StatusReport, raw_key.to_string()));
    }
    if SYSTEM_KEYS.contains(&raw_key) {
        return Some((SettingGroup::System, raw_key.to_string()));
    }

    let mut chars = raw_key.chars();
    let prefix = chars.next()?;
    let rest = chars.as_str();
    match SettingGroup::from_prefix(prefix)? {
        group @ SettingGroup::Axis(_) if AXIS_KEYS.contains(&rest) => {
            Some((group, rest.to_string()))
        }
        group @ SettingGroup::Motor(_) if MOTOR_KEYS.contains(&rest) => {
            Some((group, rest.to_string()))
        }
        _ => None,
    }
}

/// Format a raw value the way the board parses it
///
/// Integers stay plain, other numbers get at most three decimals with
/// trailing zeros trimmed, `true`/`false`/`null` pass through, anything else
/// becomes a JSON string.
pub fn format_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if matches!(trimmed, "true" | "false" | "null") {
        return trimmed.to_string();
    }

    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() && looks_numeric(trimmed) => {
            let (text, lossy) = format_number(n);
            if lossy {
                tracing::debug!("Rounded {} to {} for the wire", trimmed, text);
            }
            text
        }
        _ => serde_json::Value::String(raw.to_string()).to_string(),
    }
}

fn looks_numeric(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
}

/// Wire text for `n`, and whether rounding changed its value
fn format_number(n: f64) -> (String, bool) {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return (format!("{}", n as i64), false);
    }
    let fixed = format!("{:.3}", n);
    let text = match fixed.trim_end_matches('0').trim_end_matches('.') {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    };
    let lossy = text.parse::<f64>().map_or(true, |rounded| rounded != n);
    (text, lossy)
}

/// Wire form of a single setting: `{"<prefix><key>":<value>}`
pub fn build_command(setting: &Setting) -> String {
    format!(
        "{{\"{}{}\":{}}}",
        setting.group.wire_prefix(),
        setting.key,
        format_value(&setting.value)
    )
}

/// Nested wire form for several settings of one group:
/// `{"x":{"vm":1200,"fr":800}}`
pub fn build_group_command(group: SettingGroup, settings: &[Setting]) -> String {
    let body = settings
        .iter()
        .filter(|s| s.group == group)
        .map(|s| format!("\"{}\":{}", s.key, format_value(&s.value)))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"{}\":{{{}}}}}", group.group_key(), body)
}

/// Query for a whole group: `{"x":null}`
pub fn query_group(group: SettingGroup) -> String {
    format!("{{\"{}\":null}}", group.group_key())
}

/// Query for one bare mnemonic: `{"fb":null}`
pub fn query_key(key: &str) -> String {
    format!("{{\"{}\":null}}", key)
}

/// Status report format command enabling [`STATUS_REPORT_FIELDS`]
pub fn status_report_format_command() -> String {
    let body = STATUS_REPORT_FIELDS
        .iter()
        .map(|f| format!("\"{}\":true", f))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"sr\":{{{}}}}}", body)
}

/// Status report interval command
pub fn status_interval_command(interval_ms: u64) -> String {
    format!("{{\"si\":{}}}", interval_ms)
}

/// Queries that re-read system, motor and axis settings
pub fn requery_commands() -> Vec<String> {
    let mut commands = vec![query_group(SettingGroup::System)];
    commands.extend(
        SettingGroup::MOTORS
            .iter()
            .map(|&n| query_group(SettingGroup::Motor(n))),
    );
    commands.extend(
        SettingGroup::AXES
            .iter()
            .map(|&c| query_group(SettingGroup::Axis(c))),
    );
    commands
}

//! Decoded settings and the machine-model seam
//!
//! The engine decodes device responses into [`Setting`] values and hands each
//! one to a [`MachineModel`]. It never keeps them itself.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Owner of a setting on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingGroup {
    /// System group (`sys`)
    System,
    /// Axis group, keyed by its lowercase letter
    Axis(char),
    /// Motor group, keyed by its number (1-4)
    Motor(u8),
    /// Status report fields (`sr`)
    StatusReport,
}

impl SettingGroup {
    /// Axis letters the board knows about
    pub const AXES: [char; 6] = ['x', 'y', 'z', 'a', 'b', 'c'];

    /// Motor numbers the board knows about
    pub const MOTORS: [u8; 4] = [1, 2, 3, 4];

    /// Parse a group object key (`sys`, `sr`, `x`, `1`, ...)
    pub fn from_group_key(key: &str) -> Option<Self> {
        match key {
            "sys" => Some(Self::System),
            "sr" => Some(Self::StatusReport),
            _ => {
                let mut chars = key.chars();
                let first = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                Self::from_prefix(first)
            }
        }
    }

    /// Interpret a single prefix character as an axis or motor group
    pub fn from_prefix(c: char) -> Option<Self> {
        if Self::AXES.contains(&c) {
            return Some(Self::Axis(c));
        }
        let n = c.to_digit(10)? as u8;
        Self::MOTORS.contains(&n).then_some(Self::Motor(n))
    }

    /// Key of the group object on the wire
    pub fn group_key(&self) -> String {
        match self {
            Self::System => "sys".to_string(),
            Self::StatusReport => "sr".to_string(),
            Self::Axis(c) => c.to_string(),
            Self::Motor(n) => n.to_string(),
        }
    }

    /// Prefix a bare mnemonic carries for this group (`x` in `xvm`)
    pub fn wire_prefix(&self) -> String {
        match self {
            Self::System | Self::StatusReport => String::new(),
            Self::Axis(c) => c.to_string(),
            Self::Motor(n) => n.to_string(),
        }
    }
}

impl std::fmt::Display for SettingGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.group_key())
    }
}

/// One decoded field: owner group, mnemonic, and the value as spelled on the
/// wire (strings unquoted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    /// Owning group
    pub group: SettingGroup,
    /// Mnemonic without group prefix
    pub key: String,
    /// Raw value text
    pub value: String,
}

impl Setting {
    /// Create a new setting
    pub fn new(group: SettingGroup, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            group,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Numeric view of the value, if it is one
    pub fn as_f64(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }
}

impl std::fmt::Display for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}={}", self.group, self.key, self.value)
    }
}

/// Receiver of decoded settings (the machine/axis/motor domain model)
///
/// Called from the parser worker thread; implementations must return quickly.
pub trait MachineModel: Send + Sync {
    /// Apply a setting from an axis, motor or system group
    fn apply_setting(&self, setting: &Setting);

    /// Apply one status report field
    fn apply_status(&self, field: &Setting) {
        self.apply_setting(field);
    }
}

/// Model that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMachineModel;

impl MachineModel for NoOpMachineModel {
    fn apply_setting(&self, _setting: &Setting) {}
}

/// Model that keeps the latest value per (group, key)
#[derive(Debug, Default)]
pub struct MemoryMachineModel {
    values: RwLock<HashMap<(SettingGroup, String), String>>,
}

impl MemoryMachineModel {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value for a setting
    pub fn get(&self, group: SettingGroup, key: &str) -> Option<String> {
        self.values.read().get(&(group, key.to_string())).cloned()
    }

    /// Number of distinct settings seen
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether nothing has been applied yet
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl MachineModel for MemoryMachineModel {
    fn apply_setting(&self, setting: &Setting) {
        self.values
            .write()
            .insert((setting.group, setting.key.clone()), setting.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_key_parsing() {
        assert_eq!(SettingGroup::from_group_key("sys"), Some(SettingGroup::System));
        assert_eq!(SettingGroup::from_group_key("x"), Some(SettingGroup::Axis('x')));
        assert_eq!(SettingGroup::from_group_key("3"), Some(SettingGroup::Motor(3)));
        assert_eq!(SettingGroup::from_group_key("5"), None);
        assert_eq!(SettingGroup::from_group_key("xy"), None);
        assert_eq!(SettingGroup::from_group_key(""), None);
    }

    #[test]
    fn test_wire_prefix() {
        assert_eq!(SettingGroup::Axis('z').wire_prefix(), "z");
        assert_eq!(SettingGroup::Motor(2).wire_prefix(), "2");
        assert_eq!(SettingGroup::System.wire_prefix(), "");
    }

    #[test]
    fn test_memory_model_keeps_latest() {
        let model = MemoryMachineModel::new();
        model.apply_setting(&Setting::new(SettingGroup::Axis('x'), "vm", "1200"));
        model.apply_setting(&Setting::new(SettingGroup::Axis('x'), "vm", "1500"));
        assert_eq!(model.len(), 1);
        assert_eq!(model.get(SettingGroup::Axis('x'), "vm").as_deref(), Some("1500"));
        assert_eq!(
            Setting::new(SettingGroup::System, "fb", "440.20").as_f64(),
            Some(440.2)
        );
    }
}

//! Device descriptor types.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Opaque ID for an open input device, unique within one discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

/// Snapshot of the event codes a device advertises, grouped by event type.
///
/// Taken once when the device is opened; never updated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub keys: BTreeSet<u16>,
    pub relative: BTreeSet<u16>,
    pub absolute: BTreeSet<u16>,
    /// Bus type from the device's input id (`BUS_USB`, `BUS_VIRTUAL`, ...).
    pub bus_type: u16,
}

impl DeviceCapabilities {
    pub fn has_key(&self, code: u16) -> bool {
        self.keys.contains(&code)
    }

    pub fn has_relative(&self, code: u16) -> bool {
        self.relative.contains(&code)
    }

    pub fn has_absolute(&self, code: u16) -> bool {
        self.absolute.contains(&code)
    }

    /// Builder helper: add key codes.
    #[must_use]
    pub fn with_keys(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.keys.extend(codes);
        self
    }

    /// Builder helper: add relative axis codes.
    #[must_use]
    pub fn with_relative(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.relative.extend(codes);
        self
    }

    /// Builder helper: add absolute axis codes.
    #[must_use]
    pub fn with_absolute(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.absolute.extend(codes);
        self
    }

    #[must_use]
    pub fn with_bus_type(mut self, bus_type: u16) -> Self {
        self.bus_type = bus_type;
        self
    }
}

/// Result of classifying a device from its capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Mouse,
    Keyboard,
    Unclassified,
}

impl Classification {
    /// The registry bucket for this classification, if it has one.
    pub fn kind(self) -> Option<DeviceKind> {
        match self {
            Self::Mouse => Some(DeviceKind::Mouse),
            Self::Keyboard => Some(DeviceKind::Keyboard),
            Self::Unclassified => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mouse => write!(f, "mouse"),
            Self::Keyboard => write!(f, "keyboard"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// A definite device classification. Registered devices always have one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Mouse,
    Keyboard,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mouse => write!(f, "mouse"),
            Self::Keyboard => write!(f, "keyboard"),
        }
    }
}

/// Describes a registered input device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    /// Human-readable name (e.g. "Logitech MX Master 3").
    pub name: String,
    /// Device node, e.g. `/dev/input/event4`.
    pub path: PathBuf,
    pub kind: DeviceKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{BTN_LEFT, KEY_F1, REL_X};

    #[test]
    fn capability_builders() {
        let caps = DeviceCapabilities::default()
            .with_keys([BTN_LEFT, KEY_F1])
            .with_relative([REL_X]);
        assert!(caps.has_key(BTN_LEFT));
        assert!(caps.has_key(KEY_F1));
        assert!(caps.has_relative(REL_X));
        assert!(!caps.has_absolute(REL_X));
    }

    #[test]
    fn classification_kind() {
        assert_eq!(Classification::Mouse.kind(), Some(DeviceKind::Mouse));
        assert_eq!(Classification::Keyboard.kind(), Some(DeviceKind::Keyboard));
        assert_eq!(Classification::Unclassified.kind(), None);
    }

    #[test]
    fn device_id_display() {
        assert_eq!(DeviceId(3).to_string(), "dev3");
    }
}

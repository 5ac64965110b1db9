//! Device classification.

use vdesk_types::codes::{BTN_LEFT, BTN_MOUSE, BTN_TOUCH, BUS_VIRTUAL, KEY_F1};
use vdesk_types::{Classification, DeviceCapabilities};

/// Classify a device from its capability snapshot.
///
/// A primary button or touch makes a device a mouse; otherwise a function
/// key makes it a keyboard. Mice win when both apply so every device lands
/// in exactly one bucket.
pub fn classify(caps: &DeviceCapabilities) -> Classification {
    if caps.has_key(BTN_MOUSE) || caps.has_key(BTN_LEFT) || caps.has_key(BTN_TOUCH) {
        Classification::Mouse
    } else if caps.has_key(KEY_F1) {
        Classification::Keyboard
    } else {
        Classification::Unclassified
    }
}

/// Excludes synthetic devices so injected input is never read back.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    excluded_names: Vec<String>,
    exclude_virtual_bus: bool,
}

impl DeviceFilter {
    pub fn new(excluded_names: impl IntoIterator<Item = String>, exclude_virtual_bus: bool) -> Self {
        Self {
            excluded_names: excluded_names.into_iter().collect(),
            exclude_virtual_bus,
        }
    }

    /// Whether the device is one of our own (or another injector's) virtual devices.
    pub fn is_excluded(&self, name: &str, caps: &DeviceCapabilities) -> bool {
        if self.exclude_virtual_bus && caps.bus_type == BUS_VIRTUAL {
            return true;
        }
        self.excluded_names
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(name))
    }
}

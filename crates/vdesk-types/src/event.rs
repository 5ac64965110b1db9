//! Input event types.
//!
//! [`RawEvent`] is one `struct input_event` as read from a device node.
//! [`SemanticEvent`] is what the coalescer emits: one complete pointer or
//! keyboard notification for the remote session.

use serde::{Deserialize, Serialize};

use crate::codes::{EV_ABS, EV_KEY, EV_REL, EV_SYN, SYN_DROPPED, SYN_REPORT};

/// A raw `(type, code, value)` triple from an evdev node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub const fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
        }
    }

    pub const fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }

    pub const fn relative(code: u16, value: i32) -> Self {
        Self::new(EV_REL, code, value)
    }

    pub const fn absolute(code: u16, value: i32) -> Self {
        Self::new(EV_ABS, code, value)
    }

    /// `SYN_REPORT`: end of one hardware frame.
    pub const fn sync() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }

    /// `SYN_DROPPED`: the kernel buffer overflowed and events were lost.
    pub const fn dropped() -> Self {
        Self::new(EV_SYN, SYN_DROPPED, 0)
    }

    pub fn is_sync_report(&self) -> bool {
        self.event_type == EV_SYN && self.code == SYN_REPORT
    }

    pub fn is_sync_dropped(&self) -> bool {
        self.event_type == EV_SYN && self.code == SYN_DROPPED
    }
}

/// Flags for `NotifyPointerAxis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AxisFlags(pub u32);

impl AxisFlags {
    pub const NONE: Self = Self(0);
    /// Last event of a scroll sequence.
    pub const FINISH: Self = Self(1 << 0);
    /// Scroll originated from a physical wheel.
    pub const SOURCE_WHEEL: Self = Self(1 << 1);
    pub const SOURCE_FINGER: Self = Self(1 << 2);
    pub const SOURCE_CONTINUOUS: Self = Self(1 << 3);

    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// One notification for the remote session, after coalescing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SemanticEvent {
    /// Relative pointer displacement for one input frame.
    PointerMotionRelative { dx: f64, dy: f64 },

    /// Absolute pointer position on a logical touch surface.
    PointerMotionAbsolute { surface: String, x: f64, y: f64 },

    /// Pointer button press or release, already mapped to the remote id.
    PointerButton { button: i32, pressed: bool },

    /// Scroll.
    PointerAxis { dx: f64, dy: f64, flags: AxisFlags },

    /// Keyboard key press or release (evdev keycode).
    KeyboardKeycode { code: u32, pressed: bool },
}

//! Per-device event coalescing.
//!
//! Mice buffer relative and absolute motion until `SYN_REPORT` so each
//! input frame produces one motion notification. Buttons, wheels and
//! keyboard keys are emitted as soon as they are read.

use vdesk_types::codes::{
    ABS_X, ABS_Y, BTN_MIDDLE, BTN_MOUSE, BTN_RIGHT, BTN_TL, BTN_TOUCH, BTN_TR, EV_ABS,
    EV_KEY, EV_REL, REL_HWHEEL, REL_WHEEL, REL_X, REL_Y,
};
use vdesk_types::{AxisFlags, DeviceKind, RawEvent, SemanticEvent};

/// Remote button ids (`linux/input-event-codes.h` values as Mutter expects them).
const REMOTE_BUTTON_LEFT: i32 = 272;
const REMOTE_BUTTON_RIGHT: i32 = 273;
const REMOTE_BUTTON_MIDDLE: i32 = 274;

/// Map a hardware button code to the remote protocol's button id.
///
/// `BTN_LEFT` shares `BTN_MOUSE`'s code. Touch contact and the left shoulder
/// button act as a left click, the right shoulder button as a right click.
/// Anything else is not forwarded.
pub fn remote_button(code: u16) -> Option<i32> {
    match code {
        BTN_MOUSE | BTN_TOUCH | BTN_TL => Some(REMOTE_BUTTON_LEFT),
        BTN_RIGHT | BTN_TR => Some(REMOTE_BUTTON_RIGHT),
        BTN_MIDDLE => Some(REMOTE_BUTTON_MIDDLE),
        _ => None,
    }
}

/// Motion buffered between two synchronization boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerAccumulator {
    pub pending_dx: i32,
    pub pending_dy: i32,
    pub pending_abs_x: Option<i32>,
    pub pending_abs_y: Option<i32>,
}

impl PointerAccumulator {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DeviceState {
    Mouse(PointerAccumulator),
    Keyboard,
}

/// Turns one device's raw events into semantic events.
#[derive(Debug, Clone)]
pub struct Coalescer {
    state: DeviceState,
    surface_id: String,
}

impl Coalescer {
    /// `surface_id` tags absolute motion; every absolute device shares it.
    pub fn new(kind: DeviceKind, surface_id: impl Into<String>) -> Self {
        let state = match kind {
            DeviceKind::Mouse => DeviceState::Mouse(PointerAccumulator::default()),
            DeviceKind::Keyboard => DeviceState::Keyboard,
        };
        Self {
            state,
            surface_id: surface_id.into(),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self.state {
            DeviceState::Mouse(_) => DeviceKind::Mouse,
            DeviceState::Keyboard => DeviceKind::Keyboard,
        }
    }

    /// Pending motion for mice, `None` for keyboards.
    pub fn accumulator(&self) -> Option<&PointerAccumulator> {
        match &self.state {
            DeviceState::Mouse(acc) => Some(acc),
            DeviceState::Keyboard => None,
        }
    }

    /// Drop any buffered motion, e.g. after a read error or overflow.
    pub fn reset(&mut self) {
        if let DeviceState::Mouse(acc) = &mut self.state {
            acc.reset();
        }
    }

    /// Feed one raw event, appending any resulting semantic events to `out`.
    pub fn feed(&mut self, event: RawEvent, out: &mut Vec<SemanticEvent>) {
        if event.is_sync_dropped() {
            self.reset();
            return;
        }
        match &mut self.state {
            DeviceState::Mouse(acc) => feed_pointer(acc, &self.surface_id, event, out),
            DeviceState::Keyboard => {
                if event.event_type == EV_KEY {
                    out.push(SemanticEvent::KeyboardKeycode {
                        code: u32::from(event.code),
                        pressed: event.value != 0,
                    });
                }
            }
        }
    }
}

fn feed_pointer(
    acc: &mut PointerAccumulator,
    surface_id: &str,
    event: RawEvent,
    out: &mut Vec<SemanticEvent>,
) {
    match (event.event_type, event.code) {
        // Last value within a frame wins.
        (EV_REL, REL_X) => acc.pending_dx = event.value,
        (EV_REL, REL_Y) => acc.pending_dy = event.value,
        (EV_REL, REL_WHEEL) => out.push(SemanticEvent::PointerAxis {
            dx: 0.0,
            dy: -f64::from(event.value),
            flags: AxisFlags::SOURCE_WHEEL,
        }),
        (EV_REL, REL_HWHEEL) => out.push(SemanticEvent::PointerAxis {
            dx: f64::from(event.value),
            dy: 0.0,
            flags: AxisFlags::SOURCE_WHEEL,
        }),
        (EV_ABS, ABS_X) => acc.pending_abs_x = Some(event.value),
        (EV_ABS, ABS_Y) => acc.pending_abs_y = Some(event.value),
        (EV_KEY, code) => {
            if let Some(button) = remote_button(code) {
                out.push(SemanticEvent::PointerButton {
                    button,
                    pressed: event.value != 0,
                });
            }
        }
        _ if event.is_sync_report() => flush(acc, surface_id, out),
        _ => {}
    }
}

fn flush(acc: &mut PointerAccumulator, surface_id: &str, out: &mut Vec<SemanticEvent>) {
    if acc.pending_dx != 0 || acc.pending_dy != 0 {
        out.push(SemanticEvent::PointerMotionRelative {
            dx: f64::from(acc.pending_dx),
            dy: f64::from(acc.pending_dy),
        });
        acc.pending_dx = 0;
        acc.pending_dy = 0;
    }
    if let (Some(x), Some(y)) = (acc.pending_abs_x, acc.pending_abs_y) {
        out.push(SemanticEvent::PointerMotionAbsolute {
            surface: surface_id.to_string(),
            x: f64::from(x),
            y: f64::from(y),
        });
        acc.pending_abs_x = None;
        acc.pending_abs_y = None;
    }
}

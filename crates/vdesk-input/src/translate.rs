//! Translation of semantic events into remote session calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};
use vdesk_types::SemanticEvent;

/// The remote desktop session input is injected into.
///
/// Calls are synchronous and made from the input worker thread while the
/// owner may use the same session concurrently for lifecycle calls, so
/// implementations must be `Sync`.
pub trait RemoteSession: Send + Sync + 'static {
    fn notify_pointer_motion_relative(&self, dx: f64, dy: f64) -> anyhow::Result<()>;

    fn notify_pointer_motion_absolute(&self, surface_id: &str, x: f64, y: f64)
        -> anyhow::Result<()>;

    fn notify_pointer_button(&self, button: i32, pressed: bool) -> anyhow::Result<()>;

    fn notify_pointer_axis(&self, dx: f64, dy: f64, flags: u32) -> anyhow::Result<()>;

    fn notify_keyboard_keycode(&self, keycode: u32, pressed: bool) -> anyhow::Result<()>;
}

impl<T: RemoteSession + ?Sized> RemoteSession for Arc<T> {
    fn notify_pointer_motion_relative(&self, dx: f64, dy: f64) -> anyhow::Result<()> {
        (**self).notify_pointer_motion_relative(dx, dy)
    }

    fn notify_pointer_motion_absolute(
        &self,
        surface_id: &str,
        x: f64,
        y: f64,
    ) -> anyhow::Result<()> {
        (**self).notify_pointer_motion_absolute(surface_id, x, y)
    }

    fn notify_pointer_button(&self, button: i32, pressed: bool) -> anyhow::Result<()> {
        (**self).notify_pointer_button(button, pressed)
    }

    fn notify_pointer_axis(&self, dx: f64, dy: f64, flags: u32) -> anyhow::Result<()> {
        (**self).notify_pointer_axis(dx, dy, flags)
    }

    fn notify_keyboard_keycode(&self, keycode: u32, pressed: bool) -> anyhow::Result<()> {
        (**self).notify_keyboard_keycode(keycode, pressed)
    }
}

/// Counters for forwarded and failed notifications.
#[derive(Debug, Default)]
pub struct ForwardStats {
    forwarded: AtomicU64,
    failed: AtomicU64,
}

impl ForwardStats {
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Sends semantic events to a [`RemoteSession`], best effort.
pub struct Translator<S> {
    session: S,
    stats: Arc<ForwardStats>,
}

impl<S: RemoteSession> Translator<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            stats: Arc::new(ForwardStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ForwardStats> {
        Arc::clone(&self.stats)
    }

    /// Forward one event. Failures are logged and counted, never returned:
    /// a lost notification must not stall the poll loop.
    pub fn dispatch(&self, event: &SemanticEvent) {
        let result = match event {
            SemanticEvent::PointerMotionRelative { dx, dy } => {
                self.session.notify_pointer_motion_relative(*dx, *dy)
            }
            SemanticEvent::PointerMotionAbsolute { surface, x, y } => {
                self.session.notify_pointer_motion_absolute(surface, *x, *y)
            }
            SemanticEvent::PointerButton { button, pressed } => {
                self.session.notify_pointer_button(*button, *pressed)
            }
            SemanticEvent::PointerAxis { dx, dy, flags } => {
                self.session.notify_pointer_axis(*dx, *dy, flags.bits())
            }
            SemanticEvent::KeyboardKeycode { code, pressed } => {
                self.session.notify_keyboard_keycode(*code, *pressed)
            }
        };

        match result {
            Ok(()) => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                debug!(?event, "forwarded");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(?event, error = %e, "remote notification failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockSession, Notification};
    use vdesk_types::AxisFlags;

    #[test]
    fn dispatch_maps_each_event_kind() {
        let session = MockSession::new();
        let handle = session.handle();
        let translator = Translator::new(session);

        translator.dispatch(&SemanticEvent::PointerMotionRelative { dx: 5.0, dy: -3.0 });
        translator.dispatch(&SemanticEvent::PointerMotionAbsolute {
            surface: "vdesk".to_string(),
            x: 1.0,
            y: 2.0,
        });
        translator.dispatch(&SemanticEvent::PointerButton {
            button: 272,
            pressed: true,
        });
        translator.dispatch(&SemanticEvent::PointerAxis {
            dx: 0.0,
            dy: -1.0,
            flags: AxisFlags::SOURCE_WHEEL,
        });
        translator.dispatch(&SemanticEvent::KeyboardKeycode {
            code: 30,
            pressed: false,
        });

        assert_eq!(
            handle.notifications(),
            vec![
                Notification::MotionRelative { dx: 5.0, dy: -3.0 },
                Notification::MotionAbsolute {
                    surface_id: "vdesk".to_string(),
                    x: 1.0,
                    y: 2.0,
                },
                Notification::Button {
                    button: 272,
                    pressed: true,
                },
                Notification::Axis {
                    dx: 0.0,
                    dy: -1.0,
                    flags: 2,
                },
                Notification::Keycode {
                    keycode: 30,
                    pressed: false,
                },
            ]
        );
        assert_eq!(translator.stats().forwarded(), 5);
        assert_eq!(translator.stats().failed(), 0);
    }

    #[test]
    fn failures_are_swallowed_and_counted() {
        let session = MockSession::new();
        let handle = session.handle();
        handle.set_failing(true);
        let translator = Translator::new(session);

        translator.dispatch(&SemanticEvent::PointerMotionRelative { dx: 1.0, dy: 1.0 });
        translator.dispatch(&SemanticEvent::KeyboardKeycode {
            code: 30,
            pressed: true,
        });

        assert!(handle.notifications().is_empty());
        assert_eq!(translator.stats().failed(), 2);

        handle.set_failing(false);
        translator.dispatch(&SemanticEvent::PointerMotionRelative { dx: 1.0, dy: 1.0 });
        assert_eq!(handle.notifications().len(), 1);
        assert_eq!(translator.stats().forwarded(), 1);
    }
}

//! GNOME Mutter remote desktop session over D-Bus.
//!
//! Opening a session creates a RemoteDesktop session, a ScreenCast session
//! linked to it and a virtual monitor stream. Absolute pointer motion
//! carries the surface id the caller passes, not the stream path. The
//! forwarding worker calls the `notify_*` methods from its own thread, so
//! all calls use the blocking API.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, info};
use vdesk_input::RemoteSession;
use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::{OwnedObjectPath, Value};

use crate::config::SessionConfig;

const REMOTE_DESKTOP_BUS: &str = "org.gnome.Mutter.RemoteDesktop";
const REMOTE_DESKTOP_PATH: &str = "/org/gnome/Mutter/RemoteDesktop";
const REMOTE_DESKTOP_SESSION_IFACE: &str = "org.gnome.Mutter.RemoteDesktop.Session";

const SCREEN_CAST_BUS: &str = "org.gnome.Mutter.ScreenCast";
const SCREEN_CAST_PATH: &str = "/org/gnome/Mutter/ScreenCast";
const SCREEN_CAST_SESSION_IFACE: &str = "org.gnome.Mutter.ScreenCast.Session";

/// A Mutter remote desktop session with one virtual monitor stream.
pub struct MutterSession {
    session: Proxy<'static>,
    session_id: String,
    stream_path: OwnedObjectPath,
}

impl MutterSession {
    /// Connect to the session bus, open a session and start it.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let connection =
            Connection::session().context("Failed to connect to D-Bus session bus")?;
        Self::open_on(&connection, config)
    }

    /// Open a session on an existing connection.
    pub fn open_on(connection: &Connection, config: &SessionConfig) -> Result<Self> {
        let remote_desktop = Proxy::new(
            connection,
            REMOTE_DESKTOP_BUS,
            REMOTE_DESKTOP_PATH,
            REMOTE_DESKTOP_BUS,
        )
        .context("Failed to create RemoteDesktop proxy")?;

        let session_path: OwnedObjectPath = remote_desktop
            .call("CreateSession", &())
            .context("Failed to create RemoteDesktop session")?;
        info!(path = %session_path.as_str(), "RemoteDesktop session created");

        let session = Proxy::new(
            connection,
            REMOTE_DESKTOP_BUS,
            session_path,
            REMOTE_DESKTOP_SESSION_IFACE,
        )
        .context("Failed to create RemoteDesktop.Session proxy")?;

        let session_id: String = session
            .get_property("SessionId")
            .context("Failed to read SessionId")?;
        debug!(session_id = %session_id, "RemoteDesktop session id");

        let screen_cast = Proxy::new(connection, SCREEN_CAST_BUS, SCREEN_CAST_PATH, SCREEN_CAST_BUS)
            .context("Failed to create ScreenCast proxy")?;

        let mut cast_options: HashMap<&str, Value<'_>> = HashMap::new();
        cast_options.insert("remote-desktop-session-id", Value::from(session_id.as_str()));
        let cast_path: OwnedObjectPath = screen_cast
            .call("CreateSession", &(cast_options,))
            .context("Failed to create ScreenCast session")?;

        let cast_session =
            Proxy::new(connection, SCREEN_CAST_BUS, cast_path, SCREEN_CAST_SESSION_IFACE)
                .context("Failed to create ScreenCast.Session proxy")?;

        let mut record_options: HashMap<&str, Value<'_>> = HashMap::new();
        record_options.insert("is-platform", Value::from(config.is_platform));
        record_options.insert("cursor-mode", Value::from(config.cursor_mode));
        let stream_path: OwnedObjectPath = cast_session
            .call("RecordVirtual", &(record_options,))
            .context("Failed to record virtual monitor")?;
        info!(stream = %stream_path.as_str(), "virtual monitor stream created");

        // Input notifications are rejected until the session is started.
        session
            .call_method("Start", &())
            .context("Failed to start RemoteDesktop session")?;
        info!("RemoteDesktop session started");

        Ok(Self {
            session,
            session_id,
            stream_path,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Object path of the virtual monitor stream.
    pub fn stream_path(&self) -> &str {
        self.stream_path.as_str()
    }

    /// Stop the session. Mutter tears down the linked ScreenCast session.
    pub fn stop(&self) -> Result<()> {
        self.session
            .call_method("Stop", &())
            .context("Failed to stop RemoteDesktop session")?;
        info!("RemoteDesktop session stopped");
        Ok(())
    }
}

impl RemoteSession for MutterSession {
    fn notify_pointer_motion_relative(&self, dx: f64, dy: f64) -> Result<()> {
        self.session
            .call_method("NotifyPointerMotionRelative", &(dx, dy))
            .context("NotifyPointerMotionRelative failed")?;
        Ok(())
    }

    fn notify_pointer_motion_absolute(&self, surface_id: &str, x: f64, y: f64) -> Result<()> {
        self.session
            .call_method("NotifyPointerMotionAbsolute", &(surface_id, x, y))
            .context("NotifyPointerMotionAbsolute failed")?;
        Ok(())
    }

    fn notify_pointer_button(&self, button: i32, pressed: bool) -> Result<()> {
        self.session
            .call_method("NotifyPointerButton", &(button, pressed))
            .context("NotifyPointerButton failed")?;
        Ok(())
    }

    fn notify_pointer_axis(&self, dx: f64, dy: f64, flags: u32) -> Result<()> {
        self.session
            .call_method("NotifyPointerAxis", &(dx, dy, flags))
            .context("NotifyPointerAxis failed")?;
        Ok(())
    }

    fn notify_keyboard_keycode(&self, keycode: u32, pressed: bool) -> Result<()> {
        self.session
            .call_method("NotifyKeyboardKeycode", &(keycode, pressed))
            .context("NotifyKeyboardKeycode failed")?;
        Ok(())
    }
}

//! Mock input backends for testing.
//!
//! Mock devices are backed by a real `UnixStream` pair so the poll loop
//! waits on genuine descriptors: sending events makes the device readable,
//! dropping its [`MockDeviceFeed`] produces a hang-up.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vdesk_types::codes::{
    ABS_X, ABS_Y, BTN_LEFT, BTN_MIDDLE, BTN_RIGHT, BTN_TOUCH, REL_HWHEEL, REL_WHEEL, REL_X, REL_Y,
};
use vdesk_types::{DeviceCapabilities, RawEvent};

use crate::error::InputError;
use crate::translate::RemoteSession;
use crate::{DeviceBackend, InputSource};

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

/// Description of a fake device node.
#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    pub name: String,
    pub capabilities: DeviceCapabilities,
    pub fail_open: bool,
}

impl MockDeviceSpec {
    pub fn new(name: &str, capabilities: DeviceCapabilities) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            fail_open: false,
        }
    }

    /// A wheel mouse with three buttons.
    pub fn mouse(name: &str) -> Self {
        Self::new(
            name,
            DeviceCapabilities::default()
                .with_keys([BTN_LEFT, BTN_RIGHT, BTN_MIDDLE])
                .with_relative([REL_X, REL_Y, REL_WHEEL, REL_HWHEEL]),
        )
    }

    /// A full keyboard (`KEY_ESC` through `KEY_F12`).
    pub fn keyboard(name: &str) -> Self {
        Self::new(name, DeviceCapabilities::default().with_keys(1..=88))
    }

    /// An absolute pointing device reporting touch contact.
    pub fn touchpad(name: &str) -> Self {
        Self::new(
            name,
            DeviceCapabilities::default()
                .with_keys([BTN_TOUCH])
                .with_absolute([ABS_X, ABS_Y]),
        )
    }

    /// Something that is neither mouse nor keyboard (power button).
    pub fn other(name: &str) -> Self {
        Self::new(name, DeviceCapabilities::default().with_keys([116]))
    }

    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

#[derive(Default)]
struct BackendState {
    specs: BTreeMap<PathBuf, MockDeviceSpec>,
    feeds: BTreeMap<PathBuf, MockDeviceFeed>,
    opens: BTreeMap<PathBuf, usize>,
    unavailable: bool,
}

/// Mock device backend. Clones share state.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device node.
    pub fn add(&self, path: impl Into<PathBuf>, spec: MockDeviceSpec) {
        self.state.lock().unwrap().specs.insert(path.into(), spec);
    }

    /// Remove a device node so later discoveries no longer see it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.state.lock().unwrap().specs.remove(path.as_ref());
    }

    /// Make enumeration fail as if the device directory were unreadable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Take the feed for the most recently opened instance of `path`.
    ///
    /// The backend keeps the feed (and so the device connection) alive until
    /// it is taken; dropping the taken feed disconnects the device.
    pub fn take_feed(&self, path: impl AsRef<Path>) -> Option<MockDeviceFeed> {
        self.state.lock().unwrap().feeds.remove(path.as_ref())
    }

    /// Wait until `path` has been opened `count` times and take its feed.
    pub fn wait_for_feed(
        &self,
        path: impl AsRef<Path>,
        count: usize,
        timeout: Duration,
    ) -> Option<MockDeviceFeed> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.open_count(path.as_ref()) >= count {
                if let Some(feed) = self.take_feed(path.as_ref()) {
                    return Some(feed);
                }
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    /// How many times `path` has been opened successfully.
    pub fn open_count(&self, path: impl AsRef<Path>) -> usize {
        self.state
            .lock()
            .unwrap()
            .opens
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }
}

impl DeviceBackend for MockBackend {
    type Source = MockDevice;

    fn enumerate(&self) -> Result<Vec<PathBuf>, InputError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(InputError::DeviceDirectory {
                path: PathBuf::from("/dev/input"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        Ok(state.specs.keys().cloned().collect())
    }

    fn open(&self, path: &Path) -> Result<MockDevice, InputError> {
        let mut state = self.state.lock().unwrap();
        let spec = state
            .specs
            .get(path)
            .cloned()
            .ok_or_else(|| InputError::DeviceOpen {
                path: path.to_path_buf(),
                reason: "no such device".to_string(),
            })?;
        if spec.fail_open {
            return Err(InputError::DeviceOpen {
                path: path.to_path_buf(),
                reason: "permission denied".to_string(),
            });
        }
        let (device, feed) = MockDevice::new(&spec.name, spec.capabilities)
            .map_err(|e| InputError::DeviceOpen {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        state.feeds.insert(path.to_path_buf(), feed);
        *state.opens.entry(path.to_path_buf()).or_default() += 1;
        Ok(device)
    }
}

// ---------------------------------------------------------------------------
// MockDevice
// ---------------------------------------------------------------------------

/// Fake open device node.
pub struct MockDevice {
    name: String,
    capabilities: DeviceCapabilities,
    reader: UnixStream,
    queue: Arc<Mutex<VecDeque<RawEvent>>>,
    fail_next_read: Arc<AtomicBool>,
}

/// Test-side end of a [`MockDevice`].
pub struct MockDeviceFeed {
    writer: UnixStream,
    queue: Arc<Mutex<VecDeque<RawEvent>>>,
    fail_next_read: Arc<AtomicBool>,
}

impl MockDevice {
    pub fn new(
        name: &str,
        capabilities: DeviceCapabilities,
    ) -> io::Result<(Self, MockDeviceFeed)> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let fail_next_read = Arc::new(AtomicBool::new(false));
        let device = Self {
            name: name.to_string(),
            capabilities,
            reader,
            queue: Arc::clone(&queue),
            fail_next_read: Arc::clone(&fail_next_read),
        };
        let feed = MockDeviceFeed {
            writer,
            queue,
            fail_next_read,
        };
        Ok((device, feed))
    }
}

impl AsFd for MockDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}

impl InputSource for MockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn read_pending(&mut self, out: &mut Vec<RawEvent>) -> Result<(), InputError> {
        let mut buf = [0u8; 64];
        loop {
            match self.reader.read(&mut buf) {
                // Peer gone: the poll loop sees the hang-up.
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(InputError::Read(e)),
            }
        }

        let mut queue = self.queue.lock().unwrap();
        if self.fail_next_read.swap(false, Ordering::SeqCst) {
            // Whatever was queued is lost, like a kernel buffer overrun.
            queue.clear();
            return Err(InputError::Read(io::Error::other("injected read error")));
        }
        out.extend(queue.drain(..));
        Ok(())
    }
}

impl MockDeviceFeed {
    /// Queue events and wake the poll loop.
    pub fn send(&self, events: &[RawEvent]) -> io::Result<()> {
        self.queue.lock().unwrap().extend(events.iter().copied());
        (&self.writer).write_all(&[1])
    }

    /// Make the next read fail and lose whatever is queued at that point.
    pub fn fail_next_read(&self) {
        self.fail_next_read.store(true, Ordering::SeqCst);
    }

    /// Whether an injected read failure is still waiting to be hit.
    pub fn read_failure_pending(&self) -> bool {
        self.fail_next_read.load(Ordering::SeqCst)
    }

    /// Unplug the device.
    pub fn disconnect(self) {}
}

// ---------------------------------------------------------------------------
// MockSession
// ---------------------------------------------------------------------------

/// One recorded remote notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    MotionRelative { dx: f64, dy: f64 },
    MotionAbsolute { surface_id: String, x: f64, y: f64 },
    Button { button: i32, pressed: bool },
    Axis { dx: f64, dy: f64, flags: u32 },
    Keycode { keycode: u32, pressed: bool },
}

#[derive(Debug, Default)]
struct MockSessionState {
    notifications: Vec<Notification>,
    failing: bool,
}

/// Remote session that records every notification.
#[derive(Default)]
pub struct MockSession {
    state: Arc<Mutex<MockSessionState>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a clonable handle for observing the session from tests.
    pub fn handle(&self) -> MockSessionHandle {
        MockSessionHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, notification: Notification) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            anyhow::bail!("mock session unavailable");
        }
        state.notifications.push(notification);
        Ok(())
    }
}

/// Clonable observer handle for [`MockSession`].
#[derive(Clone)]
pub struct MockSessionHandle {
    state: Arc<Mutex<MockSessionState>>,
}

impl MockSessionHandle {
    /// Snapshot of every notification received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state.lock().unwrap().notifications.clone()
    }

    /// Make every following call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// Wait until at least `count` notifications arrived, then return them all.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Notification> {
        let deadline = Instant::now() + timeout;
        loop {
            let notifications = self.notifications();
            if notifications.len() >= count || Instant::now() >= deadline {
                return notifications;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl RemoteSession for MockSession {
    fn notify_pointer_motion_relative(&self, dx: f64, dy: f64) -> anyhow::Result<()> {
        self.record(Notification::MotionRelative { dx, dy })
    }

    fn notify_pointer_motion_absolute(
        &self,
        surface_id: &str,
        x: f64,
        y: f64,
    ) -> anyhow::Result<()> {
        self.record(Notification::MotionAbsolute {
            surface_id: surface_id.to_string(),
            x,
            y,
        })
    }

    fn notify_pointer_button(&self, button: i32, pressed: bool) -> anyhow::Result<()> {
        self.record(Notification::Button { button, pressed })
    }

    fn notify_pointer_axis(&self, dx: f64, dy: f64, flags: u32) -> anyhow::Result<()> {
        self.record(Notification::Axis { dx, dy, flags })
    }

    fn notify_keyboard_keycode(&self, keycode: u32, pressed: bool) -> anyhow::Result<()> {
        self.record(Notification::Keycode { keycode, pressed })
    }
}

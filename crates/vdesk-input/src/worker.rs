//! The input worker: a dedicated thread running the poll loop.
//!
//! The loop alternates between two phases until the [`ShutdownFlag`] is set:
//!
//! * **Waiting**: rebuild the readiness set from the registry and block in
//!   `poll(2)` for at most the configured timeout. A timeout only leads back
//!   to the flag check.
//! * **Draining**: for every ready descriptor, read all queued events,
//!   coalesce them and forward the results. A hang-up or error on any
//!   descriptor sets the flag and ends the loop.
//!
//! An empty registry ends the loop immediately. The worker owns the registry
//! and every per-device accumulator; only the flag is shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, error, info, warn};
use vdesk_types::{DeviceInfo, RawEvent, SemanticEvent};

use crate::classify::DeviceFilter;
use crate::coalesce::Coalescer;
use crate::error::InputError;
use crate::registry::{discover, DeviceRegistry};
use crate::translate::{ForwardStats, RemoteSession, Translator};
use crate::{DeviceBackend, InputSource};

/// Surface identifier attached to absolute motion unless configured otherwise.
pub const DEFAULT_SURFACE_ID: &str = "vdesk";

/// Default upper bound on one readiness wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Cooperative stop signal shared between the worker and its owner.
///
/// Starts unset and, once set, stays set.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `true` for the call that actually set it.
    pub fn trigger(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the worker thread stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The owner asked it to stop.
    Requested,
    /// Discovery found nothing to poll.
    NoDevices,
    /// A device hung up or reported an error. Rediscover to recover.
    DeviceDisconnected { device: DeviceInfo },
    /// `poll(2)` itself failed.
    PollFailed(String),
    /// The worker thread panicked.
    Panicked,
}

/// Settings for [`InputForwarder`].
#[derive(Debug, Clone)]
pub struct ForwarderOptions {
    pub poll_timeout: Duration,
    pub surface_id: String,
    pub filter: DeviceFilter,
}

impl Default for ForwarderOptions {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            surface_id: DEFAULT_SURFACE_ID.to_string(),
            filter: DeviceFilter::default(),
        }
    }
}

/// Starts input workers.
#[derive(Debug, Clone, Default)]
pub struct InputForwarder {
    options: ForwarderOptions,
}

impl InputForwarder {
    pub fn new(options: ForwarderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ForwarderOptions {
        &self.options
    }

    /// Discover devices and spawn the worker bound to `session`.
    ///
    /// Fails only when the backend cannot enumerate devices at all; in that
    /// case nothing is spawned.
    pub fn start<B, S>(&self, backend: &B, session: Arc<S>) -> Result<WorkerHandle, InputError>
    where
        B: DeviceBackend,
        S: RemoteSession,
    {
        let registry = discover(backend, &self.options.filter)?;
        self.spawn(registry, session)
    }

    /// Spawn the worker over an already-built registry.
    pub fn spawn<D, S>(
        &self,
        registry: DeviceRegistry<D>,
        session: Arc<S>,
    ) -> Result<WorkerHandle, InputError>
    where
        D: InputSource,
        S: RemoteSession,
    {
        let shutdown = ShutdownFlag::new();
        let translator = Translator::new(session);
        let stats = translator.stats();
        let worker = PollLoop::new(registry, translator, shutdown.clone(), &self.options);

        let thread = thread::Builder::new()
            .name("vdesk-input".to_string())
            .spawn(move || worker.run())
            .map_err(InputError::Spawn)?;

        Ok(WorkerHandle {
            shutdown,
            stats,
            thread: Some(thread),
            exit: None,
        })
    }
}

/// Owner's handle on a running worker. Dropping it stops the worker.
pub struct WorkerHandle {
    shutdown: ShutdownFlag,
    stats: Arc<ForwardStats>,
    thread: Option<JoinHandle<WorkerExit>>,
    exit: Option<WorkerExit>,
}

impl WorkerHandle {
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> &ForwardStats {
        &self.stats
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Set the shutdown flag and wait for the worker. Safe to call repeatedly.
    pub fn stop(&mut self) -> WorkerExit {
        self.shutdown.trigger();
        self.join()
    }

    /// Wait for the worker to exit on its own.
    pub fn join(&mut self) -> WorkerExit {
        if let Some(thread) = self.thread.take() {
            let exit = thread.join().unwrap_or(WorkerExit::Panicked);
            self.exit = Some(exit);
        }
        self.exit.clone().unwrap_or(WorkerExit::Requested)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convert the configured wait into a `poll(2)` timeout of 1..=65535 ms.
///
/// Zero would turn the wait into a busy loop.
fn poll_timeout(timeout: Duration) -> PollTimeout {
    let requested = timeout.as_millis();
    let millis = match u16::try_from(requested) {
        Ok(0) => {
            warn!("poll timeout of 0 ms raised to 1 ms");
            1
        }
        Ok(millis) => millis,
        Err(_) => {
            warn!(requested_ms = requested, max_ms = u16::MAX, "poll timeout capped");
            u16::MAX
        }
    };
    PollTimeout::from(millis)
}

struct PollLoop<D, S> {
    registry: DeviceRegistry<D>,
    coalescers: Vec<Coalescer>,
    translator: Translator<Arc<S>>,
    shutdown: ShutdownFlag,
    timeout: PollTimeout,
}

impl<D: InputSource, S: RemoteSession> PollLoop<D, S> {
    fn new(
        registry: DeviceRegistry<D>,
        translator: Translator<Arc<S>>,
        shutdown: ShutdownFlag,
        options: &ForwarderOptions,
    ) -> Self {
        let coalescers = registry
            .all()
            .map(|d| Coalescer::new(d.info.kind, options.surface_id.as_str()))
            .collect();
        Self {
            registry,
            coalescers,
            translator,
            shutdown,
            timeout: poll_timeout(options.poll_timeout),
        }
    }

    fn run(mut self) -> WorkerExit {
        info!(devices = self.registry.len(), "input worker started");
        let exit = self.run_loop();
        let stats = self.translator.stats();
        info!(
            ?exit,
            forwarded = stats.forwarded(),
            failed = stats.failed(),
            "input worker exiting"
        );
        // Dropping `self` closes every device descriptor.
        exit
    }

    fn run_loop(&mut self) -> WorkerExit {
        if self.registry.is_empty() {
            return WorkerExit::NoDevices;
        }

        let mut raw = Vec::new();
        let mut semantic = Vec::new();

        while !self.shutdown.is_set() {
            let ready = match self.wait() {
                Ok(ready) => ready,
                Err(e) => {
                    error!(error = %e, "polling input devices failed");
                    self.shutdown.trigger();
                    return WorkerExit::PollFailed(e.to_string());
                }
            };

            for (index, revents) in ready {
                if self.shutdown.is_set() {
                    break;
                }
                if revents.contains(PollFlags::POLLIN) {
                    self.drain(index, &mut raw, &mut semantic);
                }
                if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL)
                {
                    let device = self.registry.devices_mut()[index].info.clone();
                    warn!(
                        device = %device.name,
                        path = %device.path.display(),
                        "input device disconnected"
                    );
                    self.shutdown.trigger();
                    return WorkerExit::DeviceDisconnected { device };
                }
            }
        }

        WorkerExit::Requested
    }

    /// Wait for readiness on every registered descriptor.
    ///
    /// Returns the indices that reported anything; empty on timeout or
    /// signal interruption.
    fn wait(&self) -> Result<Vec<(usize, PollFlags)>, Errno> {
        let mut fds: Vec<PollFd<'_>> = self
            .registry
            .all()
            .map(|d| PollFd::new(d.source.as_fd(), PollFlags::POLLIN))
            .collect();

        match poll(&mut fds, self.timeout) {
            Ok(0) | Err(Errno::EINTR) => return Ok(Vec::new()),
            Ok(_) => {}
            Err(e) => return Err(e),
        }

        Ok(fds
            .iter()
            .enumerate()
            .filter_map(|(index, fd)| {
                fd.revents()
                    .filter(|revents| !revents.is_empty())
                    .map(|revents| (index, revents))
            })
            .collect())
    }

    /// Read and forward everything queued on one device.
    fn drain(&mut self, index: usize, raw: &mut Vec<RawEvent>, semantic: &mut Vec<SemanticEvent>) {
        let device = &mut self.registry.devices_mut()[index];
        let coalescer = &mut self.coalescers[index];

        raw.clear();
        if let Err(e) = device.source.read_pending(raw) {
            // Half a frame is worse than none.
            warn!(device = %device.info.name, error = %e, "read failed, discarding pending input");
            raw.clear();
            coalescer.reset();
            return;
        }
        debug!(device = %device.info.name, count = raw.len(), "drained events");

        for event in raw.drain(..) {
            coalescer.feed(event, semantic);
        }
        for event in semantic.drain(..) {
            if self.shutdown.is_set() {
                break;
            }
            self.translator.dispatch(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::mock::{MockBackend, MockDevice, MockDeviceSpec, MockSession, Notification};
    use vdesk_types::codes::{BTN_LEFT, KEY_F1, REL_HWHEEL, REL_WHEEL, REL_X, REL_Y};
    use vdesk_types::{DeviceKind, RawEvent};

    const WAIT: Duration = Duration::from_secs(2);

    fn options() -> ForwarderOptions {
        ForwarderOptions {
            poll_timeout: Duration::from_millis(50),
            ..ForwarderOptions::default()
        }
    }

    fn single(kind: DeviceKind) -> (DeviceRegistry<MockDevice>, crate::mock::MockDeviceFeed) {
        let spec = match kind {
            DeviceKind::Mouse => MockDeviceSpec::mouse("mouse"),
            DeviceKind::Keyboard => MockDeviceSpec::keyboard("keyboard"),
        };
        let (device, feed) = MockDevice::new(&spec.name, spec.capabilities).unwrap();
        let mut registry = DeviceRegistry::new();
        registry.insert("/dev/input/event0".into(), spec.name, kind, device);
        (registry, feed)
    }

    fn wait_finished(handle: &WorkerHandle) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if handle.is_finished() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn relative_motion_scenario() {
        let (registry, feed) = single(DeviceKind::Mouse);
        let session = MockSession::new();
        let observed = session.handle();
        let mut handle = InputForwarder::new(options())
            .spawn(registry, Arc::new(session))
            .unwrap();

        feed.send(&[
            RawEvent::relative(REL_X, 5),
            RawEvent::relative(REL_Y, -3),
            RawEvent::sync(),
        ])
        .unwrap();

        assert_eq!(
            observed.wait_for(1, WAIT),
            vec![Notification::MotionRelative { dx: 5.0, dy: -3.0 }]
        );
        assert_eq!(handle.stop(), WorkerExit::Requested);
    }

    #[test]
    fn button_scenario() {
        let (registry, feed) = single(DeviceKind::Mouse);
        let session = MockSession::new();
        let observed = session.handle();
        let mut handle = InputForwarder::new(options())
            .spawn(registry, Arc::new(session))
            .unwrap();

        feed.send(&[RawEvent::key(BTN_LEFT, 1), RawEvent::key(BTN_LEFT, 0)])
            .unwrap();

        assert_eq!(
            observed.wait_for(2, WAIT),
            vec![
                Notification::Button {
                    button: 272,
                    pressed: true,
                },
                Notification::Button {
                    button: 272,
                    pressed: false,
                },
            ]
        );
        handle.stop();
    }

    #[test]
    fn wheel_and_keyboard_forwarding() {
        let backend = MockBackend::new();
        backend.add("/dev/input/event0", MockDeviceSpec::mouse("mouse"));
        backend.add("/dev/input/event1", MockDeviceSpec::keyboard("keyboard"));
        let session = MockSession::new();
        let observed = session.handle();
        let mut handle = InputForwarder::new(options())
            .start(&backend, Arc::new(session))
            .unwrap();

        let mouse = backend.take_feed("/dev/input/event0").unwrap();
        let keyboard = backend.take_feed("/dev/input/event1").unwrap();

        mouse.send(&[RawEvent::relative(REL_WHEEL, 1)]).unwrap();
        observed.wait_for(1, WAIT);
        mouse.send(&[RawEvent::relative(REL_HWHEEL, 1)]).unwrap();
        observed.wait_for(2, WAIT);
        keyboard
            .send(&[RawEvent::key(KEY_F1, 1), RawEvent::sync()])
            .unwrap();

        assert_eq!(
            observed.wait_for(3, WAIT),
            vec![
                Notification::Axis {
                    dx: 0.0,
                    dy: -1.0,
                    flags: 2,
                },
                Notification::Axis {
                    dx: 1.0,
                    dy: 0.0,
                    flags: 2,
                },
                Notification::Keycode {
                    keycode: u32::from(KEY_F1),
                    pressed: true,
                },
            ]
        );
        handle.stop();
    }

    #[test]
    fn accumulators_are_per_device() {
        let backend = MockBackend::new();
        backend.add("/dev/input/event0", MockDeviceSpec::mouse("a"));
        backend.add("/dev/input/event1", MockDeviceSpec::mouse("b"));
        let session = MockSession::new();
        let observed = session.handle();
        let mut handle = InputForwarder::new(options())
            .start(&backend, Arc::new(session))
            .unwrap();
        let a = backend.take_feed("/dev/input/event0").unwrap();
        let b = backend.take_feed("/dev/input/event1").unwrap();

        a.send(&[RawEvent::relative(REL_X, 3)]).unwrap();
        b.send(&[RawEvent::relative(REL_Y, 7), RawEvent::sync()])
            .unwrap();
        observed.wait_for(1, WAIT);
        a.send(&[RawEvent::sync()]).unwrap();

        assert_eq!(
            observed.wait_for(2, WAIT),
            vec![
                Notification::MotionRelative { dx: 0.0, dy: 7.0 },
                Notification::MotionRelative { dx: 3.0, dy: 0.0 },
            ]
        );
        handle.stop();
    }

    #[test]
    fn hangup_stops_the_worker() {
        let (registry, feed) = single(DeviceKind::Mouse);
        let session = MockSession::new();
        let observed = session.handle();
        let mut handle = InputForwarder::new(options())
            .spawn(registry, Arc::new(session))
            .unwrap();
        let flag = handle.shutdown_flag();

        feed.send(&[RawEvent::key(BTN_LEFT, 1)]).unwrap();
        observed.wait_for(1, WAIT);
        feed.disconnect();

        assert!(wait_finished(&handle));
        assert!(flag.is_set());
        match handle.join() {
            WorkerExit::DeviceDisconnected { device } => assert_eq!(device.name, "mouse"),
            other => panic!("unexpected exit: {other:?}"),
        }
        assert_eq!(observed.notifications().len(), 1);
    }

    #[test]
    fn empty_registry_exits_immediately() {
        let mut handle = InputForwarder::new(options())
            .spawn(
                DeviceRegistry::<MockDevice>::new(),
                Arc::new(MockSession::new()),
            )
            .unwrap();
        assert!(wait_finished(&handle));
        assert_eq!(handle.join(), WorkerExit::NoDevices);
    }

    #[test]
    fn stop_is_idempotent() {
        let (registry, _feed) = single(DeviceKind::Keyboard);
        let mut handle = InputForwarder::new(options())
            .spawn(registry, Arc::new(MockSession::new()))
            .unwrap();

        let started = Instant::now();
        assert_eq!(handle.stop(), WorkerExit::Requested);
        assert!(started.elapsed() < WAIT);
        assert_eq!(handle.stop(), WorkerExit::Requested);
        assert!(handle.is_finished());
    }

    #[test]
    fn start_fails_without_device_directory() {
        let backend = MockBackend::new();
        backend.set_unavailable(true);
        let result = InputForwarder::new(options()).start(&backend, Arc::new(MockSession::new()));
        assert!(matches!(result, Err(InputError::DeviceDirectory { .. })));
    }

    #[test]
    fn read_error_discards_pending_motion() {
        let (registry, feed) = single(DeviceKind::Mouse);
        let session = MockSession::new();
        let observed = session.handle();
        let mut handle = InputForwarder::new(options())
            .spawn(registry, Arc::new(session))
            .unwrap();

        feed.send(&[RawEvent::relative(REL_X, 5)]).unwrap();
        feed.fail_next_read();
        feed.send(&[RawEvent::relative(REL_Y, 9)]).unwrap();
        let deadline = Instant::now() + WAIT;
        while feed.read_failure_pending() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        feed.send(&[RawEvent::relative(REL_Y, 1), RawEvent::sync()])
            .unwrap();

        assert_eq!(
            observed.wait_for(1, WAIT),
            vec![Notification::MotionRelative { dx: 0.0, dy: 1.0 }]
        );
        handle.stop();
    }

    #[test]
    fn failed_notifications_do_not_stall_the_loop() {
        let (registry, feed) = single(DeviceKind::Keyboard);
        let session = MockSession::new();
        let observed = session.handle();
        observed.set_failing(true);
        let mut handle = InputForwarder::new(options())
            .spawn(registry, Arc::new(session))
            .unwrap();

        feed.send(&[RawEvent::key(30, 1)]).unwrap();
        let deadline = Instant::now() + WAIT;
        while handle.stats().failed() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.stats().failed(), 1);

        observed.set_failing(false);
        feed.send(&[RawEvent::key(30, 0)]).unwrap();
        assert_eq!(
            observed.wait_for(1, WAIT),
            vec![Notification::Keycode {
                keycode: 30,
                pressed: false,
            }]
        );
        assert!(!handle.is_finished());
        handle.stop();
    }

    #[test]
    fn shutdown_flag_first_writer_wins() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());
        assert!(flag.trigger());
        assert!(!flag.clone().trigger());
        assert!(flag.is_set());
    }

    #[test]
    fn poll_timeout_is_bounded() {
        assert_eq!(poll_timeout(Duration::ZERO), PollTimeout::from(1u16));
        assert_eq!(poll_timeout(Duration::from_millis(1000)), PollTimeout::from(1000u16));
        assert_eq!(poll_timeout(Duration::from_millis(70_000)), PollTimeout::from(u16::MAX));
    }
}

//! Local input capture and forwarding into a remote desktop session.
//!
//! Discovery opens every `/dev/input/event*` node, classifies it as a
//! mouse or keyboard and builds a [`DeviceRegistry`]. A dedicated worker
//! thread polls the registry's descriptors, coalesces raw events per device
//! into [`SemanticEvent`](vdesk_types::SemanticEvent)s and hands them to a
//! [`RemoteSession`].
//!
//! The evdev backend lives behind the `linux` feature; the `mock` feature
//! provides in-memory devices and a recording session for tests.

use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use vdesk_types::{DeviceCapabilities, RawEvent};

pub mod classify;
pub mod coalesce;
pub mod error;
pub mod registry;
pub mod resync;
pub mod translate;
pub mod worker;

#[cfg(feature = "linux")]
pub mod linux;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use classify::{classify, DeviceFilter};
pub use coalesce::Coalescer;
pub use error::InputError;
pub use registry::{discover, DeviceRegistry, RegisteredDevice, SkipReason, SkippedDevice};
pub use translate::{ForwardStats, RemoteSession, Translator};
pub use worker::{
    ForwarderOptions, InputForwarder, ShutdownFlag, WorkerExit, WorkerHandle, DEFAULT_POLL_TIMEOUT,
    DEFAULT_SURFACE_ID,
};

/// An open input device the poll loop can wait on and read from.
pub trait InputSource: AsFd + Send + 'static {
    /// Device name as reported by the driver.
    fn name(&self) -> &str;

    /// Capability snapshot taken when the device was opened.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Append every event currently queued on the device to `out`.
    ///
    /// Returns once the device would block. An error leaves whatever was
    /// read before it in `out`.
    fn read_pending(&mut self, out: &mut Vec<RawEvent>) -> Result<(), InputError>;
}

/// Enumerates and opens device nodes.
pub trait DeviceBackend: Send + Sync + 'static {
    type Source: InputSource;

    /// List candidate device nodes in a stable order.
    ///
    /// Failing to read the device directory at all is an environment error;
    /// an empty list is not.
    fn enumerate(&self) -> Result<Vec<PathBuf>, InputError>;

    /// Open one node read-only and non-blocking.
    fn open(&self, path: &Path) -> Result<Self::Source, InputError>;
}

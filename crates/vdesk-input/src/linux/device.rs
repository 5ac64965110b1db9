//! evdev device nodes.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use evdev::raw_stream::RawDevice;
use nix::fcntl::OFlag;
use tracing::debug;
use vdesk_types::{DeviceCapabilities, RawEvent};

use crate::error::InputError;
use crate::resync::Resync;
use crate::{DeviceBackend, InputSource};

/// Opens `/dev/input/event*` nodes.
#[derive(Debug, Clone)]
pub struct EvdevBackend {
    dir: PathBuf,
    prefix: String,
}

impl Default for EvdevBackend {
    fn default() -> Self {
        Self::new("/dev/input", "event")
    }
}

impl EvdevBackend {
    /// Match nodes in `dir` whose file name starts with `prefix`.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }
}

impl DeviceBackend for EvdevBackend {
    type Source = EvdevSource;

    fn enumerate(&self) -> Result<Vec<PathBuf>, InputError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| InputError::DeviceDirectory {
            path: self.dir.clone(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(&self.prefix))
            })
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn open(&self, path: &Path) -> Result<EvdevSource, InputError> {
        let open_error = |reason: String| InputError::DeviceOpen {
            path: path.to_path_buf(),
            reason,
        };

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path)
            .map_err(|e| open_error(e.to_string()))?;
        let fd = OwnedFd::from(file);
        let poll_fd = fd.try_clone().map_err(|e| open_error(e.to_string()))?;
        let raw = RawDevice::from_fd(fd)
            .map_err(|e| open_error(format!("not an evdev device: {e}")))?;

        Ok(EvdevSource::new(raw, poll_fd))
    }
}

/// An open evdev node.
pub struct EvdevSource {
    raw: RawDevice,
    /// Duplicate of the device descriptor, used for readiness polling.
    poll_fd: OwnedFd,
    name: String,
    capabilities: DeviceCapabilities,
    resync: Resync,
}

impl EvdevSource {
    fn new(raw: RawDevice, poll_fd: OwnedFd) -> Self {
        let name = raw.name().unwrap_or("Unknown Device").to_string();
        let capabilities = capabilities_of(&raw);
        Self {
            raw,
            poll_fd,
            name,
            capabilities,
            resync: Resync::new(),
        }
    }
}

fn capabilities_of(raw: &RawDevice) -> DeviceCapabilities {
    let mut caps = DeviceCapabilities::default().with_bus_type(raw.input_id().bus_type().0);
    if let Some(keys) = raw.supported_keys() {
        caps.keys.extend(keys.iter().map(|key| key.0));
    }
    if let Some(axes) = raw.supported_relative_axes() {
        caps.relative.extend(axes.iter().map(|axis| axis.0));
    }
    if let Some(axes) = raw.supported_absolute_axes() {
        caps.absolute.extend(axes.iter().map(|axis| axis.0));
    }
    caps
}

impl AsFd for EvdevSource {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.poll_fd.as_fd()
    }
}

impl InputSource for EvdevSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn read_pending(&mut self, out: &mut Vec<RawEvent>) -> Result<(), InputError> {
        loop {
            let batch: Vec<RawEvent> = match self.raw.fetch_events() {
                Ok(events) => events
                    .map(|ev| RawEvent::new(ev.event_type().0, ev.code(), ev.value()))
                    .collect(),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(InputError::Read(e)),
            };
            if batch.is_empty() {
                return Ok(());
            }

            for event in batch {
                let raw = &self.raw;
                self.resync.process(event, out, || {
                    let keys = raw.get_key_state()?;
                    Ok(keys.iter().map(|key| key.0).collect::<BTreeSet<u16>>())
                })?;
            }
            debug!(device = %self.name, pending = out.len(), "fetched events");
        }
    }
}

//! Device discovery and the registry of open, classified devices.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};
use vdesk_types::{Classification, DeviceId, DeviceInfo, DeviceKind};

use crate::classify::{classify, DeviceFilter};
use crate::error::InputError;
use crate::{DeviceBackend, InputSource};

/// An open device together with its classification.
pub struct RegisteredDevice<D> {
    pub info: DeviceInfo,
    pub source: D,
}

/// Why discovery left a node out of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    OpenFailed(String),
    Excluded,
    Unclassified,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed(reason) => write!(f, "open failed: {reason}"),
            Self::Excluded => write!(f, "excluded synthetic device"),
            Self::Unclassified => write!(f, "neither mouse nor keyboard"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDevice {
    pub path: PathBuf,
    pub name: Option<String>,
    pub reason: SkipReason,
}

/// Open devices partitioned into mice and keyboards.
///
/// Every device carries a definite [`DeviceKind`], so the full set is always
/// exactly the union of the mouse and keyboard subsets. Dropping the
/// registry closes every descriptor.
pub struct DeviceRegistry<D> {
    devices: Vec<RegisteredDevice<D>>,
    skipped: Vec<SkippedDevice>,
}

impl<D> Default for DeviceRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> DeviceRegistry<D> {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Register a classified device. Returns its ID.
    pub fn insert(
        &mut self,
        path: PathBuf,
        name: String,
        kind: DeviceKind,
        source: D,
    ) -> DeviceId {
        let id = DeviceId(u32::try_from(self.devices.len()).unwrap_or(u32::MAX));
        self.devices.push(RegisteredDevice {
            info: DeviceInfo {
                id,
                name,
                path,
                kind,
            },
            source,
        });
        id
    }

    /// All registered devices, in discovery order.
    pub fn all(&self) -> impl Iterator<Item = &RegisteredDevice<D>> {
        self.devices.iter()
    }

    pub fn mice(&self) -> impl Iterator<Item = &RegisteredDevice<D>> {
        self.of_kind(DeviceKind::Mouse)
    }

    pub fn keyboards(&self) -> impl Iterator<Item = &RegisteredDevice<D>> {
        self.of_kind(DeviceKind::Keyboard)
    }

    fn of_kind(&self, kind: DeviceKind) -> impl Iterator<Item = &RegisteredDevice<D>> {
        self.devices.iter().filter(move |d| d.info.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Nodes discovery looked at but did not register.
    pub fn skipped(&self) -> &[SkippedDevice] {
        &self.skipped
    }

    pub(crate) fn devices_mut(&mut self) -> &mut [RegisteredDevice<D>] {
        &mut self.devices
    }

    fn skip(&mut self, path: PathBuf, name: Option<String>, reason: SkipReason) {
        self.skipped.push(SkippedDevice { path, name, reason });
    }
}

/// Open and classify every device node the backend enumerates.
///
/// Only failing to enumerate is an error. Nodes that fail to open, are
/// excluded by `filter` or are neither mouse nor keyboard are closed,
/// logged and recorded in [`DeviceRegistry::skipped`]. Each call builds a
/// fresh registry, so re-running discovery is the way to pick up hot-plugged
/// devices.
pub fn discover<B: DeviceBackend>(
    backend: &B,
    filter: &DeviceFilter,
) -> Result<DeviceRegistry<B::Source>, InputError> {
    let mut registry = DeviceRegistry::new();

    for path in backend.enumerate()? {
        let source = match backend.open(&path) {
            Ok(source) => source,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping device");
                registry.skip(path, None, SkipReason::OpenFailed(e.to_string()));
                continue;
            }
        };

        let name = source.name().to_string();
        if filter.is_excluded(&name, source.capabilities()) {
            debug!(device = %name, path = %path.display(), "skipping synthetic device");
            registry.skip(path, Some(name), SkipReason::Excluded);
            continue;
        }

        match classify(source.capabilities()).kind() {
            Some(kind) => {
                info!(device = %name, path = %path.display(), %kind, "tracking device");
                registry.insert(path, name, kind, source);
            }
            None => {
                debug!(
                    device = %name,
                    path = %path.display(),
                    classification = %Classification::Unclassified,
                    "skipping device"
                );
                registry.skip(path, Some(name), SkipReason::Unclassified);
            }
        }
    }

    if registry.is_empty() {
        warn!("no mouse or keyboard devices found");
    } else {
        info!(
            mice = registry.mice().count(),
            keyboards = registry.keyboards().count(),
            "device discovery complete"
        );
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockDeviceSpec};

    #[test]
    fn discovery_partitions_devices() {
        let backend = MockBackend::new();
        backend.add("/dev/input/event0", MockDeviceSpec::mouse("USB Mouse"));
        backend.add("/dev/input/event1", MockDeviceSpec::keyboard("AT Keyboard"));
        backend.add("/dev/input/event2", MockDeviceSpec::touchpad("Touchpad"));
        backend.add("/dev/input/event3", MockDeviceSpec::other("Power Button"));

        let registry = discover(&backend, &DeviceFilter::default()).unwrap();

        assert_eq!(registry.len(), 3);
        let mice: Vec<_> = registry.mice().map(|d| d.info.name.clone()).collect();
        assert_eq!(mice, vec!["USB Mouse", "Touchpad"]);
        let keyboards: Vec<_> = registry.keyboards().map(|d| d.info.name.clone()).collect();
        assert_eq!(keyboards, vec!["AT Keyboard"]);
        assert_eq!(
            registry.all().count(),
            registry.mice().count() + registry.keyboards().count()
        );
        assert_eq!(registry.skipped().len(), 1);
        assert_eq!(registry.skipped()[0].reason, SkipReason::Unclassified);
    }

    #[test]
    fn open_failure_skips_only_that_device() {
        let backend = MockBackend::new();
        backend.add("/dev/input/event0", MockDeviceSpec::mouse("Mouse"));
        backend.add("/dev/input/event1", MockDeviceSpec::keyboard("Locked").failing_open());
        backend.add("/dev/input/event2", MockDeviceSpec::keyboard("Keyboard"));

        let registry = discover(&backend, &DeviceFilter::default()).unwrap();

        let names: Vec<_> = registry.all().map(|d| d.info.name.clone()).collect();
        assert_eq!(names, vec!["Mouse", "Keyboard"]);
        assert_eq!(registry.skipped().len(), 1);
        assert_eq!(registry.skipped()[0].path, PathBuf::from("/dev/input/event1"));
        assert!(matches!(
            registry.skipped()[0].reason,
            SkipReason::OpenFailed(_)
        ));
    }

    #[test]
    fn synthetic_devices_are_excluded() {
        let backend = MockBackend::new();
        backend.add("/dev/input/event0", MockDeviceSpec::mouse("vdesk virtual pointer"));
        backend.add("/dev/input/event1", MockDeviceSpec::mouse("Real Mouse"));
        let filter = DeviceFilter::new(["vdesk virtual pointer".to_string()], false);

        let registry = discover(&backend, &filter).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.skipped()[0].reason, SkipReason::Excluded);
    }

    #[test]
    fn empty_directory_is_valid() {
        let registry = discover(&MockBackend::new(), &DeviceFilter::default()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn enumeration_failure_is_an_error() {
        let backend = MockBackend::new();
        backend.set_unavailable(true);
        assert!(matches!(
            discover(&backend, &DeviceFilter::default()),
            Err(InputError::DeviceDirectory { .. })
        ));
    }

    #[test]
    fn ids_follow_discovery_order() {
        let backend = MockBackend::new();
        backend.add("/dev/input/event0", MockDeviceSpec::keyboard("A"));
        backend.add("/dev/input/event1", MockDeviceSpec::mouse("B"));
        let registry = discover(&backend, &DeviceFilter::default()).unwrap();
        let ids: Vec<_> = registry.all().map(|d| d.info.id).collect();
        assert_eq!(ids, vec![DeviceId(0), DeviceId(1)]);
    }
}

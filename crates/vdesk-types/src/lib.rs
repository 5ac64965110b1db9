//! Shared types for vdesk.
//!
//! This crate contains the plain data shared across the vdesk workspace:
//! the Linux input event codes the forwarder cares about, raw events as
//! read from a device node, device capability snapshots and
//! classification, and the semantic events handed to the remote session.

pub mod codes;
pub mod device;
pub mod event;

pub use device::{Classification, DeviceCapabilities, DeviceId, DeviceInfo, DeviceKind};
pub use event::{AxisFlags, RawEvent, SemanticEvent};

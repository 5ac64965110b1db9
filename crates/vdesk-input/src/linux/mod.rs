//! evdev backend for Linux.

mod device;

pub use device::{EvdevBackend, EvdevSource};

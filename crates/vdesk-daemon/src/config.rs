//! Daemon configuration loaded from TOML.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vdesk_input::{DeviceFilter, ForwarderOptions, DEFAULT_SURFACE_ID};

/// Name of the virtual pointer registered by vdesk's own injector.
pub const SYNTHETIC_DEVICE_NAME: &str = "vdesk virtual pointer";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Runtime and supervision settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Rediscover devices and restart forwarding after a device disconnects.
    #[serde(default = "default_true")]
    pub restart_on_disconnect: bool,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            restart_on_disconnect: true,
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

impl DaemonConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Input device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_device_dir")]
    pub device_dir: PathBuf,
    #[serde(default = "default_device_prefix")]
    pub device_prefix: String,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Surface identifier sent with absolute (touchpad) motion.
    #[serde(default = "default_surface_id")]
    pub surface_id: String,
    /// Device names never forwarded, e.g. virtual devices created by an
    /// input injector on this machine.
    #[serde(default = "default_excluded_devices")]
    pub excluded_devices: Vec<String>,
    /// Skip every device on the virtual bus (uinput).
    #[serde(default)]
    pub exclude_virtual_bus: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device_dir: default_device_dir(),
            device_prefix: default_device_prefix(),
            poll_timeout_ms: default_poll_timeout_ms(),
            surface_id: default_surface_id(),
            excluded_devices: default_excluded_devices(),
            exclude_virtual_bus: false,
        }
    }
}

impl InputConfig {
    pub fn forwarder_options(&self) -> ForwarderOptions {
        ForwarderOptions {
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            surface_id: self.surface_id.clone(),
            filter: DeviceFilter::new(self.excluded_devices.iter().cloned(), self.exclude_virtual_bus),
        }
    }
}

/// ScreenCast `RecordVirtual` options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 0 = hidden, 1 = embedded, 2 = metadata.
    #[serde(default = "default_cursor_mode")]
    pub cursor_mode: u32,
    #[serde(default = "default_true")]
    pub is_platform: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cursor_mode: default_cursor_mode(),
            is_platform: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_restart_delay_ms() -> u64 {
    500
}

fn default_device_dir() -> PathBuf {
    PathBuf::from("/dev/input")
}

fn default_device_prefix() -> String {
    "event".to_string()
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_surface_id() -> String {
    DEFAULT_SURFACE_ID.to_string()
}

fn default_excluded_devices() -> Vec<String> {
    vec![SYNTHETIC_DEVICE_NAME.to_string()]
}

fn default_cursor_mode() -> u32 {
    1
}

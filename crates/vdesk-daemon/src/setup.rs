//! Config file location and loading.

use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::error::DaemonError;

/// Load configuration from the given path, or the default location.
///
/// A missing file at the default location means defaults; a missing file
/// given explicitly is an error.
pub fn load_config(path: Option<&str>) -> Result<Config, DaemonError> {
    let config_path = match path {
        Some(p) => {
            let p = PathBuf::from(p);
            if !p.exists() {
                return Err(DaemonError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => default_config_path(),
    };

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| DaemonError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("vdesk")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = load_config(Some("/nonexistent/vdesk/config.toml"));
        assert!(matches!(result, Err(DaemonError::Config(_))));
    }

    #[test]
    fn explicit_file_is_parsed() {
        let path = std::env::temp_dir().join(format!("vdesk-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[input]\npoll_timeout_ms = 20\n").unwrap();
        let config = load_config(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.input.poll_timeout_ms, 20);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("vdesk-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[input\n").unwrap();
        let result = load_config(path.to_str());
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(DaemonError::Config(_))));
    }

    #[test]
    fn default_path_is_under_vdesk() {
        assert!(default_config_path().ends_with("vdesk/config.toml"));
    }
}

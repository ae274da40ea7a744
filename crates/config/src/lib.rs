//! User settings for the pydbg client.
//!
//! Settings live in a TOML file, by default `pydbg/config.toml` under the
//! platform config directory. Every field has a default, so an empty or
//! missing file is valid.
//!
//! ```toml
//! [connection]
//! host = "127.0.0.1"
//! port = 5678
//! connect_attempts = 5
//! connect_backoff_ms = 100
//! handshake = true
//!
//! [requests]
//! reply_timeout_ms = 10000   # 0 waits forever
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const APP_DIR: &str = "pydbg";
const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub requests: RequestSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    /// Total connection attempts before giving up.
    pub connect_attempts: usize,
    /// Delay before the first retry; doubles each time.
    pub connect_backoff_ms: u64,
    /// Exchange versions with the debuggee on connect.
    pub handshake: bool,
    /// Frames queued for sending before senders wait.
    pub outbound_buffer: usize,
    pub max_frame_len: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5678,
            connect_attempts: 5,
            connect_backoff_ms: 100,
            handshake: true,
            outbound_buffer: 256,
            max_frame_len: 16 * 1024 * 1024,
        }
    }
}

impl ConnectionSettings {
    /// `host:port`, ready to be resolved.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    pub reply_timeout_ms: u64,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 10_000,
        }
    }
}

impl RequestSettings {
    /// `None` when replies should be awaited forever.
    pub fn reply_timeout(&self) -> Option<Duration> {
        (self.reply_timeout_ms > 0).then(|| Duration::from_millis(self.reply_timeout_ms))
    }
}

/// Where settings are read from when no path is given.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILENAME))
}

/// Load settings from `path`. The file must exist.
pub fn load(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded settings");
    Ok(settings)
}

/// Load settings from the default location, falling back to defaults when
/// there is no file.
pub fn load_default() -> Result<Settings, ConfigError> {
    match default_path() {
        Some(path) if path.exists() => load(&path),
        _ => {
            tracing::debug!("no settings file, using defaults");
            Ok(Settings::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = write_config(
            r#"
            [connection]
            port = 9000
            handshake = false

            [requests]
            reply_timeout_ms = 0
            "#,
        );

        let settings = load(file.path()).unwrap();
        assert_eq!(settings.connection.port, 9000);
        assert!(!settings.connection.handshake);
        assert_eq!(settings.connection.host, "127.0.0.1");
        assert_eq!(settings.connection.outbound_buffer, 256);
        assert_eq!(settings.requests.reply_timeout(), None);
        assert_eq!(settings.connection.address(), "127.0.0.1:9000");
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let file = write_config("");
        let settings = load(file.path()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(
            settings.requests.reply_timeout(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(load(&path), Err(ConfigError::NotFound(p)) if p == path));
    }

    #[test]
    fn invalid_toml_reports_the_path() {
        let file = write_config("[connection]\nport = \"not a number\"\n");
        let err = load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn default_path_ends_with_app_file() {
        if let Some(path) = default_path() {
            assert!(path.ends_with("pydbg/config.toml"));
        }
    }
}

//! # Configuration
//!
//! [`CaptureConfig`] holds everything needed for a capture run.
//!
//! ## Loading Priority
//!
//! Configuration is loaded from the first source that provides a value:
//!
//! 1. Explicit struct fields (programmatic construction)
//! 2. Environment variables (`NEUROSITY_DEVICE_ID`, `NEUROSITY_EMAIL`, etc.)
//! 3. TOML config file at an explicit path
//! 4. `./neurosity.toml` in the current directory
//! 5. `~/.config/neurosity-capture/neurosity.toml`
//!
//! Individual fields can always be overridden by environment variables,
//! even when loading from a file. A missing credential is a startup-time
//! fault ([`CaptureError::ConfigError`]), never a runtime fault.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, CaptureResult};

/// Default device gateway WebSocket URL.
pub const DEFAULT_GATEWAY_URL: &str = "wss://device.neurosity.co";

/// Default output CSV path.
pub const DEFAULT_OUTPUT_PATH: &str = "neurosity_readings.csv";

/// Default capture window in seconds.
const DEFAULT_DURATION_SECS: u64 = 30;

/// Default RPC call timeout in seconds.
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

/// Configuration for a capture run against the Neurosity device gateway.
///
/// # Examples
///
/// ## From environment variables
///
/// ```no_run
/// use neurosity_capture::config::CaptureConfig;
///
/// // Set NEUROSITY_DEVICE_ID, NEUROSITY_EMAIL and NEUROSITY_PASSWORD, then:
/// let config = CaptureConfig::from_env().expect("Missing env vars");
/// ```
///
/// ## Programmatic
///
/// ```
/// use neurosity_capture::config::CaptureConfig;
///
/// let config = CaptureConfig::new("crown-1234", "me@example.com", "hunter2");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Device identifier from the Neurosity developer console.
    pub device_id: String,

    /// Account email.
    pub email: String,

    /// Account password.
    pub password: String,

    /// WebSocket URL for the device gateway.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// CSV file the capture is flushed to. Overwritten on each run.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Length of the capture window, in seconds.
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Timeout for individual JSON-RPC calls, in seconds.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

// ─── Defaults ───────────────────────────────────────────────────────────

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}

fn default_duration() -> u64 {
    DEFAULT_DURATION_SECS
}

fn default_rpc_timeout() -> u64 {
    DEFAULT_RPC_TIMEOUT_SECS
}

// ─── CaptureConfig impl ─────────────────────────────────────────────────

impl CaptureConfig {
    /// Create a config with just credentials (all other fields use defaults).
    pub fn new(
        device_id: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            email: email.into(),
            password: password.into(),
            gateway_url: default_gateway_url(),
            output_path: default_output_path(),
            duration_secs: DEFAULT_DURATION_SECS,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
        }
    }

    /// Load config from environment variables.
    ///
    /// Required: `NEUROSITY_DEVICE_ID`, `NEUROSITY_EMAIL`, `NEUROSITY_PASSWORD`
    ///
    /// Optional: `NEUROSITY_GATEWAY_URL`, `NEUROSITY_OUTPUT`
    pub fn from_env() -> CaptureResult<Self> {
        let device_id = require_env("NEUROSITY_DEVICE_ID")?;
        let email = require_env("NEUROSITY_EMAIL")?;
        let password = require_env("NEUROSITY_PASSWORD")?;

        let mut config = Self::new(device_id, email, password);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from a TOML file, with environment variable overrides.
    ///
    /// Environment variables take precedence over file values for
    /// `device_id`, `email`, `password`, `gateway_url`, and `output_path`.
    pub fn from_file(path: impl AsRef<Path>) -> CaptureResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| CaptureError::ConfigError {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        let mut config: Self = toml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Discover and load config from the standard search path:
    ///
    /// 1. Explicit path (if `Some`)
    /// 2. `NEUROSITY_CONFIG` environment variable
    /// 3. `./neurosity.toml`
    /// 4. `~/.config/neurosity-capture/neurosity.toml`
    ///
    /// Falls back to environment-variable-only config if no file is found.
    pub fn discover(explicit_path: Option<&Path>) -> CaptureResult<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var("NEUROSITY_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        let local_path = PathBuf::from("neurosity.toml");
        if local_path.exists() {
            return Self::from_file(&local_path);
        }

        if let Some(config_path) = dirs_config_path() {
            if config_path.exists() {
                return Self::from_file(&config_path);
            }
        }

        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("NEUROSITY_DEVICE_ID") {
            self.device_id = id;
        }
        if let Ok(email) = std::env::var("NEUROSITY_EMAIL") {
            self.email = email;
        }
        if let Ok(password) = std::env::var("NEUROSITY_PASSWORD") {
            self.password = password;
        }
        if let Ok(url) = std::env::var("NEUROSITY_GATEWAY_URL") {
            self.gateway_url = url;
        }
        if let Ok(output) = std::env::var("NEUROSITY_OUTPUT") {
            self.output_path = PathBuf::from(output);
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn require_env(key: &'static str) -> CaptureResult<String> {
    std::env::var(key).map_err(|_| CaptureError::ConfigError {
        reason: format!("{key} environment variable not set"),
    })
}

/// Platform-appropriate config directory path.
fn dirs_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|dir| PathBuf::from(dir).join("neurosity-capture").join("neurosity.toml"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(|dir| {
            PathBuf::from(dir)
                .join(".config")
                .join("neurosity-capture")
                .join("neurosity.toml")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "NEUROSITY_DEVICE_ID",
        "NEUROSITY_EMAIL",
        "NEUROSITY_PASSWORD",
        "NEUROSITY_GATEWAY_URL",
        "NEUROSITY_OUTPUT",
        "NEUROSITY_CONFIG",
    ];

    struct EnvGuard {
        saved: Vec<(&'static str, Option<OsString>)>,
    }

    impl EnvGuard {
        fn capture() -> Self {
            let saved = ENV_KEYS.iter().map(|k| (*k, std::env::var_os(k))).collect();
            for key in ENV_KEYS {
                unsafe { std::env::remove_var(key) };
            }
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                if let Some(value) = value {
                    unsafe { std::env::set_var(key, value) };
                } else {
                    unsafe { std::env::remove_var(key) };
                }
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn test_new_defaults() {
        let config = CaptureConfig::new("crown-1234", "me@example.com", "secret");
        assert_eq!(config.device_id, "crown-1234");
        assert_eq!(config.email, "me@example.com");
        assert_eq!(config.password, "secret");
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
        assert_eq!(config.duration_secs, 30);
        assert_eq!(config.rpc_timeout_secs, 10);
    }

    #[test]
    fn test_deserialize_toml() {
        let toml_str = r#"
            device_id = "crown-1234"
            email = "me@example.com"
            password = "secret"
            gateway_url = "wss://localhost:9999"
            output_path = "session.csv"
            duration_secs = 10
        "#;

        let _lock = env_lock();
        let _env = EnvGuard::capture();

        let config: CaptureConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device_id, "crown-1234");
        assert_eq!(config.gateway_url, "wss://localhost:9999");
        assert_eq!(config.output_path, PathBuf::from("session.csv"));
        assert_eq!(config.duration_secs, 10);
        // Unspecified fields keep their defaults
        assert_eq!(config.rpc_timeout_secs, 10);
    }

    #[test]
    fn test_from_env_requires_credentials() {
        let _lock = env_lock();
        let _env = EnvGuard::capture();

        let missing_device = CaptureConfig::from_env().unwrap_err();
        assert!(matches!(missing_device, CaptureError::ConfigError { .. }));
        assert!(
            missing_device.to_string().contains("NEUROSITY_DEVICE_ID"),
            "unexpected error: {missing_device}"
        );

        unsafe { std::env::set_var("NEUROSITY_DEVICE_ID", "crown-1234") };
        let missing_email = CaptureConfig::from_env().unwrap_err();
        assert!(
            missing_email.to_string().contains("NEUROSITY_EMAIL"),
            "unexpected error: {missing_email}"
        );

        unsafe { std::env::set_var("NEUROSITY_EMAIL", "me@example.com") };
        let missing_password = CaptureConfig::from_env().unwrap_err();
        assert!(
            missing_password.to_string().contains("NEUROSITY_PASSWORD"),
            "unexpected error: {missing_password}"
        );

        unsafe { std::env::set_var("NEUROSITY_PASSWORD", "secret") };
        unsafe { std::env::set_var("NEUROSITY_GATEWAY_URL", "ws://localhost:7000") };
        unsafe { std::env::set_var("NEUROSITY_OUTPUT", "run.csv") };

        let config = CaptureConfig::from_env().unwrap();
        assert_eq!(config.device_id, "crown-1234");
        assert_eq!(config.email, "me@example.com");
        assert_eq!(config.password, "secret");
        assert_eq!(config.gateway_url, "ws://localhost:7000");
        assert_eq!(config.output_path, PathBuf::from("run.csv"));
    }

    #[test]
    fn test_from_file_env_overrides_precedence() {
        let _lock = env_lock();
        let _env = EnvGuard::capture();

        let dir = unique_temp_dir("from-file-overrides");
        let config_path = dir.join("neurosity.toml");
        std::fs::write(
            &config_path,
            r#"
device_id = "file-device"
email = "file@example.com"
password = "file-secret"
gateway_url = "wss://file.example:7000"
"#,
        )
        .unwrap();

        unsafe { std::env::set_var("NEUROSITY_DEVICE_ID", "env-device") };
        unsafe { std::env::set_var("NEUROSITY_GATEWAY_URL", "wss://env.example:7000") };

        let config = CaptureConfig::from_file(&config_path).unwrap();
        assert_eq!(config.device_id, "env-device");
        assert_eq!(config.email, "file@example.com");
        assert_eq!(config.gateway_url, "wss://env.example:7000");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_from_file_missing_and_invalid_errors() {
        let _lock = env_lock();
        let _env = EnvGuard::capture();
        let dir = unique_temp_dir("from-file-errors");

        let missing = CaptureConfig::from_file(dir.join("missing.toml")).unwrap_err();
        assert!(matches!(missing, CaptureError::ConfigError { .. }));
        assert!(
            missing.to_string().contains("Failed to read config file"),
            "unexpected error: {missing}"
        );

        let invalid_path = dir.join("invalid.toml");
        std::fs::write(&invalid_path, "device_id = [").unwrap();
        let invalid = CaptureConfig::from_file(&invalid_path).unwrap_err();
        assert!(matches!(invalid, CaptureError::ConfigError { .. }));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_discover_explicit_path_and_env_pointer() {
        let _lock = env_lock();
        let _env = EnvGuard::capture();

        let dir = unique_temp_dir("discover");
        let explicit_path = dir.join("explicit.toml");
        let pointed_path = dir.join("pointed.toml");
        write_minimal_config(&explicit_path, "explicit-device");
        write_minimal_config(&pointed_path, "pointed-device");

        let explicit = CaptureConfig::discover(Some(&explicit_path)).unwrap();
        assert_eq!(explicit.device_id, "explicit-device");

        unsafe {
            std::env::set_var("NEUROSITY_CONFIG", pointed_path.to_string_lossy().to_string());
        }
        let pointed = CaptureConfig::discover(None).unwrap();
        assert_eq!(pointed.device_id, "pointed-device");

        std::fs::remove_dir_all(dir).unwrap();
    }

    fn unique_temp_dir(label: &str) -> PathBuf {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "neurosity-capture-config-tests-{}-{}-{}",
            label,
            std::process::id(),
            now
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_minimal_config(path: &Path, device_id: &str) {
        std::fs::write(
            path,
            format!(
                r#"
device_id = "{device_id}"
email = "me@example.com"
password = "secret"
"#
            ),
        )
        .unwrap();
    }
}

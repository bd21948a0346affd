//! Runtime limits and the JSON configuration file.
//!
//! [`RuntimeConfig`] holds the three limits every request honors and is
//! lenient: a missing, malformed or non-positive value falls back to its
//! default instead of failing the run. [`ConfigStore`] owns the file on disk,
//! preserves keys it does not know about, and doubles as the
//! [`SessionStore`] for the last verified session.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{AuthError, PersistedSession, SessionStore};
use crate::download::{
    DEFAULT_READ_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_ATTEMPTS, RequestOptions,
    RetryPolicy,
};

const APP_DIR: &str = "coursefetch";
const CONFIG_FILE: &str = "config.json";
const COOKIE_PREFIX: &str = "cookie:";

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a JSON object of the expected shape.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The file could not be written.
    #[error("failed to write config file '{path}': {source}")]
    Write {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A cookie file held no cookie.
    #[error("cookie file '{path}' does not contain a cookie")]
    EmptyCookieFile {
        /// Cookie file path.
        path: PathBuf,
    },
}

/// Attempt budget and timeouts, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Attempts per logical request or transfer (at least 1).
    pub retry_attempts: u32,
    /// Ceiling on request setup and header receipt.
    pub request_timeout: Duration,
    /// Ceiling on the gap between body chunks.
    pub read_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl RuntimeConfig {
    /// Reads the three limits from the file, field by field falling back to
    /// the defaults.
    #[must_use]
    pub fn from_file(file: &FileConfig) -> Self {
        let defaults = Self::default();
        Self {
            retry_attempts: lenient_positive("retry_attempts", file.retry_attempts.as_ref())
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.retry_attempts),
            request_timeout: lenient_positive(
                "request_timeout_ms",
                file.request_timeout_ms.as_ref(),
            )
            .map_or(defaults.request_timeout, Duration::from_millis),
            read_timeout: lenient_positive("read_timeout_ms", file.read_timeout_ms.as_ref())
                .map_or(defaults.read_timeout, Duration::from_millis),
        }
    }

    /// Applies explicit overrides; zero values are ignored.
    #[must_use]
    pub fn with_overrides(
        mut self,
        retry_attempts: Option<u32>,
        request_timeout_ms: Option<u64>,
        read_timeout_ms: Option<u64>,
    ) -> Self {
        if let Some(attempts) = retry_attempts.filter(|n| *n > 0) {
            self.retry_attempts = attempts;
        }
        if let Some(ms) = request_timeout_ms.filter(|n| *n > 0) {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = read_timeout_ms.filter(|n| *n > 0) {
            self.read_timeout = Duration::from_millis(ms);
        }
        self
    }

    /// The retry policy for this attempt budget.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.retry_attempts)
    }

    /// Request options carrying both timeouts.
    #[must_use]
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions::new(self.request_timeout).with_read_timeout(self.read_timeout)
    }
}

/// Positive integer from a number or a numeric string; anything else is
/// logged and ignored.
fn lenient_positive(field: &str, value: Option<&Value>) -> Option<u64> {
    let value = value?;
    let parsed = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n > 0 => Some(n),
        _ => {
            warn!(field, value = %value, "ignoring invalid config value; using default");
            None
        }
    }
}

/// Contents of the JSON config file.
///
/// Unknown keys are kept in `extra` and written back unchanged.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Attempts per request or transfer (lenient).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<Value>,
    /// Request timeout in milliseconds (lenient).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<Value>,
    /// Body read timeout in milliseconds (lenient).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<Value>,
    /// Cookie to try before any saved session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    /// File holding a cookie to try before any saved session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_file: Option<PathBuf>,
    /// Account email for password login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Account password for password login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Site root for the login and profile endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Root directory for downloaded courses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Directory holding `<course_id>.json` manifests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_dir: Option<PathBuf>,
    /// Sample byte cap; 0 downloads whole files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_bytes: Option<u64>,
    /// Pause between files in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    /// Last verified session cookie.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
    /// When `session_cookie` was stored (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_updated_at: Option<String>,
    /// Keys this version does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for FileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("FileConfig")
            .field("retry_attempts", &self.retry_attempts)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("cookie", &redact(&self.cookie))
            .field("cookie_file", &self.cookie_file)
            .field("email", &self.email)
            .field("password", &redact(&self.password))
            .field("base_url", &self.base_url)
            .field("output_dir", &self.output_dir)
            .field("manifest_dir", &self.manifest_dir)
            .field("sample_bytes", &self.sample_bytes)
            .field("request_delay_ms", &self.request_delay_ms)
            .field("session_cookie", &redact(&self.session_cookie))
            .field("session_updated_at", &self.session_updated_at)
            .finish_non_exhaustive()
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/coursefetch/config.json`
/// 2. `$HOME/.config/coursefetch/config.json`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join(CONFIG_FILE));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(PathBuf::from(home).join(".config").join(APP_DIR).join(CONFIG_FILE))
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Reads a cookie from a file: the first line that is neither blank nor a
/// `#` comment, with an optional `Cookie:` prefix removed.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] when the file cannot be read and
/// [`ConfigError::EmptyCookieFile`] when it holds no cookie line.
pub fn read_cookie_file(path: &Path) -> Result<String, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.get(..COOKIE_PREFIX.len()) {
            Some(head) if head.eq_ignore_ascii_case(COOKIE_PREFIX) => {
                line[COOKIE_PREFIX.len()..].trim().to_string()
            }
            _ => line.to_string(),
        })
        .filter(|cookie| !cookie.is_empty())
        .ok_or_else(|| ConfigError::EmptyCookieFile {
            path: path.to_path_buf(),
        })
}

/// The config file on disk plus its parsed contents.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: FileConfig,
}

impl ConfigStore {
    /// Opens `path`; a missing or empty file yields an empty configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] when the file
    /// exists but is unreadable or not valid JSON.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => FileConfig::default(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file; using defaults");
                FileConfig::default()
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        Ok(Self { path, config })
    }

    /// Config file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed contents.
    #[must_use]
    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    /// Writes the configuration atomically (temporary file, then rename).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] or [`ConfigError::Write`].
    pub fn write(&self) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        let mut body = serde_json::to_string_pretty(&self.config).map_err(ConfigError::Serialize)?;
        body.push('\n');

        let mut temp_name = OsString::from(self.path.as_os_str());
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, body).map_err(write_error)?;
        set_owner_only_permissions(&temp_path).map_err(write_error)?;
        fs::rename(&temp_path, &self.path).map_err(write_error)?;
        debug!(path = %self.path.display(), "config written");
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl SessionStore for ConfigStore {
    fn load(&self) -> Result<Option<PersistedSession>, AuthError> {
        Ok(self
            .config
            .session_cookie
            .as_ref()
            .filter(|cookie| !cookie.trim().is_empty())
            .map(|cookie| PersistedSession {
                cookie: cookie.clone(),
                updated_at: self.config.session_updated_at.clone().unwrap_or_default(),
            }))
    }

    fn save(&mut self, session: &PersistedSession) -> Result<(), AuthError> {
        self.config.session_cookie = Some(session.cookie.clone());
        self.config.session_updated_at = Some(session.updated_at.clone());
        self.write().map_err(|error| AuthError::store(error.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn file_config(value: Value) -> FileConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_runtime_config_defaults() {
        let config = RuntimeConfig::from_file(&FileConfig::default());
        assert_eq!(config.retry_attempts, 4);
        assert_eq!(config.request_timeout, Duration::from_millis(30_000));
        assert_eq!(config.read_timeout, Duration::from_millis(120_000));
    }

    #[test]
    fn test_runtime_config_accepts_numbers_and_numeric_strings() {
        let config = RuntimeConfig::from_file(&file_config(json!({
            "retry_attempts": 6,
            "request_timeout_ms": "5000",
            "read_timeout_ms": 9000
        })));
        assert_eq!(config.retry_attempts, 6);
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
        assert_eq!(config.read_timeout, Duration::from_millis(9000));
    }

    #[test]
    fn test_runtime_config_falls_back_per_field() {
        let config = RuntimeConfig::from_file(&file_config(json!({
            "retry_attempts": "lots",
            "request_timeout_ms": 0,
            "read_timeout_ms": -5
        })));
        assert_eq!(config, RuntimeConfig::default());

        let config = RuntimeConfig::from_file(&file_config(json!({
            "retry_attempts": 2,
            "read_timeout_ms": true
        })));
        assert_eq!(config.retry_attempts, 2);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_overrides_ignore_zero() {
        let config = RuntimeConfig::default().with_overrides(Some(0), Some(1500), None);
        assert_eq!(config.retry_attempts, 4);
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_request_options_carry_read_timeout() {
        let config = RuntimeConfig::default().with_overrides(None, None, Some(700));
        assert_eq!(config.request_options().read_timeout, Some(Duration::from_millis(700)));
        assert_eq!(config.retry_policy().max_attempts(), 4);
    }

    #[test]
    fn test_open_missing_file_is_empty_config() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).unwrap();
        assert_eq!(store.config(), &FileConfig::default());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_open_invalid_json_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ConfigStore::open(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_session_save_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{"email": "a@b.c", "theme": "dark", "retry_attempts": "abc"}"#,
        )
        .unwrap();

        let mut store = ConfigStore::open(&path).unwrap();
        let session = PersistedSession {
            cookie: "csrftoken=t; sessionid=s".to_string(),
            updated_at: "2026-01-02T03:04:05Z".to_string(),
        };
        store.save(&session).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["email"], "a@b.c");
        assert_eq!(raw["retry_attempts"], "abc");
        assert_eq!(raw["session_cookie"], "csrftoken=t; sessionid=s");
        assert_eq!(raw["session_updated_at"], "2026-01-02T03:04:05Z");

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(session));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_written_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::open(&path).unwrap();
        store.write().unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = file_config(json!({
            "cookie": "sessionid=abc",
            "password": "hunter2",
            "session_cookie": "sessionid=def"
        }));
        let debug = format!("{config:?}");
        assert!(!debug.contains("abc"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("def"));
    }

    #[test]
    fn test_read_cookie_file_skips_comments_and_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookie.txt");
        fs::write(&path, "# exported\n\nCookie: sessionid=xyz; csrftoken=t\n").unwrap();
        assert_eq!(read_cookie_file(&path).unwrap(), "sessionid=xyz; csrftoken=t");

        fs::write(&path, "# nothing here\n").unwrap();
        assert!(matches!(
            read_cookie_file(&path),
            Err(ConfigError::EmptyCookieFile { .. })
        ));
    }
}

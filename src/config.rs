//! # Application Configuration
//!
//! [`AppConfig`] gathers every knob the framework reads at runtime. It can be built in
//! code, loaded from a YAML or TOML file, and then patched from the environment.
//!
//! ## Defaults
//!
//! | key | default |
//! |-----|---------|
//! | `mode` | `production` |
//! | `debug` | `false` |
//! | `log.handler` | `file` |
//! | `log.log_path` | `storage/log` |
//! | `log.log_file_size` | 2 MiB |
//! | `cookies.prefix` | `brisk` |
//! | `cookies.path` | `/` |
//! | `session.name` | `brisk_sessionid` |
//! | `session.expires` | 3600 seconds |
//! | `http_version` | `1.1` |
//! | `routes.case_sensitive` | `true` |
//! | `routes.match_all` | `false` |
//! | `view.path` | `app/views` |
//!
//! ## Environment Variables
//!
//! - `BRISK_MODE` replaces `mode`
//! - `BRISK_DEBUG` replaces `debug` (`true`/`false`/`1`/`0`)
//! - `BRISK_LOG_PATH` replaces `log.log_path`
//!
//! ## Example
//!
//! ```rust,no_run
//! use brisk::config::AppConfig;
//!
//! let config = AppConfig::load("config/app.yaml")?.apply_env();
//! println!("running in {} mode", config.mode);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::FrameworkError;

/// Two megabytes, the size at which a log file is rotated.
pub const DEFAULT_LOG_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Top-level framework configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application mode; used by [`Application::configure_mode`](crate::app::Application::configure_mode).
    pub mode: String,
    /// Render full fault details instead of the generic error page.
    pub debug: bool,
    pub log: LogSettings,
    pub cookies: CookieSettings,
    pub session: SessionSettings,
    /// Protocol version reported in the status line.
    pub http_version: String,
    pub routes: RouteSettings,
    pub view: ViewSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: "production".to_string(),
            debug: false,
            log: LogSettings::default(),
            cookies: CookieSettings::default(),
            session: SessionSettings::default(),
            http_version: "1.1".to_string(),
            routes: RouteSettings::default(),
            view: ViewSettings::default(),
        }
    }
}

/// Which backend the framework logger writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogHandler {
    /// Dated, level-partitioned files under `log_path`.
    #[default]
    File,
    /// Forward every record as a `tracing` event.
    Tracing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub handler: LogHandler,
    pub log_path: PathBuf,
    /// Rotate once a file reaches this many bytes.
    pub log_file_size: u64,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            handler: LogHandler::File,
            log_path: PathBuf::from("storage/log"),
            log_file_size: DEFAULT_LOG_FILE_SIZE,
        }
    }
}

/// Cookie defaults applied to every `Set-Cookie` the framework writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    /// Prefix used by `CookieJar::clear` when no explicit prefix is given.
    pub prefix: String,
    /// Sign cookie values with `secret_key`.
    pub encrypt: bool,
    /// Lifetime in seconds; `0` makes browser-session cookies.
    pub expires: i64,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub httponly: bool,
    pub secret_key: String,
    /// Recorded for compatibility with deployments that name a cipher; values are signed, not encrypted.
    pub cipher: String,
    pub cipher_mode: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            prefix: "brisk".to_string(),
            encrypt: false,
            expires: 0,
            path: "/".to_string(),
            domain: None,
            secure: false,
            httponly: false,
            secret_key: "CHANGE_ME".to_string(),
            cipher: "aes-256".to_string(),
            cipher_mode: "cbc".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Cookie that carries the session id.
    pub name: String,
    /// Seconds of inactivity before the store forgets a session.
    pub expires: u64,
    pub cookie_path: String,
    pub cookie_domain: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            name: "brisk_sessionid".to_string(),
            expires: 3600,
            cookie_path: "/".to_string(),
            cookie_domain: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub case_sensitive: bool,
    /// Collect every matching route instead of stopping at the first.
    pub match_all: bool,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            match_all: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Directory that holds view templates.
    pub path: PathBuf,
    /// File extension appended to template names.
    pub extension: String,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("app/views"),
            extension: "html".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a `.yaml`/`.yml` or `.toml` file.
    ///
    /// Missing keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unknown extension,
    /// or does not deserialize.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let config = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&raw)?,
            "toml" => Self::from_toml_str(&raw)?,
            other => {
                return Err(FrameworkError::UnsupportedConfigFormat(other.to_string()).into());
            }
        };
        tracing::info!(
            path = %path.display(),
            mode = %config.mode,
            debug = config.debug,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error when the document is not valid YAML for this shape.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("invalid YAML configuration")
    }

    /// # Errors
    ///
    /// Returns an error when the document is not valid TOML for this shape.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid TOML configuration")
    }

    /// Defaults patched from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Apply `BRISK_MODE`, `BRISK_DEBUG` and `BRISK_LOG_PATH` on top of this configuration.
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Same as [`apply_env`](Self::apply_env) with an injectable lookup.
    #[must_use]
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("BRISK_MODE").filter(|m| !m.trim().is_empty()) {
            self.mode = mode.trim().to_string();
        }
        if let Some(debug) = lookup("BRISK_DEBUG").and_then(|v| parse_bool(&v)) {
            self.debug = debug;
        }
        if let Some(path) = lookup("BRISK_LOG_PATH").filter(|p| !p.is_empty()) {
            self.log.log_path = PathBuf::from(path);
        }
        self
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// Desktop shell configuration.
//
// File: `~/.gristdesk/config.toml`, then `GRIST_*` environment overrides. An
// invalid environment value is logged and replaced by the default.

use std::path::{Path, PathBuf};

use gristdesk_common::file_kind::DEFAULT_IMPORTABLE_EXTENSIONS;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::lifecycle::http_server::DEFAULT_REQUEST_TIMEOUT;
use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};
use crate::window::bridge_host::default_opener;

pub const DEFAULT_EMAIL: &str = "you@example.com";
pub const DEFAULT_USERNAME: &str = "You";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 47478;

/// Root directory for gristdesk state: `~/.gristdesk/`.
pub fn app_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".gristdesk"))
}

/// Path to the config file: `~/.gristdesk/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    app_dir().map(|d| d.join("config.toml"))
}

/// How windows prove they belong to this process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Every window URL carries the login credential and login is forced.
    #[default]
    Strict,
    /// No credential in window URLs.
    None,
    /// Credential attached, anonymous access still allowed.
    Mixed,
}

impl AuthMode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "strict" => Some(Self::Strict),
            "none" => Some(Self::None),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

// ── Config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DesktopConfig {
    /// Login of the single local user.
    pub default_email: String,
    pub default_username: String,
    /// Host and port of the embedded application server.
    pub host: String,
    pub port: u16,
    pub auth: AuthMode,
    /// Where new documents go by default (`GRIST_DATA_DIR`).
    pub data_dir: Option<PathBuf>,
    /// Home database file (`TYPEORM_DATABASE`).
    pub home_db: Option<PathBuf>,
    /// Extensions opened through the import flow, without the dot.
    pub importable_extensions: Vec<String>,
    /// Request timeout for calls into the embedded server.
    pub request_timeout_secs: u64,
    pub window: WindowConfig,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            default_email: DEFAULT_EMAIL.into(),
            default_username: DEFAULT_USERNAME.into(),
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            auth: AuthMode::Strict,
            data_dir: None,
            home_db: None,
            importable_extensions: DEFAULT_IMPORTABLE_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            window: WindowConfig::default(),
        }
    }
}

/// How windows are shown. File only, no environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Argv template started once per window; `{url}` is replaced by the
    /// window URL.
    pub launcher: Vec<String>,
    /// Argv template for links opened in the system browser.
    pub opener: Vec<String>,
    /// Treat the launcher process exiting as the window closing.
    pub track_exit: bool,
    /// Port of the window bridge WebSocket server; 0 picks a free one.
    pub bridge_port: u16,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { launcher: default_opener(), opener: default_opener(), track_exit: false, bridge_port: 0 }
    }
}

impl DesktopConfig {
    /// Config file at `path` (or the default location) with environment
    /// overrides applied. A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(config_path);
        let mut config = match path {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific path, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
            ensure_owner_only_dir(parent).map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io).and_then(|_| {
            ensure_owner_only_file(path).map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))
        })
    }

    /// Apply `GRIST_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(email) = non_empty(lookup("GRIST_DEFAULT_EMAIL")) {
            self.default_email = email;
        }
        if let Some(name) = non_empty(lookup("GRIST_DEFAULT_USERNAME")) {
            self.default_username = name;
        }
        if let Some(host) = non_empty(lookup("GRIST_HOST")) {
            self.host = host;
        }
        if let Some(raw) = lookup("GRIST_PORT") {
            match parse_port(&raw) {
                Some(port) => self.port = port,
                None => {
                    warn!(key = "GRIST_PORT", value = %raw, default = DEFAULT_PORT, "invalid value, using default");
                    self.port = DEFAULT_PORT;
                }
            }
        }

        let auth = match (lookup("GRIST_DESKTOP_AUTH"), lookup("GRIST_ELECTRON_AUTH")) {
            (Some(auth), Some(_)) => {
                warn!("GRIST_DESKTOP_AUTH set, ignoring GRIST_ELECTRON_AUTH (deprecated)");
                Some(auth)
            }
            (None, Some(auth)) => {
                warn!("GRIST_ELECTRON_AUTH is deprecated, use GRIST_DESKTOP_AUTH instead");
                Some(auth)
            }
            (auth, None) => auth,
        };
        if let Some(raw) = auth {
            match AuthMode::parse(&raw) {
                Some(mode) => self.auth = mode,
                None => {
                    warn!(key = "GRIST_DESKTOP_AUTH", value = %raw, default = "strict", "invalid value, using default");
                    self.auth = AuthMode::Strict;
                }
            }
        }

        if let Some(dir) = non_empty(lookup("GRIST_DATA_DIR")) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(db) = non_empty(lookup("TYPEORM_DATABASE")) {
            self.home_db = Some(PathBuf::from(db));
        }
        if let Some(raw) = lookup("GRIST_IMPORTABLE_EXTENSIONS") {
            let extensions = parse_extensions(&raw);
            if extensions.is_empty() {
                warn!(key = "GRIST_IMPORTABLE_EXTENSIONS", value = %raw, "no extensions given, using defaults");
            } else {
                self.importable_extensions = extensions;
            }
        }
    }

    /// Base URL of the embedded server: `http://<host>:<port>`.
    pub fn home_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}:{}", self.host, self.port))
    }

    /// Whether window URLs carry the login credential.
    pub fn attaches_credential(&self) -> bool {
        self.auth != AuthMode::None
    }

    /// Documents directory: configured, else the platform documents folder,
    /// else the app directory.
    pub fn docs_dir(&self, app_dir: &Path) -> PathBuf {
        self.data_dir.clone().or_else(dirs::document_dir).unwrap_or_else(|| app_dir.join("docs"))
    }

    pub fn home_db_path(&self, app_dir: &Path) -> PathBuf {
        self.home_db.clone().unwrap_or_else(|| app_dir.join("landing.db"))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn parse_port(raw: &str) -> Option<u16> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u16>().ok().filter(|port| *port > 0)
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::TempDir;

    fn with_env(pairs: &[(&str, &str)]) -> DesktopConfig {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let mut cfg = DesktopConfig::default();
        cfg.apply_env(|key| env.get(key).cloned());
        cfg
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = DesktopConfig::default();
        assert_eq!(cfg.default_email, "you@example.com");
        assert_eq!(cfg.default_username, "You");
        assert_eq!(cfg.port, 47478);
        assert_eq!(cfg.auth, AuthMode::Strict);
        assert_eq!(cfg.home_url().unwrap().as_str(), "http://localhost:47478/");
        assert!(cfg.importable_extensions.contains(&"xlsx".to_string()));
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = DesktopConfig {
            port: 8484,
            auth: AuthMode::Mixed,
            data_dir: Some(PathBuf::from("/srv/docs")),
            window: WindowConfig { launcher: vec!["chromium".into(), "--app={url}".into()], track_exit: true, ..Default::default() },
            ..Default::default()
        };
        cfg.save_to(&path).unwrap();
        let loaded = DesktopConfig::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
host = "127.0.0.1"

[window]
bridge_port = 47479
"#;
        let cfg: DesktopConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.window.bridge_port, 47479);
        assert_eq!(cfg.window.opener, default_opener());
    }

    #[test]
    fn env_overrides_file_values() {
        let cfg = with_env(&[
            ("GRIST_DEFAULT_EMAIL", "ada@example.com"),
            ("GRIST_HOST", "127.0.0.1"),
            ("GRIST_PORT", "9000"),
            ("GRIST_DESKTOP_AUTH", "none"),
            ("GRIST_DATA_DIR", "/data"),
            ("TYPEORM_DATABASE", "/data/home.db"),
            ("GRIST_IMPORTABLE_EXTENSIONS", ".csv, XLSX"),
        ]);
        assert_eq!(cfg.default_email, "ada@example.com");
        assert_eq!(cfg.home_url().unwrap().as_str(), "http://127.0.0.1:9000/");
        assert!(!cfg.attaches_credential());
        assert_eq!(cfg.docs_dir(Path::new("/app")), PathBuf::from("/data"));
        assert_eq!(cfg.home_db_path(Path::new("/app")), PathBuf::from("/data/home.db"));
        assert_eq!(cfg.importable_extensions, vec!["csv".to_string(), "xlsx".to_string()]);
    }

    #[test]
    fn invalid_env_values_fall_back_to_defaults() {
        for bad in ["0", "65536", "80a", "", "-1"] {
            assert_eq!(with_env(&[("GRIST_PORT", bad)]).port, DEFAULT_PORT, "port {bad:?}");
        }
        assert_eq!(with_env(&[("GRIST_PORT", "65535")]).port, 65535);
        assert_eq!(with_env(&[("GRIST_DESKTOP_AUTH", "open")]).auth, AuthMode::Strict);
        assert!(!with_env(&[("GRIST_IMPORTABLE_EXTENSIONS", " , ")]).importable_extensions.is_empty());
    }

    #[test]
    fn deprecated_auth_variable_is_honoured_only_alone() {
        assert_eq!(with_env(&[("GRIST_ELECTRON_AUTH", "mixed")]).auth, AuthMode::Mixed);
        let cfg = with_env(&[("GRIST_ELECTRON_AUTH", "none"), ("GRIST_DESKTOP_AUTH", "mixed")]);
        assert_eq!(cfg.auth, AuthMode::Mixed);
        assert!(cfg.attaches_credential());
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(matches!(DesktopConfig::load_from(&path), Err(ConfigError::Parse(_))));
    }
}

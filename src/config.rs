//! Runtime configuration read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `GHMIRROR_DB` | `<cache dir>/ghmirror/mirror.db` |
//! | `GHMIRROR_API_URL` | `https://api.github.com` |
//! | `GHMIRROR_TIMEOUT_SECS` | `30` |
//! | `GHMIRROR_SECRET_KEY` | unset (64 hex chars, required by the broker) |
//! | `GHMIRROR_APP_ID` | unset |
//! | `GHMIRROR_APP_PRIVATE_KEY` / `GHMIRROR_APP_PRIVATE_KEY_PATH` | unset (PEM) |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// GitHub App identity used to look up installations and mint tokens.
#[derive(Clone)]
pub struct AppCredentials {
    pub app_id: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub api_url: String,
    pub timeout: Duration,
    pub secret_key: Option<String>,
    pub app: Option<AppCredentials>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secret_key: None,
            app: None,
        }
    }
}

/// `~/.cache/ghmirror/mirror.db` (or the platform equivalent).
pub fn default_db_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("ghmirror")
        .join("mirror.db")
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("GHMIRROR_DB") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(url) = get("GHMIRROR_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(value) = get("GHMIRROR_TIMEOUT_SECS") {
            let secs: u64 = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    name: "GHMIRROR_TIMEOUT_SECS",
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "GHMIRROR_TIMEOUT_SECS",
                    value,
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.timeout = Duration::from_secs(secs);
        }

        config.secret_key = get("GHMIRROR_SECRET_KEY");

        if let Some(app_id) = get("GHMIRROR_APP_ID") {
            let private_key_pem = match get("GHMIRROR_APP_PRIVATE_KEY") {
                Some(pem) => pem,
                None => {
                    let path = get("GHMIRROR_APP_PRIVATE_KEY_PATH")
                        .map(PathBuf::from)
                        .ok_or(ConfigError::Missing("GHMIRROR_APP_PRIVATE_KEY_PATH"))?;
                    std::fs::read_to_string(&path)
                        .map_err(|source| ConfigError::Io { path, source })?
                }
            };
            config.app = Some(AppCredentials {
                app_id,
                private_key_pem,
            });
        }

        Ok(config)
    }

    pub fn require_secret_key(&self) -> Result<&str, ConfigError> {
        self.secret_key
            .as_deref()
            .ok_or(ConfigError::Missing("GHMIRROR_SECRET_KEY"))
    }
}

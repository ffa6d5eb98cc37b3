//!
//! Client configuration
//! --------------------
//! Resolved once at startup from the environment; the CLI layers its flags on
//! top with the `with_*` builders.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;

use crate::error::{AuthError, AuthResult};
use crate::storage::SESSION_FILE;

pub const API_URL_ENV: &str = "SMARTRENTAL_API_URL";
pub const STATE_DIR_ENV: &str = "SMARTRENTAL_STATE_DIR";
pub const TIMEOUT_ENV: &str = "SMARTRENTAL_TIMEOUT_SECS";

pub const DEFAULT_API_URL: &str = "https://smart-rental-management.onrender.com/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: Url,
    pub state_dir: PathBuf,
    pub request_timeout: Duration,
}

fn parse_base_url(raw: &str) -> AuthResult<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|e| AuthError::config(format!("invalid api url '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AuthError::config(format!("unsupported scheme '{}' in api url", other))),
    }
}

fn parse_secs(name: &str, raw: &str) -> AuthResult<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(AuthError::config(format!("{} must be a positive number of seconds, got '{}'", name, raw))),
        Ok(n) => Ok(Duration::from_secs(n)),
    }
}

fn default_state_dir(home: Option<String>) -> PathBuf {
    match home {
        Some(h) if !h.trim().is_empty() => Path::new(&h).join(".smartrental"),
        _ => PathBuf::from(".smartrental"),
    }
}

impl ClientConfig {
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve against an arbitrary variable source. Unset and blank values
    /// take the default; malformed ones are an error.
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let api_base = match get(API_URL_ENV) {
            Some(raw) => parse_base_url(&raw)?,
            None => parse_base_url(DEFAULT_API_URL)?,
        };
        let state_dir = match get(STATE_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => default_state_dir(lookup("HOME")),
        };
        let request_timeout = match get(TIMEOUT_ENV) {
            Some(raw) => parse_secs(TIMEOUT_ENV, &raw)?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };
        Ok(Self { api_base, state_dir, request_timeout })
    }

    pub fn with_api_base(mut self, raw: &str) -> AuthResult<Self> {
        self.api_base = parse_base_url(raw)?;
        Ok(self)
    }

    pub fn with_state_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn credential_path(&self) -> PathBuf { self.state_dir.join(SESSION_FILE) }
}

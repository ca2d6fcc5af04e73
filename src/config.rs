// config.rs

//! Settings file and access token.
//!
//! The YAML file is optional and every key has a default. The token never
//! lives in the file: it comes from the environment, after `.env` has been
//! loaded from the working directory.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::*;
use serde::{Deserialize, Serialize};

use crate::webex::{RetryPolicy, DEFAULT_BASE_URL};

const FILE_NAME: &str = "config.yml";
const CONFIG_DIR: &str = ".config";
const APP_CONFIG_DIR: &str = "webex-tools";

pub const TOKEN_VARS: [&str; 2] = ["WEBEX_ACCESS_TOKEN", "WEBEX_API_TOKEN"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no access token: set WEBEX_ACCESS_TOKEN or WEBEX_API_TOKEN (a .env file works too)")]
    MissingToken,
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub max_retries: u32,
    pub retry_delays_secs: Vec<u64>,
    pub request_delay_ms: u64,
    pub concurrency: usize,
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Settings {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: policy.max_retries,
            retry_delays_secs: policy.delays.iter().map(Duration::as_secs).collect(),
            request_delay_ms: 0,
            concurrency: 5,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Settings {
    /// `~/.config/webex-tools/config.yml`, if a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(APP_CONFIG_DIR).join(FILE_NAME))
    }

    /// Loads `path`, or the default location. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let path = match path.map(Path::to_path_buf).or_else(Settings::default_path) {
            Some(path) => path,
            None => return Ok(Settings::default()),
        };
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let settings = Settings::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    pub fn from_yaml(content: &str) -> Result<Settings, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let delays = if self.retry_delays_secs.is_empty() {
            defaults.delays
        } else {
            self.retry_delays_secs
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect()
        };
        RetryPolicy {
            max_retries: self.max_retries,
            delays,
            request_delay: Duration::from_millis(self.request_delay_ms),
        }
    }
}

/// Loads `.env` from the working directory, then reads the token.
pub fn access_token() -> Result<String, ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded environment from {}", path.display());
    }
    token_from(|name| env::var(name).ok())
}

/// First non-empty token among [`TOKEN_VARS`], quotes stripped.
pub fn token_from(lookup: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    TOKEN_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|raw| clean_token(&raw))
        .find(|token| !token.is_empty())
        .ok_or(ConfigError::MissingToken)
}

pub fn clean_token(raw: &str) -> String {
    raw.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

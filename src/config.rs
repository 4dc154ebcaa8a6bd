use anyhow::{Context, Result};
use directories::ProjectDirs;
use keyring::Entry;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "vibesearch";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_MAX_WAIT_MS: u64 = 300_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub auth_token: String,
    pub verify_ssl: bool,
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            auth_token: String::new(),
            verify_ssl: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // 1. Config file
        if let Some(config_path) = config_file_path() {
            if config_path.exists() {
                info!("Loading config from: {:?}", config_path);
                let content = std::fs::read_to_string(&config_path)
                    .context(format!("Failed to read config file at {:?}", config_path))?;

                match toml::from_str::<FileConfig>(&content) {
                    Ok(file_config) => config.merge(file_config),
                    Err(e) => warn!("Failed to parse config.toml: {}", e),
                }
            }
        }

        // 2. Keyring, only when the file did not carry a token
        if config.auth_token.is_empty() {
            if let Ok(entry) = Entry::new(APP_NAME, "token") {
                if let Ok(password) = entry.get_password() {
                    config.auth_token = password;
                }
            }
        }

        // 3. .env and process environment override everything above
        dotenv::dotenv().ok();
        config.apply_env(|key| env::var(key).ok());

        Ok(config)
    }

    fn merge(&mut self, other: FileConfig) {
        if let Some(v) = other.api_url {
            self.api_url = v;
        }
        if let Some(v) = other.auth_token {
            self.auth_token = v;
        }
        if let Some(v) = other.verify_ssl {
            self.verify_ssl = v;
        }
        if let Some(v) = other.poll_interval_ms {
            self.poll_interval_ms = v;
        }
        if let Some(v) = other.max_wait_ms {
            self.max_wait_ms = v;
        }
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CRIBL_API_URL") {
            self.api_url = val;
        }
        if let Some(val) = lookup("CRIBL_AUTH_TOKEN") {
            self.auth_token = val;
        }
        if let Some(val) = lookup("CRIBL_VERIFY_SSL") {
            match parse_flag(&val) {
                Some(flag) => self.verify_ssl = flag,
                None => warn!("Ignoring CRIBL_VERIFY_SSL={}: expected true or false", val),
            }
        }
        if let Some(val) = lookup("VIBESEARCH_POLL_INTERVAL_MS") {
            match val.parse() {
                Ok(ms) => self.poll_interval_ms = ms,
                Err(e) => warn!("Ignoring VIBESEARCH_POLL_INTERVAL_MS={}: {}", val, e),
            }
        }
        if let Some(val) = lookup("VIBESEARCH_MAX_WAIT_MS") {
            match val.parse() {
                Ok(ms) => self.max_wait_ms = ms,
                Err(e) => warn!("Ignoring VIBESEARCH_MAX_WAIT_MS={}: {}", val, e),
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[derive(Deserialize, Serialize, Default)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub auth_token: Option<String>,
    pub verify_ssl: Option<bool>,
    pub poll_interval_ms: Option<u64>,
    pub max_wait_ms: Option<u64>,
}

impl FileConfig {
    /// Reads the existing file, or an empty config when it is absent or unreadable.
    pub fn read_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content).unwrap_or_default())
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

pub fn config_file_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
}

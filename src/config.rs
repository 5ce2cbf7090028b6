use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default vendor API root.
pub const DEFAULT_API_BASE: &str = "https://app.api.surehub.io/api";

/// Load `KEY=value` pairs from a `.env` file in the working directory.
///
/// Values may contain spaces and may be wrapped in single or double quotes.
/// Variables already present in the environment win over the file.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

fn load_dotenv_from(path: &Path) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the tokio runtime spawns any threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), unquote(value.trim())))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub access: AccessConfig,
    pub coordinator: CoordinatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token for the vendor cloud. Obtained out of band.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Delay between confirmation polls after a tag write.
    pub poll_interval_secs: u64,
    /// Give up waiting for the cache to reflect a tag write after this long.
    pub confirm_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub refresh_interval_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AccessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }
}

impl CoordinatorConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_API_BASE.to_string(),
                token: None,
                timeout_secs: 30,
            },
            access: AccessConfig {
                poll_interval_secs: 2,
                confirm_timeout_secs: 60,
            },
            coordinator: CoordinatorConfig {
                refresh_interval_secs: 300,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base) = std::env::var("SURE_API_BASE") {
            config.api.base_url = base.trim_end_matches('/').to_string();
        }
        if let Ok(token) = std::env::var("SURE_API_TOKEN")
            && !token.is_empty()
        {
            config.api.token = Some(token);
        }
        if let Some(secs) = env_secs("SURE_HTTP_TIMEOUT_SECS") {
            config.api.timeout_secs = secs;
        }

        // Confirmation loop
        if let Some(secs) = env_secs("SURE_POLL_INTERVAL_SECS") {
            config.access.poll_interval_secs = secs;
        }
        if let Some(secs) = env_secs("SURE_CONFIRM_TIMEOUT_SECS") {
            config.access.confirm_timeout_secs = secs;
        }

        if let Some(secs) = env_secs("SURE_REFRESH_INTERVAL_SECS") {
            config.coordinator.refresh_interval_secs = secs;
        }

        config
    }
}

fn env_secs(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}

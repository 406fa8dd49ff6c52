//! Configuration loader and validator for the Piazza→Discord relay.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use url::Url;

use crate::model::Course;
use crate::piazza::{DEFAULT_FEED_LIMIT, PIAZZA_BASE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub piazza: Piazza,
    pub courses: Vec<Course>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_secs: u64,
    /// Bind address for the health endpoint; omitted means no server.
    #[serde(default)]
    pub health_addr: Option<String>,
}

/// Piazza account and API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Piazza {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_feed_limit")]
    pub feed_limit: u32,
}

fn default_base_url() -> String {
    PIAZZA_BASE.to_string()
}

fn default_feed_limit() -> u32 {
    DEFAULT_FEED_LIMIT
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// Override credentials from `PIAZZA_EMAIL` / `PIAZZA_PASSWORD` when set.
    pub fn apply_env(&mut self) {
        if let Ok(email) = std::env::var("PIAZZA_EMAIL") {
            self.piazza.email = email;
        }
        if let Ok(password) = std::env::var("PIAZZA_PASSWORD") {
            self.piazza.password = password;
        }
    }
}

impl App {
    /// `data_dir` with a leading `~/` expanded against `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }
}

/// Load configuration from a YAML file, apply env overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_secs must be > 0"));
    }
    if let Some(addr) = &cfg.app.health_addr {
        if addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid("app.health_addr must be host:port"));
        }
    }

    if cfg.piazza.email.trim().is_empty() {
        return Err(ConfigError::Invalid("piazza.email must be non-empty"));
    }
    if cfg.piazza.password.is_empty() {
        return Err(ConfigError::Invalid("piazza.password must be non-empty"));
    }
    if Url::parse(&cfg.piazza.base_url).is_err() {
        return Err(ConfigError::Invalid("piazza.base_url must be an absolute URL"));
    }
    if cfg.piazza.feed_limit == 0 {
        return Err(ConfigError::Invalid("piazza.feed_limit must be > 0"));
    }

    if cfg.courses.is_empty() {
        return Err(ConfigError::Invalid("courses must list at least one course"));
    }
    for course in &cfg.courses {
        if course.course_id.trim().is_empty() {
            return Err(ConfigError::Invalid("courses[].course_id must be non-empty"));
        }
        if course.piazza_id.trim().is_empty() {
            return Err(ConfigError::Invalid("courses[].piazza_id must be non-empty"));
        }
        if Url::parse(&course.announcement_webhook).is_err() {
            return Err(ConfigError::Invalid(
                "courses[].announcement_webhook must be an absolute URL",
            ));
        }
        if Url::parse(&course.feed_webhook).is_err() {
            return Err(ConfigError::Invalid("courses[].feed_webhook must be an absolute URL"));
        }
    }
    let mut ids: Vec<&str> = cfg.courses.iter().map(|c| c.course_id.as_str()).collect();
    ids.sort_unstable();
    if ids.windows(2).any(|w| w[0] == w[1]) {
        return Err(ConfigError::Invalid("courses[].course_id must be unique"));
    }

    Ok(())
}

/// Returns the example YAML shipped with the project.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_secs: 300
  health_addr: "127.0.0.1:8080"

piazza:
  email: "you@example.edu"
  password: "YOUR_PIAZZA_PASSWORD"
  base_url: "https://piazza.com/"
  feed_limit: 200

courses:
  - course_id: "cs101"
    piazza_id: "abcdefgh1234"
    announcement_webhook: "https://discord.com/api/webhooks/1/announce"
    feed_webhook: "https://discord.com/api/webhooks/1/feed"
  - course_id: "math240"
    piazza_id: "ijklmnop5678"
    announcement_webhook: "https://discord.com/api/webhooks/2/announce"
    feed_webhook: "https://discord.com/api/webhooks/2/feed"
"#
}

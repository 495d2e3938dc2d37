/// Configuration management
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000/api";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST API root, e.g. `http://127.0.0.1:5000/api`
    pub base_url: String,

    /// Id of the signed-in user (decides own/foreign messages)
    pub viewer_id: String,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// Per-request timeout, whole seconds on disk
    #[serde(rename = "request_timeout_secs", with = "duration_secs")]
    pub request_timeout: Duration,

    /// Rate limit window for the scroll-to-top trigger, milliseconds on disk
    #[serde(rename = "scroll_throttle_ms", with = "duration_millis")]
    pub scroll_throttle: Duration,

    /// Distance from the top, in pixels, that counts as "at the top".
    /// Front ends that scroll by rows convert it with
    /// [`MessageListView::from_config`](crate::viewport::MessageListView::from_config).
    pub top_threshold_px: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            viewer_id: String::new(),
            token: None,
            request_timeout: Duration::from_secs(15),
            scroll_throttle: Duration::from_millis(300),
            top_threshold_px: 100,
        }
    }
}

impl Config {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Create config from command line arguments.
    ///
    /// Recognized flags are removed; everything else is returned as the
    /// remaining positional arguments (command and its operands).
    pub fn from_args(args: &[String]) -> Result<(Self, Vec<String>)> {
        let mut config_path: Option<PathBuf> = None;
        let mut base_url: Option<String> = None;
        let mut viewer_id: Option<String> = None;
        let mut token: Option<String> = None;
        let mut timeout_secs: Option<u64> = None;
        let mut rest = Vec::new();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    config_path = Some(PathBuf::from(flag_value(args, i, "--config")?));
                    i += 2;
                }
                "--base-url" => {
                    base_url = Some(flag_value(args, i, "--base-url")?.to_string());
                    i += 2;
                }
                "--viewer" => {
                    viewer_id = Some(flag_value(args, i, "--viewer")?.to_string());
                    i += 2;
                }
                "--token" => {
                    token = Some(flag_value(args, i, "--token")?.to_string());
                    i += 2;
                }
                "--timeout" => {
                    let v = flag_value(args, i, "--timeout")?;
                    timeout_secs = Some(v.parse::<u64>().map_err(|_| {
                        ChatError::Config("--timeout must be a number of seconds".to_string())
                    })?);
                    i += 2;
                }
                other => {
                    rest.push(other.to_string());
                    i += 1;
                }
            }
        }

        let mut config = match config_path {
            Some(path) => Self::load_file(&path)?,
            None => Self::default(),
        };

        // Env overrides (nice for scripts)
        if let Ok(v) = std::env::var("CAMPUSLINK_BASE_URL") {
            config.base_url = v;
        }
        if let Ok(v) = std::env::var("CAMPUSLINK_VIEWER_ID") {
            config.viewer_id = v;
        }
        if let Ok(v) = std::env::var("CAMPUSLINK_TOKEN") {
            config.token = Some(v);
        }

        // Explicit flags win over file and environment
        if let Some(v) = base_url {
            config.base_url = v;
        }
        if let Some(v) = viewer_id {
            config.viewer_id = v;
        }
        if let Some(v) = token {
            config.token = Some(v);
        }
        if let Some(secs) = timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok((config, rest))
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim_end_matches('/');
        if !url.starts_with("http://") {
            return Err(ChatError::Config(format!(
                "base URL must be a plain http:// URL, got {}",
                self.base_url
            )));
        }
        if self.viewer_id.trim().is_empty() {
            return Err(ChatError::Config(
                "viewer id is required (--viewer or CAMPUSLINK_VIEWER_ID)".to_string(),
            ));
        }
        if self.scroll_throttle.is_zero() {
            return Err(ChatError::Config("scroll throttle window must be non-zero".to_string()));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(|s| s.as_str())
        .ok_or_else(|| ChatError::Config(format!("{} requires an argument", flag)))
}

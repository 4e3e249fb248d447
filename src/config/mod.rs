use anyhow::Result;
use serde::Deserialize;

/// Run settings, loaded from a YAML file with env-var overrides for the
/// credentials that should not live on disk.
#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log: LogConfig,

    /// Feed-list URLs. Each one returns a JSON array of `{url}` entries.
    pub feed_sources: Vec<String>,

    /// Bounded concurrency for sub-URL fetches.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Bounded concurrency for per-candidate sandbox tests.
    #[serde(default = "default_test_concurrency")]
    pub test_concurrency: usize,

    /// Path of the sing-box compatible engine binary.
    #[serde(default = "default_engine_binary")]
    pub engine_binary: String,

    /// Newline-delimited fingerprint blacklist carried between runs.
    /// Missing file is fine; `None` disables the blacklist entirely.
    #[serde(default)]
    pub blacklist_path: Option<String>,

    pub database: DatabaseConfig,

    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fetch_concurrency() -> usize {
    10
}

fn default_test_concurrency() -> usize {
    10
}

fn default_engine_binary() -> String {
    "sing-box".to_string()
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.feed_sources.is_empty() {
            anyhow::bail!("at least one feed source is required");
        }
        if self.fetch_concurrency == 0 || self.test_concurrency == 0 {
            anyhow::bail!("concurrency limits must be at least 1");
        }
        if self.database.url.is_empty() {
            anyhow::bail!("database url is required");
        }
        Ok(())
    }

    /// Apply env-var overrides on top of the file values.
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("NODESIFT_DB_URL") {
            self.database.url = url;
        }
        if let Ok(token) = std::env::var("NODESIFT_DB_TOKEN") {
            self.database.auth_token = Some(token);
        }
        if let (Ok(token), Ok(chat_id)) = (
            std::env::var("NODESIFT_BOT_TOKEN"),
            std::env::var("NODESIFT_CHAT_ID"),
        ) {
            if let Ok(chat_id) = chat_id.parse() {
                self.telegram = Some(TelegramConfig {
                    bot_token: token,
                    chat_id,
                });
            }
        }
    }
}

pub fn load_settings(path: &str) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read settings file {}: {}", path, e))?;
    let mut settings: Settings = serde_yml::from_str(&content)?;
    settings.apply_env();
    settings.validate()?;
    Ok(settings)
}

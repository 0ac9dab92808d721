use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Refresh interval in minutes, 0 disables the scheduler
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Age after which news items are purged
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    #[serde(default = "default_max_items_per_run")]
    pub max_items_per_run: usize,
    #[serde(default = "default_max_items_per_feed")]
    pub max_items_per_feed: usize,
    #[serde(default = "default_entries_per_feed")]
    pub entries_per_feed: usize,
    #[serde(default = "default_raw_summary_chars")]
    pub raw_summary_chars: usize,
    /// Entries scoring above this are treated as clickbait and skipped
    #[serde(default)]
    pub max_hype_score: Option<u32>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub admin_secret: Option<String>,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_max_items_per_run() -> usize {
    30
}

fn default_max_items_per_feed() -> usize {
    3
}

fn default_entries_per_feed() -> usize {
    10
}

fn default_raw_summary_chars() -> usize {
    500
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite:shortnews.db?mode=rwc";

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    None,
    Gemini,
    Groq,
    #[serde(alias = "open_ai")]
    Openai,
}

impl Provider {
    /// Environment variables consulted for the provider's API key, in order
    pub fn key_env_vars(self) -> &'static [&'static str] {
        match self {
            Provider::None => &[],
            Provider::Gemini => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            Provider::Groq => &["GROQ_API_KEY"],
            Provider::Openai => &["OPENAI_API_KEY"],
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "trim" => Ok(Provider::None),
            "gemini" | "google" => Ok(Provider::Gemini),
            "groq" => Ok(Provider::Groq),
            "openai" | "open_ai" => Ok(Provider::Openai),
            other => Err(anyhow::anyhow!("unknown summarizer provider '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on stored summary length, in characters
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
}

fn default_max_output_tokens() -> u32 {
    256
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    25
}

fn default_summary_chars() -> usize {
    400
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: Provider::None,
            model: None,
            api_key: None,
            base_url: None,
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            summary_chars: default_summary_chars(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply deployment overrides. `lookup` returns the value of a variable if set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(secret) = var("ADMIN_SECRET") {
            self.admin_secret = Some(secret);
        }
        if let Some(port) = var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a port number, got '{}'", port))?;
            self.listen_addr = format!("0.0.0.0:{}", port);
        }
        if let Some(feeds) = var("RSS_FEEDS") {
            self.feeds = feeds
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(|url| FeedConfig {
                    name: url.to_string(),
                    url: url.to_string(),
                    category: default_category(),
                })
                .collect();
        }
        if let Some(provider) = var("SUMMARIZER_PROVIDER") {
            self.summarizer.provider = provider.parse()?;
        }
        if let Some(model) = var("SUMMARIZER_MODEL") {
            self.summarizer.model = Some(model);
        }
        for &name in self.summarizer.provider.key_env_vars() {
            if let Some(key) = var(name) {
                self.summarizer.api_key = Some(key);
                break;
            }
        }

        Ok(())
    }

    pub fn database_url(&self) -> &str {
        self.database_url.as_deref().unwrap_or(DEFAULT_DATABASE_URL)
    }

    /// How long a stored news item lives
    pub fn ttl(&self) -> anyhow::Result<chrono::Duration> {
        i64::try_from(self.ttl_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| anyhow::anyhow!("ttl_hours is out of range: {}", self.ttl_hours))
    }
}

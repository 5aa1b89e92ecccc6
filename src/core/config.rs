use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DATA_DIR_NAME: &str = ".rundesk";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "rundesk.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Bounded timeout applied to every outbound HTTP call. No retries.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Delay before polling for a freshly dispatched run, so GitHub has
    /// time to register it.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// How many recent runs the correlator fetches when locating a
    /// dispatched run.
    #[serde(default = "default_correlation_page_size")]
    pub correlation_page_size: u32,

    /// Overrides the default `~/.rundesk/rundesk.db` location.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Encrypt stored personal-access tokens with a machine-derived key.
    /// Off by default.
    #[serde(default)]
    pub encrypt_tokens: bool,
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}
fn default_user_agent() -> String {
    format!("rundesk/{}", env!("CARGO_PKG_VERSION"))
}
fn default_http_timeout_secs() -> u64 {
    30
}
fn default_per_page() -> u32 {
    30
}
fn default_grace_period_secs() -> u64 {
    5
}
fn default_correlation_page_size() -> u32 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout_secs(),
            per_page: default_per_page(),
            grace_period_secs: default_grace_period_secs(),
            correlation_page_size: default_correlation_page_size(),
            db_path: None,
            encrypt_tokens: false,
        }
    }
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

impl Settings {
    /// Load settings from `~/.rundesk/config.toml`, falling back to defaults
    /// when the file is missing or unreadable.
    pub async fn load() -> Self {
        Self::load_from(data_dir().join(CONFIG_FILE_NAME)).await
    }

    pub async fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match tokio::fs::read_to_string(path).await {
            Ok(content) => match toml::from_str::<Settings>(&content) {
                Ok(settings) => {
                    info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Could not read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub async fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let rendered = toml::to_string_pretty(self)?;
        tokio::fs::write(path, rendered).await?;
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| data_dir().join(DB_FILE_NAME))
    }
}

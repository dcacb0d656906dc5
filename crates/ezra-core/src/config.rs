use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EzraError, Result};

/// Top-level configuration for the Ezra session engine.
///
/// Loaded from `~/.ezra/config.toml` by default. Each section corresponds
/// to one component of the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EzraConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub wisdom: WisdomConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl EzraConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EzraConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| EzraError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite notes database and archives.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.ezra/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Which assistant backend answers user messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Canned reply after a bounded delay, for environments without a backend.
    #[default]
    Simulated,
    /// `POST {base_url}/assistant/reply`.
    Http,
}

/// Assistant backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub backend: BackendKind,
    /// Base URL of the HTTP backend.
    pub base_url: String,
    /// Optional bearer token sent to the HTTP backend.
    pub api_key: Option<String>,
    /// Per-request timeout for the HTTP backend.
    pub request_timeout_secs: u64,
    /// Delay before the simulated backend answers.
    pub simulated_delay_ms: u64,
    /// Retries for failures classified as retryable. Zero disables retrying.
    pub max_retries: u32,
    /// Linear backoff step between retries.
    pub retry_backoff_ms: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Simulated,
            base_url: "http://127.0.0.1:10000".to_string(),
            api_key: None,
            request_timeout_secs: 60,
            simulated_delay_ms: 2000,
            max_retries: 1,
            retry_backoff_ms: 500,
        }
    }
}

/// Conversation session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum characters accepted in a single user message.
    pub max_message_chars: usize,
    /// Assistant greeting seeded into every new or reset conversation.
    pub greeting: Option<String>,
    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 4000,
            greeting: None,
            event_buffer: 256,
        }
    }
}

/// Where captured wisdom notes are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotesStoreKind {
    /// Process-local store, lost on exit.
    Memory,
    /// SQLite database under `general.data_dir`.
    #[default]
    Sqlite,
    /// One markdown file per category under `wisdom.archive_dir`.
    Markdown,
}

/// Wisdom capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WisdomConfig {
    /// Maximum characters of a derived note title.
    pub title_max_chars: usize,
    /// Maximum characters of a derived note excerpt.
    pub excerpt_max_chars: usize,
    pub store: NotesStoreKind,
    /// Directory for markdown archives and session wisdom logs.
    pub archive_dir: String,
    /// Category used when a capture names none.
    pub default_category: String,
}

impl Default for WisdomConfig {
    fn default() -> Self {
        Self {
            title_max_chars: 60,
            excerpt_max_chars: 160,
            store: NotesStoreKind::Sqlite,
            archive_dir: "~/.ezra/wisdom".to_string(),
            default_category: "General".to_string(),
        }
    }
}

/// Conversation export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Title written at the top of exported documents.
    pub title: String,
    /// Format used when none is given: "plain", "markdown" or "rich".
    pub default_format: String,
    /// Directory exported files are written to.
    pub output_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            title: "Conversation with Ezra".to_string(),
            default_format: "markdown".to_string(),
            output_dir: ".".to_string(),
        }
    }
}

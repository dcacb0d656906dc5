//! CLI argument definitions for the Ezra terminal driver.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use ezra_core::config::{BackendKind, EzraConfig, NotesStoreKind};

/// Ezra: a conversational assistant session in the terminal.
#[derive(Parser, Debug)]
#[command(name = "ezra", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the notes database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Assistant backend to use.
    #[arg(short = 'b', long = "backend", value_enum)]
    pub backend: Option<BackendArg>,

    /// Base URL of the HTTP assistant backend.
    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Where captured wisdom notes are kept.
    #[arg(long = "notes", value_enum)]
    pub notes: Option<NotesArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Simulated,
    Http,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum NotesArg {
    Memory,
    Sqlite,
    Markdown,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > EZRA_CONFIG env var > platform default (~/.ezra/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("EZRA_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the tracing filter directive.
    ///
    /// Priority: --log-level flag > RUST_LOG env var > config file value.
    pub fn resolve_log_filter(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.trim().is_empty() {
                return filter;
            }
        }
        config_level.to_string()
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut EzraConfig) {
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(backend) = self.backend {
            config.assistant.backend = match backend {
                BackendArg::Simulated => BackendKind::Simulated,
                BackendArg::Http => BackendKind::Http,
            };
        }
        if let Some(ref url) = self.base_url {
            config.assistant.base_url = url.clone();
        }
        if let Some(notes) = self.notes {
            config.wisdom.store = match notes {
                NotesArg::Memory => NotesStoreKind::Memory,
                NotesArg::Sqlite => NotesStoreKind::Sqlite,
                NotesArg::Markdown => NotesStoreKind::Markdown,
            };
        }
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path.starts_with("~\\") {
        if let Some(home) = home_dir() {
            return home.join(&path[2..]);
        }
    }
    PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".ezra").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

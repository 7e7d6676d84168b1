//! Configuration for tilde

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::geometry::ProbeStrategy;
use crate::raw_mode::DEFAULT_POLL_INTERVAL_DS;
use crate::screen::DEFAULT_PLACEHOLDER;
use crate::{Result, TermError};

/// Tilde configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Read timeout in tenths of a second (1-255)
    pub poll_interval_ds: u8,

    /// Glyph drawn on every empty row
    pub placeholder: String,

    /// Skip the driver size query and always probe with the cursor
    pub force_cursor_probe: bool,

    /// Write logs here; no logging when unset
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ds: DEFAULT_POLL_INTERVAL_DS,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            force_cursor_probe: false,
            log_file: None,
        }
    }
}

impl Config {
    /// Load config from the default location, or defaults if there is none
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(TermError::Config(format!("{}: {}", path.display(), e))),
        };

        let config: Self = toml::from_str(&content)
            .map_err(|e| TermError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tilde")
            .join("config.toml")
    }

    pub fn probe_strategy(&self) -> ProbeStrategy {
        if self.force_cursor_probe {
            ProbeStrategy::CursorOnly
        } else {
            ProbeStrategy::DirectFirst
        }
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ds == 0 {
            return Err(TermError::Config(
                "poll_interval_ds must be between 1 and 255".to_string(),
            ));
        }
        if self.placeholder.is_empty() {
            return Err(TermError::Config("placeholder must not be empty".to_string()));
        }
        Ok(())
    }
}

//! Runtime configuration loaded from TOML or JSON.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ReinitError, Result};

/// Longest accepted poll timeout: 30 days.
pub const MAX_POLL_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// Timeout and interval of one convergence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Give up after this many seconds.
    pub timeout_secs: u64,
    /// Seconds between reads.
    pub interval_secs: u64,
}

impl PollSettings {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            interval_secs: 5,
        }
    }
}

/// Runtime configuration. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReinitConfig {
    /// Default settings for every convergence wait.
    pub poll: PollSettings,
    /// Override for the circular-logging read-back.
    pub circular_logging_poll: Option<PollSettings>,
    /// Override for a re-added copy leaving Unknown.
    pub copy_added_poll: Option<PollSettings>,
    /// Override for a copy reaching a suspended state.
    pub copy_suspended_poll: Option<PollSettings>,
    /// Override for a reseed reaching Healthy.
    pub copy_seeded_poll: Option<PollSettings>,
    /// Identities matching this pattern never block a run.
    pub system_identity_pattern: String,
    /// Where CSV topology reports go; no CSV output when unset.
    pub report_dir: Option<PathBuf>,
    /// Where run lease files are created.
    pub lease_dir: PathBuf,
}

impl Default for ReinitConfig {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            circular_logging_poll: None,
            copy_added_poll: None,
            copy_suspended_poll: None,
            copy_seeded_poll: None,
            system_identity_pattern: String::from("^HealthMailbox"),
            report_dir: None,
            lease_dir: std::env::temp_dir(),
        }
    }
}

impl ReinitConfig {
    /// Loads a `.toml` or `.json` file and validates it.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ReinitConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects unusable poll settings and an invalid identity pattern.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("poll", Some(self.poll)),
            ("circular_logging_poll", self.circular_logging_poll),
            ("copy_added_poll", self.copy_added_poll),
            ("copy_suspended_poll", self.copy_suspended_poll),
            ("copy_seeded_poll", self.copy_seeded_poll),
        ];
        for (name, settings) in named {
            let Some(s) = settings else { continue };
            if s.timeout_secs > MAX_POLL_TIMEOUT_SECS {
                return Err(ReinitError::Config(format!(
                    "{}: timeout {}s exceeds the {}s limit",
                    name, s.timeout_secs, MAX_POLL_TIMEOUT_SECS
                )));
            }
            if s.interval_secs == 0 {
                return Err(ReinitError::Config(format!("{}: interval must be > 0", name)));
            }
            if s.interval_secs > s.timeout_secs {
                return Err(ReinitError::Config(format!(
                    "{}: interval {}s exceeds timeout {}s",
                    name, s.interval_secs, s.timeout_secs
                )));
            }
        }
        regex::Regex::new(&self.system_identity_pattern)
            .map_err(|e| ReinitError::Config(format!("system_identity_pattern: {}", e)))?;
        Ok(())
    }

    /// Settings for the circular-logging read-back.
    pub fn circular_logging(&self) -> PollSettings {
        self.circular_logging_poll.unwrap_or(self.poll)
    }

    /// Settings for the wait after adding a copy.
    pub fn copy_added(&self) -> PollSettings {
        self.copy_added_poll.unwrap_or(self.poll)
    }

    /// Settings for the wait after suspending a copy.
    pub fn copy_suspended(&self) -> PollSettings {
        self.copy_suspended_poll.unwrap_or(self.poll)
    }

    /// Settings for the wait after seeding a copy.
    pub fn copy_seeded(&self) -> PollSettings {
        self.copy_seeded_poll.unwrap_or(self.poll)
    }
}

//! Daemon configuration: JSON file deep-merged over defaults, then CLI
//! overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::DaemonOpts;
use crate::notify::Notification;

pub const DEFAULT_PORT: u16 = 17530;
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Alert scenarios, each with its own toggle, sound and display duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    SessionEnd,
    PromptSubmit,
    WaitingInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonConfig {
    pub port: u16,
    /// Liveness sweep interval (ms).
    pub check_interval: u64,
    pub notify_timeout_ms: u64,
    pub notifications: NotificationToggles,
    pub sounds: ScenarioSounds,
    pub display_durations: DisplayDurations,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            check_interval: DEFAULT_CHECK_INTERVAL_MS,
            notify_timeout_ms: DEFAULT_NOTIFY_TIMEOUT_MS,
            notifications: NotificationToggles::default(),
            sounds: ScenarioSounds::default(),
            display_durations: DisplayDurations::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationToggles {
    pub session_end: bool,
    pub prompt_submit: bool,
    pub waiting_input: bool,
}

impl Default for NotificationToggles {
    fn default() -> Self {
        Self {
            session_end: true,
            prompt_submit: false,
            waiting_input: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioSounds {
    pub session_end: String,
    pub prompt_submit: String,
    pub waiting_input: String,
}

impl Default for ScenarioSounds {
    fn default() -> Self {
        Self {
            session_end: "Basso".into(),
            prompt_submit: "Submarine".into(),
            waiting_input: "Hero".into(),
        }
    }
}

/// How long an overlay-capable notifier keeps each alert on screen (ms);
/// 0 means until dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayDurations {
    pub session_end: u64,
    pub prompt_submit: u64,
    pub waiting_input: u64,
}

impl Default for DisplayDurations {
    fn default() -> Self {
        Self {
            session_end: 5000,
            prompt_submit: 3000,
            waiting_input: 0,
        }
    }
}

/// `$HOME/.claude-monitor/config.json`, if `HOME` is set.
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".claude-monitor")
            .join("config.json")
    })
}

impl DaemonConfig {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Effective config for the given CLI options. An explicit `--config`
    /// must load; the default file is best-effort.
    pub fn resolve(opts: &DaemonOpts) -> Result<Self, ConfigError> {
        let mut config = match &opts.config {
            Some(path) => Self::load_from(path)?,
            None => default_config_path()
                .map(|path| Self::load_default(&path))
                .unwrap_or_default(),
        };
        config.apply_overrides(opts);
        Ok(config)
    }

    fn load_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config");
                config
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, opts: &DaemonOpts) {
        if let Some(port) = opts.port {
            self.port = port;
        }
        if let Some(ms) = opts.check_interval_ms {
            self.check_interval = ms;
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval.max(1))
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    /// Build the alert for `scenario`, or `None` when that scenario is
    /// switched off.
    pub fn alert(&self, scenario: Scenario, title: &str, message: &str) -> Option<Notification> {
        let (enabled, sound, display_ms) = match scenario {
            Scenario::SessionEnd => (
                self.notifications.session_end,
                &self.sounds.session_end,
                self.display_durations.session_end,
            ),
            Scenario::PromptSubmit => (
                self.notifications.prompt_submit,
                &self.sounds.prompt_submit,
                self.display_durations.prompt_submit,
            ),
            Scenario::WaitingInput => (
                self.notifications.waiting_input,
                &self.sounds.waiting_input,
                self.display_durations.waiting_input,
            ),
        };
        enabled.then(|| Notification {
            title: title.to_owned(),
            message: message.to_owned(),
            sound: sound.clone(),
            display_ms,
        })
    }
}

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::detection::DetectionConfig;

pub const RELAY_URL_ENV: &str = "CLASSWATCH_RELAY_URL";
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3001";

/// Runtime knobs of one monitoring session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub emit_interval_ms: u64,
    /// Run the body detector on every Nth face frame
    pub body_sample_every: u64,
    pub channel_capacity: usize,
    pub max_in_flight: usize,
    pub emit_timeout_ms: u64,
    pub smoothing_alpha: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            emit_interval_ms: 1_000,
            body_sample_every: 10,
            channel_capacity: 64,
            max_in_flight: 2,
            emit_timeout_ms: 2_000,
            smoothing_alpha: 0.5,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.emit_interval_ms == 0 {
            bail!("emitIntervalMs must be positive");
        }
        if self.body_sample_every == 0 {
            bail!("bodySampleEvery must be at least 1");
        }
        if self.channel_capacity == 0 || self.max_in_flight == 0 {
            bail!("channelCapacity and maxInFlight must be at least 1");
        }
        if self.emit_timeout_ms == 0 {
            bail!("emitTimeoutMs must be positive");
        }
        if !(0.0..=1.0).contains(&self.smoothing_alpha) {
            bail!("smoothingAlpha must be within [0, 1], got {}", self.smoothing_alpha);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorSettings {
    pub detection: DetectionConfig,
    pub session: SessionConfig,
    pub relay_url: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            session: SessionConfig::default(),
            relay_url: DEFAULT_RELAY_URL.into(),
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<()> {
        self.detection.validate().context("invalid detection settings")?;
        self.session.validate().context("invalid session settings")?;
        if self.relay_url.trim().is_empty() {
            bail!("relayUrl must not be empty");
        }
        Ok(())
    }
}

/// JSON-file backed settings. A missing or unreadable file yields defaults.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("ignoring malformed settings at {}: {err}", path.display());
                MonitorSettings::default()
            })
        } else {
            MonitorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Current settings with the relay URL environment override applied.
    pub fn settings(&self) -> MonitorSettings {
        let mut settings = self.read().clone();
        if let Ok(url) = std::env::var(RELAY_URL_ENV) {
            if !url.trim().is_empty() {
                settings.relay_url = url;
            }
        }
        settings
    }

    pub fn update_detection(&self, detection: DetectionConfig) -> Result<()> {
        detection.validate()?;
        self.update(|settings| settings.detection = detection)
    }

    pub fn update_session(&self, session: SessionConfig) -> Result<()> {
        session.validate()?;
        self.update(|settings| settings.session = session)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: MonitorSettings = serde_json::from_str(&contents)?;
        data.validate()
            .with_context(|| format!("Refusing invalid settings in {}", self.path.display()))?;
        let mut guard = self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = data;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MonitorSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut MonitorSettings),
    {
        let mut guard = self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

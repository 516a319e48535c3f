//! Operator settings for batched delivery.
//!
//! Settings are read through a [`SettingsSource`] at the start of every batch
//! run and handed to the processor as a [`BatchSettings`] value, so a change
//! takes effect on the next tick without restarting the worker.

use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;
use tracing::warn;

/// Settings group holding the batching keys
pub const SETTINGS_GROUP: &str = "saved_search_email";

pub const KEY_BATCH_ENABLED: &str = "batch_enabled";
pub const KEY_BATCH_SIZE: &str = "batch_size";
pub const KEY_BATCH_INTERVAL: &str = "batch_interval";

/// Batching configuration for one processor run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSettings {
    pub enabled: bool,
    /// Rows fetched per run, at least 1
    pub batch_size: u64,
    /// Minutes between runs, between 1 and [`BatchSettings::MAX_INTERVAL_MINUTES`]
    pub batch_interval_minutes: u64,
}

impl BatchSettings {
    pub const DEFAULT_BATCH_SIZE: u64 = 25;
    pub const DEFAULT_INTERVAL_MINUTES: u64 = 5;
    /// One week
    pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_interval_minutes(mut self, minutes: u64) -> Self {
        self.batch_interval_minutes = minutes.clamp(1, Self::MAX_INTERVAL_MINUTES);
        self
    }

    pub fn interval(&self) -> Duration {
        let minutes = self
            .batch_interval_minutes
            .clamp(1, Self::MAX_INTERVAL_MINUTES);
        Duration::from_secs(minutes.saturating_mul(60))
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            batch_interval_minutes: Self::DEFAULT_INTERVAL_MINUTES,
        }
    }
}

/// Where operator settings come from
pub trait SettingsSource: Send + Sync {
    /// Raw value of `key` in `group`, or `None` when unset
    fn read(&self, group: &str, key: &str) -> Option<String>;

    /// Current batch settings; unparseable values fall back to defaults
    fn batch_settings(&self) -> BatchSettings {
        let defaults = BatchSettings::default();

        let enabled = self
            .read(SETTINGS_GROUP, KEY_BATCH_ENABLED)
            .map(|raw| parse_flag(KEY_BATCH_ENABLED, &raw, defaults.enabled))
            .unwrap_or(defaults.enabled);

        let batch_size = self
            .read(SETTINGS_GROUP, KEY_BATCH_SIZE)
            .map(|raw| parse_positive(KEY_BATCH_SIZE, &raw, defaults.batch_size))
            .unwrap_or(defaults.batch_size);

        let batch_interval_minutes = self
            .read(SETTINGS_GROUP, KEY_BATCH_INTERVAL)
            .map(|raw| parse_positive(KEY_BATCH_INTERVAL, &raw, defaults.batch_interval_minutes))
            .unwrap_or(defaults.batch_interval_minutes);

        BatchSettings {
            enabled,
            batch_size,
            ..defaults
        }
        .with_interval_minutes(batch_interval_minutes)
    }
}

fn parse_flag(key: &str, raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        other => {
            warn!(key, value = other, "Invalid boolean setting, using default");
            default
        }
    }
}

// Zero and negative numbers clamp to 1
fn parse_positive(key: &str, raw: &str, default: u64) -> u64 {
    match i64::from_str(raw.trim()) {
        Ok(value) => value.max(1) as u64,
        Err(e) => {
            warn!(key, value = raw, error = %e, "Invalid numeric setting, using default");
            default
        }
    }
}

/// Reads settings from environment variables named `{GROUP}_{KEY}`
///
/// `batch_size` in `saved_search_email` becomes `SAVED_SEARCH_EMAIL_BATCH_SIZE`.
/// The environment is consulted on every call.
#[derive(Debug, Clone, Default)]
pub struct EnvSettingsSource;

impl EnvSettingsSource {
    pub fn new() -> Self {
        Self
    }

    pub fn var_name(group: &str, key: &str) -> String {
        format!("{group}_{key}").to_ascii_uppercase()
    }
}

impl SettingsSource for EnvSettingsSource {
    fn read(&self, group: &str, key: &str) -> Option<String> {
        std::env::var(Self::var_name(group, key)).ok()
    }
}

/// In-process settings store, mutable at runtime
#[derive(Debug, Default)]
pub struct MemorySettingsSource {
    values: RwLock<HashMap<(String, String), String>>,
}

impl MemorySettingsSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a [`BatchSettings`] value
    pub fn from_batch_settings(settings: BatchSettings) -> Self {
        let source = Self::new();
        source.apply(settings);
        source
    }

    pub fn set(&self, group: &str, key: &str, value: impl Into<String>) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert((group.to_string(), key.to_string()), value.into());
    }

    pub fn remove(&self, group: &str, key: &str) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(&(group.to_string(), key.to_string()));
    }

    /// Overwrite all batching keys
    pub fn apply(&self, settings: BatchSettings) {
        self.set(SETTINGS_GROUP, KEY_BATCH_ENABLED, settings.enabled.to_string());
        self.set(SETTINGS_GROUP, KEY_BATCH_SIZE, settings.batch_size.to_string());
        self.set(
            SETTINGS_GROUP,
            KEY_BATCH_INTERVAL,
            settings.batch_interval_minutes.to_string(),
        );
    }
}

impl SettingsSource for MemorySettingsSource {
    fn read(&self, group: &str, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(&(group.to_string(), key.to_string())).cloned()
    }
}

//! Worker configuration

use core_config::server::HealthServerConfig;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse_or};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Mail transport used for queued emails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Smtp,
    /// Records mail in memory; for local runs and smoke tests
    Mock,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(ProviderKind::Smtp),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(ConfigError::ParseError {
                key: "EMAIL_PROVIDER".to_string(),
                details: format!("unknown provider '{}', expected smtp or mock", other),
            }),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Smtp => f.write_str("smtp"),
            ProviderKind::Mock => f.write_str("mock"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub provider: ProviderKind,
    /// How often batch settings are re-read and the schedule reconciled
    pub settings_refresh: Duration,
    pub health: HealthServerConfig,
}

impl FromEnv for WorkerConfig {
    /// Reads from environment variables:
    /// - EMAIL_PROVIDER: smtp (default) or mock
    /// - SETTINGS_REFRESH_SECS: defaults to 60, minimum 1
    /// - HEALTH_HOST / HEALTH_PORT: see [`HealthServerConfig`]
    fn from_env() -> Result<Self, ConfigError> {
        let provider = env_or_default("EMAIL_PROVIDER", "smtp").parse()?;
        let refresh_secs: u64 = env_parse_or("SETTINGS_REFRESH_SECS", 60)?;

        Ok(Self {
            provider,
            settings_refresh: Duration::from_secs(refresh_secs.max(1)),
            health: HealthServerConfig::from_env()?,
        })
    }
}

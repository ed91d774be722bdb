use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::models::LoggingConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => anyhow::bail!("Invalid log format: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl FromStr for RotationPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "hourly" => Ok(Self::Hourly),
            "never" => Ok(Self::Never),
            other => anyhow::bail!("Invalid log rotation: {other}"),
        }
    }
}

/// Parsed form of [`LoggingConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    pub log_dir: Option<String>,
    pub rotation: RotationPolicy,
}

impl TryFrom<&LoggingConfig> for LogSettings {
    type Error = anyhow::Error;

    fn try_from(config: &LoggingConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            level: config.level.clone(),
            format: config.format.parse()?,
            log_dir: config.log_dir.clone(),
            rotation: config.rotation.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_from_logging_config() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: "Pretty".to_string(),
            log_dir: Some("/tmp/logs".to_string()),
            rotation: "hourly".to_string(),
        };
        let settings = LogSettings::try_from(&config).unwrap();
        assert_eq!(settings.format, LogFormat::Pretty);
        assert_eq!(settings.rotation, RotationPolicy::Hourly);
        assert_eq!(settings.log_dir.as_deref(), Some("/tmp/logs"));
    }

    #[test]
    fn test_rejects_unknown_values() {
        assert!("xml".parse::<LogFormat>().is_err());
        assert!("weekly".parse::<RotationPolicy>().is_err());
    }
}

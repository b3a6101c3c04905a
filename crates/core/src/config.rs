//! Tracker configuration.
//!
//! A [`ChokeConfig`] can be built from defaults, read from a TOML file, or assembled
//! from command line / environment overrides via [`ChokeArgs`]. Every path ends in
//! [`ChokeConfig::validate`]; out-of-range values are rejected, never clamped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

/// Default duplicate ratio above which a peer becomes a choke candidate.
pub const DEFAULT_CHOKE_DUPLICATES_THRESHOLD: f64 = 0.6;
/// Default maximum number of new chokes per topic per heartbeat.
pub const DEFAULT_CHOKE_CHURN: usize = 2;
/// Default first-IHAVE ratio at or above which a choked peer is unchoked.
pub const DEFAULT_UNCHOKE_THRESHOLD: f64 = 0.5;
/// Default maximum number of unchokes per topic per heartbeat.
pub const DEFAULT_UNCHOKE_CHURN: usize = 2;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// How long first-delivery timestamps are kept, matching the gossip seen-message window.
pub const DEFAULT_FIRST_SEEN_TTL: Duration = Duration::from_secs(120);
pub const DEFAULT_FIRST_SEEN_CAPACITY: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChokeConfig {
    /// Duplicate ratio a pair must exceed to be choked, in `(0, 1)`.
    pub choke_duplicates_threshold: f64,
    pub choke_churn: usize,
    /// First-IHAVE ratio a choked pair must reach to be unchoked, in `(0, 1]`.
    pub unchoke_threshold: f64,
    pub unchoke_churn: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "heartbeat_interval_ms")]
    pub heartbeat_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "first_seen_ttl_ms")]
    pub first_seen_ttl: Duration,
    pub first_seen_capacity: usize,
}

impl Default for ChokeConfig {
    fn default() -> Self {
        Self {
            choke_duplicates_threshold: DEFAULT_CHOKE_DUPLICATES_THRESHOLD,
            choke_churn: DEFAULT_CHOKE_CHURN,
            unchoke_threshold: DEFAULT_UNCHOKE_THRESHOLD,
            unchoke_churn: DEFAULT_UNCHOKE_CHURN,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            first_seen_ttl: DEFAULT_FIRST_SEEN_TTL,
            first_seen_capacity: DEFAULT_FIRST_SEEN_CAPACITY,
        }
    }
}

impl ChokeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Written so that NaN fails both comparisons.
        let t = self.choke_duplicates_threshold;
        if !(t > 0.0 && t < 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "choke_duplicates_threshold",
                range: "(0, 1)",
                value: t,
            });
        }
        let t = self.unchoke_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "unchoke_threshold",
                range: "(0, 1]",
                value: t,
            });
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::Zero("heartbeat_interval"));
        }
        if self.first_seen_ttl.is_zero() {
            return Err(ConfigError::Zero("first_seen_ttl"));
        }
        if self.first_seen_capacity == 0 {
            return Err(ConfigError::Zero("first_seen_capacity"));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ChokeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!(path = ?path, "Reading choke configuration file");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

/// Command line and environment overrides for [`ChokeConfig`].
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ChokeArgs {
    /// TOML file providing the base configuration.
    #[arg(long = "choke-config", env = "EPISUB_CHOKE_CONFIG")]
    pub config_path: Option<PathBuf>,

    #[arg(long, env = "EPISUB_CHOKE_DUPLICATES_THRESHOLD")]
    pub choke_duplicates_threshold: Option<f64>,

    /// Maximum new chokes per topic per heartbeat.
    #[arg(long, env = "EPISUB_CHOKE_CHURN")]
    pub choke_churn: Option<usize>,

    #[arg(long, env = "EPISUB_UNCHOKE_THRESHOLD")]
    pub unchoke_threshold: Option<f64>,

    /// Maximum unchokes per topic per heartbeat.
    #[arg(long, env = "EPISUB_UNCHOKE_CHURN")]
    pub unchoke_churn: Option<usize>,

    #[arg(long, env = "EPISUB_HEARTBEAT_INTERVAL_MS")]
    pub heartbeat_interval_ms: Option<u64>,

    #[arg(long, env = "EPISUB_FIRST_SEEN_TTL_MS")]
    pub first_seen_ttl_ms: Option<u64>,

    #[arg(long, env = "EPISUB_FIRST_SEEN_CAPACITY")]
    pub first_seen_capacity: Option<usize>,
}

impl ChokeArgs {
    /// Resolves the final configuration: file (or defaults), then overrides, then validation.
    pub fn build(self) -> Result<ChokeConfig, ConfigError> {
        let mut config = match &self.config_path {
            Some(path) => ChokeConfig::from_toml_file(path)?,
            None => ChokeConfig::default(),
        };
        if let Some(v) = self.choke_duplicates_threshold {
            config.choke_duplicates_threshold = v;
        }
        if let Some(v) = self.choke_churn {
            config.choke_churn = v;
        }
        if let Some(v) = self.unchoke_threshold {
            config.unchoke_threshold = v;
        }
        if let Some(v) = self.unchoke_churn {
            config.unchoke_churn = v;
        }
        if let Some(v) = self.heartbeat_interval_ms {
            config.heartbeat_interval = Duration::from_millis(v);
        }
        if let Some(v) = self.first_seen_ttl_ms {
            config.first_seen_ttl = Duration::from_millis(v);
        }
        if let Some(v) = self.first_seen_capacity {
            config.first_seen_capacity = v;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        choke: ChokeArgs,
    }

    #[test]
    fn test_defaults_are_valid() {
        ChokeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_threshold_bounds() {
        let cases = [
            (0.0, 0.5, false),
            (1.0, 0.5, false),
            (f64::NAN, 0.5, false),
            (0.99, 1.0, true),
            (0.5, 0.0, false),
            (0.5, 1.01, false),
            (0.5, f64::NAN, false),
            (0.01, 0.01, true),
        ];
        for (choke, unchoke, valid) in cases {
            let config = ChokeConfig {
                choke_duplicates_threshold: choke,
                unchoke_threshold: unchoke,
                ..Default::default()
            };
            assert_eq!(
                config.validate().is_ok(),
                valid,
                "choke={choke} unchoke={unchoke}"
            );
        }
    }

    #[test]
    fn test_zero_churn_is_allowed() {
        let config = ChokeConfig {
            choke_churn: 0,
            unchoke_churn: 0,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_durations_and_capacity_rejected() {
        let config = ChokeConfig {
            heartbeat_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("heartbeat_interval"))
        ));

        let config = ChokeConfig {
            first_seen_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("first_seen_capacity"))
        ));
    }

    #[test]
    fn test_parse_toml() {
        let config = ChokeConfig::from_toml_str(
            r#"
            choke_duplicates_threshold = 0.8
            choke_churn = 3
            heartbeat_interval_ms = 700
            "#,
        )
        .unwrap();
        assert_eq!(config.choke_duplicates_threshold, 0.8);
        assert_eq!(config.choke_churn, 3);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(700));
        assert_eq!(config.unchoke_churn, DEFAULT_UNCHOKE_CHURN);
    }

    #[test]
    fn test_toml_out_of_range_fails() {
        let err = ChokeConfig::from_toml_str("unchoke_threshold = 1.5").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                name: "unchoke_threshold",
                ..
            }
        ));
    }

    #[test]
    fn test_toml_unknown_field_fails() {
        assert!(matches!(
            ChokeConfig::from_toml_str("choke_thresold = 0.5"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = ChokeConfig::from_toml_file(Path::new("/nonexistent/choke.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_args_override_file() -> testresult::TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "choke_churn = 5\nunchoke_churn = 4")?;

        let cli = Cli::try_parse_from([
            "episub",
            "--choke-config",
            file.path().to_str().ok_or("non-utf8 temp path")?,
            "--choke-churn",
            "1",
            "--unchoke-threshold",
            "0.9",
        ])?;
        let config = cli.choke.build()?;

        assert_eq!(config.choke_churn, 1);
        assert_eq!(config.unchoke_churn, 4);
        assert_eq!(config.unchoke_threshold, 0.9);
        Ok(())
    }

    #[test]
    fn test_args_validate() {
        let args = ChokeArgs {
            choke_duplicates_threshold: Some(1.2),
            ..Default::default()
        };
        assert!(args.build().is_err());
    }

    #[test]
    fn test_serialize_round_trip_keeps_millis() {
        let config = ChokeConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("heartbeat_interval_ms = 1000"));
        assert_eq!(ChokeConfig::from_toml_str(&text).unwrap(), config);
    }
}

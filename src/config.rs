use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::{idle::IdleSettings, player::PlaybackSettings};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Descargas
    pub download_dir: PathBuf,
    pub search_results: usize,
    pub ytdlp_timeout: Duration,

    // Reproducción
    pub heartbeat_interval: Duration,
    pub idle_check_interval: Duration,
    pub idle_timeout: Duration,

    // Limpieza de archivos
    pub cleanup_interval: Duration,
    pub max_file_age: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        std::fs::create_dir_all(&config.download_dir).with_context(|| {
            format!("cannot create download dir {}", config.download_dir.display())
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Builds a config from any key lookup, falling back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| -> Result<Duration> {
            Ok(Duration::from_secs(parse_or(&lookup, key, default.as_secs())?))
        };

        Ok(Self {
            discord_token: lookup("DISCORD_TOKEN")
                .filter(|t| !t.trim().is_empty())
                .context("DISCORD_TOKEN is not set")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            download_dir: lookup("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            search_results: parse_or(&lookup, "SEARCH_RESULTS", defaults.search_results)?,
            ytdlp_timeout: secs("YTDLP_TIMEOUT_SECS", defaults.ytdlp_timeout)?,

            heartbeat_interval: secs("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval)?,
            idle_check_interval: secs("IDLE_CHECK_INTERVAL_SECS", defaults.idle_check_interval)?,
            idle_timeout: secs("IDLE_TIMEOUT_SECS", defaults.idle_timeout)?,

            cleanup_interval: secs("CLEANUP_INTERVAL_SECS", defaults.cleanup_interval)?,
            max_file_age: secs("MAX_FILE_AGE_SECS", defaults.max_file_age)?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Every interval and timeout must be non-zero
    /// - The idle timeout cannot be shorter than the idle check interval
    /// - Search results must fit one row of buttons (1 to 5)
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("YTDLP_TIMEOUT_SECS", self.ytdlp_timeout),
            ("HEARTBEAT_INTERVAL_SECS", self.heartbeat_interval),
            ("IDLE_CHECK_INTERVAL_SECS", self.idle_check_interval),
            ("IDLE_TIMEOUT_SECS", self.idle_timeout),
            ("CLEANUP_INTERVAL_SECS", self.cleanup_interval),
            ("MAX_FILE_AGE_SECS", self.max_file_age),
        ];
        for (key, value) in intervals {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", key);
            }
        }

        if self.idle_timeout < self.idle_check_interval {
            anyhow::bail!(
                "Idle timeout ({}) cannot be shorter than the check interval ({})",
                humantime::format_duration(self.idle_timeout),
                humantime::format_duration(self.idle_check_interval)
            );
        }

        if !(1..=5).contains(&self.search_results) {
            anyhow::bail!(
                "Search results must be between 1 and 5, got: {}",
                self.search_results
            );
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {}\n  \
            Downloads: {} ({} search results, {} yt-dlp timeout)\n  \
            Playback: {} heartbeat, idle check every {}, leave after {}\n  \
            Cleanup: every {}, files older than {}",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.download_dir.display(),
            self.search_results,
            humantime::format_duration(self.ytdlp_timeout),
            humantime::format_duration(self.heartbeat_interval),
            humantime::format_duration(self.idle_check_interval),
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.cleanup_interval),
            humantime::format_duration(self.max_file_age),
        )
    }

    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            heartbeat_interval: self.heartbeat_interval,
            idle: IdleSettings {
                check_interval: self.idle_check_interval,
                idle_timeout: self.idle_timeout,
            },
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            download_dir: "/tmp/discordmusicbot".into(),
            search_results: 5,
            ytdlp_timeout: Duration::from_secs(90),

            heartbeat_interval: Duration::from_secs(30),
            idle_check_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(600), // 10 minutos

            cleanup_interval: Duration::from_secs(3600),
            max_file_age: Duration::from_secs(6 * 3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_token_is_set() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc")])).unwrap();

        assert_eq!(config.discord_token, "abc");
        assert_eq!(config.guild_id, None);
        assert_eq!(config.download_dir, PathBuf::from("/tmp/discordmusicbot"));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
        assert_eq!(config.idle_check_interval, Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.max_file_age, Duration::from_secs(21600));
        config.validate().unwrap();
    }

    #[test]
    fn missing_token_is_an_error() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("GUILD_ID", "1234"),
            ("DOWNLOAD_DIR", "/var/tunes"),
            ("IDLE_TIMEOUT_SECS", "120"),
            ("SEARCH_RESULTS", "3"),
        ]))
        .unwrap();

        assert_eq!(config.guild_id, Some(1234));
        assert_eq!(config.download_dir, PathBuf::from("/var/tunes"));
        assert_eq!(config.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.search_results, 3);

        let settings = config.playback_settings();
        assert_eq!(settings.idle.idle_timeout, Duration::from_secs(120));
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("IDLE_TIMEOUT_SECS", "ten minutes"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn validation_rules() {
        let base = Config {
            discord_token: "abc".into(),
            ..Config::default()
        };
        base.validate().unwrap();

        let zero = Config {
            heartbeat_interval: Duration::ZERO,
            ..base.clone()
        };
        assert!(zero.validate().is_err());

        let inverted = Config {
            idle_timeout: Duration::from_secs(30),
            ..base.clone()
        };
        assert!(inverted.validate().is_err());

        let too_many = Config {
            search_results: 6,
            ..base.clone()
        };
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn summary_hides_the_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("10m"));
    }
}

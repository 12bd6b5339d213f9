//! Worker configuration.

use std::time::Duration;

use rewind_models::{SeekLevel, SeekManifest};

/// Worker configuration (§6 environment surface).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of independent worker loops (`INGEST_WORKERS`, default 2, floor 1).
    pub ingest_workers: usize,
    /// Root directory canonical video directories live under (`DOWNLOADS_DIR`).
    pub downloads_dir: String,
    /// Root directory download jobs spool into (`SPOOL_DIR`).
    pub spool_dir: String,
    /// Attempts cap before `FailExcessiveRetry` permanently fails a job.
    pub max_attempts: u32,
    /// How many incomplete videos one catchup unit processes (§4.7: 8).
    pub catchup_batch_size: usize,
    /// Interval between recovery/catchup sweeps (§4.7: 2 minutes).
    pub catchup_interval: Duration,
    /// Sleep between videos within a catchup unit, to smooth IO (§4.7: 10 ms).
    pub catchup_sleep: Duration,
    /// Fallback poll period a drain loop falls back to absent any wake signal (§4.6: 5 s).
    pub fallback_poll_interval: Duration,
    /// LISTEN/NOTIFY channel name workers wake on.
    pub notify_channel: String,
    pub seek_enable_xfine: bool,
    pub seek_enable_xxfine: bool,
    pub seek_enable_xxxfine: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ingest_workers: 2,
            downloads_dir: "/downloads".to_string(),
            spool_dir: "/spool".to_string(),
            max_attempts: 5,
            catchup_batch_size: 8,
            catchup_interval: Duration::from_secs(120),
            catchup_sleep: Duration::from_millis(10),
            fallback_poll_interval: Duration::from_secs(5),
            notify_channel: "ingest_jobs".to_string(),
            seek_enable_xfine: false,
            seek_enable_xxfine: false,
            seek_enable_xxxfine: false,
        }
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true"))
        .unwrap_or(false)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ingest_workers: std::env::var("INGEST_WORKERS")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .map(|n| n.max(1))
                .unwrap_or(defaults.ingest_workers),
            downloads_dir: std::env::var("DOWNLOADS_DIR").unwrap_or(defaults.downloads_dir),
            spool_dir: std::env::var("SPOOL_DIR").unwrap_or(defaults.spool_dir),
            max_attempts: std::env::var("INGEST_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
            catchup_batch_size: std::env::var("CATCHUP_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.catchup_batch_size),
            catchup_interval: Duration::from_secs(
                std::env::var("CATCHUP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.catchup_interval.as_secs()),
            ),
            catchup_sleep: Duration::from_millis(
                std::env::var("CATCHUP_SLEEP_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.catchup_sleep.as_millis() as u64),
            ),
            fallback_poll_interval: Duration::from_secs(
                std::env::var("INGEST_FALLBACK_POLL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.fallback_poll_interval.as_secs()),
            ),
            notify_channel: std::env::var("INGEST_NOTIFY_CHANNEL").unwrap_or(defaults.notify_channel),
            seek_enable_xfine: env_flag("SEEK_ENABLE_XFINE"),
            seek_enable_xxfine: env_flag("SEEK_ENABLE_XXFINE"),
            seek_enable_xxxfine: env_flag("SEEK_ENABLE_XXXFINE"),
        }
    }

    /// The set of seek levels this deployment generates: the three always-on
    /// levels plus whichever optional extra-fine levels are gated on.
    pub fn seek_levels(&self) -> Vec<SeekLevel> {
        let mut levels = SeekManifest::default_levels();
        let optional = SeekManifest::optional_levels();
        let flags = [
            self.seek_enable_xfine,
            self.seek_enable_xxfine,
            self.seek_enable_xxxfine,
        ];
        for (enabled, level) in flags.into_iter().zip(optional) {
            if enabled {
                levels.push(level);
            }
        }
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_two_workers_and_eight_catchup_batch() {
        let config = WorkerConfig::default();
        assert_eq!(config.ingest_workers, 2);
        assert_eq!(config.catchup_batch_size, 8);
        assert_eq!(config.catchup_interval, Duration::from_secs(120));
    }

    #[test]
    fn seek_levels_always_includes_the_three_defaults() {
        let config = WorkerConfig::default();
        let levels = config.seek_levels();
        assert_eq!(levels.len(), 3);
    }

    #[test]
    fn seek_levels_grows_with_optional_flags() {
        let mut config = WorkerConfig::default();
        config.seek_enable_xfine = true;
        config.seek_enable_xxxfine = true;
        let levels = config.seek_levels();
        assert_eq!(levels.len(), 5);
        assert!(levels.iter().any(|l| l.name == "x-fine"));
        assert!(levels.iter().any(|l| l.name == "xxx-fine"));
        assert!(!levels.iter().any(|l| l.name == "xx-fine"));
    }
}


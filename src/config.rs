use std::path::PathBuf;
use std::time::Duration;

/// Ripper configuration
/// Loaded from `CDRIP_*` environment variables, with a `.env` file honoured
/// when present
#[derive(Clone, Debug)]
pub struct RipperConfig {
    /// Parent of the per-run staging directory (system temp dir when unset)
    pub temp_root: Option<PathBuf>,
    /// How often overall progress is republished
    pub progress_interval: Duration,
    /// How often in-flight transcode jobs are polled for progress
    pub transcode_poll_interval: Duration,
    /// Transcode jobs kept submitted at once
    pub max_parallel_jobs: usize,
    /// Optical device to open (default drive when unset)
    pub device: Option<PathBuf>,
    /// ffmpeg executable used by the bundled transcoder
    pub ffmpeg_path: PathBuf,
}

impl Default for RipperConfig {
    fn default() -> Self {
        Self {
            temp_root: None,
            progress_interval: Duration::from_millis(250),
            transcode_poll_interval: Duration::from_millis(500),
            max_parallel_jobs: default_parallelism(),
            device: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

impl RipperConfig {
    /// Load configuration from the environment
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_ok() {
            tracing::info!("Config: loaded .env file");
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let millis = |key: &str, default: Duration| {
            match lookup(key).map(|v| v.trim().parse::<u64>()) {
                Some(Ok(ms)) if ms > 0 => Duration::from_millis(ms),
                Some(_) => {
                    tracing::warn!("Config: ignoring invalid {}", key);
                    default
                }
                None => default,
            }
        };

        let max_parallel_jobs = match lookup("CDRIP_MAX_PARALLEL_JOBS").map(|v| v.trim().parse::<usize>()) {
            Some(Ok(n)) if n > 0 => n,
            Some(_) => {
                tracing::warn!("Config: ignoring invalid CDRIP_MAX_PARALLEL_JOBS");
                defaults.max_parallel_jobs
            }
            None => defaults.max_parallel_jobs,
        };

        Self {
            temp_root: lookup("CDRIP_TEMP_ROOT").map(PathBuf::from),
            progress_interval: millis("CDRIP_PROGRESS_INTERVAL_MS", defaults.progress_interval),
            transcode_poll_interval: millis(
                "CDRIP_TRANSCODE_POLL_MS",
                defaults.transcode_poll_interval,
            ),
            max_parallel_jobs,
            device: lookup("CDRIP_DEVICE").map(PathBuf::from),
            ffmpeg_path: lookup("CDRIP_FFMPEG")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = RipperConfig::from_lookup(lookup(&[]));
        assert_eq!(config.progress_interval, Duration::from_millis(250));
        assert_eq!(config.transcode_poll_interval, Duration::from_millis(500));
        assert!(config.max_parallel_jobs >= 1);
        assert!(config.temp_root.is_none());
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_reads_overrides() {
        let config = RipperConfig::from_lookup(lookup(&[
            ("CDRIP_TEMP_ROOT", "/var/tmp/rips"),
            ("CDRIP_PROGRESS_INTERVAL_MS", "400"),
            ("CDRIP_MAX_PARALLEL_JOBS", "3"),
            ("CDRIP_DEVICE", "/dev/sr1"),
        ]));
        assert_eq!(config.temp_root, Some(PathBuf::from("/var/tmp/rips")));
        assert_eq!(config.progress_interval, Duration::from_millis(400));
        assert_eq!(config.max_parallel_jobs, 3);
        assert_eq!(config.device, Some(PathBuf::from("/dev/sr1")));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = RipperConfig::from_lookup(lookup(&[
            ("CDRIP_TRANSCODE_POLL_MS", "soon"),
            ("CDRIP_MAX_PARALLEL_JOBS", "0"),
            ("CDRIP_PROGRESS_INTERVAL_MS", "0"),
        ]));
        assert_eq!(config.transcode_poll_interval, Duration::from_millis(500));
        assert_eq!(config.progress_interval, Duration::from_millis(250));
        assert_eq!(config.max_parallel_jobs, RipperConfig::default().max_parallel_jobs);
    }
}

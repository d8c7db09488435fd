// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    ConfigFile, DeploySettings, LauncherSettings, MonitorSettings, RawConfigFile,
};
use crate::errors::{BotkeeperError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BotkeeperError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_supervisor(&raw)?;
        let launcher = validate_launcher(&raw)?;
        let monitor = validate_monitor(&raw)?;
        let deploy = validate_deploy(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.supervisor,
            launcher,
            monitor,
            deploy,
        ))
    }
}

fn validate_supervisor(cfg: &RawConfigFile) -> Result<()> {
    if cfg.supervisor.work_dir.as_os_str().is_empty() {
        return Err(BotkeeperError::ConfigError(
            "[supervisor].work_dir must not be empty".to_string(),
        ));
    }
    if cfg.supervisor.snapshot_file.file_name().is_none() {
        return Err(BotkeeperError::ConfigError(format!(
            "[supervisor].snapshot_file must name a file (got {:?})",
            cfg.supervisor.snapshot_file
        )));
    }
    Ok(())
}

fn validate_launcher(cfg: &RawConfigFile) -> Result<LauncherSettings> {
    let raw = &cfg.launcher;

    if raw.interpreter.trim().is_empty() {
        return Err(BotkeeperError::ConfigError(
            "[launcher].interpreter must not be empty".to_string(),
        ));
    }

    let extension = raw.extension.trim().trim_start_matches('.').to_string();
    if extension.is_empty() || extension.contains(['/', '\\']) {
        return Err(BotkeeperError::ConfigError(format!(
            "[launcher].extension must be a plain file extension (got {:?})",
            raw.extension
        )));
    }

    Ok(LauncherSettings {
        interpreter: raw.interpreter.clone(),
        args: raw.args.clone(),
        extension,
        source_footer: raw.source_footer.clone().filter(|s| !s.trim().is_empty()),
        stop_timeout: non_zero_duration("[launcher].stop_timeout", &raw.stop_timeout)?,
        kill_timeout: non_zero_duration("[launcher].kill_timeout", &raw.kill_timeout)?,
    })
}

fn validate_monitor(cfg: &RawConfigFile) -> Result<MonitorSettings> {
    let raw = &cfg.monitor;

    let interval = non_zero_duration("[monitor].interval", &raw.interval)?;
    let backoff_initial = non_zero_duration("[monitor].backoff_initial", &raw.backoff_initial)?;
    let backoff_max = non_zero_duration("[monitor].backoff_max", &raw.backoff_max)?;

    if backoff_initial > backoff_max {
        return Err(BotkeeperError::ConfigError(format!(
            "[monitor].backoff_initial ({}) must not exceed backoff_max ({})",
            raw.backoff_initial, raw.backoff_max
        )));
    }

    Ok(MonitorSettings {
        interval,
        max_restarts: raw.max_restarts,
        backoff_initial,
        backoff_max,
    })
}

fn validate_deploy(cfg: &RawConfigFile) -> Result<DeploySettings> {
    let raw = &cfg.deploy;

    if raw.git.trim().is_empty() {
        return Err(BotkeeperError::ConfigError(
            "[deploy].git must not be empty".to_string(),
        ));
    }

    Ok(DeploySettings {
        package_markers: raw.package_markers.clone(),
        fetch_timeout: non_zero_duration("[deploy].fetch_timeout", &raw.fetch_timeout)?,
        git: raw.git.clone(),
    })
}

fn non_zero_duration(field: &str, raw: &str) -> Result<Duration> {
    let dur = parse_duration(raw)
        .map_err(|e| BotkeeperError::ConfigError(format!("{field}: {e}")))?;
    if dur.is_zero() {
        return Err(BotkeeperError::ConfigError(format!(
            "{field} must be greater than zero (got {raw:?})"
        )));
    }
    Ok(dur)
}

/// Parse durations like `"250ms"`, `"5s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(60 * 60))),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 5s ").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("3 weeks").is_err());
    }

    #[test]
    fn extension_dot_is_stripped() {
        let mut raw = RawConfigFile::default();
        raw.launcher.extension = ".sh".to_string();
        let cfg = ConfigFile::try_from(raw).unwrap();
        assert_eq!(cfg.launcher.extension, "sh");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.monitor.interval = "0s".to_string();
        match ConfigFile::try_from(raw) {
            Err(BotkeeperError::ConfigError(msg)) => assert!(msg.contains("[monitor].interval")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn inverted_backoff_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.monitor.backoff_initial = "2m".to_string();
        raw.monitor.backoff_max = "30s".to_string();
        assert!(ConfigFile::try_from(raw).is_err());
    }
}

//! Settings file loading and flag overrides

use crate::EngineArgs;
use anyhow::{Context, Result};
use ferry_types::{EngineSettings, Settings};
use std::path::{Path, PathBuf};

/// `<config dir>/ferry/settings.json`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ferry").join("settings.json"))
}

/// Load settings. An explicitly given file must exist; the default one is optional.
pub fn resolve(explicit: Option<PathBuf>) -> Result<(Settings, Option<PathBuf>)> {
    match explicit {
        Some(path) => {
            let settings = read(&path)?;
            Ok((settings, Some(path)))
        }
        None => {
            let path = default_path();
            let settings = match path.as_deref() {
                Some(p) if p.exists() => read(p)?,
                _ => Settings::default(),
            };
            Ok((settings, path))
        }
    }
}

fn read(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid settings file {}", path.display()))
}

/// Settings file values with command-line flags applied on top
pub fn engine_settings(settings: &Settings, args: &EngineArgs, force_verify: bool) -> EngineSettings {
    let mut engine = settings.engine.clone();
    if let Some(retries) = args.retries {
        engine.retry_limit = retries;
    }
    if let Some(delay) = args.retry_delay_ms {
        engine.retry_delay_ms = delay;
        engine.max_retry_delay_ms = engine.max_retry_delay_ms.max(delay);
    }
    if let Some(interval) = args.progress_interval_ms {
        engine.progress_report_interval_ms = interval;
    }
    if args.verify || force_verify {
        engine.integrity_check_enabled = true;
    }
    engine
}

/// Look up a dotted key such as `engine.retry_limit`
pub fn get_key(settings: &Settings, key: &str) -> Option<serde_json::Value> {
    let value = serde_json::to_value(settings).ok()?;
    key.split('.')
        .try_fold(&value, |v, part| v.get(part))
        .cloned()
}

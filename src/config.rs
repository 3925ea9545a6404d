//! Configuration: where settings live and what they hold.
//!
//! Directory priority:
//! 1. CLI `--config-dir`
//! 2. `MONTAGE_CONFIG_DIR` environment variable
//! 3. Current folder IF it holds montage files (montage.json, montage.log)
//! 4. Platform directory from dirs-next
//!
//! Platform paths:
//! - Linux: ~/.config/montage/{name}, data in ~/.local/share/montage/{name}
//! - macOS: ~/Library/Application Support/montage/{name}
//! - Windows: %APPDATA%\montage\{name}

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "montage.json";
pub const LOG_FILE: &str = "montage.log";
pub const CONFIG_DIR_ENV: &str = "MONTAGE_CONFIG_DIR";
/// Backend search path override
pub const RENDERER_PATH_ENV: &str = "MLT_REPOSITORY";
/// Backend search path used when nothing else is configured
pub const DEFAULT_RENDERER_PATH: &str = "/usr/lib/mlt-7";

/// Overrides for the default application paths.
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Create the config and data directories when missing.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }
    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn resolve_dir(config: &PathConfig, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_config_files(&current_dir) {
            return current_dir;
        }
    }
    match platform {
        Some(dir) => dir.join("montage"),
        None => PathBuf::from("."),
    }
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir())
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir())
}

// ============================================================================
// Settings
// ============================================================================

/// Persistent settings (`montage.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backend module search path; empty means env or compile-time default
    pub renderer_path: String,
    /// Profile used when a document names none we know
    pub fallback_profile: String,
    /// Background task threads, 0 = auto
    pub worker_threads: usize,
    pub task_queue_depth: usize,
    /// Font families available for title clips
    pub available_fonts: Vec<String>,
    /// Length given to stills and generators on insert
    pub default_still_length_secs: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            renderer_path: String::new(),
            fallback_profile: "dv_pal".to_string(),
            worker_threads: 0,
            task_queue_depth: 64,
            available_fonts: vec![
                "DejaVu Sans".to_string(),
                "DejaVu Serif".to_string(),
                "Liberation Sans".to_string(),
                "Noto Sans".to_string(),
            ],
            default_still_length_secs: 5.0,
        }
    }
}

impl Settings {
    /// Load from `montage.json`; a missing file gives the defaults.
    pub fn load(config: &PathConfig) -> Result<Self> {
        let path = config_file(SETTINGS_FILE, config);
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid settings file: {}", path.display()))
    }

    pub fn save(&self, config: &PathConfig) -> Result<()> {
        ensure_dirs(config)?;
        let path = config_file(SETTINGS_FILE, config);
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, text).with_context(|| format!("Failed to write settings: {}", path.display()))
    }

    /// Backend search path: setting → `MLT_REPOSITORY` → compile-time default.
    pub fn renderer_path(&self) -> PathBuf {
        if !self.renderer_path.is_empty() {
            return PathBuf::from(&self.renderer_path);
        }
        match std::env::var(RENDERER_PATH_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(DEFAULT_RENDERER_PATH),
        }
    }

    /// Still length in frames at `fps`.
    pub fn still_frames(&self, fps: f64) -> i32 {
        let frames = (self.default_still_length_secs * fps).round() as i32;
        if frames < 1 {
            warn!("Still length {}s too short, using 1 frame", self.default_still_length_secs);
        }
        frames.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config_file("test.json", &config), PathBuf::from("/custom/test.json"));
        assert_eq!(data_file("montage.log", &config), PathBuf::from("/custom/montage.log"));
    }

    #[test]
    fn test_settings_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = PathConfig {
            config_dir: Some(dir.path().to_path_buf()),
        };
        let mut settings = Settings::default();
        settings.fallback_profile = "atsc_1080p_25".into();
        settings.worker_threads = 3;
        settings.save(&config).expect("save");

        let loaded = Settings::load(&config).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_and_partial_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE);
        assert_eq!(Settings::load_from(&path).expect("defaults"), Settings::default());

        std::fs::write(&path, r#"{"worker_threads": 2}"#).expect("write");
        let s = Settings::load_from(&path).expect("partial");
        assert_eq!(s.worker_threads, 2);
        assert_eq!(s.fallback_profile, "dv_pal");

        std::fs::write(&path, "not json").expect("write");
        assert!(Settings::load_from(&path).is_err());
    }

    #[test]
    fn test_renderer_path_setting_wins() {
        let s = Settings {
            renderer_path: "/opt/mlt".into(),
            ..Settings::default()
        };
        assert_eq!(s.renderer_path(), PathBuf::from("/opt/mlt"));
    }

    #[test]
    fn test_still_frames() {
        let s = Settings::default();
        assert_eq!(s.still_frames(25.0), 125);
        let short = Settings {
            default_still_length_secs: 0.0,
            ..Settings::default()
        };
        assert_eq!(short.still_frames(25.0), 1);
    }
}

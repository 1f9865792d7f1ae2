use log::{LevelFilter, debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::geometry::{DEFAULT_DENSITY, FitMode};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
pub const APP_NAME: &str = "pagebridge";

/// Verbosity of the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub fit_mode: FitMode,

    /// Initial display density in pixels per centimetre
    #[serde(default = "default_density")]
    pub density: f32,

    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_density() -> f32 {
    DEFAULT_DENSITY
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            fit_mode: FitMode::default(),
            density: default_density(),
            log_level: LogLevel::default(),
        }
    }
}

impl Settings {
    /// Reads `<config_dir>/pagebridge/config.yaml`, defaults if it is missing
    /// or broken.
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from_path(&path),
            None => {
                warn!("Could not determine config directory, using default settings");
                Self::default()
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings file at {path:?}");
            return Self::default();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read settings file {path:?}: {e}");
                return Self::default();
            }
        };

        match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");
                settings.sanitize();
                settings
            }
            Err(e) => {
                warn!("Failed to parse settings file {path:?}: {e}");
                Self::default()
            }
        }
    }

    fn sanitize(&mut self) {
        if self.version > CURRENT_VERSION {
            info!(
                "Settings file is v{}, newer than v{CURRENT_VERSION}; unknown keys are ignored",
                self.version
            );
        }
        if !self.density.is_finite() || self.density <= 0.0 {
            warn!(
                "Ignoring invalid density {} in settings, using {DEFAULT_DENSITY}",
                self.density
            );
            self.density = DEFAULT_DENSITY;
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Where the log file goes. The terminal is the display, so logs never
/// touch stdout or stderr.
pub fn log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
        .join(format!("{APP_NAME}.log"))
}

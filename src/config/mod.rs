//! Persisted settings, an ini file in the platform config directory.
//!
//! The only setting the meter core consumes is the serial port name; the
//! store is deliberately a dumb key-value file.

use ini::Ini;
use once_cell::sync::Lazy;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const SECTION: &str = "meter";
const KEY_COM_PORT: &str = "com_port";

/// Sensible default on Windows where the meter hardware originated; on
/// other platforms the user supplies a device path.
#[cfg(windows)]
pub const DEFAULT_COM_PORT: &str = "COM3";
#[cfg(not(windows))]
pub const DEFAULT_COM_PORT: &str = "/dev/ttyUSB0";

static CONFIG_DIR: Lazy<Option<PathBuf>> = Lazy::new(|| {
    directories::ProjectDirs::from("com", "swvincent", "pcmeter")
        .map(|dirs| dirs.config_dir().to_path_buf())
});

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(String),
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "IO error: {}", e),
            Self::ParseError(e) => write!(f, "Settings parse error: {}", e),
            Self::NoConfigDir => write!(f, "No usable configuration directory"),
        }
    }
}

impl Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e)
    }
}

impl From<ini::Error> for ConfigError {
    fn from(e: ini::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}

/// Read/write access to the persisted meter settings.
pub trait ConfigProvider {
    fn meter_com_port(&self) -> &str;
    fn set_meter_com_port(&mut self, port_name: &str);
    fn save(&self) -> Result<(), ConfigError>;
}

/// Settings backed by `settings.ini` in the platform config directory.
pub struct Settings {
    path: PathBuf,
    com_port: String,
}

impl Settings {
    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let dir = CONFIG_DIR.as_ref().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(dir.join("settings.ini"))
    }

    /// Load from an explicit path. A missing file is not an error, it
    /// means first run; defaults apply until `save` is called.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        let com_port = if path.exists() {
            let ini = Ini::load_from_file(&path)?;
            ini.section(Some(SECTION))
                .and_then(|section| section.get(KEY_COM_PORT))
                .unwrap_or(DEFAULT_COM_PORT)
                .to_string()
        } else {
            DEFAULT_COM_PORT.to_string()
        };

        Ok(Self { path, com_port })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for Settings {
    fn meter_com_port(&self) -> &str {
        &self.com_port
    }

    fn set_meter_com_port(&mut self, port_name: &str) {
        self.com_port = port_name.to_string();
    }

    fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some(SECTION))
            .set(KEY_COM_PORT, self.com_port.as_str());
        ini.write_to_file(&self.path)?;
        Ok(())
    }
}

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

const CONFIG_FILENAME: &str = "config.json";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// How calibration changes on a root image reach its project instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// An instance follows the root while its value equals the old root value.
    #[default]
    ValueEquality,
    /// An instance follows the root until its value is written directly.
    ExplicitSource,
}

/// What to do when the per-axis median coordinate has no plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceFallback {
    #[default]
    Strict,
    /// Pick the closest existing plane in axis-index space.
    Nearest,
}

impl FromStr for CalibrationMode {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "value_equality" => Ok(CalibrationMode::ValueEquality),
            "explicit_source" => Ok(CalibrationMode::ExplicitSource),
            other => Err(CatalogError::InvalidArgument(format!(
                "unknown calibration mode '{}'",
                other
            ))),
        }
    }
}

impl FromStr for ReferenceFallback {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(ReferenceFallback::Strict),
            "nearest" => Ok(ReferenceFallback::Nearest),
            other => Err(CatalogError::InvalidArgument(format!(
                "unknown reference fallback '{}'",
                other
            ))),
        }
    }
}

/// Configuration for a catalog, stored in `config.json` next to the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogConfig {
    #[serde(default)]
    pub calibration_mode: CalibrationMode,

    #[serde(default)]
    pub reference_fallback: ReferenceFallback,

    /// Append the row id as a final sort key so pages never overlap.
    #[serde(default = "default_stable_sort")]
    pub stable_sort: bool,

    /// Page size used by the CLI when none is given (0 = everything).
    #[serde(default)]
    pub default_page_size: u64,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_stable_sort() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            calibration_mode: CalibrationMode::default(),
            reference_fallback: ReferenceFallback::default(),
            stable_sort: default_stable_sort(),
            default_page_size: 0,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl CatalogConfig {
    /// Load config from the given directory, or return defaults if not found
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILENAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: CatalogConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to the given directory
    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        let config_dir = config_dir.as_ref();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(config_dir.join(CONFIG_FILENAME), content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "calibration-mode" => serde_json::to_value(self.calibration_mode)?,
            "reference-fallback" => serde_json::to_value(self.reference_fallback)?,
            "stable-sort" => serde_json::to_value(self.stable_sort)?,
            "default-page-size" => serde_json::to_value(self.default_page_size)?,
            "busy-timeout-ms" => serde_json::to_value(self.busy_timeout_ms)?,
            other => return Err(unknown_key(other)),
        };
        Ok(match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "calibration-mode" => self.calibration_mode = value.parse()?,
            "reference-fallback" => self.reference_fallback = value.parse()?,
            "stable-sort" => self.stable_sort = parse_setting(key, value)?,
            "default-page-size" => self.default_page_size = parse_setting(key, value)?,
            "busy-timeout-ms" => self.busy_timeout_ms = parse_setting(key, value)?,
            other => return Err(unknown_key(other)),
        }
        Ok(())
    }
}

fn parse_setting<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CatalogError::InvalidArgument(format!("invalid value '{}' for {}", value, key)))
}

fn unknown_key(key: &str) -> CatalogError {
    CatalogError::InvalidArgument(format!("unknown config key '{}'", key))
}

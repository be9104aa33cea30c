//! Engine configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::scratch::DEFAULT_SECONDS_PER_REVOLUTION;
use crate::{Error, Result};

/// Sample files shipped with the default pad bank.
const DEFAULT_PAD_FILES: [&str; 6] = [
    "Drum 1.wav",
    "Vocal Sample 1.mp3",
    "Siren.mp3",
    "Drum 4.wav",
    "Glasses Up.mp3",
    "Airhorn.mp3",
];

/// Engine settings chosen by the application shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate every track is converted to on load.
    pub sample_rate: u32,
    /// Largest block the mixer renders in one pass; bigger requests are chunked.
    pub max_block_frames: usize,
    /// Track seconds covered by one full platter revolution.
    pub scratch_seconds_per_revolution: f64,
    /// Starting position of both volume faders.
    pub initial_volume: f64,
    /// Starting crossfader position.
    pub initial_crossfade: f64,
    /// One-shot samples for the auxiliary deck.
    pub pads: PadBank,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            max_block_frames: 4096,
            scratch_seconds_per_revolution: DEFAULT_SECONDS_PER_REVOLUTION,
            initial_volume: 0.5,
            initial_crossfade: 0.5,
            pads: PadBank::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".to_string()));
        }
        if self.max_block_frames == 0 {
            return Err(Error::Config(
                "max_block_frames must be positive".to_string(),
            ));
        }
        if !(self.scratch_seconds_per_revolution.is_finite()
            && self.scratch_seconds_per_revolution > 0.0)
        {
            return Err(Error::Config(format!(
                "scratch_seconds_per_revolution must be positive, got {}",
                self.scratch_seconds_per_revolution
            )));
        }
        for (name, value) in [
            ("initial_volume", self.initial_volume),
            ("initial_crossfade", self.initial_crossfade),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Ordered list of sample locators fired on the auxiliary deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PadBank(Vec<String>);

impl Default for PadBank {
    fn default() -> Self {
        Self::in_dir(&default_pad_dir())
    }
}

impl PadBank {
    pub const fn new(locators: Vec<String>) -> Self {
        Self(locators)
    }

    /// The stock pad samples, looked up in `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self(
            DEFAULT_PAD_FILES
                .iter()
                .map(|name| dir.join(name).to_string_lossy().into_owned())
                .collect(),
        )
    }

    /// Locator of pad `index`.
    pub fn locator(&self, index: usize) -> Result<&str> {
        self.0
            .get(index)
            .map(String::as_str)
            .ok_or(Error::UnknownPad(index))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-user directory holding the stock pad samples.
///
/// Falls back to `./pads` when no home directory can be determined.
pub fn default_pad_dir() -> PathBuf {
    ProjectDirs::from("", "", "deckmix").map_or_else(
        || PathBuf::from("pads"),
        |dirs| dirs.data_dir().join("pads"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.pads.len(), 6);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(r#"{"sample_rate": 44100}"#).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.max_block_frames, 4096);
    }

    #[test]
    fn test_pads_from_json() {
        let config = EngineConfig::from_json_str(r#"{"pads": ["a.wav", "b.wav"]}"#).unwrap();
        assert_eq!(config.pads.locator(1).unwrap(), "b.wav");
        assert!(matches!(config.pads.locator(2), Err(Error::UnknownPad(2))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_json_str(r#"{"sample_rate": 0}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"initial_crossfade": 1.5}"#).is_err());
        assert!(
            EngineConfig::from_json_str(r#"{"scratch_seconds_per_revolution": -1.0}"#).is_err()
        );
        assert!(matches!(
            EngineConfig::from_json_str("not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_stock_pads_live_in_dir() {
        let bank = PadBank::in_dir(Path::new("/samples"));
        assert!(bank.locator(0).unwrap().ends_with("Drum 1.wav"));
        assert!(bank.locator(5).unwrap().starts_with("/samples"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = EngineConfig::load("/nonexistent/deckmix.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    video::EncodeSettings,
};

/// Main configuration for post-reel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output encoding settings
    pub output: EncodeSettings,

    /// Sample frame stills written for manual checks
    pub diagnostics: DiagnosticsConfig,

    /// Where the card sits on the video canvas
    pub overlay: OverlayConfig,

    /// Profile picture stamped onto the card before compositing
    pub avatar: AvatarConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_output(&self.output)?;
        self.avatar.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn validate_output(output: &EncodeSettings) -> Result<()> {
    if output.fps == 0 {
        return Err(invalid("output.fps", output.fps).into());
    }

    if output.codec.trim().is_empty() {
        return Err(invalid("output.codec", &output.codec).into());
    }

    if output.fourcc.len() != 4 || !output.fourcc.is_ascii() {
        return Err(invalid("output.fourcc", &output.fourcc).into());
    }

    if !(1..=31).contains(&output.quality) {
        return Err(invalid("output.quality", output.quality).into());
    }

    Ok(())
}

/// Diagnostic still-frame output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,

    /// How many leading frames to save
    pub sample_frames: usize,

    /// Directory for the stills; nothing is written when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_dir: Option<PathBuf>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_frames: 2,
            frames_dir: None,
        }
    }
}

impl DiagnosticsConfig {
    /// The directory to write into, if sampling is active
    pub fn target_dir(&self) -> Option<&Path> {
        if self.enabled && self.sample_frames > 0 {
            self.frames_dir.as_deref()
        } else {
            None
        }
    }
}

/// Card placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// The card was rendered at the video size and covers the whole frame
    pub full_canvas: bool,

    /// Top-left corner of the card when it is a sub-region
    pub offset: (u32, u32),
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            full_canvas: true,
            offset: (0, 0),
        }
    }
}

/// Profile picture placement on the card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Top-left corner on the card
    pub position: (u32, u32),

    /// Edge length of the circular crop
    pub size: u32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            path: None,
            position: (159, 610),
            size: 92,
        }
    }
}

impl AvatarConfig {
    fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(invalid("avatar.size", self.size).into());
        }
        Ok(())
    }
}

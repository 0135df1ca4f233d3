use thiserror::Error;

/// Main error type for the post-reel library
#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Overlay error: {0}")]
    Overlay(#[from] OverlayError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Video-specific errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to open video source: {path} ({reason})")]
    MediaOpen { path: String, reason: String },

    #[error("Video decoding failed: {reason}")]
    DecodingFailed { reason: String },

    #[error("Overlay {overlay:?} at offset {offset:?} does not fit frame {frame:?}")]
    DimensionMismatch {
        frame: (u32, u32),
        overlay: (u32, u32),
        offset: (u32, u32),
    },

    #[error("No frames to write")]
    NoFrames,

    #[error("Video encoding failed: {reason}")]
    EncodeWrite { reason: String },

    #[error("Failed to write diagnostic frame {path}: {reason}")]
    DiagnosticWrite { path: String, reason: String },
}

/// Errors raised while preparing the overlay card
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Failed to load image: {path} ({reason})")]
    LoadFailed { path: String, reason: String },

    #[error("Invalid avatar: {details}")]
    InvalidAvatar { details: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using ReelError
pub type Result<T> = std::result::Result<T, ReelError>;

impl ReelError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Whether the error should fail the whole generation request.
    ///
    /// An empty source and a failed diagnostic write are left to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Video(VideoError::NoFrames) | Self::Video(VideoError::DiagnosticWrite { .. })
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Video(VideoError::MediaOpen { path, .. }) => {
                format!("Could not open video '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Video(VideoError::DimensionMismatch { frame, overlay, .. }) => {
                format!(
                    "The overlay ({}x{}) does not fit the video ({}x{}). Render the card at the video size.",
                    overlay.0, overlay.1, frame.0, frame.1
                )
            }
            Self::Video(VideoError::NoFrames) => "No video produced: the source contained no frames.".to_string(),
            Self::Overlay(OverlayError::LoadFailed { path, .. }) => {
                format!("Could not load image '{}'.", path)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(!ReelError::from(VideoError::NoFrames).is_fatal());
        assert!(!ReelError::from(VideoError::DiagnosticWrite {
            path: "frames/frame_0.png".to_string(),
            reason: "missing".to_string(),
        })
        .is_fatal());

        assert!(ReelError::from(VideoError::MediaOpen {
            path: "bg.mp4".to_string(),
            reason: "missing".to_string(),
        })
        .is_fatal());
        assert!(ReelError::from(VideoError::EncodeWrite { reason: "pipe".to_string() }).is_fatal());
    }

    #[test]
    fn test_dimension_message() {
        let err = VideoError::DimensionMismatch {
            frame: (64, 64),
            overlay: (32, 16),
            offset: (40, 0),
        };
        assert_eq!(err.to_string(), "Overlay (32, 16) at offset (40, 0) does not fit frame (64, 64)");
    }
}

//! Typed errors returned by timeline edits and document handling.
//!
//! Edits never panic across the lock boundary: every failure is reported as a
//! [`TimelineError`] and the playlist is left as it was before the call.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimelineError {
    /// Range or type violation in the arguments of a call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The edit would overlap existing content in the current mode.
    #[error("collision on track {track} at frame {frame}")]
    Collision { track: usize, frame: i32 },

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("track {0} is locked")]
    Locked(usize),

    /// Referenced clip, producer or luma file is absent.
    #[error("missing media: {0}")]
    MissingMedia(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Forwarded from the rendering backend.
    #[error("renderer error: {0}")]
    Renderer(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TimelineResult<T> = Result<T, TimelineError>;

impl TimelineError {
    /// Stable code for the command front-end.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Collision { .. } => "COLLISION",
            Self::OutOfRange(_) => "OUT_OF_RANGE",
            Self::Locked(_) => "LOCKED",
            Self::MissingMedia(_) => "MISSING_MEDIA",
            Self::InvalidDocument(_) => "INVALID_DOCUMENT",
            Self::Renderer(_) => "RENDERER_ERROR",
            Self::OutOfMemory => "OOM",
            Self::Io(_) => "IO_ERROR",
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(TimelineError::Locked(2).code(), "LOCKED");
        assert_eq!(
            TimelineError::Collision { track: 1, frame: 40 }.code(),
            "COLLISION"
        );
        let io = TimelineError::from(std::io::Error::other("boom"));
        assert_eq!(io.code(), "IO_ERROR");
    }

    #[test]
    fn test_display() {
        let e = TimelineError::Collision { track: 3, frame: 12 };
        assert_eq!(e.to_string(), "collision on track 3 at frame 12");
    }
}

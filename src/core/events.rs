//! Events published by the timeline and the producer registry.

use std::path::PathBuf;

// === Timeline ===

/// Content of `track` changed within `[start, end)`.
#[derive(Clone, Debug, PartialEq)]
pub struct TimelineChanged {
    pub track: usize,
    pub start: i32,
    pub end: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DurationChanged {
    pub frames: i32,
}

/// Tracks added, removed or their state changed.
#[derive(Clone, Debug, PartialEq)]
pub struct TracksChanged;

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionsChanged;

// === Bin / registry ===

#[derive(Clone, Debug, PartialEq)]
pub struct ClipReady {
    pub clip_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClipModified {
    pub clip_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClipMissing {
    pub clip_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClipAvailable {
    pub clip_id: String,
}

// === Background task requests ===

#[derive(Clone, Debug, PartialEq)]
pub struct ThumbnailRequest {
    pub clip_id: String,
    pub frame: i32,
    pub target: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioPeaksRequest {
    pub clip_id: String,
    pub target: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProxyRequest {
    pub clip_id: String,
    pub source: PathBuf,
    pub target: PathBuf,
}

/// A background task finished writing `path` (or failed with `error`).
#[derive(Clone, Debug, PartialEq)]
pub struct TaskFinished {
    pub clip_id: String,
    pub path: PathBuf,
    pub error: Option<String>,
}

// === Renderer ===

/// The renderer displayed `frame`.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameShown {
    pub frame: i32,
}

/// Render progress of an export job.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPosition {
    pub frame: i32,
}

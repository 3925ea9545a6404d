//! Timeline model: tracks, producer instances, transitions and the edits
//! that keep them consistent.
//!
//! # Architecture
//!
//! ```text
//! TimelineModel
//!   ├── tracks: Vec<Track>          // 0 = background, playlists of cuts
//!   ├── registry: ProducerRegistry  // master clips + per-track instances
//!   ├── transitions: TransitionHandler
//!   └── tractor: Tractor            // published graph the renderer reads
//! ```
//!
//! Edits take `&mut self`, run against a snapshot and either commit (publish
//! the graph, emit events) or roll back untouched.

pub mod clips;
pub mod effects;
pub mod hash;
pub mod model;
pub mod registry;
pub mod tracks;
pub mod transitions;

pub use effects::EffectHost;
pub use model::{Edge, InsertMode, TimelineModel};
pub use registry::ProducerRegistry;
pub use transitions::{TransitionHandler, TransitionMove};

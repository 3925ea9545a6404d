//! Entities: plain data shared by the timeline, the document layer and the
//! renderer snapshot.
//!
//! - Source clips and their per-track producer instances
//! - Playlists of cuts and blanks, tracks, transitions
//! - Effect chains with their recipe catalog
//! - Bin items, groups, guides, profiles

pub mod attrs;
pub mod clip;
pub mod effects;
pub mod item;
pub mod keys;
pub mod playlist;
pub mod producer;
pub mod profile;
pub mod track;
pub mod transition;

pub use attrs::Properties;
pub use clip::{ClipKind, ClipState, SourceClip};
pub use effects::{Effect, EffectChain};
pub use item::{Bin, ClipGroup, GroupItem, Guide, ProjectItem, TrackTargets};
pub use playlist::{Cut, Entry, Playlist};
pub use producer::{ProducerId, ProducerInstance};
pub use profile::Profile;
pub use track::{Track, TrackKind};
pub use transition::Transition;

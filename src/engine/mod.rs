//! Rendering side: the published composition graph and the renderer contract.

pub mod renderer;
pub mod tractor;

pub use renderer::{HeadlessRenderer, PlaybackState, Renderer};
pub use tractor::{Tractor, TractorGraph};

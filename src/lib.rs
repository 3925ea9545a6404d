//! MONTAGE - multitrack timeline model library
//!
//! Re-exports all modules for use by the binary target.

// Core services (events, workers, context)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod document;
pub mod engine;
pub mod entities;
pub mod error;
pub mod timeline;

// Re-export commonly used types
pub use core::event_bus::{downcast_event, BoxedEvent, EventBus, Notifier};
pub use core::Context;
pub use document::Project;
pub use error::{TimelineError, TimelineResult};
pub use timeline::TimelineModel;

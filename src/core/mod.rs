//! Core services around the timeline: events, background workers, side files
//! and the application context tying them to an open project.

pub mod context;
pub mod event_bus;
pub mod events;
pub mod side_files;
pub mod workers;

pub use context::{Context, PendingDocument};
pub use event_bus::{EventBus, Notifier};
pub use side_files::ProjectFolder;
pub use workers::{CancelToken, Workers};

//! Project documents: the XML tree, reading and writing it, upgrading old
//! versions and validating media references before load.
//!
//! # Loading
//!
//! ```text
//! text ─► xml::Element::parse ─► upgrade::upgrade ─► DocumentValidator
//!                                                     │ RepairPlan (accepted?)
//!                                                     ▼
//!                                 reader::read_project ─► Project
//! ```
//!
//! Saving is `writer::write_project` followed by `Element::to_document`.

pub mod backup;
pub mod project;
pub mod reader;
pub mod render;
pub mod search;
pub mod upgrade;
pub mod validator;
pub mod writer;
pub mod xml;

pub use project::Project;
pub use validator::{DocumentValidator, ItemState, ProblemKind, RepairItem, RepairPlan};
pub use xml::Element;

/// Version written into `<kdenlivedoc version=..>`.
pub const DOCUMENT_VERSION: f64 = 0.91;

/// Document file extension.
pub const DOCUMENT_EXT: &str = "kdenlive";

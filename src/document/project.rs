//! Project: one open document with its timeline, bin and document-level data.

use log::{debug, info};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::xml::Element;
use super::{backup, reader, upgrade, writer, DOCUMENT_VERSION};
use crate::core::event_bus::Notifier;
use crate::entities::{Bin, EffectChain, Effect, Guide, Profile, Properties, SourceClip};
use crate::error::{TimelineError, TimelineResult};
use crate::timeline::TimelineModel;

/// Document property holding the id given to a project on creation.
pub const DOCUMENT_ID: &str = "documentid";

#[derive(Debug, Clone)]
pub struct Project {
    pub timeline: TimelineModel,
    pub bin: Bin,
    /// Named points in document order
    pub guides: Vec<Guide>,
    /// Document properties: proxy and render settings, free key/values
    pub properties: Properties,
    pub custom_effects: EffectChain,
    /// File the project was read from or last saved to
    pub path: Option<PathBuf>,
    /// Folder relative media paths resolve against
    pub root: PathBuf,
    pub modified: bool,
    /// Converted from an older document version on load
    pub upgraded: bool,
    pub version: f64,
    backup_written: bool,
}

impl Project {
    pub fn new(profile: Profile, notifier: Notifier) -> Self {
        let mut project = Self::with_timeline(TimelineModel::new(profile, notifier));
        project.properties.set(DOCUMENT_ID, Uuid::new_v4().simple().to_string());
        project
    }

    /// Project around an existing timeline, with empty document data.
    pub fn with_timeline(timeline: TimelineModel) -> Self {
        Self {
            timeline,
            bin: Bin::new(),
            guides: Vec::new(),
            properties: Properties::new(),
            custom_effects: EffectChain::default(),
            path: None,
            root: PathBuf::new(),
            modified: false,
            upgraded: false,
            version: DOCUMENT_VERSION,
            backup_written: false,
        }
    }

    pub(crate) fn from_loaded(mut self, path: Option<&Path>) -> Self {
        self.path = path.map(Path::to_path_buf);
        if self.root.as_os_str().is_empty() {
            if let Some(parent) = path.and_then(Path::parent) {
                self.root = parent.to_path_buf();
            }
        }
        self
    }

    // ========================================================================
    // Loading and saving
    // ========================================================================

    /// Read a project file without validation. Old versions are upgraded.
    pub fn open(path: &Path, fallback: &Profile, notifier: Notifier) -> TimelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut root = Element::parse(&text)?;
        upgrade::upgrade(&mut root, fallback);
        Self::from_element(&root, Some(path), fallback, notifier)
    }

    /// Build a project from an (upgraded, validated) document tree.
    pub fn from_element(
        root: &Element,
        path: Option<&Path>,
        fallback: &Profile,
        notifier: Notifier,
    ) -> TimelineResult<Self> {
        let project = reader::read_project(root, fallback, notifier)?.from_loaded(path);
        info!(
            "Loaded project {}: {} tracks, {} frames{}",
            path.map(|p| p.display().to_string()).unwrap_or_else(|| "<memory>".to_string()),
            project.timeline.track_count(),
            project.timeline.duration(),
            if project.upgraded { " (upgraded)" } else { "" }
        );
        Ok(project)
    }

    pub fn to_element(&self) -> Element {
        writer::write_project(self)
    }

    pub fn to_document(&self) -> TimelineResult<String> {
        self.to_element().to_document()
    }

    /// Save to the current path.
    pub fn save(&mut self) -> TimelineResult<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| TimelineError::invalid("project has no file name"))?;
        self.save_as(&path)
    }

    /// Write the document to `path`. The first save of an upgraded project
    /// keeps a backup of the file it came from.
    pub fn save_as(&mut self, path: &Path) -> TimelineResult<()> {
        if self.upgraded && !self.backup_written {
            if let Some(source) = self.path.as_deref().filter(|p| p.exists()) {
                let copy = backup::write_backup(source)?;
                info!("Backup of upgraded document: {}", copy.display());
            }
            self.backup_written = true;
        }
        let was_modified = self.modified;
        self.modified = false;
        let text = match self.to_document() {
            Ok(text) => text,
            Err(e) => {
                self.modified = was_modified;
                return Err(e);
            }
        };
        if let Err(e) = std::fs::write(path, text) {
            self.modified = was_modified;
            return Err(e.into());
        }
        debug!("Saved project to {}", path.display());
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    // ========================================================================
    // Bin and document data
    // ========================================================================

    /// Register a clip and file it in the bin.
    pub fn add_clip(&mut self, clip: SourceClip, folder: Option<&str>) -> TimelineResult<String> {
        let id = self.timeline.registry_mut().add_clip(clip)?;
        self.bin.add_clip(id.clone(), folder.map(str::to_string));
        self.modified = true;
        Ok(id)
    }

    /// Remove an unused clip from the bin and the registry.
    pub fn remove_clip(&mut self, clip_id: &str) -> TimelineResult<()> {
        self.timeline.remove_clip(clip_id)?;
        self.bin.remove_clip(clip_id);
        self.modified = true;
        Ok(())
    }

    pub fn add_guide(&mut self, frame: i32, comment: impl Into<String>) {
        self.guides.push(Guide {
            frame,
            comment: comment.into(),
        });
        self.modified = true;
    }

    pub fn remove_guide(&mut self, frame: i32) -> bool {
        let before = self.guides.len();
        self.guides.retain(|g| g.frame != frame);
        let removed = self.guides.len() != before;
        self.modified |= removed;
        removed
    }

    /// Store an effect preset with the document.
    pub fn add_custom_effect(&mut self, effect: Effect) -> usize {
        self.modified = true;
        self.custom_effects.add(effect)
    }

    pub fn document_id(&self) -> Option<&str> {
        self.properties.get(DOCUMENT_ID)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.as_deref().and_then(Path::file_stem).and_then(|s| s.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ClipKind, ClipState, TrackKind};
    use crate::timeline::InsertMode;

    #[test]
    fn test_save_and_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("edit.kdenlive");
        let mut project = Project::new(Profile::default(), Notifier::silent());
        project
            .add_clip(SourceClip::new("1", ClipKind::AV, "/m/a.mov").with_length(100), None)
            .expect("clip");
        project.timeline.add_track(1, TrackKind::Video).expect("track");
        project
            .timeline
            .insert_clip(1, 10, "1", ClipState::Original, InsertMode::Normal)
            .expect("cut");
        project.add_guide(25, "chorus");
        assert!(project.modified);

        project.save_as(&path).expect("save");
        assert!(!project.modified);
        assert_eq!(project.file_name(), Some("edit"));

        let loaded = Project::open(&path, &Profile::default(), Notifier::silent()).expect("open");
        assert!(loaded.timeline.content_eq(&project.timeline));
        assert_eq!(loaded.guides, project.guides);
        assert_eq!(loaded.root, dir.path());
        assert!(!loaded.upgraded);
        assert!(loaded.document_id().is_some());
        assert_eq!(loaded.document_id(), project.document_id());
        let other = Project::new(Profile::default(), Notifier::silent());
        assert_ne!(other.document_id(), project.document_id());
    }

    #[test]
    fn test_remove_clip_in_use() {
        let mut project = Project::new(Profile::default(), Notifier::silent());
        project
            .add_clip(SourceClip::new("1", ClipKind::AV, "/m/a.mov").with_length(100), None)
            .expect("clip");
        project.timeline.add_track(1, TrackKind::Video).expect("track");
        project
            .timeline
            .insert_clip(1, 0, "1", ClipState::Original, InsertMode::Normal)
            .expect("cut");
        assert!(project.remove_clip("1").is_err());
        assert!(project.bin.contains_clip("1"));
        project.timeline.delete_clip(1, 0).expect("delete");
        project.remove_clip("1").expect("remove");
        assert!(!project.bin.contains_clip("1"));
    }

    #[test]
    fn test_save_without_path() {
        let mut project = Project::new(Profile::default(), Notifier::silent());
        assert_eq!(project.save().expect_err("no path").code(), "INVALID_ARGUMENT");
    }
}

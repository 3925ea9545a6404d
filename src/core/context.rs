//! Application context: settings, event bus, worker pool and the open project.
//!
//! Opening a project is split in two so a front-end can show the repair plan
//! between the steps:
//!
//! 1. [`Context::inspect_project`] parses, upgrades and validates the file
//! 2. [`Context::load_document`] applies the plan (when accepted) and builds
//!    the project
//!
//! [`Context::open_project`] runs both.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::event_bus::EventBus;
use super::events::{AudioPeaksRequest, ProxyRequest, TaskFinished, ThumbnailRequest};
use super::side_files::ProjectFolder;
use super::workers::{CancelToken, Workers};
use crate::config::{PathConfig, Settings};
use crate::document::{upgrade, DocumentValidator, Element, Project, RepairPlan};
use crate::engine::{HeadlessRenderer, Renderer};
use crate::entities::keys::*;
use crate::entities::Profile;
use crate::error::{TimelineError, TimelineResult};

/// Height of generated thumbnails; the width follows the display aspect.
pub const THUMBNAIL_HEIGHT: u32 = 64;

/// A parsed document waiting for the user's decision on its repair plan.
#[derive(Debug, Clone)]
pub struct PendingDocument {
    pub path: PathBuf,
    pub root: Element,
    pub plan: RepairPlan,
    /// The file predates the current document version
    pub upgraded: bool,
}

pub struct Context {
    pub settings: Settings,
    pub path_config: PathConfig,
    pub bus: EventBus,
    pub workers: Arc<Workers>,
    pub project: Option<Project>,
}

impl Context {
    pub fn new(settings: Settings, path_config: PathConfig) -> Self {
        let workers = Arc::new(Workers::new(settings.worker_threads, settings.task_queue_depth));
        Self {
            settings,
            path_config,
            bus: EventBus::new(),
            workers,
            project: None,
        }
    }

    /// Profile for documents that name none we know.
    pub fn fallback_profile(&self) -> Profile {
        Profile::by_name(&self.settings.fallback_profile).unwrap_or_else(|| {
            warn!("Unknown fallback profile {}, using default", self.settings.fallback_profile);
            Profile::default()
        })
    }

    /// Empty project with the default still length from the settings.
    pub fn new_project(&mut self, profile: Profile) -> &mut Project {
        self.close_project();
        let still = self.settings.still_frames(profile.fps());
        let mut project = Project::new(profile, self.bus.notifier());
        project.timeline.set_still_frames(still);
        self.project.insert(project)
    }

    /// Parse, upgrade and validate `path`. With `search`, missing clips are
    /// looked for under that folder.
    pub fn inspect_project(&self, path: &Path, search: Option<&Path>) -> TimelineResult<PendingDocument> {
        let text = std::fs::read_to_string(path)?;
        let mut root = Element::parse(&text)?;
        if root.attr("root_path").is_none_or(str::is_empty) {
            if let Some(dir) = path.parent() {
                root.set_attr("root_path", dir.display());
            }
        }
        let upgraded = upgrade::upgrade(&mut root, &self.fallback_profile());

        let validator = DocumentValidator::new(self.settings.available_fonts.clone());
        let mut plan = validator.validate(&root);
        if let Some(dir) = search {
            let found = plan.search(dir);
            info!("Search in {}: {} clips relinked", dir.display(), found);
        }
        Ok(PendingDocument {
            path: path.to_path_buf(),
            root,
            plan,
            upgraded,
        })
    }

    /// Load an inspected document. Fails with `MissingMedia` when the plan
    /// needs confirmation and `accept` is false.
    pub fn load_document(&mut self, pending: PendingDocument, accept: bool) -> TimelineResult<&mut Project> {
        let PendingDocument {
            path,
            mut root,
            mut plan,
            ..
        } = pending;
        if plan.requires_confirmation() && !accept {
            return Err(TimelineError::MissingMedia(format!(
                "{}: {} problems need confirmation",
                path.display(),
                plan.items.iter().filter(|i| !i.is_automatic()).count()
            )));
        }
        if !plan.is_empty() {
            plan.apply(&mut root);
            for item in &plan.items {
                info!("Repair {} {}: {} ({})", item.kind, item.id, item.path, item.state);
            }
        }

        self.close_project();
        let project = Project::from_element(&root, Some(&path), &self.fallback_profile(), self.bus.notifier())?;
        let project = self.project.insert(project);
        request_proxies(project, &self.bus);
        Ok(project)
    }

    pub fn open_project(&mut self, path: &Path, accept: bool, search: Option<&Path>) -> TimelineResult<&mut Project> {
        let pending = self.inspect_project(path, search)?;
        self.load_document(pending, accept)
    }

    /// Abort background tasks and drop the project.
    pub fn close_project(&mut self) -> Option<Project> {
        self.workers.abort_all();
        let project = self.project.take();
        if let Some(p) = &project {
            debug!("Closed project {}", p.file_name().unwrap_or("<untitled>"));
        }
        project
    }

    pub fn project_folder(&self) -> Option<ProjectFolder> {
        self.project.as_ref().map(|p| ProjectFolder::new(p.root.clone()))
    }

    /// Side folder and content hash of `clip_id` in the open project.
    fn clip_files(&mut self, clip_id: &str) -> TimelineResult<(ProjectFolder, String)> {
        let project = self
            .project
            .as_mut()
            .ok_or_else(|| TimelineError::invalid("no project open"))?;
        let hash = project.timeline.registry_mut().compute_hash(clip_id)?;
        Ok((ProjectFolder::new(project.root.clone()), hash))
    }

    /// Ask the task runner for the audio peaks of `clip_id`. Returns where
    /// they will be stored.
    pub fn request_audio_peaks(&mut self, clip_id: &str) -> TimelineResult<PathBuf> {
        let (folder, hash) = self.clip_files(clip_id)?;
        let target = folder.audio_thumbnail_path(&hash);
        self.bus.emit(AudioPeaksRequest {
            clip_id: clip_id.to_string(),
            target: target.clone(),
        });
        Ok(target)
    }

    /// Store peaks delivered by the task runner, one vector per channel.
    pub fn store_audio_peaks(&mut self, clip_id: &str, channels: &[Vec<u8>]) -> TimelineResult<PathBuf> {
        let (folder, hash) = self.clip_files(clip_id)?;
        let result = folder.write_audio_peaks(&hash, channels);
        self.bus.emit(TaskFinished {
            clip_id: clip_id.to_string(),
            path: folder.audio_thumbnail_path(&hash),
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    /// Render a thumbnail of `clip_id` at `frame` in the background. The
    /// result is announced with [`TaskFinished`].
    pub fn request_thumbnail(&mut self, clip_id: &str, frame: i32) -> TimelineResult<Option<CancelToken>> {
        let (folder, hash) = self.clip_files(clip_id)?;
        let dar = self.project.as_ref().map(|p| p.timeline.profile().dar()).unwrap_or(1.0);
        let width = ((THUMBNAIL_HEIGHT as f64) * dar).round().max(1.0) as u32;

        let target = folder.thumbnail_path(&hash, frame);
        self.bus.emit(ThumbnailRequest {
            clip_id: clip_id.to_string(),
            frame,
            target: target.clone(),
        });

        let notifier = self.bus.notifier();
        let clip_id = clip_id.to_string();
        Ok(self.workers.submit(move |cancel| {
            if cancel.is_cancelled() {
                return;
            }
            let renderer = HeadlessRenderer::new(notifier.clone());
            let result = renderer
                .get_frame_image(&clip_id, frame, width, THUMBNAIL_HEIGHT)
                .and_then(|img| folder.write_thumbnail(&hash, frame, &img));
            let (path, error) = match result {
                Ok(path) => (path, None),
                Err(e) => (target, Some(e.to_string())),
            };
            notifier.emit(TaskFinished { clip_id, path, error });
        }))
    }
}

/// Ask for proxies the repair pass flagged for rebuilding.
fn request_proxies(project: &mut Project, bus: &EventBus) {
    let folder = ProjectFolder::new(project.root.clone());
    let flagged: Vec<String> = project
        .timeline
        .registry()
        .clips()
        .filter(|c| c.props.get_bool_or(P_REPLACE_PROXY, false))
        .map(|c| c.id.clone())
        .collect();
    for clip_id in flagged {
        let hash = match project.timeline.registry_mut().compute_hash(&clip_id) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("No proxy for clip {}: {}", clip_id, e);
                continue;
            }
        };
        let Some(clip) = project.timeline.registry().get_clip(&clip_id) else {
            continue;
        };
        let source = PathBuf::from(clip.original_url());
        let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("mp4").to_string();
        bus.emit(ProxyRequest {
            clip_id,
            source,
            target: folder.proxy_path(&hash, &ext),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ClipKind, ClipState, SourceClip, TrackKind};
    use crate::timeline::InsertMode;
    use std::time::{Duration, Instant};

    fn context(dir: &Path) -> Context {
        let path_config = PathConfig {
            config_dir: Some(dir.to_path_buf()),
        };
        let settings = Settings {
            worker_threads: 1,
            ..Settings::default()
        };
        Context::new(settings, path_config)
    }

    fn saved_project(dir: &Path, proxy: bool) -> PathBuf {
        let media = dir.join("a.mov");
        std::fs::write(&media, b"media").expect("write");
        let mut clip = SourceClip::new("1", ClipKind::AV, media.to_string_lossy()).with_length(100);
        if proxy {
            clip = clip.with_proxy(dir.join("proxy").join("gone.mp4").to_string_lossy());
        }
        let mut project = Project::new(Profile::default(), crate::core::event_bus::Notifier::silent());
        project.add_clip(clip, None).expect("clip");
        project.timeline.add_track(1, TrackKind::Video).expect("track");
        project
            .timeline
            .insert_clip(1, 0, "1", ClipState::Original, InsertMode::Normal)
            .expect("cut");
        let path = dir.join("edit.kdenlive");
        project.save_as(&path).expect("save");
        path
    }

    #[test]
    fn test_open_clean_project() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = saved_project(dir.path(), false);
        let mut ctx = context(dir.path());

        let pending = ctx.inspect_project(&path, None).expect("inspect");
        assert!(pending.plan.is_empty());
        assert!(!pending.upgraded);
        let project = ctx.load_document(pending, false).expect("load");
        assert_eq!(project.timeline.track_count(), 2);
        assert!(!project.modified);
        assert!(ctx.close_project().is_some());
        assert!(ctx.project.is_none());
    }

    #[test]
    fn test_repairs_need_acceptance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = saved_project(dir.path(), true);
        let mut ctx = context(dir.path());

        let err = ctx.open_project(&path, false, None).expect_err("needs confirmation");
        assert_eq!(err.code(), "MISSING_MEDIA");
        assert!(ctx.project.is_none());

        let project = ctx.open_project(&path, true, None).expect("accepted");
        assert!(project.modified);
        let clip = project.timeline.registry().get_clip("1").expect("clip");
        assert_eq!(clip.proxy(), None);
        assert_eq!(clip.resource(), dir.path().join("a.mov").to_string_lossy());

        let requests = ctx.bus.drain::<ProxyRequest>();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].source, dir.path().join("a.mov"));
        assert!(requests[0].target.starts_with(dir.path().join("proxy")));
    }

    #[test]
    fn test_thumbnail_task() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(dir.path());
        assert!(ctx.request_thumbnail("1", 0).is_err());

        let project = ctx.new_project(Profile::default());
        project.root = dir.path().to_path_buf();
        project
            .add_clip(SourceClip::new("1", ClipKind::Color, "0xff0000ff"), None)
            .expect("clip");
        assert_eq!(project.timeline.still_frames(), 125);

        ctx.request_thumbnail("1", 4).expect("request").expect("queued");
        assert_eq!(ctx.bus.drain::<ThumbnailRequest>().len(), 1);

        let deadline = Instant::now() + Duration::from_secs(10);
        let finished = loop {
            if let Some(done) = ctx.bus.drain::<TaskFinished>().pop() {
                break done;
            }
            assert!(Instant::now() < deadline, "thumbnail task did not finish");
            std::thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(finished.error, None);
        assert!(finished.path.exists());
        assert!(finished.path.starts_with(dir.path().join("thumbs")));
    }

    #[test]
    fn test_audio_peaks_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(dir.path());
        let media = dir.path().join("a.wav");
        std::fs::write(&media, b"samples").expect("write");
        let project = ctx.new_project(Profile::default());
        project.root = dir.path().to_path_buf();
        project
            .add_clip(SourceClip::new("1", ClipKind::Audio, media.to_string_lossy()), None)
            .expect("clip");

        let target = ctx.request_audio_peaks("1").expect("request");
        let requests = ctx.bus.drain::<AudioPeaksRequest>();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target, target);

        let stored = ctx.store_audio_peaks("1", &[vec![1, 2, 3], vec![4, 5, 6]]).expect("store");
        assert_eq!(stored, target);
        let folder = ctx.project_folder().expect("folder");
        let hash = ctx
            .project
            .as_ref()
            .and_then(|p| p.timeline.registry().get_clip("1"))
            .and_then(|c| c.file_hash().map(str::to_string))
            .expect("hash");
        assert_eq!(folder.read_audio_peaks(&hash).expect("read"), Some(vec![vec![1, 2, 3], vec![4, 5, 6]]));
        assert_eq!(ctx.bus.drain::<TaskFinished>().len(), 1);
    }
}

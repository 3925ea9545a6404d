//! Render script export: the project document with proxies swapped back to
//! their original media, for a headless renderer.

use log::info;
use std::collections::HashMap;
use std::path::Path;

use super::project::Project;
use super::xml::Element;
use crate::entities::keys::*;
use crate::error::TimelineResult;

/// Document tree of `project` referencing original media only.
pub fn render_element(project: &Project) -> Element {
    let mut root = project.to_element();
    let originals: HashMap<String, String> = project
        .timeline
        .registry()
        .get_proxies()
        .into_iter()
        .map(|(original, proxy)| (proxy, original))
        .collect();
    if originals.is_empty() {
        return root;
    }
    for producer in root.children.iter_mut().filter(|c| c.name == "producer") {
        let Some(resource) = producer.property(P_RESOURCE).map(str::to_string) else {
            continue;
        };
        // slowmotion resources carry a `?speed` tail
        let (base, tail) = match resource.find('?') {
            Some(pos) => resource.split_at(pos),
            None => (resource.as_str(), ""),
        };
        if let Some(original) = originals.get(base) {
            producer.set_property(P_RESOURCE, format!("{}{}", original, tail));
        }
        producer.remove_property(P_PROXY);
    }
    root
}

pub fn export_render_document(project: &Project, path: &Path) -> TimelineResult<()> {
    let text = render_element(project).to_document()?;
    std::fs::write(path, text)?;
    info!("Render document written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::Notifier;
    use crate::entities::{ClipKind, ClipState, Profile, SourceClip, TrackKind};
    use crate::timeline::InsertMode;

    #[test]
    fn test_proxies_swapped_back() {
        let mut project = Project::new(Profile::default(), Notifier::silent());
        let clip = SourceClip::new("1", ClipKind::AV, "/media/full.mov")
            .with_length(100)
            .with_proxy("/proxy/small.mp4");
        project.add_clip(clip, None).expect("clip");
        project
            .add_clip(SourceClip::new("2", ClipKind::AV, "/media/b.mov").with_length(50), None)
            .expect("clip");
        project.timeline.add_track(1, TrackKind::Video).expect("v1");
        project
            .timeline
            .insert_clip(1, 0, "1", ClipState::Original, InsertMode::Normal)
            .expect("cut");
        project
            .timeline
            .insert_clip(1, 100, "2", ClipState::Original, InsertMode::Normal)
            .expect("cut");
        project.timeline.change_speed(1, 0, 2.0, 1).expect("fast");

        let root = render_element(&project);
        let resources: Vec<_> = root
            .children_named("producer")
            .filter(|p| p.attr("id") != Some(BLACK_ID))
            .map(|p| (p.property(P_RESOURCE).unwrap_or(""), p.property(P_PROXY)))
            .collect();
        assert!(resources.contains(&("/media/full.mov", None)));
        assert!(resources.contains(&("/media/full.mov?2", None)));
        assert!(resources.contains(&("/media/b.mov", None)));
        assert!(resources.iter().all(|(r, _)| !r.starts_with("/proxy")));

        // the project itself keeps working on the proxy
        assert_eq!(project.timeline.registry().get_clip("1").map(|c| c.resource()), Some("/proxy/small.mp4"));
    }

    #[test]
    fn test_export_writes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("render.mlt");
        let project = Project::new(Profile::default(), Notifier::silent());
        export_render_document(&project, &path).expect("export");
        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("<mlt"));
    }
}

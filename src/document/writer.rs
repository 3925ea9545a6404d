//! Project to document tree.
//!
//! Producers come first (masters, then every instance a cut uses), then one
//! playlist per track, the main tractor with the transition field, and the
//! `<kdenlivedoc>` section with everything the backend does not know about.

use super::project::Project;
use super::xml::Element;
use super::DOCUMENT_VERSION;
use crate::entities::attrs::format_number;
use crate::entities::effects::realize;
use crate::entities::keys::*;
use crate::entities::track::{HIDE_AUDIO, HIDE_VIDEO};
use crate::entities::{EffectChain, Entry, GroupItem, Profile, Track};

/// Playlist id of a track.
pub fn playlist_id(index: usize) -> String {
    if index == 0 {
        BLACK_TRACK_ID.to_string()
    } else {
        format!("playlist{}", index)
    }
}

/// `hide` attribute of a tractor track.
pub fn hide_attr(hide: u8) -> Option<&'static str> {
    match (hide & HIDE_VIDEO != 0, hide & HIDE_AUDIO != 0) {
        (true, true) => Some("both"),
        (true, false) => Some("video"),
        (false, true) => Some("audio"),
        (false, false) => None,
    }
}

pub fn write_project(project: &Project) -> Element {
    let timeline = &project.timeline;
    let profile = timeline.profile();

    let mut root = Element::new("mlt")
        .with_attr("LC_NUMERIC", "C")
        .with_attr("profile", &profile.name)
        .with_attr("fps", format_number(profile.fps()))
        .with_attr("width", profile.width)
        .with_attr("height", profile.height)
        .with_attr("dar", format_number(profile.dar()))
        .with_attr("root_path", project.root.display())
        .with_attr("modified", u8::from(project.modified));
    if project.upgraded {
        root.set_attr("upgraded", 1);
    }
    root.push(profile_element(profile));

    // producers
    let registry = timeline.registry();
    for clip in registry.all_clips() {
        let mut el = Element::new("producer").with_attr("id", &clip.id).with_attr("in", 0);
        if let Some(len) = clip.props.get_i32(P_LENGTH) {
            el.set_attr("out", len - 1);
        }
        el.push_properties(&clip.props);
        if let Some(folder) = project.bin.folder_of(&clip.id) {
            el.set_property(P_FOLDER, folder);
        }
        root.push(el);
    }
    for instance in registry.instances() {
        let mut el = Element::new("producer").with_attr("id", &instance.id).with_attr("in", 0);
        if let Some(len) = instance.props.get_i32(P_LENGTH) {
            el.set_attr("out", len - 1);
        }
        el.push_properties(&instance.props);
        root.push(el);
    }

    // playlists
    for (index, track) in timeline.tracks().iter().enumerate() {
        root.push(playlist_element(index, track));
    }

    // tractor
    let mut tractor = Element::new("tractor")
        .with_attr("id", "maintractor")
        .with_attr("in", 0)
        .with_attr("out", timeline.duration().max(1) - 1);
    for (index, track) in timeline.tracks().iter().enumerate() {
        let mut el = Element::new("track").with_attr("producer", playlist_id(index));
        if let Some(hide) = hide_attr(track.hide).filter(|_| index > 0) {
            el.set_attr("hide", hide);
        }
        tractor.push(el);
    }
    for (n, transition) in timeline.transitions().field().iter().enumerate() {
        let mut el = Element::new("transition")
            .with_attr("id", format!("transition{}", n))
            .with_attr("in", transition.in_frame)
            .with_attr("out", transition.out_frame);
        el.set_property(P_SERVICE, transition.tag.clone());
        el.push_properties(&transition.stored_props());
        tractor.push(el);
    }
    root.push(tractor);
    root.push(kdenlivedoc(project));
    root
}

fn profile_element(profile: &Profile) -> Element {
    Element::new("profile")
        .with_attr("name", &profile.name)
        .with_attr("width", profile.width)
        .with_attr("height", profile.height)
        .with_attr("frame_rate_num", profile.fps_num)
        .with_attr("frame_rate_den", profile.fps_den)
        .with_attr("display_aspect_num", profile.dar_num)
        .with_attr("display_aspect_den", profile.dar_den)
}

/// Append the realized filters of `chain` to `parent`.
pub(crate) fn push_filters(parent: &mut Element, chain: &EffectChain) {
    for effect in chain.iter() {
        for filter in realize::expand(effect) {
            let mut el = Element::new("filter");
            el.set_property(P_SERVICE, filter.service);
            el.push_properties(&filter.props);
            parent.push(el);
        }
    }
}

fn playlist_element(index: usize, track: &Track) -> Element {
    let mut el = Element::new("playlist").with_attr("id", playlist_id(index));
    if index > 0 {
        el.set_property(T_NAME, track.name.clone());
        if track.is_audio() {
            el.set_property(T_AUDIO, "1");
        }
        if track.locked {
            el.set_property(T_LOCKED, "1");
        }
        el.set_property(T_COMPOSITE, if track.composite { "1" } else { "0" });
        el.push_properties(&track.props);
    }
    for entry in track.playlist.entries() {
        match entry {
            Entry::Blank(len) => el.push(Element::new("blank").with_attr("length", len)),
            Entry::Cut(cut) => {
                let mut entry_el = Element::new("entry")
                    .with_attr("producer", &cut.producer)
                    .with_attr("in", cut.in_frame)
                    .with_attr("out", cut.out_frame);
                entry_el.push_properties(&cut.props);
                push_filters(&mut entry_el, &cut.effects);
                el.push(entry_el);
            }
        }
    }
    push_filters(&mut el, &track.effects);
    el
}

fn kdenlivedoc(project: &Project) -> Element {
    let timeline = &project.timeline;
    let profile = timeline.profile();
    let mut doc = Element::new("kdenlivedoc")
        .with_attr("version", format_number(DOCUMENT_VERSION))
        .with_attr("profile", &profile.name)
        .with_attr("still_length", timeline.still_frames());

    let mut props = Element::new("documentproperties");
    props.push_properties(&project.properties);
    doc.push(props);

    let mut folders = Element::new("folders");
    for (id, name, parent) in project.bin.folders() {
        let mut el = Element::new("folder").with_attr("id", id).with_attr("name", name);
        if let Some(parent) = parent {
            el.set_attr("parent", parent);
        }
        folders.push(el);
    }
    doc.push(folders);

    let mut subclips = Element::new("subclips");
    for clip in timeline.registry().clips() {
        for (name, in_frame, out_frame) in project.bin.subclips_of(&clip.id) {
            subclips.push(
                Element::new("subclip")
                    .with_attr("clip", &clip.id)
                    .with_attr("name", name)
                    .with_attr("in", in_frame)
                    .with_attr("out", out_frame),
            );
        }
    }
    doc.push(subclips);

    let mut groups = Element::new("groups");
    for group in timeline.groups() {
        let mut el = Element::new("group");
        for member in &group.members {
            let kind = match member {
                GroupItem::Clip { .. } => "clip",
                GroupItem::Transition { .. } => "transition",
            };
            el.push(
                Element::new("item")
                    .with_attr("type", kind)
                    .with_attr("track", member.track())
                    .with_attr("start", member.start()),
            );
        }
        groups.push(el);
    }
    doc.push(groups);

    let mut guides = Element::new("guides");
    for guide in &project.guides {
        guides.push(
            Element::new("guide")
                .with_attr("time", format_number(profile.frames_to_seconds(guide.frame)))
                .with_attr("comment", &guide.comment),
        );
    }
    doc.push(guides);

    let mut custom = Element::new("customeffects");
    push_filters(&mut custom, &project.custom_effects);
    doc.push(custom);

    let targets = timeline.targets();
    let mut el = Element::new("targets");
    if let Some(video) = targets.video {
        el.set_attr("video", video);
    }
    if let Some(audio) = targets.audio {
        el.set_attr("audio", audio);
    }
    doc.push(el);

    if let Some(overlay) = timeline.overlay() {
        doc.push(Element::new("overlay").with_attr("clip", &overlay.clip_id));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::Notifier;
    use crate::entities::{ClipKind, ClipState, SourceClip, TrackKind};
    use crate::timeline::InsertMode;

    fn project() -> Project {
        let mut p = Project::new(Profile::default(), Notifier::silent());
        p.add_clip(SourceClip::new("1", ClipKind::AV, "/m/a.mov").with_length(100), None)
            .expect("clip");
        p.timeline.add_track(1, TrackKind::Video).expect("v1");
        p.timeline.add_track(2, TrackKind::Audio).expect("a1");
        p.timeline
            .insert_clip(1, 0, "1", ClipState::VideoOnly, InsertMode::Normal)
            .expect("video");
        p.timeline
            .insert_clip(2, 0, "1", ClipState::AudioOnly, InsertMode::Normal)
            .expect("audio");
        p
    }

    #[test]
    fn test_producers_include_instances() {
        let root = write_project(&project());
        let ids: Vec<_> = root.children_named("producer").filter_map(|p| p.attr("id")).collect();
        assert_eq!(ids, vec!["black", "1", "1_1_video", "1_2_audio"]);
        let video = root.children_named("producer").find(|p| p.attr("id") == Some("1_1_video")).expect("video");
        assert_eq!(video.property(P_AUDIO_INDEX), Some("-1"));
        assert_eq!(video.property(P_CLIP_ID), Some("1"));
    }

    #[test]
    fn test_tractor_layout() {
        let root = write_project(&project());
        let tractor = root.child("tractor").expect("tractor");
        let tracks: Vec<_> = tractor.children_named("track").map(|t| (t.attr("producer"), t.attr("hide"))).collect();
        assert_eq!(
            tracks,
            vec![
                (Some("black_track"), None),
                (Some("playlist1"), None),
                (Some("playlist2"), Some("video"))
            ]
        );
        let mix = tractor.children_named("transition").find(|t| t.property(P_SERVICE) == Some("mix")).expect("mix");
        assert_eq!(mix.property(X_INTERNAL), Some("237"));
        assert_eq!(mix.property(X_B_TRACK), Some("2"));
        assert_eq!(tractor.attr_i32("out"), Some(99));

        let audio = root.children_named("playlist").find(|p| p.attr("id") == Some("playlist2")).expect("a1");
        assert_eq!(audio.property(T_AUDIO), Some("1"));
        assert_eq!(audio.child("entry").and_then(|e| e.attr("producer")), Some("1_2_audio"));
    }

    #[test]
    fn test_guides_in_seconds() {
        let mut p = project();
        p.add_guide(50, "half");
        let root = write_project(&p);
        let guide = root
            .child("kdenlivedoc")
            .and_then(|d| d.child("guides"))
            .and_then(|g| g.child("guide"))
            .expect("guide");
        assert_eq!(guide.attr("time"), Some("2"));
        assert_eq!(guide.attr("comment"), Some("half"));
    }
}

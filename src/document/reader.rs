//! Document tree to project.
//!
//! The tree is expected to be upgraded and, for user documents, validated.
//! Structural problems that survive (unknown producers, tracks the tractor
//! does not list, broken invariants) reject the whole document.

use log::{debug, trace, warn};
use std::collections::HashMap;
use std::path::PathBuf;

use super::project::Project;
use super::xml::Element;
use super::DOCUMENT_VERSION;
use crate::core::event_bus::Notifier;
use crate::entities::effects::realize::{self, FilterInstance};
use crate::entities::keys::*;
use crate::entities::track::{HIDE_AUDIO, HIDE_VIDEO};
use crate::entities::{
    Bin, ClipGroup, Cut, EffectChain, Entry, GroupItem, Guide, Playlist, ProducerId, ProducerInstance, Profile,
    Properties, SourceClip, Track, TrackKind, TrackTargets, Transition,
};
use crate::error::{TimelineError, TimelineResult};
use crate::timeline::registry::producer_props;
use crate::timeline::{ProducerRegistry, TimelineModel, TransitionHandler};

/// Playlist properties the reader turns into track fields.
const TRACK_KEYS: &[&str] = &[T_NAME, T_AUDIO, T_LOCKED, T_COMPOSITE];

/// Profile of a document: the `<profile>` element, else the named built-in,
/// else `fallback`; root attributes override fps and size.
pub fn read_profile(root: &Element, fallback: &Profile) -> Profile {
    if let Some(el) = root.child("profile") {
        let num = |k: &str| el.attr(k).and_then(|v| v.trim().parse::<u32>().ok());
        if let (Some(width), Some(height), Some(fps_num), Some(fps_den)) =
            (num("width"), num("height"), num("frame_rate_num"), num("frame_rate_den"))
        {
            return Profile {
                name: el.attr("name").or_else(|| root.attr("profile")).unwrap_or("custom").to_string(),
                width,
                height,
                fps_num,
                fps_den: fps_den.max(1),
                dar_num: num("display_aspect_num").unwrap_or(width),
                dar_den: num("display_aspect_den").unwrap_or(height).max(1),
            };
        }
    }
    let base = root.attr("profile").and_then(Profile::by_name).unwrap_or_else(|| {
        debug!("Unknown profile {:?}, using {}", root.attr("profile"), fallback.name);
        fallback.clone()
    });
    base.with_overrides(
        root.attr_f64("fps"),
        root.attr_i32("width").map(|w| w.max(0) as u32),
        root.attr_i32("height").map(|h| h.max(0) as u32),
        root.attr_f64("dar"),
    )
}

/// Effect chain from the `<filter>` children of `el`.
pub(crate) fn read_filters(el: &Element) -> EffectChain {
    let filters: Vec<FilterInstance> = el
        .children_named("filter")
        .map(|f| {
            let mut props = f.properties();
            let service = props
                .remove(P_SERVICE)
                .or_else(|| f.attr(P_SERVICE).map(str::to_string))
                .unwrap_or_default();
            FilterInstance { service, props }
        })
        .collect();
    EffectChain::from_effects(realize::collapse(&filters))
}

pub fn read_project(root: &Element, fallback: &Profile, notifier: Notifier) -> TimelineResult<Project> {
    if root.name != "mlt" {
        return Err(TimelineError::document(format!("root element is <{}>", root.name)));
    }
    let profile = read_profile(root, fallback);
    let doc = root.child("kdenlivedoc");

    let mut bin = Bin::new();
    if let Some(folders) = doc.and_then(|d| d.child("folders")) {
        for folder in folders.children_named("folder") {
            let Some(id) = folder.attr("id") else {
                continue;
            };
            bin.insert_folder(
                id.to_string(),
                folder.attr("name").unwrap_or(id),
                folder.attr("parent").map(str::to_string),
            );
        }
    }

    let registry = read_producers(root, &mut bin, notifier.clone())?;

    if let Some(subclips) = doc.and_then(|d| d.child("subclips")) {
        for sub in subclips.children_named("subclip") {
            if let (Some(clip), Some(in_frame), Some(out_frame)) = (sub.attr("clip"), sub.attr_i32("in"), sub.attr_i32("out")) {
                bin.add_subclip(clip, sub.attr("name").unwrap_or(""), in_frame, out_frame);
            }
        }
    }

    let tractor = root
        .child("tractor")
        .ok_or_else(|| TimelineError::document("no <tractor>"))?;
    let playlists: HashMap<&str, &Element> = root
        .children_named("playlist")
        .filter_map(|p| p.attr("id").map(|id| (id, p)))
        .collect();

    let mut tracks = Vec::new();
    for (index, track_el) in tractor.children_named("track").enumerate() {
        let id = track_el
            .attr("producer")
            .ok_or_else(|| TimelineError::document(format!("tractor track {} without producer", index)))?;
        let playlist = playlists
            .get(id)
            .ok_or_else(|| TimelineError::document(format!("unknown playlist {}", id)))?;
        tracks.push(read_track(index, track_el, playlist, &registry)?);
    }
    if tracks.is_empty() {
        return Err(TimelineError::document("tractor lists no tracks"));
    }

    let mut transitions = TransitionHandler::new();
    for el in tractor.children_named("transition") {
        let props = el.properties();
        let service = props
            .get(P_SERVICE)
            .or_else(|| el.attr(P_SERVICE))
            .ok_or_else(|| TimelineError::document("transition without service"))?
            .to_string();
        let in_frame = el.attr_i32("in").or_else(|| props.get_i32("in")).unwrap_or(0);
        let out_frame = el.attr_i32("out").or_else(|| props.get_i32("out")).unwrap_or(0);
        transitions.insert_loaded(Transition::from_stored(&service, in_frame, out_frame, &props));
    }

    let groups = doc.map(read_groups).unwrap_or_default();
    let targets = doc
        .and_then(|d| d.child("targets"))
        .map(|t| TrackTargets {
            video: t.attr_i32("video").map(|v| v.max(0) as usize),
            audio: t.attr_i32("audio").map(|v| v.max(0) as usize),
        })
        .unwrap_or_default();
    let still_frames = doc
        .and_then(|d| d.attr_i32("still_length"))
        .filter(|f| *f > 0)
        .unwrap_or_else(|| (5.0 * profile.fps()).round() as i32);

    let guides = doc
        .and_then(|d| d.child("guides"))
        .map(|g| {
            g.children_named("guide")
                .filter_map(|el| {
                    let seconds = el.attr_f64("time")?;
                    Some(Guide {
                        frame: profile.seconds_to_frames(seconds),
                        comment: el.attr("comment").unwrap_or("").to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let properties = doc
        .and_then(|d| d.child("documentproperties"))
        .map(Element::properties)
        .unwrap_or_default();
    let custom_effects = doc
        .and_then(|d| d.child("customeffects"))
        .map(read_filters)
        .unwrap_or_default();
    let overlay = doc.and_then(|d| d.child("overlay")).and_then(|o| o.attr("clip"));
    let version = doc.and_then(|d| d.attr_f64("version")).unwrap_or(DOCUMENT_VERSION);

    let mut timeline = TimelineModel::from_parts(
        profile,
        tracks,
        registry,
        transitions,
        groups,
        targets,
        still_frames,
        notifier,
    )?;
    if let Some(clip) = overlay {
        timeline.set_overlay(Some(clip))?;
    }

    let mut project = Project::with_timeline(timeline);
    project.bin = bin;
    project.guides = guides;
    project.properties = properties;
    project.custom_effects = custom_effects;
    project.root = root.attr("root_path").map(PathBuf::from).unwrap_or_default();
    project.modified = root.attr("modified") == Some("1");
    project.upgraded = root.attr("upgraded") == Some("1");
    project.version = version;
    Ok(project)
}

/// Masters first, then instances (which need their master).
fn read_producers(root: &Element, bin: &mut Bin, notifier: Notifier) -> TimelineResult<ProducerRegistry> {
    let mut registry = ProducerRegistry::new(notifier);
    let mut instances = Vec::new();
    for el in root.children_named("producer") {
        let id = el
            .attr("id")
            .ok_or_else(|| TimelineError::document("producer without id"))?;
        if id == BLACK_ID {
            continue;
        }
        let mut props = producer_props(el);
        match props.get(P_CLIP_ID).filter(|parent| *parent != id) {
            Some(parent) => instances.push((id, parent.to_string(), props)),
            None => {
                let folder = props.remove(P_FOLDER).filter(|f| !f.is_empty() && f != "-1");
                registry.add_clip(SourceClip::from_props(id, props))?;
                bin.add_clip(id.to_string(), folder);
            }
        }
    }
    for (id, parent, props) in instances {
        if !registry.contains_clip(&parent) {
            return Err(TimelineError::document(format!("producer {} of unknown clip {}", id, parent)));
        }
        let parsed = ProducerId::parse_with_parent(id, &parent)
            .ok_or_else(|| TimelineError::document(format!("producer id {} does not match clip {}", id, parent)))?;
        trace!("Instance {} of {}", id, parent);
        registry.insert_instance(ProducerInstance::from_props(&parsed, props));
    }
    Ok(registry)
}

fn read_track(index: usize, track_el: &Element, playlist: &Element, registry: &ProducerRegistry) -> TimelineResult<Track> {
    if index == 0 {
        return Ok(Track::background(0));
    }
    let props = playlist.properties();
    let kind = if props.get_bool_or(T_AUDIO, false) {
        TrackKind::Audio
    } else {
        TrackKind::Video
    };
    let mut track = Track::new(kind, props.get(T_NAME).unwrap_or(""));
    track.locked = props.get_bool_or(T_LOCKED, false);
    track.composite = props.get_bool_or(T_COMPOSITE, true);
    track.hide = match track_el.attr("hide") {
        Some("both") => HIDE_VIDEO | HIDE_AUDIO,
        Some("video") => HIDE_VIDEO,
        Some("audio") => HIDE_AUDIO,
        _ => 0,
    };
    if track.is_audio() {
        track.hide |= HIDE_VIDEO;
    }
    track.props = props.iter().filter(|(k, _)| !TRACK_KEYS.contains(k)).collect::<Properties>();
    track.effects = read_filters(playlist);

    let mut entries = Vec::new();
    for child in &playlist.children {
        match child.name.as_str() {
            "blank" => {
                let len = child.attr_i32("length").unwrap_or(0);
                if len > 0 {
                    entries.push(Entry::Blank(len));
                }
            }
            "entry" => entries.push(Entry::Cut(read_cut(index, child, registry)?)),
            _ => {}
        }
    }
    track.playlist = Playlist::from_entries(entries);
    Ok(track)
}

fn read_cut(track: usize, el: &Element, registry: &ProducerRegistry) -> TimelineResult<Cut> {
    let producer = el
        .attr("producer")
        .ok_or_else(|| TimelineError::document(format!("entry without producer on track {}", track)))?;
    let clip_id = match registry.instance(producer) {
        Some(instance) => instance.clip_id.clone(),
        None if registry.contains_clip(producer) => {
            warn!("Track {} uses master producer {} directly", track, producer);
            producer.to_string()
        }
        None => {
            return Err(TimelineError::document(format!("unknown producer {} on track {}", producer, track)));
        }
    };
    let in_frame = el.attr_i32("in").unwrap_or(0);
    let out_frame = el
        .attr_i32("out")
        .ok_or_else(|| TimelineError::document(format!("entry of {} without out point", producer)))?;
    let mut cut = Cut::new(producer, clip_id, in_frame, out_frame);
    cut.props = el.properties();
    cut.effects = read_filters(el);
    Ok(cut)
}

fn read_groups(doc: &Element) -> Vec<ClipGroup> {
    let Some(groups) = doc.child("groups") else {
        return Vec::new();
    };
    groups
        .children_named("group")
        .map(|g| {
            ClipGroup::new(
                g.children_named("item")
                    .filter_map(|item| {
                        let track = item.attr_i32("track")?.max(0) as usize;
                        let start = item.attr_i32("start")?;
                        match item.attr("type") {
                            Some("transition") => Some(GroupItem::Transition { track, start }),
                            _ => Some(GroupItem::Clip { track, start }),
                        }
                    })
                    .collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ClipKind, ClipState, Effect};
    use crate::timeline::{EffectHost, InsertMode};

    fn reload(project: &Project) -> Project {
        let text = project.to_document().expect("write");
        let root = Element::parse(&text).expect("parse");
        read_project(&root, &Profile::default(), Notifier::silent()).expect("read")
    }

    fn clip(id: &str, len: i32) -> SourceClip {
        SourceClip::new(id, ClipKind::AV, format!("/media/{}.mov", id)).with_length(len)
    }

    #[test]
    fn test_round_trip_after_edits() {
        let mut p = Project::new(Profile::by_name("atsc_1080p_2997").expect("profile"), Notifier::silent());
        let footage = p.bin.add_folder("Footage", None);
        p.add_clip(clip("1", 100), Some(&footage)).expect("c1");
        p.add_clip(clip("2", 50), None).expect("c2");
        p.add_clip(SourceClip::new("3", ClipKind::Color, "0xff0000ff"), None).expect("c3");
        p.bin.add_subclip("1", "intro", 0, 24);

        let t = &mut p.timeline;
        t.add_track(1, TrackKind::Video).expect("v1");
        t.add_track(2, TrackKind::Video).expect("v2");
        t.add_track(3, TrackKind::Audio).expect("a1");
        t.insert_clip(1, 0, "1", ClipState::Original, InsertMode::Normal).expect("a");
        t.insert_clip(1, 40, "2", ClipState::Original, InsertMode::Overwrite).expect("b");
        t.insert_clip(2, 200, "3", ClipState::Original, InsertMode::Normal).expect("color");
        t.split_audio(1, 0, 3).expect("split audio");
        t.change_speed(1, 90, 0.5, 1).expect("slow");
        t.add_transition(Transition::new("luma", 1, 2, 200, 230)).expect("luma");
        t.add_effect(EffectHost::Clip { track: 1, start: 0 }, "brightness").expect("fx");
        t.add_effect(EffectHost::Track(3), "volume").expect("volume");
        t.set_composite(2, false).expect("composite");
        t.set_locked(2, true).expect("lock");
        t.set_track_state(1, HIDE_AUDIO).expect("hide");
        p.add_guide(30, "beat");
        p.properties.set("proxyminsize", "1000");
        p.add_custom_effect(Effect::raw("my_blur", "boxblur"));

        let loaded = reload(&p);
        assert!(loaded.timeline.content_eq(&p.timeline));
        assert_eq!(loaded.timeline.profile(), p.timeline.profile());
        assert_eq!(loaded.guides, p.guides);
        assert_eq!(loaded.properties.get("proxyminsize"), Some("1000"));
        assert_eq!(loaded.bin.folder_of("1"), Some(footage.as_str()));
        assert_eq!(loaded.bin.subclips_of("1").collect::<Vec<_>>(), vec![("intro", 0, 24)]);
        assert_eq!(loaded.custom_effects.get(1).map(|e| e.id.as_str()), Some("my_blur"));
        assert!(loaded.timeline.check_invariants().is_ok());
    }

    #[test]
    fn test_slowmotion_reload() {
        let mut p = Project::new(Profile::default(), Notifier::silent());
        p.add_clip(clip("c1", 100), None).expect("clip");
        p.timeline.add_track(1, TrackKind::Video).expect("v1");
        p.timeline
            .insert_clip(1, 0, "c1", ClipState::Original, InsertMode::Normal)
            .expect("cut");
        let id = p.timeline.change_speed(1, 0, 0.5, 1).expect("speed");
        assert_eq!(id, "slowmotion:c1:0.5:1:0");

        let loaded = reload(&p);
        let cut = loaded.timeline.cut(1, 0).expect("cut");
        assert_eq!(cut.length(), 200);
        assert_eq!(cut.producer, "slowmotion:c1:0.5:1:0");
        assert_eq!(loaded.timeline.registry().clips().filter(|c| c.id == "c1").count(), 1);
        assert_eq!(loaded.timeline.registry().instances().count(), 1);
    }

    #[test]
    fn test_keyframe_effect_window_reload() {
        let mut p = Project::new(Profile::default(), Notifier::silent());
        p.add_clip(clip("c1", 100), None).expect("clip");
        p.timeline.add_track(1, TrackKind::Video).expect("v1");
        p.timeline
            .insert_clip(1, 0, "c1", ClipState::Original, InsertMode::Normal)
            .expect("cut");
        let host = EffectHost::Clip { track: 1, start: 0 };
        let index = p.timeline.add_effect(host, "volume").expect("volume");
        p.timeline.set_effect_window(host, index, 10, 60, true).expect("window");

        let loaded = reload(&p);
        let fx = loaded.timeline.cut(1, 0).and_then(|c| c.effects.get(index)).expect("fx");
        assert_eq!(fx.window, Some((10, 60)));
        assert!(fx.sync_in_out);
        assert!(loaded.timeline.content_eq(&p.timeline));
    }

    #[test]
    fn test_unknown_effect_round_trips() {
        let mut p = Project::new(Profile::default(), Notifier::silent());
        p.add_clip(clip("c1", 100), None).expect("clip");
        p.timeline.add_track(1, TrackKind::Video).expect("v1");
        p.timeline
            .insert_clip(1, 0, "c1", ClipState::Original, InsertMode::Normal)
            .expect("cut");
        let mut fx = Effect::raw("frei0r.glow", "frei0r.glow");
        fx.params.set("blur", "0.42");
        p.timeline.insert_effect(EffectHost::Clip { track: 1, start: 0 }, fx).expect("fx");

        let loaded = reload(&p);
        let fx = loaded.timeline.cut(1, 0).and_then(|c| c.effects.get(1)).expect("fx");
        assert_eq!(fx.tag, "frei0r.glow");
        assert_eq!(fx.param("blur"), Some("0.42"));
    }

    #[test]
    fn test_profile_fallback_and_overrides() {
        let root = Element::parse(r#"<mlt profile="mystery" fps="50" width="1280" height="720"/>"#).expect("parse");
        let profile = read_profile(&root, &Profile::default());
        assert_eq!(profile.fps(), 50.0);
        assert_eq!((profile.width, profile.height), (1280, 720));

        let root = Element::parse(r#"<mlt profile="dv_ntsc"/>"#).expect("parse");
        assert_eq!(read_profile(&root, &Profile::default()).fps_den, 1001);
    }

    #[test]
    fn test_rejects_broken_structure() {
        let bad = [
            r#"<notmlt/>"#,
            r#"<mlt/>"#,
            r#"<mlt><tractor><track producer="nowhere"/></tractor></mlt>"#,
            r#"<mlt><playlist id="black_track"/><playlist id="p1"><entry producer="ghost" in="0" out="9"/></playlist>
               <tractor><track producer="black_track"/><track producer="p1"/></tractor></mlt>"#,
        ];
        for text in bad {
            let root = Element::parse(text).expect("parse");
            let err = read_project(&root, &Profile::default(), Notifier::silent()).expect_err(text);
            assert_eq!(err.code(), "INVALID_DOCUMENT");
        }
    }

    #[test]
    fn test_invariant_violation_rejects_document() {
        let text = r#"<mlt>
            <producer id="c1"><property name="resource">/m/a.mov</property><property name="length">100</property></producer>
            <producer id="c1_1"><property name="resource">/m/a.mov</property><property name="kdenlive:id">c1</property></producer>
            <playlist id="black_track"/>
            <playlist id="p1"><entry producer="c1_1" in="0" out="49"/></playlist>
            <tractor>
              <track producer="black_track"/><track producer="p1"/>
              <transition in="10" out="5"><property name="mlt_service">luma</property>
                <property name="a_track">0</property><property name="b_track">1</property></transition>
            </tractor></mlt>"#;
        let root = Element::parse(text).expect("parse");
        let err = read_project(&root, &Profile::default(), Notifier::silent()).expect_err("bad transition");
        assert_eq!(err.code(), "INVALID_DOCUMENT");
    }
}

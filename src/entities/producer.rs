//! Producer instances and their identifiers.
//!
//! The backend cannot mix the audio of one producer with itself on two tracks,
//! so every (clip, track, state) gets its own realized copy. Identifiers:
//!
//! | Variant      | Format                                         |
//! |--------------|------------------------------------------------|
//! | master       | `<clip_id>`                                    |
//! | track        | `<clip_id>_<track>` / `_audio` / `_video`      |
//! | slowmotion   | `slowmotion:<clip_id>:<speed>:<strobe>:<state>`|

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use super::attrs::{format_number, Properties};
use super::clip::{ClipState, SourceClip};
use super::keys::*;

static SLOWMO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^slowmotion:(.+):(-?[0-9]+(?:\.[0-9]+)?):([0-9]+):([0-9]+)$").expect("slowmotion regex")
});
static TRACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)_([0-9]+)(_audio|_video)?$").expect("track regex"));
static TRACK_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)(_audio|_video)?$").expect("track tail regex"));

/// Parsed producer identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerId {
    Master(String),
    Track {
        clip: String,
        track: usize,
        state: ClipState,
    },
    Slowmotion {
        clip: String,
        speed: f64,
        strobe: i32,
        state: ClipState,
    },
}

impl ProducerId {
    pub fn track(clip: impl Into<String>, track: usize, state: ClipState) -> Self {
        ProducerId::Track {
            clip: clip.into(),
            track,
            state,
        }
    }

    pub fn slowmotion(clip: impl Into<String>, speed: f64, strobe: i32, state: ClipState) -> Self {
        ProducerId::Slowmotion {
            clip: clip.into(),
            speed,
            strobe,
            state,
        }
    }

    /// Parse an id without knowing its parent clip. `name_3` reads as
    /// track 3 of clip `name`; use [`ProducerId::parse_with_parent`] when the
    /// parent is known.
    pub fn parse(id: &str) -> Self {
        if let Some(slow) = parse_slowmotion(id) {
            return slow;
        }
        if let Some(caps) = TRACK_RE.captures(id) {
            if let Ok(track) = caps[2].parse::<usize>() {
                return ProducerId::Track {
                    clip: caps[1].to_string(),
                    track,
                    state: state_from_suffix(caps.get(3).map(|m| m.as_str())),
                };
            }
        }
        ProducerId::Master(id.to_string())
    }

    /// Parse an id whose parent clip id is known (from `kdenlive:id`).
    /// Returns None when the id does not derive from `parent`.
    pub fn parse_with_parent(id: &str, parent: &str) -> Option<Self> {
        if id == parent {
            return Some(ProducerId::Master(id.to_string()));
        }
        if let Some(slow) = parse_slowmotion(id) {
            return (slow.clip_id() == parent).then_some(slow);
        }
        let tail = id.strip_prefix(parent)?.strip_prefix('_')?;
        let caps = TRACK_TAIL_RE.captures(tail)?;
        Some(ProducerId::Track {
            clip: parent.to_string(),
            track: caps[1].parse().ok()?,
            state: state_from_suffix(caps.get(2).map(|m| m.as_str())),
        })
    }

    pub fn clip_id(&self) -> &str {
        match self {
            ProducerId::Master(clip) => clip,
            ProducerId::Track { clip, .. } => clip,
            ProducerId::Slowmotion { clip, .. } => clip,
        }
    }

    pub fn track_index(&self) -> Option<usize> {
        match self {
            ProducerId::Track { track, .. } => Some(*track),
            _ => None,
        }
    }

    pub fn state(&self) -> ClipState {
        match self {
            ProducerId::Master(_) => ClipState::Original,
            ProducerId::Track { state, .. } => *state,
            ProducerId::Slowmotion { state, .. } => *state,
        }
    }

    pub fn is_slowmotion(&self) -> bool {
        matches!(self, ProducerId::Slowmotion { .. })
    }

    /// Same id moved to another track. Non-track ids are returned unchanged.
    pub fn on_track(&self, new_track: usize) -> Self {
        match self {
            ProducerId::Track { clip, state, .. } => ProducerId::Track {
                clip: clip.clone(),
                track: new_track,
                state: *state,
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProducerId::Master(clip) => write!(f, "{}", clip),
            ProducerId::Track { clip, track, state } => {
                write!(f, "{}_{}{}", clip, track, state.suffix())
            }
            ProducerId::Slowmotion {
                clip,
                speed,
                strobe,
                state,
            } => write!(
                f,
                "slowmotion:{}:{}:{}:{}",
                clip,
                format_number(*speed),
                strobe,
                state.code()
            ),
        }
    }
}

fn parse_slowmotion(id: &str) -> Option<ProducerId> {
    let caps = SLOWMO_RE.captures(id)?;
    Some(ProducerId::Slowmotion {
        clip: caps[1].to_string(),
        speed: caps[2].parse().ok()?,
        strobe: caps[3].parse().ok()?,
        state: ClipState::from_code(caps[4].parse().ok()?)?,
    })
}

fn state_from_suffix(suffix: Option<&str>) -> ClipState {
    match suffix {
        Some("_audio") => ClipState::AudioOnly,
        Some("_video") => ClipState::VideoOnly,
        _ => ClipState::Original,
    }
}

/// Realized copy of a source clip usable by one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerInstance {
    pub id: String,
    pub clip_id: String,
    pub state: ClipState,
    /// Track the instance belongs to, None for slowmotion instances
    pub track: Option<usize>,
    pub speed: f64,
    pub strobe: i32,
    pub props: Properties,
}

impl ProducerInstance {
    /// Clone `master` for `id`, copying only the pass-through properties.
    pub fn from_master(master: &SourceClip, id: &ProducerId) -> Self {
        let mut props = Properties::new();
        props.set(P_RESOURCE, master.resource());
        props.set(P_SERVICE, master.service());
        props.set(P_CLIP_ID, master.id.clone());
        props.inherit(&master.props, &[P_LENGTH]);
        props.inherit(&master.props, PASS_THROUGH);

        let state = id.state();
        match state {
            ClipState::AudioOnly => props.set_i32(P_VIDEO_INDEX, -1),
            ClipState::VideoOnly => props.set_i32(P_AUDIO_INDEX, -1),
            ClipState::Original => {}
        }

        let (speed, strobe) = match id {
            ProducerId::Slowmotion { speed, strobe, .. } => {
                props.set(P_SERVICE, "framebuffer");
                props.set(P_RESOURCE, format!("{}?{}", master.resource(), format_number(*speed)));
                props.set_f64(P_WARP_SPEED, *speed);
                props.set_i32(P_STROBE, *strobe);
                if let Some(len) = master.props.get_i32(P_LENGTH) {
                    props.set_i32(P_LENGTH, (len as f64 / speed.abs().max(1e-6)).round() as i32);
                }
                (*speed, *strobe)
            }
            _ => (1.0, 1),
        };

        Self {
            id: id.to_string(),
            clip_id: master.id.clone(),
            state,
            track: id.track_index(),
            speed,
            strobe,
            props,
        }
    }

    /// Rebuild an instance from stored document properties.
    pub fn from_props(id: &ProducerId, props: Properties) -> Self {
        let (speed, strobe) = match id {
            ProducerId::Slowmotion { speed, strobe, .. } => (*speed, *strobe),
            _ => (1.0, 1),
        };
        Self {
            id: id.to_string(),
            clip_id: id.clip_id().to_string(),
            state: id.state(),
            track: id.track_index(),
            speed,
            strobe,
            props,
        }
    }

    pub fn resource(&self) -> &str {
        self.props.get(P_RESOURCE).unwrap_or("")
    }

    pub fn parsed_id(&self) -> ProducerId {
        ProducerId::parse_with_parent(&self.id, &self.clip_id).unwrap_or_else(|| ProducerId::parse(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::clip::ClipKind;

    #[test]
    fn test_format_ids() {
        assert_eq!(ProducerId::track("c1", 2, ClipState::Original).to_string(), "c1_2");
        assert_eq!(ProducerId::track("c_av", 1, ClipState::VideoOnly).to_string(), "c_av_1_video");
        assert_eq!(
            ProducerId::slowmotion("c1", 0.5, 1, ClipState::Original).to_string(),
            "slowmotion:c1:0.5:1:0"
        );
        assert_eq!(
            ProducerId::slowmotion("c1", 2.0, 1, ClipState::AudioOnly).to_string(),
            "slowmotion:c1:2:1:2"
        );
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(ProducerId::parse("c1"), ProducerId::Master("c1".into()));
        assert_eq!(ProducerId::parse("c_av_3_audio"), ProducerId::track("c_av", 3, ClipState::AudioOnly));
        assert_eq!(
            ProducerId::parse("slowmotion:c:1:0.25:0:1"),
            ProducerId::slowmotion("c:1", 0.25, 0, ClipState::VideoOnly)
        );
    }

    #[test]
    fn test_parse_with_parent_disambiguates() {
        // "clip_2" is a master when its kdenlive:id says so
        assert_eq!(
            ProducerId::parse_with_parent("clip_2", "clip_2"),
            Some(ProducerId::Master("clip_2".into()))
        );
        assert_eq!(
            ProducerId::parse_with_parent("clip_2_4_video", "clip_2"),
            Some(ProducerId::track("clip_2", 4, ClipState::VideoOnly))
        );
        assert_eq!(ProducerId::parse_with_parent("other_1", "clip_2"), None);
    }

    #[test]
    fn test_instance_copies_pass_through_only() {
        let mut master = SourceClip::new("c1", ClipKind::AV, "/m/a.mov").with_length(100);
        master.props.set("force_fps", "25");
        master.props.set("set.force_full_luma", "1");
        master.props.set("kdenlive:custom", "x");

        let inst = ProducerInstance::from_master(&master, &ProducerId::track("c1", 1, ClipState::AudioOnly));
        assert_eq!(inst.id, "c1_1_audio");
        assert_eq!(inst.props.get("force_fps"), Some("25"));
        assert_eq!(inst.props.get("set.force_full_luma"), Some("1"));
        assert_eq!(inst.props.get_i32(P_VIDEO_INDEX), Some(-1));
        assert!(!inst.props.contains("kdenlive:custom"));
    }

    #[test]
    fn test_slowmotion_instance() {
        let master = SourceClip::new("c1", ClipKind::AV, "/m/a.mov").with_length(100);
        let inst = ProducerInstance::from_master(&master, &ProducerId::slowmotion("c1", 0.5, 1, ClipState::Original));
        assert_eq!(inst.props.get(P_SERVICE), Some("framebuffer"));
        assert_eq!(inst.resource(), "/m/a.mov?0.5");
        assert_eq!(inst.props.get_i32(P_LENGTH), Some(200));
        assert_eq!(inst.track, None);
    }
}

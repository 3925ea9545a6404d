//! Track: one playlist plus its display and compositing state.
//!
//! Index 0 is the background track holding the `black` producer; higher
//! indices stack on top. Hide bits: 1 hides video, 2 hides audio.

use serde::{Deserialize, Serialize};

use super::attrs::Properties;
use super::effects::EffectChain;
use super::keys::*;
use super::playlist::{Cut, Entry, Playlist};

pub const HIDE_VIDEO: u8 = 0b01;
pub const HIDE_AUDIO: u8 = 0b10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub kind: TrackKind,
    pub name: String,
    /// Bit 0 hides video, bit 1 hides audio
    pub hide: u8,
    pub locked: bool,
    /// Auto composite onto the tracks below
    pub composite: bool,
    pub effects: EffectChain,
    pub playlist: Playlist,
    /// Unrecognized playlist properties, written back as read
    pub props: Properties,
}

impl Track {
    pub fn new(kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            hide: match kind {
                TrackKind::Video => 0,
                // audio tracks never show video
                TrackKind::Audio => HIDE_VIDEO,
            },
            locked: false,
            composite: true,
            effects: EffectChain::default(),
            playlist: Playlist::new(),
            props: Properties::new(),
        }
    }

    /// Background track: one cut of the black producer.
    pub fn background(duration: i32) -> Self {
        let mut track = Self::new(TrackKind::Video, "Black");
        track.composite = false;
        track.set_background_length(duration);
        track
    }

    /// Resize the black cut to `duration` frames (at least one).
    pub fn set_background_length(&mut self, duration: i32) {
        let cut = Cut::new(BLACK_ID, BLACK_ID, 0, duration.max(1) - 1);
        self.playlist = Playlist::from_entries(vec![Entry::Cut(cut)]);
    }

    pub fn is_audio(&self) -> bool {
        self.kind == TrackKind::Audio
    }

    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }

    pub fn is_video_hidden(&self) -> bool {
        self.hide & HIDE_VIDEO != 0
    }

    pub fn is_audio_hidden(&self) -> bool {
        self.hide & HIDE_AUDIO != 0
    }

    pub fn duration(&self) -> i32 {
        self.playlist.duration()
    }

    /// Track carries audio: audio kind, or a live cut whose clip has audio.
    pub fn has_audio(&self, clip_has_audio: impl Fn(&str) -> bool) -> bool {
        self.is_audio() || self.playlist.cuts().any(|(_, cut)| clip_has_audio(&cut.clip_id))
    }

    /// Every clip id referenced by a cut.
    pub fn clip_ids(&self) -> impl Iterator<Item = &str> {
        self.playlist.cuts().map(|(_, c)| c.clip_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hide_bits() {
        let mut t = Track::new(TrackKind::Video, "V1");
        assert!(!t.is_video_hidden());
        t.hide = HIDE_VIDEO | HIDE_AUDIO;
        assert!(t.is_video_hidden() && t.is_audio_hidden());
        assert!(Track::new(TrackKind::Audio, "A1").is_video_hidden());
    }

    #[test]
    fn test_background_length() {
        let mut bg = Track::background(0);
        assert_eq!(bg.duration(), 1);
        bg.set_background_length(250);
        assert_eq!(bg.duration(), 250);
        assert_eq!(bg.clip_ids().collect::<Vec<_>>(), vec![BLACK_ID]);
    }

    #[test]
    fn test_has_audio_predicate() {
        let mut v = Track::new(TrackKind::Video, "V1");
        assert!(!v.has_audio(|_| true));
        v.playlist.place(0, Cut::new("c1_1", "c1", 0, 9));
        assert!(v.has_audio(|id| id == "c1"));
        assert!(!v.has_audio(|_| false));
        assert!(Track::new(TrackKind::Audio, "A1").has_audio(|_| false));
    }
}

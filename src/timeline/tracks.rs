//! Track edits: add, remove, rename, hide, composite and lock.
//!
//! Inserting or removing a track renumbers everything that names tracks by
//! index: producer instance ids (and the cuts using them), transition
//! `a_track`/`b_track`, clip groups and the target-track hints.

use log::debug;

use super::model::TimelineModel;
use crate::entities::track::{HIDE_AUDIO, HIDE_VIDEO};
use crate::entities::{Entry, Track, TrackKind, TrackTargets};
use crate::error::{TimelineError, TimelineResult};

impl TimelineModel {
    /// Renumber track references. `map(old) == None` drops the track.
    fn remap_tracks(&mut self, map: impl Fn(usize) -> Option<usize>) {
        let renamed = self.registry.remap_tracks(&map);
        if !renamed.is_empty() {
            for track in &mut self.tracks {
                for index in 0..track.playlist.entries().len() {
                    if let Some(cut) = track.playlist.entry_mut(index).and_then(Entry::as_cut_mut) {
                        if let Some(new_id) = renamed.get(&cut.producer) {
                            cut.producer = new_id.clone();
                        }
                    }
                }
            }
        }
        for group in &mut self.groups {
            group.remap_tracks(&map);
        }
        self.targets.remap(&map);
    }

    fn default_track_name(&self, kind: TrackKind) -> String {
        let (prefix, count) = match kind {
            TrackKind::Video => ("V", self.tracks.iter().skip(1).filter(|t| t.is_video()).count()),
            TrackKind::Audio => ("A", self.tracks.iter().skip(1).filter(|t| t.is_audio()).count()),
        };
        format!("{}{}", prefix, count + 1)
    }

    /// Insert an empty track at `position` (1..=track_count) and return its
    /// index.
    pub fn add_track(&mut self, position: usize, kind: TrackKind) -> TimelineResult<usize> {
        self.apply("add track", |m| {
            if position == 0 || position > m.tracks.len() {
                return Err(TimelineError::OutOfRange(format!(
                    "track position {} (1..={})",
                    position,
                    m.tracks.len()
                )));
            }
            let name = m.default_track_name(kind);
            debug!("Add {:?} track {} at {}", kind, name, position);
            m.remap_tracks(|t| Some(if t >= position { t + 1 } else { t }));
            m.tracks.insert(position, Track::new(kind, name));
            m.transitions.on_track_inserted(position);
            m.ensure_auto_transitions();
            m.pending.tracks = true;
            m.pending.transitions = true;
            Ok(position)
        })
    }

    /// Remove a track with its cuts and every transition it overlays.
    pub fn remove_track(&mut self, index: usize) -> TimelineResult<Track> {
        self.apply("remove track", |m| {
            m.editable(index)?;
            let removed = m.tracks.remove(index);
            debug!("Remove track {} ({})", index, removed.name);
            m.remap_tracks(|t| match t {
                t if t == index => None,
                t if t > index => Some(t - 1),
                t => Some(t),
            });
            m.transitions.on_track_removed(index);
            m.ensure_auto_transitions();
            m.pending.tracks = true;
            m.pending.transitions = true;
            Ok(removed)
        })
    }

    pub fn rename_track(&mut self, index: usize, name: &str) -> TimelineResult<()> {
        self.apply("rename track", |m| {
            m.user_track(index)?;
            m.tracks[index].name = name.to_string();
            m.pending.tracks = true;
            Ok(())
        })
    }

    /// Set the hide bits (1 video, 2 audio). Audio tracks keep video hidden.
    pub fn set_track_state(&mut self, index: usize, hide: u8) -> TimelineResult<()> {
        self.apply("set track state", |m| {
            let audio = m.user_track(index)?.is_audio();
            let mut hide = hide & (HIDE_VIDEO | HIDE_AUDIO);
            if audio {
                hide |= HIDE_VIDEO;
            }
            debug!("Track {} hide {:#04b}", index, hide);
            m.tracks[index].hide = hide;
            if m.transitions.multitrack_enabled() {
                m.transitions.enable_multitrack(true, &m.tracks, m.duration);
            } else {
                m.transitions.rebuild_composites(&m.tracks);
            }
            let end = m.tracks[index].duration();
            m.touch(index, 0, end);
            m.pending.tracks = true;
            m.pending.transitions = true;
            Ok(())
        })
    }

    /// Turn the automatic composite of a video track on or off. Tracks above
    /// re-target onto whatever still composites below them.
    pub fn set_composite(&mut self, index: usize, on: bool) -> TimelineResult<()> {
        self.apply("set composite", |m| {
            if !m.user_track(index)?.is_video() {
                return Err(TimelineError::invalid(format!("track {} is not a video track", index)));
            }
            debug!("Track {} composite {}", index, on);
            m.tracks[index].composite = on;
            m.ensure_auto_transitions();
            m.pending.tracks = true;
            m.pending.transitions = true;
            Ok(())
        })
    }

    pub fn set_locked(&mut self, index: usize, locked: bool) -> TimelineResult<()> {
        self.apply("lock track", |m| {
            m.user_track(index)?;
            m.tracks[index].locked = locked;
            m.pending.tracks = true;
            Ok(())
        })
    }

    /// Remember the preferred insertion tracks.
    pub fn set_targets(&mut self, targets: TrackTargets) -> TimelineResult<()> {
        let check = |index: Option<usize>, audio: bool| match index {
            Some(i) if i == 0 || self.tracks.get(i).is_none_or(|t| t.is_audio() != audio) => Err(
                TimelineError::invalid(format!("track {} cannot be a target", i)),
            ),
            _ => Ok(()),
        };
        check(targets.video, false)?;
        check(targets.audio, true)?;
        self.targets = targets;
        Ok(())
    }
}

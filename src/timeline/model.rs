//! Timeline model: the track stack, its transitions and the published graph.
//!
//! Every mutating call runs through [`TimelineModel::apply`]. The state is
//! snapshotted, the edit runs, playlists are consolidated and the invariants
//! re-checked. A rejected edit or a broken invariant puts the snapshot back,
//! so observers only ever see complete edits. A successful edit publishes a
//! fresh [`TractorGraph`] and then notifies.
//!
//! Track 0 is the background and refuses edits. The project duration is the
//! longest track, or the end of the last user transition when that is later.

use log::{debug, error, trace};
use std::collections::HashSet;

use super::registry::ProducerRegistry;
use super::transitions::{lowest_video_track, TransitionHandler, TransitionMove};
use crate::core::event_bus::Notifier;
use crate::core::events::{DurationChanged, TimelineChanged, TracksChanged, TransitionsChanged};
use crate::engine::{Tractor, TractorGraph};
use crate::entities::keys::*;
use crate::entities::{
    ClipGroup, ClipState, Cut, GroupItem, ProducerId, Profile, Track, TrackKind, TrackTargets, Transition,
};
use crate::error::{TimelineError, TimelineResult};

/// How an incoming cut treats what is already on the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Fail with a collision unless the region is blank
    #[default]
    Normal,
    /// Clear the region first
    Overwrite,
    /// Shift everything from the insertion point right
    Insert,
}

/// Which end of a cut a resize moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Head,
    Tail,
}

/// Notifications collected during an edit, sent once it commits.
#[derive(Debug, Clone, Default)]
pub(super) struct Pending {
    pub ranges: Vec<TimelineChanged>,
    pub tracks: bool,
    pub transitions: bool,
}

#[derive(Debug, Clone)]
pub struct TimelineModel {
    profile: Profile,
    pub(super) tracks: Vec<Track>,
    pub(super) registry: ProducerRegistry,
    pub(super) transitions: TransitionHandler,
    pub(super) groups: Vec<ClipGroup>,
    pub(super) targets: TrackTargets,
    pub(super) overlay: Option<Cut>,
    pub(super) duration: i32,
    pub(super) still_frames: i32,
    tractor: Tractor,
    notifier: Notifier,
    pub(super) pending: Pending,
}

impl TimelineModel {
    /// Empty timeline: the background track only.
    pub fn new(profile: Profile, notifier: Notifier) -> Self {
        let still_frames = (5.0 * profile.fps()).round() as i32;
        let model = Self {
            profile,
            tracks: vec![Track::background(0)],
            registry: ProducerRegistry::new(notifier.clone()),
            transitions: TransitionHandler::new(),
            groups: Vec::new(),
            targets: TrackTargets::default(),
            overlay: None,
            duration: 0,
            still_frames,
            tractor: Tractor::new(),
            notifier,
            pending: Pending::default(),
        };
        model.publish();
        model
    }

    /// Assemble a model from loaded parts. Missing auto transitions are
    /// added; anything that still breaks the invariants rejects the document.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        profile: Profile,
        tracks: Vec<Track>,
        registry: ProducerRegistry,
        transitions: TransitionHandler,
        groups: Vec<ClipGroup>,
        targets: TrackTargets,
        still_frames: i32,
        notifier: Notifier,
    ) -> TimelineResult<Self> {
        if tracks.is_empty() {
            return Err(TimelineError::document("no background track"));
        }
        let mut model = Self {
            profile,
            tracks,
            registry,
            transitions,
            groups,
            targets,
            overlay: None,
            duration: 0,
            still_frames,
            tractor: Tractor::new(),
            notifier: notifier.clone(),
            pending: Pending::default(),
        };
        model.registry.set_notifier(notifier);
        model.settle();
        model.ensure_auto_transitions();
        model
            .check_invariants()
            .map_err(|msg| TimelineError::document(format!("timeline: {}", msg)))?;
        model.publish();
        debug!(
            "Timeline loaded: {} tracks, {} transitions, {} frames",
            model.tracks.len(),
            model.transitions.len(),
            model.duration
        );
        Ok(model)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Project duration in frames.
    pub fn duration(&self) -> i32 {
        self.duration
    }

    pub fn registry(&self) -> &ProducerRegistry {
        &self.registry
    }

    /// Bin-level access: adding clips and editing their properties.
    pub fn registry_mut(&mut self) -> &mut ProducerRegistry {
        &mut self.registry
    }

    pub fn transitions(&self) -> &TransitionHandler {
        &self.transitions
    }

    pub fn groups(&self) -> &[ClipGroup] {
        &self.groups
    }

    pub fn targets(&self) -> TrackTargets {
        self.targets
    }

    pub fn overlay(&self) -> Option<&Cut> {
        self.overlay.as_ref()
    }

    /// Handle on the published graph, shared with the renderer.
    pub fn tractor(&self) -> &Tractor {
        &self.tractor
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn still_frames(&self) -> i32 {
        self.still_frames
    }

    /// Length given to unbounded clips on insert.
    pub fn set_still_frames(&mut self, frames: i32) {
        self.still_frames = frames.max(1);
    }

    /// Cut starting exactly at `start` on `track`.
    pub fn cut(&self, track: usize, start: i32) -> Option<&Cut> {
        let playlist = &self.tracks.get(track)?.playlist;
        let index = playlist.cut_index_starting_at(start)?;
        playlist.entries()[index].as_cut()
    }

    /// Whether any cut on the timeline uses `clip_id`.
    pub fn uses_clip(&self, clip_id: &str) -> bool {
        self.tracks.iter().skip(1).any(|t| t.clip_ids().any(|c| c == clip_id))
            || self.overlay.as_ref().is_some_and(|o| o.clip_id == clip_id)
    }

    /// Same tracks, transitions, clips, instances, groups and duration.
    pub fn content_eq(&self, other: &Self) -> bool {
        self.profile == other.profile
            && self.tracks == other.tracks
            && self.transitions == other.transitions
            && self.registry == other.registry
            && self.groups == other.groups
            && self.targets == other.targets
            && self.overlay == other.overlay
            && self.duration == other.duration
    }

    /// Remove a clip from the bin. Refused while a cut still uses it.
    pub fn remove_clip(&mut self, clip_id: &str) -> TimelineResult<usize> {
        if self.uses_clip(clip_id) {
            return Err(TimelineError::invalid(format!("clip {} is used on the timeline", clip_id)));
        }
        self.registry.release(clip_id)
    }

    // ========================================================================
    // Edit plumbing
    // ========================================================================

    /// Run one edit atomically.
    pub(super) fn apply<R>(
        &mut self,
        what: &str,
        edit: impl FnOnce(&mut Self) -> TimelineResult<R>,
    ) -> TimelineResult<R> {
        let before = self.clone();
        let result = edit(self).and_then(|value| {
            self.settle();
            match self.check_invariants() {
                Ok(()) => Ok(value),
                Err(msg) => {
                    error!("{} broke the timeline, rolling back: {}", what, msg);
                    Err(TimelineError::invalid(format!("{} left the timeline inconsistent: {}", what, msg)))
                }
            }
        });
        match result {
            Ok(value) => {
                self.commit(before.duration);
                Ok(value)
            }
            Err(e) => {
                debug!("{} rejected ({}): {}", what, e.code(), e);
                *self = before;
                Err(e)
            }
        }
    }

    /// Consolidate playlists, recompute the duration and follow it with the
    /// background, the always-active transitions and the overlay.
    pub(super) fn settle(&mut self) {
        for track in self.tracks.iter_mut().skip(1) {
            track.playlist.consolidate_blanks();
        }
        self.duration = self.content_duration();
        if let Some(background) = self.tracks.first_mut() {
            background.set_background_length(self.duration);
        }
        self.transitions.respan(self.duration);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.out_frame = overlay.in_frame + self.duration.max(1) - 1;
        }
        self.prune_groups();

        let mut used: HashSet<String> = self
            .tracks
            .iter()
            .flat_map(|t| t.playlist.cuts().map(|(_, c)| c.producer.clone()))
            .collect();
        if let Some(overlay) = &self.overlay {
            used.insert(overlay.producer.clone());
        }
        self.registry.retain_instances(|id| used.contains(id));
    }

    fn content_duration(&self) -> i32 {
        let tracks = self.tracks.iter().skip(1).map(Track::duration).max().unwrap_or(0);
        let user = self
            .transitions
            .field()
            .iter()
            .filter(|t| !t.is_internal())
            .map(|t| t.out_frame + 1)
            .max()
            .unwrap_or(0);
        tracks.max(user)
    }

    fn prune_groups(&mut self) {
        let tracks = &self.tracks;
        let field = self.transitions.field();
        for group in &mut self.groups {
            group.members.retain(|m| match *m {
                GroupItem::Clip { track, start } => tracks
                    .get(track)
                    .is_some_and(|t| t.playlist.cut_index_starting_at(start).is_some()),
                GroupItem::Transition { track, start } => {
                    field.iter().any(|t| t.b_track == track && t.in_frame == start)
                }
            });
        }
        self.groups.retain(|g| g.members.len() >= 2);
    }

    fn commit(&mut self, previous_duration: i32) {
        self.publish();
        let pending = std::mem::take(&mut self.pending);
        for change in pending.ranges {
            self.notifier.emit(change);
        }
        if pending.tracks {
            self.notifier.emit(TracksChanged);
        }
        if pending.transitions {
            self.notifier.emit(TransitionsChanged);
        }
        if self.duration != previous_duration {
            self.notifier.emit(DurationChanged { frames: self.duration });
        }
    }

    pub(super) fn publish(&self) {
        self.tractor.publish(TractorGraph::build(
            &self.tracks,
            self.transitions.field(),
            self.overlay.as_ref(),
            self.duration,
        ));
    }

    pub(super) fn touch(&mut self, track: usize, start: i32, end: i32) {
        trace!("Touched track {} [{}, {})", track, start, end);
        self.pending.ranges.push(TimelineChanged { track, start, end });
    }

    /// Track that content edits may change.
    pub(super) fn editable(&self, track: usize) -> TimelineResult<&Track> {
        if track == 0 {
            return Err(TimelineError::invalid("the background track cannot be edited"));
        }
        let t = self
            .tracks
            .get(track)
            .ok_or_else(|| TimelineError::OutOfRange(format!("track {}", track)))?;
        if t.locked {
            return Err(TimelineError::Locked(track));
        }
        Ok(t)
    }

    /// Track whose settings may change (locked or not).
    pub(super) fn user_track(&self, track: usize) -> TimelineResult<&Track> {
        if track == 0 {
            return Err(TimelineError::invalid("the background track cannot be changed"));
        }
        self.tracks
            .get(track)
            .ok_or_else(|| TimelineError::OutOfRange(format!("track {}", track)))
    }

    /// Playlist index of the cut starting at `start`.
    pub(super) fn cut_index(&self, track: usize, start: i32) -> TimelineResult<usize> {
        self.tracks
            .get(track)
            .and_then(|t| t.playlist.cut_index_starting_at(start))
            .ok_or_else(|| TimelineError::invalid(format!("no clip at frame {} on track {}", start, track)))
    }

    /// Parsed producer of a cut.
    pub(super) fn producer_id(&self, cut: &Cut) -> ProducerId {
        match self.registry.instance(&cut.producer) {
            Some(instance) => instance.parsed_id(),
            None => ProducerId::parse_with_parent(&cut.producer, &cut.clip_id)
                .unwrap_or_else(|| ProducerId::parse(&cut.producer)),
        }
    }

    /// Last usable source frame of a cut's producer, None when unbounded.
    pub(super) fn max_out(&self, cut: &Cut) -> Option<i32> {
        let clip = self.registry.get_clip(&cut.clip_id)?;
        if clip.kind.is_unbounded() {
            return None;
        }
        let len = self
            .registry
            .instance(&cut.producer)
            .and_then(|i| i.props.get_i32(P_LENGTH))
            .or_else(|| clip.native_duration())?;
        Some(len - 1)
    }

    /// Audio tracks play audio only; `Original` becomes `AudioOnly` there.
    pub(super) fn state_for(&self, track: usize, state: ClipState) -> TimelineResult<ClipState> {
        match (self.tracks.get(track).map(|t| t.kind), state) {
            (Some(TrackKind::Audio), ClipState::Original) => Ok(ClipState::AudioOnly),
            (Some(TrackKind::Audio), ClipState::VideoOnly) => Err(TimelineError::invalid(format!(
                "track {} is an audio track",
                track
            ))),
            _ => Ok(state),
        }
    }

    /// Producer a cut of `clip_id` uses on `track`, after state coercion.
    pub(super) fn producer_for(&mut self, clip_id: &str, track: usize, state: ClipState) -> TimelineResult<String> {
        let state = self.state_for(track, state)?;
        self.registry.get_or_create(clip_id, track, state)
    }

    /// Producer for a cut arriving on `track`. Speed-altered cuts keep their
    /// shared instance.
    pub(super) fn rehome(&mut self, cut: &Cut, track: usize) -> TimelineResult<String> {
        match self.producer_id(cut) {
            ProducerId::Slowmotion {
                speed, strobe, state, ..
            } => self.registry.get_slowmotion(&cut.clip_id, speed, strobe, state),
            parsed => self.producer_for(&cut.clip_id, track, parsed.state()),
        }
    }

    /// Shift clip-group members on `track` starting at or after `from`.
    pub(super) fn shift_groups(&mut self, track: usize, from: i32, delta: i32) {
        if delta == 0 {
            return;
        }
        for group in &mut self.groups {
            for member in &mut group.members {
                if let GroupItem::Clip { track: t, start } = *member {
                    if t == track && start >= from {
                        *member = GroupItem::Clip { track, start: start + delta };
                    }
                }
            }
        }
    }

    /// The other half of an audio/video split: a grouped cut of the same
    /// clip on another track in the complementary state.
    pub fn split_partner(&self, track: usize, start: i32) -> Option<(usize, i32)> {
        let cut = self.cut(track, start)?;
        let wanted = match self.producer_id(cut).state() {
            ClipState::VideoOnly => ClipState::AudioOnly,
            ClipState::AudioOnly => ClipState::VideoOnly,
            ClipState::Original => return None,
        };
        self.groups
            .iter()
            .filter(|g| g.contains_clip(track, start))
            .flat_map(|g| g.members.iter())
            .find_map(|m| match *m {
                GroupItem::Clip { track: t, start: s } if t != track => {
                    let other = self.cut(t, s)?;
                    (other.clip_id == cut.clip_id && self.producer_id(other).state() == wanted).then_some((t, s))
                }
                _ => None,
            })
    }

    pub fn add_group(&mut self, group: ClipGroup) {
        self.groups.push(group);
        self.prune_groups();
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Every structural rule the timeline must satisfy between edits.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.tracks.is_empty() {
            return Err("no background track".to_string());
        }
        for (i, track) in self.tracks.iter().enumerate() {
            track
                .playlist
                .check_invariants()
                .map_err(|e| format!("track {}: {}", i, e))?;
            for (start, cut) in track.playlist.cuts() {
                if !self.registry.contains_clip(&cut.clip_id) {
                    return Err(format!("track {} frame {}: unknown clip {}", i, start, cut.clip_id));
                }
                if !self.registry.resolves(&cut.producer) {
                    return Err(format!("track {} frame {}: unknown producer {}", i, start, cut.producer));
                }
            }
        }

        for group in &self.groups {
            for member in &group.members {
                let GroupItem::Clip { track, start } = *member else {
                    continue;
                };
                if !self.tracks[track].is_video() {
                    continue;
                }
                let (Some(video), Some((pt, ps))) = (self.cut(track, start), self.split_partner(track, start)) else {
                    continue;
                };
                let Some(audio) = self.cut(pt, ps) else {
                    continue;
                };
                if ps != start || audio.in_frame != video.in_frame || audio.out_frame != video.out_frame {
                    return Err(format!(
                        "split of {} out of sync: track {} @{} [{}, {}] vs track {} @{} [{}, {}]",
                        video.clip_id,
                        track,
                        start,
                        video.in_frame,
                        video.out_frame,
                        pt,
                        ps,
                        audio.in_frame,
                        audio.out_frame
                    ));
                }
            }
        }

        self.transitions.check_invariants(self.tracks.len(), self.duration)?;

        let lowest = lowest_video_track(&self.tracks);
        for (i, track) in self.tracks.iter().enumerate().skip(1) {
            let composites = self.transitions.on_track(i).filter(|t| t.is_track_composite()).count();
            let wanted = track.is_video() && track.composite && lowest.is_some_and(|low| i > low);
            if composites != usize::from(wanted) {
                return Err(format!("track {}: {} auto composites, expected {}", i, composites, usize::from(wanted)));
            }
            if track.is_audio() && !self.transitions.on_track(i).any(Transition::is_audio_mix) {
                return Err(format!("audio track {} has no mix", i));
            }
        }

        if self.tracks[0].duration() != self.duration.max(1) {
            return Err(format!(
                "background is {} frames, project {}",
                self.tracks[0].duration(),
                self.duration
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn transition_track_free(&self, b_track: usize) -> TimelineResult<()> {
        match self.tracks.get(b_track) {
            Some(t) if t.locked => Err(TimelineError::Locked(b_track)),
            _ => Ok(()),
        }
    }

    pub fn add_transition(&mut self, transition: Transition) -> TimelineResult<()> {
        self.apply("add transition", |m| {
            m.transition_track_free(transition.b_track)?;
            m.transitions.add(transition, m.tracks.len(), m.duration)?;
            m.pending.transitions = true;
            Ok(())
        })
    }

    /// Replace the `old_tag` transition at `new`'s track and window.
    pub fn update_transition(&mut self, old_tag: &str, new: Transition) -> TimelineResult<()> {
        self.apply("update transition", |m| {
            m.transition_track_free(new.b_track)?;
            m.transitions.update(old_tag, new, m.tracks.len(), m.duration)?;
            m.pending.transitions = true;
            Ok(())
        })
    }

    pub fn move_transition(&mut self, tag: &str, mv: TransitionMove) -> TimelineResult<()> {
        self.apply("move transition", |m| {
            m.transition_track_free(mv.old_track)?;
            m.transition_track_free(mv.new_b)?;
            // moving past the end is allowed: the project grows with it
            let duration = m.duration.max(mv.new_out + 1);
            m.transitions.move_transition(tag, mv, m.tracks.len(), duration)?;
            m.pending.transitions = true;
            Ok(())
        })
    }

    pub fn delete_transition(&mut self, tag: &str, b_track: usize, in_frame: i32, out_frame: i32) -> TimelineResult<Transition> {
        self.apply("delete transition", |m| {
            m.transition_track_free(b_track)?;
            let removed = m.transitions.delete(tag, b_track, in_frame, out_frame)?;
            if removed.is_internal() {
                return Err(TimelineError::invalid(format!("{} on track {} is managed automatically", tag, b_track)));
            }
            m.pending.transitions = true;
            Ok(removed)
        })
    }

    pub fn enable_multitrack(&mut self, on: bool) -> TimelineResult<()> {
        self.apply("multitrack preview", |m| {
            m.transitions.enable_multitrack(on, &m.tracks, m.duration);
            m.pending.transitions = true;
            Ok(())
        })
    }

    /// Re-plant one always-active mix per track carrying audio.
    pub fn fix_audio_mixing(&mut self) -> TimelineResult<()> {
        self.apply("fix audio mixing", |m| {
            let registry = &m.registry;
            let has_audio = |t: &Track| t.has_audio(|clip| registry.get_clip(clip).is_some_and(|c| c.has_audio()));
            m.transitions.fix_audio_mixing(&m.tracks, has_audio, m.duration);
            m.pending.transitions = true;
            Ok(())
        })
    }

    /// Auto composites and mixes after a track list change.
    pub(super) fn ensure_auto_transitions(&mut self) {
        let registry = &self.registry;
        let has_audio = |t: &Track| t.has_audio(|clip| registry.get_clip(clip).is_some_and(|c| c.has_audio()));
        self.transitions.ensure_auto_transitions(&self.tracks, has_audio, self.duration);
    }

    /// Show a clip above every track for the whole project, or remove it.
    pub fn set_overlay(&mut self, clip_id: Option<&str>) -> TimelineResult<()> {
        self.apply("set overlay", |m| {
            m.overlay = match clip_id {
                Some(id) => {
                    if !m.registry.contains_clip(id) {
                        return Err(TimelineError::MissingMedia(format!("clip {}", id)));
                    }
                    Some(Cut::new(id, id, 0, m.duration.max(1) - 1))
                }
                None => None,
            };
            m.pending.tracks = true;
            Ok(())
        })
    }

    /// Recompute the duration, pad the background and re-span the
    /// always-active transitions. Always notifies.
    pub fn tighten_duration(&mut self) -> TimelineResult<i32> {
        let previous = self.duration;
        self.apply("tighten duration", |_| Ok(()))?;
        if self.duration == previous {
            self.notifier.emit(DurationChanged { frames: self.duration });
        }
        Ok(self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::EventBus;
    use crate::entities::{ClipKind, SourceClip};

    pub(crate) fn clip(id: &str, len: i32) -> SourceClip {
        SourceClip::new(id, ClipKind::AV, format!("/media/{}.mov", id)).with_length(len)
    }

    #[test]
    fn test_new_model_has_background_only() {
        let m = TimelineModel::new(Profile::default(), Notifier::silent());
        assert_eq!(m.track_count(), 1);
        assert_eq!(m.duration(), 0);
        assert_eq!(m.tracks()[0].duration(), 1);
        assert!(m.check_invariants().is_ok());
        assert_eq!(m.tractor().read(|g| g.model_track_count()), 1);
    }

    #[test]
    fn test_background_refuses_edits() {
        let mut m = TimelineModel::new(Profile::default(), Notifier::silent());
        m.registry_mut().add_clip(clip("c1", 50)).expect("clip");
        let err = m
            .insert_clip(0, 0, "c1", ClipState::Original, InsertMode::Normal)
            .expect_err("background");
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_rejected_edit_leaves_state_and_graph() {
        let bus = EventBus::new();
        let mut m = TimelineModel::new(Profile::default(), bus.notifier());
        m.add_track(1, TrackKind::Video).expect("track");
        m.registry_mut().add_clip(clip("c1", 50)).expect("clip");
        m.insert_clip(1, 0, "c1", ClipState::Original, InsertMode::Normal)
            .expect("insert");
        bus.clear();
        let before = m.clone();
        let revision = m.tractor().revision();

        let err = m
            .insert_clip(1, 10, "c1", ClipState::Original, InsertMode::Normal)
            .expect_err("collision");
        assert!(matches!(err, TimelineError::Collision { track: 1, frame: 10 }));
        assert!(m.content_eq(&before));
        assert_eq!(m.tractor().revision(), revision);
        assert_eq!(bus.queue_len(), 0);
    }

    #[test]
    fn test_duration_events() {
        let bus = EventBus::new();
        let mut m = TimelineModel::new(Profile::default(), bus.notifier());
        m.add_track(1, TrackKind::Video).expect("track");
        m.registry_mut().add_clip(clip("c1", 50)).expect("clip");
        bus.clear();
        m.insert_clip(1, 100, "c1", ClipState::Original, InsertMode::Normal)
            .expect("insert");
        assert_eq!(m.duration(), 150);
        assert_eq!(bus.drain::<DurationChanged>(), vec![DurationChanged { frames: 150 }]);
        assert_eq!(m.tractor().duration(), 150);

        m.tighten_duration().expect("tighten");
        assert_eq!(bus.drain::<DurationChanged>().len(), 1);
    }

    #[test]
    fn test_user_transition_keeps_duration() {
        let mut m = TimelineModel::new(Profile::default(), Notifier::silent());
        m.add_track(1, TrackKind::Video).expect("v1");
        m.add_track(2, TrackKind::Video).expect("v2");
        m.registry_mut().add_clip(clip("c1", 100)).expect("clip");
        m.insert_clip(2, 0, "c1", ClipState::Original, InsertMode::Normal)
            .expect("insert");
        m.add_transition(Transition::new("luma", 1, 2, 80, 99)).expect("luma");
        m.delete_clip(2, 0).expect("delete");
        assert_eq!(m.duration(), 100);
        assert!(m.check_invariants().is_ok());
    }

    #[test]
    fn test_internal_transitions_are_not_user_deletable() {
        let mut m = TimelineModel::new(Profile::default(), Notifier::silent());
        m.add_track(1, TrackKind::Audio).expect("a1");
        let out = m.transitions().field()[0].out_frame;
        let err = m.delete_transition("mix", 1, 0, out).expect_err("internal");
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        assert_eq!(m.transitions().len(), 1);
    }

    #[test]
    fn test_video_track_mix_survives_track_changes() {
        let mut m = TimelineModel::new(Profile::default(), Notifier::silent());
        m.add_track(1, TrackKind::Audio).expect("a1");
        m.add_track(2, TrackKind::Video).expect("v1");
        m.registry_mut().add_clip(clip("c1", 50)).expect("clip");
        m.insert_clip(2, 0, "c1", ClipState::Original, InsertMode::Normal)
            .expect("insert");
        m.fix_audio_mixing().expect("fix");
        let mixes = |m: &TimelineModel| {
            let mut tracks: Vec<usize> = m
                .transitions()
                .field()
                .iter()
                .filter(|t| t.is_audio_mix())
                .map(|t| t.b_track)
                .collect();
            tracks.sort();
            tracks
        };
        assert_eq!(mixes(&m), vec![1, 2]);

        m.add_track(3, TrackKind::Video).expect("v2");
        assert_eq!(mixes(&m), vec![1, 2]);
        m.delete_clip(2, 0).expect("delete");
        m.rename_track(3, "V2").expect("rename");
        m.set_composite(3, false).expect("composite");
        assert_eq!(mixes(&m), vec![1]);
    }

    #[test]
    fn test_overlay_spans_project() {
        let mut m = TimelineModel::new(Profile::default(), Notifier::silent());
        m.add_track(1, TrackKind::Video).expect("track");
        m.registry_mut().add_clip(clip("c1", 80)).expect("clip");
        m.registry_mut()
            .add_clip(SourceClip::new("wm", ClipKind::Image, "/media/logo.png"))
            .expect("logo");
        m.insert_clip(1, 0, "c1", ClipState::Original, InsertMode::Normal)
            .expect("insert");
        m.set_overlay(Some("wm")).expect("overlay");
        assert_eq!(m.overlay().map(Cut::length), Some(80));
        assert!(m.tractor().read(|g| g.has_overlay));
        assert!(m.remove_clip("wm").is_err());
        m.set_overlay(None).expect("clear");
        assert_eq!(m.remove_clip("wm").expect("remove"), 0);
    }
}

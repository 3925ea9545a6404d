//! Transition handler: the tractor field and its plant order.
//!
//! The field is kept as a vector, first planted first. The renderer applies
//! transitions in that order, so a later one composes on top of the earlier
//! ones. Within one `b_track` the order key is `(is_internal, a_track)`: user
//! transitions first, then by underlying track. Planting pulls every
//! transition that would sit below the new one, pushes the new one, then
//! re-plants the pulled ones in their original order.
//!
//! Transitions are located the way the editor refers to them: by tag,
//! `b_track` and a frame inside their window (the midpoint of the window the
//! caller knows).

use log::{debug, trace};

use crate::entities::track::Track;
use crate::entities::Transition;
use crate::error::{TimelineError, TimelineResult};

/// Quadrants of the multitrack preview, in planting order
pub const MULTITRACK_GEOMETRIES: [&str; 4] = [
    "0/0:50%x50%",
    "50%/0:50%x50%",
    "0/50%:50%x50%",
    "50%/50%:50%x50%",
];

/// Window of always-active internal transitions for a timeline of `duration`.
pub fn always_active_out(duration: i32) -> i32 {
    (duration - 1).max(1)
}

/// Index of the lowest video track above the background.
pub fn lowest_video_track(tracks: &[Track]) -> Option<usize> {
    tracks.iter().enumerate().skip(1).find(|(_, t)| t.is_video()).map(|(i, _)| i)
}

/// Where the auto composite of `b_track` composes onto: the nearest video
/// track below whose composite is on and whose video is shown, else the
/// lowest video track.
pub fn composite_target(tracks: &[Track], b_track: usize) -> usize {
    (1..b_track)
        .rev()
        .find(|&i| {
            tracks
                .get(i)
                .is_some_and(|t| t.is_video() && t.composite && !t.is_video_hidden())
        })
        .or_else(|| lowest_video_track(tracks).filter(|&low| low < b_track))
        .unwrap_or(0)
}

/// A transition's move: where it is now and where it goes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionMove {
    pub old_track: usize,
    pub old_in: i32,
    pub old_out: i32,
    pub new_a: usize,
    pub new_b: usize,
    pub new_in: i32,
    pub new_out: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionHandler {
    field: Vec<Transition>,
    multitrack: bool,
}

impl TransitionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field in plant order.
    pub fn field(&self) -> &[Transition] {
        &self.field
    }

    pub fn len(&self) -> usize {
        self.field.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field.is_empty()
    }

    pub fn multitrack_enabled(&self) -> bool {
        self.multitrack
    }

    /// Transitions whose overlay track is `b_track`.
    pub fn on_track(&self, b_track: usize) -> impl Iterator<Item = &Transition> {
        self.field.iter().filter(move |t| t.b_track == b_track)
    }

    // ========================================================================
    // Planting
    // ========================================================================

    fn plant(&mut self, transition: Transition) {
        let key = transition.plant_key();
        let b_track = transition.b_track;
        let (saved, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.field)
            .into_iter()
            .partition(|t| t.b_track == b_track && t.plant_key() > key);
        trace!(
            "Plant {} {}->{} [{}, {}], re-planting {}",
            transition.tag,
            transition.a_track,
            transition.b_track,
            transition.in_frame,
            transition.out_frame,
            saved.len()
        );
        self.field = kept;
        self.field.push(transition);
        self.field.extend(saved);
    }

    fn replant_all(&mut self) {
        for t in std::mem::take(&mut self.field) {
            self.plant(t);
        }
    }

    /// Plant a transition read from a document, without range checks.
    pub fn insert_loaded(&mut self, transition: Transition) {
        if transition.is_multitrack() {
            self.multitrack = true;
        }
        self.plant(transition);
    }

    fn locate(&self, tag: &str, b_track: usize, in_frame: i32, out_frame: i32) -> TimelineResult<usize> {
        let mid = (in_frame + out_frame) / 2;
        self.field
            .iter()
            .position(|t| t.tag == tag && t.b_track == b_track && t.contains(mid))
            .ok_or_else(|| {
                TimelineError::invalid(format!("no {} transition on track {} at frame {}", tag, b_track, mid))
            })
    }

    fn validate(t: &Transition, track_count: usize, duration: i32) -> TimelineResult<()> {
        if t.b_track == 0 {
            return Err(TimelineError::invalid("transition cannot target the background track"));
        }
        if t.a_track >= t.b_track {
            return Err(TimelineError::invalid(format!(
                "a_track {} must be below b_track {}",
                t.a_track, t.b_track
            )));
        }
        if t.in_frame >= t.out_frame {
            return Err(TimelineError::invalid(format!("empty window [{}, {}]", t.in_frame, t.out_frame)));
        }
        if t.b_track >= track_count {
            return Err(TimelineError::OutOfRange(format!("track {}", t.b_track)));
        }
        if t.in_frame < 0 || t.out_frame > always_active_out(duration) {
            return Err(TimelineError::OutOfRange(format!(
                "window [{}, {}] outside project of {} frames",
                t.in_frame, t.out_frame, duration
            )));
        }
        Ok(())
    }

    // ========================================================================
    // User transitions
    // ========================================================================

    pub fn add(&mut self, transition: Transition, track_count: usize, duration: i32) -> TimelineResult<()> {
        Self::validate(&transition, track_count, duration)?;
        debug!(
            "Add transition {} {}->{} [{}, {}]",
            transition.tag, transition.a_track, transition.b_track, transition.in_frame, transition.out_frame
        );
        self.plant(transition);
        Ok(())
    }

    /// Replace the transition `old_tag` found at `new`'s track and window.
    /// Same tag and tracks: parameters change in place. Otherwise the old one
    /// is removed and `new` planted.
    pub fn update(&mut self, old_tag: &str, new: Transition, track_count: usize, duration: i32) -> TimelineResult<()> {
        Self::validate(&new, track_count, duration)?;
        let index = self.locate(old_tag, new.b_track, new.in_frame, new.out_frame)?;
        let current = &mut self.field[index];
        if current.tag == new.tag && current.a_track == new.a_track {
            current.id = new.id;
            current.params = new.params;
            current.in_frame = new.in_frame;
            current.out_frame = new.out_frame;
            current.force_track = new.force_track;
            return Ok(());
        }
        self.field.remove(index);
        self.plant(new);
        Ok(())
    }

    /// Move a transition to a new window and/or tracks. Crossing to another
    /// `b_track` re-plants a copy so the plant order stays right.
    pub fn move_transition(&mut self, tag: &str, mv: TransitionMove, track_count: usize, duration: i32) -> TimelineResult<()> {
        let index = self.locate(tag, mv.old_track, mv.old_in, mv.old_out)?;
        let mut moved = self.field[index].clone();
        moved.a_track = mv.new_a;
        moved.b_track = mv.new_b;
        moved.in_frame = mv.new_in;
        moved.out_frame = mv.new_out;
        Self::validate(&moved, track_count, duration)?;

        let current = &mut self.field[index];
        if current.b_track == mv.new_b && current.a_track == mv.new_a {
            current.in_frame = mv.new_in;
            current.out_frame = mv.new_out;
            return Ok(());
        }
        if moved.b_track != mv.old_track {
            // user moved it: it no longer follows the track below
            moved.force_track = true;
        }
        self.field.remove(index);
        self.plant(moved);
        Ok(())
    }

    pub fn delete(&mut self, tag: &str, b_track: usize, in_frame: i32, out_frame: i32) -> TimelineResult<Transition> {
        let index = self.locate(tag, b_track, in_frame, out_frame)?;
        debug!("Delete transition {} on track {}", tag, b_track);
        Ok(self.field.remove(index))
    }

    /// Unplant every transition whose overlay is `track`.
    pub fn delete_track_transitions(&mut self, track: usize) -> usize {
        let before = self.field.len();
        self.field.retain(|t| t.b_track != track);
        before - self.field.len()
    }

    /// Tracks were inserted at `index`: shift references at or above it.
    pub fn on_track_inserted(&mut self, index: usize) {
        for t in &mut self.field {
            if t.b_track >= index {
                t.b_track += 1;
            }
            if t.a_track >= index {
                t.a_track += 1;
            }
        }
    }

    /// Track `index` was removed: drop its transitions and shift the rest down.
    pub fn on_track_removed(&mut self, index: usize) {
        self.delete_track_transitions(index);
        for t in &mut self.field {
            if t.b_track > index {
                t.b_track -= 1;
            }
            if t.a_track > index || (t.a_track == index && index > 0) {
                t.a_track -= 1;
            }
        }
        self.replant_all();
    }

    // ========================================================================
    // Internal transitions
    // ========================================================================

    /// Re-target every enabled auto composite onto the track it should
    /// compose on.
    pub fn rebuild_composites(&mut self, tracks: &[Track]) -> bool {
        let mut changed = false;
        for t in self.field.iter_mut().filter(|t| t.is_track_composite() && !t.is_disabled()) {
            let target = composite_target(tracks, t.b_track);
            if t.a_track != target {
                trace!("Composite on {}: a_track {} -> {}", t.b_track, t.a_track, target);
                t.a_track = target;
                changed = true;
            }
        }
        if changed {
            self.replant_all();
        }
        changed
    }

    /// Bring auto composites and audio mixes in line with the track list:
    /// one composite per video track above the lowest with composite on, one
    /// mix per audio track. Mixes on other tracks stay while `has_audio`
    /// holds for them (see [`Self::fix_audio_mixing`]).
    pub fn ensure_auto_transitions(&mut self, tracks: &[Track], has_audio: impl Fn(&Track) -> bool, duration: i32) {
        let out = always_active_out(duration);
        let lowest = lowest_video_track(tracks);
        let wants_composite =
            |i: usize, t: &Track| t.is_video() && t.composite && lowest.is_some_and(|low| i > low);

        self.field.retain(|t| {
            let track = tracks.get(t.b_track);
            if t.is_track_composite() {
                return track.is_some_and(|tr| wants_composite(t.b_track, tr));
            }
            if t.is_audio_mix() {
                return track.is_some_and(&has_audio);
            }
            true
        });

        for (i, track) in tracks.iter().enumerate().skip(1) {
            if wants_composite(i, track) && !self.field.iter().any(|t| t.is_track_composite() && t.b_track == i) {
                let mut composite = Transition::track_composite(composite_target(tracks, i), i, out);
                composite.set_disabled(self.multitrack);
                self.plant(composite);
            }
            if track.is_audio() && !self.field.iter().any(|t| t.is_audio_mix() && t.b_track == i) {
                self.plant(Transition::audio_mix(i, out));
            }
        }
        self.rebuild_composites(tracks);
    }

    /// Unplant every always-active mix and plant one per track carrying audio.
    pub fn fix_audio_mixing(&mut self, tracks: &[Track], has_audio: impl Fn(&Track) -> bool, duration: i32) {
        self.field
            .retain(|t| !(t.tag == "mix" && (t.is_internal() || t.is_always_active())));
        let out = always_active_out(duration);
        let mut planted = 0;
        for (i, track) in tracks.iter().enumerate().skip(1) {
            if has_audio(track) {
                self.plant(Transition::audio_mix(i, out));
                planted += 1;
            }
        }
        debug!("Audio mixing rebuilt: {} mixes", planted);
    }

    /// Switch the four-quadrant preview on or off.
    pub fn enable_multitrack(&mut self, on: bool, tracks: &[Track], duration: i32) {
        self.field.retain(|t| !t.is_multitrack());
        for t in self.field.iter_mut().filter(|t| t.is_track_composite()) {
            t.set_disabled(on);
        }
        self.multitrack = on;
        if on {
            let out = always_active_out(duration);
            let shown = tracks
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, t)| t.is_video() && !t.is_video_hidden())
                .map(|(i, _)| i)
                .take(MULTITRACK_GEOMETRIES.len())
                .collect::<Vec<_>>();
            for (track, geometry) in shown.into_iter().zip(MULTITRACK_GEOMETRIES) {
                self.plant(Transition::multitrack(track, geometry, out));
            }
        } else {
            self.rebuild_composites(tracks);
        }
    }

    /// Re-span always-active internal transitions to the project duration.
    pub fn respan(&mut self, duration: i32) {
        let out = always_active_out(duration);
        for t in self.field.iter_mut().filter(|t| t.is_internal() && t.is_always_active()) {
            t.in_frame = 0;
            t.out_frame = out;
        }
    }

    /// Structural checks on every planted transition and on the plant order.
    pub fn check_invariants(&self, track_count: usize, duration: i32) -> Result<(), String> {
        for (i, t) in self.field.iter().enumerate() {
            if let Err(e) = Self::validate(t, track_count, duration) {
                return Err(format!("transition {} ({}): {}", i, t.tag, e));
            }
        }
        for (i, later) in self.field.iter().enumerate() {
            if let Some(bad) = self.field[i + 1..]
                .iter()
                .find(|t| t.b_track == later.b_track && t.plant_key() < later.plant_key())
            {
                return Err(format!(
                    "plant order on track {}: {} (a={}) planted after {} (a={})",
                    later.b_track, bad.tag, bad.a_track, later.tag, later.a_track
                ));
            }
        }
        Ok(())
    }
}

/// Collect the internal markers of a field, for logs and tests.
pub fn markers(field: &[Transition]) -> Vec<(usize, usize, Option<i32>)> {
    field.iter().map(|t| (t.a_track, t.b_track, t.internal)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::keys::*;
    use crate::entities::track::{TrackKind, HIDE_VIDEO};

    fn video_stack(n: usize) -> Vec<Track> {
        let mut tracks = vec![Track::background(100)];
        for i in 0..n {
            tracks.push(Track::new(TrackKind::Video, format!("V{}", i)));
        }
        tracks
    }

    fn composite_of(h: &TransitionHandler, b: usize) -> Option<&Transition> {
        h.field().iter().find(|t| t.is_track_composite() && t.b_track == b)
    }

    #[test]
    fn test_add_rejects_bad_windows() {
        let mut h = TransitionHandler::new();
        let bad = [
            Transition::new("luma", 1, 1, 0, 10),
            Transition::new("luma", 0, 0, 0, 10),
            Transition::new("luma", 2, 1, 0, 10),
            Transition::new("luma", 0, 1, 10, 10),
        ];
        for t in bad {
            assert!(matches!(h.add(t, 3, 100), Err(TimelineError::InvalidArgument(_))));
        }
        assert!(matches!(
            h.add(Transition::new("luma", 1, 5, 0, 10), 3, 100),
            Err(TimelineError::OutOfRange(_))
        ));
        assert!(h.is_empty());
    }

    #[test]
    fn test_plant_order_user_below_internal() {
        let mut h = TransitionHandler::new();
        h.add(Transition::track_composite(1, 3, 99), 4, 100).expect("auto");
        h.add(Transition::new("luma", 2, 3, 10, 20), 4, 100).expect("user high a");
        h.add(Transition::new("luma", 1, 3, 30, 40), 4, 100).expect("user low a");
        let order: Vec<_> = h.field().iter().map(|t| (t.is_internal(), t.a_track)).collect();
        assert_eq!(order, vec![(false, 1), (false, 2), (true, 1)]);
        assert!(h.check_invariants(4, 100).is_ok());
    }

    #[test]
    fn test_update_in_place_and_retag() {
        let mut h = TransitionHandler::new();
        h.add(Transition::new("luma", 1, 2, 10, 30), 3, 100).expect("add");
        let mut edited = Transition::new("luma", 1, 2, 10, 30);
        edited.params.set("softness", "50");
        h.update("luma", edited, 3, 100).expect("update");
        assert_eq!(h.field()[0].params.get("softness"), Some("50"));

        let dissolve = Transition::new("mix", 1, 2, 10, 30);
        h.update("luma", dissolve, 3, 100).expect("retag");
        assert_eq!(h.len(), 1);
        assert_eq!(h.field()[0].tag, "mix");
        assert!(h.update("luma", Transition::new("luma", 1, 2, 10, 30), 3, 100).is_err());
    }

    #[test]
    fn test_move_across_tracks_replants() {
        let mut h = TransitionHandler::new();
        h.add(Transition::track_composite(1, 3, 99), 4, 100).expect("auto");
        let mut wipe = Transition::new("luma", 1, 2, 10, 30);
        wipe.params.set("softness", "20");
        h.add(wipe, 4, 100).expect("wipe");
        let mv = TransitionMove {
            old_track: 2,
            old_in: 10,
            old_out: 30,
            new_a: 2,
            new_b: 3,
            new_in: 40,
            new_out: 60,
        };
        h.move_transition("luma", mv, 4, 100).expect("move");
        let moved = h.on_track(3).next().expect("moved first on track 3");
        assert_eq!((moved.tag.as_str(), moved.in_frame, moved.out_frame), ("luma", 40, 60));
        assert_eq!(moved.params.get("softness"), Some("20"));
        assert!(h.on_track(2).next().is_none());
        assert!(h.check_invariants(4, 100).is_ok());
    }

    #[test]
    fn test_delete_by_midpoint() {
        let mut h = TransitionHandler::new();
        h.add(Transition::new("luma", 0, 1, 0, 50), 2, 100).expect("a");
        h.add(Transition::new("luma", 0, 1, 60, 90), 2, 100).expect("b");
        let removed = h.delete("luma", 1, 55, 95).expect("delete");
        assert_eq!(removed.in_frame, 60);
        assert_eq!(h.len(), 1);
        assert!(h.delete("luma", 1, 55, 58).is_err());
    }

    #[test]
    fn test_auto_transitions_and_composite_disable() {
        // 0 background, V0..V3 at 1..4
        let mut tracks = video_stack(4);
        let mut h = TransitionHandler::new();
        h.ensure_auto_transitions(&tracks, Track::is_audio, 100);
        assert!(composite_of(&h, 1).is_none());
        assert_eq!(composite_of(&h, 2).map(|t| t.a_track), Some(1));
        assert_eq!(composite_of(&h, 3).map(|t| t.a_track), Some(2));
        assert_eq!(composite_of(&h, 4).map(|t| t.a_track), Some(3));

        tracks[3].composite = false;
        h.ensure_auto_transitions(&tracks, Track::is_audio, 100);
        assert!(composite_of(&h, 3).is_none());
        assert_eq!(composite_of(&h, 4).map(|t| t.a_track), Some(2));
        assert_eq!(composite_of(&h, 2).map(|t| t.a_track), Some(1));
        assert!(h.check_invariants(tracks.len(), 100).is_ok());
    }

    #[test]
    fn test_hidden_track_is_skipped_as_target() {
        let mut tracks = video_stack(3);
        tracks[2].hide = HIDE_VIDEO;
        let mut h = TransitionHandler::new();
        h.ensure_auto_transitions(&tracks, Track::is_audio, 100);
        assert_eq!(composite_of(&h, 3).map(|t| t.a_track), Some(1));
    }

    #[test]
    fn test_audio_mixes() {
        let mut tracks = video_stack(1);
        tracks.push(Track::new(TrackKind::Audio, "A1"));
        tracks.push(Track::new(TrackKind::Audio, "A2"));
        let mut h = TransitionHandler::new();
        h.ensure_auto_transitions(&tracks, Track::is_audio, 100);
        let mixes: Vec<_> = h.field().iter().filter(|t| t.is_audio_mix()).map(|t| (t.a_track, t.b_track)).collect();
        assert_eq!(mixes, vec![(0, 2), (0, 3)]);

        // every track with sound, video track 1 included
        h.fix_audio_mixing(&tracks, |_| true, 100);
        let mixes = h.field().iter().filter(|t| t.is_audio_mix()).count();
        assert_eq!(mixes, 3);
        let mix = h.field().iter().find(|t| t.is_audio_mix()).expect("mix");
        assert_eq!(mix.params.get(X_COMBINE), Some("1"));
        assert!(mix.is_always_active());

        // a track change keeps the mix of a video track that still has sound
        h.ensure_auto_transitions(&tracks, |_| true, 100);
        assert_eq!(h.field().iter().filter(|t| t.is_audio_mix()).count(), 3);
        h.ensure_auto_transitions(&tracks, Track::is_audio, 100);
        assert_eq!(h.field().iter().filter(|t| t.is_audio_mix()).count(), 2);
    }

    #[test]
    fn test_multitrack_toggle() {
        let mut tracks = video_stack(5);
        tracks[2].hide = HIDE_VIDEO;
        let mut h = TransitionHandler::new();
        h.ensure_auto_transitions(&tracks, Track::is_audio, 100);
        h.enable_multitrack(true, &tracks, 100);
        let quads: Vec<_> = h
            .field()
            .iter()
            .filter(|t| t.is_multitrack())
            .map(|t| (t.b_track, t.params.get(X_GEOMETRY).unwrap_or("").to_string()))
            .collect();
        assert_eq!(
            quads,
            vec![
                (1, MULTITRACK_GEOMETRIES[0].to_string()),
                (3, MULTITRACK_GEOMETRIES[1].to_string()),
                (4, MULTITRACK_GEOMETRIES[2].to_string()),
                (5, MULTITRACK_GEOMETRIES[3].to_string()),
            ]
        );
        assert!(h.field().iter().filter(|t| t.is_track_composite()).all(Transition::is_disabled));

        h.enable_multitrack(false, &tracks, 100);
        assert!(!h.field().iter().any(Transition::is_multitrack));
        assert!(!h.field().iter().any(Transition::is_disabled));
    }

    #[test]
    fn test_track_removal_shifts() {
        let mut h = TransitionHandler::new();
        h.add(Transition::new("luma", 1, 2, 0, 10), 5, 100).expect("on 2");
        h.add(Transition::new("luma", 3, 4, 0, 10), 5, 100).expect("on 4");
        h.add(Transition::new("luma", 2, 3, 0, 10), 5, 100).expect("on 3");
        h.on_track_removed(2);
        assert_eq!(markers(h.field()), vec![(2, 3, None), (1, 2, None)]);
        h.on_track_inserted(1);
        assert_eq!(markers(h.field()), vec![(3, 4, None), (2, 3, None)]);
    }

    #[test]
    fn test_respan() {
        let tracks = video_stack(2);
        let mut h = TransitionHandler::new();
        h.ensure_auto_transitions(&tracks, Track::is_audio, 0);
        assert_eq!(composite_of(&h, 2).map(|t| t.out_frame), Some(1));
        h.respan(250);
        assert_eq!(composite_of(&h, 2).map(|t| (t.in_frame, t.out_frame)), Some((0, 249)));
    }
}

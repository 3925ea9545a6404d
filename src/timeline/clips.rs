//! Clip edits: insert, move, resize, split, delete, speed and stream state.
//!
//! Each edit is built from the playlist primitives (`place`, `insert_at`,
//! `replace_with_blank`, `split_at`, `resize_clip`) inside one
//! [`TimelineModel::apply`] call. The video and audio halves of a split clip
//! move, resize and split together.

use log::debug;

use super::model::{Edge, InsertMode, TimelineModel};
use crate::entities::keys::*;
use crate::entities::{ClipGroup, ClipState, Cut, Entry, GroupItem, Playlist, ProducerId};
use crate::error::{TimelineError, TimelineResult};

/// First frame of `[start, start+len)` covered by a cut.
fn first_occupied(playlist: &Playlist, start: i32, len: i32) -> i32 {
    playlist
        .positions()
        .find(|(pos, e)| !e.is_blank() && *pos < start.saturating_add(len) && pos + e.length() > start)
        .map(|(pos, _)| pos.max(start))
        .unwrap_or(start)
}

/// Re-anchor the normal-speed span stored on a speed-altered cut when its
/// window becomes `[new_in, new_out]`. Each edge moves by its own delta
/// scaled back to source frames.
fn retime_speed_span(cut: &mut Cut, speed: f64, new_in: i32, new_out: i32) {
    let (orig_in, orig_len) = match (cut.props.get_i32(P_SPEED_IN), cut.props.get_i32(P_SPEED_LENGTH)) {
        (Some(i), Some(l)) => (i, l),
        _ => (
            (cut.in_frame as f64 * speed).round() as i32,
            (cut.length() as f64 * speed).round() as i32,
        ),
    };
    let orig_end = orig_in + orig_len;
    let new_orig_in = orig_in + ((new_in - cut.in_frame) as f64 * speed).round() as i32;
    let new_orig_end = orig_end + ((new_out - cut.out_frame) as f64 * speed).round() as i32;
    cut.props.set_i32(P_SPEED_IN, new_orig_in.max(0));
    cut.props.set_i32(P_SPEED_LENGTH, (new_orig_end - new_orig_in).max(1));
}

impl TimelineModel {
    /// Speed factor of a speed-altered cut.
    fn cut_speed(&self, cut: &Cut) -> Option<f64> {
        match self.producer_id(cut) {
            ProducerId::Slowmotion { speed, .. } => Some(speed.abs()),
            _ => None,
        }
    }

    /// Put `cut` on `track` at `start` according to `mode`.
    fn place_cut(&mut self, track: usize, start: i32, cut: Cut, mode: InsertMode) -> TimelineResult<()> {
        let len = cut.length();
        let base = match mode {
            InsertMode::Insert => start.max(self.tracks[track].duration()),
            _ => start,
        };
        if base.checked_add(len).is_none() {
            return Err(TimelineError::invalid(format!(
                "{} frames at {} run past the last frame",
                len, start
            )));
        }
        let playlist = &mut self.tracks[track].playlist;
        match mode {
            InsertMode::Normal => {
                if !playlist.is_blank_region(start, len) {
                    let frame = first_occupied(playlist, start, len);
                    return Err(TimelineError::Collision { track, frame });
                }
                playlist.place(start, cut);
            }
            InsertMode::Overwrite => {
                playlist.place(start, cut);
            }
            InsertMode::Insert => {
                self.shift_groups(track, start, len);
                self.tracks[track].playlist.insert_at(start, Entry::Cut(cut));
            }
        }
        let end = match mode {
            InsertMode::Insert => self.tracks[track].duration(),
            _ => start + len,
        };
        self.touch(track, start, end);
        Ok(())
    }

    // ========================================================================
    // Insert / delete
    // ========================================================================

    /// Insert the whole of `clip_id` at `start`. Unbounded clips get the
    /// still length. Returns the producer the cut uses.
    pub fn insert_clip(
        &mut self,
        track: usize,
        start: i32,
        clip_id: &str,
        state: ClipState,
        mode: InsertMode,
    ) -> TimelineResult<String> {
        let len = self
            .registry
            .get_clip(clip_id)
            .ok_or_else(|| TimelineError::MissingMedia(format!("clip {}", clip_id)))?
            .default_length(self.still_frames);
        self.insert_cut(track, start, clip_id, state, 0, len - 1, mode)
    }

    /// Insert the `[in_frame, out_frame]` window of `clip_id` at `start`.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_cut(
        &mut self,
        track: usize,
        start: i32,
        clip_id: &str,
        state: ClipState,
        in_frame: i32,
        out_frame: i32,
        mode: InsertMode,
    ) -> TimelineResult<String> {
        self.apply("insert clip", |m| {
            m.editable(track)?;
            if start < 0 {
                return Err(TimelineError::invalid(format!("negative start {}", start)));
            }
            let clip = m
                .registry
                .get_clip(clip_id)
                .ok_or_else(|| TimelineError::MissingMedia(format!("clip {}", clip_id)))?;
            if in_frame < 0 || in_frame > out_frame {
                return Err(TimelineError::invalid(format!("window [{}, {}]", in_frame, out_frame)));
            }
            if let Some(len) = clip.native_duration() {
                if out_frame > len - 1 {
                    return Err(TimelineError::OutOfRange(format!(
                        "out {} past the end of {} ({} frames)",
                        out_frame, clip_id, len
                    )));
                }
            }
            let producer = m.producer_for(clip_id, track, state)?;
            debug!("Insert {} on track {} at {} ({:?})", producer, track, start, mode);
            m.place_cut(track, start, Cut::new(producer.clone(), clip_id, in_frame, out_frame), mode)?;
            Ok(producer)
        })
    }

    /// Put back a cut taken off the timeline (see [`Self::delete_clip`]),
    /// with its effects and properties.
    pub fn insert_entry(&mut self, track: usize, start: i32, cut: Cut, mode: InsertMode) -> TimelineResult<()> {
        self.apply("insert entry", |m| {
            m.editable(track)?;
            if start < 0 {
                return Err(TimelineError::invalid(format!("negative start {}", start)));
            }
            if !m.registry.contains_clip(&cut.clip_id) {
                return Err(TimelineError::MissingMedia(format!("clip {}", cut.clip_id)));
            }
            let mut cut = cut;
            cut.producer = m.rehome(&cut, track)?;
            m.place_cut(track, start, cut, mode)
        })
    }

    /// Replace the cut starting at `start` with a blank and return it.
    pub fn delete_clip(&mut self, track: usize, start: i32) -> TimelineResult<Cut> {
        self.apply("delete clip", |m| {
            m.editable(track)?;
            let index = m.cut_index(track, start)?;
            let cut = m.tracks[track]
                .playlist
                .replace_with_blank(index)
                .ok_or_else(|| TimelineError::invalid(format!("no clip at frame {}", start)))?;
            debug!("Delete {} on track {} at {}", cut.producer, track, start);
            for group in &mut m.groups {
                group.remove_clip(track, start);
            }
            m.touch(track, start, start + cut.length());
            Ok(cut)
        })
    }

    // ========================================================================
    // Move
    // ========================================================================

    /// Move the cut at `src_start` to `dst_start` on `dst_track`, keeping its
    /// window. A split partner moves by the same offset on its own track.
    pub fn move_clip(
        &mut self,
        src_track: usize,
        src_start: i32,
        dst_track: usize,
        dst_start: i32,
        mode: InsertMode,
    ) -> TimelineResult<()> {
        self.apply("move clip", |m| {
            let partner = m.split_partner(src_track, src_start);
            m.move_one(src_track, src_start, dst_track, dst_start, mode)?;
            if let Some((pt, ps)) = partner {
                let delta = dst_start - src_start;
                if delta != 0 && pt != dst_track {
                    m.move_one(pt, ps, pt, ps + delta, mode)?;
                }
            }
            Ok(())
        })
    }

    fn move_one(
        &mut self,
        src_track: usize,
        src_start: i32,
        dst_track: usize,
        dst_start: i32,
        mode: InsertMode,
    ) -> TimelineResult<()> {
        self.editable(src_track)?;
        self.editable(dst_track)?;
        if dst_start < 0 {
            return Err(TimelineError::invalid(format!("negative start {}", dst_start)));
        }
        let index = self.cut_index(src_track, src_start)?;
        let mut cut = self.tracks[src_track]
            .playlist
            .replace_with_blank(index)
            .ok_or_else(|| TimelineError::invalid(format!("no clip at frame {}", src_start)))?;
        self.touch(src_track, src_start, src_start + cut.length());
        if dst_track != src_track {
            cut.producer = self.rehome(&cut, dst_track)?;
        }
        debug!(
            "Move {} track {}@{} -> track {}@{}",
            cut.producer, src_track, src_start, dst_track, dst_start
        );
        self.place_cut(dst_track, dst_start, cut, mode)?;
        for group in &mut self.groups {
            group.move_clip((src_track, src_start), (dst_track, dst_start));
        }
        Ok(())
    }

    // ========================================================================
    // Resize
    // ========================================================================

    /// Move one edge of the cut at `start` to timeline frame `new_edge`: the
    /// new start for the head, the new end (exclusive) for the tail.
    ///
    /// Normal mode fails on a neighbor, overwrite consumes it, insert mode
    /// ripples: the cut keeps its start and what follows shifts. Returns the
    /// cut's start after the edit.
    pub fn resize_clip(
        &mut self,
        track: usize,
        start: i32,
        edge: Edge,
        new_edge: i32,
        mode: InsertMode,
    ) -> TimelineResult<i32> {
        self.apply("resize clip", |m| {
            let partner = m.split_partner(track, start);
            let new_start = m.resize_one(track, start, edge, new_edge, mode)?;
            if let Some((pt, ps)) = partner {
                m.resize_one(pt, ps, edge, new_edge + (ps - start), mode)?;
            }
            Ok(new_start)
        })
    }

    fn resize_one(&mut self, track: usize, start: i32, edge: Edge, new_edge: i32, mode: InsertMode) -> TimelineResult<i32> {
        self.editable(track)?;
        let index = self.cut_index(track, start)?;
        let current = self.tracks[track].playlist.entries()[index]
            .as_cut()
            .cloned()
            .ok_or_else(|| TimelineError::invalid(format!("no clip at frame {}", start)))?;
        let offset = new_edge
            .checked_sub(start)
            .and_then(|d| d.checked_add(current.in_frame))
            .ok_or_else(|| TimelineError::invalid(format!("resize edge {}", new_edge)))?;
        let (new_start, new_in, new_out) = match edge {
            Edge::Head => (new_edge, offset, current.out_frame),
            Edge::Tail => (start, current.in_frame, offset - 1),
        };
        if new_out < new_in {
            return Err(TimelineError::invalid(format!("resize of clip at {} to zero length", start)));
        }
        if new_start < 0 {
            return Err(TimelineError::invalid(format!("negative start {}", new_start)));
        }
        if new_in < 0 {
            return Err(TimelineError::OutOfRange(format!("in point {} before the media start", new_in)));
        }
        if let Some(max) = self.max_out(&current) {
            if new_out > max {
                return Err(TimelineError::OutOfRange(format!("out point {} past the media end {}", new_out, max)));
            }
        }
        debug!(
            "Resize track {}@{} {:?} -> {} ([{}, {}] -> [{}, {}])",
            track, start, edge, new_edge, current.in_frame, current.out_frame, new_in, new_out
        );

        if mode == InsertMode::Insert {
            let delta = (new_out - new_in) - (current.out_frame - current.in_frame);
            self.shift_groups(track, start + 1, delta);
            let speed = self.cut_speed(&current);
            let playlist = &mut self.tracks[track].playlist;
            if let (Some(speed), Some(cut)) = (speed, playlist.entry_mut(index).and_then(Entry::as_cut_mut)) {
                retime_speed_span(cut, speed, new_in, new_out);
            }
            playlist.resize_clip(index, new_in, new_out);
            if let Some(cut) = playlist.entry_mut(index).and_then(Entry::as_cut_mut) {
                cut.effects.sync_window(new_in, new_out);
            }
            let end = self.tracks[track].duration();
            self.touch(track, start, end);
            return Ok(start);
        }

        let mut cut = self.tracks[track]
            .playlist
            .replace_with_blank(index)
            .ok_or_else(|| TimelineError::invalid(format!("no clip at frame {}", start)))?;
        if let Some(speed) = self.cut_speed(&current) {
            retime_speed_span(&mut cut, speed, new_in, new_out);
        }
        cut.in_frame = new_in;
        cut.out_frame = new_out;
        cut.effects.sync_window(new_in, new_out);
        self.touch(track, start, start + current.length());
        self.place_cut(track, new_start, cut, mode)?;
        for group in &mut self.groups {
            group.move_clip((track, start), (track, new_start));
        }
        Ok(new_start)
    }

    // ========================================================================
    // Split
    // ========================================================================

    /// Cut the clip covering `at` in two. Returns false (and changes nothing)
    /// when `at` is a clip boundary or blank.
    pub fn split_clip(&mut self, track: usize, at: i32) -> TimelineResult<bool> {
        self.apply("split clip", |m| {
            m.editable(track)?;
            let Some((_, start, _)) = m.tracks[track].playlist.cut_at(at) else {
                return Ok(false);
            };
            if at == start {
                return Ok(false);
            }
            let partner = m.split_partner(track, start);
            m.split_one(track, at);
            if let Some((pt, ps)) = partner {
                m.editable(pt)?;
                let partner_at = ps + (at - start);
                m.split_one(pt, partner_at);
                m.groups.push(ClipGroup::new(vec![
                    GroupItem::Clip { track, start: at },
                    GroupItem::Clip {
                        track: pt,
                        start: partner_at,
                    },
                ]));
            }
            Ok(true)
        })
    }

    fn split_one(&mut self, track: usize, at: i32) {
        // window of the whole cut before the split, for speed-altered cuts
        let whole = self.tracks[track]
            .playlist
            .cut_at(at)
            .and_then(|(_, _, cut)| Some((self.cut_speed(cut)?, cut.clone())));
        let playlist = &mut self.tracks[track].playlist;
        let tail = playlist.split_at(at);
        for index in [tail.saturating_sub(1), tail] {
            if let Some(cut) = playlist.entry_mut(index).and_then(Entry::as_cut_mut) {
                let (in_frame, out_frame) = (cut.in_frame, cut.out_frame);
                if let Some((speed, original)) = &whole {
                    // each half keeps its own part of the normal-speed span
                    let mut retimed = original.clone();
                    retime_speed_span(&mut retimed, *speed, in_frame, out_frame);
                    cut.props = retimed.props;
                }
                // synced effect windows follow each half
                cut.effects.sync_window(in_frame, out_frame);
            }
        }
        debug!("Split track {} at {}", track, at);
        self.touch(track, at, at + 1);
    }

    // ========================================================================
    // Speed and state
    // ========================================================================

    /// Swap the cut's producer for a speed-altered one (speed 1 and strobe 1
    /// restore the normal instance). The cut keeps its start and covers the
    /// same source span; following cuts are not moved. Returns the new
    /// producer id.
    pub fn change_speed(&mut self, track: usize, start: i32, speed: f64, strobe: i32) -> TimelineResult<String> {
        if !speed.is_finite() || speed == 0.0 {
            return Err(TimelineError::invalid(format!("speed {}", speed)));
        }
        if strobe < 1 {
            return Err(TimelineError::invalid(format!("strobe {}", strobe)));
        }
        self.apply("change speed", |m| {
            let partner = m.split_partner(track, start);
            let producer = m.change_speed_one(track, start, speed, strobe)?;
            if let Some((pt, ps)) = partner {
                m.change_speed_one(pt, ps, speed, strobe)?;
            }
            Ok(producer)
        })
    }

    fn change_speed_one(&mut self, track: usize, start: i32, speed: f64, strobe: i32) -> TimelineResult<String> {
        self.editable(track)?;
        let index = self.cut_index(track, start)?;
        let current = self.tracks[track].playlist.entries()[index]
            .as_cut()
            .cloned()
            .ok_or_else(|| TimelineError::invalid(format!("no clip at frame {}", start)))?;
        let parsed = self.producer_id(&current);
        let current_speed = match parsed {
            ProducerId::Slowmotion { speed: current, .. } => current.abs(),
            _ => 1.0,
        };
        // span at normal speed
        let (orig_in, orig_len) = match (current.props.get_i32(P_SPEED_IN), current.props.get_i32(P_SPEED_LENGTH)) {
            (Some(i), Some(l)) => (i, l),
            _ => (
                (current.in_frame as f64 * current_speed).round() as i32,
                (current.length() as f64 * current_speed).round() as i32,
            ),
        };

        let mut cut = current.clone();
        if speed == 1.0 && strobe == 1 {
            cut.producer = self.registry.get_or_create(&current.clip_id, track, parsed.state())?;
            cut.in_frame = orig_in;
            cut.out_frame = orig_in + orig_len - 1;
            cut.props.remove(P_SPEED_IN);
            cut.props.remove(P_SPEED_LENGTH);
        } else {
            cut.producer = self
                .registry
                .get_slowmotion(&current.clip_id, speed, strobe, parsed.state())?;
            let len = (orig_len as f64 / speed.abs()).round().max(1.0) as i32;
            let new_in = (orig_in as f64 / speed.abs()).round() as i32;
            cut.in_frame = new_in;
            cut.out_frame = new_in + len - 1;
            cut.props.set_i32(P_SPEED_IN, orig_in);
            cut.props.set_i32(P_SPEED_LENGTH, orig_len);
        }
        cut.effects.sync_window(cut.in_frame, cut.out_frame);
        debug!(
            "Speed of track {}@{}: {} -> {} ({} frames)",
            track,
            start,
            current.producer,
            cut.producer,
            cut.length()
        );

        let producer = cut.producer.clone();
        self.tracks[track].playlist.replace_with_blank(index);
        self.touch(track, start, start + current.length());
        self.place_cut(track, start, cut, InsertMode::Normal)?;
        Ok(producer)
    }

    /// Switch the streams a cut plays. The producer is swapped for the
    /// matching split variant. The halves of an audio/video split keep
    /// their streams.
    pub fn set_state(&mut self, track: usize, start: i32, state: ClipState) -> TimelineResult<String> {
        self.apply("set clip state", |m| {
            m.editable(track)?;
            let state = m.state_for(track, state)?;
            let index = m.cut_index(track, start)?;
            let current = m.tracks[track].playlist.entries()[index]
                .as_cut()
                .cloned()
                .ok_or_else(|| TimelineError::invalid(format!("no clip at frame {}", start)))?;
            if m.split_partner(track, start).is_some() && m.producer_id(&current).state() != state {
                return Err(TimelineError::invalid(format!(
                    "clip at {} on track {} is half of an audio/video split",
                    start, track
                )));
            }
            let producer = match m.producer_id(&current) {
                ProducerId::Slowmotion { speed, strobe, .. } => {
                    m.registry.get_slowmotion(&current.clip_id, speed, strobe, state)?
                }
                _ => m.registry.get_or_create(&current.clip_id, track, state)?,
            };
            if let Some(cut) = m.tracks[track].playlist.entry_mut(index).and_then(Entry::as_cut_mut) {
                cut.producer = producer.clone();
            }
            m.touch(track, start, start + current.length());
            Ok(producer)
        })
    }

    /// Split a clip's audio onto `audio_track`: the cut becomes video-only
    /// and an audio-only twin is placed at the same start. The two are
    /// grouped and edited together from then on.
    pub fn split_audio(&mut self, track: usize, start: i32, audio_track: usize) -> TimelineResult<()> {
        self.apply("split audio", |m| {
            if !m.editable(track)?.is_video() {
                return Err(TimelineError::invalid(format!("track {} is not a video track", track)));
            }
            if !m.editable(audio_track)?.is_audio() {
                return Err(TimelineError::invalid(format!("track {} is not an audio track", audio_track)));
            }
            let index = m.cut_index(track, start)?;
            let current = m.tracks[track].playlist.entries()[index]
                .as_cut()
                .cloned()
                .ok_or_else(|| TimelineError::invalid(format!("no clip at frame {}", start)))?;
            if !m.registry.get_clip(&current.clip_id).is_some_and(|c| c.has_audio()) {
                return Err(TimelineError::invalid(format!("clip {} has no audio", current.clip_id)));
            }
            if m.producer_id(&current).is_slowmotion() {
                return Err(TimelineError::invalid("cannot split a speed-altered clip"));
            }

            let video = m.registry.get_or_create(&current.clip_id, track, ClipState::VideoOnly)?;
            if let Some(cut) = m.tracks[track].playlist.entry_mut(index).and_then(Entry::as_cut_mut) {
                cut.producer = video;
            }
            let mut audio = Cut::new(
                m.registry.get_or_create(&current.clip_id, audio_track, ClipState::AudioOnly)?,
                current.clip_id.clone(),
                current.in_frame,
                current.out_frame,
            );
            audio.props = current.props.clone();
            m.place_cut(audio_track, start, audio, InsertMode::Normal)?;
            m.touch(track, start, start + current.length());
            m.groups.push(ClipGroup::new(vec![
                GroupItem::Clip { track, start },
                GroupItem::Clip {
                    track: audio_track,
                    start,
                },
            ]));
            Ok(())
        })
    }
}

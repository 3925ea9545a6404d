//! Tractor: the composition graph handed to the renderer.
//!
//! The timeline never shares its tracks with the renderer. After every
//! successful edit it builds a [`TractorGraph`] (playlists with realized
//! filters, transitions in plant order) and publishes it through the
//! [`Tractor`] handle. The handle's lock is the field lock: renderer-side
//! reads block on it while a new graph is swapped in.
//!
//! Track layout: the model tracks in index order, then the overlay track when
//! one is set. The overlay is always the highest index.

use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::entities::effects::realize::{self, FilterInstance};
use crate::entities::keys::*;
use crate::entities::playlist::{Cut, Entry};
use crate::entities::track::{Track, HIDE_AUDIO, HIDE_VIDEO};
use crate::entities::{Properties, Transition};

/// Cut with its effects expanded to backend filters.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantedCut {
    pub producer: String,
    pub in_frame: i32,
    pub out_frame: i32,
    pub filters: Vec<FilterInstance>,
}

impl PlantedCut {
    fn from_cut(cut: &Cut) -> Self {
        Self {
            producer: cut.producer.clone(),
            in_frame: cut.in_frame,
            out_frame: cut.out_frame,
            filters: cut.effects.iter().flat_map(realize::expand).collect(),
        }
    }

    pub fn length(&self) -> i32 {
        self.out_frame - self.in_frame + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlantedEntry {
    Blank(i32),
    Cut(PlantedCut),
}

impl PlantedEntry {
    pub fn length(&self) -> i32 {
        match self {
            PlantedEntry::Blank(len) => *len,
            PlantedEntry::Cut(cut) => cut.length(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlantedTrack {
    pub hide: u8,
    pub audio: bool,
    pub entries: Vec<PlantedEntry>,
    pub filters: Vec<FilterInstance>,
}

impl PlantedTrack {
    fn from_track(track: &Track) -> Self {
        Self {
            hide: track.hide,
            audio: track.is_audio(),
            entries: track
                .playlist
                .entries()
                .iter()
                .map(|e| match e {
                    Entry::Blank(len) => PlantedEntry::Blank(*len),
                    Entry::Cut(cut) => PlantedEntry::Cut(PlantedCut::from_cut(cut)),
                })
                .collect(),
            filters: track.effects.iter().flat_map(realize::expand).collect(),
        }
    }

    /// Single-cut track shown above everything else.
    fn overlay(cut: &Cut) -> Self {
        Self {
            hide: HIDE_AUDIO,
            audio: false,
            entries: vec![PlantedEntry::Cut(PlantedCut::from_cut(cut))],
            filters: Vec::new(),
        }
    }

    pub fn duration(&self) -> i32 {
        self.entries.iter().map(PlantedEntry::length).sum()
    }

    /// Cut covering `frame` and the frame offset inside it.
    pub fn cut_at(&self, frame: i32) -> Option<(&PlantedCut, i32)> {
        let mut start = 0;
        for entry in &self.entries {
            let len = entry.length();
            if frame >= start && frame < start + len {
                return match entry {
                    PlantedEntry::Cut(cut) => Some((cut, frame - start)),
                    PlantedEntry::Blank(_) => None,
                };
            }
            start += len;
        }
        None
    }
}

/// Transition in backend form.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantedTransition {
    pub service: String,
    pub in_frame: i32,
    pub out_frame: i32,
    pub props: Properties,
}

impl PlantedTransition {
    pub fn from_transition(transition: &Transition) -> Self {
        Self {
            service: transition.tag.clone(),
            in_frame: transition.in_frame,
            out_frame: transition.out_frame,
            props: transition.stored_props(),
        }
    }

    pub fn a_track(&self) -> usize {
        self.props.get_i32_or(X_A_TRACK, 0).max(0) as usize
    }

    pub fn b_track(&self) -> usize {
        self.props.get_i32_or(X_B_TRACK, 0).max(0) as usize
    }
}

/// Everything the renderer needs to play the timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TractorGraph {
    pub tracks: Vec<PlantedTrack>,
    /// Field transitions, first planted first
    pub field: Vec<PlantedTransition>,
    pub duration: i32,
    pub has_overlay: bool,
}

impl TractorGraph {
    pub fn build(tracks: &[Track], field: &[Transition], overlay: Option<&Cut>, duration: i32) -> Self {
        let mut planted: Vec<PlantedTrack> = tracks.iter().map(PlantedTrack::from_track).collect();
        if let Some(cut) = overlay {
            planted.push(PlantedTrack::overlay(cut));
        }
        Self {
            tracks: planted,
            field: field.iter().map(PlantedTransition::from_transition).collect(),
            duration,
            has_overlay: overlay.is_some(),
        }
    }

    /// Timeline tracks, overlay excluded.
    pub fn model_track_count(&self) -> usize {
        self.tracks.len() - usize::from(self.has_overlay)
    }

    /// Top-most visible video cut at `frame`.
    pub fn visible_cut_at(&self, frame: i32) -> Option<(usize, &PlantedCut, i32)> {
        self.tracks
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, t)| !t.audio && t.hide & HIDE_VIDEO == 0)
            .find_map(|(i, t)| t.cut_at(frame).map(|(cut, offset)| (i, cut, offset)))
    }
}

/// Shared handle on the published graph.
#[derive(Debug, Clone, Default)]
pub struct Tractor {
    graph: Arc<RwLock<TractorGraph>>,
    revision: Arc<AtomicU64>,
}

impl Tractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new graph under the field lock.
    pub fn publish(&self, graph: TractorGraph) {
        let mut guard = self.graph.write().unwrap_or_else(|e| e.into_inner());
        *guard = graph;
        let rev = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Tractor revision {}: {} tracks, {} transitions", rev, guard.tracks.len(), guard.field.len());
    }

    /// Read the current graph under the field lock.
    pub fn read<R>(&self, f: impl FnOnce(&TractorGraph) -> R) -> R {
        let guard = self.graph.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    pub fn snapshot(&self) -> TractorGraph {
        self.read(TractorGraph::clone)
    }

    /// Number of graphs published so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn duration(&self) -> i32 {
        self.read(|g| g.duration)
    }
}

//! Playlist: one track's ordered sequence of cuts and blanks.
//!
//! Positions are implicit: an entry starts where the previous one ends, so the
//! playlist never has gaps. Frame intervals are half-open `[start, start+len)`;
//! on a shared boundary the right entry owns the frame.
//!
//! The primitives here never validate edit modes. Callers (the timeline) pick
//! the primitive matching the edit and finish with `consolidate_blanks()`.

use serde::{Deserialize, Serialize};

use super::attrs::Properties;
use super::effects::EffectChain;

/// Time slice of a producer instance placed into a playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    /// Producer instance id (`c1_2`, `slowmotion:c1:0.5:1:0`, ...)
    pub producer: String,
    /// Source clip the instance was made from
    pub clip_id: String,
    pub in_frame: i32,
    pub out_frame: i32,
    #[serde(default)]
    pub effects: EffectChain,
    #[serde(default)]
    pub props: Properties,
}

impl Cut {
    pub fn new(producer: impl Into<String>, clip_id: impl Into<String>, in_frame: i32, out_frame: i32) -> Self {
        Self {
            producer: producer.into(),
            clip_id: clip_id.into(),
            in_frame,
            out_frame,
            effects: EffectChain::default(),
            props: Properties::new(),
        }
    }

    pub fn length(&self) -> i32 {
        self.out_frame - self.in_frame + 1
    }
}

/// Playlist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    Blank(i32),
    Cut(Cut),
}

impl Entry {
    pub fn length(&self) -> i32 {
        match self {
            Entry::Blank(len) => *len,
            Entry::Cut(cut) => cut.length(),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Entry::Blank(_))
    }

    pub fn as_cut(&self) -> Option<&Cut> {
        match self {
            Entry::Cut(cut) => Some(cut),
            Entry::Blank(_) => None,
        }
    }

    pub fn as_cut_mut(&mut self) -> Option<&mut Cut> {
        match self {
            Entry::Cut(cut) => Some(cut),
            Entry::Blank(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    entries: Vec<Entry>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        let mut playlist = Self { entries };
        playlist.consolidate_blanks();
        playlist
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.entries.get_mut(index)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of cut and blank lengths.
    pub fn duration(&self) -> i32 {
        self.entries.iter().map(Entry::length).sum()
    }

    /// Entries with their start frames.
    pub fn positions(&self) -> impl Iterator<Item = (i32, &Entry)> {
        self.entries.iter().scan(0, |pos, entry| {
            let start = *pos;
            *pos += entry.length();
            Some((start, entry))
        })
    }

    /// Non-blank entries with their start frames.
    pub fn cuts(&self) -> impl Iterator<Item = (i32, &Cut)> {
        self.positions().filter_map(|(start, e)| e.as_cut().map(|c| (start, c)))
    }

    pub fn entry_start(&self, index: usize) -> i32 {
        self.entries.iter().take(index).map(Entry::length).sum()
    }

    /// Index of the entry whose `[start, start+len)` contains `frame`.
    pub fn clip_index_at(&self, frame: i32) -> Option<usize> {
        if frame < 0 {
            return None;
        }
        self.positions()
            .position(|(start, e)| frame >= start && frame < start + e.length())
    }

    /// Cut covering `frame`: (entry index, start frame, cut).
    pub fn cut_at(&self, frame: i32) -> Option<(usize, i32, &Cut)> {
        let index = self.clip_index_at(frame)?;
        let start = self.entry_start(index);
        self.entries[index].as_cut().map(|c| (index, start, c))
    }

    /// Index of the cut starting exactly at `start`.
    pub fn cut_index_starting_at(&self, start: i32) -> Option<usize> {
        self.positions()
            .position(|(pos, e)| pos == start && !e.is_blank())
    }

    /// Make sure an entry boundary exists at `frame` and return the index of
    /// the entry starting there. Beyond the end a blank is appended first, and
    /// the returned index equals `entries().len()`.
    pub fn split_at(&mut self, frame: i32) -> usize {
        let total = self.duration();
        if frame >= total {
            if frame > total {
                self.entries.push(Entry::Blank(frame - total));
            }
            return self.entries.len();
        }
        let Some(index) = self.clip_index_at(frame) else {
            return 0;
        };
        let offset = frame - self.entry_start(index);
        if offset == 0 {
            return index;
        }
        let tail = match &mut self.entries[index] {
            Entry::Blank(len) => {
                let rest = *len - offset;
                *len = offset;
                Entry::Blank(rest)
            }
            Entry::Cut(cut) => {
                let mut tail = cut.clone();
                tail.in_frame = cut.in_frame + offset;
                cut.out_frame = tail.in_frame - 1;
                Entry::Cut(tail)
            }
        };
        self.entries.insert(index + 1, tail);
        index + 1
    }

    /// Whether `[start, start+len)` holds only blanks (or lies past the end).
    pub fn is_blank_region(&self, start: i32, len: i32) -> bool {
        let end = start.saturating_add(len);
        self.positions()
            .filter(|(pos, e)| *pos < end && pos + e.length() > start)
            .all(|(_, e)| e.is_blank())
    }

    /// Insert an entry at `frame`, pushing everything after it to the right.
    pub fn insert_at(&mut self, frame: i32, entry: Entry) -> usize {
        let index = self.split_at(frame);
        self.entries.insert(index, entry);
        index
    }

    /// Turn `[start, start+len)` into a single blank and return its index.
    /// Cuts partially covered keep their outside parts.
    pub fn clear_region(&mut self, start: i32, len: i32) -> usize {
        let first = self.split_at(start);
        if len <= 0 {
            return first;
        }
        let last = self.split_at(start + len);
        self.entries.drain(first..last);
        self.entries.insert(first, Entry::Blank(len));
        first
    }

    /// Overwrite `[frame, frame+len)` with `cut`.
    pub fn place(&mut self, frame: i32, cut: Cut) -> usize {
        let index = self.clear_region(frame, cut.length());
        self.entries[index] = Entry::Cut(cut);
        index
    }

    /// Swap the cut at `index` for a blank of the same length.
    pub fn replace_with_blank(&mut self, index: usize) -> Option<Cut> {
        let entry = self.entries.get_mut(index)?;
        let len = entry.length();
        match std::mem::replace(entry, Entry::Blank(len)) {
            Entry::Cut(cut) => Some(cut),
            blank => {
                *entry = blank;
                None
            }
        }
    }

    /// Remove an entry, shifting everything after it to the left.
    pub fn remove_entry(&mut self, index: usize) -> Option<Entry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    /// Change a cut's source window. Following entries shift by the length
    /// difference.
    pub fn resize_clip(&mut self, index: usize, new_in: i32, new_out: i32) -> bool {
        if new_in > new_out || new_in < 0 {
            return false;
        }
        match self.entries.get_mut(index) {
            Some(Entry::Cut(cut)) => {
                cut.in_frame = new_in;
                cut.out_frame = new_out;
                true
            }
            _ => false,
        }
    }

    /// Merge adjacent blanks, drop empty ones and the trailing blank.
    pub fn consolidate_blanks(&mut self) {
        let mut merged: Vec<Entry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            match (merged.last_mut(), entry) {
                (_, Entry::Blank(len)) if len <= 0 => {}
                (Some(Entry::Blank(prev)), Entry::Blank(len)) => *prev += len,
                (_, entry) => merged.push(entry),
            }
        }
        while matches!(merged.last(), Some(Entry::Blank(_))) {
            merged.pop();
        }
        self.entries = merged;
    }

    /// Local structural checks.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut prev_blank = false;
        for (i, entry) in self.entries.iter().enumerate() {
            match entry {
                Entry::Blank(len) => {
                    if *len <= 0 {
                        return Err(format!("entry {}: blank of length {}", i, len));
                    }
                    if prev_blank {
                        return Err(format!("entry {}: adjacent blanks", i));
                    }
                    prev_blank = true;
                }
                Entry::Cut(cut) => {
                    if cut.in_frame < 0 || cut.in_frame > cut.out_frame {
                        return Err(format!(
                            "entry {}: invalid window {}..{}",
                            i, cut.in_frame, cut.out_frame
                        ));
                    }
                    prev_blank = false;
                }
            }
        }
        if prev_blank {
            return Err("trailing blank".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cut(id: &str, in_frame: i32, out_frame: i32) -> Cut {
        Cut::new(format!("{}_1", id), id, in_frame, out_frame)
    }

    fn layout(p: &Playlist) -> Vec<(i32, Option<String>, i32)> {
        p.positions()
            .map(|(s, e)| (s, e.as_cut().map(|c| c.clip_id.clone()), e.length()))
            .collect()
    }

    #[test]
    fn test_place_pads_with_blank() {
        let mut p = Playlist::new();
        p.place(10, cut("a", 0, 9));
        p.consolidate_blanks();
        assert_eq!(layout(&p), vec![(0, None, 10), (10, Some("a".into()), 10)]);
        assert_eq!(p.duration(), 20);
        assert!(p.check_invariants().is_ok());
    }

    #[test]
    fn test_split_keeps_source_continuity() {
        let mut p = Playlist::new();
        p.place(0, cut("a", 5, 104));
        let idx = p.split_at(30);
        assert_eq!(idx, 1);
        let left = p.entries()[0].as_cut().expect("cut");
        let right = p.entries()[1].as_cut().expect("cut");
        assert_eq!((left.in_frame, left.out_frame), (5, 34));
        assert_eq!((right.in_frame, right.out_frame), (35, 104));
        // boundary split adds nothing
        assert_eq!(p.split_at(30), 1);
        assert_eq!(p.entries().len(), 2);
    }

    #[test]
    fn test_clip_index_right_entry_owns_boundary() {
        let mut p = Playlist::new();
        p.place(0, cut("a", 0, 9));
        p.place(10, cut("b", 0, 9));
        assert_eq!(p.clip_index_at(9), Some(0));
        assert_eq!(p.clip_index_at(10), Some(1));
        assert_eq!(p.clip_index_at(20), None);
    }

    #[test]
    fn test_clear_region_and_blank_check() {
        let mut p = Playlist::new();
        p.place(0, cut("a", 0, 99));
        assert!(!p.is_blank_region(50, 10));
        p.clear_region(40, 20);
        p.consolidate_blanks();
        assert_eq!(
            layout(&p),
            vec![(0, Some("a".into()), 40), (40, None, 20), (60, Some("a".into()), 40)]
        );
        assert!(p.is_blank_region(40, 20));
        assert!(p.is_blank_region(500, 20));
        assert!(p.is_blank_region(i32::MAX - 5, 100));
        assert!(!p.is_blank_region(90, i32::MAX));
    }

    #[test]
    fn test_consolidate_merges_and_trims() {
        let mut p = Playlist::from_entries(vec![
            Entry::Blank(5),
            Entry::Blank(0),
            Entry::Blank(5),
            Entry::Cut(cut("a", 0, 4)),
            Entry::Blank(3),
        ]);
        p.consolidate_blanks();
        assert_eq!(layout(&p), vec![(0, None, 10), (10, Some("a".into()), 5)]);
    }

    #[test]
    fn test_insert_shifts_right() {
        let mut p = Playlist::new();
        p.place(0, cut("a", 0, 99));
        p.insert_at(50, Entry::Cut(cut("c", 0, 29)));
        assert_eq!(
            layout(&p),
            vec![(0, Some("a".into()), 50), (50, Some("c".into()), 30), (80, Some("a".into()), 50)]
        );
    }

    #[test]
    fn test_invariants_reject_bad_window() {
        let p = Playlist { entries: vec![Entry::Cut(cut("a", 10, 5))] };
        assert!(p.check_invariants().is_err());
    }
}

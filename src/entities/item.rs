//! Project items: bin folders, clips and sub-clips, clip groups, guides and
//! track target hints.

use serde::{Deserialize, Serialize};

/// Entry of the project bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectItem {
    Folder {
        id: String,
        name: String,
        parent: Option<String>,
    },
    Clip {
        clip_id: String,
        parent: Option<String>,
    },
    /// Named zone of a clip
    SubClip {
        clip_id: String,
        name: String,
        in_frame: i32,
        out_frame: i32,
    },
}

/// Folder hierarchy and sub-clips. Source clips themselves live in the
/// producer registry; the bin only records where they are filed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    items: Vec<ProjectItem>,
    next_folder: u32,
}

impl Bin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ProjectItem] {
        &self.items
    }

    /// Add a folder and return its id.
    pub fn add_folder(&mut self, name: impl Into<String>, parent: Option<&str>) -> String {
        self.next_folder += 1;
        let id = self.next_folder.to_string();
        self.insert_folder(id.clone(), name, parent.map(str::to_string));
        id
    }

    /// Add a folder with a known id (document load).
    pub fn insert_folder(&mut self, id: String, name: impl Into<String>, parent: Option<String>) {
        if let Ok(n) = id.parse::<u32>() {
            self.next_folder = self.next_folder.max(n);
        }
        self.items.push(ProjectItem::Folder {
            id,
            name: name.into(),
            parent,
        });
    }

    /// Remove a folder; its content moves to the folder's parent.
    pub fn remove_folder(&mut self, id: &str) -> bool {
        let Some(pos) = self
            .items
            .iter()
            .position(|i| matches!(i, ProjectItem::Folder { id: fid, .. } if fid == id))
        else {
            return false;
        };
        let removed = self.items.remove(pos);
        let new_parent = match removed {
            ProjectItem::Folder { parent, .. } => parent,
            _ => None,
        };
        for item in &mut self.items {
            match item {
                ProjectItem::Folder { parent, .. } | ProjectItem::Clip { parent, .. }
                    if parent.as_deref() == Some(id) =>
                {
                    *parent = new_parent.clone();
                }
                _ => {}
            }
        }
        true
    }

    pub fn folders(&self) -> impl Iterator<Item = (&str, &str, Option<&str>)> {
        self.items.iter().filter_map(|i| match i {
            ProjectItem::Folder { id, name, parent } => Some((id.as_str(), name.as_str(), parent.as_deref())),
            _ => None,
        })
    }

    pub fn add_clip(&mut self, clip_id: impl Into<String>, parent: Option<String>) {
        let clip_id = clip_id.into();
        if self.contains_clip(&clip_id) {
            self.move_clip(&clip_id, parent);
            return;
        }
        self.items.push(ProjectItem::Clip { clip_id, parent });
    }

    /// Remove a clip and its sub-clips.
    pub fn remove_clip(&mut self, clip_id: &str) {
        self.items.retain(|i| match i {
            ProjectItem::Clip { clip_id: c, .. } | ProjectItem::SubClip { clip_id: c, .. } => c != clip_id,
            _ => true,
        });
    }

    pub fn contains_clip(&self, clip_id: &str) -> bool {
        self.items
            .iter()
            .any(|i| matches!(i, ProjectItem::Clip { clip_id: c, .. } if c == clip_id))
    }

    pub fn move_clip(&mut self, clip_id: &str, folder: Option<String>) {
        for item in &mut self.items {
            if let ProjectItem::Clip { clip_id: c, parent } = item {
                if c == clip_id {
                    *parent = folder.clone();
                }
            }
        }
    }

    pub fn folder_of(&self, clip_id: &str) -> Option<&str> {
        self.items.iter().find_map(|i| match i {
            ProjectItem::Clip { clip_id: c, parent } if c == clip_id => parent.as_deref(),
            _ => None,
        })
    }

    pub fn clips_in<'a>(&'a self, folder: Option<&'a str>) -> impl Iterator<Item = &'a str> + 'a {
        self.items.iter().filter_map(move |i| match i {
            ProjectItem::Clip { clip_id, parent } if parent.as_deref() == folder => Some(clip_id.as_str()),
            _ => None,
        })
    }

    pub fn add_subclip(&mut self, clip_id: impl Into<String>, name: impl Into<String>, in_frame: i32, out_frame: i32) {
        self.items.push(ProjectItem::SubClip {
            clip_id: clip_id.into(),
            name: name.into(),
            in_frame,
            out_frame,
        });
    }

    pub fn subclips_of<'a>(&'a self, clip_id: &'a str) -> impl Iterator<Item = (&'a str, i32, i32)> + 'a {
        self.items.iter().filter_map(move |i| match i {
            ProjectItem::SubClip {
                clip_id: c,
                name,
                in_frame,
                out_frame,
            } if c == clip_id => Some((name.as_str(), *in_frame, *out_frame)),
            _ => None,
        })
    }
}

/// Member of a clip group, addressed by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupItem {
    Clip { track: usize, start: i32 },
    Transition { track: usize, start: i32 },
}

impl GroupItem {
    pub fn track(&self) -> usize {
        match self {
            GroupItem::Clip { track, .. } | GroupItem::Transition { track, .. } => *track,
        }
    }

    pub fn start(&self) -> i32 {
        match self {
            GroupItem::Clip { start, .. } | GroupItem::Transition { start, .. } => *start,
        }
    }
}

/// User grouping of timeline items that move together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipGroup {
    pub members: Vec<GroupItem>,
}

impl ClipGroup {
    pub fn new(members: Vec<GroupItem>) -> Self {
        Self { members }
    }

    pub fn contains_clip(&self, track: usize, start: i32) -> bool {
        self.members.contains(&GroupItem::Clip { track, start })
    }

    /// Rewrite track indices; members mapped to None are dropped.
    pub fn remap_tracks(&mut self, map: impl Fn(usize) -> Option<usize>) {
        self.members = self
            .members
            .iter()
            .filter_map(|m| {
                let track = map(m.track())?;
                Some(match *m {
                    GroupItem::Clip { start, .. } => GroupItem::Clip { track, start },
                    GroupItem::Transition { start, .. } => GroupItem::Transition { track, start },
                })
            })
            .collect();
    }

    /// Follow a clip that moved.
    pub fn move_clip(&mut self, from: (usize, i32), to: (usize, i32)) {
        for member in &mut self.members {
            if *member == (GroupItem::Clip { track: from.0, start: from.1 }) {
                *member = GroupItem::Clip { track: to.0, start: to.1 };
            }
        }
    }

    pub fn remove_clip(&mut self, track: usize, start: i32) {
        self.members.retain(|m| *m != GroupItem::Clip { track, start });
    }
}

/// Named point on the project timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guide {
    pub frame: i32,
    pub comment: String,
}

/// Preferred insertion tracks remembered by the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTargets {
    pub video: Option<usize>,
    pub audio: Option<usize>,
}

impl TrackTargets {
    pub fn remap(&mut self, map: impl Fn(usize) -> Option<usize>) {
        self.video = self.video.and_then(&map);
        self.audio = self.audio.and_then(&map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_removal_reparents() {
        let mut bin = Bin::new();
        let outer = bin.add_folder("Footage", None);
        let inner = bin.add_folder("Day 1", Some(&outer));
        bin.add_clip("c1", Some(inner.clone()));
        assert_eq!(bin.folder_of("c1"), Some(inner.as_str()));
        assert!(bin.remove_folder(&inner));
        assert_eq!(bin.folder_of("c1"), Some(outer.as_str()));
        assert_eq!(bin.clips_in(Some(&outer)).collect::<Vec<_>>(), vec!["c1"]);
    }

    #[test]
    fn test_folder_ids_continue_after_load() {
        let mut bin = Bin::new();
        bin.insert_folder("7".into(), "Loaded", None);
        assert_eq!(bin.add_folder("New", None), "8");
    }

    #[test]
    fn test_subclips_removed_with_clip() {
        let mut bin = Bin::new();
        bin.add_clip("c1", None);
        bin.add_subclip("c1", "intro", 0, 24);
        assert_eq!(bin.subclips_of("c1").count(), 1);
        bin.remove_clip("c1");
        assert!(bin.items().is_empty());
    }

    #[test]
    fn test_group_remap_drops_removed_track() {
        let mut g = ClipGroup::new(vec![
            GroupItem::Clip { track: 1, start: 0 },
            GroupItem::Clip { track: 2, start: 10 },
            GroupItem::Transition { track: 3, start: 5 },
        ]);
        g.remap_tracks(|t| match t {
            2 => None,
            t if t > 2 => Some(t - 1),
            t => Some(t),
        });
        assert_eq!(
            g.members,
            vec![GroupItem::Clip { track: 1, start: 0 }, GroupItem::Transition { track: 2, start: 5 }]
        );
    }

    #[test]
    fn test_targets_remap() {
        let mut t = TrackTargets { video: Some(3), audio: Some(1) };
        t.remap(|i| if i == 1 { None } else { Some(i + 1) });
        assert_eq!(t, TrackTargets { video: Some(4), audio: None });
    }
}

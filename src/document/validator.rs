//! Media and structure checks run on a document tree before it is loaded.
//!
//! [`DocumentValidator::validate`] never touches the tree; it returns a
//! [`RepairPlan`] listing each problem with its current state. Structural
//! problems (broken transitions and entries), luma files with a sibling on
//! disk and title fonts are fixed without asking. Missing media needs the
//! user: the plan can be searched for relocated files, then applied.

use log::info;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::search::{self, SearchTarget};
use super::xml::Element;
use crate::entities::attrs::format_number;
use crate::entities::keys::*;
use crate::entities::ProducerId;

static FONT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"font="([^"]*)""#).expect("font regex"));

/// Kinds of problem a document can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    MissingClip,
    MissingProxy,
    MissingSource,
    MissingLuma,
    MissingFont,
    InvalidTransition,
    InvalidEntry,
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProblemKind::MissingClip => "missing clip",
            ProblemKind::MissingProxy => "missing proxy",
            ProblemKind::MissingSource => "missing source",
            ProblemKind::MissingLuma => "missing luma",
            ProblemKind::MissingFont => "missing font",
            ProblemKind::InvalidTransition => "invalid transition",
            ProblemKind::InvalidEntry => "invalid entry",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    Missing,
    /// Relocated (or usable stand-in) file
    Found(PathBuf),
    /// Loaded as a placeholder keeping its id
    Placeholder,
    /// Proxy is rebuilt after load
    WillRegenerate,
    /// Replaced by the given value
    Fixed(String),
    Removed,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::Missing => f.write_str("missing"),
            ItemState::Found(path) => write!(f, "found: {}", path.display()),
            ItemState::Placeholder => f.write_str("placeholder"),
            ItemState::WillRegenerate => f.write_str("will regenerate"),
            ItemState::Fixed(value) => write!(f, "fixed: {}", value),
            ItemState::Removed => f.write_str("removed"),
        }
    }
}

/// Where in the tree an item applies.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    /// Master producer id
    Producer(String),
    /// Index among the tractor's transitions
    Transition(usize),
    /// Playlist id and child index
    Entry(String, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairItem {
    pub kind: ProblemKind,
    /// Clip id, `transition<N>` or `<playlist>:<N>`
    pub id: String,
    /// Missing path, font family or a short description
    pub path: String,
    pub state: ItemState,
    location: Location,
    size: Option<u64>,
    hash: Option<String>,
}

impl RepairItem {
    fn new(kind: ProblemKind, location: Location, path: impl Into<String>, state: ItemState) -> Self {
        let id = match &location {
            Location::Producer(id) => id.clone(),
            Location::Transition(n) => format!("transition{}", n),
            Location::Entry(playlist, n) => format!("{}:{}", playlist, n),
        };
        Self {
            kind,
            id,
            path: path.into(),
            state,
            location,
            size: None,
            hash: None,
        }
    }

    /// Applied without asking the user.
    pub fn is_automatic(&self) -> bool {
        match self.kind {
            ProblemKind::MissingFont | ProblemKind::InvalidTransition | ProblemKind::InvalidEntry => true,
            ProblemKind::MissingLuma => matches!(self.state, ItemState::Fixed(_)),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairPlan {
    pub items: Vec<RepairItem>,
}

impl RepairPlan {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Some repair needs the user's consent.
    pub fn requires_confirmation(&self) -> bool {
        self.items.iter().any(|i| !i.is_automatic())
    }

    pub fn count(&self, kind: ProblemKind) -> usize {
        self.items.iter().filter(|i| i.kind == kind).count()
    }

    /// Look for missing clips under `dir`. Returns how many were found.
    pub fn search(&mut self, dir: &Path) -> usize {
        let pending: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.kind == ProblemKind::MissingClip && i.state == ItemState::Missing)
            .map(|(n, _)| n)
            .collect();
        if pending.is_empty() {
            return 0;
        }
        let targets: Vec<SearchTarget> = pending
            .iter()
            .map(|&n| {
                let item = &self.items[n];
                SearchTarget::new(&item.path, item.size, item.hash.clone())
            })
            .collect();
        let mut found = 0;
        for (n, hit) in pending.into_iter().zip(search::search(dir, &targets)) {
            if let Some(hit) = hit {
                info!("Relinked {} to {}", self.items[n].path, hit.path.display());
                self.items[n].state = ItemState::Found(hit.path);
                found += 1;
            }
        }
        found
    }

    /// Apply every item to `root`. Missing clips nobody relinked become
    /// placeholders. Sets `modified=1` on the root when anything changed.
    pub fn apply(&mut self, root: &mut Element) -> bool {
        let mut changed = false;
        let mut dropped_transitions = Vec::new();
        let mut dropped_entries = Vec::new();

        for item in &mut self.items {
            match (&item.location, item.kind) {
                (Location::Producer(id), ProblemKind::MissingClip) => match &item.state {
                    ItemState::Found(path) => {
                        relink(root, id, &path.to_string_lossy());
                        changed = true;
                    }
                    ItemState::Missing => {
                        if let Some(master) = producer_mut(root, id) {
                            master.set_property(P_PLACEHOLDER, "1");
                        }
                        item.state = ItemState::Placeholder;
                        changed = true;
                    }
                    _ => {}
                },
                (Location::Producer(id), ProblemKind::MissingProxy) => {
                    drop_proxy(root, id);
                    changed = true;
                }
                (Location::Producer(id), ProblemKind::MissingSource) => {
                    if let Some(master) = producer_mut(root, id) {
                        master.set_property(P_MISSING_SOURCE, "1");
                    }
                    changed = true;
                }
                (Location::Producer(id), ProblemKind::MissingFont) => {
                    if let ItemState::Fixed(font) = &item.state {
                        if let Some(master) = producer_mut(root, id) {
                            let from = format!(r#"font="{}""#, item.path);
                            let to = format!(r#"font="{}""#, font);
                            if let Some(xml) = master.property(P_XMLDATA).map(|x| x.replace(&from, &to)) {
                                master.set_property(P_XMLDATA, xml);
                                changed = true;
                            }
                        }
                    }
                }
                (Location::Transition(n), ProblemKind::MissingLuma) => {
                    if let Some(transition) = transition_mut(root, *n) {
                        let key = luma_key(transition);
                        match &item.state {
                            ItemState::Fixed(path) => transition.set_property(key, path.clone()),
                            _ => {
                                transition.remove_property(key);
                                item.state = ItemState::Removed;
                            }
                        }
                        changed = true;
                    }
                }
                (Location::Transition(n), ProblemKind::InvalidTransition) => {
                    dropped_transitions.push(*n);
                }
                (Location::Entry(playlist, n), ProblemKind::InvalidEntry) => {
                    dropped_entries.push((playlist.clone(), *n));
                }
                _ => {}
            }
        }

        // highest index first so earlier positions stay valid
        dropped_transitions.sort_unstable_by(|a, b| b.cmp(a));
        if let Some(tractor) = root.child_mut("tractor") {
            for n in dropped_transitions {
                if let Some(pos) = transition_position(tractor, n) {
                    tractor.children.remove(pos);
                    changed = true;
                }
            }
        }
        dropped_entries.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        for (playlist, n) in dropped_entries {
            let Some(el) = root
                .children
                .iter_mut()
                .find(|c| c.name == "playlist" && c.attr("id") == Some(playlist.as_str()))
            else {
                continue;
            };
            if n >= el.children.len() {
                continue;
            }
            let entry = &el.children[n];
            let length = entry.attr_i32("out").unwrap_or(-1) - entry.attr_i32("in").unwrap_or(0) + 1;
            if length > 0 {
                el.children[n] = Element::new("blank").with_attr("length", length);
            } else {
                el.children.remove(n);
            }
            changed = true;
        }

        if changed {
            root.set_attr("modified", 1);
            info!("Applied {} document repairs", self.items.len());
        }
        changed
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentValidator {
    /// Font families installed on this system; empty skips the font check
    fonts: Vec<String>,
}

impl DocumentValidator {
    pub fn new(fonts: Vec<String>) -> Self {
        Self { fonts }
    }

    pub fn validate(&self, root: &Element) -> RepairPlan {
        let base = root.attr("root_path").map(PathBuf::from).unwrap_or_default();
        let mut plan = RepairPlan::default();
        self.check_producers(root, &base, &mut plan);
        check_transitions(root, &base, &mut plan);
        check_entries(root, &mut plan);
        if !plan.is_empty() {
            info!("Document check: {} problems", plan.items.len());
        }
        plan
    }

    fn check_producers(&self, root: &Element, base: &Path, plan: &mut RepairPlan) {
        for producer in root.children_named("producer").filter(|p| is_master(p)) {
            let Some(id) = producer.attr("id") else { continue };
            let service = prop_or_attr(producer, P_SERVICE).unwrap_or("");
            let resource = prop_or_attr(producer, P_RESOURCE).unwrap_or("");

            if service == "kdenlivetitle" {
                if let Some(xml) = producer.property(P_XMLDATA) {
                    self.check_fonts(id, xml, plan);
                }
            }
            if matches!(service, "color" | "colour") || (service == "kdenlivetitle" && resource.is_empty()) {
                continue;
            }

            let proxy = producer.property(P_PROXY).filter(|p| !p.is_empty() && *p != "-");
            if let Some(proxy) = proxy {
                let original = producer.property(P_ORIGINAL_URL).unwrap_or(resource);
                let proxy_ok = resolve(base, proxy).exists();
                let original_ok = resolve(base, original).exists();
                let location = Location::Producer(id.to_string());
                match (proxy_ok, original_ok) {
                    (true, true) => {}
                    (false, true) => plan.items.push(RepairItem::new(
                        ProblemKind::MissingProxy,
                        location,
                        proxy,
                        ItemState::WillRegenerate,
                    )),
                    (true, false) => plan.items.push(RepairItem::new(
                        ProblemKind::MissingSource,
                        location,
                        original,
                        ItemState::Found(resolve(base, proxy)),
                    )),
                    (false, false) => plan.items.push(missing_clip(producer, location, original)),
                }
                continue;
            }

            if resource.is_empty() {
                continue;
            }
            let checked = match service {
                "qimage" | "pixbuf" => strip_slideshow(resource),
                _ => resource,
            };
            if !resolve(base, checked).exists() {
                plan.items.push(missing_clip(producer, Location::Producer(id.to_string()), resource));
            }
        }
    }

    fn check_fonts(&self, id: &str, xml: &str, plan: &mut RepairPlan) {
        if self.fonts.is_empty() {
            return;
        }
        let mut seen = HashSet::new();
        for caps in FONT_RE.captures_iter(xml) {
            let family = &caps[1];
            if !seen.insert(family.to_string()) || self.fonts.iter().any(|f| f == family) {
                continue;
            }
            if let Some(nearest) = self.nearest_font(family) {
                plan.items.push(RepairItem::new(
                    ProblemKind::MissingFont,
                    Location::Producer(id.to_string()),
                    family,
                    ItemState::Fixed(nearest.to_string()),
                ));
            }
        }
    }

    /// Same family ignoring case, else same first word, else the first one.
    fn nearest_font(&self, family: &str) -> Option<&str> {
        let lower = family.to_lowercase();
        let first_word = lower.split_whitespace().next().unwrap_or("");
        self.fonts
            .iter()
            .find(|f| f.to_lowercase() == lower)
            .or_else(|| {
                self.fonts
                    .iter()
                    .find(|f| !first_word.is_empty() && f.to_lowercase().split_whitespace().next() == Some(first_word))
            })
            .or_else(|| self.fonts.first())
            .map(String::as_str)
    }
}

fn check_transitions(root: &Element, base: &Path, plan: &mut RepairPlan) {
    let Some(tractor) = root.child("tractor") else { return };
    let track_count = tractor.children_named("track").count();
    for (n, transition) in tractor.children_named("transition").enumerate() {
        let a = transition.property(X_A_TRACK).and_then(|v| v.trim().parse::<usize>().ok());
        let b = transition.property(X_B_TRACK).and_then(|v| v.trim().parse::<usize>().ok());
        let window = (transition.attr_i32("in"), transition.attr_i32("out"));
        let service = transition.property(P_SERVICE).unwrap_or("");
        let reason = match (a, b, window) {
            (Some(a), Some(b), _) if a >= b => Some(format!("{} on tracks {}/{}", service, a, b)),
            (Some(_), Some(b), _) if b >= track_count => Some(format!("{} on missing track {}", service, b)),
            (Some(_), Some(_), (Some(i), Some(o))) if i >= o => Some(format!("{} window {}..{}", service, i, o)),
            (Some(_), Some(_), (Some(_), Some(_))) => None,
            _ => Some(format!("{} without tracks or window", service)),
        };
        if let Some(reason) = reason {
            plan.items.push(RepairItem::new(
                ProblemKind::InvalidTransition,
                Location::Transition(n),
                reason,
                ItemState::Removed,
            ));
            continue;
        }

        let key = luma_key(transition);
        let Some(luma) = transition.property(key).filter(|l| !l.is_empty()) else {
            continue;
        };
        if resolve(base, luma).exists() {
            continue;
        }
        let state = swapped_luma(luma)
            .filter(|alt| resolve(base, alt).exists())
            .map(ItemState::Fixed)
            .unwrap_or(ItemState::Missing);
        plan.items.push(RepairItem::new(ProblemKind::MissingLuma, Location::Transition(n), luma, state));
    }
}

fn check_entries(root: &Element, plan: &mut RepairPlan) {
    let ids: HashSet<&str> = root.children_named("producer").filter_map(|p| p.attr("id")).collect();
    for playlist in root.children_named("playlist") {
        let Some(playlist_id) = playlist.attr("id") else { continue };
        for (n, entry) in playlist.children.iter().enumerate().filter(|(_, c)| c.name == "entry") {
            let producer = entry.attr("producer").unwrap_or("");
            let (in_frame, out_frame) = (entry.attr_i32("in").unwrap_or(0), entry.attr_i32("out").unwrap_or(-1));
            let reason = if !ids.contains(producer) {
                Some(format!("unknown producer {:?}", producer))
            } else if in_frame > out_frame {
                Some(format!("{} in {} after out {}", producer, in_frame, out_frame))
            } else {
                None
            };
            if let Some(reason) = reason {
                plan.items.push(RepairItem::new(
                    ProblemKind::InvalidEntry,
                    Location::Entry(playlist_id.to_string(), n),
                    reason,
                    ItemState::Removed,
                ));
            }
        }
    }
}

fn missing_clip(producer: &Element, location: Location, path: &str) -> RepairItem {
    let mut item = RepairItem::new(ProblemKind::MissingClip, location, path, ItemState::Missing);
    item.size = producer.property(P_FILE_SIZE).and_then(|s| s.trim().parse().ok());
    item.hash = producer.property(P_FILE_HASH).map(str::to_string);
    item
}

fn prop_or_attr<'a>(el: &'a Element, key: &str) -> Option<&'a str> {
    el.property(key).or_else(|| el.attr(key))
}

/// Master producers carry their own id as `kdenlive:id`.
fn is_master(producer: &Element) -> bool {
    match (producer.attr("id"), producer.property(P_CLIP_ID)) {
        (Some(BLACK_ID), _) | (None, _) => false,
        (Some(id), Some(clip_id)) => id == clip_id,
        (Some(_), None) => true,
    }
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_relative() && !base.as_os_str().is_empty() {
        base.join(p)
    } else {
        p.to_path_buf()
    }
}

/// Slideshow resources name a pattern; check the part before it.
fn strip_slideshow(resource: &str) -> &str {
    let resource = resource.split('?').next().unwrap_or(resource);
    match resource.find(".all.") {
        Some(pos) => &resource[..pos],
        None => resource,
    }
}

fn swapped_luma(path: &str) -> Option<String> {
    if let Some(stem) = path.strip_suffix(".pgm") {
        Some(format!("{}.png", stem))
    } else {
        path.strip_suffix(".png").map(|stem| format!("{}.pgm", stem))
    }
}

fn luma_key(transition: &Element) -> &'static str {
    match transition.property(P_SERVICE) {
        Some("composite") => X_LUMA,
        _ => P_RESOURCE,
    }
}

fn producer_mut<'a>(root: &'a mut Element, id: &str) -> Option<&'a mut Element> {
    root.children
        .iter_mut()
        .find(|c| c.name == "producer" && c.attr("id") == Some(id))
}

fn transition_position(tractor: &Element, n: usize) -> Option<usize> {
    tractor
        .children
        .iter()
        .enumerate()
        .filter(|(_, c)| c.name == "transition")
        .nth(n)
        .map(|(pos, _)| pos)
}

fn transition_mut(root: &mut Element, n: usize) -> Option<&mut Element> {
    let tractor = root.child_mut("tractor")?;
    let pos = transition_position(tractor, n)?;
    tractor.children.get_mut(pos)
}

/// Resource of an instance of `clip_id` pointing at `path`.
fn instance_resource(instance: &Element, clip_id: &str, path: &str) -> String {
    match instance.attr("id").and_then(|id| ProducerId::parse_with_parent(id, clip_id)) {
        Some(ProducerId::Slowmotion { speed, .. }) => format!("{}?{}", path, format_number(speed)),
        _ => path.to_string(),
    }
}

/// Point the master and all its instances at `path`.
fn retarget(root: &mut Element, clip_id: &str, path: &str) {
    for producer in root.children.iter_mut().filter(|c| c.name == "producer") {
        if producer.property(P_CLIP_ID) != Some(clip_id) && producer.attr("id") != Some(clip_id) {
            continue;
        }
        let resource = instance_resource(producer, clip_id, path);
        producer.attrs.shift_remove(P_RESOURCE);
        producer.set_property(P_RESOURCE, resource);
    }
}

fn relink(root: &mut Element, clip_id: &str, path: &str) {
    retarget(root, clip_id, path);
    if let Some(master) = producer_mut(root, clip_id) {
        if master.property(P_ORIGINAL_URL).is_some() {
            master.set_property(P_ORIGINAL_URL, path);
        }
    }
}

fn drop_proxy(root: &mut Element, clip_id: &str) {
    let Some(master) = producer_mut(root, clip_id) else { return };
    let original = master
        .property(P_ORIGINAL_URL)
        .or_else(|| master.property(P_RESOURCE))
        .unwrap_or("")
        .to_string();
    master.remove_property(P_PROXY);
    master.set_property(P_REPLACE_PROXY, "1");
    retarget(root, clip_id, &original);
}

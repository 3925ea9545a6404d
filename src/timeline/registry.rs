//! Producer registry: the project's source clips and their per-track copies.
//!
//! Every clip is held once, refcounted. Tracks never use a master directly:
//! [`ProducerRegistry::get_or_create`] manufactures one instance per
//! (clip, track, state) and caches it under its derived id. Speed-altered
//! instances are cached by `"<speed>:<strobe>:<state>:<resource>"`, first
//! caller wins.
//!
//! The built-in `black` clip feeds the background track and cannot be
//! released.

use indexmap::IndexMap;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::Path;

use super::hash;
use crate::core::event_bus::Notifier;
use crate::core::events::{ClipAvailable, ClipMissing, ClipModified, ClipReady};
use crate::document::xml::Element;
use crate::entities::attrs::format_number;
use crate::entities::keys::*;
use crate::entities::{ClipKind, ClipState, ProducerId, ProducerInstance, Properties, SourceClip};
use crate::error::{TimelineError, TimelineResult};

#[derive(Debug, Clone, PartialEq)]
struct ClipEntry {
    clip: SourceClip,
    refs: usize,
}

/// Slowmotion cache key.
pub fn slowmotion_key(speed: f64, strobe: i32, state: ClipState, resource: &str) -> String {
    format!("{}:{}:{}:{}", format_number(speed), strobe, state.code(), resource)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerRegistry {
    clips: IndexMap<String, ClipEntry>,
    instances: IndexMap<String, ProducerInstance>,
    /// Slowmotion key -> instance id
    slowmotion: HashMap<String, String>,
    next_id: u64,
    notifier: Notifier,
}

impl Default for ProducerRegistry {
    fn default() -> Self {
        Self::new(Notifier::silent())
    }
}

impl ProducerRegistry {
    pub fn new(notifier: Notifier) -> Self {
        let mut black = SourceClip::new(BLACK_ID, ClipKind::Color, BLACK_ID);
        black.props.set(P_NAME, "Black");
        let mut clips = IndexMap::new();
        clips.insert(BLACK_ID.to_string(), ClipEntry { clip: black, refs: 1 });
        Self {
            clips,
            instances: IndexMap::new(),
            slowmotion: HashMap::new(),
            next_id: 1,
            notifier,
        }
    }

    pub fn set_notifier(&mut self, notifier: Notifier) {
        self.notifier = notifier;
    }

    // ========================================================================
    // Source clips
    // ========================================================================

    /// Next free numeric clip id.
    pub fn next_clip_id(&self) -> String {
        self.next_id.to_string()
    }

    /// Register a clip with one reference (the bin's).
    pub fn add_clip(&mut self, clip: SourceClip) -> TimelineResult<String> {
        if self.clips.contains_key(&clip.id) {
            return Err(TimelineError::invalid(format!("clip {} already exists", clip.id)));
        }
        if let Ok(numeric) = clip.id.parse::<u64>() {
            self.next_id = self.next_id.max(numeric + 1);
        }
        let id = clip.id.clone();
        debug!("Registry: add clip {} ({:?}) {}", id, clip.kind, clip.resource());
        self.clips.insert(id.clone(), ClipEntry { clip, refs: 1 });
        self.notifier.emit(ClipReady { clip_id: id.clone() });
        Ok(id)
    }

    /// Register a clip described by a `<producer>` fragment. A missing id
    /// gets the next free one.
    pub fn add_clip_xml(&mut self, xml: &str) -> TimelineResult<String> {
        let element = Element::parse(xml)?;
        let id = match element.attr("id").or_else(|| element.property(P_CLIP_ID)) {
            Some(id) => id.to_string(),
            None => self.next_clip_id(),
        };
        self.add_clip(SourceClip::from_props(id, producer_props(&element)))
    }

    /// Replace a clip's properties from a `<producer>` fragment. Existing
    /// instances pick up the new resource and pass-through properties.
    pub fn replace_clip(&mut self, clip_id: &str, xml: &str) -> TimelineResult<()> {
        let element = Element::parse(xml)?;
        let entry = self
            .clips
            .get_mut(clip_id)
            .ok_or_else(|| TimelineError::MissingMedia(format!("clip {}", clip_id)))?;
        entry.clip = SourceClip::from_props(clip_id, producer_props(&element));
        let master = entry.clip.clone();
        self.refresh_instances(&master);
        self.notifier.emit(ClipModified {
            clip_id: clip_id.to_string(),
        });
        Ok(())
    }

    /// Set one property on a clip; pass-through keys reach every instance.
    pub fn set_clip_property(&mut self, clip_id: &str, key: &str, value: &str) -> TimelineResult<()> {
        let entry = self
            .clips
            .get_mut(clip_id)
            .ok_or_else(|| TimelineError::MissingMedia(format!("clip {}", clip_id)))?;
        entry.clip.props.set(key, value);
        if PASS_THROUGH.contains(&key) {
            for instance in self.instances.values_mut().filter(|i| i.clip_id == clip_id) {
                let forced = (key == P_VIDEO_INDEX && instance.state == ClipState::AudioOnly)
                    || (key == P_AUDIO_INDEX && instance.state == ClipState::VideoOnly);
                if !forced {
                    instance.props.set(key, value);
                }
            }
        }
        self.notifier.emit(ClipModified {
            clip_id: clip_id.to_string(),
        });
        Ok(())
    }

    /// Mutable access for repairs. Instances are not refreshed.
    pub fn clip_mut(&mut self, clip_id: &str) -> Option<&mut SourceClip> {
        self.clips.get_mut(clip_id).map(|e| &mut e.clip)
    }

    pub fn get_clip(&self, clip_id: &str) -> Option<&SourceClip> {
        self.clips.get(clip_id).map(|e| &e.clip)
    }

    pub fn contains_clip(&self, clip_id: &str) -> bool {
        self.clips.contains_key(clip_id)
    }

    /// User clips in registration order (`black` excluded).
    pub fn clips(&self) -> impl Iterator<Item = &SourceClip> {
        self.clips.values().map(|e| &e.clip).filter(|c| c.id != BLACK_ID)
    }

    /// Every clip, `black` first.
    pub fn all_clips(&self) -> impl Iterator<Item = &SourceClip> {
        self.clips.values().map(|e| &e.clip)
    }

    pub fn ref_count(&self, clip_id: &str) -> usize {
        self.clips.get(clip_id).map(|e| e.refs).unwrap_or(0)
    }

    pub fn add_ref(&mut self, clip_id: &str) -> TimelineResult<usize> {
        let entry = self
            .clips
            .get_mut(clip_id)
            .ok_or_else(|| TimelineError::MissingMedia(format!("clip {}", clip_id)))?;
        entry.refs += 1;
        Ok(entry.refs)
    }

    /// Drop one reference. At zero the clip and every instance made from it
    /// are disposed. Returns the remaining count.
    pub fn release(&mut self, clip_id: &str) -> TimelineResult<usize> {
        if clip_id == BLACK_ID {
            return Err(TimelineError::invalid("the background clip cannot be released"));
        }
        let entry = self
            .clips
            .get_mut(clip_id)
            .ok_or_else(|| TimelineError::MissingMedia(format!("clip {}", clip_id)))?;
        entry.refs = entry.refs.saturating_sub(1);
        let refs = entry.refs;
        if refs == 0 {
            self.clips.shift_remove(clip_id);
            self.instances.retain(|_, i| i.clip_id != clip_id);
            let instances = &self.instances;
            self.slowmotion.retain(|_, id| instances.contains_key(id));
            debug!("Registry: clip {} disposed", clip_id);
        }
        Ok(refs)
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Instance of `clip_id` for `track` in `state`, created on first use.
    pub fn get_or_create(&mut self, clip_id: &str, track: usize, state: ClipState) -> TimelineResult<String> {
        if clip_id == BLACK_ID {
            return Ok(BLACK_ID.to_string());
        }
        let id = ProducerId::track(clip_id, track, state);
        let key = id.to_string();
        if self.instances.contains_key(&key) {
            return Ok(key);
        }
        let master = self
            .get_clip(clip_id)
            .ok_or_else(|| TimelineError::MissingMedia(format!("clip {}", clip_id)))?;
        let instance = ProducerInstance::from_master(master, &id);
        debug!("Registry: new instance {}", key);
        self.instances.insert(key.clone(), instance);
        Ok(key)
    }

    /// Speed-altered instance, shared by every cut with the same key.
    pub fn get_slowmotion(&mut self, clip_id: &str, speed: f64, strobe: i32, state: ClipState) -> TimelineResult<String> {
        if speed == 0.0 || !speed.is_finite() {
            return Err(TimelineError::invalid(format!("speed {}", speed)));
        }
        if strobe < 1 {
            return Err(TimelineError::invalid(format!("strobe {}", strobe)));
        }
        let master = self
            .get_clip(clip_id)
            .ok_or_else(|| TimelineError::MissingMedia(format!("clip {}", clip_id)))?;
        let key = slowmotion_key(speed, strobe, state, master.resource());
        if let Some(existing) = self.slowmotion.get(&key) {
            if self.instances.contains_key(existing) {
                return Ok(existing.clone());
            }
        }
        let id = ProducerId::slowmotion(clip_id, speed, strobe, state);
        let instance = ProducerInstance::from_master(master, &id);
        let instance_id = instance.id.clone();
        self.instances.insert(instance_id.clone(), instance);
        self.slowmotion.remove(&key);
        self.store_slowmotion(&key, &instance_id);
        Ok(instance_id)
    }

    /// Cache a slowmotion instance under `key`; duplicates are dropped.
    pub fn store_slowmotion(&mut self, key: &str, producer: &str) -> bool {
        if self.slowmotion.contains_key(key) {
            return false;
        }
        self.slowmotion.insert(key.to_string(), producer.to_string());
        true
    }

    pub fn slowmotion_producer(&self, key: &str) -> Option<&str> {
        self.slowmotion.get(key).map(String::as_str)
    }

    /// Add an instance read from a document. Slowmotion instances are also
    /// registered in the slowmotion cache.
    pub fn insert_instance(&mut self, instance: ProducerInstance) {
        if let ProducerId::Slowmotion {
            speed, strobe, state, ..
        } = instance.parsed_id()
        {
            if let Some(master) = self.get_clip(&instance.clip_id) {
                let key = slowmotion_key(speed, strobe, state, master.resource());
                let id = instance.id.clone();
                self.store_slowmotion(&key, &id);
            }
        }
        self.instances.insert(instance.id.clone(), instance);
    }

    pub fn instance(&self, id: &str) -> Option<&ProducerInstance> {
        self.instances.get(id)
    }

    pub fn instance_mut(&mut self, id: &str) -> Option<&mut ProducerInstance> {
        self.instances.get_mut(id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &ProducerInstance> {
        self.instances.values()
    }

    /// Producer id usable by a cut: an instance or a master.
    pub fn resolves(&self, producer: &str) -> bool {
        self.instances.contains_key(producer) || self.clips.contains_key(producer)
    }

    /// Drop instances no cut references any more.
    pub fn retain_instances(&mut self, used: impl Fn(&str) -> bool) {
        self.instances.retain(|id, _| used(id));
        let instances = &self.instances;
        self.slowmotion.retain(|_, id| instances.contains_key(id));
    }

    /// Renumber track instances after tracks were inserted or removed.
    /// `map(old) == None` drops the track's instances. Returns old id -> new id
    /// for every instance that moved.
    pub fn remap_tracks(&mut self, map: impl Fn(usize) -> Option<usize>) -> HashMap<String, String> {
        let mut renamed = HashMap::new();
        let old = std::mem::take(&mut self.instances);
        for (id, mut instance) in old {
            let parsed = instance.parsed_id();
            let Some(track) = parsed.track_index() else {
                self.instances.insert(id, instance);
                continue;
            };
            let Some(new_track) = map(track) else {
                continue;
            };
            if new_track != track {
                let new_id = parsed.on_track(new_track).to_string();
                instance.id = new_id.clone();
                instance.track = Some(new_track);
                renamed.insert(id, new_id.clone());
                self.instances.insert(new_id, instance);
            } else {
                self.instances.insert(id, instance);
            }
        }
        renamed
    }

    fn refresh_instances(&mut self, master: &SourceClip) {
        for instance in self.instances.values_mut().filter(|i| i.clip_id == master.id) {
            let rebuilt = ProducerInstance::from_master(master, &instance.parsed_id());
            instance.props = rebuilt.props;
        }
    }

    // ========================================================================
    // Hashes, proxies, availability
    // ========================================================================

    /// Content hash of a clip, cached as `kdenlive:file_hash`.
    pub fn compute_hash(&mut self, clip_id: &str) -> TimelineResult<String> {
        let clip = self
            .get_clip(clip_id)
            .ok_or_else(|| TimelineError::MissingMedia(format!("clip {}", clip_id)))?;
        if let Some(cached) = clip.file_hash() {
            return Ok(cached.to_string());
        }
        let (digest, size) = match clip.defining_string() {
            Some(text) => (hash::string_hash(text), None),
            None => {
                let path = clip.original_url().to_string();
                match hash::file_hash(Path::new(&path)) {
                    Ok(digest) => (digest, std::fs::metadata(&path).ok().map(|m| m.len())),
                    Err(e) => {
                        warn!("Cannot hash clip {} ({}): {}", clip_id, path, e);
                        self.notifier.emit(ClipMissing {
                            clip_id: clip_id.to_string(),
                        });
                        return Err(TimelineError::MissingMedia(path));
                    }
                }
            }
        };
        if let Some(entry) = self.clips.get_mut(clip_id) {
            entry.clip.props.set(P_FILE_HASH, digest.clone());
            if let Some(size) = size {
                entry.clip.props.set(P_FILE_SIZE, size.to_string());
            }
        }
        Ok(digest)
    }

    /// Original path -> proxy path for every proxied clip.
    pub fn get_proxies(&self) -> IndexMap<String, String> {
        self.clips()
            .filter_map(|c| c.proxy().map(|p| (c.original_url().to_string(), p.to_string())))
            .collect()
    }

    /// Check every file-backed clip on disk and report its availability.
    pub fn refresh_availability(&self) -> Vec<String> {
        let mut missing = Vec::new();
        for clip in self.clips().filter(|c| c.defining_string().is_none()) {
            let clip_id = clip.id.clone();
            if Path::new(clip.resource()).exists() {
                self.notifier.emit(ClipAvailable { clip_id });
            } else {
                info!("Clip {} missing: {}", clip.id, clip.resource());
                missing.push(clip_id.clone());
                self.notifier.emit(ClipMissing { clip_id });
            }
        }
        missing
    }
}

/// Properties of a `<producer>` element, with `resource`/`mlt_service`
/// attributes folded in.
pub(crate) fn producer_props(element: &Element) -> Properties {
    let mut props = element.properties();
    for key in [P_RESOURCE, P_SERVICE, P_LENGTH] {
        if let Some(value) = element.attr(key) {
            if !props.contains(key) {
                props.set(key, value);
            }
        }
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::EventBus;

    fn registry() -> ProducerRegistry {
        let mut reg = ProducerRegistry::default();
        let mut av = SourceClip::new("c1", ClipKind::AV, "/media/a.mp4").with_length(100);
        av.props.set("force_fps", "25");
        av.props.set("meta.custom", "x");
        reg.add_clip(av).expect("add");
        reg
    }

    #[test]
    fn test_get_or_create_caches_per_track_and_state() {
        let mut reg = registry();
        let a = reg.get_or_create("c1", 1, ClipState::Original).expect("a");
        let b = reg.get_or_create("c1", 1, ClipState::Original).expect("b");
        assert_eq!(a, "c1_1");
        assert_eq!(a, b);
        let v = reg.get_or_create("c1", 2, ClipState::VideoOnly).expect("v");
        assert_eq!(v, "c1_2_video");
        assert_eq!(reg.instances().count(), 2);

        let inst = reg.instance(&v).expect("instance");
        assert_eq!(inst.props.get_i32(P_AUDIO_INDEX), Some(-1));
        assert_eq!(inst.props.get("force_fps"), Some("25"));
        assert!(!inst.props.contains("meta.custom"));
        assert!(matches!(
            reg.get_or_create("nope", 1, ClipState::Original),
            Err(TimelineError::MissingMedia(_))
        ));
    }

    #[test]
    fn test_slowmotion_shared_by_key() {
        let mut reg = registry();
        let a = reg.get_slowmotion("c1", 0.5, 1, ClipState::Original).expect("a");
        assert_eq!(a, "slowmotion:c1:0.5:1:0");
        let b = reg.get_slowmotion("c1", 0.5, 1, ClipState::Original).expect("b");
        assert_eq!(a, b);
        assert_eq!(reg.slowmotion_producer("0.5:1:0:/media/a.mp4"), Some(a.as_str()));
        assert!(!reg.store_slowmotion("0.5:1:0:/media/a.mp4", "other"));
        assert!(reg.get_slowmotion("c1", 0.0, 1, ClipState::Original).is_err());
    }

    #[test]
    fn test_release_disposes_at_zero() {
        let mut reg = registry();
        reg.get_or_create("c1", 1, ClipState::Original).expect("inst");
        reg.get_slowmotion("c1", 2.0, 1, ClipState::Original).expect("slow");
        assert_eq!(reg.add_ref("c1").expect("ref"), 2);
        assert_eq!(reg.release("c1").expect("release"), 1);
        assert!(reg.contains_clip("c1"));
        assert_eq!(reg.release("c1").expect("release"), 0);
        assert!(!reg.contains_clip("c1"));
        assert_eq!(reg.instances().count(), 0);
        assert!(reg.slowmotion_producer("2:1:0:/media/a.mp4").is_none());
        assert!(reg.release(BLACK_ID).is_err());
    }

    #[test]
    fn test_add_clip_xml_and_replace() {
        let bus = EventBus::new();
        let mut reg = ProducerRegistry::new(bus.notifier());
        let id = reg
            .add_clip_xml(
                r#"<producer><property name="resource">/m/b.wav</property>
                   <property name="mlt_service">avformat</property>
                   <property name="kdenlive:clip_type">2</property></producer>"#,
            )
            .expect("add");
        assert_eq!(id, "1");
        assert_eq!(reg.get_clip("1").map(|c| c.kind), Some(ClipKind::Audio));
        assert_eq!(reg.next_clip_id(), "2");
        assert_eq!(bus.drain::<ClipReady>().len(), 1);

        reg.get_or_create("1", 3, ClipState::AudioOnly).expect("inst");
        reg.replace_clip("1", r#"<producer resource="/m/c.wav" mlt_service="avformat"/>"#)
            .expect("replace");
        assert_eq!(reg.instance("1_3_audio").map(|i| i.resource()), Some("/m/c.wav"));
        assert_eq!(bus.drain::<ClipModified>().len(), 1);
        assert!(reg.add_clip_xml(r#"<producer id="1"/>"#).is_err());
    }

    #[test]
    fn test_remap_tracks_renames_and_drops() {
        let mut reg = registry();
        reg.get_or_create("c1", 1, ClipState::Original).expect("1");
        reg.get_or_create("c1", 2, ClipState::AudioOnly).expect("2");
        reg.get_slowmotion("c1", 0.5, 1, ClipState::Original).expect("slow");
        // track 1 removed, 2 moves down
        let renamed = reg.remap_tracks(|t| match t {
            1 => None,
            t if t > 1 => Some(t - 1),
            t => Some(t),
        });
        assert_eq!(renamed.get("c1_2_audio").map(String::as_str), Some("c1_1_audio"));
        assert!(reg.instance("c1_1").is_none());
        assert!(reg.instance("c1_1_audio").is_some());
        assert!(reg.instance("slowmotion:c1:0.5:1:0").is_some());
    }

    #[test]
    fn test_compute_hash_and_proxies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let media = dir.path().join("a.mp4");
        std::fs::write(&media, b"hello").expect("write");
        let mut reg = ProducerRegistry::default();
        let clip = SourceClip::new("5", ClipKind::AV, media.to_string_lossy()).with_proxy("/proxy/a.mp4");
        reg.add_clip(clip).expect("add");
        assert_eq!(reg.compute_hash("5").expect("hash"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(reg.get_clip("5").and_then(|c| c.props.get_i32(P_FILE_SIZE)), Some(5));
        let proxies = reg.get_proxies();
        assert_eq!(proxies.get(media.to_string_lossy().as_ref()).map(String::as_str), Some("/proxy/a.mp4"));

        reg.add_clip(SourceClip::new("6", ClipKind::Color, "0xff0000ff")).expect("color");
        assert_eq!(reg.compute_hash("6").expect("hash"), hash::string_hash("0xff0000ff"));

        reg.add_clip(SourceClip::new("7", ClipKind::AV, "/nonexistent.mp4")).expect("add");
        assert!(matches!(reg.compute_hash("7"), Err(TimelineError::MissingMedia(_))));
    }
}

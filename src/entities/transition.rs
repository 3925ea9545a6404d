//! Transitions: services composing an overlay track (`b_track`) onto an
//! underlying one (`a_track`) over a frame window.

use serde::{Deserialize, Serialize};

use super::attrs::Properties;
use super::effects::catalog::{self, Recipe};
use super::effects::params::{to_external, to_internal};
use super::keys::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Backend service (`composite`, `mix`, `luma`, ...)
    pub tag: String,
    /// Recipe id, stored as `kdenlive_id`
    pub id: String,
    pub a_track: usize,
    pub b_track: usize,
    pub in_frame: i32,
    pub out_frame: i32,
    /// Auto-added track composite rather than user-authored
    pub automatic: bool,
    pub force_track: bool,
    /// `internal_added` marker (237 track composite/mix, 200 multitrack)
    pub internal: Option<i32>,
    /// User-facing parameter values
    pub params: Properties,
}

impl Transition {
    pub fn new(tag: impl Into<String>, a_track: usize, b_track: usize, in_frame: i32, out_frame: i32) -> Self {
        let tag = tag.into();
        Self {
            id: tag.clone(),
            tag,
            a_track,
            b_track,
            in_frame,
            out_frame,
            automatic: false,
            force_track: false,
            internal: None,
            params: Properties::new(),
        }
    }

    /// Auto composite of `b_track` over `a_track`, always active.
    pub fn track_composite(a_track: usize, b_track: usize, out_frame: i32) -> Self {
        let mut t = Self::new("composite", a_track, b_track, 0, out_frame);
        t.internal = Some(INTERNAL_TRACK);
        t.automatic = true;
        t.params.set(X_ALWAYS_ACTIVE, "1");
        t.params.set("fill", "1");
        t
    }

    /// Auto audio mix of `b_track` into the background track.
    pub fn audio_mix(b_track: usize, out_frame: i32) -> Self {
        let mut t = Self::new("mix", 0, b_track, 0, out_frame);
        t.internal = Some(INTERNAL_TRACK);
        t.params.set(X_ALWAYS_ACTIVE, "1");
        t.params.set(X_COMBINE, "1");
        t
    }

    /// Multitrack preview quadrant.
    pub fn multitrack(b_track: usize, geometry: &str, out_frame: i32) -> Self {
        let mut t = Self::new("composite", 0, b_track, 0, out_frame);
        t.internal = Some(INTERNAL_MULTITRACK);
        t.params.set(X_ALWAYS_ACTIVE, "1");
        t.params.set(X_GEOMETRY, geometry);
        t
    }

    pub fn recipe(&self) -> Option<&'static Recipe> {
        catalog::transition(&self.id)
    }

    /// Managed by the editor rather than the user.
    pub fn is_internal(&self) -> bool {
        self.internal.is_some()
    }

    pub fn is_track_composite(&self) -> bool {
        self.internal == Some(INTERNAL_TRACK) && self.tag != "mix"
    }

    pub fn is_audio_mix(&self) -> bool {
        self.internal == Some(INTERNAL_TRACK) && self.tag == "mix"
    }

    pub fn is_multitrack(&self) -> bool {
        self.internal == Some(INTERNAL_MULTITRACK)
    }

    pub fn is_always_active(&self) -> bool {
        self.params.get_bool_or(X_ALWAYS_ACTIVE, false)
    }

    pub fn is_disabled(&self) -> bool {
        self.params.get_bool_or(X_DISABLE, false)
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        if disabled {
            self.params.set(X_DISABLE, "1");
        } else {
            self.params.remove(X_DISABLE);
        }
    }

    pub fn midpoint(&self) -> i32 {
        (self.in_frame + self.out_frame) / 2
    }

    pub fn contains(&self, frame: i32) -> bool {
        frame >= self.in_frame && frame <= self.out_frame
    }

    /// Plant-order key within one `b_track`: user transitions first, then
    /// by underlying track.
    pub fn plant_key(&self) -> (bool, usize) {
        (self.is_internal(), self.a_track)
    }

    /// Backend form: markers plus parameters normalized through the recipe.
    pub fn stored_props(&self) -> Properties {
        let mut props = Properties::new();
        props.set_i32(X_A_TRACK, self.a_track as i32);
        props.set_i32(X_B_TRACK, self.b_track as i32);
        props.set(X_ID, self.id.clone());
        if self.automatic {
            props.set(X_AUTOMATIC, "1");
        }
        if self.force_track {
            props.set(X_FORCE_TRACK, "1");
        }
        if let Some(marker) = self.internal {
            props.set_i32(X_INTERNAL, marker);
        }
        let recipe = self.recipe();
        for (name, value) in self.params.iter() {
            let stored = match recipe.and_then(|r| r.param(name)) {
                Some(def) => to_internal(def, value),
                None => value.to_string(),
            };
            props.set(name, stored);
        }
        props
    }

    /// Inverse of [`Transition::stored_props`].
    pub fn from_stored(service: &str, in_frame: i32, out_frame: i32, props: &Properties) -> Self {
        let a_track = props.get_i32(X_A_TRACK).unwrap_or(0).max(0) as usize;
        let b_track = props.get_i32(X_B_TRACK).unwrap_or(0).max(0) as usize;
        let mut t = Self::new(service, a_track, b_track, in_frame, out_frame);
        if let Some(id) = props.get_str(X_ID) {
            t.id = id.to_string();
        }
        t.automatic = props.get_bool_or(X_AUTOMATIC, false);
        t.force_track = props.get_bool_or(X_FORCE_TRACK, false);
        t.internal = props.get_i32(X_INTERNAL);
        let recipe = t.recipe();
        for (name, value) in props.iter() {
            if STORED_MARKERS.contains(&name) {
                continue;
            }
            let external = match recipe.and_then(|r| r.param(name)) {
                Some(def) => to_external(def, value),
                None => value.to_string(),
            };
            t.params.set(name, external);
        }
        t
    }
}

const STORED_MARKERS: &[&str] = &[
    X_A_TRACK,
    X_B_TRACK,
    X_ID,
    X_AUTOMATIC,
    X_FORCE_TRACK,
    X_INTERNAL,
    P_SERVICE,
    "in",
    "out",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_flavours() {
        let c = Transition::track_composite(1, 2, 99);
        assert!(c.is_track_composite() && !c.is_audio_mix());
        let m = Transition::audio_mix(3, 99);
        assert!(m.is_audio_mix() && !m.is_track_composite());
        assert_eq!(m.params.get(X_COMBINE), Some("1"));
        let q = Transition::multitrack(2, "0/0:50%x50%", 99);
        assert!(q.is_multitrack() && q.is_internal());
        assert!(!Transition::new("luma", 1, 2, 0, 10).is_internal());
    }

    #[test]
    fn test_plant_key_orders_internal_last() {
        let user = Transition::new("luma", 2, 3, 0, 10);
        let auto = Transition::track_composite(1, 3, 10);
        assert!(user.plant_key() < auto.plant_key());
    }

    #[test]
    fn test_stored_props_normalize_and_restore() {
        let mut wipe = Transition::new("luma", 1, 2, 10, 40);
        wipe.id = "luma".into();
        wipe.params.set("softness", "20");
        let stored = wipe.stored_props();
        assert_eq!(stored.get("softness"), Some("0.2"));
        assert_eq!(stored.get_i32(X_B_TRACK), Some(2));
        assert!(!stored.contains(X_INTERNAL));

        let back = Transition::from_stored("luma", 10, 40, &stored);
        assert_eq!(back, wipe);

        let auto = Transition::track_composite(1, 3, 99);
        assert_eq!(Transition::from_stored("composite", 0, 99, &auto.stored_props()), auto);
    }

    #[test]
    fn test_disable_toggle() {
        let mut c = Transition::track_composite(1, 2, 99);
        c.set_disabled(true);
        assert!(c.is_disabled());
        c.set_disabled(false);
        assert!(!c.params.contains(X_DISABLE));
    }
}

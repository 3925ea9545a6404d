//! Built-in effect and transition recipes.
//!
//! A recipe names the backend service and describes each parameter: kind,
//! default, and the `factor`/`offset` pair mapping the user-facing value onto
//! the value the backend stores. Effects or transitions without a recipe are
//! kept with raw parameters and written back untouched.

use std::collections::HashMap;
use std::sync::LazyLock;

/// How a parameter is stored and animated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Constant,
    Double,
    Bool,
    List,
    Color,
    /// `frame=value;...` in a single property
    SimpleKeyframe,
    /// Realized as a chain of filter instances, one per segment
    Keyframe,
    Geometry,
    /// Geometry parsed by the host, never normalized
    AddedGeometry,
    /// Not user editable
    Fixed,
}

/// Parameter description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDef {
    pub name: &'static str,
    pub kind: ParamKind,
    /// May reference `%width`, `%height`, `%fps`, `%dar`
    pub default: &'static str,
    pub factor: f64,
    pub offset: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Per-filter property holding the segment start value (keyframe chains)
    pub start_tag: &'static str,
    /// Per-filter property holding the segment end value (keyframe chains)
    pub end_tag: &'static str,
}

impl ParamDef {
    pub const fn new(name: &'static str, kind: ParamKind, default: &'static str) -> Self {
        Self {
            name,
            kind,
            default,
            factor: 1.0,
            offset: 0.0,
            min: None,
            max: None,
            start_tag: "",
            end_tag: "",
        }
    }

    pub const fn keyframe(name: &'static str, default: &'static str, start_tag: &'static str, end_tag: &'static str) -> Self {
        let mut def = Self::new(name, ParamKind::Keyframe, default);
        def.start_tag = start_tag;
        def.end_tag = end_tag;
        def
    }

    pub const fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub const fn offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Whether reading/writing goes through `factor`/`offset`.
    pub fn is_scaled(&self) -> bool {
        self.factor != 1.0 || self.offset != 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeKind {
    Effect,
    Transition,
}

/// Effect or transition recipe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recipe {
    /// Stored as `kdenlive_id`
    pub id: &'static str,
    /// Backend service name (`mlt_service`)
    pub tag: &'static str,
    pub name: &'static str,
    pub kind: RecipeKind,
    pub params: &'static [ParamDef],
}

impl Recipe {
    pub const fn effect(id: &'static str, tag: &'static str, name: &'static str, params: &'static [ParamDef]) -> Self {
        Self {
            id,
            tag,
            name,
            kind: RecipeKind::Effect,
            params,
        }
    }

    pub const fn transition(id: &'static str, tag: &'static str, name: &'static str, params: &'static [ParamDef]) -> Self {
        Self {
            id,
            tag,
            name,
            kind: RecipeKind::Transition,
            params,
        }
    }

    pub fn param(&self, name: &str) -> Option<&'static ParamDef> {
        self.params.iter().find(|p| p.name == name)
    }

    /// First parameter realized as a filter chain.
    pub fn keyframe_param(&self) -> Option<&'static ParamDef> {
        self.params.iter().find(|p| p.kind == ParamKind::Keyframe)
    }
}

use ParamKind::*;

// ============================================================================
// Effects
// ============================================================================

const VOLUME_PARAMS: &[ParamDef] = &[ParamDef::keyframe("gain", "100", "gain", "end").factor(100.0).range(0.0, 300.0)];

const BRIGHTNESS_PARAMS: &[ParamDef] = &[ParamDef::new("level", SimpleKeyframe, "100").factor(100.0).range(0.0, 300.0)];

const CROP_PARAMS: &[ParamDef] = &[
    ParamDef::new("top", Constant, "0").range(0.0, 10000.0),
    ParamDef::new("bottom", Constant, "0").range(0.0, 10000.0),
    ParamDef::new("left", Constant, "0").range(0.0, 10000.0),
    ParamDef::new("right", Constant, "0").range(0.0, 10000.0),
    ParamDef::new("center", Bool, "0"),
    ParamDef::new("use_profile", Bool, "0"),
];

const BOXBLUR_PARAMS: &[ParamDef] = &[
    ParamDef::new("hori", Constant, "2").range(0.0, 100.0),
    ParamDef::new("vert", Constant, "2").range(0.0, 100.0),
];

const FADEIN_PARAMS: &[ParamDef] = &[
    ParamDef::new("gain", Fixed, "0"),
    ParamDef::new("end", Fixed, "1"),
];

const FADEOUT_PARAMS: &[ParamDef] = &[
    ParamDef::new("gain", Fixed, "1"),
    ParamDef::new("end", Fixed, "0"),
];

const REGION_PARAMS: &[ParamDef] = &[
    ParamDef::new("resource", Constant, "rectangle"),
    ParamDef::new("composite.geometry", Geometry, "0/0:%widthx%height:100"),
];

const PAN_ZOOM_PARAMS: &[ParamDef] = &[
    ParamDef::new("transition.geometry", Geometry, "0/0:%widthx%height:100"),
    ParamDef::new("transition.rotate_center_x", Double, "%width/2"),
    ParamDef::new("transition.rotate_center_y", Double, "%height/2"),
    ParamDef::new("transition.distort", Bool, "0"),
];

pub static VOLUME: Recipe = Recipe::effect("volume", "volume", "Volume", VOLUME_PARAMS);
pub static BRIGHTNESS: Recipe = Recipe::effect("brightness", "brightness", "Brightness", BRIGHTNESS_PARAMS);
pub static CROP: Recipe = Recipe::effect("crop", "crop", "Crop", CROP_PARAMS);
pub static BOXBLUR: Recipe = Recipe::effect("boxblur", "boxblur", "Box Blur", BOXBLUR_PARAMS);
pub static FADEIN: Recipe = Recipe::effect("fadein", "volume", "Fade in", FADEIN_PARAMS);
pub static FADEOUT: Recipe = Recipe::effect("fadeout", "volume", "Fade out", FADEOUT_PARAMS);
pub static REGION: Recipe = Recipe::effect("region", "region", "Region", REGION_PARAMS);
pub static PAN_ZOOM: Recipe = Recipe::effect("pan_zoom", "affine", "Pan and Zoom", PAN_ZOOM_PARAMS);

// ============================================================================
// Transitions
// ============================================================================

const COMPOSITE_PARAMS: &[ParamDef] = &[
    ParamDef::new("geometry", AddedGeometry, "0/0:%widthx%height:100"),
    ParamDef::new("progressive", Bool, "1"),
    ParamDef::new("distort", Bool, "0"),
    ParamDef::new("fill", Bool, "1"),
    ParamDef::new("luma", Constant, ""),
    ParamDef::new("softness", Double, "0").factor(100.0).range(0.0, 100.0),
];

const LUMA_PARAMS: &[ParamDef] = &[
    ParamDef::new("resource", Constant, ""),
    ParamDef::new("softness", Double, "0").factor(100.0).range(0.0, 100.0),
    ParamDef::new("invert", Bool, "0"),
];

const DISSOLVE_PARAMS: &[ParamDef] = &[ParamDef::new("softness", Double, "0").factor(100.0).range(0.0, 100.0)];

const MIX_PARAMS: &[ParamDef] = &[ParamDef::new("start", Double, "0.5").range(0.0, 1.0)];

const CAIROBLEND_PARAMS: &[ParamDef] = &[
    ParamDef::new("0", Double, "100").factor(100.0).range(0.0, 100.0),
    ParamDef::new("1", List, "normal"),
];

pub static COMPOSITE: Recipe = Recipe::transition("composite", "composite", "Composite", COMPOSITE_PARAMS);
pub static LUMA: Recipe = Recipe::transition("luma", "luma", "Wipe", LUMA_PARAMS);
pub static DISSOLVE: Recipe = Recipe::transition("dissolve", "luma", "Dissolve", DISSOLVE_PARAMS);
pub static MIX: Recipe = Recipe::transition("mix", "mix", "Mix", MIX_PARAMS);
pub static CAIROBLEND: Recipe = Recipe::transition("frei0r.cairoblend", "frei0r.cairoblend", "Cairo Blend", CAIROBLEND_PARAMS);
pub static MOVIT_OVERLAY: Recipe = Recipe::transition("movit.overlay", "movit.overlay", "Overlay (GPU)", &[]);

const ALL: &[&Recipe] = &[
    &VOLUME,
    &BRIGHTNESS,
    &CROP,
    &BOXBLUR,
    &FADEIN,
    &FADEOUT,
    &REGION,
    &PAN_ZOOM,
    &COMPOSITE,
    &LUMA,
    &DISSOLVE,
    &MIX,
    &CAIROBLEND,
    &MOVIT_OVERLAY,
];

static EFFECT_INDEX: LazyLock<HashMap<&'static str, &'static Recipe>> = LazyLock::new(|| {
    ALL.iter()
        .filter(|r| r.kind == RecipeKind::Effect)
        .map(|r| (r.id, *r))
        .collect()
});

static TRANSITION_INDEX: LazyLock<HashMap<&'static str, &'static Recipe>> = LazyLock::new(|| {
    ALL.iter()
        .filter(|r| r.kind == RecipeKind::Transition)
        .map(|r| (r.id, *r))
        .collect()
});

/// Effect recipe by `kdenlive_id`.
pub fn effect(id: &str) -> Option<&'static Recipe> {
    EFFECT_INDEX.get(id).copied()
}

/// Transition recipe by `kdenlive_id`, falling back to the service tag.
pub fn transition(id: &str) -> Option<&'static Recipe> {
    TRANSITION_INDEX
        .get(id)
        .copied()
        .or_else(|| ALL.iter().copied().find(|r| r.kind == RecipeKind::Transition && r.tag == id))
}

pub fn effect_ids() -> impl Iterator<Item = &'static str> {
    ALL.iter().filter(|r| r.kind == RecipeKind::Effect).map(|r| r.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(effect("volume").map(|r| r.tag), Some("volume"));
        assert_eq!(effect("fadein").map(|r| r.tag), Some("volume"));
        assert!(effect("composite").is_none());
        assert_eq!(transition("dissolve").map(|r| r.tag), Some("luma"));
        // tag fallback for documents without kdenlive_id
        assert_eq!(transition("mix").map(|r| r.id), Some("mix"));
        assert!(transition("nope").is_none());
    }

    #[test]
    fn test_keyframe_param() {
        let kf = VOLUME.keyframe_param().expect("volume is a chain");
        assert_eq!((kf.start_tag, kf.end_tag), ("gain", "end"));
        assert!(kf.is_scaled());
        assert!(BRIGHTNESS.keyframe_param().is_none());
    }
}

//! Effect chains attached to a playlist entry or to a whole track.
//!
//! # Architecture
//!
//! ```text
//! Cut / Track
//!   └── effects: EffectChain
//!         ├── Effect { id: "volume", index: 1, params: {gain: "0=100;50=0;"} }
//!         └── Effect { id: "region", index: 2, children: [Effect { id: "boxblur" }] }
//!
//! realize::expand(effect) -> Vec<FilterInstance>   // backend form
//! realize::collapse(filters) -> Vec<Effect>         // back to the chain
//! ```
//!
//! The chain stores user-facing parameter values. Normalization (`factor`,
//! `offset`) and keyframe chains exist only in the realized filters.
//!
//! Ordinals (`kdenlive_ix`) are 1-based and dense; every mutation renumbers.

pub mod catalog;
pub mod keyframes;
pub mod params;
pub mod realize;
pub mod region;

use serde::{Deserialize, Serialize};

use crate::entities::attrs::Properties;
use crate::error::{TimelineError, TimelineResult};
use catalog::{ParamKind, Recipe};
use keyframes::Keyframes;
use params::{resolve_default, ParamContext};

// ============================================================================
// Effect
// ============================================================================

/// One filter on a clip or track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    /// Recipe id, stored as `kdenlive_id`
    pub id: String,
    /// Backend service
    pub tag: String,
    /// 1-based ordinal inside the host chain
    pub index: usize,
    pub enabled: bool,
    /// Active window in host (producer) frames
    pub window: Option<(i32, i32)>,
    /// Window follows the host clip's in/out on resize
    pub sync_in_out: bool,
    /// User-facing parameter values
    pub params: Properties,
    /// Sub-filters of a `region` effect
    #[serde(default)]
    pub children: Vec<Effect>,
}

impl Effect {
    /// Effect with raw parameters and no recipe behind it.
    pub fn raw(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            index: 0,
            enabled: true,
            window: None,
            sync_in_out: false,
            params: Properties::new(),
            children: Vec::new(),
        }
    }

    /// Effect with every recipe default evaluated against the profile.
    ///
    /// `simplekeyframe` parameters are seeded with a single keyframe at 0, and
    /// `crop` on a proxied clip defaults `use_profile` to 1.
    pub fn from_recipe(recipe: &Recipe, ctx: &ParamContext, host_has_proxy: bool) -> Self {
        let mut effect = Self::raw(recipe.id, recipe.tag);
        for def in recipe.params {
            let value = resolve_default(def.default, ctx);
            let value = match def.kind {
                ParamKind::SimpleKeyframe | ParamKind::Keyframe => format!("0={};", value),
                _ => value,
            };
            effect.params.set(def.name, value);
        }
        if recipe.tag == "crop" && host_has_proxy {
            effect.params.set("use_profile", "1");
        }
        effect
    }

    pub fn recipe(&self) -> Option<&'static Recipe> {
        catalog::effect(&self.id)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn set_param(&mut self, name: &str, value: impl Into<String>) {
        self.params.set(name, value);
    }

    /// Keyframes of an animated parameter.
    pub fn keyframes(&self, name: &str) -> Option<Keyframes> {
        self.params.get(name).filter(|v| v.contains('=')).map(Keyframes::parse)
    }

    pub fn with_window(mut self, in_frame: i32, out_frame: i32) -> Self {
        self.window = Some((in_frame, out_frame));
        self
    }

    pub fn with_sync(mut self) -> Self {
        self.sync_in_out = true;
        self
    }
}

// ============================================================================
// EffectChain
// ============================================================================

/// Ordered effects of one host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectChain {
    effects: Vec<Effect>,
}

impl EffectChain {
    /// Chain from loaded effects, ordered by their stored ordinal.
    pub fn from_effects(mut effects: Vec<Effect>) -> Self {
        effects.sort_by_key(|e| e.index);
        let mut chain = Self { effects };
        chain.renumber();
        chain
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    /// Effect at 1-based ordinal.
    pub fn get(&self, index: usize) -> Option<&Effect> {
        index.checked_sub(1).and_then(|i| self.effects.get(i))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Effect> {
        index.checked_sub(1).and_then(|i| self.effects.get_mut(i))
    }

    /// Append and return the new ordinal.
    pub fn add(&mut self, mut effect: Effect) -> usize {
        effect.index = self.effects.len() + 1;
        self.effects.push(effect);
        self.effects.len()
    }

    /// Replace the effect at `index`, keeping its window and sync flag.
    pub fn update(&mut self, index: usize, mut effect: Effect) -> TimelineResult<()> {
        let slot = self
            .get_mut(index)
            .ok_or_else(|| TimelineError::invalid(format!("no effect at ordinal {}", index)))?;
        effect.index = index;
        effect.window = slot.window;
        effect.sync_in_out = slot.sync_in_out;
        *slot = effect;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> TimelineResult<Effect> {
        if index == 0 || index > self.effects.len() {
            return Err(TimelineError::invalid(format!("no effect at ordinal {}", index)));
        }
        let removed = self.effects.remove(index - 1);
        self.renumber();
        Ok(removed)
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> TimelineResult<()> {
        let effect = self
            .get_mut(index)
            .ok_or_else(|| TimelineError::invalid(format!("no effect at ordinal {}", index)))?;
        effect.enabled = enabled;
        Ok(())
    }

    /// Move the effect at `from` to ordinal `to`.
    pub fn move_effect(&mut self, from: usize, to: usize) -> TimelineResult<()> {
        let len = self.effects.len();
        if from == 0 || from > len || to == 0 || to > len {
            return Err(TimelineError::invalid(format!("cannot move effect {} to {}", from, to)));
        }
        let effect = self.effects.remove(from - 1);
        self.effects.insert(to - 1, effect);
        self.renumber();
        Ok(())
    }

    /// Host clip window changed: synced effects follow it on either edge.
    pub fn sync_window(&mut self, new_in: i32, new_out: i32) {
        for effect in self.effects.iter_mut().filter(|e| e.sync_in_out) {
            effect.window = Some((new_in, new_out));
        }
    }

    fn renumber(&mut self) {
        for (i, effect) in self.effects.iter_mut().enumerate() {
            effect.index = i + 1;
        }
    }
}

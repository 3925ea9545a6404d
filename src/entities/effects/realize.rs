//! Conversion between effects and the filter instances the backend plants.
//!
//! `keyframe` parameters become one filter per segment, all sharing the
//! effect's `kdenlive_ix` and carrying `in`/`out` plus the segment's start and
//! end values under the recipe's `start_tag`/`end_tag`. Collapsing walks the
//! filters of one ordinal: the first contributes `in=start`, each contributes
//! `out=end`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::catalog::{self, ParamDef};
use super::keyframes::Keyframes;
use super::params::{to_external, to_internal};
use super::{region, Effect};
use crate::entities::attrs::Properties;
use crate::entities::keys::*;

/// A single backend filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterInstance {
    pub service: String,
    pub props: Properties,
}

impl FilterInstance {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            props: Properties::new(),
        }
    }

    pub fn ordinal(&self) -> Option<i32> {
        self.props.get_i32(F_INDEX)
    }

    pub fn is_disabled(&self) -> bool {
        self.props.get_bool_or(F_DISABLE, false)
    }
}

const RESERVED: &[&str] = &[F_ID, F_INDEX, F_DISABLE, F_SYNC, F_WINDOW_IN, F_WINDOW_OUT, "in", "out"];

/// Effect to backend filters.
pub fn expand(effect: &Effect) -> Vec<FilterInstance> {
    let recipe = effect.recipe();
    let chain_def = recipe.and_then(|r| r.keyframe_param());

    let mut base = Properties::new();
    base.set(F_ID, effect.id.clone());
    base.set_i32(F_INDEX, effect.index as i32);
    if !effect.enabled {
        base.set(F_DISABLE, "1");
    }
    if effect.sync_in_out {
        base.set(F_SYNC, "1");
    }
    for (name, value) in effect.params.iter() {
        if chain_def.is_some_and(|d| d.name == name) {
            continue;
        }
        let stored = match recipe.and_then(|r| r.param(name)) {
            Some(def) => to_internal(def, value),
            None => value.to_string(),
        };
        base.set(name, stored);
    }
    if !effect.children.is_empty() {
        region::flatten(&effect.children, &mut base);
    }

    if let Some(def) = chain_def {
        let raw = effect.param(def.name).unwrap_or(def.default);
        let kf = if raw.contains('=') {
            Keyframes::parse(raw)
        } else {
            let mut single = Keyframes::new();
            single.insert(effect.window.map(|w| w.0).unwrap_or(0), raw);
            single
        };
        let mut chain = keyframe_chain(&effect.tag, base, def, &kf);
        if let (Some((in_frame, out_frame)), Some(head)) = (effect.window, chain.first_mut()) {
            head.props.set_i32(F_WINDOW_IN, in_frame);
            head.props.set_i32(F_WINDOW_OUT, out_frame);
        }
        return chain;
    }

    if let Some((in_frame, out_frame)) = effect.window {
        base.set_i32("in", in_frame);
        base.set_i32("out", out_frame);
    }
    vec![FilterInstance {
        service: effect.tag.clone(),
        props: base,
    }]
}

fn keyframe_chain(service: &str, base: Properties, def: &ParamDef, kf: &Keyframes) -> Vec<FilterInstance> {
    let stored = kf.map_values(|v| to_internal(def, v));
    let points = stored.points();
    let filter = |props: Properties| FilterInstance {
        service: service.to_string(),
        props,
    };
    match points {
        [] => vec![filter(base)],
        [(frame, value)] => {
            let mut props = base;
            props.set_i32("in", *frame);
            props.set(def.start_tag, value.clone());
            props.set(def.end_tag, value.clone());
            vec![filter(props)]
        }
        _ => stored
            .segments()
            .map(|(a, b)| {
                let mut props = base.clone();
                props.set_i32("in", a.0);
                props.set_i32("out", b.0);
                props.set(def.start_tag, a.1.clone());
                props.set(def.end_tag, b.1.clone());
                filter(props)
            })
            .collect(),
    }
}

/// Backend filters back to effects, one per ordinal, in first-seen order.
pub fn collapse(filters: &[FilterInstance]) -> Vec<Effect> {
    let mut groups: IndexMap<(String, String), Vec<&FilterInstance>> = IndexMap::new();
    for (i, filter) in filters.iter().enumerate() {
        let id = filter.props.get(F_ID).unwrap_or(filter.service.as_str()).to_string();
        let key = match filter.ordinal() {
            Some(ix) => (ix.to_string(), id),
            None => (format!("#{}", i), id),
        };
        groups.entry(key).or_default().push(filter);
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(pos, ((_, id), group))| collapse_group(pos + 1, id, &group))
        .collect()
}

fn collapse_group(position: usize, id: String, group: &[&FilterInstance]) -> Effect {
    let first = group[0];
    let recipe = catalog::effect(&id);
    let chain_def = recipe.and_then(|r| r.keyframe_param());

    let mut effect = Effect::raw(id, first.service.clone());
    effect.index = first.ordinal().map(|ix| ix.max(1) as usize).unwrap_or(position);
    effect.enabled = !first.is_disabled();
    effect.sync_in_out = first.props.get_bool_or(F_SYNC, false);

    let consumed = if first.props.with_prefix("filter").next().is_some() {
        let (children, consumed) = region::unflatten(&first.props);
        effect.children = children;
        consumed
    } else {
        Vec::new()
    };

    for (name, value) in first.props.iter() {
        if RESERVED.contains(&name) || consumed.iter().any(|c| c == name) {
            continue;
        }
        if chain_def.is_some_and(|d| d.start_tag == name || d.end_tag == name) {
            continue;
        }
        let external = match recipe.and_then(|r| r.param(name)) {
            Some(def) => to_external(def, value),
            None => value.to_string(),
        };
        effect.params.set(name, external);
    }

    match chain_def {
        Some(def) => {
            let mut kf = Keyframes::new();
            if let Some(start) = first.props.get(def.start_tag) {
                kf.insert(first.props.get_i32_or("in", 0), to_external(def, start));
            }
            for filter in group {
                if let (Some(out), Some(end)) = (filter.props.get_i32("out"), filter.props.get(def.end_tag)) {
                    kf.insert(out, to_external(def, end));
                }
            }
            effect.params.set(def.name, kf.to_string());
            if let (Some(in_frame), Some(out_frame)) =
                (first.props.get_i32(F_WINDOW_IN), first.props.get_i32(F_WINDOW_OUT))
            {
                effect.window = Some((in_frame, out_frame));
            }
        }
        None => {
            if let (Some(in_frame), Some(out_frame)) = (first.props.get_i32("in"), first.props.get_i32("out")) {
                effect.window = Some((in_frame, out_frame));
            }
        }
    }
    effect
}

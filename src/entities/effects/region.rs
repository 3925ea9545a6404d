//! Region effects: a host filter carrying nested filters as numbered
//! property prefixes (`filter0`, `filter0.tag`, `filter0.kdenlive_id`,
//! `filter0.<param>`).

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::params::{to_external, to_internal};
use super::{catalog, Effect};
use crate::entities::attrs::Properties;

static CHILD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^filter([0-9]+)(?:\.(.+))?$").expect("region child regex"));

/// Write `children` into `props` with stored (normalized) values.
pub fn flatten(children: &[Effect], props: &mut Properties) {
    for (n, child) in children.iter().enumerate() {
        let prefix = format!("filter{}", n);
        props.set(prefix.clone(), child.tag.clone());
        props.set(format!("{}.tag", prefix), child.tag.clone());
        props.set(format!("{}.kdenlive_id", prefix), child.id.clone());
        if !child.enabled {
            props.set(format!("{}.disable", prefix), "1");
        }
        let recipe = child.recipe();
        for (name, value) in child.params.iter() {
            let stored = match recipe.and_then(|r| r.param(name)) {
                Some(def) => to_internal(def, value),
                None => value.to_string(),
            };
            props.set(format!("{}.{}", prefix, name), stored);
        }
    }
}

/// Rebuild the children and return them with the props that were consumed.
pub fn unflatten(props: &Properties) -> (Vec<Effect>, Vec<String>) {
    let mut groups: BTreeMap<usize, Vec<(String, String)>> = BTreeMap::new();
    let mut consumed = Vec::new();
    for (key, value) in props.iter() {
        let Some(caps) = CHILD_RE.captures(key) else {
            continue;
        };
        let Ok(n) = caps[1].parse::<usize>() else {
            continue;
        };
        consumed.push(key.to_string());
        let name = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        groups.entry(n).or_default().push((name, value.to_string()));
    }

    let children = groups
        .into_values()
        .enumerate()
        .map(|(i, fields)| {
            let field = |k: &str| fields.iter().find(|(n, _)| n == k).map(|(_, v)| v.clone());
            let tag = field("tag").or_else(|| field("")).unwrap_or_default();
            let id = field("kdenlive_id").unwrap_or_else(|| tag.clone());
            let mut child = Effect::raw(id, tag);
            child.index = i + 1;
            child.enabled = field("disable").as_deref() != Some("1");
            let recipe = catalog::effect(&child.id);
            for (name, value) in &fields {
                if matches!(name.as_str(), "" | "tag" | "kdenlive_id" | "disable") {
                    continue;
                }
                let external = match recipe.and_then(|r| r.param(name)) {
                    Some(def) => to_external(def, value),
                    None => value.clone(),
                };
                child.params.set(name.clone(), external);
            }
            child
        })
        .collect();
    (children, consumed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_then_unflatten_tree() {
        let mut blur = Effect::raw("boxblur", "boxblur");
        blur.params.set("hori", "4");
        let mut bright = Effect::raw("brightness", "brightness");
        bright.params.set("level", "0=50;");
        bright.enabled = false;

        let mut props = Properties::new();
        props.set("resource", "rectangle");
        flatten(&[blur, bright], &mut props);
        // brightness level stored normalized
        assert_eq!(props.get("filter1.level"), Some("0=0.5;"));
        assert_eq!(props.get("filter0"), Some("boxblur"));

        let (children, consumed) = unflatten(&props);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].param("hori"), Some("4"));
        assert_eq!(children[1].param("level"), Some("0=50;"));
        assert!(!children[1].enabled);
        assert!(!consumed.contains(&"resource".to_string()));
    }

    #[test]
    fn test_children_ordered_numerically() {
        let props: Properties = [
            ("filter10.tag", "b"),
            ("filter2.tag", "a"),
        ]
        .into_iter()
        .collect();
        let (children, _) = unflatten(&props);
        let tags: Vec<&str> = children.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(tags, vec!["a", "b"]);
    }
}

//! String-valued property storage shared by producers, filters and transitions.
//!
//! The rendering backend stores every property as a string, so this container
//! does the same and offers typed accessors on top. Insertion order is kept so
//! that documents round-trip with their properties in the order they were read.
//!
//! Used by SourceClip, ProducerInstance, Cut, Effect, Transition, Project.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Property container: name → string value, insertion ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    map: IndexMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn set_i32(&mut self, key: impl Into<String>, value: i32) {
        self.set(key, value.to_string());
    }

    pub fn set_f64(&mut self, key: impl Into<String>, value: f64) {
        self.set(key, format_number(value));
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, if value { "1" } else { "0" });
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Non-empty string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|s| !s.is_empty())
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        let raw = self.get(key)?.trim();
        raw.parse::<i32>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().map(|v| v.round() as i32))
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.trim().parse::<f64>().ok()
    }

    /// "1"/"true" are true, anything else parsed as a number is true when non-zero.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        let raw = self.get(key)?.trim();
        match raw {
            "true" => Some(true),
            "false" | "" => Some(false),
            other => other.parse::<f64>().ok().map(|v| v != 0.0),
        }
    }

    pub fn get_i32_or(&self, key: &str, default: i32) -> i32 {
        self.get_i32(key).unwrap_or(default)
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> f64 {
        self.get_f64(key).unwrap_or(default)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Properties whose name starts with `prefix`, prefix stripped.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.iter()
            .filter_map(move |(k, v)| k.strip_prefix(prefix).map(|rest| (rest, v)))
    }

    /// Copy `keys` from `other` when present there.
    pub fn inherit(&mut self, other: &Properties, keys: &[&str]) {
        for key in keys {
            if let Some(value) = other.get(key) {
                self.set(*key, value);
            }
        }
    }

    /// Copy every property of `other`, overwriting existing ones.
    pub fn merge(&mut self, other: &Properties) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Order-independent hash of the content, used to detect edits.
    pub fn hash_all(&self) -> u64 {
        let mut keys: Vec<&String> = self.map.keys().collect();
        keys.sort_unstable();
        let mut hasher = DefaultHasher::new();
        for key in keys {
            key.hash(&mut hasher);
            self.map[key].hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (k, v) in iter {
            props.set(k, v);
        }
        props
    }
}

/// Format a number the way documents store it: integers without a fraction,
/// everything else rounded to 6 decimals with trailing zeros trimmed.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let rounded = (value * 1_000_000.0).round() / 1_000_000.0;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        return format!("{}", rounded as i64);
    }
    let text = format!("{:.6}", rounded);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" { "0".to_string() } else { text.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut p = Properties::new();
        p.set_i32("in", 12);
        p.set_f64("speed", 0.5);
        p.set_bool("disable", true);
        p.set("resource", "/media/a.mov");

        assert_eq!(p.get_i32("in"), Some(12));
        assert_eq!(p.get_f64("speed"), Some(0.5));
        assert_eq!(p.get_bool("disable"), Some(true));
        assert_eq!(p.get_str("resource"), Some("/media/a.mov"));
        assert_eq!(p.get_i32_or("missing", 7), 7);
    }

    #[test]
    fn test_insertion_order_kept_after_remove() {
        let mut p = Properties::new();
        p.set("a", "1");
        p.set("b", "2");
        p.set("c", "3");
        p.remove("b");
        let keys: Vec<&str> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_prefix_and_inherit() {
        let mut p = Properties::new();
        p.set("filter0.tag", "brightness");
        p.set("filter0.level", "0.5");
        p.set("filter1.tag", "boxblur");
        let sub: Vec<(&str, &str)> = p.with_prefix("filter0.").collect();
        assert_eq!(sub, vec![("tag", "brightness"), ("level", "0.5")]);

        let mut q = Properties::new();
        q.inherit(&p, &["filter1.tag", "nope"]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(50.0), "50");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(0.07 * 100.0), "7");
        assert_eq!(format_number(-0.0000001), "0");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn test_hash_ignores_order() {
        let a: Properties = [("x", "1"), ("y", "2")].into_iter().collect();
        let b: Properties = [("y", "2"), ("x", "1")].into_iter().collect();
        assert_eq!(a.hash_all(), b.hash_all());
    }
}

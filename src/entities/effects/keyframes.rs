//! Keyframe lists: ordered `frame=value` pairs, serialized as `f=v;f=v;`.
//!
//! The collapsed list is the canonical form. Filter chains are derived from it
//! only when effects are realized for the backend.

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Keyframes {
    points: Vec<(i32, String)>,
}

impl Keyframes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `f=v;f=v`. Malformed pairs are skipped, duplicate frames keep
    /// the last value, output is sorted by frame.
    pub fn parse(text: &str) -> Self {
        let mut kf = Self::new();
        for pair in text.split(';') {
            let Some((frame, value)) = pair.split_once('=') else {
                continue;
            };
            if let Ok(frame) = frame.trim().parse::<i32>() {
                kf.insert(frame, value.trim());
            }
        }
        kf
    }

    pub fn insert(&mut self, frame: i32, value: impl Into<String>) {
        let value = value.into();
        match self.points.binary_search_by_key(&frame, |p| p.0) {
            Ok(i) => self.points[i].1 = value,
            Err(i) => self.points.insert(i, (frame, value)),
        }
    }

    pub fn remove(&mut self, frame: i32) -> Option<String> {
        let i = self.points.iter().position(|p| p.0 == frame)?;
        Some(self.points.remove(i).1)
    }

    pub fn points(&self) -> &[(i32, String)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn map_values(&self, f: impl Fn(&str) -> String) -> Self {
        Self {
            points: self.points.iter().map(|(k, v)| (*k, f(v))).collect(),
        }
    }

    /// Move every keyframe by `delta` frames.
    pub fn shifted(&self, delta: i32) -> Self {
        Self {
            points: self.points.iter().map(|(k, v)| (k + delta, v.clone())).collect(),
        }
    }

    /// Linear interpolation, clamped to the first/last keyframe.
    pub fn value_at(&self, frame: i32) -> Option<f64> {
        let numeric: Vec<(i32, f64)> = self
            .points
            .iter()
            .filter_map(|(k, v)| v.parse::<f64>().ok().map(|v| (*k, v)))
            .collect();
        let first = numeric.first()?;
        if frame <= first.0 {
            return Some(first.1);
        }
        for pair in numeric.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if frame <= b.0 {
                let t = (frame - a.0) as f64 / (b.0 - a.0).max(1) as f64;
                return Some(a.1 + (b.1 - a.1) * t);
            }
        }
        numeric.last().map(|p| p.1)
    }

    /// Consecutive pairs, one per chain segment.
    pub fn segments(&self) -> impl Iterator<Item = (&(i32, String), &(i32, String))> {
        self.points.windows(2).map(|w| (&w[0], &w[1]))
    }
}

impl fmt::Display for Keyframes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (frame, value) in &self.points {
            write!(f, "{}={};", frame, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sorts_and_formats() {
        let kf = Keyframes::parse("50=0.5;0=1;bad;100=0");
        assert_eq!(kf.len(), 3);
        assert_eq!(kf.to_string(), "0=1;50=0.5;100=0;");
    }

    #[test]
    fn test_interpolation() {
        let kf = Keyframes::parse("0=0;100=1;");
        assert_eq!(kf.value_at(-5), Some(0.0));
        assert_eq!(kf.value_at(25), Some(0.25));
        assert_eq!(kf.value_at(400), Some(1.0));
        assert_eq!(Keyframes::new().value_at(0), None);
    }

    #[test]
    fn test_segments() {
        let kf = Keyframes::parse("0=1;10=2;30=0;");
        let segs: Vec<(i32, i32)> = kf.segments().map(|(a, b)| (a.0, b.0)).collect();
        assert_eq!(segs, vec![(0, 10), (10, 30)]);
        assert_eq!(kf.shifted(5).points()[0].0, 5);
    }
}

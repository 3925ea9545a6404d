//! Project video profile: frame size, frame rate, display aspect.
//!
//! A single frame rate is fixed per project; every position and duration in
//! the timeline is an integer frame count at this rate.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub dar_num: u32,
    pub dar_den: u32,
}

/// (name, width, height, fps_num, fps_den, dar_num, dar_den)
const BUILTIN: &[(&str, u32, u32, u32, u32, u32, u32)] = &[
    ("dv_pal", 720, 576, 25, 1, 4, 3),
    ("dv_ntsc", 720, 480, 30000, 1001, 4, 3),
    ("hdv_720_25p", 1280, 720, 25, 1, 16, 9),
    ("atsc_1080p_25", 1920, 1080, 25, 1, 16, 9),
    ("atsc_1080p_2997", 1920, 1080, 30000, 1001, 16, 9),
    ("atsc_1080p_30", 1920, 1080, 30, 1, 16, 9),
];

impl Default for Profile {
    fn default() -> Self {
        Self::by_name("dv_pal").unwrap_or_else(|| Profile::custom(720, 576, 25.0))
    }
}

impl Profile {
    /// Look up a built-in profile.
    pub fn by_name(name: &str) -> Option<Self> {
        BUILTIN
            .iter()
            .find(|p| p.0 == name)
            .map(|&(name, width, height, fps_num, fps_den, dar_num, dar_den)| Self {
                name: name.to_string(),
                width,
                height,
                fps_num,
                fps_den,
                dar_num,
                dar_den,
            })
    }

    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN.iter().map(|p| p.0)
    }

    /// Profile with square display aspect derived from the frame size.
    pub fn custom(width: u32, height: u32, fps: f64) -> Self {
        let (fps_num, fps_den) = fps_to_rational(fps);
        Self {
            name: format!("custom_{}x{}_{}", width, height, crate::entities::attrs::format_number(fps)),
            width,
            height,
            fps_num,
            fps_den,
            dar_num: width,
            dar_den: height.max(1),
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps_num as f64 / self.fps_den.max(1) as f64
    }

    pub fn dar(&self) -> f64 {
        self.dar_num as f64 / self.dar_den.max(1) as f64
    }

    pub fn frames_to_seconds(&self, frames: i32) -> f64 {
        frames as f64 / self.fps()
    }

    /// Seconds to the nearest frame.
    pub fn seconds_to_frames(&self, seconds: f64) -> i32 {
        (seconds * self.fps()).round() as i32
    }

    /// Apply explicit overrides read from a document root.
    pub fn with_overrides(mut self, fps: Option<f64>, width: Option<u32>, height: Option<u32>, dar: Option<f64>) -> Self {
        if let Some(fps) = fps.filter(|f| *f > 0.0) {
            if (fps - self.fps()).abs() > 1e-6 {
                let (num, den) = fps_to_rational(fps);
                self.fps_num = num;
                self.fps_den = den;
            }
        }
        if let Some(w) = width.filter(|w| *w > 0) {
            self.width = w;
        }
        if let Some(h) = height.filter(|h| *h > 0) {
            self.height = h;
        }
        if let Some(dar) = dar.filter(|d| *d > 0.0) {
            if (dar - self.dar()).abs() > 1e-3 {
                self.dar_num = (dar * 1000.0).round() as u32;
                self.dar_den = 1000;
            }
        }
        self
    }
}

/// NTSC-style rates map onto their /1001 rationals, everything else onto x/1000.
fn fps_to_rational(fps: f64) -> (u32, u32) {
    for base in [24u32, 30, 60] {
        let ntsc = base as f64 * 1000.0 / 1001.0;
        if (fps - ntsc).abs() < 0.005 {
            return (base * 1000, 1001);
        }
    }
    if fps.fract().abs() < 1e-9 {
        (fps as u32, 1)
    } else {
        ((fps * 1000.0).round() as u32, 1000)
    }
}

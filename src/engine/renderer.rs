//! Renderer contract consumed by the timeline core.
//!
//! The backend plays a published [`Tractor`] and reports back through the
//! event bus: [`FrameShown`] while playing or seeking, [`DurationChanged`]
//! when a new graph is set, [`RenderPosition`] while exporting.
//!
//! [`HeadlessRenderer`] implements the contract without decoding anything.
//! It serves batch tools and tests: frames are flat colors derived from the
//! producer id, so thumbnails stay deterministic.

use image::{Rgba, RgbaImage};
use log::{debug, trace};
use md5::{Digest, Md5};
use std::collections::HashMap;

use super::tractor::Tractor;
use crate::core::event_bus::Notifier;
use crate::core::events::{DurationChanged, FrameShown, RenderPosition};
use crate::core::workers::CancelToken;
use crate::error::{TimelineError, TimelineResult};

/// Frames between two render progress reports
const RENDER_PROGRESS_STEP: i32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

pub trait Renderer: Send {
    /// Play `tractor` from now on. Resets the position when the duration
    /// shrinks below it.
    fn set_producer(&mut self, tractor: Tractor) -> TimelineResult<()>;
    fn seek(&mut self, frame: i32);
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    /// Re-fetch the current frame after an edit.
    fn refresh(&mut self);
    fn position(&self) -> i32;
    fn state(&self) -> PlaybackState;

    /// Frame `frame` of `producer` scaled to `width`x`height`.
    fn get_frame_image(&self, producer: &str, frame: i32, width: u32, height: u32) -> TimelineResult<RgbaImage>;

    /// Render the whole graph, reporting progress. Returns the frames rendered.
    fn render(&mut self, cancel: &CancelToken) -> TimelineResult<i32>;

    /// Backend-side slowmotion producer cache.
    fn get_slowmotion_producer(&self, _key: &str) -> Option<String> {
        None
    }

    /// Store a slowmotion producer; first caller wins.
    fn store_slowmotion_producer(&mut self, _key: &str, _producer: &str) -> bool {
        false
    }
}

/// Renderer with no media backend behind it.
#[derive(Debug)]
pub struct HeadlessRenderer {
    tractor: Option<Tractor>,
    position: i32,
    state: PlaybackState,
    slowmotion: HashMap<String, String>,
    notifier: Notifier,
}

impl HeadlessRenderer {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            tractor: None,
            position: 0,
            state: PlaybackState::Stopped,
            slowmotion: HashMap::new(),
            notifier,
        }
    }

    fn duration(&self) -> i32 {
        self.tractor.as_ref().map(Tractor::duration).unwrap_or(0)
    }

    fn show(&self, frame: i32) {
        self.notifier.emit(FrameShown { frame });
    }

    /// Advance playback by `frames`, stopping at the end.
    pub fn tick(&mut self, frames: i32) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let last = (self.duration() - 1).max(0);
        self.position = (self.position + frames).clamp(0, last);
        self.show(self.position);
        if self.position == last {
            self.state = PlaybackState::Paused;
        }
    }

    /// Composited color at `frame` of the published timeline.
    pub fn timeline_pixel(&self, frame: i32) -> Option<Rgba<u8>> {
        let tractor = self.tractor.as_ref()?;
        tractor.read(|graph| graph.visible_cut_at(frame).map(|(_, cut, _)| producer_color(&cut.producer)))
    }
}

impl Renderer for HeadlessRenderer {
    fn set_producer(&mut self, tractor: Tractor) -> TimelineResult<()> {
        let frames = tractor.duration();
        debug!("Renderer: new tractor, {} frames", frames);
        self.tractor = Some(tractor);
        if self.position >= frames {
            self.position = (frames - 1).max(0);
        }
        self.notifier.emit(DurationChanged { frames });
        Ok(())
    }

    fn seek(&mut self, frame: i32) {
        let last = (self.duration() - 1).max(0);
        self.position = frame.clamp(0, last);
        trace!("Renderer: seek {} -> {}", frame, self.position);
        self.show(self.position);
    }

    fn play(&mut self) {
        if self.tractor.is_some() {
            self.state = PlaybackState::Playing;
        }
    }

    fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.position = 0;
    }

    fn refresh(&mut self) {
        self.show(self.position);
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn get_frame_image(&self, producer: &str, frame: i32, width: u32, height: u32) -> TimelineResult<RgbaImage> {
        if width == 0 || height == 0 {
            return Err(TimelineError::invalid(format!("frame size {}x{}", width, height)));
        }
        if frame < 0 {
            return Err(TimelineError::OutOfRange(format!("frame {}", frame)));
        }
        Ok(RgbaImage::from_pixel(width, height, producer_color(producer)))
    }

    fn render(&mut self, cancel: &CancelToken) -> TimelineResult<i32> {
        let Some(tractor) = self.tractor.clone() else {
            return Err(TimelineError::Renderer("no producer set".to_string()));
        };
        let frames = tractor.duration();
        let mut done = 0;
        while done < frames {
            if cancel.is_cancelled() {
                debug!("Render aborted at frame {}", done);
                break;
            }
            done = (done + RENDER_PROGRESS_STEP).min(frames);
            self.notifier.emit(RenderPosition { frame: done });
        }
        Ok(done)
    }

    fn get_slowmotion_producer(&self, key: &str) -> Option<String> {
        self.slowmotion.get(key).cloned()
    }

    fn store_slowmotion_producer(&mut self, key: &str, producer: &str) -> bool {
        if self.slowmotion.contains_key(key) {
            return false;
        }
        self.slowmotion.insert(key.to_string(), producer.to_string());
        true
    }
}

/// Stable flat color for a producer id.
fn producer_color(producer: &str) -> Rgba<u8> {
    let digest = Md5::digest(producer.as_bytes());
    Rgba([digest[0], digest[1], digest[2], 255])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::EventBus;
    use crate::engine::tractor::TractorGraph;
    use crate::entities::playlist::Cut;
    use crate::entities::track::{Track, TrackKind};

    fn published(duration: i32) -> Tractor {
        let mut v1 = Track::new(TrackKind::Video, "V1");
        v1.playlist.place(0, Cut::new("c1_1", "c1", 0, 9));
        let tractor = Tractor::new();
        tractor.publish(TractorGraph::build(&[Track::background(duration), v1], &[], None, duration));
        tractor
    }

    #[test]
    fn test_set_producer_reports_duration() {
        let bus = EventBus::new();
        let mut r = HeadlessRenderer::new(bus.notifier());
        r.set_producer(published(50)).expect("set");
        assert_eq!(bus.drain::<DurationChanged>(), vec![DurationChanged { frames: 50 }]);
    }

    #[test]
    fn test_seek_clamps_and_shows() {
        let bus = EventBus::new();
        let mut r = HeadlessRenderer::new(bus.notifier());
        r.set_producer(published(50)).expect("set");
        r.seek(80);
        assert_eq!(r.position(), 49);
        r.seek(-3);
        assert_eq!(r.position(), 0);
        assert_eq!(bus.drain::<FrameShown>().len(), 2);
    }

    #[test]
    fn test_playback_stops_at_end() {
        let mut r = HeadlessRenderer::new(Notifier::silent());
        r.play();
        assert_eq!(r.state(), PlaybackState::Stopped);
        r.set_producer(published(20)).expect("set");
        r.play();
        r.tick(5);
        assert_eq!(r.position(), 5);
        r.tick(100);
        assert_eq!((r.position(), r.state()), (19, PlaybackState::Paused));
        r.stop();
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_frame_image() {
        let r = HeadlessRenderer::new(Notifier::silent());
        let img = r.get_frame_image("c1_1", 3, 16, 9).expect("image");
        assert_eq!(img.dimensions(), (16, 9));
        assert_eq!(img.get_pixel(0, 0), &producer_color("c1_1"));
        assert!(r.get_frame_image("c1_1", 0, 0, 9).is_err());
    }

    #[test]
    fn test_timeline_pixel_uses_top_track() {
        let mut r = HeadlessRenderer::new(Notifier::silent());
        r.set_producer(published(30)).expect("set");
        assert_eq!(r.timeline_pixel(5), Some(producer_color("c1_1")));
        assert_eq!(r.timeline_pixel(20), Some(producer_color("black")));
    }

    #[test]
    fn test_render_reports_progress_and_cancels() {
        let bus = EventBus::new();
        let mut r = HeadlessRenderer::new(bus.notifier());
        assert!(r.render(&CancelToken::new()).is_err());
        r.set_producer(published(60)).expect("set");
        assert_eq!(r.render(&CancelToken::new()).expect("render"), 60);
        let positions: Vec<i32> = bus.drain::<RenderPosition>().into_iter().map(|p| p.frame).collect();
        assert_eq!(positions, vec![25, 50, 60]);

        let token = CancelToken::new();
        token.cancel();
        assert_eq!(r.render(&token).expect("render"), 0);
    }

    #[test]
    fn test_slowmotion_store_first_wins() {
        let mut r = HeadlessRenderer::new(Notifier::silent());
        assert!(r.store_slowmotion_producer("0.5:1:0:/a.mp4", "slowmotion:c1:0.5:1:0"));
        assert!(!r.store_slowmotion_producer("0.5:1:0:/a.mp4", "slowmotion:c9:0.5:1:0"));
        assert_eq!(r.get_slowmotion_producer("0.5:1:0:/a.mp4").as_deref(), Some("slowmotion:c1:0.5:1:0"));
    }
}

//! Source clips: one entry per media source referenced by the project.
//!
//! A source clip is never placed on a track directly. Tracks hold cuts of
//! per-track producer instances manufactured from it by the registry.

use serde::{Deserialize, Serialize};

use super::attrs::Properties;
use super::keys::*;

/// Media kind of a source clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipKind {
    AV,
    Video,
    Audio,
    Image,
    SlideShow,
    Color,
    Text,
    TextTemplate,
    Playlist,
}

impl ClipKind {
    /// Numeric code stored as `kdenlive:clip_type`.
    pub fn code(self) -> i32 {
        match self {
            ClipKind::Video => 1,
            ClipKind::Audio => 2,
            ClipKind::AV => 3,
            ClipKind::Color => 4,
            ClipKind::Image => 5,
            ClipKind::Text => 6,
            ClipKind::SlideShow => 7,
            ClipKind::Playlist => 8,
            ClipKind::TextTemplate => 9,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => ClipKind::Video,
            2 => ClipKind::Audio,
            3 => ClipKind::AV,
            4 => ClipKind::Color,
            5 => ClipKind::Image,
            6 => ClipKind::Text,
            7 => ClipKind::SlideShow,
            8 => ClipKind::Playlist,
            9 => ClipKind::TextTemplate,
            _ => return None,
        })
    }

    /// Kinds with no natural end (stills, generators).
    pub fn is_unbounded(self) -> bool {
        matches!(
            self,
            ClipKind::Color | ClipKind::Image | ClipKind::Text | ClipKind::TextTemplate
        )
    }

    pub fn can_have_audio(self) -> bool {
        matches!(self, ClipKind::AV | ClipKind::Audio)
    }

    /// Best guess from the backend service name when no type code is stored.
    pub fn guess(service: &str, resource: &str) -> Self {
        match service {
            "color" | "colour" => ClipKind::Color,
            "kdenlivetitle" => {
                if resource.is_empty() {
                    ClipKind::Text
                } else {
                    ClipKind::TextTemplate
                }
            }
            "qimage" | "pixbuf" => {
                if resource.contains(".all.") || resource.contains('%') {
                    ClipKind::SlideShow
                } else {
                    ClipKind::Image
                }
            }
            "xml" | "consumer" => ClipKind::Playlist,
            _ => ClipKind::AV,
        }
    }
}

/// Which streams of a clip a cut uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ClipState {
    #[default]
    Original,
    VideoOnly,
    AudioOnly,
}

impl ClipState {
    /// Numeric code used in slowmotion producer ids.
    pub fn code(self) -> i32 {
        match self {
            ClipState::Original => 0,
            ClipState::VideoOnly => 1,
            ClipState::AudioOnly => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ClipState::Original),
            1 => Some(ClipState::VideoOnly),
            2 => Some(ClipState::AudioOnly),
            _ => None,
        }
    }

    /// Producer id suffix for split variants.
    pub fn suffix(self) -> &'static str {
        match self {
            ClipState::Original => "",
            ClipState::VideoOnly => "_video",
            ClipState::AudioOnly => "_audio",
        }
    }
}

/// One media source known to the project.
///
/// **Properties** (stored in `props`): `resource`, `mlt_service`, `length`,
/// `kdenlive:file_hash`, `kdenlive:file_size`, `kdenlive:proxy`,
/// `kdenlive:originalurl`, the pass-through list, and custom key/values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceClip {
    pub id: String,
    pub kind: ClipKind,
    pub props: Properties,
}

impl SourceClip {
    pub fn new(id: impl Into<String>, kind: ClipKind, resource: impl Into<String>) -> Self {
        let id = id.into();
        let mut props = Properties::new();
        props.set(P_RESOURCE, resource);
        props.set(P_SERVICE, default_service(kind));
        props.set(P_CLIP_ID, id.clone());
        props.set_i32(P_CLIP_TYPE, kind.code());
        Self { id, kind, props }
    }

    /// Clip from stored producer properties. The kind comes from
    /// `kdenlive:clip_type`, else it is guessed from the service.
    pub fn from_props(id: impl Into<String>, mut props: Properties) -> Self {
        let id = id.into();
        let kind = props
            .get_i32(P_CLIP_TYPE)
            .and_then(ClipKind::from_code)
            .unwrap_or_else(|| {
                ClipKind::guess(props.get(P_SERVICE).unwrap_or(""), props.get(P_RESOURCE).unwrap_or(""))
            });
        props.set(P_CLIP_ID, id.clone());
        props.set_i32(P_CLIP_TYPE, kind.code());
        Self { id, kind, props }
    }

    /// Builder: bounded native duration in frames.
    pub fn with_length(mut self, frames: i32) -> Self {
        self.props.set_i32(P_LENGTH, frames);
        self
    }

    /// Builder: proxy stand-in path. The proxy becomes the resource and the
    /// original moves to `kdenlive:originalurl`.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        let proxy = proxy.into();
        let original = self.resource().to_string();
        self.props.set(P_ORIGINAL_URL, original);
        self.props.set(P_PROXY, proxy.clone());
        self.props.set(P_RESOURCE, proxy);
        self
    }

    pub fn resource(&self) -> &str {
        self.props.get(P_RESOURCE).unwrap_or("")
    }

    pub fn service(&self) -> &str {
        self.props.get(P_SERVICE).unwrap_or("avformat")
    }

    pub fn name(&self) -> &str {
        self.props.get_str(P_NAME).unwrap_or(&self.id)
    }

    /// Native duration when bounded. Unbounded kinds report None.
    pub fn native_duration(&self) -> Option<i32> {
        if self.kind.is_unbounded() {
            None
        } else {
            self.props.get_i32(P_LENGTH).filter(|l| *l > 0)
        }
    }

    /// Length used when the clip is dropped on a track.
    pub fn default_length(&self, still_frames: i32) -> i32 {
        match self.native_duration() {
            Some(len) => len,
            None => self.props.get_i32(P_LENGTH).filter(|l| *l > 0).unwrap_or(still_frames),
        }
    }

    pub fn proxy(&self) -> Option<&str> {
        self.props.get_str(P_PROXY).filter(|p| *p != "-")
    }

    /// Path of the real media: the original when proxied, else the resource.
    pub fn original_url(&self) -> &str {
        self.props.get_str(P_ORIGINAL_URL).unwrap_or_else(|| self.resource())
    }

    pub fn file_hash(&self) -> Option<&str> {
        self.props.get_str(P_FILE_HASH)
    }

    pub fn audio_index(&self) -> i32 {
        self.props.get_i32_or(P_AUDIO_INDEX, 0)
    }

    /// Clip carries a usable audio stream.
    pub fn has_audio(&self) -> bool {
        self.kind.can_have_audio() && self.audio_index() != -1
    }

    /// String hashed for synthetic kinds (color, title, slideshow).
    pub fn defining_string(&self) -> Option<&str> {
        match self.kind {
            ClipKind::Color | ClipKind::SlideShow => Some(self.resource()),
            ClipKind::Text | ClipKind::TextTemplate => {
                Some(self.props.get(P_XMLDATA).unwrap_or_else(|| self.resource()))
            }
            _ => None,
        }
    }
}

fn default_service(kind: ClipKind) -> &'static str {
    match kind {
        ClipKind::Color => "color",
        ClipKind::Image | ClipKind::SlideShow => "qimage",
        ClipKind::Text | ClipKind::TextTemplate => "kdenlivetitle",
        ClipKind::Playlist => "xml",
        _ => "avformat",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_roundtrip() {
        for kind in [
            ClipKind::AV,
            ClipKind::Video,
            ClipKind::Audio,
            ClipKind::Image,
            ClipKind::SlideShow,
            ClipKind::Color,
            ClipKind::Text,
            ClipKind::TextTemplate,
            ClipKind::Playlist,
        ] {
            assert_eq!(ClipKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn test_durations() {
        let av = SourceClip::new("c1", ClipKind::AV, "/m/a.mov").with_length(100);
        assert_eq!(av.native_duration(), Some(100));
        assert_eq!(av.default_length(125), 100);

        let color = SourceClip::new("c2", ClipKind::Color, "0xff0000ff");
        assert_eq!(color.native_duration(), None);
        assert_eq!(color.default_length(125), 125);
        assert_eq!(color.defining_string(), Some("0xff0000ff"));
    }

    #[test]
    fn test_has_audio() {
        let mut av = SourceClip::new("c1", ClipKind::AV, "/m/a.mov");
        assert!(av.has_audio());
        av.props.set_i32(P_AUDIO_INDEX, -1);
        assert!(!av.has_audio());
        let img = SourceClip::new("c2", ClipKind::Image, "/m/a.png");
        assert!(!img.has_audio());
    }

    #[test]
    fn test_proxy_keeps_original() {
        let clip = SourceClip::new("c1", ClipKind::AV, "/m/a.mov").with_proxy("/p/x.mp4");
        assert_eq!(clip.proxy(), Some("/p/x.mp4"));
        assert_eq!(clip.original_url(), "/m/a.mov");
        assert_eq!(clip.resource(), "/p/x.mp4");
    }
}

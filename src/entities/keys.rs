//! Property name constants for Properties access.
//!
//! Avoid string typos, enable IDE autocomplete.
//! Usage: `producer.props.get_str(P_RESOURCE)`

// === Markers ===
/// `internal_added` value of auto-inserted track composites and audio mixes
pub const INTERNAL_TRACK: i32 = 237;
/// `internal_added` value of the multitrack preview composites
pub const INTERNAL_MULTITRACK: i32 = 200;

/// Id of the built-in background color producer
pub const BLACK_ID: &str = "black";
/// Playlist id of the background track
pub const BLACK_TRACK_ID: &str = "black_track";

// === Producer ===
pub const P_RESOURCE: &str = "resource";
pub const P_SERVICE: &str = "mlt_service";
pub const P_LENGTH: &str = "length";
pub const P_NAME: &str = "kdenlive:clipname";
pub const P_CLIP_ID: &str = "kdenlive:id";
pub const P_CLIP_TYPE: &str = "kdenlive:clip_type";
pub const P_FILE_HASH: &str = "kdenlive:file_hash";
pub const P_FILE_SIZE: &str = "kdenlive:file_size";
pub const P_PROXY: &str = "kdenlive:proxy";
pub const P_ORIGINAL_URL: &str = "kdenlive:originalurl";
pub const P_FOLDER: &str = "kdenlive:folderid";
pub const P_XMLDATA: &str = "xmldata";
pub const P_VIDEO_INDEX: &str = "video_index";
pub const P_AUDIO_INDEX: &str = "audio_index";
pub const P_WARP_SPEED: &str = "warp_speed";
pub const P_STROBE: &str = "strobe";

/// Repair flags set by the validator
pub const P_REPLACE_PROXY: &str = "_replaceproxy";
pub const P_MISSING_SOURCE: &str = "_missingsource";
pub const P_PLACEHOLDER: &str = "_placeholder";

/// Properties replicated from a master producer to every instance.
pub const PASS_THROUGH: &[&str] = &[
    "force_aspect_ratio",
    "force_fps",
    "force_progressive",
    "force_tff",
    "threads",
    "video_index",
    "audio_index",
    "force_colorspace",
    "set.force_full_luma",
];

// === Cut (playlist entry) ===
/// Original span of a speed-altered cut (in, at speed 1)
pub const P_SPEED_IN: &str = "kdenlive:speed_in";
/// Original length of a speed-altered cut (at speed 1)
pub const P_SPEED_LENGTH: &str = "kdenlive:speed_length";

// === Playlist / track ===
pub const T_NAME: &str = "kdenlive:track_name";
pub const T_AUDIO: &str = "kdenlive:audio_track";
pub const T_LOCKED: &str = "kdenlive:locked_track";
pub const T_COMPOSITE: &str = "kdenlive:composite";

// === Filter ===
pub const F_ID: &str = "kdenlive_id";
pub const F_INDEX: &str = "kdenlive_ix";
pub const F_DISABLE: &str = "disable";
pub const F_SYNC: &str = "kdenlive:sync_in_out";
pub const F_REGION: &str = "region";
/// Active window of an effect realized as a keyframe chain, whose filters
/// use `in`/`out` for the segments.
pub const F_WINDOW_IN: &str = "kdenlive:window_in";
pub const F_WINDOW_OUT: &str = "kdenlive:window_out";

// === Transition ===
pub const X_A_TRACK: &str = "a_track";
pub const X_B_TRACK: &str = "b_track";
pub const X_ID: &str = "kdenlive_id";
pub const X_AUTOMATIC: &str = "automatic";
pub const X_FORCE_TRACK: &str = "force_track";
pub const X_INTERNAL: &str = "internal_added";
pub const X_ALWAYS_ACTIVE: &str = "always_active";
pub const X_COMBINE: &str = "combine";
pub const X_DISABLE: &str = "disable";
pub const X_GEOMETRY: &str = "geometry";
pub const X_LUMA: &str = "luma";

//! C4 typed tag model (spec.md §3, §4.4.3).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMethod {
    None,
    Aes128,
    SampleAes,
}

#[derive(Debug, Clone)]
pub struct KeyRange {
    pub method: KeyMethod,
    pub uri: Option<String>,
    pub iv: Option<String>,
    pub key_format: Option<String>,
    pub key_format_versions: Option<String>,
    /// Index (into `MediaPlaylist::segments`) of the first segment this key
    /// applies to. Resolves spec.md §9 open question 4.
    pub applies_from_segment_index: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ByteRange {
    pub length: u64,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub uri: String,
    pub duration: f64,
    pub title: Option<String>,
    pub byte_range: Option<ByteRange>,
    pub discontinuity_flag: bool,
    pub program_date_time: Option<String>,
    /// Index into `MediaPlaylist::keys`, if a key is in effect.
    pub inline_key_ref: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Vod,
    Event,
}

#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    pub base_url: String,
    pub target_duration: u64,
    pub version: u32,
    pub media_sequence: u64,
    pub allow_cache: Option<bool>,
    pub playlist_type: Option<PlaylistType>,
    pub segments: Vec<Segment>,
    pub keys: Vec<KeyRange>,
    pub has_endlist_marker: bool,
}

#[derive(Debug, Clone)]
pub struct VariantStream {
    pub uri: String,
    pub bandwidth: u64,
    pub average_bandwidth: Option<u64>,
    pub resolution: Option<(u32, u32)>,
    pub codecs: Option<String>,
    pub frame_rate: Option<f64>,
    pub audio_group: Option<String>,
    pub subtitles_group: Option<String>,
    pub video_group: Option<String>,
    pub closed_captions_group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MasterPlaylist {
    pub base_url: String,
    pub streams: Vec<VariantStream>,
    pub extra_tags: Vec<String>,
}

/// `Cancelled` is retained for forward compatibility (spec.md §9 open
/// question 5) but the current parser never produces it.
#[derive(Debug, Clone)]
pub enum ParserResult {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
    Cancelled,
}

/// A hint passed by the caller; the parser treats observed tags as
/// authoritative and this only breaks ties when tags are ambiguous
/// (spec.md §9 open question 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKindHint {
    Master,
    Media,
    Unknown,
}

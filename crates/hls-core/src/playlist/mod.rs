mod parser;
mod types;

pub use parser::parse;
pub use types::{
    ByteRange, KeyMethod, KeyRange, MasterPlaylist, MediaPlaylist, ParserResult, PlaylistKindHint,
    PlaylistType, Segment, VariantStream,
};

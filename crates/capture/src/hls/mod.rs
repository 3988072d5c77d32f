mod playlist;
mod segment;

pub use playlist::{find_segment, last_segment, parse_playlist};
pub use segment::HlsSegment;

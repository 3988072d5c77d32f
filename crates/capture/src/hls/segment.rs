use reqwest::Url;

/// One media segment referenced by a playlist snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct HlsSegment {
    /// Absolute location, already resolved against the playlist url
    pub url: Url,
    /// Media sequence number of the segment in the broadcast
    pub sequence: u64,
    /// Declared duration in seconds
    pub duration: f64,
}

impl HlsSegment {
    pub fn new(url: Url, sequence: u64, duration: f64) -> Self {
        Self {
            url,
            sequence,
            duration,
        }
    }

    /// Last path component of the segment url.
    pub fn file_name(&self) -> &str {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("segment.ts")
    }
}

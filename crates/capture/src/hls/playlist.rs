use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

use crate::{
    error::{CaptureError, CaptureResult},
    hls::HlsSegment,
};

static MEDIA_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#EXT-X-MEDIA-SEQUENCE:(\d+)").expect("valid regex"));
static DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#EXTINF:([\d.]+)").expect("valid regex"));
static FILE_SEQUENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(\d+)\.ts$").expect("valid regex"));

/// Parse a media playlist into segments, in document order.
///
/// Only `#EXT-X-MEDIA-SEQUENCE` and `#EXTINF` are interpreted, every other
/// tag is skipped. Segment sequences come from a counter seeded by the media
/// sequence, unless the file name carries its own as in `master_1440_719721.ts`.
pub fn parse_playlist(content: &str, playlist_url: &Url) -> CaptureResult<Vec<HlsSegment>> {
    let mut segments = Vec::new();
    let mut media_sequence: u64 = 0;
    let mut duration: f64 = 0.;

    for line in content.lines().map(str::trim) {
        if let Some(captures) = MEDIA_SEQUENCE.captures(line) {
            match captures[1].parse() {
                Ok(sequence) => media_sequence = sequence,
                Err(e) => tracing::warn!("Ignoring media sequence {}: {e}", &captures[1]),
            }
            continue;
        }

        if let Some(captures) = DURATION.captures(line) {
            match captures[1].parse() {
                Ok(value) => duration = value,
                Err(e) => tracing::warn!("Ignoring segment duration {}: {e}", &captures[1]),
            }
            continue;
        }

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let url = playlist_url
            .join(line)
            .map_err(|source| CaptureError::MalformedPlaylist {
                reference: line.to_string(),
                source,
            })?;
        let sequence = sequence_from_file_name(line).unwrap_or(media_sequence);

        segments.push(HlsSegment::new(url, sequence, duration));

        media_sequence = media_sequence.saturating_add(1);
        duration = 0.;
    }

    Ok(segments)
}

/// The segment with the highest sequence number. The earliest one wins a tie.
pub fn last_segment(segments: &[HlsSegment]) -> Option<&HlsSegment> {
    segments.iter().reduce(|last, segment| {
        if segment.sequence > last.sequence {
            segment
        } else {
            last
        }
    })
}

/// The first segment in document order carrying `sequence`.
pub fn find_segment(segments: &[HlsSegment], sequence: u64) -> Option<&HlsSegment> {
    segments.iter().find(|segment| segment.sequence == sequence)
}

fn sequence_from_file_name(reference: &str) -> Option<u64> {
    let path = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    let file_name = path.rsplit('/').next().unwrap_or(path);

    FILE_SEQUENCE
        .captures(file_name)
        .and_then(|captures| captures[1].parse().ok())
}

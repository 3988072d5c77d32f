use std::{path::PathBuf, process::ExitStatus};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error("Invalid segment reference {reference}: {source}")]
    MalformedPlaylist {
        reference: String,
        #[source]
        source: url::ParseError,
    },

    #[error("No segments found in playlist")]
    NoSegmentsAvailable,

    #[error("Segment {0} has not been staged")]
    MissingSegment(u64),

    #[error("Failed to write output file: {0}")]
    AssemblyFailed(#[source] std::io::Error),

    #[error("Segment count must be at least 1")]
    InvalidSegmentCount,

    #[error("Can not set cache directory to an existing path: {0}")]
    CacheDirExists(PathBuf),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    MissingExecutable(#[from] which::Error),

    #[error("{tool} exited with {status}")]
    ExternalToolFailed {
        tool: &'static str,
        status: ExitStatus,
    },
}

impl CaptureError {
    /// Whether the error came from the network round trip rather than local I/O.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::HttpError(_) | Self::RequestError(_))
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;

pub mod capture;
pub mod error;
pub mod fetch;
pub mod hls;
pub mod postprocess;
pub mod store;
pub mod util;

pub use capture::{capture, CaptureOptions, CaptureReport, CaptureState, CaptureWindow, LiveCapture};
pub use error::{CaptureError, CaptureResult};
pub use fetch::HlsFetcher;
pub use hls::HlsSegment;
pub use store::SegmentStore;
pub use tokio_util::sync::CancellationToken;
pub use util::http::HttpClient;

use std::{future::Future, sync::Arc};

use reqwest::Url;
use tokio::io::AsyncWrite;

/// ┌──────────────────────┐  fetch_playlist  ┌──────────────────────┐
/// │                      ◄──────────────────┤                      │
/// │                      │                  │     LiveCapture      │
/// │    PlaylistSource    │                  │  (poll until each    │
/// │                      │  fetch_segment   │   wanted sequence    │
/// │                      ◄──────┐           │   is published)      │
/// └──────────────────────┘      │           └──────────┬───────────┘
///                               │                      │ retrieve / assemble
///                               │           ┌──────────▼───────────┐
///                               └───────────┤     SegmentStore     │
///                                           │  sequence -> file    │
///                                           └──────────────────────┘
pub trait PlaylistSource: Send + Sync {
    /// Fetch the playlist document at `url` as text.
    fn fetch_playlist(&self, url: &Url) -> impl Future<Output = CaptureResult<String>> + Send;

    /// Stream the body at `url` into `writer` without buffering it whole.
    fn fetch_segment<W>(
        &self,
        url: &Url,
        writer: &mut W,
    ) -> impl Future<Output = CaptureResult<()>> + Send
    where
        W: AsyncWrite + Unpin + Send;
}

impl<S> PlaylistSource for Arc<S>
where
    S: PlaylistSource,
{
    fn fetch_playlist(&self, url: &Url) -> impl Future<Output = CaptureResult<String>> + Send {
        self.as_ref().fetch_playlist(url)
    }

    fn fetch_segment<W>(
        &self,
        url: &Url,
        writer: &mut W,
    ) -> impl Future<Output = CaptureResult<()>> + Send
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.as_ref().fetch_segment(url, writer)
    }
}

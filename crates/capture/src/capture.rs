use std::{
    future::Future,
    ops::RangeInclusive,
    path::PathBuf,
    time::Duration,
};

use reqwest::Url;
use tokio::{fs::File, io::AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{CaptureError, CaptureResult},
    fetch::HlsFetcher,
    hls::{find_segment, last_segment, parse_playlist, HlsSegment},
    store::{staging_dir, SegmentStore},
    util::http::{HttpClient, DEFAULT_TIMEOUT},
    PlaylistSource,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Report the waiting status on the first poll and every n-th poll after it.
const PROGRESS_EVERY: u64 = 5;

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub playlist_url: Url,
    /// Number of segments to capture, starting from the latest one published
    pub segment_count: u64,
    /// Final output file path
    pub output: PathBuf,
    pub poll_interval: Duration,
}

impl CaptureOptions {
    pub fn new(playlist_url: Url, segment_count: u64, output: impl Into<PathBuf>) -> Self {
        Self {
            playlist_url,
            segment_count,
            output: output.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// The fixed range of sequence numbers one run tries to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureWindow {
    pub start_sequence: u64,
    pub target_sequence: u64,
}

impl CaptureWindow {
    pub fn new(start_sequence: u64, segment_count: u64) -> CaptureResult<Self> {
        if segment_count == 0 {
            return Err(CaptureError::InvalidSegmentCount);
        }

        Ok(Self {
            start_sequence,
            target_sequence: start_sequence.saturating_add(segment_count - 1),
        })
    }

    /// Window starting at the latest segment of the first snapshot.
    pub fn from_snapshot(snapshot: &[HlsSegment], segment_count: u64) -> CaptureResult<Self> {
        let last = last_segment(snapshot).ok_or(CaptureError::NoSegmentsAvailable)?;
        Self::new(last.sequence, segment_count)
    }

    pub fn sequences(&self) -> RangeInclusive<u64> {
        self.start_sequence..=self.target_sequence
    }

    pub fn segment_count(&self) -> u64 {
        self.target_sequence - self.start_sequence + 1
    }

    /// 1-based position of `sequence` inside the window.
    pub fn position(&self, sequence: u64) -> u64 {
        sequence.saturating_sub(self.start_sequence) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Initializing,
    Windowing,
    PerSegment(u64),
    Polling(u64),
    Staging(u64),
    Assembling,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    /// Not set when the run stopped before the first snapshot was taken
    pub window: Option<CaptureWindow>,
    pub requested: u64,
    /// Sequences staged successfully, ascending
    pub downloaded: Vec<u64>,
    pub cancelled: bool,
    /// Set only when the merged file was written completely
    pub output: Option<PathBuf>,
}

impl CaptureReport {
    fn new(requested: u64) -> Self {
        Self {
            window: None,
            requested,
            downloaded: Vec::with_capacity(requested.min(1024) as usize),
            cancelled: false,
            output: None,
        }
    }

    pub fn downloaded_count(&self) -> usize {
        self.downloaded.len()
    }
}

/// Follows a live playlist and records a window of its segments into one file.
pub struct LiveCapture<S> {
    store: SegmentStore<S>,
    options: CaptureOptions,
    state: CaptureState,
}

impl<S> LiveCapture<S>
where
    S: PlaylistSource,
{
    pub fn new(store: SegmentStore<S>, options: CaptureOptions) -> Self {
        Self {
            store,
            options,
            state: CaptureState::Initializing,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn store(&self) -> &SegmentStore<S> {
        &self.store
    }

    /// Run the capture until the window is exhausted or `token` is cancelled.
    ///
    /// Cancellation is not an error: the report comes back with `cancelled` set and
    /// no output. The staging directory is removed whatever the outcome.
    pub async fn capture(&mut self, token: &CancellationToken) -> CaptureResult<CaptureReport> {
        let result = self.run(token).await;

        if let Err(e) = self.store.dispose().await {
            tracing::warn!(
                "Failed to clean up {}: {e}",
                self.store.cache_dir().display()
            );
        }
        if self.state != CaptureState::Cancelled {
            self.transition(CaptureState::Done);
        }

        result
    }

    async fn run(&mut self, token: &CancellationToken) -> CaptureResult<CaptureReport> {
        let segment_count = self.options.segment_count;
        if segment_count == 0 {
            return Err(CaptureError::InvalidSegmentCount);
        }
        let mut report = CaptureReport::new(segment_count);

        let Some(snapshot) = cancellable(token, self.snapshot()).await else {
            return Ok(self.cancel(report));
        };
        let snapshot = snapshot?;

        self.transition(CaptureState::Windowing);
        let window = CaptureWindow::from_snapshot(&snapshot, segment_count)?;
        report.window = Some(window);
        tracing::info!(
            "Starting from segment {}, target: {} (need {} segments)",
            window.start_sequence,
            window.target_sequence,
            window.segment_count(),
        );

        for sequence in window.sequences() {
            if token.is_cancelled() {
                return Ok(self.cancel(report));
            }
            self.transition(CaptureState::PerSegment(sequence));

            let Some(segment) = self.poll_segment(sequence, token).await else {
                return Ok(self.cancel(report));
            };

            self.transition(CaptureState::Staging(sequence));
            tracing::info!(
                "[{}/{segment_count}] Downloading segment {sequence}: {}",
                window.position(sequence),
                segment.file_name()
            );
            match cancellable(token, self.store.retrieve(&segment)).await {
                None => return Ok(self.cancel(report)),
                Some(Ok(_)) => report.downloaded.push(sequence),
                Some(Err(e)) => tracing::error!("Error downloading segment {sequence}: {e}"),
            }
        }

        tracing::info!(
            "Successfully downloaded {} of {segment_count} segments",
            report.downloaded_count()
        );

        self.transition(CaptureState::Assembling);
        self.assemble(&report.downloaded).await?;
        report.output = Some(self.options.output.clone());

        Ok(report)
    }

    /// Re-poll the playlist until `sequence` is published. `None` if cancelled first.
    async fn poll_segment(
        &mut self,
        sequence: u64,
        token: &CancellationToken,
    ) -> Option<HlsSegment> {
        self.transition(CaptureState::Polling(sequence));

        let mut attempts: u64 = 0;
        loop {
            if token.is_cancelled() {
                return None;
            }

            match cancellable(token, self.snapshot()).await? {
                Ok(snapshot) => {
                    if let Some(segment) = find_segment(&snapshot, sequence) {
                        return Some(segment.clone());
                    }

                    if attempts % PROGRESS_EVERY == 0 {
                        match last_segment(&snapshot) {
                            Some(last) => tracing::info!(
                                "Waiting for segment {sequence}... (current last: {})",
                                last.sequence
                            ),
                            None => tracing::info!(
                                "Waiting for segment {sequence}... (playlist is empty)"
                            ),
                        }
                    }
                    attempts += 1;
                }
                Err(e) => tracing::warn!("Error refreshing playlist: {e}"),
            }

            cancellable(token, tokio::time::sleep(self.options.poll_interval)).await?;
        }
    }

    async fn snapshot(&self) -> CaptureResult<Vec<HlsSegment>> {
        let url = &self.options.playlist_url;
        let content = self.store.source().fetch_playlist(url).await?;
        parse_playlist(&content, url)
    }

    async fn assemble(&self, sequences: &[u64]) -> CaptureResult<()> {
        let output = &self.options.output;
        tracing::info!("Merging segments into: {}", output.display());

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(CaptureError::AssemblyFailed)?;
        }

        let mut file = File::create(output)
            .await
            .map_err(CaptureError::AssemblyFailed)?;
        match self.store.assemble(&mut file, sequences).await {
            Ok(_) => {}
            Err(CaptureError::IOError(e)) => return Err(CaptureError::AssemblyFailed(e)),
            Err(e) => return Err(e),
        }
        file.shutdown().await.map_err(CaptureError::AssemblyFailed)?;

        tracing::info!("Successfully merged segments into {}", output.display());
        Ok(())
    }

    fn cancel(&mut self, mut report: CaptureReport) -> CaptureReport {
        tracing::info!("Capture cancelled.");
        self.transition(CaptureState::Cancelled);
        report.cancelled = true;
        report
    }

    fn transition(&mut self, state: CaptureState) {
        tracing::debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

/// Capture from `playlist_url` over plain HTTP, staging under the system temp directory.
pub async fn capture(
    playlist_url: &str,
    segment_count: u64,
    output: impl Into<PathBuf>,
    poll_interval: Duration,
    token: &CancellationToken,
) -> CaptureResult<CaptureReport> {
    let playlist_url = Url::parse(playlist_url)?;
    let client = HttpClient::with_timeout(DEFAULT_TIMEOUT)?;
    let store = SegmentStore::new(
        HlsFetcher::new(client),
        staging_dir(std::env::temp_dir()),
    )?;
    let options =
        CaptureOptions::new(playlist_url, segment_count, output).with_poll_interval(poll_interval);

    LiveCapture::new(store, options).capture(token).await
}

async fn cancellable<F>(token: &CancellationToken, future: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = future => Some(output),
    }
}

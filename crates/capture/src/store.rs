use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::RwLock;
use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt},
};

use crate::{
    error::{CaptureError, CaptureResult},
    hls::HlsSegment,
    PlaylistSource,
};

/// Staging area for downloaded but not yet merged segments.
///
/// The store owns its cache directory: it is created on the first retrieval and
/// removed entirely by [SegmentStore::dispose], or on drop as a fallback.
pub struct SegmentStore<S> {
    source: S,
    cache_dir: PathBuf,
    /// Only segments whose payload is completely on disk are published here
    segments: RwLock<HashMap<u64, PathBuf>>,
}

impl<S> SegmentStore<S>
where
    S: PlaylistSource,
{
    pub fn new(source: S, cache_dir: impl Into<PathBuf>) -> CaptureResult<Self> {
        let cache_dir = cache_dir.into();
        if cache_dir.exists() {
            return Err(CaptureError::CacheDirExists(cache_dir));
        }

        Ok(Self {
            source,
            cache_dir,
            segments: RwLock::new(HashMap::new()),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Stage the segment, or return the existing file if it is already staged.
    pub async fn retrieve(&self, segment: &HlsSegment) -> CaptureResult<PathBuf> {
        let sequence = segment.sequence;

        let staged = self.segments.read().get(&sequence).cloned();
        if let Some(staged) = staged {
            let present = tokio::fs::metadata(&staged)
                .await
                .map(|m| m.is_file())
                .unwrap_or_default();
            if present {
                tracing::debug!("Segment {sequence} already staged, skipping download.");
                return Ok(staged);
            }

            tracing::warn!(
                "Staged file {} disappeared, downloading segment {sequence} again.",
                staged.display()
            );
            self.segments.write().remove(&sequence);
        }

        self.ensure_cache_dir().await?;
        let path = self.segment_path(segment);
        let mut file = File::create(&path).await?;
        let result = match self.source.fetch_segment(&segment.url, &mut file).await {
            Ok(_) => file.shutdown().await.map_err(CaptureError::IOError),
            Err(e) => Err(e),
        };
        drop(file);

        if let Err(e) = result {
            if let Err(remove_error) = tokio::fs::remove_file(&path).await {
                tracing::warn!(
                    "Failed to remove partial file {}: {remove_error}",
                    path.display()
                );
            }
            return Err(e);
        }

        self.segments.write().insert(sequence, path.clone());
        Ok(path)
    }

    /// Append the staged payloads of `sequences`, in the given order, to `output`.
    pub async fn assemble<W>(&self, output: &mut W, sequences: &[u64]) -> CaptureResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        for &sequence in sequences {
            let path = self
                .path(sequence)
                .ok_or(CaptureError::MissingSegment(sequence))?;
            let mut file = File::open(path).await?;
            tokio::io::copy(&mut file, output).await?;
        }
        output.flush().await?;

        Ok(())
    }

    /// Remove every staged file and the cache directory. Safe to call repeatedly.
    pub async fn dispose(&self) -> CaptureResult<()> {
        let staged: Vec<_> = self
            .segments
            .write()
            .drain()
            .map(|(_, path)| path)
            .collect();

        for path in staged {
            match tokio::fs::remove_file(&path).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {e}", path.display()),
            }
        }

        match tokio::fs::remove_dir_all(&self.cache_dir).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<S> SegmentStore<S> {
    /// Staged file of a sequence number, if any.
    pub fn path(&self, sequence: u64) -> Option<PathBuf> {
        self.segments.read().get(&sequence).cloned()
    }

    pub fn len(&self) -> usize {
        self.segments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.read().is_empty()
    }

    async fn ensure_cache_dir(&self) -> CaptureResult<()> {
        if !self.cache_dir.exists() {
            tokio::fs::create_dir_all(&self.cache_dir).await?;
        }

        Ok(())
    }

    /// Depends on the sequence only, never on the remote file name.
    fn segment_path(&self, segment: &HlsSegment) -> PathBuf {
        self.cache_dir.join(format!("{:06}.ts", segment.sequence))
    }
}

impl<S> Drop for SegmentStore<S> {
    fn drop(&mut self) {
        if self.cache_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.cache_dir) {
                tracing::error!(
                    "Failed to remove cache directory {}: {e}",
                    self.cache_dir.display()
                );
            }
        }
    }
}

/// A fresh, not yet existing cache directory under `parent`.
pub fn staging_dir(parent: impl AsRef<Path>) -> PathBuf {
    let started_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    parent.as_ref().join(format!(
        "stream-capture_{started_at}_{}",
        rand::random::<u8>()
    ))
}

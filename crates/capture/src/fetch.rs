use futures::StreamExt;
use reqwest::{Response, Url};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    error::{CaptureError, CaptureResult},
    util::http::HttpClient,
    PlaylistSource,
};

/// Plain HTTP access to playlists and segments. Never retries on its own.
#[derive(Clone)]
pub struct HlsFetcher {
    client: HttpClient,
}

impl HlsFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    async fn get(&self, url: &Url) -> CaptureResult<Response> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            tracing::debug!("{url} responded with {status}");
            return Err(CaptureError::HttpError(status));
        }

        Ok(response)
    }
}

impl PlaylistSource for HlsFetcher {
    async fn fetch_playlist(&self, url: &Url) -> CaptureResult<String> {
        let response = self.get(url).await?;
        Ok(response.text().await?)
    }

    async fn fetch_segment<W>(&self, url: &Url, writer: &mut W) -> CaptureResult<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let response = self.get(url).await?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            writer.write_all(&chunk?).await?;
        }
        writer.flush().await?;

        Ok(())
    }
}

use std::{path::Path, sync::Arc, time::Duration};

use reqwest::{StatusCode, Url};
use stream_capture::{
    CancellationToken, CaptureError, CaptureOptions, CaptureState, CaptureWindow, LiveCapture,
    SegmentStore,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{
    support::{empty_playlist, playlist, segment_body, StalledSource, TestSource, PLAYLIST_URL},
    AssertWrapper,
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn live_capture(
    source: &Arc<TestSource>,
    dir: &Path,
    segment_count: u64,
) -> LiveCapture<Arc<TestSource>> {
    let store = SegmentStore::new(source.clone(), dir.join("staging")).unwrap();
    let options = CaptureOptions::new(
        Url::parse(PLAYLIST_URL).unwrap(),
        segment_count,
        dir.join("out").join("capture.ts"),
    )
    .with_poll_interval(POLL_INTERVAL);

    LiveCapture::new(store, options)
}

#[tokio::test]
async fn test_window_does_not_follow_the_live_edge() -> anyhow::Result<()> {
    let source = Arc::new(TestSource::new(vec![
        Some(playlist(3..=5)),
        Some(playlist(3..=5)),
        Some(playlist(4..=6)),
        Some(playlist(7..=9)),
    ]));
    let temp = tempfile::tempdir()?;
    let mut capture = live_capture(&source, temp.path(), 3);

    let report = capture
        .capture(&CancellationToken::new())
        .await
        .assert_success();

    assert_eq!(report.window, Some(CaptureWindow::new(5, 3)?));
    assert_eq!(report.requested, 3);
    assert_eq!(report.downloaded, vec![5, 6, 7]);
    assert!(!report.cancelled);

    let output = temp.path().join("out").join("capture.ts");
    assert_eq!(report.output.as_deref(), Some(output.as_path()));
    assert_eq!(std::fs::read_to_string(&output)?, "seg-5seg-6seg-7");

    assert!(!capture.store().cache_dir().exists());
    assert_eq!(capture.state(), CaptureState::Done);
    assert_eq!(source.playlist_requests(), 4);
    assert_eq!(source.segment_requests(), 3);

    Ok(())
}

#[tokio::test]
async fn test_waits_for_unpublished_segments() -> anyhow::Result<()> {
    let source = Arc::new(TestSource::new(vec![
        Some(playlist(1..=2)),
        Some(playlist(1..=2)),
        Some(playlist(1..=2)),
        Some(playlist(1..=2)),
        Some(playlist(2..=3)),
    ]));
    let temp = tempfile::tempdir()?;
    let mut capture = live_capture(&source, temp.path(), 2);

    let report = capture
        .capture(&CancellationToken::new())
        .await
        .assert_success();

    assert_eq!(report.downloaded, vec![2, 3]);
    assert_eq!(source.playlist_requests(), 5);

    Ok(())
}

#[tokio::test]
async fn test_failed_segment_is_skipped() -> anyhow::Result<()> {
    let source = Arc::new(
        TestSource::new(vec![Some(playlist(3..=5)), Some(playlist(5..=7))]).with_failing([6]),
    );
    let temp = tempfile::tempdir()?;
    let mut capture = live_capture(&source, temp.path(), 3);

    let report = capture
        .capture(&CancellationToken::new())
        .await
        .assert_success();

    assert_eq!(report.downloaded, vec![5, 7]);
    assert_eq!(report.downloaded_count(), 2);
    let output = report.output.expect("merged output");
    assert_eq!(std::fs::read_to_string(output)?, "seg-5seg-7");

    Ok(())
}

#[tokio::test]
async fn test_all_segments_failed() -> anyhow::Result<()> {
    let source =
        Arc::new(TestSource::new(vec![Some(playlist(1..=3))]).with_failing([3]));
    let temp = tempfile::tempdir()?;
    let mut capture = live_capture(&source, temp.path(), 1);

    let report = capture
        .capture(&CancellationToken::new())
        .await
        .assert_success();

    assert!(report.downloaded.is_empty());
    let output = report.output.expect("merged output");
    assert_eq!(std::fs::metadata(output)?.len(), 0);

    Ok(())
}

#[tokio::test]
async fn test_cancel_while_polling() -> anyhow::Result<()> {
    let token = CancellationToken::new();
    let source = Arc::new(
        TestSource::new(vec![Some(playlist(3..=5))]).cancel_after(4, token.clone()),
    );
    let temp = tempfile::tempdir()?;
    let mut capture = live_capture(&source, temp.path(), 10);

    let report = capture.capture(&token).await.assert_success();

    assert!(report.cancelled);
    assert_eq!(report.downloaded, vec![5]);
    assert_eq!(report.output, None);
    assert_eq!(capture.state(), CaptureState::Cancelled);
    assert!(!capture.store().cache_dir().exists());
    assert!(!temp.path().join("out").join("capture.ts").exists());

    let requests = source.playlist_requests();
    assert_eq!(requests, 4);
    tokio::time::sleep(POLL_INTERVAL * 5).await;
    assert_eq!(source.playlist_requests(), requests);

    Ok(())
}

#[tokio::test]
async fn test_cancel_during_segment_download() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let staging = temp.path().join("staging");
    let store = SegmentStore::new(StalledSource::new(playlist(3..=5)), &staging)?;
    let options = CaptureOptions::new(
        Url::parse(PLAYLIST_URL)?,
        3,
        temp.path().join("capture.ts"),
    )
    .with_poll_interval(POLL_INTERVAL);
    let mut capture = LiveCapture::new(store, options);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), capture.capture(&token))
        .await?
        .assert_success();

    assert!(report.cancelled);
    assert!(report.downloaded.is_empty());
    assert_eq!(report.output, None);
    assert_eq!(capture.state(), CaptureState::Cancelled);
    assert!(capture.store().is_empty());
    assert!(!staging.exists());
    assert!(!temp.path().join("capture.ts").exists());

    Ok(())
}

#[tokio::test]
async fn test_cancel_before_start() -> anyhow::Result<()> {
    let token = CancellationToken::new();
    token.cancel();
    let source = Arc::new(TestSource::new(vec![Some(playlist(1..=3))]));
    let temp = tempfile::tempdir()?;
    let mut capture = live_capture(&source, temp.path(), 3);

    let report = capture.capture(&token).await.assert_success();

    assert!(report.cancelled);
    assert_eq!(report.window, None);
    assert_eq!(source.playlist_requests(), 0);

    Ok(())
}

#[tokio::test]
async fn test_empty_initial_playlist() -> anyhow::Result<()> {
    let source = Arc::new(TestSource::new(vec![Some(empty_playlist())]));
    let temp = tempfile::tempdir()?;
    let mut capture = live_capture(&source, temp.path(), 3);

    let result = capture.capture(&CancellationToken::new()).await;

    assert!(matches!(result, Err(CaptureError::NoSegmentsAvailable)));
    assert!(!capture.store().cache_dir().exists());
    assert_eq!(source.segment_requests(), 0);

    Ok(())
}

#[tokio::test]
async fn test_initial_fetch_failure_is_fatal() -> anyhow::Result<()> {
    let source = Arc::new(TestSource::new(vec![None, Some(playlist(1..=3))]));
    let temp = tempfile::tempdir()?;
    let mut capture = live_capture(&source, temp.path(), 3);

    let result = capture.capture(&CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(CaptureError::HttpError(StatusCode::SERVICE_UNAVAILABLE))
    ));
    assert_eq!(source.playlist_requests(), 1);
    assert!(!temp.path().join("out").exists());

    Ok(())
}

#[tokio::test]
async fn test_poll_failure_is_retried() -> anyhow::Result<()> {
    let source = Arc::new(TestSource::new(vec![
        Some(playlist(3..=5)),
        None,
        None,
        Some(playlist(3..=5)),
    ]));
    let temp = tempfile::tempdir()?;
    let mut capture = live_capture(&source, temp.path(), 1);

    let report = capture
        .capture(&CancellationToken::new())
        .await
        .assert_success();

    assert_eq!(report.downloaded, vec![5]);
    assert_eq!(source.playlist_requests(), 4);

    Ok(())
}

#[tokio::test]
async fn test_zero_segment_count() -> anyhow::Result<()> {
    let source = Arc::new(TestSource::new(vec![Some(playlist(1..=3))]));
    let temp = tempfile::tempdir()?;
    let mut capture = live_capture(&source, temp.path(), 0);

    let result = capture.capture(&CancellationToken::new()).await;

    assert!(matches!(result, Err(CaptureError::InvalidSegmentCount)));
    assert_eq!(source.playlist_requests(), 0);

    Ok(())
}

#[tokio::test]
async fn test_capture_over_http() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live/playlist.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(playlist(1..=3)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/live/media_3.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_string(segment_body(3)))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir()?;
    let output = temp.path().join("nested").join("capture.ts");
    let report = stream_capture::capture(
        &format!("{}/live/playlist.m3u8", server.uri()),
        1,
        &output,
        POLL_INTERVAL,
        &CancellationToken::new(),
    )
    .await
    .assert_success();

    assert_eq!(report.downloaded, vec![3]);
    assert_eq!(std::fs::read_to_string(&output)?, "seg-3");

    Ok(())
}

#[tokio::test]
async fn test_capture_rejects_invalid_url() {
    let temp = tempfile::tempdir().unwrap();
    let result = stream_capture::capture(
        "not a url",
        1,
        temp.path().join("capture.ts"),
        POLL_INTERVAL,
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(CaptureError::UrlParseError(_))));
}

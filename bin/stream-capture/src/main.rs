use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::bail;
use clap::Parser;
use fake_user_agent::get_chrome_rua;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Url,
};
use stream_capture::{
    capture::DEFAULT_POLL_INTERVAL,
    postprocess::{
        default_audio_path, default_subtitle_path, AudioExtractor, SubtitleExtractor,
        DEFAULT_WHISPER_MODEL,
    },
    store::staging_dir,
    CancellationToken, CaptureOptions, HlsFetcher, HttpClient, LiveCapture, SegmentStore,
};

mod interval;

use interval::Interval;

/// Capture a live HLS stream by downloading and merging its segments.
#[derive(Parser, Debug, Clone)]
#[clap(name = "stream-capture", version)]
pub struct CaptureArgs {
    /// M3U8 playlist URL
    #[clap(short, long)]
    url: String,

    /// Number of segments to download, starting from the latest
    #[clap(short, long, default_value = "10")]
    count: u64,

    /// Output file for merged segments (alternative to --output)
    #[clap(short, long)]
    merge: Option<PathBuf>,

    /// Output file for merged segments (alternative to --merge)
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Playlist polling interval, e.g. 2s, 500ms, 1m
    #[clap(short, long, default_value_t = Interval(DEFAULT_POLL_INTERVAL))]
    interval: Interval,

    /// Extract audio as MP3 from the merged video file
    #[clap(short, long)]
    audio: bool,

    /// Extract only audio. The merged video file is deleted afterwards.
    #[clap(long)]
    audio_only: bool,

    /// Output path for the audio file [default: <output>.mp3]
    #[clap(long)]
    audio_output: Option<PathBuf>,

    /// Transcribe the audio into subtitles with whisper. Implies --audio.
    #[clap(long)]
    subtitle: bool,

    /// Output path for the subtitle file [default: <audio>.srt]
    #[clap(long)]
    subtitle_output: Option<PathBuf>,

    /// Language code for transcription, e.g. tr or en. Auto-detected if omitted.
    #[clap(long)]
    subtitle_language: Option<String>,

    /// Whisper model used for transcription
    #[clap(long, default_value = DEFAULT_WHISPER_MODEL)]
    subtitle_model: String,

    /// Additional HTTP headers
    ///
    /// Custom header. eg. "User-Agent: xxxxx". Can be repeated.
    #[clap(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Cookies sent with every request, eg. "a=1; b=2"
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP timeout, in seconds
    #[clap(long, default_value = "30")]
    timeout: u64,

    /// Parent directory of the temporary segment directory
    #[clap(long, env = "TEMP")]
    temp_dir: Option<PathBuf>,

    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,
}

/// Resolved post-capture steps.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Plan {
    output: PathBuf,
    audio: Option<PathBuf>,
    subtitle: Option<PathBuf>,
    keep_video: bool,
}

impl CaptureArgs {
    fn plan(&self) -> anyhow::Result<Plan> {
        let extract_audio = self.audio || self.audio_only || self.subtitle;

        // --merge wins over --output
        let output = match (self.merge.clone().or_else(|| self.output.clone()), self.audio_only) {
            (Some(output), _) => output,
            (None, true) => self.temp_parent().join("stream-capture-temp.ts"),
            (None, false) => bail!("either --output or --merge is required"),
        };
        if self.audio_only && self.audio_output.is_none() {
            bail!("--audio-output is required when using --audio-only");
        }

        let audio = extract_audio.then(|| {
            self.audio_output
                .clone()
                .unwrap_or_else(|| default_audio_path(&output))
        });
        let subtitle = match (&audio, self.subtitle) {
            (Some(audio), true) => Some(
                self.subtitle_output
                    .clone()
                    .unwrap_or_else(|| default_subtitle_path(audio)),
            ),
            _ => None,
        };

        Ok(Plan {
            output,
            audio,
            subtitle,
            keep_video: !self.audio_only,
        })
    }

    fn temp_parent(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    fn client(&self, playlist_url: &Url) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let Some((key, value)) = header.split_once(':') else {
                bail!("Invalid header: {header}");
            };
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }

        let client = HttpClient::new(
            Client::builder()
                .default_headers(headers)
                .user_agent(get_chrome_rua())
                .timeout(Duration::from_secs(self.timeout)),
        )?;
        if let Some(cookies) = &self.cookies {
            client.add_cookies(cookies, playlist_url);
        }

        Ok(client)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// First ctrl-c cancels the capture, the second one exits immediately.
fn spawn_ctrlc_handler(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("Ctrl-C received, shutting down...");
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received again, force exit.");
            std::process::exit(1);
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CaptureArgs::parse();
    init_logging(args.verbose);

    let plan = args.plan()?;
    let playlist_url = Url::parse(&args.url)?;
    let client = args.client(&playlist_url)?;
    let poll_interval = args.interval.0;

    let cache_dir = staging_dir(args.temp_parent());
    let store = SegmentStore::new(HlsFetcher::new(client), &cache_dir)?;

    tracing::info!("Live stream capture started");
    tracing::info!("Playlist URL: {playlist_url}");
    tracing::info!("Target segments: {}", args.count);
    tracing::info!("Polling interval: {poll_interval:?}");
    tracing::info!("Temp directory: {}", cache_dir.display());

    let token = CancellationToken::new();
    let ctrlc_handler = spawn_ctrlc_handler(token.clone());

    let options = CaptureOptions::new(playlist_url, args.count, &plan.output)
        .with_poll_interval(poll_interval);
    let report = LiveCapture::new(store, options).capture(&token).await;
    ctrlc_handler.abort();
    let report = report?;

    if report.cancelled {
        tracing::info!(
            "Cancelled by user after {} of {} segments",
            report.downloaded_count(),
            report.requested
        );
        return Ok(());
    }
    let Some(output) = report.output else {
        return Ok(());
    };

    if let Some(audio) = &plan.audio {
        tracing::info!("Extracting audio to: {}", audio.display());
        AudioExtractor::new()?.extract(&output, audio).await?;
        tracing::info!("Successfully extracted audio to {}", audio.display());

        if let Some(subtitle) = &plan.subtitle {
            tracing::info!(
                "Extracting subtitles to: {} (model: {})",
                subtitle.display(),
                args.subtitle_model
            );
            SubtitleExtractor::new()?
                .extract(
                    audio,
                    subtitle,
                    args.subtitle_language.as_deref(),
                    &args.subtitle_model,
                )
                .await?;
            tracing::info!("Successfully extracted subtitles to {}", subtitle.display());
        }

        if !plan.keep_video {
            match tokio::fs::remove_file(&output).await {
                Ok(_) => tracing::info!("Removed temporary video file: {}", output.display()),
                Err(e) => tracing::warn!("Failed to remove temporary video file: {e}"),
            }
        }
    }

    Ok(())
}

//! External tools run against a finished capture.
//!
//! Both extractors shell out: `ffmpeg` turns the merged transport stream into an
//! MP3 track, and `whisper` transcribes that track into SRT subtitles. Neither
//! runs until [crate::LiveCapture::capture] has returned with an output path.

use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
};

use tokio::process::Command;

use crate::error::{CaptureError, CaptureResult};

pub const DEFAULT_WHISPER_MODEL: &str = "base";

pub struct AudioExtractor {
    ffmpeg: PathBuf,
}

impl AudioExtractor {
    /// Locate `ffmpeg` in `PATH`.
    pub fn new() -> CaptureResult<Self> {
        let ffmpeg = which::which("ffmpeg").inspect_err(|_| {
            tracing::error!("ffmpeg not found in PATH. {}", install_hint("ffmpeg"));
        })?;
        Ok(Self::with_executable(ffmpeg))
    }

    pub fn with_executable(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Extract the audio track of `video` as a 192k 44.1kHz MP3, overwriting `audio`.
    pub async fn extract(&self, video: &Path, audio: &Path) -> CaptureResult<()> {
        ensure_parent_dir(audio).await?;

        tracing::debug!("Extracting audio with {}", self.ffmpeg.display());
        let status = self.command(video, audio).status().await?;
        check_status("ffmpeg", status)
    }

    fn command(&self, video: &Path, audio: &Path) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-i")
            .arg(video)
            .args(["-vn", "-acodec", "libmp3lame", "-ab", "192k", "-ar", "44100", "-y"])
            .arg(audio);
        command
    }
}

pub struct SubtitleExtractor {
    whisper: PathBuf,
}

impl SubtitleExtractor {
    /// Locate `whisper` in `PATH`.
    pub fn new() -> CaptureResult<Self> {
        let whisper = which::which("whisper").inspect_err(|_| {
            tracing::error!("whisper not found in PATH. {}", install_hint("whisper"));
        })?;
        Ok(Self::with_executable(whisper))
    }

    pub fn with_executable(whisper: impl Into<PathBuf>) -> Self {
        Self {
            whisper: whisper.into(),
        }
    }

    /// Transcribe `audio` into an SRT file at `subtitle`.
    ///
    /// `language` is auto-detected by whisper when not given.
    pub async fn extract(
        &self,
        audio: &Path,
        subtitle: &Path,
        language: Option<&str>,
        model: &str,
    ) -> CaptureResult<()> {
        let output_dir = ensure_parent_dir(subtitle).await?;

        tracing::debug!("Transcribing with {}", self.whisper.display());
        let status = self
            .command(audio, &output_dir, language, model)
            .status()
            .await?;
        check_status("whisper", status)?;

        // whisper names its output after the input file
        let produced = whisper_output_path(audio, &output_dir);
        if produced != subtitle {
            tokio::fs::rename(&produced, subtitle).await?;
        }

        Ok(())
    }

    fn command(
        &self,
        audio: &Path,
        output_dir: &Path,
        language: Option<&str>,
        model: &str,
    ) -> Command {
        let mut command = Command::new(&self.whisper);
        command
            .arg(audio)
            .args(["--model", model])
            .arg("--output_dir")
            .arg(output_dir)
            .args(["--output_format", "srt"]);
        if let Some(language) = language {
            command.args(["--language", language]);
        }
        command
    }
}

/// `<video>.mp3` next to the captured file.
pub fn default_audio_path(video: &Path) -> PathBuf {
    video.with_extension("mp3")
}

/// `<audio>.srt` next to the audio file.
pub fn default_subtitle_path(audio: &Path) -> PathBuf {
    audio.with_extension("srt")
}

fn whisper_output_path(audio: &Path, output_dir: &Path) -> PathBuf {
    let mut file_name = audio.file_stem().unwrap_or_default().to_os_string();
    file_name.push(".srt");
    output_dir.join(file_name)
}

async fn ensure_parent_dir(path: &Path) -> CaptureResult<PathBuf> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;
    Ok(parent)
}

fn check_status(tool: &'static str, status: ExitStatus) -> CaptureResult<()> {
    if status.success() {
        Ok(())
    } else {
        Err(CaptureError::ExternalToolFailed { tool, status })
    }
}

fn install_hint(tool: &str) -> &'static str {
    match (tool, std::env::consts::OS) {
        ("ffmpeg", "macos") => "Install it with: brew install ffmpeg",
        ("ffmpeg", "linux") => {
            "Install it with your package manager, e.g. apt-get install ffmpeg or apk add ffmpeg"
        }
        ("ffmpeg", "windows") => {
            "Download it from https://ffmpeg.org/download.html and add its bin directory to PATH"
        }
        ("whisper", "macos") => "Install it with: brew install openai-whisper",
        ("whisper", _) => "Install it with: pip install openai-whisper (requires Python 3.8+)",
        _ => "See https://ffmpeg.org/download.html",
    }
}

//! Video downloading module.
//!
//! Downloads videos with `rusty_ytdl`, a pure Rust implementation that needs
//! no external tools. Each batch records a per-video outcome: one broken
//! video must not sink the rest of the playlist, and the caller needs to know
//! exactly which videos landed on disk before it prunes anything remotely.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusty_ytdl::{Video, VideoOptions, VideoQuality, VideoSearchOptions};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{DownloadOptions, DownloadQuality};
use crate::error::{Error, Result};

/// Attempts per video before recording it as failed.
const DOWNLOAD_RETRIES: u32 = 3;

/// Canonical watch URL for a video id.
#[must_use]
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Expand a leading `~` or `~/` to the user's home directory.
///
/// Only a bare `~` or a `~/` prefix is expanded; `~user` forms pass through
/// unchanged. If no home directory can be determined the path also passes
/// through and directory creation reports the real failure.
#[must_use]
pub fn resolve_destination(dest: &Path) -> PathBuf {
    let Some(s) = dest.to_str() else {
        return dest.to_path_buf();
    };

    let rest = if s == "~" {
        ""
    } else if let Some(rest) = s.strip_prefix("~/") {
        rest
    } else {
        return dest.to_path_buf();
    };

    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => dest.to_path_buf(),
    }
}

/// Sanitize a string for use as a filename.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

    let sanitized: String = name
        .chars()
        .map(|c| if invalid_chars.contains(&c) { '_' } else { c })
        .collect();

    // Trim whitespace and dots from ends
    let trimmed = sanitized.trim().trim_matches('.');

    // Limit length (leaving room for extension), never splitting a
    // multi-byte character
    if trimmed.len() > 200 {
        let mut end = 200;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        trimmed[..end].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Render an output file name from a template, substituting `{title}` and
/// `{id}`, then sanitize the result.
#[must_use]
pub fn render_file_name(template: &str, title: &str, video_id: &str) -> String {
    let rendered = template.replace("{title}", title).replace("{id}", video_id);
    sanitize_filename(&rendered)
}

/// Result of downloading a single video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// The video this outcome describes.
    pub video_id: String,
    /// Whether the video landed on disk.
    pub success: bool,
    /// Output file path (if successful).
    pub output_path: Option<PathBuf>,
    /// Error message (if failed).
    pub error: Option<String>,
}

impl DownloadOutcome {
    /// Record a successful download.
    #[must_use]
    pub const fn succeeded(video_id: String, output_path: PathBuf) -> Self {
        Self {
            video_id,
            success: true,
            output_path: Some(output_path),
            error: None,
        }
    }

    /// Record a failed download.
    #[must_use]
    pub const fn failed(video_id: String, error: String) -> Self {
        Self {
            video_id,
            success: false,
            output_path: None,
            error: Some(error),
        }
    }
}

/// Per-video outcomes for one playlist's download batch, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadReport {
    /// One outcome per requested video, index-aligned with the input batch.
    pub outcomes: Vec<DownloadOutcome>,
}

impl DownloadReport {
    /// Number of videos that landed on disk.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    /// Number of videos that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Whether every requested video downloaded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}

/// Download engine consumed by the run coordinator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoDownloader: Send + Sync {
    /// Download a batch of videos into `destination`.
    ///
    /// Individual failures are recorded in the report, not returned as
    /// errors; the error path is reserved for conditions that doom the whole
    /// batch, such as an uncreatable destination directory.
    async fn download(
        &self,
        video_ids: &[String],
        destination: &Path,
        options: &DownloadOptions,
    ) -> Result<DownloadReport>;
}

/// Pure Rust downloader using `rusty_ytdl`.
pub struct RustyYtdlDownloader;

impl RustyYtdlDownloader {
    /// Create a new downloader.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn download_single_video(
        video_id: &str,
        destination: &Path,
        options: &DownloadOptions,
    ) -> Result<PathBuf> {
        let video_url = watch_url(video_id);

        debug!("Downloading {video_id} using rusty_ytdl");

        // Combined video+audio streams are more reliable than audio-only,
        // which often gets 403 Forbidden from YouTube.
        let quality = match options.quality {
            DownloadQuality::Lowest => VideoQuality::Lowest,
            DownloadQuality::Highest => VideoQuality::Highest,
        };
        let video_opts = VideoOptions {
            quality,
            filter: VideoSearchOptions::VideoAudio,
            ..Default::default()
        };

        let video = Video::new_with_options(&video_url, video_opts).map_err(|e| {
            Error::Download {
                video_id: video_id.to_string(),
                reason: format!("Failed to create video instance: {e}"),
            }
        })?;

        let video_info = video.get_info().await.map_err(|e| Error::Download {
            video_id: video_id.to_string(),
            reason: format!("Failed to get video info: {e}"),
        })?;

        let title = video_info.video_details.title;
        let file_name = match options.output_template.as_deref() {
            Some(template) => render_file_name(template, &title, video_id),
            None => sanitize_filename(&title),
        };
        let output_path = destination.join(format!("{file_name}.mp4"));

        let stream = video.stream().await.map_err(|e| Error::Download {
            video_id: video_id.to_string(),
            reason: format!("Failed to create stream: {e}"),
        })?;

        debug!("Stream content length: {} bytes", stream.content_length());

        let mut file = fs::File::create(&output_path).map_err(|e| Error::Download {
            video_id: video_id.to_string(),
            reason: format!("Failed to create {}: {e}", output_path.display()),
        })?;

        let mut total_bytes = 0u64;
        while let Some(chunk) = stream.chunk().await.map_err(|e| Error::Download {
            video_id: video_id.to_string(),
            reason: format!("Failed to download chunk: {e}"),
        })? {
            total_bytes += chunk.len() as u64;
            file.write_all(&chunk).map_err(|e| Error::Download {
                video_id: video_id.to_string(),
                reason: format!("Failed to write chunk: {e}"),
            })?;
        }

        info!(
            "Downloaded {total_bytes} bytes: '{title}' -> {}",
            output_path.display()
        );
        Ok(output_path)
    }

    async fn download_with_retries(
        video_id: &str,
        destination: &Path,
        options: &DownloadOptions,
    ) -> DownloadOutcome {
        let mut last_error = String::new();

        for attempt in 1..=DOWNLOAD_RETRIES {
            match Self::download_single_video(video_id, destination, options).await {
                Ok(path) => return DownloadOutcome::succeeded(video_id.to_string(), path),
                Err(e) => {
                    warn!(
                        "Download attempt {attempt}/{DOWNLOAD_RETRIES} failed for {video_id}: {e}"
                    );
                    last_error = e.to_string();

                    if attempt < DOWNLOAD_RETRIES {
                        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                    }
                }
            }
        }

        error!("Failed to download {video_id}: {last_error}");
        DownloadOutcome::failed(video_id.to_string(), last_error)
    }
}

impl Default for RustyYtdlDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoDownloader for RustyYtdlDownloader {
    async fn download(
        &self,
        video_ids: &[String],
        destination: &Path,
        options: &DownloadOptions,
    ) -> Result<DownloadReport> {
        let destination = resolve_destination(destination);

        if !destination.exists() {
            fs::create_dir_all(&destination)?;
        }

        info!(
            "Downloading {} video(s) to {} (quality: {})",
            video_ids.len(),
            destination.display(),
            options.quality
        );

        let mut report = DownloadReport::default();
        for video_id in video_ids {
            let outcome = Self::download_with_retries(video_id, &destination, options).await;
            report.outcomes.push(outcome);
        }

        info!(
            "Download batch complete: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );

        Ok(report)
    }
}

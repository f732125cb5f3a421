//! Run coordination module.
//!
//! Orchestrates one complete run: enumerate the account's playlists once,
//! walk the configured rules in declaration order, and for each matched
//! playlist download its videos and prune the entries that landed on disk.
//!
//! Pruning is gated per entry: an entry is deleted remotely only when its
//! video downloaded successfully, so a failed download never loses the
//! remote copy. Deletions are best-effort; a failed delete is recorded and
//! the run moves on.

use tracing::{info, warn};

use crate::api::PlaylistService;
use crate::config::RunConfig;
use crate::download::VideoDownloader;
use crate::error::Result;

/// Outcome of processing one configured playlist rule.
#[derive(Debug, Clone)]
pub struct PlaylistOutcome {
    /// The configured playlist title.
    pub name: String,
    /// Whether a remote playlist with this title exists.
    pub matched: bool,
    /// Entries the playlist resolved to.
    pub entries: usize,
    /// Videos that landed on disk.
    pub downloaded: usize,
    /// Videos that failed to download.
    pub download_failures: usize,
    /// Entries removed from the remote playlist.
    pub pruned: usize,
    /// Entries whose removal failed.
    pub prune_failures: usize,
}

impl PlaylistOutcome {
    fn unmatched(name: String) -> Self {
        Self {
            name,
            matched: false,
            entries: 0,
            downloaded: 0,
            download_failures: 0,
            pruned: 0,
            prune_failures: 0,
        }
    }

    fn matched(name: String, entries: usize) -> Self {
        Self {
            name,
            matched: true,
            entries,
            downloaded: 0,
            download_failures: 0,
            pruned: 0,
            prune_failures: 0,
        }
    }
}

/// Aggregated result of one run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Per-rule outcomes, in configuration order.
    pub playlists: Vec<PlaylistOutcome>,
}

impl RunReport {
    /// Rules that matched a remote playlist.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.playlists.iter().filter(|p| p.matched).count()
    }

    /// Videos downloaded across all playlists.
    #[must_use]
    pub fn total_downloaded(&self) -> usize {
        self.playlists.iter().map(|p| p.downloaded).sum()
    }

    /// Entries pruned across all playlists.
    #[must_use]
    pub fn total_pruned(&self) -> usize {
        self.playlists.iter().map(|p| p.pruned).sum()
    }

    /// Download failures across all playlists.
    #[must_use]
    pub fn total_download_failures(&self) -> usize {
        self.playlists.iter().map(|p| p.download_failures).sum()
    }

    /// Prune failures across all playlists.
    #[must_use]
    pub fn total_prune_failures(&self) -> usize {
        self.playlists.iter().map(|p| p.prune_failures).sum()
    }

    /// Whether the run completed without per-item failures.
    ///
    /// A configured playlist missing remotely does not count as a failure;
    /// it is reported but does not affect the exit status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.total_download_failures() == 0 && self.total_prune_failures() == 0
    }

    /// Get a human-readable summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Run complete: {}/{} playlist(s) matched, {} video(s) downloaded ({} failed), {} entr(ies) pruned ({} failed)",
            self.matched(),
            self.playlists.len(),
            self.total_downloaded(),
            self.total_download_failures(),
            self.total_pruned(),
            self.total_prune_failures(),
        )
    }
}

/// Drives one run over a playlist service and a download engine.
pub struct Coordinator<S, D> {
    service: S,
    downloader: D,
}

impl<S, D> Coordinator<S, D>
where
    S: PlaylistService,
    D: VideoDownloader,
{
    /// Create a coordinator over the given service and download engine.
    pub const fn new(service: S, downloader: D) -> Self {
        Self {
            service,
            downloader,
        }
    }

    /// Execute one run over the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if playlist enumeration or entry resolution fails;
    /// per-video download failures and per-entry delete failures are
    /// recorded in the report instead.
    pub async fn run(&self, config: &RunConfig) -> Result<RunReport> {
        let mut report = RunReport::default();

        if config.is_empty() {
            warn!("No playlists configured; nothing to do");
            return Ok(report);
        }

        // One enumeration serves every rule.
        let playlists = self.service.list_playlists().await?;
        info!(
            "Found {} playlist(s) on the account, {} configured",
            playlists.len(),
            config.len()
        );

        for rule in &config.rules {
            let Some(playlist) = playlists.iter().find(|p| p.title() == rule.name) else {
                warn!("Configured playlist '{}' does not exist remotely", rule.name);
                report.playlists.push(PlaylistOutcome::unmatched(rule.name.clone()));
                continue;
            };

            let contents = self.service.list_entries(&playlist.id).await?;
            let mut outcome = PlaylistOutcome::matched(rule.name.clone(), contents.len());

            if contents.is_empty() {
                info!("Playlist '{}' is empty; nothing to download", rule.name);
                report.playlists.push(outcome);
                continue;
            }

            info!(
                "Processing playlist '{}' ({} entr(ies))",
                rule.name,
                contents.len()
            );

            let download_report = self
                .downloader
                .download(contents.video_ids(), &rule.policy.dest, &rule.policy.options)
                .await?;

            outcome.downloaded = download_report.succeeded();
            outcome.download_failures = download_report.failed();

            // Prune only entries whose video is safely on disk.
            for (entry_id, download) in contents
                .entry_ids()
                .iter()
                .zip(&download_report.outcomes)
            {
                if !download.success {
                    warn!(
                        "Keeping entry {entry_id}: video {} did not download",
                        download.video_id
                    );
                    continue;
                }

                match self.service.delete_entry(entry_id).await {
                    Ok(()) => outcome.pruned += 1,
                    Err(e) => {
                        warn!("Failed to delete entry {entry_id}: {e}");
                        outcome.prune_failures += 1;
                    }
                }
            }

            info!(
                "Playlist '{}': {} downloaded, {} pruned",
                rule.name, outcome.downloaded, outcome.pruned
            );
            report.playlists.push(outcome);
        }

        Ok(report)
    }
}

//! Error types for Tubesweep core operations.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Tubesweep core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Authorization against the YouTube API failed.
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// A YouTube API request returned a non-success status.
    #[error("YouTube API request failed with status {status}: {message}")]
    Api {
        /// HTTP status code returned by the API.
        status: u16,
        /// Error body or description.
        message: String,
    },

    /// A paginated listing never terminated within the page ceiling.
    #[error("Pagination for {context} exceeded {max_pages} pages without completing")]
    RunawayPagination {
        /// Which listing ran away (playlists, playlist items).
        context: String,
        /// The ceiling that was hit.
        max_pages: usize,
    },

    /// A video download failed.
    #[error("Download failed for video {video_id}: {reason}")]
    Download {
        /// The video that failed.
        video_id: String,
        /// Why the download failed.
        reason: String,
    },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

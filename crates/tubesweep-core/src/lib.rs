//! Tubesweep Core Library
//!
//! This crate provides the core functionality for the Tubesweep tool:
//! - OAuth authorization against the YouTube Data API
//! - Playlist enumeration and entry resolution
//! - Video downloading to configured local directories
//! - Pruning downloaded entries from remote playlists
//! - Single-instance run locking

pub mod api;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod download;
pub mod error;
pub mod lock;

pub use api::{PlaylistService, YouTubeApi};
pub use auth::Authenticator;
pub use config::RunConfig;
pub use coordinator::{Coordinator, RunReport};
pub use download::{RustyYtdlDownloader, VideoDownloader};
pub use error::{Error, Result};
pub use lock::{LockState, RunLock};

//! Run configuration management.
//!
//! The configuration file is a JSON object mapping playlist titles (as they
//! appear on YouTube) to a per-playlist policy: where downloaded videos land
//! and how the download engine is driven. The map's declaration order is
//! preserved, and playlists are processed in that order.
//!
//! ```json
//! {
//!     "Watch Later": { "dest": "~/videos", "options": {} },
//!     "Lectures": { "dest": "~/videos/lectures", "options": { "quality": "lowest" } }
//! }
//! ```
//!
//! A missing or malformed configuration file is fatal at startup; no partial
//! run is attempted.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default configuration file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Download quality setting passed through to the download engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadQuality {
    /// Smallest available combined stream.
    Lowest,
    /// Best available combined stream.
    #[default]
    Highest,
}

impl fmt::Display for DownloadQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lowest => write!(f, "lowest"),
            Self::Highest => write!(f, "highest"),
        }
    }
}

/// Options handed to the download engine for one playlist.
///
/// `output_template` names downloaded files; `{title}` and `{id}` are
/// substituted per video. When absent, the engine's built-in template is
/// used.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Stream quality to request.
    #[serde(default)]
    pub quality: DownloadQuality,
    /// Output file name template, without directory or extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_template: Option<String>,
}

/// Per-playlist policy: destination directory and download options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistPolicy {
    /// Directory downloaded videos are written to. `~` is expanded.
    pub dest: PathBuf,
    /// Options passed through to the download engine.
    #[serde(default)]
    pub options: DownloadOptions,
}

/// A configured playlist: its remote title plus the policy applied to it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlaylistRule {
    /// Playlist title as it appears on the remote service. Unique.
    pub name: String,
    /// Policy applied when this playlist is processed.
    pub policy: PlaylistPolicy,
}

/// The full run configuration: an ordered set of playlist rules.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunConfig {
    /// Rules in configuration-file declaration order.
    pub rules: Vec<PlaylistRule>,
}

impl RunConfig {
    /// Load configuration from the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        info!(
            "Loaded config from {} ({} playlist rule(s))",
            path.display(),
            config.rules.len()
        );
        debug!("Configured playlists: {:?}", config.names());

        Ok(config)
    }

    /// Titles of all configured playlists, in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Whether the given remote playlist title is configured.
    #[must_use]
    pub fn matches(&self, title: &str) -> bool {
        self.rules.iter().any(|r| r.name == title)
    }

    /// Number of configured rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no playlists are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// The configuration file is a JSON object, not an array, so deserialization
// goes through a map visitor to keep declaration order and reject duplicate
// playlist names up front.
impl<'de> Deserialize<'de> for RunConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RulesVisitor;

        impl<'de> Visitor<'de> for RulesVisitor {
            type Value = RunConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of playlist name to policy")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut rules: Vec<PlaylistRule> =
                    Vec::with_capacity(map.size_hint().unwrap_or(0));

                while let Some((name, policy)) = map.next_entry::<String, PlaylistPolicy>()? {
                    if name.trim().is_empty() {
                        return Err(serde::de::Error::custom("playlist name cannot be empty"));
                    }
                    if rules.iter().any(|r| r.name == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate playlist name: {name}"
                        )));
                    }
                    rules.push(PlaylistRule { name, policy });
                }

                Ok(RunConfig { rules })
            }
        }

        deserializer.deserialize_map(RulesVisitor)
    }
}

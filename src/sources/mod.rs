pub mod cleanup;
pub mod ytdlp;

use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::error::PlaybackResult;

pub use ytdlp::YtDlpResolver;

/// Metadata for a playable item, as returned by search or lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub id: String,
    pub title: String,
    pub uploader: Option<String>,
    pub url: String,
    pub duration: Option<Duration>,
}

/// Turns queries and URLs into metadata and local audio files.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Searches for up to `limit` results, best match first.
    async fn search(&self, query: &str, limit: usize) -> PlaybackResult<Vec<TrackInfo>>;

    /// Fetches metadata for a single URL.
    async fn lookup(&self, url: &str) -> PlaybackResult<TrackInfo>;

    /// Downloads the audio behind `url` and returns the local file path.
    ///
    /// Fails with [`PlaybackError::Resolution`](crate::error::PlaybackError::Resolution).
    async fn fetch_audio(&self, url: &str, title: &str) -> PlaybackResult<PathBuf>;
}

/// Local files of downloaded queue entries, keyed by entry id.
///
/// An entry is recorded when its download finishes and forgotten when the
/// file is deleted.
#[derive(Debug, Default)]
pub struct Downloads {
    files: DashMap<u64, PathBuf>,
}

impl Downloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry_id: u64, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!("📥 Entrada {} descargada en {}", entry_id, path.display());
        self.files.insert(entry_id, path);
    }

    pub fn path_for(&self, entry_id: u64) -> Option<PathBuf> {
        self.files.get(&entry_id).map(|p| p.value().clone())
    }

    pub fn forget(&self, entry_id: u64) -> Option<PathBuf> {
        self.files.remove(&entry_id).map(|(_, path)| path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.iter().any(|entry| entry.value() == path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

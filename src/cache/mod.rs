//! # Cache Module
//!
//! Short-lived in-memory caches used by the command layer.
//!
//! - **Track metadata**: URL lookups are answered from memory for an hour,
//!   saving a yt-dlp round trip when the same link is played again.
//! - **Search sessions**: see [`crate::bot::search`], built on the same
//!   [`TtlCache`].

pub mod ttl_cache;

pub use ttl_cache::TtlCache;

use std::time::Duration;
use tracing::info;

use crate::sources::TrackInfo;

pub const METADATA_TTL: Duration = Duration::from_secs(3600);

/// Metadata of looked-up URLs, keyed by normalized URL.
pub type MusicCache = TtlCache<String, TrackInfo>;

impl MusicCache {
    pub fn for_metadata() -> Self {
        Self::new(METADATA_TTL)
    }

    /// Removes expired entries. Call periodically from a background task.
    pub fn cleanup_old_entries(&self) {
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Limpieza de caché: {} entradas expiradas", removed);
        }
    }
}

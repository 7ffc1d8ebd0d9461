use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serenity::model::id::UserId;
use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::{debug, info};

use crate::sources::TrackInfo;

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Una canción en cola. Cada enqueue crea una entrada nueva con su propio id y archivo.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub entry_id: u64,
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub requested_by: UserId,
    pub audio_path: Option<PathBuf>,
    pub added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(info: TrackInfo, requested_by: UserId) -> Self {
        Self {
            entry_id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
            source_id: info.id,
            title: info.title,
            url: info.url,
            duration: info.duration,
            requested_by,
            audio_path: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_audio_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_path = Some(path.into());
        self
    }
}

/// Canciones pendientes, una lista ordenada por clave, detrás de un único lock.
#[derive(Debug)]
pub struct QueueStore<K> {
    queues: Mutex<HashMap<K, VecDeque<Track>>>,
}

impl<K> Default for QueueStore<K> {
    fn default() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> QueueStore<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: &K, track: Track) {
        debug!("➕ '{}' agregada a la cola {:?}", track.title, key);
        self.queues
            .lock()
            .entry(key.clone())
            .or_default()
            .push_back(track);
    }

    /// Inserta al principio, delante de todo lo que ya está en cola.
    pub fn push_front(&self, key: &K, track: Track) {
        self.queues
            .lock()
            .entry(key.clone())
            .or_default()
            .push_front(track);
    }

    pub fn pop(&self, key: &K) -> Option<Track> {
        self.queues.lock().get_mut(key)?.pop_front()
    }

    /// Quita y devuelve una entrada elegida al azar de forma uniforme.
    pub fn pop_random(&self, key: &K) -> Option<Track> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(key)?;
        if queue.is_empty() {
            return None;
        }

        let index = rand::thread_rng().gen_range(0..queue.len());
        let track = queue.remove(index);
        if let Some(ref t) = track {
            debug!("🔀 Elegida '{}' en la posición {}", t.title, index);
        }
        track
    }

    pub fn peek(&self, key: &K) -> Option<Track> {
        self.queues.lock().get(key)?.front().cloned()
    }

    /// Quita todas las entradas que coinciden y devuelve cuántas fueron.
    pub fn remove_by<F>(&self, key: &K, pred: F) -> usize
    where
        F: FnMut(&Track) -> bool,
    {
        self.drain_by(key, pred).len()
    }

    /// Quita todas las entradas que coinciden y las devuelve en orden de cola.
    pub fn drain_by<F>(&self, key: &K, mut pred: F) -> Vec<Track>
    where
        F: FnMut(&Track) -> bool,
    {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(key) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(queue.len());
        for track in queue.drain(..) {
            if pred(&track) {
                removed.push(track);
            } else {
                kept.push_back(track);
            }
        }
        *queue = kept;
        removed
    }

    pub fn clear(&self, key: &K) -> usize {
        let cleared = self
            .queues
            .lock()
            .remove(key)
            .map(|q| q.len())
            .unwrap_or(0);
        info!("🗑️ {} canciones eliminadas de la cola {:?}", cleared, key);
        cleared
    }

    /// Copia de la cola para recorrerla fuera del lock.
    pub fn get(&self, key: &K) -> Vec<Track> {
        self.queues
            .lock()
            .get(key)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, key: &K) -> usize {
        self.queues.lock().get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, key: &K) -> bool {
        self.len(key) == 0
    }

    pub fn total_duration(&self, key: &K) -> Duration {
        self.queues
            .lock()
            .get(key)
            .map(|q| q.iter().filter_map(|t| t.duration).sum())
            .unwrap_or_default()
    }
}

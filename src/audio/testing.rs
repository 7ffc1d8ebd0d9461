//! Dobles de los colaboradores del motor, compartidos por los tests unitarios.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use super::{
    controller::StopSignal,
    queue::Track,
    voice::{AudioSink, ConnectionHandle, VoiceConnection, VoiceConnector},
};
use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::TrackInfo,
    ui::notifier::{Notice, Notifier},
};

#[derive(Default)]
pub struct RecordingNotifier {
    now_playing: Mutex<Vec<(GuildId, Track)>>,
    errors: Mutex<Vec<(GuildId, PlaybackError)>>,
    notices: Mutex<Vec<(GuildId, Notice)>>,
}

impl RecordingNotifier {
    pub fn now_playing_titles(&self) -> Vec<String> {
        self.now_playing
            .lock()
            .iter()
            .map(|(_, t)| t.title.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<(GuildId, PlaybackError)> {
        self.errors.lock().clone()
    }

    pub fn notices(&self) -> Vec<(GuildId, Notice)> {
        self.notices.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn now_playing(&self, guild_id: GuildId, track: &Track) {
        self.now_playing.lock().push((guild_id, track.clone()));
    }

    async fn report_error(&self, guild_id: GuildId, error: &PlaybackError) {
        self.errors.lock().push((guild_id, error.clone()));
    }

    async fn announce(&self, guild_id: GuildId, notice: Notice) {
        self.notices.lock().push((guild_id, notice));
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    listeners: AtomicUsize,
    disconnected: AtomicBool,
}

impl FakeConnection {
    pub fn new(guild_id: GuildId, channel_id: ChannelId, listeners: usize) -> Arc<Self> {
        Arc::new(Self {
            guild_id,
            channel_id,
            listeners: AtomicUsize::new(listeners),
            disconnected: AtomicBool::new(false),
        })
    }

    pub fn set_listeners(&self, n: usize) {
        self.listeners.store(n, Ordering::SeqCst);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> Option<ChannelId> {
        Some(self.channel_id)
    }

    async fn human_listeners(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> PlaybackResult<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConnector {
    joins: AtomicUsize,
    fail: AtomicBool,
    delay: Option<Duration>,
    last: Mutex<Option<Arc<FakeConnection>>>,
}

impl FakeConnector {
    pub fn failing() -> Self {
        let connector = Self::default();
        connector.fail.store(true, Ordering::SeqCst);
        connector
    }

    /// Tarda `delay` en completar cada join. `joins` cuenta el join en cuanto empieza.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn last_connection(&self) -> Option<Arc<FakeConnection>> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<ConnectionHandle> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlaybackError::Voice("missing Connect permission".into()));
        }
        self.joins.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let connection = FakeConnection::new(guild_id, channel_id, 1);
        *self.last.lock() = Some(connection.clone());
        Ok(connection)
    }
}

/// Cómo terminó un stream simulado.
#[derive(Debug, Clone, PartialEq)]
pub struct Streamed {
    pub path: PathBuf,
    pub stopped: bool,
}

/// Sink que "reproduce" cada archivo durante un tiempo fijo salvo que lo detengan antes.
pub struct FakeSink {
    track_len: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    started: Mutex<Vec<PathBuf>>,
    finished: Mutex<Vec<Streamed>>,
}

impl FakeSink {
    pub fn new(track_len: Duration) -> Self {
        Self {
            track_len,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<PathBuf> {
        self.started.lock().clone()
    }

    pub fn finished(&self) -> Vec<Streamed> {
        self.finished.lock().clone()
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn stream(&self, _connection: ConnectionHandle, path: &Path, mut stop: StopSignal) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.started.lock().push(path.to_path_buf());

        let stopped = tokio::select! {
            _ = stop.fired() => true,
            _ = tokio::time::sleep(self.track_len) => false,
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().push(Streamed {
            path: path.to_path_buf(),
            stopped,
        });
    }
}

pub fn track_info(title: &str) -> TrackInfo {
    TrackInfo {
        id: title.to_lowercase().replace(' ', "-"),
        title: title.to_string(),
        uploader: None,
        url: format!("https://www.youtube.com/watch?v={}", title.replace(' ', "")),
        duration: Some(Duration::from_secs(180)),
    }
}

pub fn track(title: &str, user: u64) -> Track {
    Track::new(track_info(title), UserId::new(user))
}

/// Escribe un archivo de audio ficticio y devuelve su ruta.
pub fn audio_file(dir: &Path, track: &Track) -> PathBuf {
    let path = dir.join(format!("{}-{}.mp3", track.source_id, track.entry_id));
    std::fs::write(&path, b"ID3").expect("write fake audio file");
    path
}

/// Consulta `cond` hasta que se cumpla o pase `within`.
pub async fn eventually(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

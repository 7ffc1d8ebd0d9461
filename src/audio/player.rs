use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{io, path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::{
    controller::{PlaybackController, Signal},
    idle::{IdleMonitor, IdleSettings},
    queue::{QueueStore, Track},
    reporter::ErrorReporter,
    state::{GuildRegistry, StreamStart},
    voice::{AudioSink, ConnectionHandle, VoiceConnector},
};
use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::{Downloads, MediaResolver, TrackInfo},
    ui::notifier::{Notice, Notifier},
};

/// Tiempos configurables del motor.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackSettings {
    /// Cada cuánto un stream en curso renueva la última actividad de la guild.
    pub heartbeat_interval: Duration,
    pub idle: IdleSettings,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            idle: IdleSettings::default(),
        }
    }
}

/// Colaboradores externos del motor.
pub struct Collaborators {
    pub resolver: Arc<dyn MediaResolver>,
    pub sink: Arc<dyn AudioSink>,
    pub connector: Arc<dyn VoiceConnector>,
    pub notifier: Arc<dyn Notifier>,
    pub downloads: Arc<Downloads>,
}

/// Un pedido de `play` que ya tiene sus metadatos.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub text_channel: ChannelId,
    pub requester: UserId,
    /// Canal al que se une el bucle si la guild aún no tiene conexión.
    pub voice_channel: Option<ChannelId>,
    pub info: TrackInfo,
}

/// Por qué un comando de control no hizo nada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("not connected to a voice channel")]
    NotInVoice,
    #[error("nothing is playing")]
    NothingPlaying,
    #[error("nothing is paused")]
    NothingToResume,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipUserReport {
    pub removed: usize,
    pub files_deleted: usize,
    pub skipped_current: bool,
}

/// Cómo terminó una pasada sobre la cola.
enum Pass {
    Drained,
    /// Una canción sonó, o se descartó antes de poder empezar.
    Streamed,
    Idle,
}

struct Inner {
    registry: Arc<GuildRegistry>,
    queues: QueueStore<GuildId>,
    downloads: Arc<Downloads>,
    resolver: Arc<dyn MediaResolver>,
    sink: Arc<dyn AudioSink>,
    connector: Arc<dyn VoiceConnector>,
    notifier: Arc<dyn Notifier>,
    reporter: ErrorReporter,
    idle: IdleMonitor,
    settings: PlaybackSettings,
}

/// Motor de reproducción por guild.
///
/// Clonarlo es barato y todos los clones manejan el mismo registro y las
/// mismas colas. Los comandos solo tocan estado y envían señales. El bucle de
/// cada guild es el único sitio que saca de la cola y reproduce audio.
#[derive(Clone)]
pub struct AudioPlayer {
    inner: Arc<Inner>,
}

impl AudioPlayer {
    /// Construye el motor y lanza su reporter de errores. Requiere un runtime de tokio.
    pub fn new(parts: Collaborators, settings: PlaybackSettings) -> Self {
        Self::with_registry(Arc::new(GuildRegistry::new()), parts, settings)
    }

    /// Como [`AudioPlayer::new`], compartiendo un registro que ya tienen los colaboradores.
    pub fn with_registry(
        registry: Arc<GuildRegistry>,
        parts: Collaborators,
        settings: PlaybackSettings,
    ) -> Self {
        let (reporter, _task) = ErrorReporter::spawn(parts.notifier.clone());
        let idle = IdleMonitor::new(registry.clone(), parts.notifier.clone(), settings.idle);

        Self {
            inner: Arc::new(Inner {
                registry,
                queues: QueueStore::new(),
                downloads: parts.downloads,
                resolver: parts.resolver,
                sink: parts.sink,
                connector: parts.connector,
                notifier: parts.notifier,
                reporter,
                idle,
                settings,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<GuildRegistry> {
        &self.inner.registry
    }

    pub fn resolver(&self) -> &Arc<dyn MediaResolver> {
        &self.inner.resolver
    }

    pub fn downloads(&self) -> &Arc<Downloads> {
        &self.inner.downloads
    }

    /// Registra una canción y la descarga en segundo plano.
    ///
    /// La entrada llega a la cola solo cuando su archivo está en disco. Una
    /// descarga fallida se notifica a la guild y no se encola nada.
    pub fn enqueue(&self, request: PlayRequest) -> Track {
        let PlayRequest {
            guild_id,
            text_channel,
            requester,
            voice_channel,
            info,
        } = request;

        let registry = &self.inner.registry;
        registry.set_text_channel(guild_id, text_channel);
        if voice_channel.is_some() {
            registry.set_voice_target(guild_id, voice_channel);
        }
        registry.touch(guild_id);

        let track = Track::new(info, requester);
        let player = self.clone();
        let pending = track.clone();
        tokio::spawn(async move { player.download_and_queue(guild_id, pending).await });

        info!("📥 Descargando '{}' para guild {}", track.title, guild_id);
        track
    }

    async fn download_and_queue(&self, guild_id: GuildId, track: Track) {
        match self.inner.resolver.fetch_audio(&track.url, &track.title).await {
            Ok(path) => {
                self.inner.downloads.record(track.entry_id, &path);
                let track = track.with_audio_path(path);
                self.push_ready(guild_id, track.clone());
                self.inner
                    .notifier
                    .announce(guild_id, Notice::Queued(track))
                    .await;
            }
            Err(e) => {
                error!("❌ Falló la descarga de '{}': {}", track.title, e);
                self.inner.reporter.report(guild_id, e);
            }
        }
    }

    /// Encola una canción con el archivo listo y se asegura de que un bucle la reproduzca.
    pub fn push_ready(&self, guild_id: GuildId, track: Track) {
        debug!("➕ '{}' lista en la cola de guild {}", track.title, guild_id);
        self.inner.queues.add(&guild_id, track);
        self.inner.registry.touch(guild_id);
        self.start_playback_if_idle(guild_id);
    }

    fn start_playback_if_idle(&self, guild_id: GuildId) {
        if self.inner.registry.try_claim_loop(guild_id) {
            let player = self.clone();
            tokio::spawn(async move { player.run_loop(guild_id).await });
            info!("▶️ Bucle de reproducción iniciado en guild {}", guild_id);
        }
        self.inner.registry.controller(guild_id).signal_new_track();
    }

    /// Detiene el stream en curso y lo guarda como canción pausada.
    ///
    /// Una canción que aún se está conectando también se pausa y no llega a sonar.
    pub fn pause(&self, guild_id: GuildId) -> Result<Track, ControlError> {
        let registry = &self.inner.registry;
        let track = registry
            .pause_current(guild_id)
            .ok_or_else(|| self.refusal(guild_id))?;
        registry.controller(guild_id).signal_stop();
        info!("⏸️ '{}' pausada en guild {}", track.title, guild_id);
        Ok(track)
    }

    /// Por qué un comando de control no encontró canción actual.
    fn refusal(&self, guild_id: GuildId) -> ControlError {
        if self.inner.registry.is_in_voice(guild_id) {
            ControlError::NothingPlaying
        } else {
            ControlError::NotInVoice
        }
    }

    /// Devuelve la canción pausada al principio de la cola. Empieza de nuevo desde el inicio.
    pub fn resume(&self, guild_id: GuildId) -> Result<Track, ControlError> {
        let track = self
            .inner
            .registry
            .take_paused(guild_id)
            .ok_or(ControlError::NothingToResume)?;

        self.inner.queues.push_front(&guild_id, track.clone());
        self.inner.registry.touch(guild_id);
        self.start_playback_if_idle(guild_id);
        info!("▶️ '{}' reanudada en guild {}", track.title, guild_id);
        Ok(track)
    }

    pub fn skip(&self, guild_id: GuildId) -> Result<Track, ControlError> {
        let registry = &self.inner.registry;
        let current = registry
            .skip_current_if(guild_id, |_| true)
            .ok_or_else(|| self.refusal(guild_id))?;

        let controller = registry.controller(guild_id);
        controller.signal_stop();
        controller.signal_new_track();
        info!("⏭️ '{}' saltada en guild {}", current.title, guild_id);
        Ok(current)
    }

    /// Quita de la cola todo lo pedido por `user` y salta la canción actual
    /// si es suya.
    pub async fn skip_user(&self, guild_id: GuildId, user: UserId) -> SkipUserReport {
        let removed = self
            .inner
            .queues
            .drain_by(&guild_id, |t| t.requested_by == user);

        let mut files_deleted = 0;
        for track in &removed {
            if self.discard_file(track).await {
                files_deleted += 1;
            }
        }

        let registry = &self.inner.registry;
        let skipped_current = registry
            .skip_current_if(guild_id, |t| t.requested_by == user)
            .is_some();
        if skipped_current {
            let controller = registry.controller(guild_id);
            controller.signal_stop();
            controller.signal_new_track();
        }

        info!(
            "🧹 {} canciones de {} eliminadas en guild {}",
            removed.len(),
            user,
            guild_id
        );
        SkipUserReport {
            removed: removed.len(),
            files_deleted,
            skipped_current,
        }
    }

    /// Detiene la reproducción, vacía la cola y sale del canal de voz.
    ///
    /// Devuelve cuántas entradas en cola se descartaron.
    pub async fn stop(&self, guild_id: GuildId) -> usize {
        let registry = &self.inner.registry;
        let controller = registry.controller(guild_id);
        // Antes de la señal: una pista que aún se conecta ya no arranca
        registry.bump_stop_epoch(guild_id);
        controller.signal_stop();

        let cleared = self.clear_queue(guild_id).await;
        if let Some(paused) = registry.take_paused(guild_id) {
            self.discard_file(&paused).await;
        }

        if let Some(connection) = registry.leave_voice(guild_id) {
            if let Err(e) = connection.disconnect().await {
                self.inner.reporter.report(guild_id, e);
            }
        }
        registry.finish_track(guild_id);
        if !controller.is_streaming() {
            controller.signal_halt();
        }

        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        cleared
    }

    pub async fn clear_queue(&self, guild_id: GuildId) -> usize {
        let drained = self.inner.queues.drain_by(&guild_id, |_| true);
        for track in &drained {
            self.discard_file(track).await;
        }
        drained.len()
    }

    pub fn set_shuffle(&self, guild_id: GuildId, enabled: bool) {
        self.inner.registry.set_shuffle(guild_id, enabled);
    }

    pub fn queue(&self, guild_id: GuildId) -> Vec<Track> {
        self.inner.queues.get(&guild_id)
    }

    pub fn queue_duration(&self, guild_id: GuildId) -> Duration {
        self.inner.queues.total_duration(&guild_id)
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        self.inner.registry.current_track(guild_id)
    }

    pub fn signal_stop(&self, guild_id: GuildId) -> bool {
        self.inner.registry.controller(guild_id).signal_stop()
    }

    pub fn signal_new_track(&self, guild_id: GuildId) -> bool {
        self.inner.registry.controller(guild_id).signal_new_track()
    }

    /// Detiene todas las guilds conocidas. Se usa al apagar el proceso.
    pub async fn shutdown(&self) {
        let guilds = self.inner.registry.guild_ids();
        info!("🛑 Deteniendo la reproducción en {} guilds", guilds.len());
        join_all(guilds.into_iter().map(|guild_id| self.stop(guild_id))).await;
    }

    async fn run_loop(self, guild_id: GuildId) {
        let registry = self.inner.registry.clone();
        let controller = registry.controller(guild_id);
        let mut listener = match controller.try_listen() {
            Some(listener) => listener,
            None => {
                debug!("⏳ Esperando a que termine el bucle anterior de guild {}", guild_id);
                controller.listen().await
            }
        };

        loop {
            if listener.next().await == Signal::Halt {
                controller.clear_stale_stream();
                registry.finish_track(guild_id);
                debug!("🔕 Señal de halt atendida en guild {}", guild_id);
                continue;
            }

            if registry.is_playing(guild_id) {
                continue;
            }
            if registry.is_paused(guild_id) {
                debug!("⏸️ Guild {} en pausa, no se inicia nada", guild_id);
                continue;
            }

            match self.play_next(guild_id, &controller).await {
                Pass::Drained => {
                    let queues = &self.inner.queues;
                    if registry.retire_loop(guild_id, || queues.is_empty(&guild_id)) {
                        info!("💤 Cola vacía, bucle de reproducción terminado en guild {}", guild_id);
                        return;
                    }
                    controller.signal_new_track();
                }
                Pass::Streamed => {
                    if !registry.is_paused(guild_id) {
                        controller.signal_new_track();
                    }
                }
                Pass::Idle => {}
            }
        }
    }

    /// Saca entradas hasta que una suene, se vacíe la cola o no haya voz disponible.
    async fn play_next(&self, guild_id: GuildId, controller: &PlaybackController) -> Pass {
        let Inner {
            registry,
            queues,
            notifier,
            reporter,
            sink,
            ..
        } = &*self.inner;

        loop {
            if queues.is_empty(&guild_id) {
                registry.finish_track(guild_id);
                return Pass::Drained;
            }
            // Sin conexión ni canal al que unirse, las entradas esperan en la cola
            if !registry.can_reach_voice(guild_id) {
                debug!("🔇 Guild {} sin canal de voz, la cola espera", guild_id);
                registry.finish_track(guild_id);
                return Pass::Idle;
            }

            let claim = registry.track_claim(guild_id);
            let next = if registry.shuffle(guild_id) {
                queues.pop_random(&guild_id)
            } else {
                queues.pop(&guild_id)
            };
            let Some(track) = next else {
                registry.finish_track(guild_id);
                return Pass::Drained;
            };

            registry.begin_track(guild_id, track.clone());
            notifier.now_playing(guild_id, &track).await;

            let Some(path) = self.ready_file(&track).await else {
                warn!("⚠️ '{}' no está lista, se salta", track.title);
                reporter.report(
                    guild_id,
                    PlaybackError::resolution(&track.title, "audio file is not ready, skipping"),
                );
                self.inner.downloads.forget(track.entry_id);
                registry.finish_track(guild_id);
                continue;
            };

            let connection = match self.ensure_connection(guild_id).await {
                Ok(connection) => connection,
                Err(e) => {
                    reporter.report(guild_id, e);
                    registry.finish_track(guild_id);
                    self.discard_file(&track).await;
                    return Pass::Idle;
                }
            };

            let (ticket, stop) = match registry.start_stream(guild_id, claim) {
                Ok(StreamStart::Ready(ticket, stop)) => (ticket, stop),
                Ok(StreamStart::Stopped) => {
                    debug!("⏹️ '{}' detenida antes de empezar", track.title);
                    registry.finish_track(guild_id);
                    if let Some(connection) = registry.leave_voice(guild_id) {
                        if let Err(e) = connection.disconnect().await {
                            reporter.report(guild_id, e);
                        }
                    }
                    if !self.still_owned(guild_id, &track) {
                        self.discard_file(&track).await;
                    }
                    return Pass::Streamed;
                }
                Ok(StreamStart::Skipped) => {
                    debug!("⏭️ '{}' saltada antes de empezar", track.title);
                    registry.finish_track(guild_id);
                    if !self.still_owned(guild_id, &track) {
                        self.discard_file(&track).await;
                    }
                    return Pass::Streamed;
                }
                Err(e) => {
                    reporter.report(guild_id, e);
                    registry.finish_track(guild_id);
                    queues.push_front(&guild_id, track);
                    return Pass::Idle;
                }
            };

            info!("🎵 Reproduciendo '{}' en guild {}", track.title, guild_id);
            let heartbeat = self.heartbeat(guild_id);
            sink.stream(connection, &path, stop).await;
            drop(heartbeat);

            registry.finish_track(guild_id);
            controller.clear_stream(ticket);
            registry.touch(guild_id);

            if !self.still_owned(guild_id, &track) {
                self.discard_file(&track).await;
            }
            return Pass::Streamed;
        }
    }

    async fn ready_file(&self, track: &Track) -> Option<PathBuf> {
        let path = self
            .inner
            .downloads
            .path_for(track.entry_id)
            .or_else(|| track.audio_path.clone())?;
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            _ => None,
        }
    }

    async fn ensure_connection(&self, guild_id: GuildId) -> PlaybackResult<ConnectionHandle> {
        let registry = &self.inner.registry;
        if let Some(connection) = registry.connection(guild_id) {
            return Ok(connection);
        }

        let channel_id = registry
            .voice_target(guild_id)
            .ok_or(PlaybackError::Connection(guild_id))?;
        let connection = self.inner.connector.join(guild_id, channel_id).await?;

        registry.save_connection(guild_id, connection.clone());
        registry.set_in_voice(guild_id, true);
        registry.touch(guild_id);
        self.inner.idle.start(guild_id);
        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(connection)
    }

    /// Mantiene al día la última actividad de la guild hasta que cae el guard devuelto.
    fn heartbeat(&self, guild_id: GuildId) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let registry = self.inner.registry.clone();
        let period = self.inner.settings.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => registry.touch(guild_id),
                }
            }
        });

        token.drop_guard()
    }

    /// Si la canción pausada o una entrada reencolada aún necesita el archivo.
    fn still_owned(&self, guild_id: GuildId, track: &Track) -> bool {
        self.inner.registry.is_paused_entry(guild_id, track.entry_id)
            || self
                .inner
                .queues
                .get(&guild_id)
                .iter()
                .any(|t| t.entry_id == track.entry_id)
    }

    /// Borra el archivo local de la entrada. Devuelve si se eliminó alguno.
    async fn discard_file(&self, track: &Track) -> bool {
        let Some(path) = self
            .inner
            .downloads
            .forget(track.entry_id)
            .or_else(|| track.audio_path.clone())
        else {
            return false;
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("🗑️ Eliminado {}", path.display());
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Error al eliminar {}: {}", path.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{
        audio_file, eventually, track, track_info, FakeConnector, FakeSink, RecordingNotifier,
    };
    use crate::audio::voice::VoiceConnection;
    use crate::sources::MockMediaResolver;
    use crate::ui::notifier::LeaveReason;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(3);

    struct Harness {
        player: AudioPlayer,
        sink: Arc<FakeSink>,
        connector: Arc<FakeConnector>,
        notifier: Arc<RecordingNotifier>,
        dir: TempDir,
        guild: GuildId,
    }

    fn harness_with(track_len: Duration, resolver: MockMediaResolver, connector: FakeConnector) -> Harness {
        harness_configured(track_len, resolver, connector, PlaybackSettings::default())
    }

    fn harness_configured(
        track_len: Duration,
        resolver: MockMediaResolver,
        connector: FakeConnector,
        settings: PlaybackSettings,
    ) -> Harness {
        let sink = Arc::new(FakeSink::new(track_len));
        let connector = Arc::new(connector);
        let notifier = Arc::new(RecordingNotifier::default());
        let player = AudioPlayer::new(
            Collaborators {
                resolver: Arc::new(resolver),
                sink: sink.clone(),
                connector: connector.clone(),
                notifier: notifier.clone(),
                downloads: Arc::new(Downloads::new()),
            },
            settings,
        );

        let guild = GuildId::new(1000);
        player
            .registry()
            .set_voice_target(guild, Some(ChannelId::new(55)));

        Harness {
            player,
            sink,
            connector,
            notifier,
            dir: TempDir::new().unwrap(),
            guild,
        }
    }

    fn harness(track_len: Duration) -> Harness {
        harness_with(track_len, MockMediaResolver::new(), FakeConnector::default())
    }

    fn slow_join_harness() -> Harness {
        harness_with(
            Duration::from_secs(30),
            MockMediaResolver::new(),
            FakeConnector::slow(Duration::from_millis(300)),
        )
    }

    impl Harness {
        /// Una canción con su archivo en disco, tal como la entrega la descarga.
        fn ready(&self, title: &str, user: u64) -> Track {
            let t = track(title, user);
            let path = audio_file(self.dir.path(), &t);
            self.player.downloads().record(t.entry_id, &path);
            t.with_audio_path(path)
        }

        fn path_of(t: &Track) -> PathBuf {
            t.audio_path.clone().unwrap()
        }

        fn loop_running(&self) -> bool {
            self.player.registry().is_loop_running(self.guild)
        }
    }

    #[tokio::test]
    async fn plays_a_track_to_the_end_and_goes_idle() {
        let h = harness(Duration::from_millis(50));
        let a = h.ready("A", 1);
        h.player.push_ready(h.guild, a.clone());

        assert!(eventually(WAIT, || h.sink.finished().len() == 1).await);
        assert!(eventually(WAIT, || !h.loop_running()).await);

        assert_eq!(h.connector.joins(), 1);
        assert_eq!(h.notifier.now_playing_titles(), vec!["A".to_string()]);
        assert!(!h.sink.finished()[0].stopped);
        assert!(!Harness::path_of(&a).exists());

        let registry = h.player.registry();
        assert!(!registry.is_playing(h.guild));
        assert_eq!(registry.current_track(h.guild), None);
        assert!(registry.is_in_voice(h.guild), "going idle does not leave voice");
        assert!(registry.idle_monitor_generation(h.guild).is_some());
    }

    #[tokio::test]
    async fn skip_moves_on_to_the_next_track() {
        let h = harness(Duration::from_secs(30));
        let a = h.ready("A", 1);
        let b = h.ready("B", 1);
        h.player.push_ready(h.guild, a.clone());
        h.player.push_ready(h.guild, b.clone());

        assert!(eventually(WAIT, || h.sink.started().len() == 1).await);
        let skipped = h.player.skip(h.guild).unwrap();
        assert_eq!(skipped.entry_id, a.entry_id);

        assert!(eventually(WAIT, || h.sink.started().len() == 2).await);
        assert_eq!(h.sink.started()[1], Harness::path_of(&b));
        assert!(h.sink.finished()[0].stopped);
        assert_eq!(
            h.notifier.now_playing_titles(),
            vec!["A".to_string(), "B".to_string()]
        );
        assert!(eventually(WAIT, || !Harness::path_of(&a).exists()).await);
        assert_eq!(h.player.now_playing(h.guild).map(|t| t.title), Some("B".into()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn a_burst_of_wakes_never_overlaps_streams() {
        let h = harness(Duration::from_millis(20));
        let tracks: Vec<Track> = (0..5).map(|i| h.ready(&format!("T{}", i), 1)).collect();

        let tasks = tracks.into_iter().map(|t| {
            let player = h.player.clone();
            let guild = h.guild;
            tokio::spawn(async move {
                player.push_ready(guild, t);
                for _ in 0..10 {
                    player.signal_new_track(guild);
                    tokio::task::yield_now().await;
                }
            })
        });
        for joined in join_all(tasks).await {
            joined.unwrap();
        }

        assert!(eventually(WAIT, || h.sink.finished().len() == 5).await);
        assert_eq!(h.sink.max_active(), 1);
        assert!(eventually(WAIT, || !h.loop_running()).await);
    }

    #[tokio::test]
    async fn pause_keeps_the_file_and_resume_restarts_it() {
        let h = harness(Duration::from_secs(30));
        let a = h.ready("A", 1);
        h.player.push_ready(h.guild, a.clone());
        assert!(eventually(WAIT, || h.sink.started().len() == 1).await);

        let paused = h.player.pause(h.guild).unwrap();
        assert_eq!(paused.entry_id, a.entry_id);
        assert!(eventually(WAIT, || h.sink.finished().len() == 1).await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.sink.started().len(), 1, "a paused guild starts nothing");
        assert!(Harness::path_of(&a).exists());
        assert!(h.player.registry().is_paused(h.guild));
        assert!(!h.player.registry().is_playing(h.guild));

        let resumed = h.player.resume(h.guild).unwrap();
        assert_eq!(resumed.entry_id, a.entry_id);
        assert!(!h.player.registry().is_paused(h.guild));
        assert!(eventually(WAIT, || h.sink.started().len() == 2).await);
        assert_eq!(h.sink.started()[1], Harness::path_of(&a));
    }

    #[tokio::test]
    async fn tracks_queued_while_paused_wait_for_resume() {
        let h = harness(Duration::from_secs(30));
        h.player.push_ready(h.guild, h.ready("A", 1));
        assert!(eventually(WAIT, || h.sink.started().len() == 1).await);
        h.player.pause(h.guild).unwrap();
        assert!(eventually(WAIT, || h.sink.finished().len() == 1).await);

        h.player.push_ready(h.guild, h.ready("B", 1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.sink.started().len(), 1);

        h.player.resume(h.guild).unwrap();
        assert!(eventually(WAIT, || h.sink.started().len() == 2).await);
        assert_eq!(
            h.player.now_playing(h.guild).map(|t| t.title),
            Some("A".into())
        );
        assert_eq!(h.player.queue(h.guild).len(), 1);
    }

    #[tokio::test]
    async fn resume_without_a_snapshot_changes_nothing() {
        let h = harness(Duration::from_secs(1));
        assert_eq!(h.player.resume(h.guild), Err(ControlError::NothingToResume));
        assert!(h.player.queue(h.guild).is_empty());
        assert!(!h.loop_running());
    }

    #[tokio::test]
    async fn commands_need_an_active_stream() {
        let h = harness(Duration::from_secs(1));
        assert_eq!(h.player.pause(h.guild), Err(ControlError::NotInVoice));
        assert_eq!(h.player.skip(h.guild).unwrap_err(), ControlError::NotInVoice);

        h.player.registry().set_in_voice(h.guild, true);
        assert_eq!(h.player.pause(h.guild), Err(ControlError::NothingPlaying));
        assert_eq!(h.player.skip(h.guild).unwrap_err(), ControlError::NothingPlaying);
        assert!(!h.player.signal_stop(h.guild));
    }

    #[tokio::test]
    async fn missing_file_is_reported_and_skipped() {
        let h = harness(Duration::from_millis(20));
        let a = h.ready("A", 1);
        std::fs::remove_file(Harness::path_of(&a)).unwrap();
        let b = h.ready("B", 1);
        h.player.push_ready(h.guild, a);
        h.player.push_ready(h.guild, b.clone());

        assert!(eventually(WAIT, || h.sink.finished().len() == 1).await);
        assert_eq!(h.sink.started(), vec![Harness::path_of(&b)]);
        assert!(eventually(WAIT, || !h.notifier.errors().is_empty()).await);
        assert!(matches!(
            &h.notifier.errors()[0].1,
            PlaybackError::Resolution { title, .. } if title == "A"
        ));
        assert!(h.player.queue(h.guild).is_empty());
    }

    #[tokio::test]
    async fn failed_join_reports_and_drops_the_file() {
        let h = harness_with(
            Duration::from_millis(20),
            MockMediaResolver::new(),
            FakeConnector::failing(),
        );
        let a = h.ready("A", 1);
        h.player.push_ready(h.guild, a.clone());

        assert!(eventually(WAIT, || !h.notifier.errors().is_empty()).await);
        assert!(matches!(h.notifier.errors()[0].1, PlaybackError::Voice(_)));
        assert!(eventually(WAIT, || !Harness::path_of(&a).exists()).await);
        assert!(h.sink.started().is_empty());
        assert!(!h.player.registry().is_in_voice(h.guild));
    }

    #[tokio::test]
    async fn enqueue_downloads_then_plays() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("song.mp3");
        std::fs::write(&file, b"ID3").unwrap();

        let mut resolver = MockMediaResolver::new();
        let served = file.clone();
        resolver
            .expect_fetch_audio()
            .times(1)
            .returning(move |_, _| Ok(served.clone()));

        let h = harness_with(Duration::from_millis(20), resolver, FakeConnector::default());
        let queued = h.player.enqueue(PlayRequest {
            guild_id: h.guild,
            text_channel: ChannelId::new(8),
            requester: UserId::new(4),
            voice_channel: Some(ChannelId::new(56)),
            info: track_info("Song"),
        });

        assert!(eventually(WAIT, || h.sink.finished().len() == 1).await);
        assert_eq!(h.sink.started(), vec![file.clone()]);
        assert_eq!(h.player.registry().text_channel(h.guild), Some(ChannelId::new(8)));
        assert_eq!(
            h.connector.last_connection().and_then(|c| c.channel_id()),
            Some(ChannelId::new(56))
        );

        let notices = h.notifier.notices();
        assert!(notices
            .iter()
            .any(|(_, n)| matches!(n, Notice::Queued(t) if t.entry_id == queued.entry_id)));
        assert!(eventually(WAIT, || !file.exists()).await);
    }

    #[tokio::test]
    async fn failed_download_queues_nothing() {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_fetch_audio()
            .returning(|_, title| Err(PlaybackError::resolution(title, "yt-dlp exited with 1")));

        let h = harness_with(Duration::from_millis(20), resolver, FakeConnector::default());
        h.player.enqueue(PlayRequest {
            guild_id: h.guild,
            text_channel: ChannelId::new(8),
            requester: UserId::new(4),
            voice_channel: None,
            info: track_info("Broken"),
        });

        assert!(eventually(WAIT, || !h.notifier.errors().is_empty()).await);
        assert!(h.player.queue(h.guild).is_empty());
        assert!(!h.loop_running());
        assert!(h.sink.started().is_empty());
    }

    #[tokio::test]
    async fn skip_user_drops_their_entries_and_current_track() {
        let h = harness(Duration::from_secs(30));
        let a = h.ready("A", 1);
        let b = h.ready("B", 2);
        let c = h.ready("C", 1);
        for t in [&a, &b, &c] {
            h.player.push_ready(h.guild, (*t).clone());
        }
        assert!(eventually(WAIT, || h.sink.started().len() == 1).await);

        let report = h.player.skip_user(h.guild, UserId::new(1)).await;
        assert_eq!(
            report,
            SkipUserReport {
                removed: 1,
                files_deleted: 1,
                skipped_current: true,
            }
        );
        assert!(!Harness::path_of(&c).exists());

        assert!(eventually(WAIT, || h.sink.started().len() == 2).await);
        assert_eq!(h.sink.started()[1], Harness::path_of(&b));
        assert!(h.player.queue(h.guild).is_empty());
    }

    #[tokio::test]
    async fn skip_user_leaves_other_requesters_alone() {
        let h = harness(Duration::from_secs(30));
        h.player.push_ready(h.guild, h.ready("A", 1));
        h.player.push_ready(h.guild, h.ready("B", 1));
        assert!(eventually(WAIT, || h.sink.started().len() == 1).await);

        let report = h.player.skip_user(h.guild, UserId::new(9)).await;
        assert_eq!(report, SkipUserReport::default());
        assert_eq!(h.player.queue(h.guild).len(), 1);
        assert_eq!(h.sink.active(), 1);
    }

    #[tokio::test]
    async fn stop_clears_everything_and_leaves_voice() {
        let h = harness(Duration::from_secs(30));
        let a = h.ready("A", 1);
        let b = h.ready("B", 1);
        h.player.push_ready(h.guild, a.clone());
        h.player.push_ready(h.guild, b.clone());
        assert!(eventually(WAIT, || h.sink.started().len() == 1).await);
        let connection = h.connector.last_connection().unwrap();

        assert_eq!(h.player.stop(h.guild).await, 1);

        assert!(eventually(WAIT, || h.sink.finished().len() == 1).await);
        assert!(h.sink.finished()[0].stopped);
        assert!(connection.is_disconnected());
        assert!(!Harness::path_of(&b).exists());
        assert!(eventually(WAIT, || !Harness::path_of(&a).exists()).await);
        assert!(eventually(WAIT, || !h.loop_running()).await);

        let registry = h.player.registry();
        assert!(!registry.is_in_voice(h.guild));
        assert_eq!(registry.idle_monitor_generation(h.guild), None);
        assert_eq!(h.sink.started().len(), 1);
    }

    #[tokio::test]
    async fn stop_discards_a_paused_snapshot() {
        let h = harness(Duration::from_secs(30));
        let a = h.ready("A", 1);
        h.player.push_ready(h.guild, a.clone());
        assert!(eventually(WAIT, || h.sink.started().len() == 1).await);
        h.player.pause(h.guild).unwrap();
        assert!(eventually(WAIT, || h.sink.finished().len() == 1).await);

        h.player.stop(h.guild).await;
        assert!(!h.player.registry().is_paused(h.guild));
        assert!(!Harness::path_of(&a).exists());
        assert_eq!(h.player.resume(h.guild), Err(ControlError::NothingToResume));
    }

    #[tokio::test]
    async fn shuffle_still_plays_every_entry_once() {
        let h = harness(Duration::from_millis(10));
        h.player.set_shuffle(h.guild, true);
        let tracks: Vec<Track> = (0..4).map(|i| h.ready(&format!("S{}", i), 1)).collect();
        for t in &tracks {
            h.player.push_ready(h.guild, t.clone());
        }

        assert!(eventually(WAIT, || h.sink.finished().len() == 4).await);
        let mut played = h.sink.started();
        played.sort();
        let mut expected: Vec<PathBuf> = tracks.iter().map(Harness::path_of).collect();
        expected.sort();
        assert_eq!(played, expected);
    }

    #[tokio::test]
    async fn stop_while_joining_never_starts_the_track() {
        let h = slow_join_harness();
        let a = h.ready("A", 1);
        h.player.push_ready(h.guild, a.clone());
        assert!(eventually(WAIT, || h.connector.joins() == 1).await);
        assert!(h.player.now_playing(h.guild).is_some());

        h.player.stop(h.guild).await;

        assert!(eventually(WAIT, || {
            h.connector
                .last_connection()
                .is_some_and(|c| c.is_disconnected())
        })
        .await);
        assert!(eventually(WAIT, || !Harness::path_of(&a).exists()).await);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let registry = h.player.registry();
        assert!(h.sink.started().is_empty());
        assert!(!registry.is_in_voice(h.guild));
        assert!(!registry.is_playing(h.guild));
        assert_eq!(registry.connection(h.guild).map(|_| ()), None);
        assert_eq!(registry.idle_monitor_generation(h.guild), None);
    }

    #[tokio::test]
    async fn skip_while_joining_moves_on_to_the_next_track() {
        let h = slow_join_harness();
        let a = h.ready("A", 1);
        let b = h.ready("B", 1);
        h.player.push_ready(h.guild, a.clone());
        h.player.push_ready(h.guild, b.clone());
        assert!(eventually(WAIT, || h.connector.joins() == 1).await);

        let skipped = h.player.skip(h.guild).unwrap();
        assert_eq!(skipped.entry_id, a.entry_id);

        assert!(eventually(WAIT, || h.sink.started().len() == 1).await);
        assert_eq!(h.sink.started(), vec![Harness::path_of(&b)]);
        assert!(eventually(WAIT, || !Harness::path_of(&a).exists()).await);
        assert_eq!(h.connector.joins(), 1);
    }

    #[tokio::test]
    async fn pause_while_joining_holds_the_track_until_resume() {
        let h = slow_join_harness();
        let a = h.ready("A", 1);
        h.player.push_ready(h.guild, a.clone());
        assert!(eventually(WAIT, || h.connector.joins() == 1).await);

        let paused = h.player.pause(h.guild).unwrap();
        assert_eq!(paused.entry_id, a.entry_id);

        assert!(eventually(WAIT, || h.connector.last_connection().is_some()).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.sink.started().is_empty());
        assert!(Harness::path_of(&a).exists());
        assert!(h.player.registry().is_paused(h.guild));

        h.player.resume(h.guild).unwrap();
        assert!(eventually(WAIT, || h.sink.started().len() == 1).await);
        assert_eq!(h.sink.started()[0], Harness::path_of(&a));
    }

    #[tokio::test]
    async fn empty_channel_teardown_keeps_the_queue_until_someone_plays() {
        let settings = PlaybackSettings {
            idle: IdleSettings {
                check_interval: Duration::from_millis(50),
                ..IdleSettings::default()
            },
            ..PlaybackSettings::default()
        };
        let h = harness_configured(
            Duration::from_secs(30),
            MockMediaResolver::new(),
            FakeConnector::default(),
            settings,
        );
        let a = h.ready("A", 1);
        let b = h.ready("B", 1);
        h.player.push_ready(h.guild, a.clone());
        h.player.push_ready(h.guild, b.clone());
        assert!(eventually(WAIT, || h.sink.started().len() == 1).await);

        h.connector.last_connection().unwrap().set_listeners(0);

        assert!(eventually(WAIT, || h.sink.finished().len() == 1).await);
        assert!(h.sink.finished()[0].stopped);
        assert!(eventually(WAIT, || {
            h.notifier
                .notices()
                .iter()
                .any(|(_, n)| matches!(n, Notice::LeftVoice(LeaveReason::EmptyChannel)))
        })
        .await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(h.connector.joins(), 1, "no rejoin without a new play");
        assert_eq!(h.sink.started().len(), 1);
        assert!(!h.player.registry().is_in_voice(h.guild));
        let queued: Vec<u64> = h.player.queue(h.guild).iter().map(|t| t.entry_id).collect();
        assert_eq!(queued, vec![b.entry_id]);
        assert!(Harness::path_of(&b).exists());
        let left = h
            .notifier
            .notices()
            .iter()
            .filter(|(_, n)| matches!(n, Notice::LeftVoice(_)))
            .count();
        assert_eq!(left, 1);

        h.player
            .registry()
            .set_voice_target(h.guild, Some(ChannelId::new(55)));
        let c = h.ready("C", 2);
        h.player.push_ready(h.guild, c);

        assert!(eventually(WAIT, || h.sink.started().len() == 2).await);
        assert_eq!(h.sink.started()[1], Harness::path_of(&b));
        assert_eq!(h.connector.joins(), 2);
    }
}

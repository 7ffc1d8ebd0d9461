use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    controller::{PlaybackController, StopSignal, StreamTicket},
    queue::Track,
    voice::ConnectionHandle,
};
use crate::error::PlaybackResult;

#[derive(Debug)]
struct IdleSlot {
    generation: u64,
    token: CancellationToken,
}

/// Todo lo que el motor sigue de una guild.
#[derive(Debug)]
struct GuildState {
    current: Option<Track>,
    playing: bool,
    paused: Option<Track>,
    in_voice: bool,
    connection: Option<ConnectionHandle>,
    voice_target: Option<ChannelId>,
    text_channel: Option<ChannelId>,
    last_activity: Instant,
    shuffle: bool,
    loop_running: bool,
    idle_monitor: Option<IdleSlot>,
    /// Incrementado por cada `stop`.
    stop_epoch: u64,
    /// Incrementado por cada skip o pausa del track actual.
    skip_epoch: u64,
    controller: Arc<PlaybackController>,
}

impl GuildState {
    fn new(guild_id: GuildId) -> Self {
        Self {
            current: None,
            playing: false,
            paused: None,
            in_voice: false,
            connection: None,
            voice_target: None,
            text_channel: None,
            last_activity: Instant::now(),
            shuffle: false,
            loop_running: false,
            idle_monitor: None,
            stop_epoch: 0,
            skip_epoch: 0,
            controller: Arc::new(PlaybackController::new(guild_id)),
        }
    }
}

/// Épocas vistas antes de que el bucle sacara su siguiente canción.
///
/// Un `stop`, skip o pausa emitido antes de que el stream registre su canal
/// de stop incrementa una de ellas y [`GuildRegistry::start_stream`] se niega.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackClaim {
    stop_epoch: u64,
    skip_epoch: u64,
}

/// Resultado de [`GuildRegistry::start_stream`].
#[derive(Debug)]
pub enum StreamStart {
    Ready(StreamTicket, StopSignal),
    /// La guild se detuvo después de que la canción pasara a ser la actual.
    Stopped,
    /// La canción se saltó o se pausó antes de empezar.
    Skipped,
}

/// Lo que se lleva un monitor de inactividad al reclamar la salida.
#[derive(Debug)]
pub struct Teardown {
    pub connection: Option<ConnectionHandle>,
    pub was_playing: bool,
}

/// Estado por guild detrás de un único lock.
///
/// Los registros se crean al primer acceso. Cada accesor es una sección
/// crítica corta que nunca hace await. Quien necesita la cola con el lock del
/// registro tomado (el retiro del bucle) toma el de la cola después; nada los
/// toma en el orden inverso.
#[derive(Debug, Default)]
pub struct GuildRegistry {
    guilds: Mutex<HashMap<GuildId, GuildState>>,
}

impl GuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, guild_id: GuildId, f: impl FnOnce(&mut GuildState) -> R) -> R {
        let mut guilds = self.guilds.lock();
        let state = guilds
            .entry(guild_id)
            .or_insert_with(|| GuildState::new(guild_id));
        f(state)
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.guilds.lock().keys().copied().collect()
    }

    pub fn controller(&self, guild_id: GuildId) -> Arc<PlaybackController> {
        self.with(guild_id, |s| s.controller.clone())
    }

    pub fn is_playing(&self, guild_id: GuildId) -> bool {
        self.with(guild_id, |s| s.playing)
    }

    pub fn set_playing(&self, guild_id: GuildId, playing: bool) {
        self.with(guild_id, |s| s.playing = playing)
    }

    pub fn is_in_voice(&self, guild_id: GuildId) -> bool {
        self.with(guild_id, |s| s.in_voice)
    }

    pub fn set_in_voice(&self, guild_id: GuildId, in_voice: bool) {
        self.with(guild_id, |s| s.in_voice = in_voice)
    }

    pub fn last_activity(&self, guild_id: GuildId) -> Instant {
        self.with(guild_id, |s| s.last_activity)
    }

    pub fn touch(&self, guild_id: GuildId) {
        self.with(guild_id, |s| s.last_activity = Instant::now())
    }

    pub fn set_last_activity(&self, guild_id: GuildId, at: Instant) {
        self.with(guild_id, |s| s.last_activity = at)
    }

    pub fn idle_for(&self, guild_id: GuildId) -> Duration {
        self.last_activity(guild_id).elapsed()
    }

    pub fn current_track(&self, guild_id: GuildId) -> Option<Track> {
        self.with(guild_id, |s| s.current.clone())
    }

    pub fn set_current_track(&self, guild_id: GuildId, track: Option<Track>) {
        self.with(guild_id, |s| s.current = track)
    }

    /// Marca `track` como la canción en reproducción.
    pub fn begin_track(&self, guild_id: GuildId, track: Track) {
        self.with(guild_id, |s| {
            s.current = Some(track);
            s.playing = true;
        })
    }

    /// Épocas contra las que se comprueba antes de reproducir la siguiente canción.
    ///
    /// Se toman antes de sacarla de la cola, así un `stop` que cae entre la
    /// extracción y [`GuildRegistry::begin_track`] también se detecta.
    pub fn track_claim(&self, guild_id: GuildId) -> TrackClaim {
        self.with(guild_id, |s| TrackClaim {
            stop_epoch: s.stop_epoch,
            skip_epoch: s.skip_epoch,
        })
    }

    /// Salta la canción en reproducción si `pred` la acepta.
    ///
    /// Incrementa la época de skip, así una canción que aún no registró su
    /// canal de stop nunca empieza. La señal de stop la envía quien llama.
    pub fn skip_current_if(&self, guild_id: GuildId, pred: impl FnOnce(&Track) -> bool) -> Option<Track> {
        self.with(guild_id, |s| {
            let track = s.current.clone().filter(|t| s.playing && pred(t))?;
            s.skip_epoch += 1;
            Some(track)
        })
    }

    /// Invalida todas las reclamaciones tomadas hasta ahora.
    pub fn bump_stop_epoch(&self, guild_id: GuildId) {
        self.with(guild_id, |s| s.stop_epoch += 1)
    }

    /// Registra el canal de stop del stream, salvo que `claim` haya caducado.
    ///
    /// La comprobación y el registro comparten el lock del registro: un stop o
    /// un skip invalida la reclamación o encuentra el canal de stop ya puesto.
    pub fn start_stream(&self, guild_id: GuildId, claim: TrackClaim) -> PlaybackResult<StreamStart> {
        self.with(guild_id, |s| {
            if s.stop_epoch != claim.stop_epoch {
                return Ok(StreamStart::Stopped);
            }
            if s.skip_epoch != claim.skip_epoch {
                return Ok(StreamStart::Skipped);
            }
            let (ticket, stop) = s.controller.register_stream()?;
            Ok(StreamStart::Ready(ticket, stop))
        })
    }

    /// Limpia a la vez la canción actual y el flag de reproducción.
    pub fn finish_track(&self, guild_id: GuildId) {
        self.with(guild_id, |s| {
            s.current = None;
            s.playing = false;
        })
    }

    pub fn save_connection(&self, guild_id: GuildId, connection: ConnectionHandle) {
        self.with(guild_id, |s| s.connection = Some(connection))
    }

    pub fn connection(&self, guild_id: GuildId) -> Option<ConnectionHandle> {
        self.with(guild_id, |s| s.connection.clone())
    }

    pub fn take_connection(&self, guild_id: GuildId) -> Option<ConnectionHandle> {
        self.with(guild_id, |s| s.connection.take())
    }

    /// Si el bucle tiene conexión o un canal al que puede unirse.
    pub fn can_reach_voice(&self, guild_id: GuildId) -> bool {
        self.with(guild_id, |s| s.connection.is_some() || s.voice_target.is_some())
    }

    pub fn voice_target(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.with(guild_id, |s| s.voice_target)
    }

    pub fn set_voice_target(&self, guild_id: GuildId, channel_id: Option<ChannelId>) {
        self.with(guild_id, |s| s.voice_target = channel_id)
    }

    pub fn text_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.with(guild_id, |s| s.text_channel)
    }

    pub fn set_text_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.with(guild_id, |s| s.text_channel = Some(channel_id))
    }

    pub fn shuffle(&self, guild_id: GuildId) -> bool {
        self.with(guild_id, |s| s.shuffle)
    }

    pub fn set_shuffle(&self, guild_id: GuildId, enabled: bool) {
        self.with(guild_id, |s| s.shuffle = enabled)
    }

    /// Guarda la canción en reproducción como pausada y limpia `playing`.
    ///
    /// Devuelve `None` sin cambiar nada si no suena ninguna canción. Una
    /// canción que aún no empezó a reproducirse ya no empezará.
    pub fn pause_current(&self, guild_id: GuildId) -> Option<Track> {
        self.with(guild_id, |s| {
            let track = s.current.clone().filter(|_| s.playing)?;
            s.paused = Some(track.clone());
            s.playing = false;
            s.skip_epoch += 1;
            Some(track)
        })
    }

    /// Se lleva la canción pausada y limpia con ello el estado de pausa.
    pub fn take_paused(&self, guild_id: GuildId) -> Option<Track> {
        self.with(guild_id, |s| s.paused.take())
    }

    pub fn is_paused(&self, guild_id: GuildId) -> bool {
        self.with(guild_id, |s| s.paused.is_some())
    }

    pub fn is_paused_entry(&self, guild_id: GuildId, entry_id: u64) -> bool {
        self.with(guild_id, |s| {
            s.paused.as_ref().is_some_and(|t| t.entry_id == entry_id)
        })
    }

    /// Marca un bucle de reproducción como activo. Falso si ya había uno.
    pub fn try_claim_loop(&self, guild_id: GuildId) -> bool {
        self.with(guild_id, |s| !std::mem::replace(&mut s.loop_running, true))
    }

    /// Retira el bucle activo si `drained` se sigue cumpliendo bajo el lock.
    pub fn retire_loop(&self, guild_id: GuildId, drained: impl FnOnce() -> bool) -> bool {
        self.with(guild_id, |s| {
            if drained() {
                s.loop_running = false;
                true
            } else {
                false
            }
        })
    }

    pub fn is_loop_running(&self, guild_id: GuildId) -> bool {
        self.with(guild_id, |s| s.loop_running)
    }

    /// Instala un monitor de inactividad nuevo, cancelando antes el anterior.
    ///
    /// Devuelve si se canceló un monitor previo.
    pub fn install_idle_monitor(
        &self,
        guild_id: GuildId,
        generation: u64,
        token: CancellationToken,
    ) -> bool {
        self.with(guild_id, |s| {
            let previous = s.idle_monitor.replace(IdleSlot { generation, token });
            match previous {
                Some(old) => {
                    old.token.cancel();
                    debug!(
                        "💤 Monitor de inactividad #{} reemplazado en guild {}",
                        old.generation, guild_id
                    );
                    true
                }
                None => false,
            }
        })
    }

    /// Cancela el monitor vivo. Al volver, ese monitor ya no puede actuar.
    pub fn cancel_idle_monitor(&self, guild_id: GuildId) -> bool {
        self.with(guild_id, |s| match s.idle_monitor.take() {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        })
    }

    pub fn idle_monitor_generation(&self, guild_id: GuildId) -> Option<u64> {
        self.with(guild_id, |s| s.idle_monitor.as_ref().map(|m| m.generation))
    }

    /// Deja que el monitor `generation` cierre la sesión de voz.
    ///
    /// Solo funciona si ese monitor sigue instalado y sin cancelar. Entonces se
    /// quita a sí mismo y limpia los flags de voz y de reproducción. También se
    /// borra el canal destino: el bucle no vuelve a unirse hasta un nuevo play.
    pub fn claim_idle_teardown(&self, guild_id: GuildId, generation: u64) -> Option<Teardown> {
        self.with(guild_id, |s| {
            let live = s
                .idle_monitor
                .as_ref()
                .is_some_and(|m| m.generation == generation && !m.token.is_cancelled());
            if !live {
                return None;
            }

            s.idle_monitor = None;
            s.in_voice = false;
            s.voice_target = None;
            let was_playing = std::mem::replace(&mut s.playing, false);
            Some(Teardown {
                connection: s.connection.take(),
                was_playing,
            })
        })
    }

    /// Sale del canal de voz en lo que respecta al registro.
    ///
    /// Cancela el monitor de inactividad y devuelve la conexión a desconectar.
    pub fn leave_voice(&self, guild_id: GuildId) -> Option<ConnectionHandle> {
        self.with(guild_id, |s| {
            if let Some(slot) = s.idle_monitor.take() {
                slot.token.cancel();
            }
            s.in_voice = false;
            s.playing = false;
            s.connection.take()
        })
    }
}

use serenity::{
    async_trait,
    cache::Cache,
    model::id::{ChannelId, GuildId, UserId},
};
use songbird::{input::File, Event, Songbird, TrackEvent};
use std::{fmt, path::Path, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::events::TrackFinishedHandler;
use crate::{
    audio::{
        controller::StopSignal,
        voice::{AudioSink, ConnectionHandle, VoiceConnection, VoiceConnector},
    },
    error::{PlaybackError, PlaybackResult},
};

/// Une el bot a canales de voz a través de songbird.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
    bot_user: UserId,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, cache: Arc<Cache>, bot_user: UserId) -> Self {
        Self {
            manager,
            cache,
            bot_user,
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<ConnectionHandle> {
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al conectar al canal de voz: {:?}", e);
            PlaybackError::Voice(format!("no se pudo entrar a <#{}>: {}", channel_id, e))
        })?;

        // No necesitamos escuchar el canal
        if let Err(e) = call.lock().await.deafen(true).await {
            debug!("No se pudo ensordecer en guild {}: {:?}", guild_id, e);
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdConnection {
            guild_id,
            channel_id,
            manager: self.manager.clone(),
            cache: self.cache.clone(),
            bot_user: self.bot_user,
        }))
    }
}

/// Conexión de voz activa en una guild.
pub struct SongbirdConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
    bot_user: UserId,
}

impl fmt::Debug for SongbirdConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SongbirdConnection")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> Option<ChannelId> {
        Some(self.channel_id)
    }

    async fn human_listeners(&self) -> usize {
        let Some(guild) = self.cache.guild(self.guild_id) else {
            // Sin datos en caché no podemos afirmar que el canal esté vacío
            warn!("Guild {} no encontrada en caché", self.guild_id);
            return usize::MAX;
        };

        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(self.channel_id))
            .filter(|state| state.user_id != self.bot_user)
            .filter(|state| !state.member.as_ref().is_some_and(|m| m.user.bot))
            .count()
    }

    async fn disconnect(&self) -> PlaybackResult<()> {
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| PlaybackError::Voice(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

/// Reproduce archivos locales en la llamada de songbird de la guild.
pub struct SongbirdSink {
    manager: Arc<Songbird>,
}

impl SongbirdSink {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn stream(&self, connection: ConnectionHandle, path: &Path, mut stop: StopSignal) {
        let guild_id = connection.guild_id();
        let Some(call) = self.manager.get(guild_id) else {
            warn!("⚠️ No hay llamada de voz activa en guild {}", guild_id);
            return;
        };

        let handle = call
            .lock()
            .await
            .play_only_input(File::new(path.to_path_buf()).into());

        let (done_tx, mut done_rx) = mpsc::channel(1);
        for (event, failed) in [(TrackEvent::End, false), (TrackEvent::Error, true)] {
            let handler = TrackFinishedHandler {
                guild_id,
                failed,
                done: done_tx.clone(),
            };
            if let Err(e) = handle.add_event(Event::Track(event), handler) {
                warn!("Error al agregar event handler: {}", e);
            }
        }
        // Solo los handlers mantienen vivo el canal; si songbird los suelta, recv() devuelve None
        drop(done_tx);

        tokio::select! {
            _ = stop.fired() => {
                if let Err(e) = handle.stop() {
                    debug!("El track ya había terminado en guild {}: {}", guild_id, e);
                }
            }
            _ = done_rx.recv() => {}
        }
    }
}

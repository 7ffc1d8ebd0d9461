use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, path::Path, sync::Arc};

use super::controller::StopSignal;
use crate::error::PlaybackResult;

/// Una sesión de voz activa en una guild.
#[async_trait]
pub trait VoiceConnection: Send + Sync + fmt::Debug {
    fn guild_id(&self) -> GuildId;

    fn channel_id(&self) -> Option<ChannelId>;

    /// Ocupantes del canal conectado que no son bots.
    async fn human_listeners(&self) -> usize;

    async fn disconnect(&self) -> PlaybackResult<()>;
}

/// Handle de conexión compartido entre el registro y el stream en curso.
pub type ConnectionHandle = Arc<dyn VoiceConnection>;

/// Se une a canales de voz.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<ConnectionHandle>;
}

/// Reproduce un archivo de audio local en una conexión de voz.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Vuelve cuando el archivo sonó hasta el final o cuando salta `stop`.
    ///
    /// El sink registra sus propios fallos; nunca llegan a quien llama.
    async fn stream(&self, connection: ConnectionHandle, path: &Path, stop: StopSignal);
}

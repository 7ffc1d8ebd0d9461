use serenity::{async_trait, model::id::GuildId};
use songbird::{Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Avisa al sink cuando songbird termina un track, bien o con error.
pub struct TrackFinishedHandler {
    pub guild_id: GuildId,
    pub failed: bool,
    pub done: mpsc::Sender<()>,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishedHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if self.failed {
            if let EventContext::Track(track_list) = ctx {
                for (state, _handle) in *track_list {
                    error!(
                        "❌ Error en track para guild {}: {:?}",
                        self.guild_id, state.playing
                    );
                }
            }
        } else {
            debug!("🎵 Track terminó en guild {}", self.guild_id);
        }

        // buffer de uno: si ya hay aviso pendiente, este sobra
        let _ = self.done.try_send(());
        Some(VoiceEvent::Cancel)
    }
}

use serenity::{
    async_trait,
    builder::{CreateChannel, CreateMessage},
    http::Http,
    model::{
        channel::ChannelType,
        id::{ChannelId, GuildId},
    },
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{queue::Track, state::GuildRegistry},
    error::PlaybackError,
    ui::{
        buttons,
        embeds,
        notifier::{Notice, Notifier},
    },
};

/// Canal propio del bot, preferido para los avisos
pub const BOT_CHANNEL_NAME: &str = "music-bot-channel";
const FALLBACK_CHANNEL_NAME: &str = "general";

/// Canal de texto de la guild visto al buscar dónde publicar.
#[derive(Debug, Clone)]
pub struct TextChannelCandidate {
    pub id: ChannelId,
    pub name: String,
    pub position: u16,
}

/// Elige el canal de avisos: el del bot, luego `general`, luego el primero.
pub fn pick_bot_channel(candidates: &[TextChannelCandidate]) -> Option<ChannelId> {
    let named = |name: &str| candidates.iter().find(|c| c.name == name).map(|c| c.id);

    named(BOT_CHANNEL_NAME)
        .or_else(|| named(FALLBACK_CHANNEL_NAME))
        .or_else(|| {
            candidates
                .iter()
                .min_by_key(|c| (c.position, c.id))
                .map(|c| c.id)
        })
}

/// Publica los avisos del motor en el canal de texto asociado a cada guild.
///
/// Si la guild todavía no tiene uno, busca un canal con [`pick_bot_channel`]
/// y, si no hay ninguno de texto, crea `music-bot-channel`.
pub struct DiscordNotifier {
    http: Arc<Http>,
    registry: Arc<GuildRegistry>,
    resolving: Mutex<()>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>, registry: Arc<GuildRegistry>) -> Self {
        Self {
            http,
            registry,
            resolving: Mutex::new(()),
        }
    }

    async fn send(&self, guild_id: GuildId, message: CreateMessage) {
        let Some(channel_id) = self.text_channel(guild_id).await else {
            debug!("Sin canal de texto para guild {}; aviso descartado", guild_id);
            return;
        };

        if let Err(e) = channel_id.send_message(&self.http, message).await {
            warn!("No se pudo enviar mensaje a {}: {:?}", channel_id, e);
        }
    }

    async fn text_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        if let Some(channel_id) = self.registry.text_channel(guild_id) {
            return Some(channel_id);
        }

        // un solo aviso a la vez busca o crea el canal
        let _resolving = self.resolving.lock().await;
        if let Some(channel_id) = self.registry.text_channel(guild_id) {
            return Some(channel_id);
        }

        let channel_id = match self.find_or_create_channel(guild_id).await {
            Ok(channel_id) => channel_id,
            Err(e) => {
                warn!("No se pudo obtener un canal de texto en guild {}: {:?}", guild_id, e);
                return None;
            }
        };
        self.registry.set_text_channel(guild_id, channel_id);
        Some(channel_id)
    }

    async fn find_or_create_channel(&self, guild_id: GuildId) -> serenity::Result<ChannelId> {
        let candidates: Vec<TextChannelCandidate> = guild_id
            .channels(&self.http)
            .await?
            .into_values()
            .filter(|c| c.kind == ChannelType::Text)
            .map(|c| TextChannelCandidate {
                id: c.id,
                name: c.name,
                position: c.position,
            })
            .collect();

        if let Some(channel_id) = pick_bot_channel(&candidates) {
            return Ok(channel_id);
        }

        let created = guild_id
            .create_channel(
                &self.http,
                CreateChannel::new(BOT_CHANNEL_NAME).kind(ChannelType::Text),
            )
            .await?;
        info!("📢 Canal #{} creado en guild {}", BOT_CHANNEL_NAME, guild_id);
        Ok(created.id)
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn now_playing(&self, guild_id: GuildId, track: &Track) {
        let message = CreateMessage::new()
            .embed(embeds::create_now_playing_embed(track))
            .components(buttons::create_player_buttons());
        self.send(guild_id, message).await;
    }

    async fn report_error(&self, guild_id: GuildId, error: &PlaybackError) {
        let message = CreateMessage::new().embed(embeds::create_playback_error_embed(error));
        self.send(guild_id, message).await;
    }

    async fn announce(&self, guild_id: GuildId, notice: Notice) {
        let embed = match &notice {
            Notice::Queued(track) => embeds::create_track_queued_embed(track),
            Notice::LeftVoice(reason) => embeds::create_left_voice_embed(*reason),
        };
        self.send(guild_id, CreateMessage::new().embed(embed)).await;
    }
}

//! # Bot Module
//!
//! Discord side of Guild Tunes.
//!
//! - Slash command registration and dispatch ([`commands`], [`handlers`])
//! - Songbird adapters behind the engine's voice traits ([`voice`], [`events`])
//! - Channel messages for engine notices ([`notifier`])
//! - Per-user search sessions ([`search`])
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`]. The [`AudioPlayer`]
//! needs the client's HTTP and cache handles, so it is installed after the
//! client is built through [`MusicBot::player_slot`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;
pub mod notifier;
pub mod search;
pub mod voice;

use crate::{audio::player::AudioPlayer, cache::MusicCache, config::Config};
use search::SearchSessions;

/// Cada cuánto se limpian las cachés en memoria
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

/// Main Discord event handler.
///
/// Cheap to share: every field is reference counted or internally synchronized.
pub struct MusicBot {
    config: Arc<Config>,
    player: Arc<OnceLock<AudioPlayer>>,
    metadata: MusicCache,
    searches: SearchSessions,
    maintenance_started: AtomicBool,
}

impl MusicBot {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            player: Arc::new(OnceLock::new()),
            metadata: MusicCache::for_metadata(),
            searches: SearchSessions::default(),
            maintenance_started: AtomicBool::new(false),
        }
    }

    /// Slot filled once the client (and with it songbird) exists.
    pub fn player_slot(&self) -> Arc<OnceLock<AudioPlayer>> {
        self.player.clone()
    }

    pub fn player(&self) -> Result<&AudioPlayer> {
        self.player
            .get()
            .ok_or_else(|| anyhow::anyhow!("El reproductor todavía no está listo"))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metadata(&self) -> &MusicCache {
        &self.metadata
    }

    pub fn searches(&self) -> &SearchSessions {
        &self.searches
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set the commands go to that guild only (instant
    /// propagation); otherwise they are global.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión
        if !self.maintenance_started.swap(true, Ordering::SeqCst) {
            let metadata = self.metadata.clone();
            let searches = self.searches.clone();
            tokio::spawn(async move {
                maintenance_tasks(metadata, searches).await;
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Un bot expulsado del canal deja de reproducir y vacía la cola.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }
        if old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Ok(player) = self.player() else {
            return;
        };

        // Una salida por inactividad ya limpió el estado
        if !player.registry().is_in_voice(guild_id) {
            return;
        }

        info!("🔌 Bot desconectado en guild {}", guild_id);
        let cleared = player.stop(guild_id).await;
        info!("🧹 {} canciones descartadas en guild {}", cleared, guild_id);
    }
}

/// Limpia periódicamente la caché de metadatos y las búsquedas expiradas.
async fn maintenance_tasks(metadata: MusicCache, searches: SearchSessions) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);

    loop {
        interval.tick().await;

        metadata.cleanup_old_entries();
        let expired = searches.cleanup();
        if expired > 0 {
            info!("🔍 {} búsquedas expiradas eliminadas", expired);
        }
    }
}

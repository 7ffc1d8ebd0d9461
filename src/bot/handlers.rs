use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Instant;
use tracing::{info, warn};

use crate::{
    audio::player::{AudioPlayer, ControlError, PlayRequest},
    bot::{
        commands,
        search::SearchSession,
        MusicBot,
    },
    sources::{TrackInfo, YtDlpResolver},
    ui::{
        buttons::{self, button_ids},
        embeds,
    },
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let player = bot.player()?;
    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, player, guild_id).await?,
        "pause" => {
            let embed = match player.pause(guild_id) {
                Ok(track) => embeds::create_success_embed(
                    "Pausado",
                    &format!("**{}** se reanudará desde el principio con `/resume`", track.title),
                ),
                Err(e) => refusal_embed(e),
            };
            respond(ctx, &command, embed).await?;
        }
        "resume" => {
            let embed = match player.resume(guild_id) {
                Ok(track) => embeds::create_success_embed(
                    "Reanudado",
                    &format!("**{}** vuelve a sonar", track.title),
                ),
                Err(e) => refusal_embed(e),
            };
            respond(ctx, &command, embed).await?;
        }
        "skip" => {
            let embed = match player.skip(guild_id) {
                Ok(track) => embeds::create_success_embed(
                    "Saltado",
                    &format!("⏭️ **{}**", track.title),
                ),
                Err(e) => refusal_embed(e),
            };
            respond(ctx, &command, embed).await?;
        }
        "skipuser" => handle_skipuser(ctx, &command, player, guild_id).await?,
        "stop" => {
            let cleared = player.stop(guild_id).await;
            let embed = embeds::create_success_embed(
                "Detenido",
                &format!("⏹️ Reproducción detenida, {} canciones quitadas de la cola", cleared),
            );
            respond(ctx, &command, embed).await?;
        }
        "queue" => {
            let page = command
                .data
                .options
                .iter()
                .find(|opt| opt.name == "page")
                .and_then(|opt| opt.value.as_i64())
                .unwrap_or(1)
                .max(1) as usize;
            respond(ctx, &command, queue_embed(player, guild_id, page)).await?;
        }
        "clear" => {
            let cleared = player.clear_queue(guild_id).await;
            let embed = embeds::create_success_embed(
                "Cola limpiada",
                &format!("🗑️ {} canciones eliminadas", cleared),
            );
            respond(ctx, &command, embed).await?;
        }
        "shuffle" => {
            let enabled = command
                .data
                .options
                .iter()
                .find(|opt| opt.name == "enabled")
                .and_then(|opt| opt.value.as_bool())
                .unwrap_or(false);
            player.set_shuffle(guild_id, enabled);
            let text = if enabled {
                "🔀 Modo aleatorio activado"
            } else {
                "➡️ Modo aleatorio desactivado"
            };
            respond(ctx, &command, embeds::create_info_embed("Aleatorio", text)).await?;
        }
        "nowplaying" => {
            if let Some(current) = player.now_playing(guild_id) {
                command
                    .create_response(
                        &ctx.http,
                        CreateInteractionResponse::Message(
                            CreateInteractionResponseMessage::new()
                                .embed(embeds::create_now_playing_embed(&current))
                                .components(buttons::create_player_buttons()),
                        ),
                    )
                    .await?;
            } else {
                respond(ctx, &command, refusal_embed(ControlError::NothingPlaying)).await?;
            }
        }
        "help" => {
            let embed = embeds::create_help_embed(&commands::command_summaries());
            respond(ctx, &command, embed).await?;
        }
        "ping" => handle_ping(ctx, &command).await?,
        "bye" => {
            let cleared = player.stop(guild_id).await;
            let mut description = "¡Hasta luego! Nos vemos pronto".to_string();
            if cleared > 0 {
                description.push_str(&format!("\n🗑️ {} canciones quitadas de la cola", cleared));
            }
            respond(ctx, &command, embeds::create_info_embed("Adiós", &description)).await?;
        }
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

/// Maneja interacciones con componentes (botones)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let player = bot.player()?;
    if let Some(index) = buttons::parse_search_selection(&component.data.custom_id) {
        return handle_search_selection(ctx, &component, bot, player, guild_id, index).await;
    }

    let embed = match component.data.custom_id.as_str() {
        button_ids::PAUSE => match player.pause(guild_id) {
            Ok(track) => embeds::create_success_embed("Pausado", &format!("⏸️ **{}**", track.title)),
            Err(e) => refusal_embed(e),
        },
        button_ids::RESUME => match player.resume(guild_id) {
            Ok(track) => embeds::create_success_embed("Reanudado", &format!("▶️ **{}**", track.title)),
            Err(e) => refusal_embed(e),
        },
        button_ids::SKIP => match player.skip(guild_id) {
            Ok(track) => embeds::create_success_embed("Saltado", &format!("⏭️ **{}**", track.title)),
            Err(e) => refusal_embed(e),
        },
        button_ids::STOP => {
            let cleared = player.stop(guild_id).await;
            embeds::create_success_embed(
                "Detenido",
                &format!("⏹️ {} canciones quitadas de la cola", cleared),
            )
        }
        button_ids::QUEUE => queue_embed(player, guild_id, 1),
        _ => embeds::create_error_embed("Acción no reconocida", "Este botón ya no es válido"),
    };

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

// Handlers específicos

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .trim()
        .to_string();

    // Defer la respuesta ya que yt-dlp puede tardar
    command.defer(&ctx.http).await?;

    let voice_channel = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => {
            return edit(ctx, command, embeds::create_error_embed("Sin canal de voz", &e.to_string()))
                .await;
        }
    };

    if query.starts_with("http://") || query.starts_with("https://") {
        let info = match lookup_cached(bot, player, &query).await {
            Ok(info) => info,
            Err(e) => {
                return edit(ctx, command, embeds::create_error_embed("No encontrado", &e.to_string()))
                    .await;
            }
        };

        player.enqueue(PlayRequest {
            guild_id,
            text_channel: command.channel_id,
            requester: command.user.id,
            voice_channel: Some(voice_channel),
            info: info.clone(),
        });
        return edit(ctx, command, embeds::create_downloading_embed(&info)).await;
    }

    let results = match player
        .resolver()
        .search(&query, bot.config().search_results)
        .await
    {
        Ok(results) => results,
        Err(e) => {
            warn!("Búsqueda fallida para '{}': {}", query, e);
            return edit(ctx, command, embeds::create_error_embed("Búsqueda fallida", &e.to_string()))
                .await;
        }
    };

    if results.is_empty() {
        return edit(
            ctx,
            command,
            embeds::create_info_embed("Sin resultados", &format!("Nada encontrado para \"{}\"", query)),
        )
        .await;
    }

    let embed = embeds::create_search_results_embed(&query, &results);
    let components = buttons::create_search_buttons(results.len());
    bot.searches().open(
        command.user.id,
        SearchSession {
            query,
            results,
            guild_id,
        },
    );

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .embed(embed)
                .components(components),
        )
        .await?;
    Ok(())
}

async fn handle_search_selection(
    ctx: &Context,
    component: &ComponentInteraction,
    bot: &MusicBot,
    player: &AudioPlayer,
    guild_id: GuildId,
    index: usize,
) -> Result<()> {
    let reply = match bot.searches().choose(component.user.id, guild_id, index) {
        None => embeds::create_error_embed(
            "Búsqueda expirada",
            "Vuelve a usar `/play <búsqueda>`",
        ),
        Some(info) => match get_user_voice_channel(ctx, guild_id, component.user.id) {
            Err(e) => embeds::create_error_embed("Sin canal de voz", &e.to_string()),
            Ok(voice_channel) => {
                player.enqueue(PlayRequest {
                    guild_id,
                    text_channel: component.channel_id,
                    requester: component.user.id,
                    voice_channel: Some(voice_channel),
                    info: info.clone(),
                });
                embeds::create_downloading_embed(&info)
            }
        },
    };

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .embed(reply)
                    .components(Vec::new()),
            ),
        )
        .await?;
    Ok(())
}

async fn handle_ping(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    let started = Instant::now();
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content("🏓 Pong!"),
            ),
        )
        .await?;

    let latency = started.elapsed();
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .content(format!("🏓 Pong! ({} ms)", latency.as_millis())),
        )
        .await?;
    Ok(())
}

async fn handle_skipuser(
    ctx: &Context,
    command: &CommandInteraction,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<()> {
    let user_id = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "user")
        .and_then(|opt| opt.value.as_user_id())
        .ok_or_else(|| anyhow::anyhow!("Usuario no proporcionado"))?;

    let report = player.skip_user(guild_id, user_id).await;
    let mut description = format!(
        "🗑️ {} canciones de <@{}> quitadas de la cola",
        report.removed, user_id
    );
    if report.skipped_current {
        description.push_str("\n⏭️ También se saltó la canción actual");
    }

    respond(
        ctx,
        command,
        embeds::create_success_embed("Canciones eliminadas", &description),
    )
    .await
}

// Funciones auxiliares

async fn lookup_cached(bot: &MusicBot, player: &AudioPlayer, query: &str) -> Result<TrackInfo> {
    let url = YtDlpResolver::normalize_url(query);
    if let Some(info) = bot.metadata().get(&url) {
        return Ok(info);
    }

    let info = player.resolver().lookup(&url).await?;
    bot.metadata().insert(url, info.clone());
    Ok(info)
}

fn queue_embed(player: &AudioPlayer, guild_id: GuildId, page: usize) -> CreateEmbed {
    let current = player.now_playing(guild_id);
    let queue = player.queue(guild_id);
    embeds::create_queue_embed(
        current.as_ref(),
        &queue,
        player.queue_duration(guild_id),
        player.registry().shuffle(guild_id),
        page,
    )
}

fn refusal_embed(error: ControlError) -> CreateEmbed {
    let description = match error {
        ControlError::NotInVoice => "El bot no está en un canal de voz",
        ControlError::NothingPlaying => "No hay nada reproduciéndose actualmente",
        ControlError::NothingToResume => "No hay ninguna canción pausada",
    };
    embeds::create_error_embed("No se puede", description)
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

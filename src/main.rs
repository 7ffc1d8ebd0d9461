use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

use guild_tunes::{
    audio::{
        player::{AudioPlayer, Collaborators},
        state::GuildRegistry,
    },
    bot::{
        notifier::DiscordNotifier,
        voice::{SongbirdConnector, SongbirdSink},
        MusicBot,
    },
    config::Config,
    sources::{cleanup::spawn_cleanup_routine, Downloads, YtDlpResolver},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_tunes=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    info!("🎵 Iniciando Guild Tunes v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Solo hace falta ver guilds y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = MusicBot::new(config.clone());
    let player_slot = handler.player_slot();

    // Construir cliente
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird.clone())
        .await?;

    let bot_user = client.http.get_current_user().await?.id;
    info!("🤖 Bot ID: {}", bot_user);

    // Motor de reproducción
    let registry = Arc::new(GuildRegistry::new());
    let downloads = Arc::new(Downloads::new());
    let parts = Collaborators {
        resolver: Arc::new(YtDlpResolver::new(&config.download_dir, config.ytdlp_timeout)),
        sink: Arc::new(SongbirdSink::new(songbird.clone())),
        connector: Arc::new(SongbirdConnector::new(
            songbird.clone(),
            client.cache.clone(),
            bot_user,
        )),
        notifier: Arc::new(DiscordNotifier::new(client.http.clone(), registry.clone())),
        downloads: downloads.clone(),
    };
    let player = AudioPlayer::with_registry(registry, parts, config.playback_settings());
    if player_slot.set(player.clone()).is_err() {
        anyhow::bail!("El reproductor ya estaba inicializado");
    }

    // Limpieza de descargas viejas
    spawn_cleanup_routine(
        config.download_dir.clone(),
        config.cleanup_interval,
        config.max_file_age,
        downloads,
    );
    info!("🧹 Limpieza de descargas cada {}", humantime::format_duration(config.cleanup_interval));

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        player.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    info!("👋 Guild Tunes detenido");
    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        if !yt_dlp.status.success() {
            warn!("yt-dlp no responde");
        }
        if !ffmpeg.status.success() {
            warn!("ffmpeg no responde");
        }
        anyhow::bail!("Dependencias faltantes");
    }
}

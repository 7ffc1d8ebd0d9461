use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        skipuser_command(),
        stop_command(),
        queue_command(),
        clear_command(),
        shuffle_command(),
        nowplaying_command(),
        help_command(),
        ping_command(),
        bye_command(),
    ]
}

/// Nombre y descripción de cada comando, en orden de registro
pub fn command_summaries() -> Vec<(String, String)> {
    let Ok(serde_json::Value::Array(commands)) = serde_json::to_value(all_commands()) else {
        return Vec::new();
    };

    commands
        .iter()
        .filter_map(|c| {
            let name = c["name"].as_str()?;
            let description = c["description"].as_str().unwrap_or_default();
            Some((name.to_string(), description.to_string()))
        })
        .collect()
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una URL o busca una canción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la canción pausada desde el principio")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn skipuser_command() -> CreateCommand {
    CreateCommand::new("skipuser")
        .description("Quita de la cola todas las canciones de un usuario")
        .add_option(
            CreateCommandOption::new(CommandOptionType::User, "user", "Usuario")
                .required(true),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción, limpia la cola y sale del canal")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia la cola de reproducción")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle")
        .description("Activa/desactiva el modo aleatorio")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Boolean, "enabled", "Activar aleatorio")
                .required(true),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra información de la canción actual")
}

// Comandos generales

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra la lista de comandos")
}

fn ping_command() -> CreateCommand {
    CreateCommand::new("ping").description("Comprueba si el bot responde")
}

fn bye_command() -> CreateCommand {
    CreateCommand::new("bye").description("Se despide y sale del canal de voz")
}

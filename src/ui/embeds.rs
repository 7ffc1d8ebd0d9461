use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::queue::Track,
    error::PlaybackError,
    sources::TrackInfo,
    ui::notifier::LeaveReason,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const NOW_PLAYING: Colour = Colour::new(0x1DB954);
    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Tunes";

const ITEMS_PER_PAGE: usize = 10;

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::NOW_PLAYING)
        .field("⏱️ Duración", duration_label(track.duration), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .url(&track.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_queued_embed(track: &Track) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** se ha agregado a la cola de reproducción",
            track.title
        ))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_label(track.duration), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .url(&track.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Respuesta inmediata a `/play` mientras el audio se descarga
pub fn create_downloading_embed(info: &TrackInfo) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📥 Descargando")
        .description(format!("**{}**", info.title))
        .color(colors::INFO_BLUE)
        .field("⏱️ Duración", duration_label(info.duration), true);

    if let Some(uploader) = &info.uploader {
        embed = embed.field("🎤 Canal", uploader, true);
    }

    embed
        .url(&info.url)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Lista numerada de resultados; cada número corresponde a un botón
pub fn create_search_results_embed(query: &str, results: &[TrackInfo]) -> CreateEmbed {
    let mut description = String::new();
    for (i, info) in results.iter().enumerate() {
        description.push_str(&format!(
            "**{}**. {} `[{}]`\n",
            i + 1,
            info.title,
            duration_label(info.duration)
        ));
    }

    CreateEmbed::default()
        .title(format!("🔍 Resultados para \"{}\"", query))
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("Elige un número • expira en 5 minutos"))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(
    current: Option<&Track>,
    queue: &[Track],
    total: Duration,
    shuffle: bool,
    page: usize,
) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if current.is_none() && queue.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = current {
        embed = embed.field("▶️ Reproduciendo", format!("**{}**", current.title), false);
    }

    let window = QueuePage::new(queue.len(), page);
    if !queue.is_empty() {
        let mut description = String::new();
        for (offset, item) in queue[window.start..window.end].iter().enumerate() {
            description.push_str(&format!(
                "**{}**. {} `[{}]` • <@{}>\n",
                window.start + offset + 1,
                item.title,
                duration_label(item.duration),
                item.requested_by
            ));
        }
        embed = embed.field("Próximas canciones", description, false);
    }

    let mut info = format!("**Total:** {} canciones", queue.len());
    if total > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total)));
    }
    if shuffle {
        info.push_str(" • 🔀 **Aleatorio**");
    }
    embed = embed.field("Información", info, false);

    let footer = if window.total_pages > 1 {
        format!(
            "Página {} de {} • Guild Tunes",
            window.page, window.total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };
    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Aviso cuando el bot sale del canal por su cuenta
pub fn create_left_voice_embed(reason: LeaveReason) -> CreateEmbed {
    let description = match reason {
        LeaveReason::EmptyChannel => "No queda nadie en el canal de voz",
        LeaveReason::IdleTimeout => "Sin actividad durante demasiado tiempo",
    };

    CreateEmbed::default()
        .title("👋 Desconectado")
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Traduce un error de reproducción a un mensaje para el usuario
pub fn create_playback_error_embed(error: &PlaybackError) -> CreateEmbed {
    let (title, description) = match error {
        PlaybackError::Resolution { title, reason } => (
            "No se pudo reproducir",
            format!("**{}** no está disponible: {}", title, reason),
        ),
        PlaybackError::Connection(_) => (
            "Sin conexión de voz",
            "Únete a un canal de voz y vuelve a usar `/play`".to_string(),
        ),
        PlaybackError::Voice(reason) => ("Error de voz", reason.clone()),
        other => ("Error", other.to_string()),
    };
    create_error_embed(title, &description)
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed de `/help` a partir de los comandos registrados
pub fn create_help_embed(commands: &[(String, String)]) -> CreateEmbed {
    CreateEmbed::default()
        .title("📖 Comandos disponibles")
        .description(help_text(commands))
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn help_text(commands: &[(String, String)]) -> String {
    commands
        .iter()
        .map(|(name, description)| format!("`/{}` - {}", name, description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ventana de la cola que cabe en una página
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueuePage {
    page: usize,
    total_pages: usize,
    start: usize,
    end: usize,
}

impl QueuePage {
    /// `page` es 1-based; valores fuera de rango se ajustan al límite.
    fn new(len: usize, page: usize) -> Self {
        let total_pages = len.div_ceil(ITEMS_PER_PAGE).max(1);
        let page = page.clamp(1, total_pages);
        let start = ((page - 1) * ITEMS_PER_PAGE).min(len);
        let end = (start + ITEMS_PER_PAGE).min(len);
        Self {
            page,
            total_pages,
            start,
            end,
        }
    }
}

fn duration_label(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => format_duration(d),
        None => "🔴 En vivo".to_string(),
    }
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn durations_are_clock_formatted() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(duration_label(None), "🔴 En vivo");
    }

    #[test]
    fn help_lists_one_command_per_line() {
        let commands = vec![
            ("play".to_string(), "Reproduce".to_string()),
            ("ping".to_string(), "Latencia".to_string()),
        ];
        assert_eq!(help_text(&commands), "`/play` - Reproduce\n`/ping` - Latencia");
        assert_eq!(help_text(&[]), "");
    }

    #[test]
    fn queue_pages_clamp_to_the_available_range() {
        assert_eq!(
            QueuePage::new(0, 1),
            QueuePage {
                page: 1,
                total_pages: 1,
                start: 0,
                end: 0
            }
        );
        assert_eq!(
            QueuePage::new(25, 3),
            QueuePage {
                page: 3,
                total_pages: 3,
                start: 20,
                end: 25
            }
        );
        assert_eq!(QueuePage::new(25, 9).page, 3);
        assert_eq!(QueuePage::new(25, 0).page, 1);
    }
}

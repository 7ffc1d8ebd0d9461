use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE: &str = "music_pause";
    pub const RESUME: &str = "music_resume";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const QUEUE: &str = "music_queue";

    /// Prefijo de los botones de resultados; le sigue el índice 0-based.
    pub const SEARCH_PREFIX: &str = "search_select_";
}

/// Controles básicos del reproductor, adjuntos al embed de "reproduciendo"
pub fn create_player_buttons() -> Vec<CreateActionRow> {
    let pause_btn = CreateButton::new(button_ids::PAUSE)
        .emoji('⏸')
        .style(ButtonStyle::Primary);

    let resume_btn = CreateButton::new(button_ids::RESUME)
        .emoji('▶')
        .style(ButtonStyle::Primary);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Secondary);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    let queue_btn = CreateButton::new(button_ids::QUEUE)
        .emoji('📋')
        .style(ButtonStyle::Secondary);

    vec![CreateActionRow::Buttons(vec![
        pause_btn, resume_btn, skip_btn, stop_btn, queue_btn,
    ])]
}

/// Un botón numerado por resultado de búsqueda (máximo 5, una fila)
pub fn create_search_buttons(count: usize) -> Vec<CreateActionRow> {
    let buttons: Vec<CreateButton> = (0..count.min(5))
        .map(|i| {
            CreateButton::new(search_button_id(i))
                .label((i + 1).to_string())
                .style(ButtonStyle::Primary)
        })
        .collect();

    if buttons.is_empty() {
        Vec::new()
    } else {
        vec![CreateActionRow::Buttons(buttons)]
    }
}

pub fn search_button_id(index: usize) -> String {
    format!("{}{}", button_ids::SEARCH_PREFIX, index)
}

/// Índice del resultado elegido, si `custom_id` es un botón de búsqueda
pub fn parse_search_selection(custom_id: &str) -> Option<usize> {
    custom_id
        .strip_prefix(button_ids::SEARCH_PREFIX)
        .and_then(|index| index.parse().ok())
}

use serenity::model::id::{GuildId, UserId};
use std::time::Duration;
use tracing::debug;

use crate::{cache::TtlCache, sources::TrackInfo};

/// Cuánto tiempo sigue válida una lista de resultados
pub const SEARCH_TTL: Duration = Duration::from_secs(5 * 60);

/// Estructura para manejar resultados de búsqueda
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub query: String,
    pub results: Vec<TrackInfo>,
    pub guild_id: GuildId,
}

/// Último resultado de búsqueda de cada usuario.
///
/// Una búsqueda nueva reemplaza la anterior; elegir un resultado consume la sesión.
#[derive(Debug, Clone)]
pub struct SearchSessions {
    sessions: TtlCache<UserId, SearchSession>,
}

impl Default for SearchSessions {
    fn default() -> Self {
        Self::new(SEARCH_TTL)
    }
}

impl SearchSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: TtlCache::new(ttl),
        }
    }

    pub fn open(&self, user_id: UserId, session: SearchSession) {
        debug!(
            "🔍 {} resultados guardados para {} ({})",
            session.results.len(),
            user_id,
            session.query
        );
        self.sessions.insert(user_id, session);
    }

    /// Toma el resultado `index` de la sesión del usuario en `guild_id`.
    ///
    /// Devuelve `None` si la sesión expiró, es de otra guild o el índice no existe;
    /// en ese caso la sesión queda intacta.
    pub fn choose(&self, user_id: UserId, guild_id: GuildId, index: usize) -> Option<TrackInfo> {
        let session = self.sessions.get(&user_id)?;
        if session.guild_id != guild_id {
            return None;
        }
        let choice = session.results.get(index).cloned()?;
        self.sessions.remove(&user_id);
        Some(choice)
    }

    pub fn cleanup(&self) -> usize {
        self.sessions.cleanup_expired()
    }
}

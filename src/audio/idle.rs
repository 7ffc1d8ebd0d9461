use serenity::model::id::GuildId;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::GuildRegistry;
use crate::ui::notifier::{LeaveReason, Notice, Notifier};

#[derive(Debug, Clone, Copy)]
pub struct IdleSettings {
    /// Cada cuánto revisa cada monitor su guild.
    pub check_interval: Duration,
    /// Inactividad tras la cual una guild que no reproduce sale del canal de voz.
    pub idle_timeout: Duration,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Inicia y cancela los monitores de inactividad de cada guild.
///
/// El monitor vivo de cada guild queda anotado en el registro. Instalar uno
/// nuevo cancela el anterior bajo el mismo lock, así que nunca hay más de uno
/// que pueda actuar.
pub struct IdleMonitor {
    registry: Arc<GuildRegistry>,
    notifier: Arc<dyn Notifier>,
    settings: IdleSettings,
    next_generation: AtomicU64,
}

impl IdleMonitor {
    pub fn new(registry: Arc<GuildRegistry>, notifier: Arc<dyn Notifier>, settings: IdleSettings) -> Self {
        Self {
            registry,
            notifier,
            settings,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Inicia un monitor para `guild_id` y reemplaza al que estuviera corriendo.
    pub fn start(&self, guild_id: GuildId) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.registry
            .install_idle_monitor(guild_id, generation, token.clone());

        let watcher = Watcher {
            registry: self.registry.clone(),
            notifier: self.notifier.clone(),
            settings: self.settings,
            guild_id,
            generation,
        };
        tokio::spawn(watcher.run(token));

        debug!("💤 Monitor de inactividad #{} iniciado en guild {}", generation, guild_id);
        generation
    }

    pub fn cancel(&self, guild_id: GuildId) -> bool {
        self.registry.cancel_idle_monitor(guild_id)
    }
}

enum Verdict {
    Stay,
    Leave(LeaveReason),
}

struct Watcher {
    registry: Arc<GuildRegistry>,
    notifier: Arc<dyn Notifier>,
    settings: IdleSettings,
    guild_id: GuildId,
    generation: u64,
}

impl Watcher {
    async fn run(self, token: CancellationToken) {
        let period = self.settings.check_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("💤 Monitor de inactividad #{} cancelado", self.generation);
                    return;
                }
                _ = ticker.tick() => {}
            }

            let reason = match self.check().await {
                Verdict::Stay => continue,
                Verdict::Leave(reason) => reason,
            };

            // si un cancel ganó el lock, no queda nada que reclamar
            let Some(teardown) = self
                .registry
                .claim_idle_teardown(self.guild_id, self.generation)
            else {
                return;
            };

            info!("👋 Saliendo del canal de voz en guild {} ({:?})", self.guild_id, reason);
            if let Some(connection) = teardown.connection {
                if let Err(e) = connection.disconnect().await {
                    warn!("Error al desconectar en guild {}: {}", self.guild_id, e);
                }
            }
            if teardown.was_playing {
                self.registry.controller(self.guild_id).signal_stop();
            }
            self.notifier
                .announce(self.guild_id, Notice::LeftVoice(reason))
                .await;
            return;
        }
    }

    async fn check(&self) -> Verdict {
        if let Some(connection) = self.registry.connection(self.guild_id) {
            if connection.human_listeners().await == 0 {
                return Verdict::Leave(LeaveReason::EmptyChannel);
            }
        }

        if self.registry.is_playing(self.guild_id) {
            return Verdict::Stay;
        }

        if self.registry.idle_for(self.guild_id) > self.settings.idle_timeout {
            Verdict::Leave(LeaveReason::IdleTimeout)
        } else {
            Verdict::Stay
        }
    }
}

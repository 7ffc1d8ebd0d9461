use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    error::{GuildError, PlaybackError},
    ui::notifier::Notifier,
};

/// Embudo para los fallos de cada guild.
///
/// Una única tarea consumidora registra cada error y reenvía al notifier los
/// que el usuario debe ver.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::UnboundedSender<GuildError>,
}

impl ErrorReporter {
    pub fn spawn(notifier: Arc<dyn Notifier>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<GuildError>();

        let task = tokio::spawn(async move {
            while let Some(GuildError { guild_id, error }) = rx.recv().await {
                warn!("⚠️ Error en guild {}: {}", guild_id, error);
                if error.is_user_visible() {
                    notifier.report_error(guild_id, &error).await;
                }
            }
            debug!("Reportero de errores detenido");
        });

        (Self { tx }, task)
    }

    pub fn report(&self, guild_id: GuildId, error: PlaybackError) {
        if self.tx.send(GuildError { guild_id, error }).is_err() {
            warn!("El reportero de errores ya no existe, se descarta el error de guild {}", guild_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::RecordingNotifier;
    use crate::error::SignalKind;
    use std::time::Duration;

    #[tokio::test]
    async fn only_user_visible_errors_reach_the_notifier() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (reporter, task) = ErrorReporter::spawn(notifier.clone());
        let guild = GuildId::new(3);

        reporter.report(
            guild,
            PlaybackError::SignalDeliveryMiss {
                guild_id: guild,
                kind: SignalKind::Stop,
            },
        );
        reporter.report(guild, PlaybackError::resolution("Song", "file missing"));
        drop(reporter);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        let errors = notifier.errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].1, PlaybackError::Resolution { .. }));
    }
}

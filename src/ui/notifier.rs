use async_trait::async_trait;
use serenity::model::id::GuildId;

use crate::{audio::queue::Track, error::PlaybackError};

/// Why the bot left a voice channel on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    EmptyChannel,
    IdleTimeout,
}

/// One-off announcements that are neither now-playing cards nor errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Queued(Track),
    LeftVoice(LeaveReason),
}

/// User-facing messages. Fire-and-forget: implementations log their own
/// delivery failures and the engine never looks at an outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn now_playing(&self, guild_id: GuildId, track: &Track);

    async fn report_error(&self, guild_id: GuildId, error: &PlaybackError);

    async fn announce(&self, guild_id: GuildId, notice: Notice);
}

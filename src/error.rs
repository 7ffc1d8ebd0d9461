use serenity::model::id::GuildId;
use std::fmt;
use thiserror::Error;

/// Which controller mailbox a signal was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Stop,
    NewTrack,
    Halt,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Stop => f.write_str("stop"),
            SignalKind::NewTrack => f.write_str("new-track"),
            SignalKind::Halt => f.write_str("halt"),
        }
    }
}

/// Errors produced by the playback engine and its collaborators.
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    /// The audio file of a track is missing or failed to download.
    #[error("track '{title}' is not ready: {reason}")]
    Resolution { title: String, reason: String },

    /// No usable voice connection handle for the guild.
    #[error("no usable voice connection for guild {0}")]
    Connection(GuildId),

    /// A best-effort signal found no listener or a full mailbox.
    #[error("{kind} signal for guild {guild_id} was not delivered")]
    SignalDeliveryMiss { guild_id: GuildId, kind: SignalKind },

    /// Something tried to start a second stream for a guild.
    #[error("playback is already active in guild {0}")]
    StateRace(GuildId),

    /// Search or metadata lookup failed.
    #[error("lookup failed: {0}")]
    Search(String),

    /// Joining or leaving a voice channel failed.
    #[error("voice channel error: {0}")]
    Voice(String),
}

impl PlaybackError {
    pub fn resolution(title: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Resolution {
            title: title.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error reporter forwards this error to the guild's users.
    ///
    /// Signal misses and state races are resolved internally and only logged.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            PlaybackError::Resolution { .. }
                | PlaybackError::Connection(_)
                | PlaybackError::Voice(_)
        )
    }
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// An error scoped to one guild, as carried by the error reporter.
#[derive(Debug, Clone)]
pub struct GuildError {
    pub guild_id: GuildId,
    pub error: PlaybackError,
}

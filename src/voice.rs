use async_trait::async_trait;
use serenity::model::id::{
    ChannelId as DiscordChannelId,
    GuildId as DiscordGuildId,
    UserId as DiscordUserId
};
use crate::{
    error::{PlaybackResult, VoiceResult},
    model::Track,
    types::Completion
};

/// The audio side of the platform: voice connections and the tracks playing on them.
#[async_trait]
pub trait VoiceDriver: Send + Sync + 'static {
    async fn join(&self, guild: DiscordGuildId, channel: DiscordChannelId) -> VoiceResult<()>;

    async fn leave(&self, guild: DiscordGuildId) -> VoiceResult<()>;

    /// Starts `track`. The returned [`Completion`] fires exactly once, when the
    /// track ends naturally, is stopped, or fails.
    async fn play(&self, guild: DiscordGuildId, track: &Track, volume: f32) -> PlaybackResult<Completion>;

    async fn pause(&self, guild: DiscordGuildId) -> PlaybackResult<()>;

    async fn resume(&self, guild: DiscordGuildId) -> PlaybackResult<()>;

    /// Stops the current track; its completion fires afterwards.
    async fn stop(&self, guild: DiscordGuildId) -> PlaybackResult<()>;

    async fn set_volume(&self, guild: DiscordGuildId, volume: f32) -> PlaybackResult<()>;
}

/// Who is listening, and which channels count as this guild's history.
#[async_trait]
pub trait Roster: Send + Sync + 'static {
    async fn listeners(&self, guild: DiscordGuildId, voice_channel: DiscordChannelId) -> Vec<DiscordUserId>;

    async fn channels(&self, guild: DiscordGuildId) -> Vec<DiscordChannelId>;
}

use serenity::model::id::{
    ChannelId as DiscordChannelId,
    GuildId as DiscordGuildId,
    MessageId as DiscordMessageId
};
use super::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Read-only snapshot of a guild player, handed to presentation and to callers.
#[derive(Debug, Clone)]
pub struct PlayerView {
    pub guild: DiscordGuildId,
    pub channel: DiscordChannelId,
    pub state: PlayerState,
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub dj_mode: bool,
    pub volume: f32
}

/// What presentation should do with its "now playing" message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPlan {
    /// The previous message is still the newest one in the channel.
    Edit(DiscordMessageId),
    /// Post a fresh message, deleting the stale one if there was any.
    Repost { delete: Option<DiscordMessageId> }
}

impl RenderPlan {
    pub fn decide(previous: Option<DiscordMessageId>, latest_in_channel: Option<DiscordMessageId>) -> Self {
        match (previous, latest_in_channel) {
            (Some(prev), Some(latest)) if prev == latest => Self::Edit(prev),
            (prev, _) => Self::Repost { delete: prev }
        }
    }
}

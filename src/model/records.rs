use chrono::{DateTime, Utc};
use serenity::model::id::{
    ChannelId as DiscordChannelId,
    GuildId as DiscordGuildId,
    UserId as DiscordUserId
};
use super::track::SongPick;

pub type RecordId = i64;

/// One playback attempt. Created when playback starts, finalized when it ends.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRecord {
    pub id: RecordId,
    pub user: Option<DiscordUserId>,
    pub channel: DiscordChannelId,
    pub search_term: String,
    pub title: String,
    pub artist: String,
    pub finished: bool,
    pub timestamp: DateTime<Utc>
}

impl PlayRecord {
    pub fn pick(&self) -> SongPick {
        SongPick::new(&self.title, &self.artist)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub user: DiscordUserId,
    pub channel: DiscordChannelId,
    pub search_term: String,
    pub title: String,
    pub artist: String,
    pub timestamp: DateTime<Utc>
}

/// A title/artist pair with how many times it finished playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popularity {
    pub pick: SongPick,
    pub plays: i64
}

/// An externally issued identity that maps to a surrogate row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    Guild(DiscordGuildId),
    Channel(DiscordChannelId),
    User(DiscordUserId)
}

impl NaturalKey {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Guild(_) => "guilds",
            Self::Channel(_) => "channels",
            Self::User(_) => "users"
        }
    }

    /// Discord snowflakes fit in 63 bits, so the cast is lossless.
    pub fn external_id(&self) -> i64 {
        match self {
            Self::Guild(id) => id.get() as i64,
            Self::Channel(id) => id.get() as i64,
            Self::User(id) => id.get() as i64
        }
    }
}

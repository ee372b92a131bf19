//! Request and play history.
//!
//! History is best effort: the player logs and swallows every error coming out
//! of a [`HistoryStore`], so a broken database only degrades recommendations.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::id::{
    ChannelId as DiscordChannelId,
    UserId as DiscordUserId
};
use crate::{
    error::PersistenceResult,
    model::{NaturalKey, Popularity, RecordId, SongPick, Track}
};

pub use memory::MemoryHistory;
pub use sqlite::SqliteHistory;

#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Appends a request made through the command layer.
    async fn record_request(&self, user: DiscordUserId, channel: DiscordChannelId, track: &Track) -> PersistenceResult<()>;

    /// Opens a play record for `track`; the requester (if any) is the user.
    async fn record_play_start(&self, channel: DiscordChannelId, track: &Track) -> PersistenceResult<RecordId>;

    async fn record_play_end(&self, record: RecordId, finished: bool) -> PersistenceResult<()>;

    /// Finished plays by `listeners` in `channels` strictly before `cutoff`,
    /// grouped by title/artist, most played first, at most `limit` entries.
    async fn query_popularity(
        &self,
        listeners: &[DiscordUserId],
        channels: &[DiscordChannelId],
        cutoff: DateTime<Utc>,
        limit: u32
    ) -> PersistenceResult<Vec<Popularity>>;

    /// Distinct pairs played in `channels` at or after `cutoff`, finished or not.
    async fn query_recent(&self, channels: &[DiscordChannelId], cutoff: DateTime<Utc>) -> PersistenceResult<Vec<SongPick>>;

    /// The most recently finished distinct pairs in `channels`, newest first.
    async fn query_last_finished(&self, channels: &[DiscordChannelId], limit: u32) -> PersistenceResult<Vec<SongPick>>;

    /// Insert-or-fetch of the surrogate id for an external identity.
    async fn upsert_natural_key(&self, key: NaturalKey) -> PersistenceResult<i64>;
}

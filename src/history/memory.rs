use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serenity::model::id::{
    ChannelId as DiscordChannelId,
    UserId as DiscordUserId
};
use std::collections::HashMap;
use super::HistoryStore;
use crate::{
    error::{PersistenceError, PersistenceResult},
    model::{NaturalKey, PlayRecord, Popularity, RecordId, RequestRecord, SongPick, Track}
};

/// Process-local history with the same query semantics as the SQLite store.
#[derive(Default)]
pub struct MemoryHistory {
    inner: Mutex<MemoryInner>
}

#[derive(Default)]
struct MemoryInner {
    plays: Vec<PlayRecord>,
    requests: Vec<RequestRecord>,
    keys: HashMap<NaturalKey, i64>,
    next_record: RecordId
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a play as-is, assigning it a fresh id. Used to seed history.
    pub fn insert_play(&self, mut record: PlayRecord) -> RecordId {
        let mut inner = self.inner.lock();

        inner.next_record += 1;
        record.id = inner.next_record;
        inner.plays.push(record);

        inner.next_record
    }

    pub fn plays(&self) -> Vec<PlayRecord> {
        self.inner.lock().plays.clone()
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.inner.lock().requests.clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn record_request(&self, user: DiscordUserId, channel: DiscordChannelId, track: &Track) -> PersistenceResult<()> {
        self.inner.lock().requests.push(RequestRecord {
            user,
            channel,
            search_term: track.search_term.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            timestamp: Utc::now()
        });

        Ok(())
    }

    async fn record_play_start(&self, channel: DiscordChannelId, track: &Track) -> PersistenceResult<RecordId> {
        Ok(self.insert_play(PlayRecord {
            id: 0,
            user: track.requester_id(),
            channel,
            search_term: track.search_term.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            finished: false,
            timestamp: Utc::now()
        }))
    }

    async fn record_play_end(&self, record: RecordId, finished: bool) -> PersistenceResult<()> {
        let mut inner = self.inner.lock();

        match inner.plays.iter_mut().find(|p| p.id == record) {
            Some(play) => {
                play.finished = finished;
                Ok(())
            },
            None => Err(PersistenceError::RecordNotFound(record))
        }
    }

    async fn query_popularity(
        &self,
        listeners: &[DiscordUserId],
        channels: &[DiscordChannelId],
        cutoff: DateTime<Utc>,
        limit: u32
    ) -> PersistenceResult<Vec<Popularity>> {
        let inner = self.inner.lock();
        let mut counts: HashMap<SongPick, i64> = HashMap::new();

        for play in inner.plays.iter() {
            let by_listener = play.user.map(|u| listeners.contains(&u)).unwrap_or(false);

            if play.finished && by_listener && channels.contains(&play.channel) && play.timestamp < cutoff {
                *counts.entry(play.pick()).or_insert(0) += 1;
            }
        }

        let mut ranked = counts.into_iter()
            .map(|(pick, plays)| Popularity { pick, plays })
            .collect::<Vec<_>>();

        ranked.sort_by(|a, b| {
            b.plays.cmp(&a.plays)
                .then_with(|| a.pick.title.cmp(&b.pick.title))
                .then_with(|| a.pick.artist.cmp(&b.pick.artist))
        });
        ranked.truncate(limit as usize);

        Ok(ranked)
    }

    async fn query_recent(&self, channels: &[DiscordChannelId], cutoff: DateTime<Utc>) -> PersistenceResult<Vec<SongPick>> {
        let inner = self.inner.lock();
        let mut recent: Vec<SongPick> = Vec::new();

        for play in inner.plays.iter().filter(|p| channels.contains(&p.channel) && p.timestamp >= cutoff) {
            let pick = play.pick();

            if !recent.contains(&pick) {
                recent.push(pick);
            }
        }

        Ok(recent)
    }

    async fn query_last_finished(&self, channels: &[DiscordChannelId], limit: u32) -> PersistenceResult<Vec<SongPick>> {
        let inner = self.inner.lock();
        let mut latest: HashMap<SongPick, DateTime<Utc>> = HashMap::new();

        for play in inner.plays.iter().filter(|p| p.finished && channels.contains(&p.channel)) {
            let seen = latest.entry(play.pick()).or_insert(play.timestamp);

            if play.timestamp > *seen {
                *seen = play.timestamp;
            }
        }

        let mut ordered = latest.into_iter().collect::<Vec<_>>();
        ordered.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(ordered.into_iter().take(limit as usize).map(|(pick, _)| pick).collect())
    }

    async fn upsert_natural_key(&self, key: NaturalKey) -> PersistenceResult<i64> {
        let mut inner = self.inner.lock();
        let next = inner.keys.len() as i64 + 1;

        Ok(*inner.keys.entry(key).or_insert(next))
    }
}

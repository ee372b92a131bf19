use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serenity::model::id::{
    ChannelId as DiscordChannelId,
    UserId as DiscordUserId
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    QueryBuilder,
    Row,
    Sqlite
};
use std::{path::Path, str::FromStr};
use tracing::{debug, info};
use super::HistoryStore;
use crate::{
    error::{PersistenceError, PersistenceResult},
    model::{NaturalKey, PlayRecord, Popularity, RecordId, SongPick, Track}
};

const SCHEMA: &str = include_str!("schema.sql");

/// SQLite-backed history. Timestamps are stored as Unix milliseconds.
#[derive(Clone)]
pub struct SqliteHistory {
    pool: SqlitePool
}

impl SqliteHistory {
    /// Connects to `url` (e.g. `sqlite://jukebox.db`), creating the file if missing.
    pub async fn connect(url: &str) -> PersistenceResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!("Connected to history database at {}", url);

        Self::from_pool(pool).await
    }

    pub async fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!("Opened history database at {:?}", path.as_ref());

        Self::from_pool(pool).await
    }

    /// A private in-memory database. Pinned to one connection that never
    /// expires, since every SQLite connection to `:memory:` is its own database.
    pub async fn in_memory() -> PersistenceResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> PersistenceResult<Self> {
        for statement in SCHEMA.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&pool).await?;
            }
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn record_play_start_at(&self, channel: DiscordChannelId, track: &Track, at: DateTime<Utc>) -> PersistenceResult<RecordId> {
        let user = match track.requester_id() {
            Some(user) => Some(self.upsert_natural_key(NaturalKey::User(user)).await?),
            None => None
        };
        let channel = self.upsert_natural_key(NaturalKey::Channel(channel)).await?;

        let id = sqlx::query(
            "INSERT INTO song_plays (user_id, channel_id, search_term, song_title, song_artist, finished, timestamp) VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(user)
        .bind(channel)
        .bind(&track.search_term)
        .bind(&track.title)
        .bind(&track.artist)
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!("Opened play record {} for {}", id, track);

        Ok(id)
    }

    pub async fn record_request_at(&self, user: DiscordUserId, channel: DiscordChannelId, track: &Track, at: DateTime<Utc>) -> PersistenceResult<()> {
        let user = self.upsert_natural_key(NaturalKey::User(user)).await?;
        let channel = self.upsert_natural_key(NaturalKey::Channel(channel)).await?;

        sqlx::query(
            "INSERT INTO song_requests (user_id, channel_id, search_term, song_title, song_artist, timestamp) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user)
        .bind(channel)
        .bind(&track.search_term)
        .bind(&track.title)
        .bind(&track.artist)
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every stored play, oldest first, with external ids restored.
    pub async fn play_records(&self) -> PersistenceResult<Vec<PlayRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, u.discord_id AS user, c.discord_id AS channel, p.search_term,
                   p.song_title, p.song_artist, p.finished, p.timestamp
            FROM song_plays p
            LEFT JOIN users u ON u.id = p.user_id
            JOIN channels c ON c.id = p.channel_id
            ORDER BY p.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let user: Option<i64> = row.try_get("user")?;
            let channel: i64 = row.try_get("channel")?;

            records.push(PlayRecord {
                id: row.try_get("id")?,
                user: user.map(|u| DiscordUserId::new(u as u64)),
                channel: DiscordChannelId::new(channel as u64),
                search_term: row.try_get("search_term")?,
                title: row.try_get("song_title")?,
                artist: row.try_get("song_artist")?,
                finished: row.try_get("finished")?,
                timestamp: from_millis(row.try_get("timestamp")?)
            });
        }

        Ok(records)
    }

    pub async fn count_rows(&self, key: NaturalKey) -> PersistenceResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE discord_id = ?", key.table());

        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(key.external_id())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
}

fn push_id_list(query: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    query.push("(");
    {
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
    }
    query.push(")");
}

fn user_ids(users: &[DiscordUserId]) -> Vec<i64> {
    users.iter().map(|u| u.get() as i64).collect()
}

fn channel_ids(channels: &[DiscordChannelId]) -> Vec<i64> {
    channels.iter().map(|c| c.get() as i64).collect()
}

fn pick_from_row(row: &SqliteRow) -> Result<SongPick, sqlx::Error> {
    Ok(SongPick {
        title: row.try_get("song_title")?,
        artist: row.try_get("song_artist")?
    })
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn record_request(&self, user: DiscordUserId, channel: DiscordChannelId, track: &Track) -> PersistenceResult<()> {
        self.record_request_at(user, channel, track, Utc::now()).await
    }

    async fn record_play_start(&self, channel: DiscordChannelId, track: &Track) -> PersistenceResult<RecordId> {
        self.record_play_start_at(channel, track, Utc::now()).await
    }

    async fn record_play_end(&self, record: RecordId, finished: bool) -> PersistenceResult<()> {
        let updated = sqlx::query("UPDATE song_plays SET finished = ? WHERE id = ?")
            .bind(finished)
            .bind(record)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(PersistenceError::RecordNotFound(record));
        }

        Ok(())
    }

    async fn query_popularity(
        &self,
        listeners: &[DiscordUserId],
        channels: &[DiscordChannelId],
        cutoff: DateTime<Utc>,
        limit: u32
    ) -> PersistenceResult<Vec<Popularity>> {
        if listeners.is_empty() || channels.is_empty() {
            return Ok(Vec::new());
        }

        let users = user_ids(listeners);
        let channels = channel_ids(channels);

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT p.song_title, p.song_artist, COUNT(*) AS plays \
             FROM song_plays p \
             JOIN users u ON u.id = p.user_id \
             JOIN channels c ON c.id = p.channel_id \
             WHERE u.discord_id IN ",
        );
        push_id_list(&mut query, &users);
        query.push(" AND c.discord_id IN ");
        push_id_list(&mut query, &channels);
        query.push(" AND p.finished = 1 AND p.timestamp < ");
        query.push_bind(cutoff.timestamp_millis());
        query.push(" GROUP BY p.song_title, p.song_artist ORDER BY plays DESC, p.song_title, p.song_artist LIMIT ");
        query.push_bind(i64::from(limit));

        let rows = query.build().fetch_all(&self.pool).await?;

        let mut ranked = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            ranked.push(Popularity {
                pick: pick_from_row(row)?,
                plays: row.try_get("plays")?
            });
        }

        Ok(ranked)
    }

    async fn query_recent(&self, channels: &[DiscordChannelId], cutoff: DateTime<Utc>) -> PersistenceResult<Vec<SongPick>> {
        if channels.is_empty() {
            return Ok(Vec::new());
        }

        let channels = channel_ids(channels);

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT p.song_title, p.song_artist \
             FROM song_plays p \
             JOIN channels c ON c.id = p.channel_id \
             WHERE c.discord_id IN ",
        );
        push_id_list(&mut query, &channels);
        query.push(" AND p.timestamp >= ");
        query.push_bind(cutoff.timestamp_millis());
        query.push(" GROUP BY p.song_title, p.song_artist");

        let rows = query.build().fetch_all(&self.pool).await?;

        let mut recent = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            recent.push(pick_from_row(row)?);
        }

        Ok(recent)
    }

    async fn query_last_finished(&self, channels: &[DiscordChannelId], limit: u32) -> PersistenceResult<Vec<SongPick>> {
        if channels.is_empty() {
            return Ok(Vec::new());
        }

        let channels = channel_ids(channels);

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT p.song_title, p.song_artist, MAX(p.timestamp) AS last_played \
             FROM song_plays p \
             JOIN channels c ON c.id = p.channel_id \
             WHERE c.discord_id IN ",
        );
        push_id_list(&mut query, &channels);
        query.push(" AND p.finished = 1 GROUP BY p.song_title, p.song_artist ORDER BY last_played DESC LIMIT ");
        query.push_bind(i64::from(limit));

        let rows = query.build().fetch_all(&self.pool).await?;

        let mut seeds = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            seeds.push(pick_from_row(row)?);
        }

        Ok(seeds)
    }

    async fn upsert_natural_key(&self, key: NaturalKey) -> PersistenceResult<i64> {
        // Single statement; the UNIQUE constraint settles concurrent inserts.
        let sql = format!(
            "INSERT INTO {} (discord_id) VALUES (?) \
             ON CONFLICT(discord_id) DO UPDATE SET discord_id = excluded.discord_id \
             RETURNING id",
            key.table()
        );

        let id = sqlx::query_scalar::<_, i64>(&sql)
            .bind(key.external_id())
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }
}

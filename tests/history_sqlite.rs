mod common;

use chrono::{Duration, Utc};
use common::*;
use jukebox::{
    error::PersistenceError,
    history::{HistoryStore, SqliteHistory},
    model::{NaturalKey, SongPick}
};
use serenity::model::id::{ChannelId, UserId};
use std::sync::Arc;

async fn on_disk() -> (tempfile::TempDir, SqliteHistory) {
    let dir = tempfile::tempdir().unwrap();
    let history = SqliteHistory::open(dir.path().join("history.db")).await.unwrap();
    (dir, history)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_share_one_row() {
    let (_dir, history) = on_disk().await;
    let history = Arc::new(history);
    let key = NaturalKey::User(UserId::new(123456789012345678));

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let history = Arc::clone(&history);
            tokio::spawn(async move { history.upsert_natural_key(key).await.unwrap() })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(history.count_rows(key).await.unwrap(), 1);
}

#[tokio::test]
async fn keys_are_scoped_per_table() {
    let history = SqliteHistory::in_memory().await.unwrap();

    let user = history.upsert_natural_key(NaturalKey::User(UserId::new(5))).await.unwrap();
    let again = history.upsert_natural_key(NaturalKey::User(UserId::new(5))).await.unwrap();
    let other = history.upsert_natural_key(NaturalKey::User(UserId::new(6))).await.unwrap();
    history.upsert_natural_key(NaturalKey::Channel(ChannelId::new(5))).await.unwrap();

    assert_eq!(user, again);
    assert_ne!(user, other);
    assert_eq!(history.count_rows(NaturalKey::Channel(ChannelId::new(5))).await.unwrap(), 1);
}

#[tokio::test]
async fn start_then_end_leaves_one_finished_row() {
    let (_dir, history) = on_disk().await;
    let channel = ChannelId::new(TEXT_CHANNEL);

    let id = history.record_play_start(channel, &track("Believe", "Cher")).await.unwrap();
    history.record_play_end(id, true).await.unwrap();

    let records = history.play_records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    assert!(records[0].finished);
    assert_eq!(records[0].user, Some(UserId::new(USER)));
    assert_eq!(records[0].channel, channel);
    assert_eq!(records[0].search_term, "Believe Cher");
}

#[tokio::test]
async fn autonomous_plays_have_no_user() {
    let history = SqliteHistory::in_memory().await.unwrap();
    let mut pick = track("Heroes", "David Bowie");
    pick.requester = None;

    history.record_play_start(ChannelId::new(TEXT_CHANNEL), &pick).await.unwrap();

    assert_eq!(history.play_records().await.unwrap()[0].user, None);
}

#[tokio::test]
async fn ending_an_unknown_record_fails() {
    let history = SqliteHistory::in_memory().await.unwrap();

    assert!(matches!(history.record_play_end(42, true).await, Err(PersistenceError::RecordNotFound(42))));
}

#[tokio::test]
async fn queries_respect_cutoff_and_finished_flag() {
    let history = SqliteHistory::in_memory().await.unwrap();
    let channel = ChannelId::new(TEXT_CHANNEL);
    let now = Utc::now();
    let cutoff = now - Duration::hours(1);

    let mut finish = Vec::new();
    for (title, age, finished) in [
        ("A", Duration::hours(3), true),
        ("A", Duration::hours(2), true),
        ("B", Duration::minutes(150), true),
        ("B", Duration::minutes(150), false),
        ("C", Duration::zero(), true),
    ] {
        let id = history.record_play_start_at(channel, &track(title, "X"), now - age).await.unwrap();
        finish.push((id, finished));
    }
    for (id, finished) in finish {
        history.record_play_end(id, finished).await.unwrap();
    }

    let popular = history.query_popularity(&[UserId::new(USER)], &[channel], cutoff, 100).await.unwrap();
    let ranked: Vec<(String, i64)> = popular.into_iter().map(|p| (p.pick.title, p.plays)).collect();
    assert_eq!(ranked, vec![("A".to_string(), 2), ("B".to_string(), 1)]);

    let limited = history.query_popularity(&[UserId::new(USER)], &[channel], cutoff, 1).await.unwrap();
    assert_eq!(limited.len(), 1);

    let recent = history.query_recent(&[channel], cutoff).await.unwrap();
    assert_eq!(recent, vec![SongPick::new("C", "X")]);

    let seeds = history.query_last_finished(&[channel], 5).await.unwrap();
    assert_eq!(seeds, vec![SongPick::new("C", "X"), SongPick::new("A", "X"), SongPick::new("B", "X")]);

    let newest = history.query_last_finished(&[channel], 1).await.unwrap();
    assert_eq!(newest, vec![SongPick::new("C", "X")]);
}

#[tokio::test]
async fn empty_id_lists_return_nothing() {
    let history = SqliteHistory::in_memory().await.unwrap();
    let channel = ChannelId::new(TEXT_CHANNEL);
    let id = history.record_play_start_at(channel, &track("A", "X"), Utc::now() - Duration::hours(2)).await.unwrap();
    history.record_play_end(id, true).await.unwrap();

    assert!(history.query_popularity(&[], &[channel], Utc::now(), 10).await.unwrap().is_empty());
    assert!(history.query_popularity(&[UserId::new(USER)], &[], Utc::now(), 10).await.unwrap().is_empty());
    assert!(history.query_recent(&[], Utc::now() - Duration::days(1)).await.unwrap().is_empty());
    assert!(history.query_last_finished(&[], 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn requests_are_appended() {
    let history = SqliteHistory::in_memory().await.unwrap();
    let channel = ChannelId::new(TEXT_CHANNEL);

    history.record_request(UserId::new(USER), channel, &track("A", "X")).await.unwrap();
    history.record_request(UserId::new(USER), channel, &track("A", "X")).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM song_requests")
        .fetch_one(history.pool())
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(history.count_rows(NaturalKey::User(UserId::new(USER))).await.unwrap(), 1);
}

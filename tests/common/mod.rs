#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jukebox::{
    error::{
        PersistenceError,
        PersistenceResult,
        PlaybackError,
        PlaybackResult,
        RecommendationResult,
        ResolutionError,
        ResolutionResult,
        VoiceResult
    },
    events::Presenter,
    history::HistoryStore,
    model::{NaturalKey, PlayerView, Popularity, RecordId, SongPick, StreamRef, Track, TrackRequester},
    recommend::LlmClient,
    resolver::{AudioResolver, Extraction, MetadataSearch, StreamExtractor, TrackSearch},
    types::{Completion, CompletionSender},
    voice::{Roster, VoiceDriver},
    CommandContext
};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{atomic::{AtomicBool, AtomicUsize, Ordering}, Arc},
    time::Duration
};
use tokio::sync::oneshot;

pub const TEXT_CHANNEL: u64 = 500;
pub const VOICE_CHANNEL: u64 = 600;
pub const USER: u64 = 700;

pub fn track(title: &str, artist: &str) -> Track {
    Track {
        title: title.to_string(),
        artist: artist.to_string(),
        search_term: format!("{} {}", title, artist),
        stream: StreamRef::Remote(format!("https://cdn.example/{}", title)),
        web_url: None,
        thumbnail_url: None,
        requester: Some(TrackRequester::from(UserId::new(USER)))
    }
}

pub fn ctx(guild: u64) -> CommandContext {
    CommandContext {
        guild: GuildId::new(guild),
        channel: ChannelId::new(TEXT_CHANNEL),
        voice_channel: Some(ChannelId::new(VOICE_CHANNEL)),
        requester: TrackRequester::from((USER, "listener".to_string()))
    }
}

/// Polls `condition` until it holds, panicking after a couple of seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    panic!("condition not reached in time");
}

#[derive(Default)]
pub struct FakeDriver {
    pub joins: AtomicUsize,
    pub leaves: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    pub played: Mutex<Vec<Track>>,
    pub volumes: Mutex<Vec<f32>>,
    /// Titles that fail as soon as playback is requested.
    pub broken: Mutex<HashSet<String>>,
    pub join_delay: Mutex<Option<Duration>>,
    pub stop_delay: Mutex<Option<Duration>>,
    pub failing_stop: AtomicBool,
    /// Voice channel each guild is currently connected to.
    pub connected: Mutex<HashMap<GuildId, ChannelId>>,
    completions: Mutex<HashMap<GuildId, CompletionSender>>
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn titles(&self) -> Vec<String> {
        self.played.lock().iter().map(|t| t.title.clone()).collect()
    }

    pub fn played_count(&self) -> usize {
        self.played.lock().len()
    }

    /// Ends the current track naturally.
    pub fn finish(&self, guild: u64) -> bool {
        self.complete(guild, Ok(()))
    }

    pub fn fail(&self, guild: u64, why: &str) -> bool {
        self.complete(guild, Err(PlaybackError::Backend(why.to_string())))
    }

    pub fn is_connected(&self, guild: u64) -> bool {
        self.connected.lock().contains_key(&GuildId::new(guild))
    }

    fn complete(&self, guild: u64, outcome: PlaybackResult<()>) -> bool {
        match self.completions.lock().remove(&GuildId::new(guild)) {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false
        }
    }
}

#[async_trait]
impl VoiceDriver for FakeDriver {
    async fn join(&self, guild: GuildId, channel: ChannelId) -> VoiceResult<()> {
        let delay = *self.join_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.joins.fetch_add(1, Ordering::SeqCst);
        self.connected.lock().insert(guild, channel);
        Ok(())
    }

    async fn leave(&self, guild: GuildId) -> VoiceResult<()> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        self.connected.lock().remove(&guild);
        Ok(())
    }

    async fn play(&self, guild: GuildId, track: &Track, volume: f32) -> PlaybackResult<Completion> {
        self.played.lock().push(track.clone());
        self.volumes.lock().push(volume);

        if self.broken.lock().contains(&track.title) {
            return Err(PlaybackError::Backend(format!("{} is broken", track.title)));
        }

        let (tx, rx) = oneshot::channel();
        self.completions.lock().insert(guild, tx);

        Ok(rx)
    }

    async fn pause(&self, _guild: GuildId) -> PlaybackResult<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self, _guild: GuildId) -> PlaybackResult<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, guild: GuildId) -> PlaybackResult<()> {
        let delay = *self.stop_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_stop.load(Ordering::SeqCst) {
            return Err(PlaybackError::Backend("stop refused".to_string()));
        }

        if let Some(sender) = self.completions.lock().remove(&guild) {
            let _ = sender.send(Ok(()));
        }
        Ok(())
    }

    async fn set_volume(&self, _guild: GuildId, volume: f32) -> PlaybackResult<()> {
        self.volumes.lock().push(volume);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    pub views: Mutex<Vec<PlayerView>>,
    pub errors: Mutex<Vec<PlaybackError>>,
    pub teardowns: AtomicUsize
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn render(&self, view: &PlayerView) {
        self.views.lock().push(view.clone());
    }

    async fn report_error(&self, _guild: GuildId, _channel: ChannelId, error: &PlaybackError) {
        self.errors.lock().push(error.clone());
    }

    async fn teardown(&self, _guild: GuildId) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FixedRoster {
    pub listeners: Vec<UserId>,
    pub channels: Vec<ChannelId>
}

#[async_trait]
impl Roster for FixedRoster {
    async fn listeners(&self, _guild: GuildId, _voice_channel: ChannelId) -> Vec<UserId> {
        self.listeners.clone()
    }

    async fn channels(&self, _guild: GuildId) -> Vec<ChannelId> {
        self.channels.clone()
    }
}

/// Case-insensitive lookup table standing in for the metadata service.
#[derive(Default)]
pub struct FakeSearch {
    pub matches: HashMap<String, SongPick>,
    pub failing: bool,
    pub queries: Mutex<Vec<String>>
}

impl FakeSearch {
    pub fn with(entries: &[(&str, &str, &str)]) -> Self {
        Self {
            matches: entries
                .iter()
                .map(|(query, title, artist)| (query.to_lowercase(), SongPick::new(title, artist)))
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MetadataSearch for FakeSearch {
    async fn search(&self, text: &str) -> ResolutionResult<Option<SongPick>> {
        self.queries.lock().push(text.to_string());

        if self.failing {
            return Err(ResolutionError::Service("search is down".to_string()));
        }

        Ok(self.matches.get(&text.to_lowercase()).cloned())
    }
}

/// Replays scripted outcomes, then succeeds with an extraction named after the target.
#[derive(Default)]
pub struct FakeExtractor {
    pub script: Mutex<VecDeque<ResolutionResult<Extraction>>>,
    pub targets: Mutex<Vec<TrackSearch>>,
    /// How long every extraction takes.
    pub delay: Mutex<Option<Duration>>
}

impl FakeExtractor {
    pub fn scripted(outcomes: Vec<ResolutionResult<Extraction>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.targets.lock().len()
    }
}

pub fn extraction(title: &str, uploader: Option<&str>) -> Extraction {
    Extraction {
        title: title.to_string(),
        artist: uploader.map(str::to_string),
        stream: StreamRef::Remote(format!("https://cdn.example/{}", title)),
        web_url: Some(format!("https://video.example/{}", title)),
        thumbnail_url: None
    }
}

#[async_trait]
impl StreamExtractor for FakeExtractor {
    async fn extract(&self, target: &TrackSearch) -> ResolutionResult<Extraction> {
        self.targets.lock().push(target.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => {
                let title = match target {
                    TrackSearch::Youtube(query) => query.clone(),
                    TrackSearch::Url(url) => url.clone()
                };
                Ok(extraction(&title, Some("uploader")))
            }
        }
    }
}

pub fn resolver(search: Arc<FakeSearch>, extractor: Arc<FakeExtractor>) -> AudioResolver {
    let mut resolver = AudioResolver::new(search, extractor);
    resolver.set_retries(3, Duration::from_millis(1));
    resolver
}

pub fn default_resolver() -> AudioResolver {
    resolver(default_search(), Arc::new(FakeExtractor::default()))
}

fn default_search() -> Arc<FakeSearch> {
    Arc::new(FakeSearch::with(&[("believe", "Believe", "Cher")]))
}

pub struct FakeLlm {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>
}

impl FakeLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, _system: &str, user: &str) -> RecommendationResult<String> {
        self.prompts.lock().push(user.to_string());
        Ok(self.reply.clone())
    }
}

/// Every call fails as if the database were gone.
pub struct FailingHistory;

fn broken() -> PersistenceError {
    PersistenceError::Database(sqlx::Error::PoolClosed)
}

#[async_trait]
impl HistoryStore for FailingHistory {
    async fn record_request(&self, _user: UserId, _channel: ChannelId, _track: &Track) -> PersistenceResult<()> {
        Err(broken())
    }

    async fn record_play_start(&self, _channel: ChannelId, _track: &Track) -> PersistenceResult<RecordId> {
        Err(broken())
    }

    async fn record_play_end(&self, _record: RecordId, _finished: bool) -> PersistenceResult<()> {
        Err(broken())
    }

    async fn query_popularity(
        &self,
        _listeners: &[UserId],
        _channels: &[ChannelId],
        _cutoff: DateTime<Utc>,
        _limit: u32
    ) -> PersistenceResult<Vec<Popularity>> {
        Err(broken())
    }

    async fn query_recent(&self, _channels: &[ChannelId], _cutoff: DateTime<Utc>) -> PersistenceResult<Vec<SongPick>> {
        Err(broken())
    }

    async fn query_last_finished(&self, _channels: &[ChannelId], _limit: u32) -> PersistenceResult<Vec<SongPick>> {
        Err(broken())
    }

    async fn upsert_natural_key(&self, _key: NaturalKey) -> PersistenceResult<i64> {
        Err(broken())
    }
}

pub struct Harness {
    pub registry: jukebox::PlayerRegistry,
    pub driver: Arc<FakeDriver>,
    pub extractor: Arc<FakeExtractor>,
    pub history: Arc<jukebox::history::MemoryHistory>,
    pub presenter: Arc<RecordingPresenter>
}

pub fn harness(configure: impl FnOnce(&mut jukebox::RegistryBuilder)) -> Harness {
    let driver = FakeDriver::new();
    let extractor = Arc::new(FakeExtractor::default());
    let history = Arc::new(jukebox::history::MemoryHistory::new());
    let presenter = Arc::new(RecordingPresenter::default());

    let mut builder = jukebox::PlayerRegistry::builder(driver.clone(), resolver(default_search(), extractor.clone()));
    builder
        .set_history(history.clone())
        .set_presenter(presenter.clone())
        .set_remove_downloads(false);
    configure(&mut builder);

    Harness {
        registry: builder.build(),
        driver,
        extractor,
        history,
        presenter
    }
}

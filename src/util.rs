//! Songbird and serenity-cache implementations of the voice collaborators.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::{
    cache::Cache,
    client::Context,
    model::id::{ChannelId, GuildId, UserId}
};
use songbird::{
    error::{ControlError, JoinError},
    events::{Event, EventContext, EventHandler, TrackEvent},
    input::{File, Input},
    tracks::{PlayMode, TrackHandle},
    Songbird
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use crate::{
    error::{PlaybackError, PlaybackResult, VoiceConnectionError, VoiceResult},
    model::Track,
    types::{Completion, CompletionSender},
    voice::{Roster, VoiceDriver}
};

/// The voice channel `user` is connected to in `guild`, according to the cache.
pub fn voice_channel_of(cache: impl AsRef<Cache>, guild: impl Into<GuildId>, user: impl Into<UserId>) -> Option<ChannelId> {
    let user = user.into();

    cache.as_ref()
        .guild(guild.into())
        .and_then(|guild| guild.voice_states.get(&user).and_then(|vs| vs.channel_id))
}

/// Plays downloaded tracks through a songbird manager.
pub struct SongbirdDriver {
    manager: Arc<Songbird>,
    tracks: DashMap<GuildId, TrackHandle>
}

impl SongbirdDriver {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            tracks: DashMap::new()
        }
    }

    /// Uses the manager registered on the serenity client.
    pub async fn from_context(ctx: &Context) -> Option<Self> {
        songbird::get(ctx).await.map(Self::new)
    }

    fn with_track<T>(&self, guild: GuildId, action: impl FnOnce(&TrackHandle) -> Result<T, ControlError>) -> PlaybackResult<T> {
        let handle = self.tracks
            .get(&guild)
            .ok_or_else(|| PlaybackError::Backend("nothing is playing".to_string()))?;

        action(&handle).map_err(|e| PlaybackError::Backend(e.to_string()))
    }
}

#[async_trait]
impl VoiceDriver for SongbirdDriver {
    async fn join(&self, guild: GuildId, channel: ChannelId) -> VoiceResult<()> {
        match self.manager.join(guild, channel).await {
            Ok(_) => Ok(()),
            Err(JoinError::TimedOut) => Err(VoiceConnectionError::Timeout),
            Err(why) => Err(VoiceConnectionError::Driver(why.to_string()))
        }
    }

    async fn leave(&self, guild: GuildId) -> VoiceResult<()> {
        self.tracks.remove(&guild);

        if self.manager.get(guild).is_some() {
            self.manager.remove(guild).await.map_err(|e| VoiceConnectionError::Driver(e.to_string()))?;
        }

        Ok(())
    }

    async fn play(&self, guild: GuildId, track: &Track, volume: f32) -> PlaybackResult<Completion> {
        let call = self.manager
            .get(guild)
            .ok_or_else(|| PlaybackError::Backend("not connected to a voice channel".to_string()))?;

        let path = track.stream
            .as_file()
            .ok_or_else(|| PlaybackError::Backend(format!("cannot play remote stream {}", track.stream)))?;

        let input: Input = File::new(path.clone()).into();
        let handle = call.lock().await.play_input(input);

        let (tx, rx) = oneshot::channel();
        let notifier = CompletionNotifier(Arc::new(Mutex::new(Some(tx))));

        let backend = |e: ControlError| PlaybackError::Backend(e.to_string());
        handle.add_event(Event::Track(TrackEvent::End), notifier.clone()).map_err(backend)?;
        handle.add_event(Event::Track(TrackEvent::Error), notifier).map_err(backend)?;
        handle.set_volume(volume).map_err(backend)?;

        self.tracks.insert(guild, handle);

        Ok(rx)
    }

    async fn pause(&self, guild: GuildId) -> PlaybackResult<()> {
        self.with_track(guild, |handle| handle.pause())
    }

    async fn resume(&self, guild: GuildId) -> PlaybackResult<()> {
        self.with_track(guild, |handle| handle.play())
    }

    async fn stop(&self, guild: GuildId) -> PlaybackResult<()> {
        match self.tracks.remove(&guild) {
            Some((_, handle)) => handle.stop().map_err(|e| PlaybackError::Backend(e.to_string())),
            None => Ok(())
        }
    }

    async fn set_volume(&self, guild: GuildId, volume: f32) -> PlaybackResult<()> {
        self.with_track(guild, |handle| handle.set_volume(volume))
    }
}

/// Forwards the first End or Error event of a track to the player.
#[derive(Clone)]
struct CompletionNotifier(Arc<Mutex<Option<CompletionSender>>>);

#[async_trait]
impl EventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(states) => states
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(why) => Some(Err(PlaybackError::Backend(why.to_string()))),
                    _ => None
                })
                .unwrap_or(Ok(())),
            _ => Ok(())
        };

        if let Some(sender) = self.0.lock().take() {
            debug!("Track completed: {:?}", outcome);
            let _ = sender.send(outcome);
        }

        Some(Event::Cancel)
    }
}

/// Listeners and channels straight from the serenity cache.
pub struct CacheRoster {
    cache: Arc<Cache>
}

impl CacheRoster {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Roster for CacheRoster {
    async fn listeners(&self, guild: GuildId, voice_channel: ChannelId) -> Vec<UserId> {
        let bot = self.cache.current_user().id;

        match self.cache.guild(guild) {
            Some(guild) => guild.voice_states
                .values()
                .filter(|vs| vs.channel_id == Some(voice_channel) && vs.user_id != bot)
                .map(|vs| vs.user_id)
                .collect(),
            None => Vec::new()
        }
    }

    async fn channels(&self, guild: GuildId) -> Vec<ChannelId> {
        self.cache
            .guild(guild)
            .map(|guild| guild.channels.keys().copied().collect())
            .unwrap_or_default()
    }
}

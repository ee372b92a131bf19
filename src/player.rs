//! One actor per guild owning the queue and the playback state machine.
//!
//! Every operation on a [`PlayerHandle`] becomes a [`Command`] on the actor's
//! channel. The actor task is the only reader of that channel and the only
//! writer of player state, so commands and the playback loop never race.

use chrono::Utc;
use serenity::model::id::{
    ChannelId as DiscordChannelId,
    GuildId as DiscordGuildId,
    UserId as DiscordUserId
};
use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Weak}
};
use tokio::{sync::{mpsc, oneshot, watch}, time::Instant};
use tracing::{debug, error, info, warn};
use crate::{
    error::{PlaybackError, PlaybackResult, PlayerError, PlayerResult, RecommendationError},
    events::{EventType, PresenterPump},
    model::{PlayerState, PlayerView, RecordId, StreamRef, Track},
    recommend::Selection,
    registry::{RegistryInner, Services},
    types::{CommandReceiver, CommandSender, Reply}
};

pub(crate) enum Command {
    Enqueue(Track, Reply<usize>),
    Skip(Reply<PlayerResult<()>>),
    Pause(Reply<PlayerResult<()>>),
    Resume(Reply<PlayerResult<()>>),
    SetDjMode(bool, Reply<()>),
    SetVolume(f32, Reply<f32>),
    Peek(Reply<Vec<Track>>),
    RemoveAt(usize, Reply<PlayerResult<Track>>),
    Clear(Reply<usize>),
    Snapshot(Reply<PlayerView>),
    Destroy
}

enum Flow {
    Continue,
    Shutdown
}

enum Pick {
    Track(Track),
    Failed(RecommendationError),
    Abandoned,
    Shutdown
}

/// Cheap, cloneable way of talking to a guild's player.
#[derive(Clone)]
pub struct PlayerHandle {
    guild: DiscordGuildId,
    id: u64,
    commands: CommandSender,
    stopped: watch::Receiver<()>
}

impl PlayerHandle {
    pub fn guild(&self) -> DiscordGuildId {
        self.guild
    }

    /// Unique per spawned actor, never reused within a registry.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// False as soon as the actor starts tearing down.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// True once the actor has left voice and released its registry slot.
    pub fn has_stopped(&self) -> bool {
        self.stopped.has_changed().is_err()
    }

    /// Resolves once the actor has left voice and released its registry slot.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        while stopped.changed().await.is_ok() {}
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> PlayerResult<T> {
        let (tx, rx) = oneshot::channel();

        self.commands.send(command(tx)).map_err(|_| PlayerError::ActorGone)?;

        rx.await.map_err(|_| PlayerError::ActorGone)
    }

    /// Appends to the queue, returning the new queue length.
    pub async fn enqueue(&self, track: Track) -> PlayerResult<usize> {
        self.request(|reply| Command::Enqueue(track, reply)).await
    }

    pub async fn skip(&self) -> PlayerResult<()> {
        self.request(Command::Skip).await?
    }

    pub async fn pause(&self) -> PlayerResult<()> {
        self.request(Command::Pause).await?
    }

    pub async fn resume(&self) -> PlayerResult<()> {
        self.request(Command::Resume).await?
    }

    pub async fn set_dj_mode(&self, enabled: bool) -> PlayerResult<()> {
        self.request(|reply| Command::SetDjMode(enabled, reply)).await
    }

    /// Returns the volume actually applied after clamping.
    pub async fn set_volume(&self, volume: f32) -> PlayerResult<f32> {
        self.request(|reply| Command::SetVolume(volume, reply)).await
    }

    pub async fn peek(&self) -> PlayerResult<Vec<Track>> {
        self.request(Command::Peek).await
    }

    pub async fn remove_at(&self, index: usize) -> PlayerResult<Track> {
        self.request(|reply| Command::RemoveAt(index, reply)).await?
    }

    /// Empties the queue, returning how many tracks were dropped.
    pub async fn clear(&self) -> PlayerResult<usize> {
        self.request(Command::Clear).await
    }

    pub async fn snapshot(&self) -> PlayerResult<PlayerView> {
        self.request(Command::Snapshot).await
    }

    /// Asks the actor to tear itself down. Safe to call any number of times.
    pub fn destroy(&self) {
        let _ = self.commands.send(Command::Destroy);
    }
}

pub(crate) struct PlayerActor {
    guild: DiscordGuildId,
    channel: DiscordChannelId,
    voice_channel: DiscordChannelId,
    id: u64,
    state: PlayerState,
    current: Option<Track>,
    queue: VecDeque<Track>,
    dj_mode: bool,
    volume: f32,
    skipped: bool,
    idle_since: Instant,
    requesters: HashSet<DiscordUserId>,
    commands: CommandReceiver,
    services: Arc<Services>,
    presenter: PresenterPump,
    registry: Weak<RegistryInner>,
    // Dropped with the actor, which wakes `PlayerHandle::stopped`.
    _alive: watch::Sender<()>
}

impl PlayerActor {
    pub(crate) fn new(
        id: u64,
        guild: DiscordGuildId,
        channel: DiscordChannelId,
        voice_channel: DiscordChannelId,
        services: Arc<Services>,
        registry: Weak<RegistryInner>
    ) -> (Self, PlayerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (alive, stopped) = watch::channel(());
        let presenter = PresenterPump::spawn(Arc::clone(&services.presenter), guild);

        let actor = Self {
            guild,
            channel,
            voice_channel,
            id,
            state: PlayerState::Idle,
            current: None,
            queue: VecDeque::new(),
            dj_mode: false,
            volume: services.config.default_volume,
            skipped: false,
            idle_since: Instant::now(),
            requesters: HashSet::new(),
            commands: rx,
            services,
            presenter,
            registry,
            _alive: alive
        };

        let handle = PlayerHandle {
            guild,
            id,
            commands: tx,
            stopped
        };

        (actor, handle)
    }

    pub(crate) async fn run(mut self) {
        info!("Player for guild {} started in channel {}", self.guild, self.channel);

        while let Some(track) = self.next_track().await {
            if let Flow::Shutdown = self.play(track).await {
                break;
            }
        }

        self.destroy().await;
    }

    /// Idle phase. `None` means the actor should shut down.
    async fn next_track(&mut self) -> Option<Track> {
        self.state = PlayerState::Idle;
        self.current = None;
        self.idle_since = Instant::now();
        self.render();

        loop {
            if let Some(track) = self.queue.pop_front() {
                return Some(track);
            }

            if self.dj_mode {
                match self.recommend().await {
                    Pick::Track(track) => return Some(track),
                    Pick::Failed(why) => {
                        warn!("Recommendation failed in guild {}, disabling dj mode: {}", self.guild, why);
                        self.dj_mode = false;
                        self.idle_since = Instant::now();
                        self.render();
                    },
                    Pick::Abandoned => debug!("Dropped pending recommendation in guild {}", self.guild),
                    Pick::Shutdown => return None
                }
                continue;
            }

            let deadline = self.idle_since + self.services.config.idle_timeout;

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Flow::Shutdown = self.handle(command).await {
                            return None;
                        }
                    },
                    None => return None
                },
                _ = tokio::time::sleep_until(deadline) => {
                    info!("Player for guild {} idle for {:?}, disconnecting", self.guild, self.services.config.idle_timeout);
                    return None;
                }
            }
        }
    }

    /// Runs the recommender while still serving commands. The pick is dropped
    /// once dj mode is switched off or something gets queued.
    async fn recommend(&mut self) -> Pick {
        let (listeners, channels) = self.audience().await;
        let window = chrono::Duration::from_std(self.services.config.recency_window)
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let selection = Selection::new(self.guild, listeners, channels)
            .cutoff(Utc::now() - window)
            .limit(self.services.config.candidate_limit);

        let recommender = Arc::clone(&self.services.recommender);
        let pick = async move { recommender.select_next(&selection).await };
        tokio::pin!(pick);

        loop {
            tokio::select! {
                biased;
                result = &mut pick => return match result {
                    Ok(track) => Pick::Track(track),
                    Err(why) => Pick::Failed(why)
                },
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Flow::Shutdown = self.handle(command).await {
                            return Pick::Shutdown;
                        }

                        if !self.dj_mode || !self.queue.is_empty() {
                            return Pick::Abandoned;
                        }
                    },
                    None => return Pick::Shutdown
                }
            }
        }
    }

    /// Without a roster, falls back to what this session has seen.
    async fn audience(&self) -> (Vec<DiscordUserId>, Vec<DiscordChannelId>) {
        match &self.services.roster {
            Some(roster) => {
                let listeners = roster.listeners(self.guild, self.voice_channel).await;
                let mut channels = roster.channels(self.guild).await;

                if !channels.contains(&self.channel) {
                    channels.push(self.channel);
                }

                (listeners, channels)
            },
            None => (self.requesters.iter().copied().collect(), vec![self.channel])
        }
    }

    /// Playing phase, from start until the completion signal.
    async fn play(&mut self, track: Track) -> Flow {
        let record = match self.services.history.record_play_start(self.channel, &track).await {
            Ok(record) => Some(record),
            Err(why) => {
                warn!("Could not record play start in guild {}: {}", self.guild, why);
                None
            }
        };

        let mut completion = match self.services.driver.play(self.guild, &track, self.volume).await {
            Ok(completion) => completion,
            Err(why) => {
                self.playback_failed(&track, why);
                self.finish(record, false, &track).await;
                return Flow::Continue;
            }
        };

        info!("Playing {} in guild {}", track, self.guild);
        self.current = Some(track);
        self.state = PlayerState::Playing;
        self.render();

        let outcome: PlaybackResult<()> = loop {
            tokio::select! {
                outcome = &mut completion => break outcome.unwrap_or(Err(PlaybackError::Interrupted)),
                command = self.commands.recv() => {
                    let flow = match command {
                        Some(command) => self.handle(command).await,
                        None => Flow::Shutdown
                    };

                    if let Flow::Shutdown = flow {
                        if let Some(track) = self.current.take() {
                            self.finish(record, false, &track).await;
                        }
                        return Flow::Shutdown;
                    }
                }
            }
        };

        let finished = outcome.is_ok() && !self.skipped;
        self.skipped = false;

        let track = match self.current.take() {
            Some(track) => track,
            None => return Flow::Continue
        };

        if let Err(why) = outcome {
            self.playback_failed(&track, why);
        } else {
            debug!("Finished {} in guild {} (complete: {})", track, self.guild, finished);
        }

        self.finish(record, finished, &track).await;

        Flow::Continue
    }

    fn playback_failed(&self, track: &Track, why: PlaybackError) {
        error!("Error playing {} on guild id: {}, error: {}", track, self.guild, why);
        self.presenter.process(EventType::Error(self.channel, why));
    }

    /// Closes the play record and drops a downloaded file.
    async fn finish(&self, record: Option<RecordId>, finished: bool, track: &Track) {
        if let Some(record) = record {
            if let Err(why) = self.services.history.record_play_end(record, finished).await {
                warn!("Could not record play end in guild {}: {}", self.guild, why);
            }
        }

        if let (true, StreamRef::File(path)) = (self.services.config.remove_downloads, &track.stream) {
            if let Err(why) = tokio::fs::remove_file(path).await {
                debug!("Could not remove {}: {}", path.display(), why);
            }
        }
    }

    async fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Enqueue(track, reply) => {
                if let Some(user) = track.requester_id() {
                    self.requesters.insert(user);

                    if let Err(why) = self.services.history.record_request(user, self.channel, &track).await {
                        warn!("Could not record request in guild {}: {}", self.guild, why);
                    }
                }

                debug!("Queued {} in guild {}", track, self.guild);
                self.queue.push_back(track);
                let _ = reply.send(self.queue.len());
                self.render();
            },
            Command::Skip(reply) => {
                let _ = reply.send(self.skip().await);
            },
            Command::Pause(reply) => {
                let _ = reply.send(self.pause().await);
            },
            Command::Resume(reply) => {
                let _ = reply.send(self.resume().await);
            },
            Command::SetDjMode(enabled, reply) => {
                info!("DJ mode {} in guild {}", if enabled { "enabled" } else { "disabled" }, self.guild);
                self.dj_mode = enabled;
                self.idle_since = Instant::now();
                let _ = reply.send(());
                self.render();
            },
            Command::SetVolume(volume, reply) => {
                self.volume = volume.clamp(0.0, 1.0);

                if self.current.is_some() {
                    if let Err(why) = self.services.driver.set_volume(self.guild, self.volume).await {
                        warn!("Could not change volume in guild {}: {}", self.guild, why);
                    }
                }

                let _ = reply.send(self.volume);
                self.render();
            },
            Command::Peek(reply) => {
                let _ = reply.send(self.queue.iter().cloned().collect());
            },
            Command::RemoveAt(index, reply) => {
                let removed = self.queue.remove(index).ok_or(PlayerError::IndexOutOfRange(index));
                let changed = removed.is_ok();

                let _ = reply.send(removed);
                if changed {
                    self.render();
                }
            },
            Command::Clear(reply) => {
                let removed = self.queue.len();
                self.queue.clear();

                let _ = reply.send(removed);
                self.render();
            },
            Command::Snapshot(reply) => {
                let _ = reply.send(self.view());
            },
            Command::Destroy => return Flow::Shutdown
        }

        Flow::Continue
    }

    async fn skip(&mut self) -> PlayerResult<()> {
        if self.state == PlayerState::Idle {
            return Err(PlayerError::NotPlaying);
        }

        self.services.driver.stop(self.guild).await?;
        self.skipped = true;

        Ok(())
    }

    async fn pause(&mut self) -> PlayerResult<()> {
        match self.state {
            PlayerState::Idle => Err(PlayerError::NotPlaying),
            PlayerState::Paused => Ok(()),
            PlayerState::Playing => {
                self.services.driver.pause(self.guild).await?;
                self.state = PlayerState::Paused;
                self.render();
                Ok(())
            }
        }
    }

    async fn resume(&mut self) -> PlayerResult<()> {
        match self.state {
            PlayerState::Idle => Err(PlayerError::NotPlaying),
            PlayerState::Playing => Ok(()),
            PlayerState::Paused => {
                self.services.driver.resume(self.guild).await?;
                self.state = PlayerState::Playing;
                self.render();
                Ok(())
            }
        }
    }

    fn view(&self) -> PlayerView {
        PlayerView {
            guild: self.guild,
            channel: self.channel,
            state: self.state,
            current: self.current.clone(),
            queue: self.queue.iter().cloned().collect(),
            dj_mode: self.dj_mode,
            volume: self.volume
        }
    }

    fn render(&self) {
        self.presenter.process(EventType::Render(self.view()));
    }

    async fn destroy(&mut self) {
        info!("Destroying player for guild {}", self.guild);

        self.commands.close();
        self.state = PlayerState::Idle;

        if let Err(why) = self.services.driver.stop(self.guild).await {
            debug!("Stopping playback in guild {} failed: {}", self.guild, why);
        }

        if let Err(why) = self.services.driver.leave(self.guild).await {
            warn!("Failed to leave voice in guild {}: {}", self.guild, why);
        }

        self.presenter.close().await;

        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.guild, self.id);
        }

        info!("Player for guild {} destroyed", self.guild);
    }
}

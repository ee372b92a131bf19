use dashmap::DashMap;
use serenity::model::id::{
    ChannelId as DiscordChannelId,
    GuildId as DiscordGuildId
};
use std::{
    sync::{atomic::{AtomicU64, Ordering}, Arc},
    time::Duration
};
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn};
use tracing_futures::Instrument;
use typemap_rev::TypeMapKey;
use crate::{
    builder::{PlayerConfig, RegistryBuilder},
    error::{CommandResult, VoiceConnectionError},
    events::Presenter,
    history::HistoryStore,
    model::{Track, TrackRequester},
    player::{PlayerActor, PlayerHandle},
    recommend::RecommendationEngine,
    resolver::AudioResolver,
    voice::{Roster, VoiceDriver}
};

/// Where a command came from.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub guild: DiscordGuildId,
    /// Text channel the player reports to and records history under.
    pub channel: DiscordChannelId,
    /// The requester's current voice channel, if they are in one.
    pub voice_channel: Option<DiscordChannelId>,
    pub requester: TrackRequester
}

/// Collaborators shared by every actor.
pub(crate) struct Services {
    pub(crate) driver: Arc<dyn VoiceDriver>,
    pub(crate) resolver: Arc<AudioResolver>,
    pub(crate) history: Arc<dyn HistoryStore>,
    pub(crate) recommender: Arc<RecommendationEngine>,
    pub(crate) presenter: Arc<dyn Presenter>,
    pub(crate) roster: Option<Arc<dyn Roster>>,
    pub(crate) config: PlayerConfig
}

pub(crate) struct RegistryInner {
    players: DashMap<DiscordGuildId, PlayerHandle>,
    /// Held while a guild's player is being created.
    creating: DashMap<DiscordGuildId, Arc<Mutex<()>>>,
    services: Arc<Services>,
    actor_counter: AtomicU64
}

impl RegistryInner {
    /// Drops the slot for `guild` only if it still belongs to actor `id`.
    pub(crate) fn release(&self, guild: DiscordGuildId, id: u64) {
        if self.players.remove_if(&guild, |_, handle| handle.id() == id).is_some() {
            info!("Player for guild {} released from registry", guild);
        }
    }
}

/// Owns every guild's player. Cloning shares the same registry.
#[derive(Clone)]
pub struct PlayerRegistry {
    inner: Arc<RegistryInner>
}

impl TypeMapKey for PlayerRegistry {
    type Value = PlayerRegistry;
}

impl PlayerRegistry {
    pub fn builder(driver: Arc<dyn VoiceDriver>, resolver: AudioResolver) -> RegistryBuilder {
        RegistryBuilder::new(driver, resolver)
    }

    pub(crate) fn new(builder: RegistryBuilder) -> Self {
        let mut engine = RecommendationEngine::new(Arc::clone(&builder.history), Arc::clone(&builder.resolver), builder.llm);
        engine.set_seed_count(builder.seed_count);

        let services = Services {
            driver: builder.driver,
            resolver: builder.resolver,
            history: builder.history,
            recommender: Arc::new(engine),
            presenter: builder.presenter,
            roster: builder.roster,
            config: builder.config
        };

        Self {
            inner: Arc::new(RegistryInner {
                players: DashMap::new(),
                creating: DashMap::new(),
                services: Arc::new(services),
                actor_counter: AtomicU64::new(0)
            })
        }
    }

    pub fn resolver(&self) -> &AudioResolver {
        &self.inner.services.resolver
    }

    pub fn recommender(&self) -> &RecommendationEngine {
        &self.inner.services.recommender
    }

    pub fn len(&self) -> usize {
        self.inner.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.players.is_empty()
    }

    pub fn get(&self, guild: DiscordGuildId) -> Option<PlayerHandle> {
        self.inner.players
            .get(&guild)
            .map(|slot| slot.value().clone())
            .filter(PlayerHandle::is_running)
    }

    /// The guild's player, joining the requester's voice channel and spawning
    /// one if there is none. Creation is serialized per guild, so concurrent
    /// callers share one join and one actor.
    pub async fn get_or_create(&self, ctx: &CommandContext) -> CommandResult<PlayerHandle> {
        if let Some(handle) = self.get(ctx.guild) {
            return Ok(handle);
        }

        let voice_channel = ctx.voice_channel.ok_or(VoiceConnectionError::InvalidChannel)?;

        let lock = Arc::clone(&self.inner.creating.entry(ctx.guild).or_default());
        let _creating = lock.lock().await;

        // A predecessor still tearing down owns the voice connection until it stops.
        loop {
            let previous = self.inner.players.get(&ctx.guild).map(|slot| slot.value().clone());

            match previous {
                Some(handle) if handle.is_running() => return Ok(handle),
                Some(handle) if !handle.has_stopped() => {
                    debug!("Waiting for player {} of guild {} to stop", handle.id(), ctx.guild);
                    handle.stopped().await;
                },
                _ => break
            }
        }

        let services = &self.inner.services;

        tokio::time::timeout(services.config.connect_timeout, services.driver.join(ctx.guild, voice_channel))
            .await
            .map_err(|_| VoiceConnectionError::Timeout)??;

        let handle = self.spawn(ctx, voice_channel);
        self.inner.players.insert(ctx.guild, handle.clone());

        Ok(handle)
    }

    fn spawn(&self, ctx: &CommandContext, voice_channel: DiscordChannelId) -> PlayerHandle {
        let id = self.inner.actor_counter.fetch_add(1, Ordering::SeqCst);

        let (actor, handle) = PlayerActor::new(
            id,
            ctx.guild,
            ctx.channel,
            voice_channel,
            Arc::clone(&self.inner.services),
            Arc::downgrade(&self.inner)
        );

        let span = info_span!("player", guild = %ctx.guild, actor = id);
        tokio::spawn(actor.run().instrument(span));

        info!("Spawned player {} for guild {}", id, ctx.guild);

        handle
    }

    /// Joins if needed, resolves `query` and queues the result.
    pub async fn play(&self, ctx: &CommandContext, query: &str) -> CommandResult<Track> {
        let player = self.get_or_create(ctx).await?;
        let track = self.inner.services.resolver.create(query, Some(ctx.requester.clone())).await?;

        player.enqueue(track.clone()).await?;

        Ok(track)
    }

    pub async fn set_dj_mode(&self, ctx: &CommandContext, enabled: bool) -> CommandResult<()> {
        let player = self.get_or_create(ctx).await?;
        player.set_dj_mode(enabled).await?;

        Ok(())
    }

    /// Destroys the guild's player and waits for it to leave voice; without
    /// one, still makes sure voice is left.
    pub async fn remove(&self, guild: DiscordGuildId) {
        match self.get(guild) {
            Some(handle) => {
                handle.destroy();
                handle.stopped().await;
            },
            None => {
                if let Err(why) = self.inner.services.driver.leave(guild).await {
                    warn!("Failed to leave voice in guild {}: {}", guild, why);
                }
            }
        }
    }

    /// Destroys every player and waits, up to `timeout`, for their loops to end.
    pub async fn shutdown(&self, timeout: Duration) {
        let handles: Vec<PlayerHandle> = self.inner.players.iter().map(|slot| slot.value().clone()).collect();

        info!("Shutting down {} players", handles.len());

        for handle in &handles {
            handle.destroy();
        }

        let stopped = futures::future::join_all(handles.iter().map(PlayerHandle::stopped));

        if tokio::time::timeout(timeout, stopped).await.is_err() {
            warn!("Some players did not shut down within {:?}", timeout);
        }
    }
}

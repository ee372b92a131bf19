use async_trait::async_trait;
use serenity::model::id::{
    ChannelId as DiscordChannelId,
    GuildId as DiscordGuildId
};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use crate::{
    error::PlaybackError,
    model::{PlayerState, PlayerView}
};

/// Renders player state for users. Layout is entirely up to the implementor.
#[async_trait]
pub trait Presenter: Send + Sync + 'static {
    /// Called after every change of state, queue, volume or DJ mode.
    async fn render(&self, _view: &PlayerView) {}
    /// A playback failure the user should hear about.
    async fn report_error(&self, _guild: DiscordGuildId, _channel: DiscordChannelId, _error: &PlaybackError) {}
    /// The player is going away; remove whatever was posted for it.
    async fn teardown(&self, _guild: DiscordGuildId) {}
}

/// Presenter that only writes to the log.
pub struct LogPresenter;

#[async_trait]
impl Presenter for LogPresenter {
    async fn render(&self, view: &PlayerView) {
        match (&view.state, &view.current) {
            (PlayerState::Playing, Some(track)) => info!("Guild {} now playing {} ({} queued)", view.guild, track, view.queue.len()),
            (PlayerState::Paused, Some(track)) => info!("Guild {} paused on {}", view.guild, track),
            _ => info!("Guild {} idle ({} queued, dj mode {})", view.guild, view.queue.len(), view.dj_mode),
        }
    }

    async fn report_error(&self, guild: DiscordGuildId, channel: DiscordChannelId, error: &PlaybackError) {
        warn!("Guild {} channel {}: {}", guild, channel, error);
    }
}

pub(crate) enum EventType {
    Render(PlayerView),
    Error(DiscordChannelId, PlaybackError),
    Teardown
}

/// Feeds one guild's presentation events, in order, to the presenter on its
/// own task so a slow render never holds up the player loop.
pub(crate) struct PresenterPump {
    events: Option<mpsc::UnboundedSender<EventType>>,
    task: Option<JoinHandle<()>>
}

impl PresenterPump {
    pub(crate) fn spawn(presenter: Arc<dyn Presenter>, guild: DiscordGuildId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    EventType::Render(view) => presenter.render(&view).await,
                    EventType::Error(channel, error) => presenter.report_error(guild, channel, &error).await,
                    EventType::Teardown => presenter.teardown(guild).await,
                }
            }
        });

        Self {
            events: Some(tx),
            task: Some(task)
        }
    }

    pub(crate) fn process(&self, event: EventType) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Sends the teardown, then waits for everything queued before it.
    pub(crate) async fn close(&mut self) {
        self.process(EventType::Teardown);
        self.events.take();

        if let Some(task) = self.task.take() {
            if let Err(why) = task.await {
                warn!("Presenter task ended abnormally: {}", why);
            }
        }
    }
}

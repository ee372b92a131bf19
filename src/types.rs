use tokio::sync::{mpsc, oneshot};
use crate::{error::PlaybackResult, player::Command};

/// Resolves once the current track stops, for whatever reason.
pub type Completion = oneshot::Receiver<PlaybackResult<()>>;

pub type CompletionSender = oneshot::Sender<PlaybackResult<()>>;

pub(crate) type CommandSender = mpsc::UnboundedSender<Command>;

pub(crate) type CommandReceiver = mpsc::UnboundedReceiver<Command>;

pub(crate) type Reply<T> = oneshot::Sender<T>;

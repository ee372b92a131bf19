use std::{
    error::Error,
    fmt::{
        Display,
        Formatter,
        Result,
    },
};

pub type ResolutionResult<T> = ::std::result::Result<T, ResolutionError>;

/// Errors produced while turning a query or URL into a playable track.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionError {
    NotFound,
    Forbidden,
    Timeout,
    Service(String),
}

impl ResolutionError {
    /// Whether another attempt has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolutionError::Timeout | ResolutionError::Forbidden)
    }
}

impl Error for ResolutionError {}

impl Display for ResolutionError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ResolutionError::NotFound => write!(f, "No track matched the given search."),
            ResolutionError::Forbidden => write!(f, "The media host refused the request (403 Forbidden)."),
            ResolutionError::Timeout => write!(f, "Timed out while resolving the track."),
            ResolutionError::Service(why) => write!(f, "Resolution service failed: {}", why),
        }
    }
}

impl From<reqwest::Error> for ResolutionError {
    fn from(e: reqwest::Error) -> ResolutionError {
        if e.is_timeout() {
            return Self::Timeout;
        }

        match e.status() {
            Some(reqwest::StatusCode::FORBIDDEN) => Self::Forbidden,
            Some(reqwest::StatusCode::NOT_FOUND) => Self::NotFound,
            _ => Self::Service(e.to_string()),
        }
    }
}

pub type VoiceResult<T> = ::std::result::Result<T, VoiceConnectionError>;

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceConnectionError {
    Timeout,
    InvalidChannel,
    Driver(String),
}

impl Error for VoiceConnectionError {}

impl Display for VoiceConnectionError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            VoiceConnectionError::Timeout => write!(f, "Connecting to the voice channel timed out."),
            VoiceConnectionError::InvalidChannel => write!(f, "No valid voice channel to join, join one or provide one."),
            VoiceConnectionError::Driver(why) => write!(f, "Voice driver error: {}", why),
        }
    }
}

pub type PlaybackResult<T> = ::std::result::Result<T, PlaybackError>;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// The audio backend refused or failed the track.
    Backend(String),
    /// The completion signal went away without reporting an outcome.
    Interrupted,
}

impl Error for PlaybackError {}

impl Display for PlaybackError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            PlaybackError::Backend(why) => write!(f, "Playback failed: {}", why),
            PlaybackError::Interrupted => write!(f, "Playback was interrupted before it reported completion."),
        }
    }
}

pub type PersistenceResult<T> = ::std::result::Result<T, PersistenceError>;

#[derive(Debug)]
pub enum PersistenceError {
    Database(sqlx::Error),
    RecordNotFound(i64),
}

impl Error for PersistenceError {}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            PersistenceError::Database(why) => write!(f, "History database error: {}", why),
            PersistenceError::RecordNotFound(id) => write!(f, "No play record with id {}", id),
        }
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(e: sqlx::Error) -> PersistenceError {
        Self::Database(e)
    }
}

pub type RecommendationResult<T> = ::std::result::Result<T, RecommendationError>;

#[derive(Debug)]
pub enum RecommendationError {
    /// Nothing has ever finished playing in the given channels.
    NoHistory,
    History(PersistenceError),
    Service(String),
    /// The LLM answered with something that is not a single title/artist pair.
    Malformed(String),
    /// The LLM suggested something that was played within the recency window.
    Repeated(String),
    Resolution(ResolutionError),
}

impl Error for RecommendationError {}

impl Display for RecommendationError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            RecommendationError::NoHistory => write!(f, "No finished plays to base a recommendation on."),
            RecommendationError::History(why) => write!(f, "Could not query play history: {}", why),
            RecommendationError::Service(why) => write!(f, "Recommendation service failed: {}", why),
            RecommendationError::Malformed(reply) => write!(f, "Malformed recommendation reply: {:?}", reply),
            RecommendationError::Repeated(song) => write!(f, "Recommended {} was played too recently", song),
            RecommendationError::Resolution(why) => write!(f, "Recommended track could not be resolved: {}", why),
        }
    }
}

impl From<PersistenceError> for RecommendationError {
    fn from(e: PersistenceError) -> RecommendationError {
        Self::History(e)
    }
}

impl From<ResolutionError> for RecommendationError {
    fn from(e: ResolutionError) -> RecommendationError {
        Self::Resolution(e)
    }
}

impl From<reqwest::Error> for RecommendationError {
    fn from(e: reqwest::Error) -> RecommendationError {
        Self::Service(e.to_string())
    }
}

pub type PlayerResult<T> = ::std::result::Result<T, PlayerError>;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// The guild's actor has already shut down.
    ActorGone,
    NotPlaying,
    IndexOutOfRange(usize),
    Playback(PlaybackError),
}

impl Error for PlayerError {}

impl Display for PlayerError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            PlayerError::ActorGone => write!(f, "The player for this guild is no longer running."),
            PlayerError::NotPlaying => write!(f, "I am currently not playing anything."),
            PlayerError::IndexOutOfRange(index) => write!(f, "Could not find a track at position {}", index),
            PlayerError::Playback(e) => e.fmt(f),
        }
    }
}

impl From<PlaybackError> for PlayerError {
    fn from(e: PlaybackError) -> PlayerError {
        Self::Playback(e)
    }
}

pub type CommandResult<T> = ::std::result::Result<T, CommandError>;

/// Everything the command layer may have to relay back to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    Voice(VoiceConnectionError),
    Resolution(ResolutionError),
    Player(PlayerError),
}

impl Error for CommandError {}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            CommandError::Voice(e) => e.fmt(f),
            CommandError::Resolution(e) => e.fmt(f),
            CommandError::Player(e) => e.fmt(f),
        }
    }
}

impl From<VoiceConnectionError> for CommandError {
    fn from(e: VoiceConnectionError) -> CommandError {
        Self::Voice(e)
    }
}

impl From<ResolutionError> for CommandError {
    fn from(e: ResolutionError) -> CommandError {
        Self::Resolution(e)
    }
}

impl From<PlayerError> for CommandError {
    fn from(e: PlayerError) -> CommandError {
        Self::Player(e)
    }
}

pub type ConfigResult<T> = ::std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar(&'static str, String),
}

impl Error for ConfigError {}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ConfigError::MissingVar(name) => write!(f, "Environment variable {} is not set", name),
            ConfigError::InvalidVar(name, value) => write!(f, "Environment variable {} has an invalid value: {:?}", name, value),
        }
    }
}

use serde::{
    Serialize,
    Deserialize
};
use serenity::model::id::UserId as DiscordUserId;
use std::path::PathBuf;

/// A bare title/artist pair, as returned by the search service and the recommender.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct SongPick {
    pub title: String,
    pub artist: String
}

impl SongPick {
    pub fn new(title: impl ToString, artist: impl ToString) -> Self {
        Self {
            title: title.to_string(),
            artist: artist.to_string()
        }
    }

    /// Both fields carry something other than whitespace.
    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty() && !self.artist.trim().is_empty()
    }

    /// Canonical "title artist" string fed to stream extraction.
    pub fn query(&self) -> String {
        format!("{} {}", self.title, self.artist)
    }
}

impl std::fmt::Display for SongPick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' by {}", self.title, self.artist)
    }
}

/// Where the audio for a track can be read from.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRef {
    /// Downloaded ahead of playback.
    File(PathBuf),
    /// Direct media URL handed out by the extractor.
    Remote(String)
}

impl StreamRef {
    pub fn as_file(&self) -> Option<&PathBuf> {
        match self {
            Self::File(path) => Some(path),
            Self::Remote(_) => None
        }
    }
}

impl std::fmt::Display for StreamRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{}", url)
        }
    }
}

/// A resolved, playable unit. Never mutated after the resolver hands it out.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub title: String,
    pub artist: String,
    /// What the user (or the recommender) originally asked for.
    pub search_term: String,
    pub stream: StreamRef,
    pub web_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub requester: Option<TrackRequester>
}

impl Track {
    pub fn pick(&self) -> SongPick {
        SongPick::new(&self.title, &self.artist)
    }

    pub fn requester_id(&self) -> Option<DiscordUserId> {
        self.requester.as_ref().map(|r| r.id)
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' by {}", self.title, self.artist)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackRequester {
    pub id: DiscordUserId,
    pub name: Option<String>
}

impl From<DiscordUserId> for TrackRequester {
    fn from(id: DiscordUserId) -> TrackRequester {
        TrackRequester{id, name: None}
    }
}

impl From<(DiscordUserId, String)> for TrackRequester {
    fn from(data: (DiscordUserId, String)) -> TrackRequester {
        TrackRequester {id: data.0, name: Some(data.1)}
    }
}

impl From<(u64, String)> for TrackRequester {
    fn from(data: (u64, String)) -> TrackRequester {
        TrackRequester{id: DiscordUserId::new(data.0), name: Some(data.1)}
    }
}

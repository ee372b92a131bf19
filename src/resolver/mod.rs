//! Turning user queries into playable [`Track`]s.
//!
//! Plain text goes through two stages: a metadata search that pins down a
//! canonical title and artist, then stream extraction on "title artist". URLs
//! skip straight to extraction.

pub mod lastfm;
pub mod ytdl;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use crate::{
    error::{ResolutionError, ResolutionResult},
    model::{SongPick, StreamRef, Track, TrackRequester}
};

pub use lastfm::LastFmSearch;
pub use ytdl::YtDlpExtractor;

lazy_static! {
    static ref URL_REGEX: Regex = Regex::new(r"^https?://(?:www\.)?\S+$").unwrap();
}

pub fn is_url(query: &str) -> bool {
    URL_REGEX.is_match(query)
}

/// What the extractor is asked to look up.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSearch {
    Youtube(String),
    Url(String)
}

impl fmt::Display for TrackSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Youtube(query) => write!(f, "ytsearch:{}", query),
            Self::Url(url) => write!(f, "{}", url)
        }
    }
}

/// Result of one extraction: the first entry only.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub title: String,
    pub artist: Option<String>,
    pub stream: StreamRef,
    pub web_url: Option<String>,
    pub thumbnail_url: Option<String>
}

/// Canonical title/artist lookup.
#[async_trait]
pub trait MetadataSearch: Send + Sync + 'static {
    /// `Ok(None)` when the service has no match.
    async fn search(&self, text: &str) -> ResolutionResult<Option<SongPick>>;
}

#[async_trait]
pub trait StreamExtractor: Send + Sync + 'static {
    async fn extract(&self, target: &TrackSearch) -> ResolutionResult<Extraction>;
}

pub struct AudioResolver {
    search: Arc<dyn MetadataSearch>,
    extractor: Arc<dyn StreamExtractor>,
    max_attempts: u8,
    backoff: Duration
}

impl AudioResolver {
    pub fn new(search: Arc<dyn MetadataSearch>, extractor: Arc<dyn StreamExtractor>) -> Self {
        Self {
            search,
            extractor,
            max_attempts: 3,
            backoff: Duration::from_secs(1)
        }
    }

    /// Attempts per extraction, and the base of the linear back-off between them.
    pub fn set_retries(&mut self, max_attempts: u8, backoff: Duration) -> &mut Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub async fn create(&self, query: &str, requester: Option<TrackRequester>) -> ResolutionResult<Track> {
        let query = query.trim();

        if query.is_empty() {
            return Err(ResolutionError::NotFound);
        }

        if is_url(query) {
            return self.create_from_url(query, requester).await;
        }

        let pick = match self.search.search(query).await? {
            Some(pick) if pick.is_well_formed() => pick,
            _ => return Err(ResolutionError::NotFound)
        };

        debug!("Resolved {:?} to {}", query, pick);

        let extraction = self.extract(TrackSearch::Youtube(pick.query())).await?;

        Ok(build_track(pick, query.to_string(), extraction, requester))
    }

    /// Extraction only, keeping `pick` as the track's title and artist.
    pub async fn create_from_pick(&self, pick: &SongPick, requester: Option<TrackRequester>) -> ResolutionResult<Track> {
        let query = pick.query();
        let extraction = self.extract(TrackSearch::Youtube(query.clone())).await?;

        Ok(build_track(pick.clone(), query, extraction, requester))
    }

    async fn create_from_url(&self, url: &str, requester: Option<TrackRequester>) -> ResolutionResult<Track> {
        let extraction = self.extract(TrackSearch::Url(url.to_string())).await?;

        let fallback = || SongPick::new(&extraction.title, extraction.artist.as_deref().unwrap_or_default());
        let pick = match self.search.search(&extraction.title).await {
            Ok(Some(pick)) if pick.is_well_formed() => pick,
            Ok(_) => fallback(),
            Err(why) => {
                warn!("Metadata lookup for {:?} failed, keeping extracted title: {}", extraction.title, why);
                fallback()
            }
        };

        let search_term = extraction.title.clone();
        Ok(build_track(pick, search_term, extraction, requester))
    }

    async fn extract(&self, target: TrackSearch) -> ResolutionResult<Extraction> {
        let mut attempt = 1;

        loop {
            match self.extractor.extract(&target).await {
                Ok(extraction) => {
                    if attempt > 1 {
                        info!("Extracted {} after {} attempts", target, attempt);
                    }
                    return Ok(extraction);
                },
                Err(why) if why.is_transient() && attempt < self.max_attempts => {
                    let wait = self.backoff * u32::from(attempt);
                    warn!("Failed to extract {} (attempt {}/{}): {}, waiting {:?} before retrying", target, attempt, self.max_attempts, why, wait);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                },
                Err(why) => return Err(why)
            }
        }
    }
}

fn build_track(pick: SongPick, search_term: String, extraction: Extraction, requester: Option<TrackRequester>) -> Track {
    Track {
        title: pick.title,
        artist: pick.artist,
        search_term,
        stream: extraction.stream,
        web_url: extraction.web_url,
        thumbnail_url: extraction.thumbnail_url,
        requester
    }
}

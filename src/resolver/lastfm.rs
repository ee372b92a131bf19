use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode, Url};
use std::time::Duration;
use tracing::debug;
use super::MetadataSearch;
use crate::{
    error::{ResolutionError, ResolutionResult},
    model::{lastfm::{ApiError, TrackSearch}, SongPick}
};

pub const LASTFM_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// `track.search` against the Last.fm web API, keeping only the best match.
pub struct LastFmSearch {
    http: HttpClient,
    api_key: String,
    base_url: String
}

impl LastFmSearch {
    pub fn new(api_key: impl ToString) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| HttpClient::new());

        Self {
            http,
            api_key: api_key.to_string(),
            base_url: LASTFM_API_URL.to_string()
        }
    }

    pub fn set_base_url(&mut self, url: impl ToString) -> &mut Self {
        self.base_url = url.to_string();
        self
    }
}

#[async_trait]
impl MetadataSearch for LastFmSearch {
    async fn search(&self, text: &str) -> ResolutionResult<Option<SongPick>> {
        let url = Url::parse_with_params(&self.base_url, &[
            ("method", "track.search"),
            ("track", text),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
            ("limit", "1")
        ]).map_err(|e| ResolutionError::Service(e.to_string()))?;

        let response = self.http.get(url).send().await?;

        match response.status() {
            StatusCode::FORBIDDEN => return Err(ResolutionError::Forbidden),
            status if !status.is_success() => return Err(ResolutionError::Service(format!("Last.fm answered {}", status))),
            _ => ()
        }

        let body: serde_json::Value = response.json().await?;

        if let Ok(error) = serde_json::from_value::<ApiError>(body.clone()) {
            return Err(ResolutionError::Service(format!("Last.fm error {}: {}", error.error, error.message)));
        }

        let parsed: TrackSearch = serde_json::from_value(body)
            .map_err(|e| ResolutionError::Service(e.to_string()))?;

        debug!("Last.fm found {} results for {:?}", parsed.results.total_results, text);

        Ok(parsed.results.track_matches.track
            .into_iter()
            .next()
            .map(|best| SongPick::new(best.name, best.artist)))
    }
}

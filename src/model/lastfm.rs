use serde::{Serialize, Deserialize};
use serde_aux::prelude::*;

/// Body of a Last.fm `track.search` response.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TrackSearch {
    pub results: SearchResults
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SearchResults {
    #[serde(rename = "opensearch:totalResults", default)]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub total_results: u64,
    #[serde(rename = "trackmatches")]
    pub track_matches: TrackMatches
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TrackMatches {
    #[serde(default)]
    pub track: Vec<TrackMatch>
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TrackMatch {
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub listeners: u64,
    #[serde(default)]
    pub mbid: Option<String>
}

/// Last.fm reports failures as a 200 with this body.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ApiError {
    pub error: u32,
    pub message: String
}

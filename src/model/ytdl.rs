use serde::{Serialize, Deserialize};

/// Subset of the info dict yt-dlp prints with `--dump-json`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Info {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Direct media URL of the selected format.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub entries: Option<Vec<Info>>,
    #[serde(default)]
    pub requested_downloads: Option<Vec<RequestedDownload>>,
    #[serde(rename = "_filename", default)]
    pub filename: Option<String>
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RequestedDownload {
    #[serde(default)]
    pub filepath: Option<String>
}

impl Info {
    /// Playlists and searches wrap the real entry; only the first one is used.
    pub fn into_first_entry(self) -> Option<Info> {
        match self.entries {
            Some(entries) => entries.into_iter().next().and_then(Info::into_first_entry),
            None => Some(self)
        }
    }

    pub fn downloaded_path(&self) -> Option<&str> {
        self.requested_downloads
            .as_ref()
            .and_then(|d| d.iter().find_map(|d| d.filepath.as_deref()))
            .or(self.filename.as_deref())
    }
}

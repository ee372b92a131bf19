use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration
};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;
use super::{Extraction, StreamExtractor, TrackSearch};
use crate::{
    error::{ResolutionError, ResolutionResult},
    model::{ytdl::Info, StreamRef}
};

/// Runs the yt-dlp binary. With a download directory the audio is fetched to
/// a uniquely named local file, otherwise only the direct media URL is kept.
pub struct YtDlpExtractor {
    program: PathBuf,
    download_dir: Option<PathBuf>,
    timeout: Duration
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            download_dir: None,
            timeout: Duration::from_secs(60)
        }
    }
}

impl YtDlpExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_program(&mut self, program: impl Into<PathBuf>) -> &mut Self {
        self.program = program.into();
        self
    }

    pub fn set_download_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// The command plus, when downloading, the file name prefix of its output.
    fn command(&self, target: &TrackSearch) -> (Command, Option<String>) {
        let mut command = Command::new(&self.program);
        command
            .args(["--dump-json", "--no-playlist", "--no-warnings", "-f", "bestaudio/best"])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let prefix = self.download_dir.as_ref().map(|dir| {
            let prefix = Uuid::new_v4().to_string();
            command.arg("--no-simulate").arg("-o").arg(dir.join(format!("{}-%(id)s.%(ext)s", prefix)));
            prefix
        });

        command.arg(target.to_string());
        (command, prefix)
    }

    async fn run(&self, mut command: Command) -> ResolutionResult<Extraction> {
        // Dropping the output future on timeout kills the child.
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ResolutionError::Timeout)?
            .map_err(|e| ResolutionError::Service(format!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        parse_output(&String::from_utf8_lossy(&output.stdout), self.download_dir.as_deref())
    }
}

#[async_trait]
impl StreamExtractor for YtDlpExtractor {
    async fn extract(&self, target: &TrackSearch) -> ResolutionResult<Extraction> {
        let (command, prefix) = self.command(target);
        debug!("Running {:?}", command);

        let result = self.run(command).await;

        if let (Err(_), Some(dir), Some(prefix)) = (&result, &self.download_dir, &prefix) {
            remove_partial(dir, prefix).await;
        }

        result
    }
}

/// Deletes whatever a failed run left behind under `prefix`.
async fn remove_partial(dir: &Path, prefix: &str) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(why) => {
            warn!("Could not read download directory {}: {}", dir.display(), why);
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(prefix) {
            if let Err(why) = tokio::fs::remove_file(entry.path()).await {
                warn!("Could not remove partial download {}: {}", entry.path().display(), why);
            }
        }
    }
}

/// Maps yt-dlp's stderr onto the resolution error kinds.
pub fn classify_failure(stderr: &str) -> ResolutionError {
    let lower = stderr.to_lowercase();

    if lower.contains("http error 403") || lower.contains("forbidden") {
        ResolutionError::Forbidden
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ResolutionError::Timeout
    } else if lower.contains("video unavailable") || lower.contains("http error 404") || lower.contains("no video") || lower.contains("not found") {
        ResolutionError::NotFound
    } else {
        let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("yt-dlp failed");
        ResolutionError::Service(last.trim().to_string())
    }
}

/// Reads the first JSON document yt-dlp printed.
pub fn parse_output(stdout: &str, download_dir: Option<&Path>) -> ResolutionResult<Extraction> {
    let line = stdout
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or(ResolutionError::NotFound)?;

    let info: Info = serde_json::from_str(line).map_err(|e| ResolutionError::Service(e.to_string()))?;
    let info = info.into_first_entry().ok_or(ResolutionError::NotFound)?;

    let stream = match download_dir {
        Some(dir) => {
            let path = info.downloaded_path()
                .ok_or_else(|| ResolutionError::Service("yt-dlp did not report a downloaded file".to_string()))?;
            StreamRef::File(dir.join(path))
        },
        None => StreamRef::Remote(info.url.clone().ok_or(ResolutionError::NotFound)?)
    };

    let title = info.track.or(info.title).ok_or(ResolutionError::NotFound)?;

    Ok(Extraction {
        title,
        artist: info.artist.or(info.uploader),
        stream,
        web_url: info.webpage_url,
        thumbnail_url: info.thumbnail
    })
}

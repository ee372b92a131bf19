use std::{path::PathBuf, sync::Arc, time::Duration};
use crate::{
    error::{ConfigError, ConfigResult, PersistenceResult},
    events::{LogPresenter, Presenter},
    history::{HistoryStore, MemoryHistory, SqliteHistory},
    recommend::{llm::DEFAULT_MODEL, llm::OPENAI_API_URL, LlmClient, OpenAiClient, DEFAULT_CANDIDATE_LIMIT, DEFAULT_SEED_COUNT},
    registry::PlayerRegistry,
    resolver::{AudioResolver, LastFmSearch, YtDlpExtractor},
    voice::{Roster, VoiceDriver}
};

/// Knobs shared by every guild player.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    pub default_volume: f32,
    /// How far back counts as "recently played" for recommendations.
    pub recency_window: Duration,
    pub candidate_limit: u32,
    pub remove_downloads: bool
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            default_volume: 0.5,
            recency_window: Duration::from_secs(60 * 60),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            remove_downloads: true
        }
    }
}

pub struct RegistryBuilder {
    pub(crate) driver: Arc<dyn VoiceDriver>,
    pub(crate) resolver: Arc<AudioResolver>,
    pub(crate) history: Arc<dyn HistoryStore>,
    pub(crate) presenter: Arc<dyn Presenter>,
    pub(crate) roster: Option<Arc<dyn Roster>>,
    pub(crate) llm: Option<Arc<dyn LlmClient>>,
    pub(crate) seed_count: u32,
    pub(crate) config: PlayerConfig
}

impl RegistryBuilder {
    pub(crate) fn new(driver: Arc<dyn VoiceDriver>, resolver: AudioResolver) -> Self {
        Self {
            driver,
            resolver: Arc::new(resolver),
            history: Arc::new(MemoryHistory::new()),
            presenter: Arc::new(LogPresenter),
            roster: None,
            llm: None,
            seed_count: DEFAULT_SEED_COUNT,
            config: PlayerConfig::default()
        }
    }

    pub fn set_history(&mut self, history: Arc<dyn HistoryStore>) -> &mut Self {
        self.history = history;
        self
    }

    pub fn set_presenter(&mut self, presenter: Arc<dyn Presenter>) -> &mut Self {
        self.presenter = presenter;
        self
    }

    pub fn set_roster(&mut self, roster: Arc<dyn Roster>) -> &mut Self {
        self.roster = Some(roster);
        self
    }

    pub fn set_llm(&mut self, llm: Arc<dyn LlmClient>) -> &mut Self {
        self.llm = Some(llm);
        self
    }

    pub fn set_idle_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn set_default_volume(&mut self, volume: f32) -> &mut Self {
        self.config.default_volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn set_recency_window(&mut self, window: Duration) -> &mut Self {
        self.config.recency_window = window;
        self
    }

    pub fn set_candidate_limit(&mut self, limit: u32) -> &mut Self {
        self.config.candidate_limit = limit;
        self
    }

    pub fn set_seed_count(&mut self, seeds: u32) -> &mut Self {
        self.seed_count = seeds;
        self
    }

    pub fn set_remove_downloads(&mut self, remove: bool) -> &mut Self {
        self.config.remove_downloads = remove;
        self
    }

    pub fn build(self) -> PlayerRegistry {
        PlayerRegistry::new(self)
    }
}

/// Credentials and endpoints for the production collaborators, read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub lastfm_api_key: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub database_url: String,
    pub ytdlp_path: PathBuf,
    pub download_dir: Option<PathBuf>,
    pub resolve_attempts: u8
}

impl ServiceConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let lastfm_api_key = var("LASTFM_API_KEY").ok_or(ConfigError::MissingVar("LASTFM_API_KEY"))?;

        let resolve_attempts = match var("JUKEBOX_RESOLVE_ATTEMPTS") {
            Some(raw) => raw
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|attempts| *attempts > 0)
                .ok_or(ConfigError::InvalidVar("JUKEBOX_RESOLVE_ATTEMPTS", raw))?,
            None => 3
        };

        Ok(Self {
            lastfm_api_key,
            openai_api_key: var("OPENAI_API_KEY"),
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_API_URL.to_string()),
            database_url: var("JUKEBOX_DATABASE_URL").unwrap_or_else(|| "sqlite://jukebox.db".to_string()),
            ytdlp_path: var("YTDLP_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("yt-dlp")),
            download_dir: var("JUKEBOX_DOWNLOAD_DIR").map(PathBuf::from),
            resolve_attempts
        })
    }

    pub fn resolver(&self) -> AudioResolver {
        let mut extractor = YtDlpExtractor::new();
        extractor.set_program(&self.ytdlp_path);
        if let Some(dir) = &self.download_dir {
            extractor.set_download_dir(dir);
        }

        let mut resolver = AudioResolver::new(Arc::new(LastFmSearch::new(&self.lastfm_api_key)), Arc::new(extractor));
        resolver.set_retries(self.resolve_attempts, Duration::from_secs(1));
        resolver
    }

    /// `None` without an API key; DJ mode then relies on history alone.
    pub fn llm(&self) -> Option<Arc<dyn LlmClient>> {
        let key = self.openai_api_key.as_ref()?;

        let mut client = OpenAiClient::new(key);
        client.set_model(&self.openai_model).set_base_url(&self.openai_base_url);

        Some(Arc::new(client))
    }

    pub async fn history(&self) -> PersistenceResult<SqliteHistory> {
        SqliteHistory::connect(&self.database_url).await
    }
}

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client as HttpClient;
use std::time::Duration;
use crate::{
    error::{RecommendationError, RecommendationResult},
    model::{openai::{ChatMessage, ChatRequest, ChatResponse}, SongPick}
};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub const INSTRUCTION: &str = "You are a radio DJ picking the next song for a group of listeners. \
You will receive a JSON list of the songs that were played most recently. \
Recommend exactly one song that fits with them. Favor variety and do not pick an artist \
that already appears more than twice in the list. Never repeat a song from the list. \
Reply with a bare JSON object of the form {\"title\": \"...\", \"artist\": \"...\"} and nothing else.";

lazy_static! {
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*?\}").unwrap();
}

/// A single-turn chat completion.
#[async_trait]
pub trait LlmClient: Send + Sync + 'static {
    async fn complete(&self, system: &str, user: &str) -> RecommendationResult<String>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String
}

impl OpenAiClient {
    pub fn new(api_key: impl ToString) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| HttpClient::new());

        Self {
            http,
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_API_URL.to_string()
        }
    }

    pub fn set_model(&mut self, model: impl ToString) -> &mut Self {
        self.model = model.to_string();
        self
    }

    pub fn set_base_url(&mut self, url: impl ToString) -> &mut Self {
        self.base_url = url.to_string().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> RecommendationResult<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)]
        };

        let response: ChatResponse = self.http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RecommendationError::Service("empty completion".to_string()))
    }
}

/// Seeds as the JSON list the instruction refers to.
pub fn seed_prompt(seeds: &[SongPick]) -> String {
    serde_json::to_string(seeds).unwrap_or_else(|_| "[]".to_string())
}

/// Pulls the first `{...}` object out of the reply and requires both fields.
pub fn parse_reply(reply: &str) -> RecommendationResult<SongPick> {
    let malformed = || RecommendationError::Malformed(reply.to_string());

    let object = JSON_OBJECT.find(reply).ok_or_else(malformed)?;
    let pick: SongPick = serde_json::from_str(object.as_str()).map_err(|_| malformed())?;

    if !pick.is_well_formed() {
        return Err(malformed());
    }

    Ok(SongPick::new(pick.title.trim(), pick.artist.trim()))
}

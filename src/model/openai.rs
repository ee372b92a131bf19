use serde::{Serialize, Deserialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String
}

impl ChatMessage {
    pub fn system(content: impl ToString) -> Self {
        Self { role: "system".to_string(), content: content.to_string() }
    }

    pub fn user(content: impl ToString) -> Self {
        Self { role: "user".to_string(), content: content.to_string() }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Choice {
    pub message: ChatMessage
}

use rag_core::config::LlmConfig;
use rag_core::{ConversationMessage, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ConversationMessage> for ChatMessage {
    fn from(message: &ConversationMessage) -> Self {
        match message.role {
            Role::User => Self::user(message.content.clone()),
            Role::Assistant => Self::assistant(message.content.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub primary_model: String,
    pub fallback_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary_model: "anthropic.claude-3-5-sonnet-20241022-v2:0".to_string(),
            fallback_model: "anthropic.claude-3-5-sonnet-20240620-v1:0".to_string(),
            max_tokens: 4096,
            temperature: 0.1,
            timeout_secs: 60,
            max_retries: 1,
        }
    }
}

impl From<&LlmConfig> for ModelConfig {
    fn from(cfg: &LlmConfig) -> Self {
        let defaults = Self::default();
        Self {
            primary_model: cfg.primary.clone(),
            fallback_model: cfg.fallback.clone(),
            max_tokens: cfg.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: cfg.temperature.unwrap_or(defaults.temperature),
            ..defaults
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    ContentBlockStart,
    ContentBlockDelta { text: String },
    ContentBlockStop,
    MessageStart,
    MessageStop,
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_create_messages_with_roles() {
        assert_eq!(ChatMessage::system("rules").role, ChatRole::System);
        assert_eq!(ChatMessage::user("Hello").role, ChatRole::User);

        let msg = ChatMessage::assistant("Hi there");
        assert_eq!(msg.role, ChatRole::Assistant);
        assert_eq!(msg.content, "Hi there");
    }

    #[test]
    fn should_serialize_chat_message_in_openai_shape() {
        let json = serde_json::to_string(&ChatMessage::user("Hello")).unwrap();

        assert_eq!(json, r#"{"role":"user","content":"Hello"}"#);
    }

    #[test]
    fn should_convert_conversation_messages() {
        let user = ChatMessage::from(&ConversationMessage::user("question"));
        let assistant = ChatMessage::from(&ConversationMessage::assistant("answer"));

        assert_eq!(user, ChatMessage::user("question"));
        assert_eq!(assistant, ChatMessage::assistant("answer"));
    }

    #[test]
    fn should_create_default_model_config() {
        let config = ModelConfig::default();

        assert_ne!(config.primary_model, config.fallback_model);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn should_build_model_config_from_llm_settings() {
        let settings = LlmConfig {
            provider: "openai".to_string(),
            primary: "gpt-4o-mini".to_string(),
            fallback: "gpt-4o".to_string(),
            base_url: None,
            aws_region: None,
            temperature: Some(0.0),
            max_tokens: None,
        };

        let config = ModelConfig::from(&settings);

        assert_eq!(config.primary_model, "gpt-4o-mini");
        assert_eq!(config.fallback_model, "gpt-4o");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_tokens, 4096);
    }
}

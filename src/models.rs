use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub const MAX_CONTENT_CHARS: usize = 5000;
pub const MAX_MESSAGES: usize = 10;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

// Generation request: a single prompt or a short conversation
#[derive(Deserialize, Clone, Debug, Default)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
}

impl GenerateRequest {
    // Validated conversation to forward upstream. `messages` wins over `prompt`.
    pub fn into_messages(self) -> Result<Vec<Message>, GatewayError> {
        if let Some(messages) = self.messages {
            if messages.is_empty() || messages.len() > MAX_MESSAGES {
                return Err(GatewayError::Validation(format!(
                    "Between 1 and {MAX_MESSAGES} messages are required"
                )));
            }
            for msg in &messages {
                if msg.content.trim().is_empty() {
                    return Err(GatewayError::Validation("Message content is empty".to_string()));
                }
                if msg.content.chars().count() > MAX_CONTENT_CHARS {
                    return Err(GatewayError::Validation(format!(
                        "Message too long (maximum {MAX_CONTENT_CHARS} characters)"
                    )));
                }
            }
            return Ok(messages);
        }

        match self.prompt {
            Some(prompt) if prompt.trim().is_empty() => {
                Err(GatewayError::Validation("Prompt is empty".to_string()))
            }
            Some(prompt) if prompt.chars().count() > MAX_CONTENT_CHARS => Err(
                GatewayError::Validation(format!(
                    "Prompt too long (maximum {MAX_CONTENT_CHARS} characters)"
                )),
            ),
            Some(prompt) => Ok(vec![Message {
                role: Role::User,
                content: prompt.trim().to_string(),
            }]),
            None => Err(GatewayError::Validation(
                "A prompt or messages are required".to_string(),
            )),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GenerateResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct VerifyCodeRequest {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeResponse {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium_token: Option<String>,
}

impl VerifyCodeResponse {
    pub fn invalid(message: &str) -> Self {
        Self {
            valid: false,
            message: message.to_string(),
            premium_token: None,
        }
    }
}

// Generation service wire format
#[derive(Serialize, Debug)]
pub struct UpstreamRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub messages: &'a [Message],
}

#[derive(Deserialize, Debug)]
pub struct UpstreamResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Deserialize, Debug)]
pub struct ContentBlock {
    #[serde(default)]
    pub text: Option<String>,
}

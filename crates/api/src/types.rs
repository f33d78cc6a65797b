use serde::{Deserialize, Serialize};

/// Upper bound the composer enforces on outgoing message text.
pub const MAX_MESSAGE_CHARS: usize = 300;

pub const MIN_TOP_K: u8 = 1;
pub const MAX_TOP_K: u8 = 30;
pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 2.0;

/// One retrieval-chat request as the backend accepts it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl ChatRequest {
    /// Builds a request from raw composer text, trimmed and length-capped.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let trimmed = message.trim();
        let capped_end = trimmed
            .char_indices()
            .nth(MAX_MESSAGE_CHARS)
            .map(|(offset, _)| offset)
            .unwrap_or(trimmed.len());

        Self {
            message: trimmed[..capped_end].to_string(),
            top_k: None,
            temperature: None,
            system_prompt: None,
        }
    }

    pub fn with_top_k(mut self, top_k: u8) -> Self {
        self.top_k = Some(top_k.clamp(MIN_TOP_K, MAX_TOP_K));
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE));
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Token accounting reported by the backend, all counts optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Complete answer for one chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
    pub usage: Option<Usage>,
}

/// Backend liveness report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub environment: String,
    pub database: String,
    pub pgvector: String,
}

/// Error body shape the backend uses for non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_trims_and_caps_message_text() {
        let request = ChatRequest::new(format!("  {}  ", "a".repeat(400)));
        assert_eq!(request.message.chars().count(), MAX_MESSAGE_CHARS);

        let request = ChatRequest::new("  what happens next?  ");
        assert_eq!(request.message, "what happens next?");
    }

    #[test]
    fn request_cap_respects_multibyte_boundaries() {
        let request = ChatRequest::new("ß".repeat(350));
        assert_eq!(request.message.chars().count(), MAX_MESSAGE_CHARS);
        assert!(request.message.chars().all(|character| character == 'ß'));
    }

    #[test]
    fn request_clamps_retrieval_options() {
        let request = ChatRequest::new("question")
            .with_top_k(120)
            .with_temperature(9.5);
        assert_eq!(request.top_k, Some(MAX_TOP_K));
        assert_eq!(request.temperature, Some(MAX_TEMPERATURE));

        let request = ChatRequest::new("question")
            .with_top_k(0)
            .with_temperature(-1.0);
        assert_eq!(request.top_k, Some(MIN_TOP_K));
        assert_eq!(request.temperature, Some(MIN_TEMPERATURE));
    }

    #[test]
    fn request_omits_unset_optional_fields() {
        let json = serde_json::to_string(&ChatRequest::new("question")).expect("serialize request");
        assert_eq!(json, r#"{"message":"question"}"#);
    }

    #[test]
    fn response_decodes_backend_wire_shape() {
        let payload = r#"{
            "response": "You fight bandits.",
            "model": "gpt-x",
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        }"#;

        let response: ChatResponse = serde_json::from_str(payload).expect("decode response");
        assert_eq!(response.response, "You fight bandits.");
        assert_eq!(response.model, "gpt-x");
        assert_eq!(
            response.usage,
            Some(Usage {
                prompt_tokens: Some(12),
                completion_tokens: Some(5),
                total_tokens: Some(17),
            })
        );
    }

    #[test]
    fn response_tolerates_null_usage_and_counts() {
        let payload = r#"{"response": "ok", "model": "gpt-x", "usage": null}"#;
        let response: ChatResponse = serde_json::from_str(payload).expect("decode response");
        assert_eq!(response.usage, None);

        let payload = r#"{
            "response": "ok",
            "model": "gpt-x",
            "usage": {"prompt_tokens": null, "completion_tokens": null, "total_tokens": null}
        }"#;
        let response: ChatResponse = serde_json::from_str(payload).expect("decode response");
        let usage = response.usage.expect("usage present");
        assert_eq!(usage.prompt_tokens, None);
        assert_eq!(usage.total_tokens, None);
    }

    #[test]
    fn health_decodes_backend_wire_shape() {
        let payload = r#"{
            "status": "ok",
            "environment": "production",
            "database": "up",
            "pgvector": "up"
        }"#;

        let health: HealthResponse = serde_json::from_str(payload).expect("decode health");
        assert_eq!(health.status, "ok");
        assert_eq!(health.pgvector, "up");
    }
}

pub use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use snafu::ResultExt;

use crate::error::{ApiResult, ConnectSnafu, DecodeSnafu, StatusSnafu};
use crate::types::{ChatRequest, ChatResponse, ErrorBody, HealthResponse};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Dispatch seam the conversation controller consumes.
///
/// Object-safe so controllers can hold `Arc<dyn ChatBackend>`; the returned
/// future is `'static` because the controller spawns it onto the runtime.
pub trait ChatBackend: Send + Sync {
    fn chat(&self, request: ChatRequest) -> BoxFuture<'static, ApiResult<ChatResponse>>;
}

/// HTTP client for the retrieval-chat backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `/chat/rag`: one question in, one complete answer out.
    pub async fn chat_rag(&self, request: &ChatRequest) -> ApiResult<ChatResponse> {
        let response = self
            .http
            .post(format!("{}/chat/rag", self.base_url))
            .json(request)
            .send()
            .await
            .context(ConnectSnafu {
                stage: "send-chat-request",
            })?;

        Self::decode(response).await
    }

    /// GET `/health`: backend liveness probe.
    pub async fn health(&self) -> ApiResult<HealthResponse> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .context(ConnectSnafu {
                stage: "send-health-request",
            })?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
        let status = response.status();

        if !status.is_success() {
            // The backend reports failures as `{"detail": ...}`; fall back to
            // the status reason when the body is absent or unparseable.
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .map(|body| body.detail)
                .filter(|detail| !detail.trim().is_empty())
                .or_else(|| status.canonical_reason().map(str::to_string));

            tracing::warn!(status = status.as_u16(), detail = ?detail, "backend reported failure");
            return StatusSnafu {
                stage: "check-status",
                status: status.as_u16(),
                detail,
            }
            .fail();
        }

        response.json::<T>().await.context(DecodeSnafu {
            stage: "decode-response-body",
        })
    }
}

impl ChatBackend for ApiClient {
    fn chat(&self, request: ChatRequest) -> BoxFuture<'static, ApiResult<ChatResponse>> {
        let client = self.clone();
        Box::pin(async move { client.chat_rag(&request).await })
    }
}

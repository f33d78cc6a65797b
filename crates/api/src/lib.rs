pub mod client;
pub mod error;
pub mod types;

pub use client::{ApiClient, BoxFuture, ChatBackend, DEFAULT_BASE_URL};
pub use error::{ApiError, ApiResult};
pub use types::{ChatRequest, ChatResponse, HealthResponse, MAX_MESSAGE_CHARS, Usage};

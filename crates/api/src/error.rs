use snafu::Snafu;

/// Failures surfaced at the backend boundary.
///
/// `Status` carries a server-reported HTTP status; `Connect` means the request
/// never produced a response (surfaced as status 0 so callers can tell the two
/// apart); `Decode` covers a response body that did not match the wire shape.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("backend request failed with status {status}"))]
    Status {
        stage: &'static str,
        status: u16,
        detail: Option<String>,
    },
    #[snafu(display("failed to connect to the backend: {source}"))]
    Connect {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to decode backend response: {source}"))]
    Decode {
        stage: &'static str,
        source: reqwest::Error,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// HTTP-like status code; 0 when no response was received at all.
    pub fn status(&self) -> u16 {
        match self {
            Self::Status { status, .. } => *status,
            Self::Connect { .. } | Self::Decode { .. } => 0,
        }
    }

    /// Server-provided failure detail, when one was reported.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } => detail.as_deref(),
            Self::Connect { .. } | Self::Decode { .. } => None,
        }
    }

    /// Whether a user-triggered retry has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: u16, detail: Option<&str>) -> ApiError {
        StatusSnafu {
            stage: "check-status",
            status,
            detail: detail.map(str::to_string),
        }
        .build()
    }

    #[test]
    fn status_and_detail_are_exposed_for_server_errors() {
        let error = status_error(500, Some("internal error"));
        assert_eq!(error.status(), 500);
        assert_eq!(error.detail(), Some("internal error"));
        assert_eq!(
            error.to_string(),
            "backend request failed with status 500"
        );
    }

    #[test]
    fn retryability_follows_failure_class() {
        assert!(status_error(500, None).is_retryable());
        assert!(status_error(429, None).is_retryable());
        assert!(!status_error(404, None).is_retryable());
        assert!(!status_error(400, Some("bad request")).is_retryable());
    }
}

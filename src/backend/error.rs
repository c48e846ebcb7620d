use reqwest::StatusCode;

/// A backend call reached the server but did not produce the expected result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The server answered with an unexpected status. After exhausted retries
    /// this is also how a lingering 502 surfaces.
    Status {
        action: &'static str,
        status: StatusCode,
        body: String,
    },
    /// Success status, but the body was empty or not the expected JSON.
    InvalidResponse { action: &'static str, reason: String },
}

impl BackendError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            BackendError::InvalidResponse { .. } => None,
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Status {
                action,
                status,
                body,
            } => {
                if body.trim().is_empty() {
                    write!(f, "Failed to {}: HTTP {}", action, status.as_u16())
                } else {
                    write!(
                        f,
                        "Failed to {}: HTTP {}: {}",
                        action,
                        status.as_u16(),
                        excerpt(body)
                    )
                }
            }
            BackendError::InvalidResponse { action, reason } => {
                write!(f, "Failed to {}: invalid response from server ({})", action, reason)
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// Characters of a response body kept in error messages.
const BODY_EXCERPT_CHARS: usize = 200;

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

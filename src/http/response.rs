use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::retry::is_transient;

/// A fully-read HTTP response. Any status code is a valid response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: StatusCode,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns the HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// True when the retrying client would have retried this response.
    pub fn is_transient(&self) -> bool {
        is_transient(self.status)
    }

    /// Returns the raw response body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// True when the body is empty or only whitespace.
    pub fn is_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).with_context(|| {
            format!(
                "Failed to parse JSON response (HTTP {})",
                self.status.as_u16()
            )
        })
    }
}

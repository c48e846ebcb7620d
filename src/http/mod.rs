//! HTTP client module with retry logic and error handling.

mod client;
mod request;
mod response;
mod retry;
mod transport;

pub use client::HttpClient;
pub use request::{FileUpload, Payload, RequestSpec};
pub use response::Response;
pub use retry::{
    ExhaustionPolicy, MAX_RETRIES, RETRY_DELAY_MS, RetriesExhausted, RetryPolicy, is_transient,
};
pub use transport::{ReqwestTransport, Sleeper, TokioSleeper, Transport, TransportError};

#[cfg(test)]
pub use transport::{MockSleeper, MockTransport};

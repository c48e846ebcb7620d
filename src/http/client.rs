//! HTTP client with built-in retry on transient gateway failures.

use anyhow::{Result, anyhow};
use log::{debug, warn};
use reqwest::Client;

use super::request::RequestSpec;
use super::response::Response;
use super::retry::{ExhaustionPolicy, RetriesExhausted, RetryPolicy};
use super::transport::{ReqwestTransport, Sleeper, TokioSleeper, Transport};

/// Sends requests through a [`Transport`], retrying 502 responses and
/// transport failures according to a [`RetryPolicy`].
#[derive(Clone)]
pub struct HttpClient<T: Transport = ReqwestTransport, S: Sleeper = TokioSleeper> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
}

impl HttpClient {
    /// Creates a client over the given reqwest Client with the default policy.
    pub fn new(client: Client) -> Self {
        Self::with_parts(ReqwestTransport::new(client), TokioSleeper, RetryPolicy::default())
    }
}

impl<T: Transport, S: Sleeper> HttpClient<T, S> {
    /// Creates a client from an explicit transport, sleeper and policy.
    pub fn with_parts(transport: T, sleeper: S, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    /// Replaces the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the active retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends `request`, retrying on 502 and on transport failures.
    ///
    /// Returns the first non-502 response, whatever its status. When every
    /// attempt gets a 502 the outcome depends on
    /// [`RetryPolicy::on_exhausted`]: either the last 502 response is
    /// returned or a [`RetriesExhausted`] error is raised. A transport failure
    /// on the final attempt is returned as a
    /// [`TransportError`](super::TransportError).
    ///
    /// Every verb is retried the same way. A POST whose connection dropped
    /// after the backend acted on it will be sent again.
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn send(&self, request: &RequestSpec) -> Result<Response> {
        let max_retries = self.policy.attempts();
        let delay = self.policy.retry_delay;
        let mut last_response = None;

        for attempt in 1..=max_retries {
            match self.transport.send(request).await {
                Ok(response) if !response.is_transient() => {
                    debug!(
                        "{} {}: HTTP {} on attempt {}/{}",
                        request.method,
                        request.url,
                        response.status().as_u16(),
                        attempt,
                        max_retries
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    if attempt < max_retries {
                        warn!(
                            "Server returned {} for {}. Retrying in {}ms... (Attempt {}/{})",
                            response.status(),
                            request.url,
                            delay.as_millis(),
                            attempt,
                            max_retries
                        );
                        self.sleeper.sleep(delay).await;
                    }
                    last_response = Some(response);
                }
                Err(e) => {
                    if attempt < max_retries {
                        warn!(
                            "{} for {}. Retrying in {}ms... (Attempt {}/{})",
                            e,
                            request.url,
                            delay.as_millis(),
                            attempt,
                            max_retries
                        );
                        self.sleeper.sleep(delay).await;
                    } else {
                        debug!("{}: giving up after {} attempts", request.url, attempt);
                        return Err(anyhow::Error::from(e));
                    }
                }
            }
        }

        let response = last_response
            .ok_or_else(|| anyhow!("{}: no attempt was made", request.url))?;

        match self.policy.on_exhausted {
            ExhaustionPolicy::ReturnLast => {
                warn!(
                    "{}: still HTTP {} after {} attempts, returning last response",
                    request.url,
                    response.status().as_u16(),
                    max_retries
                );
                Ok(response)
            }
            ExhaustionPolicy::Fail => Err(anyhow::Error::from(RetriesExhausted {
                attempts: max_retries,
                status: response.status(),
                url: request.url.clone(),
            })),
        }
    }
}

use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use std::time::Duration;

use crate::{
    backend::{Backend, RagBackend},
    http::{ExhaustionPolicy, HttpClient, RetryPolicy},
    runtime::Runtime,
    session::{SessionContext, SessionError},
};

/// Connection and retry settings gathered from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    pub server_url: Option<String>,
    pub user_id: Option<String>,
    pub chatbot_id: Option<String>,
    pub kb_id: Option<String>,
    pub max_retries: usize,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub fail_on_exhausted: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            server_url: None,
            user_id: None,
            chatbot_id: None,
            kb_id: None,
            max_retries: policy.max_retries,
            retry_delay: policy.retry_delay,
            timeout: Duration::from_secs(60),
            fail_on_exhausted: false,
        }
    }
}

impl ConnectionOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        let on_exhausted = if self.fail_on_exhausted {
            ExhaustionPolicy::Fail
        } else {
            ExhaustionPolicy::ReturnLast
        };
        RetryPolicy::new(self.max_retries, self.retry_delay).with_exhaustion(on_exhausted)
    }

    pub fn session(&self) -> Result<SessionContext> {
        let url = self
            .server_url
            .as_deref()
            .ok_or(SessionError::MissingServerUrl)?;
        Ok(SessionContext::new(url)?.with_ids(
            self.user_id.clone(),
            self.chatbot_id.clone(),
            self.kb_id.clone(),
        ))
    }
}

pub struct Config<R: Runtime, B: RagBackend> {
    pub runtime: R,
    pub backend: B,
    pub session: SessionContext,
}

impl<R: Runtime> Config<R, Backend> {
    pub fn new(runtime: R, options: &ConnectionOptions) -> Result<Self> {
        let session = options.session()?;
        let policy = options.retry_policy();

        debug!(
            "Using server {} (max retries {}, delay {:?}, timeout {:?}, on exhaustion {:?})",
            session.server_url(),
            policy.max_retries,
            policy.retry_delay,
            options.timeout,
            policy.on_exhausted
        );

        let client = Client::builder()
            .user_agent(concat!("ragctl/", env!("RAGCTL_VERSION")))
            .timeout(options.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let http = HttpClient::new(client).with_policy(policy);
        let backend = Backend::new(session.server_url(), http);

        Ok(Self {
            runtime,
            backend,
            session,
        })
    }
}

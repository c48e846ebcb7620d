//! Single-attempt transports and the sleep seam used between attempts.

use async_trait::async_trait;
use log::debug;
use reqwest::{
    Client, RequestBuilder,
    multipart::{Form, Part},
};
use std::error::Error as StdError;
use std::time::Duration;

use super::request::{Payload, RequestSpec};
use super::response::Response;

/// A failure raised before a complete response was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// DNS failure, refused or reset connection.
    Connect(String),
    /// The transport's own connect/read timeout fired.
    Timeout(String),
    /// The connection dropped while the body was being read.
    Body(String),
    /// Anything else raised while building or sending the request.
    Request(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connect(msg) => write!(f, "Connection error: {}", msg),
            TransportError::Timeout(msg) => write!(f, "Request timed out: {}", msg),
            TransportError::Body(msg) => write!(f, "Failed to read response body: {}", msg),
            TransportError::Request(msg) => write!(f, "Request failed: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let msg = describe(&error);
        if error.is_timeout() {
            TransportError::Timeout(msg)
        } else if error.is_connect() {
            TransportError::Connect(msg)
        } else if error.is_body() || error.is_decode() {
            TransportError::Body(msg)
        } else {
            TransportError::Request(msg)
        }
    }
}

/// reqwest's top-level message hides the interesting part in the source chain.
fn describe(error: &dyn StdError) -> String {
    let mut msg = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

/// Performs exactly one attempt of a request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestSpec) -> Result<Response, TransportError>;
}

/// Transport backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps an already configured reqwest client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn build(&self, request: &RequestSpec) -> Result<RequestBuilder, TransportError> {
        let builder = self.client.request(request.method.clone(), &request.url);

        let builder = match &request.payload {
            Payload::Empty => builder,
            Payload::Query(pairs) => builder.query(pairs),
            Payload::Form(pairs) => builder.form(pairs),
            Payload::Json(body) => builder.json(body),
            Payload::File(upload) => {
                let mut part =
                    Part::bytes(upload.contents.clone()).file_name(upload.file_name.clone());
                if let Some(mime) = &upload.mime {
                    part = part.mime_str(mime)?;
                }
                builder.multipart(Form::new().part(upload.field.clone(), part))
            }
        };

        Ok(builder)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestSpec) -> Result<Response, TransportError> {
        debug!(
            "{} {} ({} payload)",
            request.method,
            request.url,
            request.payload.kind()
        );

        let response = self.build(request)?.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!("{} {} -> {}", request.method, request.url, status);
        Ok(Response::new(status, body.to_vec()))
    }
}

/// Pause between attempts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::FileUpload;
    use mockito::Matcher;
    use reqwest::StatusCode;

    #[tokio::test]
    async fn test_send_form_payload() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/users")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::UrlEncoded("name".into(), "alice".into()))
            .with_status(200)
            .with_body(r#"{"id": 1}"#)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let request = RequestSpec::post(format!("{}/users", url)).form([("name", "alice")]);
        let response = transport.send(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text(), r#"{"id": 1}"#);
    }

    #[tokio::test]
    async fn test_send_query_payload() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "what is rag?".into()),
                Matcher::UrlEncoded("keywords".into(), "retrieval".into()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let request = RequestSpec::post(format!("{}/query", url))
            .query([("query", "what is rag?"), ("keywords", "retrieval")]);
        transport.send(&request).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_json_payload() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/set-parameters")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({"k": 5})))
            .with_status(200)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let request = RequestSpec::post(format!("{}/set-parameters", url))
            .json(serde_json::json!({"k": 5}));
        transport.send(&request).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_file_payload() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/knowledge-bases/kb1/documents")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="file"; filename="notes.txt""#.to_string()),
                Matcher::Regex("hello world".to_string()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let upload = FileUpload::new("notes.txt", b"hello world".to_vec()).with_mime("text/plain");
        let request =
            RequestSpec::post(format!("{}/knowledge-bases/kb1/documents", url)).file(upload);
        transport.send(&request).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _m = server
            .mock("GET", "/conversation-history")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let response = transport
            .send(&RequestSpec::get(format!("{}/conversation-history", url)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.text(), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_error() {
        // Grab a free port, then close it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::new(Client::new());
        let err = transport
            .send(&RequestSpec::get(format!("http://{}/users", addr)))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Connect(_)), "got {:?}", err);
    }

    #[test]
    fn test_transport_error_display() {
        assert!(
            TransportError::Connect("refused".into())
                .to_string()
                .contains("Connection error")
        );
        assert!(
            TransportError::Timeout("30s".into())
                .to_string()
                .contains("timed out")
        );
        assert!(
            TransportError::Body("reset".into())
                .to_string()
                .contains("response body")
        );
        assert!(
            TransportError::Request("bad mime".into())
                .to_string()
                .contains("bad mime")
        );
    }

    #[tokio::test]
    async fn test_tokio_sleeper_zero_delay() {
        TokioSleeper.sleep(Duration::ZERO).await;
    }
}

//! Typed access to the RAG backend.
//!
//! Every operation goes through [`HttpClient`], so each one gets the same
//! 502/connection retry behaviour regardless of verb or side effects.

mod error;
mod types;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::debug;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::http::{
    FileUpload, HttpClient, ReqwestTransport, RequestSpec, Response, Sleeper, TokioSleeper,
    Transport,
};

pub use error::BackendError;
pub use types::{
    ChatbotSettings, Chunk, Created, HistoryEntry, Keywords, QueryAnswer, QueryOutcome,
    QueryRequest, RetrievalParameters, SourceDocument, Timestamp,
};

use types::{AcceptedBody, HistoryBody};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RagBackend: Send + Sync {
    async fn create_user(&self, name: &str) -> Result<Created>;
    async fn create_chatbot(&self, user_id: &str, name: &str, description: &str)
    -> Result<Created>;
    async fn configure_chatbot(&self, chatbot_id: &str, settings: &ChatbotSettings) -> Result<()>;
    async fn create_knowledge_base(
        &self,
        chatbot_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Created>;
    async fn upload_document(&self, kb_id: &str, upload: &FileUpload) -> Result<()>;
    async fn query(&self, request: &QueryRequest) -> Result<QueryOutcome>;
    async fn set_parameters(&self, params: &RetrievalParameters) -> Result<()>;
    async fn conversation_history(&self) -> Result<Vec<HistoryEntry>>;
}

/// [`RagBackend`] over HTTP.
pub struct Backend<T: Transport = ReqwestTransport, S: Sleeper = TokioSleeper> {
    base_url: String,
    http: HttpClient<T, S>,
}

impl<T: Transport, S: Sleeper> Backend<T, S> {
    /// Creates a backend rooted at `base_url`, sending through `http`.
    pub fn new(base_url: impl Into<String>, http: HttpClient<T, S>) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    /// Returns the server URL every endpoint is joined onto.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the retrying client used for every call.
    pub fn http(&self) -> &HttpClient<T, S> {
        &self.http
    }

    /// Joins path segments onto the base URL, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid server URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Server URL cannot be used as a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.to_string())
    }

    /// Sends the request and fails unless the status is one of `accepted`.
    async fn send_expecting(
        &self,
        action: &'static str,
        request: RequestSpec,
        accepted: &[StatusCode],
    ) -> Result<Response> {
        let response = self.http.send(&request).await?;

        if !accepted.contains(&response.status()) {
            return Err(BackendError::Status {
                action,
                status: response.status(),
                body: response.text(),
            }
            .into());
        }

        Ok(response)
    }

    async fn send_ok(&self, action: &'static str, request: RequestSpec) -> Result<Response> {
        self.send_expecting(action, request, &[StatusCode::OK]).await
    }
}

fn parse_body<T: DeserializeOwned>(action: &'static str, response: &Response) -> Result<T> {
    if response.is_empty() {
        return Err(BackendError::InvalidResponse {
            action,
            reason: "empty body".to_string(),
        }
        .into());
    }

    serde_json::from_slice(response.body()).map_err(|e| {
        BackendError::InvalidResponse {
            action,
            reason: e.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl<T: Transport, S: Sleeper> RagBackend for Backend<T, S> {
    #[tracing::instrument(skip(self))]
    async fn create_user(&self, name: &str) -> Result<Created> {
        let request = RequestSpec::post(self.endpoint(&["users"])?).form([("name", name)]);
        let response = self.send_ok("create user", request).await?;
        let created: Created = parse_body("create user", &response)?;
        debug!("Created user {}", created.id);
        Ok(created)
    }

    #[tracing::instrument(skip(self, description))]
    async fn create_chatbot(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Created> {
        let request = RequestSpec::post(self.endpoint(&["chatbots"])?).form([
            ("user_id", user_id),
            ("name", name),
            ("description", description),
        ]);
        let response = self.send_ok("create chatbot", request).await?;
        let created: Created = parse_body("create chatbot", &response)?;
        debug!("Created chatbot {} for user {}", created.id, user_id);
        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    async fn configure_chatbot(&self, chatbot_id: &str, settings: &ChatbotSettings) -> Result<()> {
        settings.validate()?;
        let request = RequestSpec::post(self.endpoint(&["chatbots", chatbot_id, "configure"])?)
            .form(settings.to_form());
        self.send_ok("update settings", request).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, description))]
    async fn create_knowledge_base(
        &self,
        chatbot_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Created> {
        let request = RequestSpec::post(self.endpoint(&["knowledge-bases"])?).form([
            ("chatbot_id", chatbot_id),
            ("name", name),
            ("description", description),
        ]);
        let response = self.send_ok("create knowledge base", request).await?;
        let created: Created = parse_body("create knowledge base", &response)?;
        debug!("Created knowledge base {} for chatbot {}", created.id, chatbot_id);
        Ok(created)
    }

    #[tracing::instrument(skip(self, upload), fields(file = %upload.file_name))]
    async fn upload_document(&self, kb_id: &str, upload: &FileUpload) -> Result<()> {
        let request =
            RequestSpec::post(self.endpoint(&["knowledge-bases", kb_id, "documents"])?)
                .file(upload.clone());
        self.send_ok("upload document", request).await?;
        debug!(
            "Uploaded {} ({} bytes) to knowledge base {}",
            upload.file_name,
            upload.contents.len(),
            kb_id
        );
        Ok(())
    }

    #[tracing::instrument(skip(self, request))]
    async fn query(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let url = self.endpoint(&["query"])?;
        let spec = if request.chatbot_id.is_some() {
            RequestSpec::post(url).form(request.fields())
        } else {
            RequestSpec::post(url).query(request.fields())
        };

        let response = self
            .send_expecting("query", spec, &[StatusCode::OK, StatusCode::ACCEPTED])
            .await?;

        if response.status() == StatusCode::ACCEPTED {
            let task_id = if response.is_empty() {
                None
            } else {
                response.json::<AcceptedBody>().ok().and_then(|b| b.task_id)
            };
            debug!("Query accepted for background processing: {:?}", task_id);
            return Ok(QueryOutcome::Accepted { task_id });
        }

        Ok(QueryOutcome::Answered(parse_body("query", &response)?))
    }

    #[tracing::instrument(skip(self))]
    async fn set_parameters(&self, params: &RetrievalParameters) -> Result<()> {
        params.validate()?;
        let body = serde_json::to_value(params).context("Failed to encode parameters")?;
        let request = RequestSpec::post(self.endpoint(&["set-parameters"])?).json(body);
        self.send_ok("set parameters", request).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn conversation_history(&self) -> Result<Vec<HistoryEntry>> {
        let request = RequestSpec::get(self.endpoint(&["conversation-history"])?);
        let response = self.send_ok("fetch conversation history", request).await?;
        let body: HistoryBody = parse_body("fetch conversation history", &response)?;
        Ok(body.conversation_history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ExhaustionPolicy, RetriesExhausted, RetryPolicy, TransportError};
    use mockito::{Matcher, Server};
    use reqwest::Client;
    use std::time::Duration;

    fn backend(url: &str) -> Backend {
        let http = HttpClient::new(Client::new()).with_policy(RetryPolicy::new(3, Duration::ZERO));
        Backend::new(url, http)
    }

    #[test]
    fn test_endpoint_joins_and_encodes_segments() {
        let b = backend("http://localhost:8000/");
        assert_eq!(b.endpoint(&["users"]).unwrap(), "http://localhost:8000/users");
        assert_eq!(
            b.endpoint(&["chatbots", "a b", "configure"]).unwrap(),
            "http://localhost:8000/chatbots/a%20b/configure"
        );

        let b = backend("https://tunnel.example.com/api");
        assert_eq!(
            b.endpoint(&["query"]).unwrap(),
            "https://tunnel.example.com/api/query"
        );
    }

    #[test]
    fn test_endpoint_rejects_invalid_base() {
        assert!(backend("not a url").endpoint(&["users"]).is_err());
    }

    #[tokio::test]
    async fn test_create_user() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/users")
            .match_body(Matcher::UrlEncoded("name".into(), "alice".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 12}"#)
            .create_async()
            .await;

        let created = backend(&server.url()).create_user("alice").await.unwrap();

        mock.assert_async().await;
        assert_eq!(created.id, "12");
    }

    #[tokio::test]
    async fn test_create_user_failure_carries_body() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/users")
            .with_status(409)
            .with_body("user exists")
            .create_async()
            .await;

        let err = backend(&server.url()).create_user("alice").await.unwrap_err();
        let backend_err = err.downcast_ref::<BackendError>().unwrap();

        assert_eq!(backend_err.status(), Some(StatusCode::CONFLICT));
        assert!(err.to_string().contains("user exists"));
    }

    #[tokio::test]
    async fn test_create_user_empty_body_is_invalid() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/users")
            .with_status(200)
            .create_async()
            .await;

        let err = backend(&server.url()).create_user("alice").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackendError>(),
            Some(BackendError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_chatbot() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chatbots")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user_id".into(), "12".into()),
                Matcher::UrlEncoded("name".into(), "helper".into()),
                Matcher::UrlEncoded("description".into(), "docs bot".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"id": "bot-1"}"#)
            .create_async()
            .await;

        let created = backend(&server.url())
            .create_chatbot("12", "helper", "docs bot")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(created.id, "bot-1");
    }

    #[tokio::test]
    async fn test_configure_chatbot() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chatbots/bot-1/configure")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("temperature".into(), "0.7".into()),
                Matcher::UrlEncoded("max_tokens".into(), "1000".into()),
                Matcher::UrlEncoded("k".into(), "5".into()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let settings = ChatbotSettings {
            temperature: 0.7,
            max_tokens: 1000,
            k: 5,
        };
        backend(&server.url())
            .configure_chatbot("bot-1", &settings)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_configure_chatbot_invalid_settings_never_sent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let settings = ChatbotSettings {
            temperature: 3.0,
            ..ChatbotSettings::default()
        };
        let result = backend(&server.url()).configure_chatbot("bot-1", &settings).await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_knowledge_base() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/knowledge-bases")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("chatbot_id".into(), "bot-1".into()),
                Matcher::UrlEncoded("name".into(), "manuals".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"id": 3}"#)
            .create_async()
            .await;

        let created = backend(&server.url())
            .create_knowledge_base("bot-1", "manuals", "")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(created.id, "3");
    }

    #[tokio::test]
    async fn test_upload_document() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/knowledge-bases/3/documents")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data".to_string()),
            )
            .match_body(Matcher::Regex("filename=\"faq.txt\"".to_string()))
            .with_status(200)
            .create_async()
            .await;

        let upload = FileUpload::new("faq.txt", b"Q: why? A: because".to_vec());
        backend(&server.url()).upload_document("3", &upload).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_with_chatbot_sends_form() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/query")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "what is rag?".into()),
                Matcher::UrlEncoded("chatbot_id".into(), "bot-1".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"answer": "Retrieval augmented generation",
                    "documents": [{"name": "intro.pdf", "preview": "RAG is..."}]}"#,
            )
            .create_async()
            .await;

        let outcome = backend(&server.url())
            .query(&QueryRequest::new("what is rag?").for_chatbot("bot-1"))
            .await
            .unwrap();

        mock.assert_async().await;
        match outcome {
            QueryOutcome::Answered(answer) => {
                assert_eq!(answer.answer.as_deref(), Some("Retrieval augmented generation"));
                assert_eq!(answer.documents[0].name, "intro.pdf");
            }
            other => panic!("Expected an answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_without_chatbot_sends_query_params() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "hello".into()),
                Matcher::UrlEncoded("keywords".into(), "greeting".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"answer": "hi", "chunks": [{"source": "a.txt", "score": 0.5, "content": "hi there"}]}"#,
            )
            .create_async()
            .await;

        let outcome = backend(&server.url())
            .query(&QueryRequest::new("hello").with_keywords(Some("greeting".to_string())))
            .await
            .unwrap();

        mock.assert_async().await;
        let QueryOutcome::Answered(answer) = outcome else {
            panic!("Expected an answer");
        };
        assert_eq!(answer.chunks[0].content, "hi there");
    }

    #[tokio::test]
    async fn test_query_accepted() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/query")
            .match_query(Matcher::Any)
            .with_status(202)
            .with_body(r#"{"task_id": "t-9"}"#)
            .create_async()
            .await;

        let outcome = backend(&server.url())
            .query(&QueryRequest::new("slow question"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            QueryOutcome::Accepted {
                task_id: Some("t-9".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_query_lingering_bad_gateway_becomes_status_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/query")
            .match_query(Matcher::Any)
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let err = backend(&server.url())
            .query(&QueryRequest::new("anyone there?"))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(
            err.downcast_ref::<BackendError>().and_then(BackendError::status),
            Some(StatusCode::BAD_GATEWAY)
        );
    }

    #[tokio::test]
    async fn test_fail_on_exhausted_surfaces_retries_exhausted() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/conversation-history")
            .with_status(502)
            .expect(2)
            .create_async()
            .await;

        let http = HttpClient::new(Client::new()).with_policy(
            RetryPolicy::new(2, Duration::ZERO).with_exhaustion(ExhaustionPolicy::Fail),
        );
        let err = Backend::new(server.url(), http)
            .conversation_history()
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<RetriesExhausted>().is_some());
    }

    #[tokio::test]
    async fn test_set_parameters_sends_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/set-parameters")
            .match_body(Matcher::Json(serde_json::json!({
                "temperature": 0.2,
                "k": 4,
                "chunk_overlap": 50,
                "rerank_method": "cross_encoder",
                "keywords": "billing"
            })))
            .with_status(200)
            .create_async()
            .await;

        let params = RetrievalParameters {
            temperature: 0.2,
            k: 4,
            chunk_overlap: 50,
            rerank_method: "cross_encoder".to_string(),
            keywords: Some("billing".to_string()),
        };
        backend(&server.url()).set_parameters(&params).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_conversation_history() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/conversation-history")
            .with_status(200)
            .with_body(
                r#"{"conversation_history": [
                    {"query": "q1", "answer": "a1", "timestamp": 1700000000},
                    {"query": "q2", "answer": "a2", "timestamp": "2024-01-01 10:00:00", "keywords": "k"}
                ]}"#,
            )
            .create_async()
            .await;

        let history = backend(&server.url()).conversation_history().await.unwrap();

        mock.assert_async().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].keywords, Some(Keywords::Text("k".to_string())));
    }

    #[tokio::test]
    async fn test_unreachable_backend_propagates_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = backend(&format!("http://{}", addr))
            .create_user("alice")
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<TransportError>().is_some());
    }
}

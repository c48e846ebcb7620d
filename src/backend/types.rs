use anyhow::{Result, bail};
use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use std::fmt;

/// Body returned by the create endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Created {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
}

/// The backend hands out integer ids on some deployments and strings on others.
fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string or numeric id, got {}",
            other
        ))),
    }
}

/// Generation settings sent to `/chatbots/{id}/configure`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatbotSettings {
    pub temperature: f64,
    pub max_tokens: u32,
    pub k: u32,
}

impl Default for ChatbotSettings {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 2000,
            k: 10,
        }
    }
}

impl ChatbotSettings {
    pub fn validate(&self) -> Result<()> {
        check_temperature(self.temperature)?;
        if !(100..=4000).contains(&self.max_tokens) {
            bail!("max_tokens must be between 100 and 4000, got {}", self.max_tokens);
        }
        check_k(self.k)
    }

    pub(crate) fn to_form(&self) -> Vec<(&'static str, String)> {
        vec![
            ("temperature", self.temperature.to_string()),
            ("max_tokens", self.max_tokens.to_string()),
            ("k", self.k.to_string()),
        ]
    }
}

/// Retrieval tuning sent as JSON to `/set-parameters`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalParameters {
    pub temperature: f64,
    pub k: u32,
    pub chunk_overlap: u32,
    pub rerank_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
}

impl Default for RetrievalParameters {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            k: 10,
            chunk_overlap: 0,
            rerank_method: "none".to_string(),
            keywords: None,
        }
    }
}

impl RetrievalParameters {
    pub fn validate(&self) -> Result<()> {
        check_temperature(self.temperature)?;
        check_k(self.k)?;
        if self.rerank_method.trim().is_empty() {
            bail!("rerank_method must not be empty");
        }
        Ok(())
    }
}

fn check_temperature(temperature: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&temperature) {
        bail!("temperature must be between 0.0 and 1.0, got {}", temperature);
    }
    Ok(())
}

fn check_k(k: u32) -> Result<()> {
    if !(1..=20).contains(&k) {
        bail!("k must be between 1 and 20, got {}", k);
    }
    Ok(())
}

/// A question for `/query`.
///
/// With a chatbot id the question goes out as form fields scoped to that
/// chatbot. Without one it goes out as query parameters against the
/// backend's default pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRequest {
    pub query: String,
    pub chatbot_id: Option<String>,
    pub keywords: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn for_chatbot(mut self, chatbot_id: impl Into<String>) -> Self {
        self.chatbot_id = Some(chatbot_id.into());
        self
    }

    pub fn with_keywords(mut self, keywords: Option<String>) -> Self {
        self.keywords = keywords.filter(|k| !k.trim().is_empty());
        self
    }

    pub(crate) fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("query", self.query.clone())];
        if let Some(chatbot_id) = &self.chatbot_id {
            fields.push(("chatbot_id", chatbot_id.clone()));
        }
        if let Some(keywords) = &self.keywords {
            fields.push(("keywords", keywords.clone()));
        }
        fields
    }
}

/// Keywords arrive either as a list or as one comma separated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Keywords {
    List(Vec<String>),
    Text(String),
}

impl Keywords {
    pub fn is_empty(&self) -> bool {
        match self {
            Keywords::List(list) => list.iter().all(|k| k.trim().is_empty()),
            Keywords::Text(text) => text.trim().is_empty(),
        }
    }
}

impl fmt::Display for Keywords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Keywords::List(list) => write!(f, "{}", list.join(", ")),
            Keywords::Text(text) => write!(f, "{}", text),
        }
    }
}

/// A source document cited by an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub name: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub keywords: Option<Keywords>,
}

/// A retrieved chunk with its retrieval score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub source: String,
    pub score: f64,
    #[serde(default)]
    pub chunk_index: Option<u64>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub keywords: Option<Keywords>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryAnswer {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub documents: Vec<SourceDocument>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The backend answered synchronously.
    Answered(QueryAnswer),
    /// The backend queued the question (HTTP 202).
    Accepted { task_id: Option<String> },
}

#[derive(Debug, Deserialize)]
pub(crate) struct AcceptedBody {
    #[serde(default, deserialize_with = "optional_id")]
    pub task_id: Option<String>,
}

fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "id_as_string")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

/// When a history entry was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Seconds since the unix epoch.
    Unix(f64),
    /// Already formatted by the backend.
    Text(String),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Unix(secs) => {
                // Floor so pre-epoch fractions round towards the past.
                let millis = (secs * 1000.0).floor() as i64;
                match DateTime::from_timestamp_millis(millis) {
                    Some(utc) => write!(
                        f,
                        "{}",
                        utc.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
                    ),
                    None => write!(f, "{}", secs),
                }
            }
            Timestamp::Text(text) => write!(f, "{}", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HistoryEntry {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub keywords: Option<Keywords>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryBody {
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
}

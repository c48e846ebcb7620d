//! Per-invocation session state: which server, user, chatbot and knowledge
//! base the operator is working with, plus the running chat transcript.

use anyhow::{Result, bail};

use crate::backend::SourceDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub documents: Vec<SourceDocument>,
}

/// A setup step the current command depends on has not been done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    MissingServerUrl,
    InvalidServerUrl(String),
    MissingUser,
    MissingChatbot,
    MissingKnowledgeBase,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::MissingServerUrl => write!(
                f,
                "No server URL configured. Pass --server-url or set RAGCTL_SERVER_URL."
            ),
            SessionError::InvalidServerUrl(url) => write!(
                f,
                "Invalid server URL '{}': expected an http:// or https:// URL.",
                url
            ),
            SessionError::MissingUser => write!(
                f,
                "Complete the setup first: no user selected. Pass --user-id or create one with 'ragctl user create'."
            ),
            SessionError::MissingChatbot => write!(
                f,
                "Complete the setup first: no chatbot selected. Pass --chatbot-id or create one with 'ragctl chatbot create'."
            ),
            SessionError::MissingKnowledgeBase => write!(
                f,
                "Complete the knowledge base configuration first: pass --kb-id or create one with 'ragctl kb create'."
            ),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionContext {
    server_url: String,
    pub user_id: Option<String>,
    pub chatbot_id: Option<String>,
    pub kb_id: Option<String>,
    pub chat_history: Vec<ChatMessage>,
}

impl SessionContext {
    /// Starts a session against `server_url`. A trailing `/` is dropped.
    pub fn new(server_url: &str) -> Result<Self> {
        let trimmed = server_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!(SessionError::MissingServerUrl);
        }
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            bail!(SessionError::InvalidServerUrl(server_url.to_string()));
        }

        Ok(Self {
            server_url: trimmed.to_string(),
            ..Self::default()
        })
    }

    pub fn with_ids(
        mut self,
        user_id: Option<String>,
        chatbot_id: Option<String>,
        kb_id: Option<String>,
    ) -> Self {
        self.user_id = non_blank(user_id);
        self.chatbot_id = non_blank(chatbot_id);
        self.kb_id = non_blank(kb_id);
        self
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn require_user(&self) -> Result<&str> {
        match &self.user_id {
            Some(id) => Ok(id),
            None => bail!(SessionError::MissingUser),
        }
    }

    pub fn require_chatbot(&self) -> Result<&str> {
        match &self.chatbot_id {
            Some(id) => Ok(id),
            None => bail!(SessionError::MissingChatbot),
        }
    }

    pub fn require_knowledge_base(&self) -> Result<&str> {
        match &self.kb_id {
            Some(id) => Ok(id),
            None => bail!(SessionError::MissingKnowledgeBase),
        }
    }

    pub fn record_user(&mut self, content: impl Into<String>) {
        self.chat_history.push(ChatMessage {
            role: Role::User,
            content: content.into(),
            documents: Vec::new(),
        });
    }

    pub fn record_assistant(&mut self, content: impl Into<String>, documents: Vec<SourceDocument>) {
        self.chat_history.push(ChatMessage {
            role: Role::Assistant,
            content: content.into(),
            documents,
        });
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

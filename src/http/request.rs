//! Request descriptors handed to the retrying client.

use reqwest::Method;

/// A file attached to a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    /// Multipart field name (the backend expects `file`).
    pub field: String,
    pub file_name: String,
    pub contents: Vec<u8>,
    pub mime: Option<String>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            field: "file".to_string(),
            file_name: file_name.into(),
            contents,
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Body or query payload of a request. Exactly one kind per request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    /// Appended to the URL as `?key=value&...`.
    Query(Vec<(String, String)>),
    /// Sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
    /// Sent as `multipart/form-data` with a single file part.
    File(FileUpload),
}

impl Payload {
    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Query(_) => "query",
            Payload::Form(_) => "form",
            Payload::Json(_) => "json",
            Payload::File(_) => "file",
        }
    }
}

/// One logical HTTP operation. Every retry of a call re-sends this exact value.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub payload: Payload,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            payload: Payload::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn query<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.payload = Payload::Query(collect_pairs(pairs));
        self
    }

    pub fn form<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.payload = Payload::Form(collect_pairs(pairs));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.payload = Payload::Json(body);
        self
    }

    pub fn file(mut self, upload: FileUpload) -> Self {
        self.payload = Payload::File(upload);
        self
    }
}

fn collect_pairs<K, V, I>(pairs: I) -> Vec<(String, String)>
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

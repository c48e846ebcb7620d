use anyhow::{Result, bail};
use log::info;
use std::path::Path;

use crate::backend::RagBackend;
use crate::http::FileUpload;
use crate::runtime::Runtime;
use crate::session::SessionContext;

/// Document types the backend ingests, with the MIME type sent for each.
const SUPPORTED_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("pdf", "application/pdf"),
];

/// Create a knowledge base attached to the session's chatbot.
#[tracing::instrument(skip(backend, session, description))]
pub async fn create_knowledge_base<B: RagBackend>(
    backend: &B,
    session: &mut SessionContext,
    name: &str,
    description: &str,
) -> Result<String> {
    let id = register_knowledge_base(backend, session, name, description).await?;
    println!("Knowledge base created! ID: {}", id);
    Ok(id)
}

/// [`create_knowledge_base`] without the console report.
pub(super) async fn register_knowledge_base<B: RagBackend>(
    backend: &B,
    session: &mut SessionContext,
    name: &str,
    description: &str,
) -> Result<String> {
    let chatbot_id = session.require_chatbot()?.to_string();
    let name = name.trim();
    if name.is_empty() {
        bail!("Knowledge base name must not be empty.");
    }

    info!("Creating knowledge base {} for chatbot {}...", name, chatbot_id);
    let created = backend
        .create_knowledge_base(&chatbot_id, name, description)
        .await?;
    session.kb_id = Some(created.id.clone());
    Ok(created.id)
}

/// Upload a document into the session's knowledge base.
#[tracing::instrument(skip(runtime, backend, session))]
pub async fn upload_document<R: Runtime, B: RagBackend>(
    runtime: &R,
    backend: &B,
    session: &SessionContext,
    path: &Path,
) -> Result<()> {
    let kb_id = session.require_knowledge_base()?;
    let upload = load_document(runtime, path)?;

    info!(
        "Uploading {} ({} bytes) to knowledge base {}...",
        upload.file_name,
        upload.contents.len(),
        kb_id
    );
    backend.upload_document(kb_id, &upload).await?;

    println!("Document uploaded successfully!");
    Ok(())
}

fn load_document<R: Runtime>(runtime: &R, path: &Path) -> Result<FileUpload> {
    let file_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_string(),
        None => bail!("Invalid document path: {:?}", path),
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let Some((_, mime)) = SUPPORTED_TYPES.iter().find(|(ext, _)| *ext == extension) else {
        bail!(
            "Unsupported document type {:?}. Supported types: {}",
            file_name,
            SUPPORTED_TYPES
                .iter()
                .map(|(ext, _)| *ext)
                .collect::<Vec<_>>()
                .join(", ")
        );
    };

    if !runtime.is_file(path) {
        bail!("Document not found: {:?}", path);
    }

    let contents = runtime.read(path)?;
    Ok(FileUpload::new(file_name, contents).with_mime(*mime))
}

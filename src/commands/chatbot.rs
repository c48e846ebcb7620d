use anyhow::{Result, bail};
use log::info;

use crate::backend::{ChatbotSettings, RagBackend};
use crate::session::SessionContext;

/// Create a chatbot for the session's user.
#[tracing::instrument(skip(backend, session, description))]
pub async fn create_chatbot<B: RagBackend>(
    backend: &B,
    session: &mut SessionContext,
    name: &str,
    description: &str,
) -> Result<String> {
    let id = register_chatbot(backend, session, name, description).await?;
    println!("Chatbot created successfully! ID: {}", id);
    Ok(id)
}

/// [`create_chatbot`] without the console report.
pub(super) async fn register_chatbot<B: RagBackend>(
    backend: &B,
    session: &mut SessionContext,
    name: &str,
    description: &str,
) -> Result<String> {
    let user_id = session.require_user()?.to_string();
    let name = name.trim();
    if name.is_empty() {
        bail!("Chatbot name must not be empty.");
    }

    info!("Creating chatbot {} for user {}...", name, user_id);
    let created = backend.create_chatbot(&user_id, name, description).await?;
    session.chatbot_id = Some(created.id.clone());
    Ok(created.id)
}

/// Update generation settings of the session's chatbot.
#[tracing::instrument(skip(backend, session))]
pub async fn configure_chatbot<B: RagBackend>(
    backend: &B,
    session: &SessionContext,
    settings: &ChatbotSettings,
) -> Result<()> {
    let chatbot_id = session.require_chatbot()?;
    settings.validate()?;

    backend.configure_chatbot(chatbot_id, settings).await?;

    println!(
        "Settings updated! temperature={} max_tokens={} k={}",
        settings.temperature, settings.max_tokens, settings.k
    );
    Ok(())
}

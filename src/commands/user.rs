use anyhow::{Result, bail};
use log::info;

use crate::backend::RagBackend;
use crate::session::SessionContext;

/// Create a user and make it the session's current user.
#[tracing::instrument(skip(backend, session))]
pub async fn create_user<B: RagBackend>(
    backend: &B,
    session: &mut SessionContext,
    name: &str,
) -> Result<String> {
    let id = register_user(backend, session, name).await?;
    println!("User created successfully! User ID: {}", id);
    Ok(id)
}

/// [`create_user`] without the console report.
pub(super) async fn register_user<B: RagBackend>(
    backend: &B,
    session: &mut SessionContext,
    name: &str,
) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name must not be empty.");
    }

    info!("Creating user {} on {}...", name, session.server_url());
    let created = backend.create_user(name).await?;
    session.user_id = Some(created.id.clone());
    Ok(created.id)
}

use anyhow::{Result, bail};
use log::debug;

use crate::backend::RagBackend;
use crate::session::SessionContext;

use super::{
    chatbot::register_chatbot, knowledge::register_knowledge_base, user::register_user,
};

/// What the setup wizard should create. Steps whose id is already in the
/// session are skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupPlan {
    pub user_name: Option<String>,
    pub chatbot_name: Option<String>,
    pub chatbot_description: String,
    pub kb_name: Option<String>,
    pub kb_description: String,
}

/// Walk through user, chatbot and (optionally) knowledge base creation.
///
/// Progress goes to stderr; stdout only carries the export lines, so the
/// output can be passed to `eval`.
#[tracing::instrument(skip(backend, session))]
pub async fn setup<B: RagBackend>(
    backend: &B,
    session: &mut SessionContext,
    plan: &SetupPlan,
) -> Result<()> {
    if session.user_id.is_some() {
        debug!("Reusing user {:?}", session.user_id);
    } else if let Some(name) = &plan.user_name {
        let id = register_user(backend, session, name).await?;
        eprintln!("User created successfully! User ID: {}", id);
    } else {
        bail!("Please create or select a user to continue: pass --user NAME or --user-id ID.");
    }

    if session.chatbot_id.is_some() {
        debug!("Reusing chatbot {:?}", session.chatbot_id);
    } else if let Some(name) = &plan.chatbot_name {
        let id = register_chatbot(backend, session, name, &plan.chatbot_description).await?;
        eprintln!("Chatbot created successfully! ID: {}", id);
    } else {
        bail!("Please create or select a chatbot to continue: pass --chatbot NAME or --chatbot-id ID.");
    }

    if session.kb_id.is_none() {
        if let Some(name) = &plan.kb_name {
            let id = register_knowledge_base(backend, session, name, &plan.kb_description).await?;
            eprintln!("Knowledge base created! ID: {}", id);
        }
    }

    eprintln!("\nSetup complete! Use these settings for the next commands:");
    print!("{}", render_exports(session));
    if session.kb_id.is_none() {
        eprintln!("Next: create a knowledge base with 'ragctl kb create NAME'.");
    }
    Ok(())
}

/// Shell exports that carry this session's ids into later invocations.
pub fn render_exports(session: &SessionContext) -> String {
    let mut out = format!(
        "export RAGCTL_SERVER_URL={}\n",
        shell_quote(session.server_url())
    );
    for (var, value) in [
        ("RAGCTL_USER_ID", &session.user_id),
        ("RAGCTL_CHATBOT_ID", &session.chatbot_id),
        ("RAGCTL_KB_ID", &session.kb_id),
    ] {
        if let Some(value) = value {
            out.push_str(&format!("export {}={}\n", var, shell_quote(value)));
        }
    }
    out
}

/// Single-quote `value` for POSIX shells.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

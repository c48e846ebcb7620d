//! One entry point per CLI subcommand.
//!
//! Each command takes the backend and the session explicitly, so the same
//! functions run against `Backend` in the binary and against `MockRagBackend`
//! in tests.

mod chat;
mod chatbot;
pub mod config;
mod history;
mod knowledge;
mod params;
mod setup;
mod user;

pub use chat::{ask, chat, render_answer, render_transcript};
pub use chatbot::{configure_chatbot, create_chatbot};
pub use history::{DEFAULT_HISTORY_LIMIT, render_history, show_history};
pub use knowledge::{create_knowledge_base, upload_document};
pub use params::set_parameters;
pub use setup::{SetupPlan, render_exports, setup};
pub use user::create_user;

pub mod backend;
pub mod commands;
pub mod http;
pub mod runtime;
pub mod session;

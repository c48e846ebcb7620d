//! Runtime abstraction for system operations.
//!
//! Commands reach the file system and the terminal only through [`Runtime`],
//! so they can be tested with `MockRuntime`.
//!
//! # Structure
//!
//! - `fs` - File reads for document uploads
//! - `user` - Line input for the interactive chat

mod fs;
mod user;

use anyhow::Result;
use std::path::Path;

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // File System
    fn is_file(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    // User interaction
    /// Print `prompt` and read one line. Returns `None` at end of input.
    fn read_line(&self, prompt: &str) -> Result<Option<String>>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn is_file(&self, path: &Path) -> bool {
        self.is_file_impl(path)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.read_impl(path)
    }

    fn read_line(&self, prompt: &str) -> Result<Option<String>> {
        self.read_line_impl(prompt)
    }
}

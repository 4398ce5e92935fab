// CLI module for oggframe
//
// Compiled into the binary only. Commands drive the library through its
// public API, the same way any other caller would.

pub mod commands;
pub mod config;
pub mod output;

pub use config::{Commands, Config, OutputFormat};
pub use output::OutputFormatter;

use oggframe::OggError;
use thiserror::Error;

// Error type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error(transparent)]
    Ogg(#[from] OggError),

    #[error("{0}")]
    Other(String),
}

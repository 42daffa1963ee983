//! Service-specific error types

use thiserror::Error;

/// Errors raised by the CLI's own adapters and argument parsing.
///
/// Library errors (pool, chat, crop) keep their own types and are wrapped
/// with `anyhow` context at the command level.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to run OCR command `{command}`: {source}")]
    OcrSpawn {
        command: String,
        source: std::io::Error,
    },

    #[error("OCR command exited with {status}: {stderr}")]
    OcrFailed { status: String, stderr: String },

    #[error("no text recognized in the image")]
    NoText,

    #[error("invalid viewport `{0}`, expected WIDTHxHEIGHT")]
    InvalidViewport(String),

    #[error("invalid drag `{0}`, expected HANDLE:X,Y (e.g. bottom-right:800,700)")]
    InvalidDrag(String),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

//! Common types shared by the OCR chat crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

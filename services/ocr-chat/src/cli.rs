//! Command-line interface

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use crop::Handle;

use crate::error::Error;

#[derive(Debug, Parser)]
#[command(name = "ocr-chat", version, about = "OCR an image and ask a chat model about it")]
pub struct Cli {
    /// Config file (default: $CONFIG_PATH or ./ocr-chat.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr when the command finishes
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage API keys
    Keys {
        #[command(subcommand)]
        action: KeysCommand,
    },
    /// Manage the model selection
    Models {
        #[command(subcommand)]
        action: ModelsCommand,
    },
    /// Recognize text in an image and build a prompt from it
    Ocr {
        image: PathBuf,
        /// Send the prompt to the primary model
        #[arg(long)]
        ask: bool,
    },
    /// Crop an image with simulated handle drags
    Crop {
        image: PathBuf,
        /// Preview viewport size, e.g. 1080x1920
        #[arg(long)]
        viewport: Viewport,
        /// Drag a handle to a viewport point, e.g. top-left:120,300 (repeatable)
        #[arg(long = "drag")]
        drags: Vec<DragSpec>,
        /// Where to write the cropped image
        #[arg(long)]
        out: PathBuf,
    },
    /// Send a prompt (`-` reads stdin)
    Ask {
        prompt: String,
        #[arg(long, conflicts_with = "all_models")]
        model: Option<String>,
        /// Ask every selected model concurrently
        #[arg(long)]
        all_models: bool,
        /// Send the stored conversation as context and append this exchange
        #[arg(long)]
        conversation: bool,
    },
    /// Manage the stored conversation
    Conversation {
        #[command(subcommand)]
        action: ConversationCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConversationCommand {
    /// Forget every stored turn
    New,
    /// Print the stored turns
    Show,
}

#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    /// Add a key (at most 5)
    Add {
        key: String,
        #[arg(long)]
        label: Option<String>,
    },
    /// List keys with usage
    List,
    /// Pool health as JSON
    Status,
    /// Remove the key at INDEX
    Remove { index: usize },
    /// Change label or active flag of the key at INDEX
    Update {
        index: usize,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Re-enable every failed key
    Reset,
    /// Check every active key against the model list endpoint
    Test,
}

#[derive(Debug, Subcommand)]
pub enum ModelsCommand {
    /// Show known models and the selection
    List,
    /// Fetch the model list from the API
    Refresh,
    /// Flip selection of one model
    Toggle { id: String },
    SelectAll,
    DeselectAll,
}

/// Viewport size in view units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl FromStr for Viewport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidViewport(s.to_string());
        let (w, h) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: f32 = w.trim().parse().map_err(|_| invalid())?;
        let height: f32 = h.trim().parse().map_err(|_| invalid())?;
        if !(width > 0.0 && height > 0.0) {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

/// One simulated gesture: grab `handle`, move it to `(x, y)`, release.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSpec {
    pub handle: Handle,
    pub x: f32,
    pub y: f32,
}

impl FromStr for DragSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidDrag(s.to_string());
        let (handle, point) = s.split_once(':').ok_or_else(invalid)?;
        let handle: Handle = handle.trim().parse().map_err(|_| invalid())?;
        let (x, y) = point.split_once(',').ok_or_else(invalid)?;
        let x: f32 = x.trim().parse().map_err(|_| invalid())?;
        let y: f32 = y.trim().parse().map_err(|_| invalid())?;
        Ok(Self { handle, x, y })
    }
}

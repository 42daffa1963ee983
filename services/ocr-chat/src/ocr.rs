//! Text recognition through an external OCR command
//!
//! Recognition itself is out of process: the configured command (tesseract by
//! default) is run on the image and its stdout is taken as the text.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::config::OcrConfig;
use crate::error::{Error, Result};

const IMAGE_PLACEHOLDER: &str = "{image}";

/// Turns an image into text.
pub trait TextRecognizer: Send + Sync {
    fn recognize<'a>(
        &'a self,
        image: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// Runs a command line and reads the recognized text from stdout.
pub struct CommandRecognizer {
    command: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }

    /// Arguments with the image path substituted.
    fn args_for(&self, image: &Path) -> Vec<String> {
        let path = image.display().to_string();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(IMAGE_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(IMAGE_PLACEHOLDER, &path)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(path);
        }
        args
    }

    async fn run(&self, image: &Path) -> Result<String> {
        let args = self.args_for(image);
        debug!(command = %self.command, ?args, "running OCR command");

        let output = tokio::process::Command::new(&self.command)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| Error::OcrSpawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = %output.status, "OCR command failed");
            return Err(Error::OcrFailed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.len(), "OCR command finished");
        Ok(text)
    }
}

impl TextRecognizer for CommandRecognizer {
    fn recognize<'a>(
        &'a self,
        image: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.run(image))
    }
}

/// Recognize `image` and clean the result.
///
/// Blank output is `Error::NoText` so callers never send an empty prompt.
pub async fn extract_text(recognizer: &dyn TextRecognizer, image: &Path) -> Result<String> {
    let raw = recognizer.recognize(image).await?;
    let text = chat::clean_extracted_text(&raw);
    if text.is_empty() {
        return Err(Error::NoText);
    }
    Ok(text)
}

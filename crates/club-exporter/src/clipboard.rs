// System clipboard access.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable")]
    Unavailable,

    #[error("clipboard command `{program}` failed: {message}")]
    Command { program: String, message: String },
}

/// Scoped write access to a clipboard.
#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Build the clipboard described by a configured command line.
pub fn from_command(command: &[String]) -> Arc<dyn Clipboard> {
    match command.split_first() {
        Some((program, args)) => Arc::new(CommandClipboard {
            program: program.clone(),
            args: args.to_vec(),
        }),
        None => Arc::new(UnavailableClipboard),
    }
}

/// Pipes the text into an external program such as `wl-copy` or `pbcopy`.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    pub program: String,
    pub args: Vec<String>,
}

#[async_trait]
impl Clipboard for CommandClipboard {
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let fail = |message: String| ClipboardError::Command {
            program: self.program.clone(),
            message,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| fail(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| fail(e.to_string()))?;
        }

        let status = child.wait().await.map_err(|e| fail(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(fail(format!("exited with {status}")))
        }
    }
}

/// Used when no clipboard command is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableClipboard;

#[async_trait]
impl Clipboard for UnavailableClipboard {
    async fn write_text(&self, _text: &str) -> Result<(), ClipboardError> {
        Err(ClipboardError::Unavailable)
    }
}

/// In-process clipboard; keeps every write for inspection.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    writes: Mutex<Vec<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of every successful write, oldest first.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn contents(&self) -> Option<String> {
        self.writes().pop()
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.writes
            .lock()
            .map_err(|_| ClipboardError::Unavailable)?
            .push(text.to_string());
        Ok(())
    }
}

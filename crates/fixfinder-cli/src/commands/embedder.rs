//! External embedder command glue.
//!
//! The configured command gets text on stdin and must print a JSON array of
//! floats. This is the only embedding backend; without one configured the
//! semantic index is simply skipped.

use anyhow::{Context, Result};
use fixfinder_search::{QueryEmbedder, SearchError, SearchResult};
use std::io::Write;
use std::process::{Command, Stdio};

#[derive(Debug, Clone)]
pub struct CommandEmbedder {
    command: String,
    dimensions: usize,
}

impl CommandEmbedder {
    pub fn new(command: impl Into<String>, dimensions: usize) -> Self {
        Self {
            command: command.into(),
            dimensions,
        }
    }

    /// Build from config if an embedder command is set.
    pub fn from_config(config: &fixfinder_config::Config) -> Option<Self> {
        config
            .embedding
            .command
            .as_ref()
            .map(|cmd| Self::new(cmd, config.embedding.dimensions))
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut child = Command::new(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn embedder '{}'", self.command))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(text.as_bytes())
                .context("Failed to write to embedder stdin")?;
        }

        let output = child
            .wait_with_output()
            .context("Embedder did not finish")?;
        if !output.status.success() {
            anyhow::bail!("Embedder '{}' exited with {}", self.command, output.status);
        }

        let vector: Vec<f32> =
            serde_json::from_slice(&output.stdout).context("Embedder output is not a JSON array")?;
        if vector.len() != self.dimensions {
            anyhow::bail!(
                "Embedder returned {} dimensions, expected {}",
                vector.len(),
                self.dimensions
            );
        }

        Ok(vector)
    }
}

impl QueryEmbedder for CommandEmbedder {
    fn embed(&self, text: &str) -> SearchResult<Vec<f32>> {
        self.embed_text(text)
            .map_err(|e| SearchError::Embedding(e.to_string()))
    }
}

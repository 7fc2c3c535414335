//! Write-once artifact storage for request snapshots and completion notes.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

/// Path-addressed sink for text and JSON artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Store `contents` under `name` and return where it landed.
    fn write_text(&self, name: &str, contents: &str) -> anyhow::Result<PathBuf>;

    /// Store pretty-printed JSON under `name`.
    fn write_json(&self, name: &str, data: &Value) -> anyhow::Result<PathBuf> {
        let contents = serde_json::to_string_pretty(data)
            .with_context(|| format!("serializing artifact {name}"))?;
        self.write_text(name, &contents)
    }
}

/// Stores artifacts as files in one directory. Existing files are never
/// overwritten.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    directory: PathBuf,
}

impl FileArtifactStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Read an artifact back, or `None` if it was never written.
    pub fn load(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.directory.join(name)).ok()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.directory.join(name).exists()
    }
}

impl ArtifactStore for FileArtifactStore {
    fn write_text(&self, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
        if name.contains(['/', '\\']) || name == ".." {
            anyhow::bail!("artifact name must be a plain file name: {name}");
        }
        fs::create_dir_all(&self.directory)
            .with_context(|| format!("creating {}", self.directory.display()))?;

        let path = self.directory.join(name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("creating artifact {}", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("writing artifact {}", path.display()))?;
        Ok(path)
    }
}

impl Default for FileArtifactStore {
    fn default() -> Self {
        Self::new("./taskmaster-artifacts")
    }
}

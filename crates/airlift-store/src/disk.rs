use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use airlift_core::{FileStore, StoreEntry, StoreEntryKind};
use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative.as_os_str().is_empty() {
            return Err(anyhow!("store path must not be empty"));
        }
        if relative.is_absolute() {
            return Err(anyhow!("store path must be relative: {path}"));
        }
        if relative
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(anyhow!("store path must not include '..': {path}"));
        }
        Ok(self.root.join(relative))
    }
}

impl FileStore for DiskStore {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path)
            .map(|resolved| resolved.exists())
            .unwrap_or(false)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve(path)?;
        fs::read(&resolved).with_context(|| format!("failed to read {}", resolved.display()))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&resolved, data)
            .with_context(|| format!("failed to write {}", resolved.display()))
    }

    fn remove_tree(&self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        let metadata = match fs::symlink_metadata(&resolved) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to stat {}", resolved.display()));
            }
        };

        if metadata.is_dir() {
            fs::remove_dir_all(&resolved)
                .with_context(|| format!("failed to remove tree {}", resolved.display()))
        } else {
            fs::remove_file(&resolved)
                .with_context(|| format!("failed to remove file {}", resolved.display()))
        }
    }

    fn list(&self, path: &str) -> Result<Vec<StoreEntry>> {
        let resolved = self.resolve(path)?;
        let reader = match fs::read_dir(&resolved) {
            Ok(reader) => reader,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", resolved.display()));
            }
        };

        let mut entries = Vec::new();
        for entry in reader {
            let entry =
                entry.with_context(|| format!("failed to read {}", resolved.display()))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                return Err(anyhow!(
                    "store entry name is not valid UTF-8 under {}",
                    resolved.display()
                ));
            };
            let kind = if entry
                .file_type()
                .with_context(|| format!("failed to stat {}", entry.path().display()))?
                .is_dir()
            {
                StoreEntryKind::Directory
            } else {
                StoreEntryKind::File
            };
            entries.push(StoreEntry { name, kind });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn uri(&self, path: &str) -> Result<String> {
        let resolved = self.resolve(path)?;
        Ok(format!("file://{}", resolved.display()))
    }
}

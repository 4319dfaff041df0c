//! Landing files as seen by the batch runner.
//!
//! The runner only needs a name, a byte length and the full content; where
//! the bytes live is up to the [`RawFile`] implementation. [`LocalFile`]
//! serves files from a directory tree, [`InMemoryFile`] from memory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::error::FileParseError;

pub trait RawFile {
    fn name(&self) -> &str;
    fn size(&self) -> u64;
    fn fetch(&self) -> Result<Vec<u8>, FileParseError>;
}

#[derive(Debug, Clone)]
pub struct LocalFile {
    name: String,
    path: PathBuf,
    size: u64,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, path: PathBuf, size: u64) -> Self {
        LocalFile {
            name: name.into(),
            path,
            size,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata =
            fs::metadata(path).with_context(|| format!("Reading metadata of {path:?}"))?;
        Ok(LocalFile::new(
            path.to_string_lossy(),
            path.to_path_buf(),
            metadata.len(),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RawFile for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn fetch(&self) -> Result<Vec<u8>, FileParseError> {
        fs::read(&self.path).map_err(|err| FileParseError::Fetch(err.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryFile {
    name: String,
    bytes: Vec<u8>,
}

impl InMemoryFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        InMemoryFile {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl RawFile for InMemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn fetch(&self) -> Result<Vec<u8>, FileParseError> {
        Ok(self.bytes.clone())
    }
}

/// Lists every file below `root/prefix`, recursively, sorted by name.
/// Names are `/`-separated paths relative to `root`, like object keys.
pub fn list_landing_files(root: &Path, prefix: &str) -> Result<Vec<LocalFile>> {
    let start = root.join(prefix.trim_start_matches('/'));
    let mut files = Vec::new();
    if !start.exists() {
        return Ok(files);
    }
    let mut pending = vec![start];
    while let Some(dir) = pending.pop() {
        let entries =
            fs::read_dir(&dir).with_context(|| format!("Listing landing directory {dir:?}"))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("Listing landing directory {dir:?}"))?;
            let path = entry.path();
            let metadata = entry
                .metadata()
                .with_context(|| format!("Reading metadata of {path:?}"))?;
            if metadata.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let name = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(LocalFile::new(name, path, metadata.len()));
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

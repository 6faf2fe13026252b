// SharedDir - The local folder a peer announces and serves
//
// Only plain entries directly inside the root are ever reachable: names with
// path separators or dot components never resolve.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;

/// Errors from shared folder operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A folder of shareable files
#[derive(Clone, Debug)]
pub struct SharedDir {
    root: PathBuf,
}

impl SharedDir {
    /// Use `root` without touching the filesystem
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `root`, creating it if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = Self::new(root);
        tokio::fs::create_dir_all(&dir.root).await?;
        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `name` names an entry directly inside the folder
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains('/')
            && !name.contains('\\')
            && !name.contains('\0')
    }

    /// Path for `name`, or `None` if the name could escape the folder
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        Self::is_valid_name(name).then(|| self.root.join(name))
    }

    /// Open a shared file for reading, returning it with its length.
    /// `None` if there is no regular file by that exact name.
    pub async fn open_file(&self, name: &str) -> Result<Option<(File, u64)>, StorageError> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Ok(None);
        }
        Ok(Some((file, metadata.len())))
    }

    /// Names of the regular files in the folder, sorted
    pub async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Copy `source` into the folder under its own file name
    pub async fn add_file(&self, source: &Path) -> Result<String, StorageError> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| Self::is_valid_name(n))
            .ok_or_else(|| StorageError::InvalidName(source.display().to_string()))?
            .to_string();
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::copy(source, self.root.join(&name)).await?;
        Ok(name)
    }
}

//! File storage helpers for uploaded documents.

use std::path::{Path, PathBuf};

use jiff::Timestamp;

use crate::{Error, Result, TRACING_TARGET_RAG};

/// A file received from a caller.
#[derive(Clone)]
pub struct UploadedFile {
    /// Filename as supplied by the caller.
    pub original_filename: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// File contents.
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// Creates an uploaded file.
    pub fn new(
        original_filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            original_filename: original_filename.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Returns the size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("original_filename", &self.original_filename)
            .field("mime_type", &self.mime_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Keeps only the final path component of a caller-supplied filename.
pub(crate) fn sanitize_filename(name: &str) -> Result<String> {
    Path::new(name)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_owned)
        .ok_or_else(|| Error::invalid_input("filename is empty"))
}

/// Returns the lowercase extension without the dot.
pub(crate) fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Picks a free filename inside `dir`.
///
/// A name already taken becomes `{stem}_{unix_millis}{.ext}`.
pub(crate) async fn unique_path(dir: &Path, filename: &str) -> Result<(String, PathBuf)> {
    let path = dir.join(filename);
    if !tokio::fs::try_exists(&path).await? {
        return Ok((filename.to_owned(), path));
    }

    let file = Path::new(filename);
    let stem = file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename);
    let suffix = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let renamed = format!("{stem}_{}{suffix}", Timestamp::now().as_millisecond());
    let path = dir.join(&renamed);
    Ok((renamed, path))
}

/// Writes a file, creating its directory.
pub(crate) async fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await?;
    Ok(())
}

/// Removes a file, logging instead of failing.
pub(crate) async fn remove_file_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(target: TRACING_TARGET_RAG, path = %path.display(), "File removed");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                target: TRACING_TARGET_RAG,
                path = %path.display(),
                error = %e,
                "Failed to remove file"
            );
        }
    }
}

/// Removes a directory tree if it exists.
pub(crate) async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Removes every regular file directly inside `dir`. Returns how many were removed.
pub(crate) async fn clear_files(dir: &Path) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Metadata of a stored file.
#[derive(Debug, Clone)]
pub(crate) struct StoredFileInfo {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: Option<Timestamp>,
}

/// Lists the regular files directly inside `dir`, sorted by name.
pub(crate) async fn list_files(dir: &Path) -> Result<Vec<StoredFileInfo>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let Some(filename) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .and_then(|time| Timestamp::try_from(time).ok());

        files.push(StoredFileInfo {
            filename,
            path: entry.path(),
            size: metadata.len(),
            created_at,
        });
    }

    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn sanitizes_to_last_component() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("report.pdf").unwrap(), "report.pdf");
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("..").is_err());
    }

    #[test]
    fn extension_is_lowercase() {
        assert_eq!(extension("Data.XLSX").as_deref(), Some("xlsx"));
        assert_eq!(extension("README"), None);
    }

    #[tokio::test]
    async fn collisions_get_timestamp_suffix() {
        let dir = TempDir::new().unwrap();
        let (name, path) = unique_path(dir.path(), "notes.txt").await.unwrap();
        assert_eq!(name, "notes.txt");
        write_file(&path, b"x").await.unwrap();

        let (renamed, _) = unique_path(dir.path(), "notes.txt").await.unwrap();
        assert!(renamed.starts_with("notes_"));
        assert!(renamed.ends_with(".txt"));
        assert_ne!(renamed, "notes.txt");
    }

    #[tokio::test]
    async fn clear_and_list_files() {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("a.txt"), b"aa").await.unwrap();
        write_file(&dir.path().join("b.txt"), b"b").await.unwrap();

        let files = list_files(dir.path()).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].filename, "a.txt");
        assert_eq!(files[0].size, 2);

        assert_eq!(clear_files(dir.path()).await.unwrap(), 2);
        assert!(list_files(dir.path()).await.unwrap().is_empty());
        assert_eq!(clear_files(&dir.path().join("missing")).await.unwrap(), 0);
    }
}

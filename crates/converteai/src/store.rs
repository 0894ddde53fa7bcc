//! Uploads and converted documents on disk.
//!
//! ```text
//! <root>/
//!   temp/        raw uploads, removed right after conversion
//!   converted/   generated .docx files, served by name and expired
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use converteai_core::files;
use serde::Serialize;

pub const TEMP_DIR: &str = "temp";
pub const CONVERTED_DIR: &str = "converted";

/// Raw uploads outlive their conversion by this much.
pub const TEMP_TTL: Duration = Duration::from_secs(5);
/// Converted documents that are never downloaded.
pub const OUTPUT_TTL: Duration = Duration::from_secs(60 * 60);
/// Converted documents once they have been served.
pub const DOWNLOADED_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Not a regular file: {0}")]
    NotAFile(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Existence of each store directory, as reported by the health endpoint.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirStatus {
    pub upload_dir: bool,
    pub temp_dir: bool,
    pub converted_dir: bool,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    temp: PathBuf,
    converted: PathBuf,
}

impl FileStore {
    /// Open the store rooted at `root`, creating its directories. Relative
    /// roots are resolved against the working directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = std::path::absolute(root.into())?;
        let store = Self {
            temp: root.join(TEMP_DIR),
            converted: root.join(CONVERTED_DIR),
            root,
        };
        fs::create_dir_all(&store.temp)?;
        fs::create_dir_all(&store.converted)?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[cfg(test)]
    pub fn temp_dir(&self) -> &Path {
        &self.temp
    }

    pub fn converted_dir(&self) -> &Path {
        &self.converted
    }

    pub fn dir_status(&self) -> DirStatus {
        DirStatus {
            upload_dir: self.root.is_dir(),
            temp_dir: self.temp.is_dir(),
            converted_dir: self.converted.is_dir(),
        }
    }

    /// Save a raw upload under a unique name in `temp/`.
    pub async fn save_upload(&self, original_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let name = files::unique_filename(
            original_name,
            chrono::Utc::now().timestamp_millis(),
            &files::random_suffix(&mut rand::thread_rng()),
        );
        let path = self.temp.join(name);
        tokio::fs::write(&path, bytes).await?;
        log::debug!("Upload stored at {}", path.display());
        Ok(path)
    }

    /// Read a converted document by its public name.
    pub async fn read_output(&self, name: &str) -> Result<(PathBuf, Vec<u8>), StoreError> {
        let path = self.converted.join(name);
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(StoreError::NotAFile(name.to_string()));
        }
        let bytes = tokio::fs::read(&path).await?;
        Ok((path, bytes))
    }

    /// Remove expired files from both directories.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let mut removed = 0;
        for dir in [&self.temp, &self.converted] {
            match cleanup_older_than(dir, max_age).await {
                Ok(n) => removed += n,
                Err(e) => log::error!("Error cleaning up old files in {}: {e}", dir.display()),
            }
        }
        removed
    }
}

/// Write through a hidden `.<name>.part` sibling and rename it into place, so
/// readers never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let part = path.with_file_name(format!(".{}.part", name.to_string_lossy()));

    let result = File::create(&part)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&part, path));

    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}

/// Delete `path`, tolerating files that are already gone. Returns whether a
/// file was removed.
pub async fn cleanup(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log::info!("File cleaned up: {}", path.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            log::error!("Error cleaning up file {}: {e}", path.display());
            false
        }
    }
}

pub fn schedule_cleanup(path: PathBuf, delay: Duration) -> tokio::task::JoinHandle<bool> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        cleanup(&path).await
    })
}

/// Remove regular files in `dir` last modified at least `max_age` ago.
pub async fn cleanup_older_than(dir: &Path, max_age: Duration) -> Result<usize, StoreError> {
    let now = SystemTime::now();
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age >= max_age && cleanup(&entry.path()).await {
            removed += 1;
        }
    }

    if removed > 0 {
        log::info!("Cleaned up {removed} old files from {}", dir.display());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_open_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("uploads")).unwrap();
        assert_eq!(
            store.dir_status(),
            DirStatus {
                upload_dir: true,
                temp_dir: true,
                converted_dir: true
            }
        );
        assert!(store.converted_dir().ends_with("uploads/converted"));
    }

    #[test]
    fn test_open_resolves_relative_root() {
        let dir = tempfile::Builder::new().tempdir_in(".").unwrap();
        let relative = Path::new(".").join(dir.path().file_name().unwrap());
        let store = FileStore::open(relative.clone()).unwrap();
        assert!(store.root().is_absolute());
        assert!(store.converted_dir().is_absolute());
        assert!(store.converted_dir().is_dir());
    }

    #[test]
    fn test_write_atomic_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");
        write_atomic(&path, b"PK\x03\x04").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"PK\x03\x04");
        assert_eq!(names(dir.path()), vec!["out.docx"]);
    }

    #[test]
    fn test_write_atomic_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.docx");
        assert!(write_atomic(&path, b"data").is_err());
        assert!(!path.exists());
        assert!(names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_save_upload_uses_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let a = store.save_upload("report.pdf", b"%PDF-a").await.unwrap();
        let b = store.save_upload("report.pdf", b"%PDF-b").await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with(store.temp_dir()));
        assert!(a.to_string_lossy().ends_with(".pdf"));
        assert_eq!(fs::read(&b).unwrap(), b"%PDF-b");
    }

    #[tokio::test]
    async fn test_read_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        write_atomic(&store.converted_dir().join("doc.docx"), b"bytes").unwrap();
        fs::create_dir(store.converted_dir().join("nested")).unwrap();

        let (path, bytes) = store.read_output("doc.docx").await.unwrap();
        assert_eq!(bytes, b"bytes");
        assert!(path.ends_with("converted/doc.docx"));
        assert!(matches!(
            store.read_output("gone.docx").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.read_output("nested").await,
            Err(StoreError::NotAFile(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_is_tolerant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        fs::write(&path, b"x").unwrap();
        assert!(cleanup(&path).await);
        assert!(!cleanup(&path).await);
    }

    #[tokio::test]
    async fn test_schedule_cleanup_removes_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        fs::write(&path, b"x").unwrap();
        let handle = schedule_cleanup(path.clone(), Duration::from_millis(10));
        assert!(handle.await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cleanup_older_than() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.docx"), b"x").unwrap();
        fs::write(dir.path().join("b.docx"), b"y").unwrap();
        fs::create_dir(dir.path().join("keep")).unwrap();

        assert_eq!(
            cleanup_older_than(dir.path(), Duration::from_secs(3600))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            cleanup_older_than(dir.path(), Duration::ZERO).await.unwrap(),
            2
        );
        assert_eq!(names(dir.path()), vec!["keep"]);
    }

    #[tokio::test]
    async fn test_sweep_covers_both_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(store.temp_dir().join("a.pdf"), b"x").unwrap();
        write_atomic(&store.converted_dir().join("b.docx"), b"y").unwrap();
        assert_eq!(store.sweep(Duration::ZERO).await, 2);
    }
}

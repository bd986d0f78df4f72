//! Durable placement of finished downloads.
//!
//! # Design
//! The transport leaves a finished download in a temporary location that it
//! deletes once its delegate returns. `FileStore::move_into` relocates that
//! file into a named slot, replacing whatever was there. Names are single
//! path components; anything that could escape the store's root is refused.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

pub trait FileStore: Send + Sync {
    /// Move `from` into the slot `file_name`, overwriting an existing file. Returns the final location.
    fn move_into(&self, from: &Path, file_name: &str) -> io::Result<PathBuf>;

    /// Remove `file_name` if present. Absent files are not an error.
    fn remove(&self, file_name: &str) -> io::Result<()>;

    fn exists(&self, file_name: &str) -> bool;
}

/// A `FileStore` rooted at a directory, created on first use.
#[derive(Debug, Clone)]
pub struct DirectoryFileStore {
    root: PathBuf,
}

impl DirectoryFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of `file_name` inside the store.
    pub fn path_for(&self, file_name: &str) -> io::Result<PathBuf> {
        let mut components = Path::new(file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(file_name)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file name {file_name:?}"),
            )),
        }
    }
}

impl FileStore for DirectoryFileStore {
    fn move_into(&self, from: &Path, file_name: &str) -> io::Result<PathBuf> {
        let destination = self.path_for(file_name)?;
        fs::create_dir_all(&self.root)?;
        if destination.exists() {
            fs::remove_file(&destination)?;
        }
        if let Err(e) = fs::rename(from, &destination) {
            // rename cannot cross filesystems; the transport's temp dir may live elsewhere
            debug!("rename of {} failed ({e}), copying instead", from.display());
            fs::copy(from, &destination)?;
            fs::remove_file(from)?;
        }
        Ok(destination)
    }

    fn remove(&self, file_name: &str) -> io::Result<()> {
        let destination = self.path_for(file_name)?;
        match fs::remove_file(&destination) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn exists(&self, file_name: &str) -> bool {
        self.path_for(file_name).map(|path| path.is_file()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn move_into_places_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirectoryFileStore::new(tmp.path().join("documents"));

        let first = temp_file(tmp.path(), "first.tmp", b"old");
        let placed = store.move_into(&first, "report.pdf").unwrap();
        assert_eq!(fs::read(&placed).unwrap(), b"old");
        assert!(!first.exists());

        let second = temp_file(tmp.path(), "second.tmp", b"PDF-DATA");
        let placed = store.move_into(&second, "report.pdf").unwrap();
        assert_eq!(fs::read(placed).unwrap(), b"PDF-DATA");
        assert!(store.exists("report.pdf"));
    }

    #[test]
    fn remove_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirectoryFileStore::new(tmp.path());
        let file = temp_file(tmp.path(), "x.tmp", b"x");
        store.move_into(&file, "x.bin").unwrap();

        store.remove("x.bin").unwrap();
        assert!(!store.exists("x.bin"));
        store.remove("x.bin").unwrap();
    }

    #[test]
    fn names_escaping_the_root_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirectoryFileStore::new(tmp.path());
        for name in ["../evil", "a/b", "", ".", "/etc/passwd"] {
            let err = store.path_for(name).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{name}");
            assert!(!store.exists(name));
        }
    }

    #[test]
    fn missing_source_fails_without_creating_the_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirectoryFileStore::new(tmp.path());
        assert!(store.move_into(&tmp.path().join("missing.tmp"), "report.pdf").is_err());
        assert!(!store.exists("report.pdf"));
    }
}

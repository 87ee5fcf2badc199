//! On-disk storage of original document bytes for history entries.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Highest numbered suffix tried before giving up on a name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes blobs into a single directory without ever overwriting a file.
#[derive(Debug, Clone)]
pub struct BlobStorage {
    directory: PathBuf,
}

impl BlobStorage {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Stores `content` as `{stem}{extension}`, falling back to
    /// `{stem}_2{extension}`, `{stem}_3{extension}` and so on when taken.
    pub fn store(
        &self,
        stem: &str,
        extension: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        self.ensure_directory()?;

        for counter in 1..=MAX_NAME_ATTEMPTS {
            let filename = if counter == 1 {
                format!("{}{}", stem, extension)
            } else {
                format!("{}_{}{}", stem, counter, extension)
            };
            let path = self.directory.join(&filename);

            // create_new fails if the file exists, so no existing blob is replaced.
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .and_then(|_| file.sync_all())
                        .map_err(|e| StorageError::WriteFile {
                            path: path.clone(),
                            source: e,
                        })?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::WriteFile { path, source: e }),
            }
        }

        Err(StorageError::NameExhausted(format!("{}{}", stem, extension)))
    }

    pub fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        std::fs::read(path).map_err(|e| StorageError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Removes a blob; a missing file is not an error.
    pub fn remove(&self, path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveFile {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    fn ensure_directory(&self) -> Result<(), StorageError> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|e| {
                StorageError::CreateDirectory {
                    path: self.directory.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_creates_directory_and_file() {
        let temp = TempDir::new().unwrap();
        let storage = BlobStorage::new(temp.path().join("blobs"));

        let path = storage.store("abc", ".pdf", b"%PDF").unwrap();
        assert_eq!(path, temp.path().join("blobs").join("abc.pdf"));
        assert_eq!(storage.read(&path).unwrap(), b"%PDF");
    }

    #[test]
    fn test_store_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let storage = BlobStorage::new(temp.path());

        let first = storage.store("abc", ".png", b"one").unwrap();
        let second = storage.store("abc", ".png", b"two").unwrap();
        let third = storage.store("abc", "", b"three").unwrap();

        assert_ne!(first, second);
        assert!(second.ends_with("abc_2.png"));
        assert!(third.ends_with("abc"));
        assert_eq!(storage.read(&first).unwrap(), b"one");
        assert_eq!(storage.read(&second).unwrap(), b"two");
    }

    #[test]
    fn test_remove_is_tolerant_of_missing_files() {
        let temp = TempDir::new().unwrap();
        let storage = BlobStorage::new(temp.path());
        let path = storage.store("gone", ".pdf", b"x").unwrap();

        storage.remove(&path).unwrap();
        assert!(!path.exists());
        storage.remove(&path).unwrap();
    }
}

use std::future::Future;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;

use crate::{ByteSource, TransferError};

/// Fallback for names whose extension has no known MIME type.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// Maps a file name to a MIME type string using its extension.
pub fn content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_owned()
}

/// A regular file in the upload directory, identified by its base name.
///
/// The size is read once when the file is resolved and is authoritative for
/// the rest of the request. Every [`ByteSource::open`] call opens a new,
/// independent file handle.
#[derive(Debug, Clone)]
pub struct StoredFile {
    name: String,
    path: PathBuf,
    byte_size: u64,
}

impl StoredFile {
    /// Looks up `name` inside `dir`. `name` must already be reduced to a
    /// base name. Anything that is not a regular file counts as not found.
    pub async fn resolve(dir: &Path, name: &str) -> Result<StoredFile, TransferError> {
        let path = dir.join(name);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| TransferError::NotFound)?;

        if !metadata.is_file() {
            return Err(TransferError::NotFound);
        }

        Ok(StoredFile {
            name: name.to_owned(),
            path,
            byte_size: metadata.len(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> String {
        content_type(&self.name)
    }
}

impl ByteSource for StoredFile {
    type Reader = File;

    fn byte_size(&self) -> u64 {
        self.byte_size
    }

    fn open(&self) -> impl Future<Output = io::Result<File>> + Send {
        File::open(self.path.clone())
    }
}

/// In-memory [`ByteSource`], each reader is a cursor over a shared buffer.
#[derive(Debug, Clone)]
pub struct InMemory(pub Bytes);

impl ByteSource for InMemory {
    type Reader = Cursor<Bytes>;

    fn byte_size(&self) -> u64 {
        self.0.len() as u64
    }

    fn open(&self) -> impl Future<Output = io::Result<Cursor<Bytes>>> + Send {
        std::future::ready(Ok(Cursor::new(self.0.clone())))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use assert_matches::assert_matches;
    use tokio::io::AsyncReadExt;

    use crate::{ByteSource, TransferError};

    use super::{content_type, StoredFile, DEFAULT_CONTENT_TYPE};

    #[tokio::test]
    async fn test_file_size() {
        let file = StoredFile::resolve(Path::new("test"), "fixture.txt").await.unwrap();
        assert_eq!(54, file.byte_size());
        assert_eq!("fixture.txt", file.name());
        assert_eq!("text/plain", file.content_type());
    }

    #[tokio::test]
    async fn test_open_is_independent() {
        let file = StoredFile::resolve(Path::new("test"), "fixture.txt").await.unwrap();

        let mut first = file.open().await.unwrap();
        let mut head = [0u8; 5];
        first.read_exact(&mut head).await.unwrap();

        let mut second = String::new();
        file.open().await.unwrap().read_to_string(&mut second).await.unwrap();

        assert_eq!(b"Hello", &head);
        assert_eq!("Hello world this is a file to test range requests on!\n", second);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = StoredFile::resolve(Path::new("test"), "no-such-file.bin").await.unwrap_err();
        assert_matches!(err, TransferError::NotFound);
    }

    #[tokio::test]
    async fn test_directory_is_not_found() {
        let err = StoredFile::resolve(Path::new("."), "test").await.unwrap_err();
        assert_matches!(err, TransferError::NotFound);
    }

    #[test]
    fn test_content_type() {
        assert_eq!("text/html", content_type("index.html"));
        assert_eq!("image/png", content_type("cat.png"));
        assert_eq!(DEFAULT_CONTENT_TYPE, content_type("README"));
        assert_eq!(DEFAULT_CONTENT_TYPE, content_type("blob.zzzunknown"));
    }
}

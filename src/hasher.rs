use std::fs::File;
use std::io::Read;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use camino::Utf8Path;
use md5::Md5;
use sha1::{Digest, Sha1};

use crate::error::RetrieverError;

const READ_BUFFER_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigestRequest {
    pub md5: bool,
    pub sha1: bool,
}

impl DigestRequest {
    pub fn is_empty(&self) -> bool {
        !self.md5 && !self.sha1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileDigests {
    pub md5: Option<String>,
    pub md5_base64: Option<String>,
    pub sha1: Option<String>,
}

pub trait HashComputer {
    /// Hashes the whole file. `on_bytes` receives the size of every chunk read.
    fn compute(
        &self,
        path: &Utf8Path,
        request: DigestRequest,
        on_bytes: &mut dyn FnMut(u64),
    ) -> Result<FileDigests, RetrieverError>;
}

#[derive(Debug, Clone)]
pub struct StreamingHasher {
    buffer_bytes: usize,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            buffer_bytes: READ_BUFFER_BYTES,
        }
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl HashComputer for StreamingHasher {
    fn compute(
        &self,
        path: &Utf8Path,
        request: DigestRequest,
        on_bytes: &mut dyn FnMut(u64),
    ) -> Result<FileDigests, RetrieverError> {
        let hashing_error = |err: std::io::Error| RetrieverError::Hashing {
            path: path.to_string(),
            message: err.to_string(),
        };
        let mut file = File::open(path.as_std_path()).map_err(hashing_error)?;
        let mut md5 = request.md5.then(Md5::new);
        let mut sha1 = request.sha1.then(Sha1::new);
        let mut buffer = vec![0u8; self.buffer_bytes];

        loop {
            let read = file.read(&mut buffer).map_err(hashing_error)?;
            if read == 0 {
                break;
            }
            let chunk = &buffer[..read];
            if let Some(hasher) = md5.as_mut() {
                hasher.update(chunk);
            }
            if let Some(hasher) = sha1.as_mut() {
                hasher.update(chunk);
            }
            on_bytes(read as u64);
        }

        let (md5, md5_base64) = match md5 {
            Some(hasher) => {
                let raw = hasher.finalize();
                (Some(hex::encode(&raw)), Some(BASE64.encode(&raw)))
            }
            None => (None, None),
        };
        Ok(FileDigests {
            md5,
            md5_base64,
            sha1: sha1.map(|hasher| hex::encode(hasher.finalize())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("abc.raw");
        std::fs::write(&path, b"abc").unwrap();
        let path = Utf8Path::from_path(&path).unwrap();

        let mut seen = 0u64;
        let digests = StreamingHasher { buffer_bytes: 2 }
            .compute(path, DigestRequest { md5: true, sha1: true }, &mut |bytes: u64| seen += bytes)
            .unwrap();

        assert_eq!(seen, 3);
        assert_eq!(digests.md5.as_deref(), Some("900150983cd24fb0d6963f7d28e17f72"));
        assert_eq!(digests.md5_base64.as_deref(), Some("kAFQmDzST7DWlj99KOF/cg=="));
        assert_eq!(
            digests.sha1.as_deref(),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
    }

    #[test]
    fn only_requested_digests() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("empty.raw");
        std::fs::write(&path, b"").unwrap();
        let path = Utf8Path::from_path(&path).unwrap();

        let digests = StreamingHasher::new()
            .compute(path, DigestRequest { md5: false, sha1: true }, &mut |_: u64| {})
            .unwrap();
        assert_eq!(digests.md5, None);
        assert_eq!(
            digests.sha1.as_deref(),
            Some("da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
    }

    #[test]
    fn missing_file_is_hashing_error() {
        let err = StreamingHasher::new()
            .compute(
                Utf8Path::new("/nonexistent/dataset-retriever/file.raw"),
                DigestRequest { md5: true, sha1: true },
                &mut |_: u64| {},
            )
            .unwrap_err();
        assert!(matches!(err, RetrieverError::Hashing { .. }));
    }
}

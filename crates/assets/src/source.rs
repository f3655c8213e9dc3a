use crate::error::AssetError;
use crate::worker::unblock;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::{Path, PathBuf};

/// Raw bytes of a fetched asset plus a content digest for logging.
#[derive(Debug, Clone)]
pub struct AssetBytes {
    pub path: String,
    pub bytes: Vec<u8>,
    pub digest: u64,
}

impl AssetBytes {
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let digest = content_digest(&bytes);
        Self {
            path: path.into(),
            bytes,
            digest,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// First eight bytes of the SHA-256 of the content, little-endian.
fn content_digest(bytes: &[u8]) -> u64 {
    let hash = Sha256::digest(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(head)
}

/// Somewhere asset bytes can be fetched from by relative path.
///
/// Fetches are asynchronous so the load pipeline can interleave independent
/// stages; completion order is up to the source.
pub trait AssetSource {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<AssetBytes, AssetError>>;
}

/// Reads assets from a directory on disk. Each read runs on its own worker
/// thread so concurrent fetches overlap.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl AssetSource for FsSource {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<AssetBytes, AssetError>> {
        let full = self.resolve(path);
        let path = path.to_string();
        async move {
            let bytes = unblock(&path, move || {
                std::fs::read(&full).map_err(|source| AssetError::Io {
                    path: full.display().to_string(),
                    source,
                })
            })
            .await?;
            tracing::debug!(path = %path, bytes = bytes.len(), "fetched asset");
            Ok(AssetBytes::new(path, bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_content_addressed() {
        let a = AssetBytes::new("a.bin", vec![1, 2, 3]);
        let b = AssetBytes::new("b.bin", vec![1, 2, 3]);
        let c = AssetBytes::new("a.bin", vec![3, 2, 1]);
        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn fs_source_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("environment.hdr"), b"radiance").unwrap();

        let source = FsSource::new(dir.path());
        let asset = pollster::block_on(source.fetch("environment.hdr")).unwrap();
        assert_eq!(asset.bytes, b"radiance");
        assert_eq!(asset.path, "environment.hdr");
    }

    #[test]
    fn fs_source_fetches_overlap() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), vec![1u8; 4096]).unwrap();
        std::fs::write(dir.path().join("b.bin"), vec![2u8; 16]).unwrap();

        let source = FsSource::new(dir.path());
        let (a, b) = pollster::block_on(async {
            futures::join!(source.fetch("a.bin"), source.fetch("b.bin"))
        });
        assert_eq!(a.unwrap().len(), 4096);
        assert_eq!(b.unwrap().bytes, vec![2u8; 16]);
    }

    #[test]
    fn fs_source_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsSource::new(dir.path());
        let err = pollster::block_on(source.fetch("missing.glb")).unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
        assert!(err.to_string().contains("missing.glb"));
    }
}

//! Persistent cache spill.
//!
//! Layout: `<cache-dir>/<first-2-hex>/<fingerprint-hex>`. Each file carries a
//! header (format version, fingerprint, artifact checksum, sizes), the
//! diagnostics JSON, then the artifact bytes. Writes go through a temp file
//! and an atomic rename. Corruption on load removes the entry and reads as
//! a miss.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::fingerprint::{Fingerprint, hash_bytes};
use crate::core::Diagnostic;

/// Format magic + version. Bump on layout change.
const MAGIC: &[u8; 8] = b"TMPLARC1";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt cache entry {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Open (and create) the backing directory.
    pub fn open(dir: PathBuf) -> Result<Self, CacheError> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(fingerprint.shard()).join(fingerprint.to_hex())
    }

    /// Write an entry atomically. Idempotent: an existing entry is kept.
    pub fn store(
        &self,
        fingerprint: &Fingerprint,
        artifact: &[u8],
        diagnostics: &[Diagnostic],
    ) -> Result<(), CacheError> {
        let path = self.entry_path(fingerprint);
        if path.exists() {
            return Ok(());
        }

        let shard = path.parent().expect("entry path has a shard parent");
        fs::create_dir_all(shard)?;

        let diag_json = serde_json::to_vec(diagnostics)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp = shard.join(format!(".{}.tmp", fingerprint.to_hex()));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(MAGIC)?;
            file.write_all(fingerprint.as_bytes())?;
            file.write_all(hash_bytes(artifact).as_bytes())?;
            file.write_all(&(artifact.len() as u64).to_le_bytes())?;
            file.write_all(&(diag_json.len() as u32).to_le_bytes())?;
            file.write_all(&diag_json)?;
            file.write_all(artifact)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load an entry. Corruption removes the file and reports `Corrupt`.
    pub fn load(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<(Vec<u8>, Vec<Diagnostic>)>, CacheError> {
        let path = self.entry_path(fingerprint);
        if !path.exists() {
            return Ok(None);
        }

        match self.read_entry(&path, fingerprint) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                let _ = fs::remove_file(&path);
                Err(e)
            }
        }
    }

    fn read_entry(
        &self,
        path: &Path,
        fingerprint: &Fingerprint,
    ) -> Result<(Vec<u8>, Vec<Diagnostic>), CacheError> {
        let corrupt = |reason: &str| CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let mut file = fs::File::open(path)?;

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic).map_err(|_| corrupt("truncated header"))?;
        if &magic != MAGIC {
            return Err(corrupt("unknown format version"));
        }

        let mut fp = [0u8; 32];
        file.read_exact(&mut fp).map_err(|_| corrupt("truncated fingerprint"))?;
        if Fingerprint::from_bytes(fp) != *fingerprint {
            return Err(corrupt("fingerprint mismatch"));
        }

        let mut checksum = [0u8; 32];
        file.read_exact(&mut checksum)
            .map_err(|_| corrupt("truncated checksum"))?;

        let mut len8 = [0u8; 8];
        file.read_exact(&mut len8).map_err(|_| corrupt("truncated sizes"))?;
        let artifact_len = u64::from_le_bytes(len8) as usize;

        let mut len4 = [0u8; 4];
        file.read_exact(&mut len4).map_err(|_| corrupt("truncated sizes"))?;
        let diag_len = u32::from_le_bytes(len4) as usize;

        let mut diag_json = vec![0u8; diag_len];
        file.read_exact(&mut diag_json)
            .map_err(|_| corrupt("truncated diagnostics"))?;

        let mut artifact = vec![0u8; artifact_len];
        file.read_exact(&mut artifact)
            .map_err(|_| corrupt("truncated artifact"))?;

        if hash_bytes(&artifact).as_bytes() != &checksum {
            return Err(corrupt("artifact checksum mismatch"));
        }

        let diagnostics: Vec<Diagnostic> = serde_json::from_slice(&diag_json)
            .map_err(|_| corrupt("unreadable diagnostics"))?;

        Ok((artifact, diagnostics))
    }

    /// Remove an entry (used by eviction with a configured backing dir).
    pub fn remove(&self, fingerprint: &Fingerprint) {
        let _ = fs::remove_file(self.entry_path(fingerprint));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fp(n: u8) -> Fingerprint {
        Fingerprint::from_bytes([n; 32])
    }

    #[test]
    fn test_store_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path().to_path_buf()).unwrap();

        let diags = vec![Diagnostic::warning("a.templ", 1, 2, "w")];
        cache.store(&fp(1), b"artifact bytes", &diags).unwrap();

        let (artifact, loaded) = cache.load(&fp(1)).unwrap().unwrap();
        assert_eq!(artifact, b"artifact bytes");
        assert_eq!(loaded, diags);
    }

    #[test]
    fn test_missing_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path().to_path_buf()).unwrap();
        assert!(cache.load(&fp(2)).unwrap().is_none());
    }

    #[test]
    fn test_store_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path().to_path_buf()).unwrap();

        cache.store(&fp(3), b"first", &[]).unwrap();
        cache.store(&fp(3), b"second", &[]).unwrap();

        let (artifact, _) = cache.load(&fp(3)).unwrap().unwrap();
        assert_eq!(artifact, b"first");
    }

    #[test]
    fn test_truncated_entry_is_removed() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path().to_path_buf()).unwrap();

        cache.store(&fp(4), b"some artifact", &[]).unwrap();
        let path = cache.entry_path(&fp(4));
        let full = fs::read(&path).unwrap();
        fs::write(&path, &full[..full.len() - 4]).unwrap();

        assert!(matches!(
            cache.load(&fp(4)),
            Err(CacheError::Corrupt { .. })
        ));
        // Entry removed: subsequent load is a clean miss.
        assert!(cache.load(&fp(4)).unwrap().is_none());
    }

    #[test]
    fn test_flipped_artifact_byte_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path().to_path_buf()).unwrap();

        cache.store(&fp(5), b"payload", &[]).unwrap();
        let path = cache.entry_path(&fp(5));
        let mut full = fs::read(&path).unwrap();
        let last = full.len() - 1;
        full[last] ^= 0xff;
        fs::write(&path, &full).unwrap();

        assert!(matches!(
            cache.load(&fp(5)),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_shard_layout() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path().to_path_buf()).unwrap();
        cache.store(&fp(0xab), b"x", &[]).unwrap();

        let expected = dir.path().join("ab").join(fp(0xab).to_hex());
        assert!(expected.is_file());
    }
}

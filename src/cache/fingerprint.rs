//! Content hashing with blake3.
//!
//! Two distinct types: `ContentHash` identifies raw file content,
//! `Fingerprint` identifies a complete build input (source bytes, generator
//! version, generator flags).

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// A hash representing "no content" (all zeros).
    #[inline]
    pub const fn empty() -> Self {
        Self([0; 32])
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 32]
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 16 hex chars for brevity
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Hash a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::new(*blake3::hash(bytes).as_bytes())
}

/// Hash file contents. Returns the empty hash when the file is unreadable.
pub fn hash_file(path: &Path) -> ContentHash {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return ContentHash::empty(),
    };

    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return ContentHash::empty(),
        }
    }

    ContentHash::new(*hasher.finalize().as_bytes())
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Cryptographic identity of a cacheable build input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// fingerprint = blake3(source bytes ∥ generator version ∥ flags),
    /// with length prefixes so field boundaries cannot alias.
    pub fn compute(source: &[u8], generator_version: &str, flags: &[String]) -> Self {
        let mut hasher = blake3::Hasher::new();

        hasher.update(&(source.len() as u64).to_le_bytes());
        hasher.update(source);

        let version = generator_version.as_bytes();
        hasher.update(&(version.len() as u64).to_le_bytes());
        hasher.update(version);

        hasher.update(&(flags.len() as u64).to_le_bytes());
        for flag in flags {
            hasher.update(&(flag.len() as u64).to_le_bytes());
            hasher.update(flag.as_bytes());
        }

        Self(*hasher.finalize().as_bytes())
    }

    #[inline]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// First two hex characters, used as the on-disk shard directory.
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_display() {
        let hash = ContentHash::new([0xab; 32]);
        assert_eq!(format!("{}", hash), "abababababababab");
    }

    #[test]
    fn test_hash_file_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.templ");
        fs::write(&path, "templ Button(text string) {}").unwrap();

        let hash1 = hash_file(&path);
        let hash2 = hash_file(&path);
        assert_eq!(hash1, hash2);
        assert!(!hash1.is_empty());

        fs::write(&path, "templ Button(label string) {}").unwrap();
        assert_ne!(hash1, hash_file(&path));
    }

    #[test]
    fn test_hash_file_nonexistent_is_empty() {
        assert!(hash_file(Path::new("/nonexistent/file.templ")).is_empty());
    }

    #[test]
    fn test_fingerprint_sensitive_to_every_input() {
        let base = Fingerprint::compute(b"src", "v1.0", &["-f".to_string()]);

        assert_ne!(base, Fingerprint::compute(b"src2", "v1.0", &["-f".to_string()]));
        assert_ne!(base, Fingerprint::compute(b"src", "v1.1", &["-f".to_string()]));
        assert_ne!(base, Fingerprint::compute(b"src", "v1.0", &["-g".to_string()]));
        assert_eq!(base, Fingerprint::compute(b"src", "v1.0", &["-f".to_string()]));
    }

    #[test]
    fn test_fingerprint_field_boundaries_do_not_alias() {
        // ("ab", "c") vs ("a", "bc") must differ
        let a = Fingerprint::compute(b"ab", "c", &[]);
        let b = Fingerprint::compute(b"a", "bc", &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_hex_roundtrip() {
        let fp = Fingerprint::compute(b"src", "v1", &[]);
        let back = Fingerprint::from_hex(&fp.to_hex()).unwrap();
        assert_eq!(fp, back);
    }

    #[test]
    fn test_shard_is_first_byte() {
        let fp = Fingerprint::from_bytes([0xab; 32]);
        assert_eq!(fp.shard(), "ab");
    }
}

//! Component record and name validation.

use std::path::PathBuf;
use std::time::SystemTime;

use smallvec::SmallVec;
use thiserror::Error;

use crate::cache::{ContentHash, Fingerprint};

/// Maximum component name length.
pub const MAX_NAME_LEN: usize = 100;

/// Characters a component name must never contain: path separators plus the
/// shell metacharacter set rejected by command validation.
const NAME_FORBIDDEN: &[char] = &[
    '/', '\\', ';', '&', '|', '$', '`', '(', ')', '{', '}', '[', ']', '<', '>', '"', '\'', ' ',
    '\t', '\n',
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("component name is empty")]
    Empty,

    #[error("component name is {0} characters (max {MAX_NAME_LEN})")]
    TooLong(usize),

    #[error("component name contains forbidden character `{0}`")]
    ForbiddenCharacter(char),
}

/// Validate a component name (also applied to the `{name}` route parameter).
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(NameError::TooLong(len));
    }
    if let Some(c) = name.chars().find(|c| NAME_FORBIDDEN.contains(c)) {
        return Err(NameError::ForbiddenCharacter(c));
    }
    Ok(())
}

/// One declared render-function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Declared type as raw token text (e.g. `[]string`, `map[string]int`).
    pub ty: String,
    /// Default literal, when declared (`= "hi"`).
    pub default: Option<String>,
    pub variadic: bool,
    pub pointer: bool,
    pub optional: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: None,
            variadic: false,
            pointer: false,
            optional: false,
        }
    }
}

/// An addressable render unit parsed from a component file.
#[derive(Debug, Clone)]
pub struct Component {
    /// Logical name, unique within the registry.
    pub name: String,
    /// Originating file, rooted within a configured scan path.
    pub path: PathBuf,
    /// Package/namespace declaration of the file.
    pub package: String,
    /// Ordered parameter list.
    pub params: SmallVec<[Parameter; 4]>,
    /// Referenced component names (may be unresolved).
    pub dependencies: Vec<String>,
    /// Source file mtime at scan time.
    pub modified: SystemTime,
    /// Source content hash at scan time.
    pub hash: ContentHash,
    /// Set when the last build attempt failed; cleared on the next change.
    pub unbuildable: bool,
    /// Fingerprint of the last successful build, for serving stale artifacts
    /// while a newer build is broken.
    pub last_good: Option<Fingerprint>,
}

impl Component {
    pub fn new(name: impl Into<String>, path: PathBuf, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path,
            package: package.into(),
            params: SmallVec::new(),
            dependencies: Vec::new(),
            modified: SystemTime::UNIX_EPOCH,
            hash: ContentHash::empty(),
            unbuildable: false,
            last_good: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("Button").is_ok());
        assert!(validate_name("user_card2").is_ok());
        assert!(validate_name(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn test_boundary_length() {
        assert!(validate_name(&"x".repeat(100)).is_ok());
        assert_eq!(
            validate_name(&"x".repeat(101)),
            Err(NameError::TooLong(101))
        );
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(validate_name(""), Err(NameError::Empty));
    }

    #[test]
    fn test_path_separators_rejected() {
        assert_eq!(
            validate_name("a/b"),
            Err(NameError::ForbiddenCharacter('/'))
        );
        assert_eq!(
            validate_name("a\\b"),
            Err(NameError::ForbiddenCharacter('\\'))
        );
    }

    #[test]
    fn test_shell_metacharacters_rejected() {
        for name in ["a;b", "a|b", "a$b", "a`b", "a(b", "a<b", "a\"b"] {
            assert!(validate_name(name).is_err(), "{name} should be rejected");
        }
    }
}

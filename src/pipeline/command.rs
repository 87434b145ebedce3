//! Generator command validation.
//!
//! The configured build command is split into argv tokens and never passed
//! through a shell. Validation still rejects anything that could change
//! meaning if a misconfigured generator re-interprets its arguments.

use std::path::Path;

use thiserror::Error;

/// Safe prefixes for absolute path arguments.
const SAFE_ABSOLUTE_PREFIXES: &[&str] = &["/tmp/", "/usr/"];

/// git subcommands permitted under the allowlist (read-only).
const GIT_READ_ONLY: &[&str] = &["status", "diff", "log", "show", "ls-files"];

/// Characters that must never appear in command arguments.
const FORBIDDEN: &[char] = &[
    ';', '&', '|', '$', '`', '(', ')', '{', '}', '[', ']', '<', '>', '"', '\'', '\\',
];

/// Rejected generator invocation. Fatal for the build task; a startup-time
/// rejection is a ConfigError.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCommand {
    #[error("command is empty")]
    Empty,

    #[error("`{0}` is not a recognized generator executable")]
    HeadNotAllowed(String),

    #[error("git is restricted to read-only subcommands, got `{0}`")]
    GitWrite(String),

    #[error("argument `{0}` contains a forbidden character `{1}`")]
    ForbiddenCharacter(String, char),

    #[error("argument `{0}` contains a `..` path segment")]
    ParentTraversal(String),

    #[error("absolute path `{0}` is outside the safe prefixes")]
    UnsafeAbsolutePath(String),
}

/// Validate a full argv (head + arguments) against the allowlist.
pub fn validate_command(tokens: &[String], allowlist: &[String]) -> Result<(), InvalidCommand> {
    let Some(head) = tokens.first() else {
        return Err(InvalidCommand::Empty);
    };

    validate_head(head, allowlist)?;

    if head_name(head) == "git" {
        match tokens.get(1) {
            Some(sub) if GIT_READ_ONLY.contains(&sub.as_str()) => {}
            Some(sub) => return Err(InvalidCommand::GitWrite(sub.clone())),
            None => return Err(InvalidCommand::GitWrite(String::new())),
        }
    }

    for arg in &tokens[1..] {
        validate_argument(arg)?;
    }

    Ok(())
}

/// Validate a single argument string.
pub fn validate_argument(arg: &str) -> Result<(), InvalidCommand> {
    if let Some(c) = arg.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(InvalidCommand::ForbiddenCharacter(arg.to_string(), c));
    }

    if Path::new(arg)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(InvalidCommand::ParentTraversal(arg.to_string()));
    }

    if arg.starts_with('/') && !SAFE_ABSOLUTE_PREFIXES.iter().any(|p| arg.starts_with(p)) {
        return Err(InvalidCommand::UnsafeAbsolutePath(arg.to_string()));
    }

    Ok(())
}

/// The head token must itself be clean and resolve to an allowlisted name.
fn validate_head(head: &str, allowlist: &[String]) -> Result<(), InvalidCommand> {
    if let Some(c) = head.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(InvalidCommand::ForbiddenCharacter(head.to_string(), c));
    }

    let name = head_name(head);
    if name.is_empty() || !allowlist.iter().any(|a| a == name) {
        return Err(InvalidCommand::HeadNotAllowed(head.to_string()));
    }

    if head.starts_with('/') && !SAFE_ABSOLUTE_PREFIXES.iter().any(|p| head.starts_with(p)) {
        return Err(InvalidCommand::UnsafeAbsolutePath(head.to_string()));
    }

    Ok(())
}

/// Basename of the head token (allows `/usr/bin/templ`).
fn head_name(head: &str) -> &str {
    Path::new(head)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
}

/// Resolve the executable for an allowlisted head, if present on PATH.
pub fn resolve_executable(head: &str) -> Option<std::path::PathBuf> {
    which::which(head).ok()
}

//! Generator output parsing.
//!
//! Diagnostics follow the conventional `file:line:column: severity: message`
//! shape. Lines that do not match are collected into a trailing free-form
//! diagnostic so nothing the generator printed is lost.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::{Diagnostic, Severity};

/// `file:line:column: severity: message`
fn line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?P<col>\d+):\s*(?P<sev>error|warning|note|info)?\s*:?\s*(?P<msg>.+)$")
            .expect("diagnostic regex is valid")
    })
}

/// Parse combined generator output (stdout + stderr) into diagnostics.
pub fn parse_output(output: &str, fallback_file: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut unmatched = Vec::new();

    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = line_pattern().captures(line) {
            let severity = caps
                .name("sev")
                .map(|m| Severity::parse(m.as_str()))
                .unwrap_or(Severity::Error);
            diagnostics.push(Diagnostic {
                severity,
                file: caps["file"].to_string(),
                line: caps["line"].parse().unwrap_or(0),
                column: caps["col"].parse().unwrap_or(0),
                message: caps["msg"].trim().to_string(),
            });
        } else {
            unmatched.push(line);
        }
    }

    // Keep unmatched output visible, attached to the source file.
    if diagnostics.is_empty() && !unmatched.is_empty() {
        diagnostics.push(Diagnostic::error(
            fallback_file,
            0,
            0,
            unmatched.join("\n"),
        ));
    }

    diagnostics
}

/// Whether any diagnostic is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

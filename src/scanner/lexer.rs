//! Lexical extraction from component source files.
//!
//! Recovers exactly what the registry needs: the package declaration, each
//! `templ Name(params)` declaration, and the `@Name` component references in
//! bodies. No semantic analysis; the external generator is the source of
//! truth for validity.

use crate::core::Diagnostic;

/// One component declaration, lexically extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDecl {
    pub name: String,
    pub line: u32,
    pub column: u32,
    /// Raw text between the declaration's parentheses.
    pub params_src: String,
    /// `@Name` references in the body, in order of appearance, deduplicated.
    pub references: Vec<String>,
}

/// Result of lexing one file.
#[derive(Debug, Default)]
pub struct LexOutput {
    pub package: String,
    pub decls: Vec<RawDecl>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Character cursor with line/column tracking.
struct Cursor<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Skip whitespace and comments. Returns false at end of input.
    fn skip_trivia(&mut self) -> bool {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek2() == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek2() == Some(b'*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => break,
                            Some(b'*') if self.peek2() == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                Some(_) => return true,
                None => return false,
            }
        }
    }

    /// Skip over a string literal; the opening quote is current.
    fn skip_string(&mut self) {
        let quote = self.bump().expect("caller saw a quote");
        while let Some(b) = self.bump() {
            if b == b'\\' && quote != b'`' {
                self.bump();
            } else if b == quote {
                break;
            }
        }
    }

    /// Read an identifier ([A-Za-z_][A-Za-z0-9_]*); empty if none.
    fn read_ident(&mut self) -> String {
        let start = self.pos;
        if matches!(self.peek(), Some(b) if b == b'_' || b.is_ascii_alphabetic()) {
            self.bump();
            while matches!(self.peek(), Some(b) if b == b'_' || b.is_ascii_alphanumeric()) {
                self.bump();
            }
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }
}

/// Lex a component source file.
pub fn lex(source: &str, file: &str) -> LexOutput {
    let mut out = LexOutput::default();
    let mut cursor = Cursor::new(source);

    while cursor.skip_trivia() {
        let line = cursor.line;
        let column = cursor.column;
        let word = cursor.read_ident();

        match word.as_str() {
            "package" => {
                cursor.skip_trivia();
                let name = cursor.read_ident();
                if name.is_empty() {
                    out.diagnostics.push(Diagnostic::error(
                        file,
                        line,
                        column,
                        "package declaration without a name",
                    ));
                } else if out.package.is_empty() {
                    out.package = name;
                }
            }
            "templ" => match lex_decl(&mut cursor, file, line, column) {
                Ok(decl) => out.decls.push(decl),
                Err(diag) => {
                    out.diagnostics.push(diag);
                    // Recover at the next plausible declaration.
                    skip_to_next_decl(&mut cursor);
                }
            },
            "" => {
                // Not an identifier start: strings and braces are skipped so
                // `templ` inside literals never matches.
                match cursor.peek() {
                    Some(b'"') | Some(b'\'') | Some(b'`') => cursor.skip_string(),
                    Some(b'{') => skip_block(&mut cursor, &mut Vec::new()),
                    _ => {
                        cursor.bump();
                    }
                }
            }
            _ => {}
        }
    }

    if out.package.is_empty() && !out.decls.is_empty() {
        out.diagnostics.push(Diagnostic::warning(
            file,
            1,
            1,
            "missing package declaration",
        ));
    }

    out
}

/// Lex one declaration after the `templ` keyword.
fn lex_decl(cursor: &mut Cursor, file: &str, line: u32, column: u32) -> Result<RawDecl, Diagnostic> {
    cursor.skip_trivia();
    let name_line = cursor.line;
    let name_column = cursor.column;
    let name = cursor.read_ident();
    if name.is_empty() {
        return Err(Diagnostic::error(
            file,
            line,
            column,
            "`templ` without a component name",
        ));
    }

    cursor.skip_trivia();
    if cursor.peek() != Some(b'(') {
        return Err(Diagnostic::error(
            file,
            name_line,
            name_column,
            format!("component `{name}` is missing its parameter list"),
        ));
    }
    cursor.bump();

    let params_src = read_params(cursor).ok_or_else(|| {
        Diagnostic::error(
            file,
            name_line,
            name_column,
            format!("unterminated parameter list for `{name}`"),
        )
    })?;

    cursor.skip_trivia();
    let mut references = Vec::new();
    if cursor.peek() == Some(b'{') {
        skip_block(cursor, &mut references);
    }

    Ok(RawDecl {
        name,
        line: name_line,
        column: name_column,
        params_src,
        references,
    })
}

/// Read up to the matching `)`; nested brackets and strings are respected.
fn read_params(cursor: &mut Cursor) -> Option<String> {
    let start = cursor.pos;
    let mut depth = 1usize;

    loop {
        match cursor.peek()? {
            b'"' | b'\'' | b'`' => cursor.skip_string(),
            b'(' => {
                depth += 1;
                cursor.bump();
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    let text =
                        String::from_utf8_lossy(&cursor.src[start..cursor.pos]).into_owned();
                    cursor.bump();
                    return Some(text);
                }
                cursor.bump();
            }
            _ => {
                cursor.bump();
            }
        }
    }
}

/// Skip a `{ ... }` block, collecting `@Name` component references.
/// The opening brace is current.
fn skip_block(cursor: &mut Cursor, references: &mut Vec<String>) {
    debug_assert_eq!(cursor.peek(), Some(b'{'));
    cursor.bump();
    let mut depth = 1usize;

    while depth > 0 {
        match cursor.peek() {
            None => return,
            Some(b'"') | Some(b'\'') | Some(b'`') => cursor.skip_string(),
            Some(b'/') if cursor.peek2() == Some(b'/') => {
                while let Some(b) = cursor.peek() {
                    if b == b'\n' {
                        break;
                    }
                    cursor.bump();
                }
            }
            Some(b'{') => {
                depth += 1;
                cursor.bump();
            }
            Some(b'}') => {
                depth -= 1;
                cursor.bump();
            }
            Some(b'@') => {
                // Invocation marker: `@Name(...)` or `@pkg.Name(...)`.
                cursor.bump();
                let mut ident = cursor.read_ident();
                while cursor.peek() == Some(b'.') {
                    cursor.bump();
                    ident = cursor.read_ident();
                }
                if !ident.is_empty() && !references.iter().any(|r| r == &ident) {
                    references.push(ident);
                }
            }
            Some(_) => {
                cursor.bump();
            }
        }
    }
}

/// After a parse error, resume at the next `templ` keyword at column start.
fn skip_to_next_decl(cursor: &mut Cursor) {
    while !cursor.at_end() {
        if cursor.column == 1 {
            let save = cursor.pos;
            let word = cursor.read_ident();
            if word == "templ" {
                // Rewind so the main loop re-reads the keyword.
                cursor.pos = save;
                cursor.column = 1;
                return;
            }
        }
        cursor.bump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_and_single_decl() {
        let src = "package ui\n\ntempl Button(text string) {\n\t<button>{ text }</button>\n}\n";
        let out = lex(src, "button.templ");

        assert_eq!(out.package, "ui");
        assert_eq!(out.decls.len(), 1);
        assert_eq!(out.decls[0].name, "Button");
        assert_eq!(out.decls[0].params_src, "text string");
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_multiple_decls_per_file() {
        let src = "package ui\n\ntempl A() {}\n\ntempl B() {}\n";
        let out = lex(src, "f.templ");
        let names: Vec<&str> = out.decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);
    }

    #[test]
    fn test_component_references() {
        let src = "package ui\n\ntempl Card(title string) {\n\
                   \t@Header(title)\n\t<div>@Body()</div>\n\t@Header(title)\n}\n";
        let out = lex(src, "card.templ");

        assert_eq!(out.decls[0].references, ["Header", "Body"]);
    }

    #[test]
    fn test_qualified_reference_uses_last_segment() {
        let src = "package ui\n\ntempl X() {\n\t@widgets.Spinner()\n}\n";
        let out = lex(src, "x.templ");
        assert_eq!(out.decls[0].references, ["Spinner"]);
    }

    #[test]
    fn test_at_sign_in_string_is_not_a_reference() {
        let src = "package ui\n\ntempl Mail() {\n\t<a href=\"mailto:x@y.com\">@Icon()</a>\n}\n";
        let out = lex(src, "m.templ");
        assert_eq!(out.decls[0].references, ["Icon"]);
    }

    #[test]
    fn test_templ_keyword_inside_body_is_not_a_decl() {
        let src = "package ui\n\ntempl A() {\n\t<p>templ B() is not real</p>\n}\n";
        let out = lex(src, "a.templ");
        assert_eq!(out.decls.len(), 1);
    }

    #[test]
    fn test_nested_braces_in_body() {
        let src = "package ui\n\ntempl A() {\n\tif x { <p>{ y }</p> }\n\t@Inner()\n}\n";
        let out = lex(src, "a.templ");
        assert_eq!(out.decls[0].references, ["Inner"]);
    }

    #[test]
    fn test_missing_param_list_is_a_diagnostic_not_a_failure() {
        let src = "package ui\n\ntempl Broken {\n}\n\ntempl Fine() {}\n";
        let out = lex(src, "b.templ");

        assert_eq!(out.decls.len(), 1);
        assert_eq!(out.decls[0].name, "Fine");
        assert_eq!(out.diagnostics.len(), 1);
        assert!(out.diagnostics[0].message.contains("Broken"));
        assert!(out.diagnostics[0].line > 0);
    }

    #[test]
    fn test_unterminated_params_is_a_diagnostic() {
        let src = "package ui\n\ntempl Broken(text string {\n}\n";
        let out = lex(src, "b.templ");

        assert!(out.decls.is_empty());
        assert_eq!(out.diagnostics.len(), 1);
        assert!(out.diagnostics[0].message.contains("unterminated"));
    }

    #[test]
    fn test_params_with_nested_brackets_and_strings() {
        let src = "package ui\n\ntempl T(items []string, m map[string]int, s string = \"a,b)\") {}\n";
        let out = lex(src, "t.templ");

        assert_eq!(
            out.decls[0].params_src,
            "items []string, m map[string]int, s string = \"a,b)\""
        );
    }

    #[test]
    fn test_missing_package_warns() {
        let out = lex("templ A() {}\n", "a.templ");
        assert_eq!(out.decls.len(), 1);
        assert!(
            out.diagnostics
                .iter()
                .any(|d| d.message.contains("package"))
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let src = "package ui\n// templ NotReal()\n/* templ AlsoNot() */\ntempl Real() {}\n";
        let out = lex(src, "c.templ");
        assert_eq!(out.decls.len(), 1);
        assert_eq!(out.decls[0].name, "Real");
    }
}

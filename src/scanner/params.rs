//! Parameter list parsing.
//!
//! Splits the raw text between a declaration's parentheses on top-level
//! commas (respecting nested brackets and string literals), then parses each
//! piece as `name type`, `name? type`, or `name type = defaultLiteral`.
//! Variadic (`...T`) and pointer (`*T`) markers are preserved as flags with
//! the type kept as raw token text.

use crate::registry::Parameter;

/// Split on top-level commas.
pub fn split_params(src: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            '"' | '\'' | '`' => {
                current.push(c);
                let quote = c;
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == '\\' && quote != '`' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else if inner == quote {
                        break;
                    }
                }
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    let last = current.trim();
    if !last.is_empty() {
        parts.push(last.to_string());
    }
    parts.retain(|p| !p.is_empty());
    parts
}

/// Parse one parameter. Returns None for text with no name token.
pub fn parse_param(src: &str) -> Option<Parameter> {
    // Default literal: split on the first top-level '='.
    let (head, default) = split_default(src);

    let head = head.trim();
    let mut words = head.splitn(2, char::is_whitespace);
    let mut name = words.next()?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let mut optional = false;
    if let Some(stripped) = name.strip_suffix('?') {
        optional = true;
        name = stripped.to_string();
    }

    let mut ty = words.next().unwrap_or("").trim().to_string();

    let mut variadic = false;
    if let Some(stripped) = ty.strip_prefix("...") {
        variadic = true;
        ty = stripped.trim_start().to_string();
    }

    let mut pointer = false;
    if let Some(stripped) = ty.strip_prefix('*') {
        pointer = true;
        ty = stripped.trim_start().to_string();
    }

    let default = default.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    let optional = optional || default.is_some();

    Some(Parameter {
        name,
        ty,
        default,
        variadic,
        pointer,
        optional,
    })
}

/// Parse a full parameter list.
pub fn parse_params(src: &str) -> Vec<Parameter> {
    split_params(src).iter().filter_map(|p| parse_param(p)).collect()
}

/// Split `name type = literal` at the first '=' outside brackets/strings.
fn split_default(src: &str) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut prev = '\0';

    for (i, c) in src.char_indices() {
        if let Some(quote) = in_string {
            if c == quote && prev != '\\' {
                in_string = None;
            }
        } else {
            match c {
                '"' | '\'' | '`' => in_string = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                '=' if depth == 0 && prev != '=' && prev != '!' && prev != '<' && prev != '>' => {
                    return (&src[..i], Some(&src[i + 1..]));
                }
                _ => {}
            }
        }
        prev = c;
    }
    (src, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        assert_eq!(
            split_params("text string, count int"),
            ["text string", "count int"]
        );
    }

    #[test]
    fn test_split_respects_nested_brackets() {
        assert_eq!(
            split_params("m map[string]int, f func(a, b int) bool"),
            ["m map[string]int", "f func(a, b int) bool"]
        );
    }

    #[test]
    fn test_split_respects_string_literals() {
        assert_eq!(
            split_params(r#"sep string = ",", n int"#),
            [r#"sep string = ",""#, "n int"]
        );
    }

    #[test]
    fn test_split_empty() {
        assert!(split_params("").is_empty());
        assert!(split_params("   ").is_empty());
    }

    #[test]
    fn test_parse_name_and_type() {
        let p = parse_param("text string").unwrap();
        assert_eq!(p.name, "text");
        assert_eq!(p.ty, "string");
        assert!(p.default.is_none());
        assert!(!p.variadic && !p.pointer && !p.optional);
    }

    #[test]
    fn test_parse_default_literal() {
        let p = parse_param(r#"label string = "Save""#).unwrap();
        assert_eq!(p.name, "label");
        assert_eq!(p.ty, "string");
        assert_eq!(p.default.as_deref(), Some(r#""Save""#));
        assert!(p.optional);
    }

    #[test]
    fn test_parse_variadic() {
        let p = parse_param("items ...string").unwrap();
        assert!(p.variadic);
        assert_eq!(p.ty, "string");
    }

    #[test]
    fn test_parse_pointer() {
        let p = parse_param("user *User").unwrap();
        assert!(p.pointer);
        assert_eq!(p.ty, "User");
    }

    #[test]
    fn test_parse_optional_marker() {
        let p = parse_param("icon? string").unwrap();
        assert!(p.optional);
        assert_eq!(p.name, "icon");
    }

    #[test]
    fn test_parse_complex_type_is_raw_text() {
        let p = parse_param("handlers map[string]func(int) error").unwrap();
        assert_eq!(p.ty, "map[string]func(int) error");
    }

    #[test]
    fn test_parse_full_list_ordered() {
        let params = parse_params(r#"text string, disabled bool = false, tags ...string"#);
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].name, "text");
        assert_eq!(params[1].default.as_deref(), Some("false"));
        assert!(params[2].variadic);
    }

    #[test]
    fn test_default_with_equals_in_string() {
        let p = parse_param(r#"q string = "a=b""#).unwrap();
        assert_eq!(p.default.as_deref(), Some(r#""a=b""#));
    }

    #[test]
    fn test_nameless_fragment_is_skipped() {
        assert!(parse_param("   ").is_none());
        assert_eq!(parse_params("a int,   ,b int").len(), 2);
    }
}

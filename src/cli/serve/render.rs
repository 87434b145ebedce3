//! Preview rendering.
//!
//! The core delivers build-result events; composing real component output is
//! an external collaborator's job, reached through the `Render` trait. The
//! built-in `PreviewRenderer` makes the server usable stand-alone: it shows
//! the declaration, the resolved parameter values and the build status.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

use crate::cache::BuildCache;
use crate::core::Diagnostic;
use crate::registry::{Component, ComponentRegistry};
use crate::utils::html::escape;

/// Parameters supplied for a render, by name.
pub type ParamMap = BTreeMap<String, String>;

/// A rendered preview.
pub struct Rendered {
    pub html: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Render delegation seam.
pub trait Render: Send + Sync {
    fn render(&self, name: &str, params: &ParamMap) -> Result<Rendered>;
}

/// Default renderer: parameter table + build status for a component.
pub struct PreviewRenderer {
    registry: Arc<ComponentRegistry>,
    cache: Arc<BuildCache>,
}

impl PreviewRenderer {
    pub fn new(registry: Arc<ComponentRegistry>, cache: Arc<BuildCache>) -> Self {
        Self { registry, cache }
    }

    fn param_rows(component: &Component, params: &ParamMap) -> String {
        let mut rows = String::new();
        for p in &component.params {
            let supplied = params.get(&p.name).map(String::as_str);
            let value = supplied
                .or(p.default.as_deref())
                .unwrap_or("");
            let mut flags = Vec::new();
            if p.variadic {
                flags.push("variadic");
            }
            if p.pointer {
                flags.push("pointer");
            }
            if p.optional {
                flags.push("optional");
            }
            rows.push_str(&format!(
                "<tr><td><code>{}</code></td><td><code>{}</code></td>\
                 <td>{}</td><td class=\"value\">{}</td></tr>\n",
                escape(&p.name),
                escape(&p.ty),
                flags.join(", "),
                escape(value),
            ));
        }
        rows
    }

    fn status_line(&self, component: &Component) -> String {
        if component.unbuildable {
            return "<p class=\"status bad\">last build failed</p>".to_string();
        }
        match component.last_good {
            Some(fp) => {
                let artifact = self
                    .cache
                    .lookup(&fp)
                    .map(|e| e.size)
                    .unwrap_or(0);
                format!(
                    "<p class=\"status ok\">built ({} artifact bytes, input {})</p>",
                    artifact, fp
                )
            }
            None => "<p class=\"status\">not built yet</p>".to_string(),
        }
    }
}

impl Render for PreviewRenderer {
    fn render(&self, name: &str, params: &ParamMap) -> Result<Rendered> {
        let Some(component) = self.registry.get(name) else {
            anyhow::bail!("unknown component `{name}`");
        };

        let mut diagnostics = Vec::new();
        for key in params.keys() {
            if !component.params.iter().any(|p| &p.name == key) {
                diagnostics.push(Diagnostic::warning(
                    component.path.display().to_string(),
                    0,
                    0,
                    format!("parameter `{key}` is not declared by `{name}`"),
                ));
            }
        }

        let deps = if component.dependencies.is_empty() {
            String::new()
        } else {
            let linked: Vec<String> = component
                .dependencies
                .iter()
                .map(|d| {
                    if self.registry.contains(d) {
                        format!("<a href=\"/components/{0}\">{0}</a>", escape(d))
                    } else {
                        format!("<span class=\"unresolved\">{}</span>", escape(d))
                    }
                })
                .collect();
            format!("<p>uses: {}</p>", linked.join(", "))
        };

        let html = format!(
            "<!DOCTYPE html>\n<html><head><title>{name}</title>{STYLE}</head><body>\n\
             <p><a href=\"/\">&larr; components</a></p>\n\
             <h1>{name}</h1>\n\
             <p><code>{package}.{name}</code> &mdash; <code>{path}</code></p>\n\
             {status}\n{deps}\n\
             <table><tr><th>param</th><th>type</th><th>flags</th><th>value</th></tr>\n\
             {rows}</table>\n\
             </body></html>\n",
            name = escape(name),
            package = escape(&component.package),
            path = escape(&component.path.display().to_string()),
            status = self.status_line(&component),
            deps = deps,
            rows = Self::param_rows(&component, params),
        );

        Ok(Rendered {
            html: html.into_bytes(),
            diagnostics,
        })
    }
}

const STYLE: &str = "<style>\
body{font-family:sans-serif;margin:2rem;max-width:50rem}\
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:.3rem .6rem}\
.status.ok{color:#2a7a2a}.status.bad{color:#b00020}.unresolved{color:#b00020}\
td.value{background:#f7f7f7}\
</style>";

/// Parse query-string parameters (`?text=Hi&count=3`).
pub fn parse_query(query: &str) -> ParamMap {
    use percent_encoding::percent_decode_str;

    let mut params = ParamMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let decode = |s: &str| {
            percent_decode_str(&s.replace('+', " "))
                .decode_utf8()
                .map(std::borrow::Cow::into_owned)
                .unwrap_or_default()
        };
        let key = decode(key);
        if !key.is_empty() {
            params.insert(key, decode(value));
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Parameter;
    use std::path::PathBuf;

    fn setup() -> (Arc<ComponentRegistry>, PreviewRenderer) {
        let registry = Arc::new(ComponentRegistry::new());
        let cache = Arc::new(BuildCache::new(8, 1 << 20, None));

        let mut button = Component::new("Button", PathBuf::from("components/button.templ"), "ui");
        button.params.push(Parameter::new("text", "string"));
        let mut disabled = Parameter::new("disabled", "bool");
        disabled.default = Some("false".to_string());
        disabled.optional = true;
        button.params.push(disabled);
        registry.register(button).unwrap();

        let renderer = PreviewRenderer::new(Arc::clone(&registry), cache);
        (registry, renderer)
    }

    #[test]
    fn test_render_includes_supplied_value() {
        let (_registry, renderer) = setup();
        let mut params = ParamMap::new();
        params.insert("text".to_string(), "Hi".to_string());

        let rendered = renderer.render("Button", &params).unwrap();
        let html = String::from_utf8(rendered.html).unwrap();
        assert!(html.contains("Hi"));
        assert!(html.contains("Button"));
        assert!(rendered.diagnostics.is_empty());
    }

    #[test]
    fn test_render_uses_default_when_missing() {
        let (_registry, renderer) = setup();
        let rendered = renderer.render("Button", &ParamMap::new()).unwrap();
        let html = String::from_utf8(rendered.html).unwrap();
        assert!(html.contains("false"));
    }

    #[test]
    fn test_render_escapes_values() {
        let (_registry, renderer) = setup();
        let mut params = ParamMap::new();
        params.insert("text".to_string(), "<script>x</script>".to_string());

        let rendered = renderer.render("Button", &params).unwrap();
        let html = String::from_utf8(rendered.html).unwrap();
        assert!(!html.contains("<script>x</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_render_unknown_component_errors() {
        let (_registry, renderer) = setup();
        assert!(renderer.render("Ghost", &ParamMap::new()).is_err());
    }

    #[test]
    fn test_undeclared_param_is_a_warning() {
        let (_registry, renderer) = setup();
        let mut params = ParamMap::new();
        params.insert("bogus".to_string(), "1".to_string());

        let rendered = renderer.render("Button", &params).unwrap();
        assert_eq!(rendered.diagnostics.len(), 1);
        assert!(rendered.diagnostics[0].message.contains("bogus"));
    }

    #[test]
    fn test_parse_query() {
        let params = parse_query("text=Hi&count=3");
        assert_eq!(params["text"], "Hi");
        assert_eq!(params["count"], "3");
    }

    #[test]
    fn test_parse_query_decodes() {
        let params = parse_query("text=Hello%20World&msg=a%26b&s=one+two");
        assert_eq!(params["text"], "Hello World");
        assert_eq!(params["msg"], "a&b");
        assert_eq!(params["s"], "one two");
    }

    #[test]
    fn test_parse_query_edge_cases() {
        assert!(parse_query("").is_empty());
        let params = parse_query("flag");
        assert_eq!(params["flag"], "");
    }
}

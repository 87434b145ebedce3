//! HTTP response handlers.

use anyhow::{Context, Result};
use std::{fs, path::Path};
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::registry::Component;
use crate::utils::html::escape;
use crate::utils::mime::{self, types};

/// Reload client, injected into preview HTML when hot reload is on.
/// `__WS_PORT__` is substituted with the bound reload-channel port.
const RELOAD_SCRIPT: &str = r#"<script>
(function () {
    var retry = 1000;
    function connect() {
        var ws = new WebSocket("ws://127.0.0.1:__WS_PORT__");
        var ping = null;
        ws.onopen = function () {
            retry = 1000;
            ping = setInterval(function () {
                ws.send(JSON.stringify({ kind: "ping" }));
            }, 25000);
        };
        ws.onmessage = function (ev) {
            var msg = JSON.parse(ev.data);
            if (msg.kind === "reload" || msg.kind === "components-changed") {
                location.reload();
            } else if (msg.kind === "error") {
                showOverlay(msg.diagnostics);
            } else if (msg.kind === "clear-error") {
                hideOverlay();
            }
        };
        ws.onclose = function () {
            if (ping) clearInterval(ping);
            setTimeout(connect, retry);
            retry = Math.min(retry * 2, 15000);
        };
    }
    function showOverlay(diagnostics) {
        hideOverlay();
        var el = document.createElement("pre");
        el.id = "templar-error-overlay";
        el.style.cssText = "position:fixed;inset:0;margin:0;padding:2rem;" +
            "background:rgba(20,0,0,.92);color:#ff8080;z-index:99999;overflow:auto";
        el.textContent = diagnostics.map(function (d) {
            return d.file + ":" + d.line + ":" + d.column + ": " +
                d.severity + ": " + d.message;
        }).join("\n");
        document.body.appendChild(el);
    }
    function hideOverlay() {
        var el = document.getElementById("templar-error-overlay");
        if (el) el.remove();
    }
    connect();
})();
</script>"#;

/// Inject the reload client before `</body>` when hot reload is enabled.
pub fn maybe_inject_reload(body: Vec<u8>, content_type: &str, ws_port: Option<u16>) -> Vec<u8> {
    let Some(port) = ws_port else {
        return body;
    };
    if !content_type.starts_with("text/html") {
        return body;
    }
    let text = match String::from_utf8(body) {
        Ok(text) => text,
        // Mislabeled binary body: serve it untouched.
        Err(e) => return e.into_bytes(),
    };
    let script = RELOAD_SCRIPT.replace("__WS_PORT__", &port.to_string());
    if text.contains("</body>") {
        text.replace("</body>", &format!("{script}</body>")).into_bytes()
    } else {
        let mut out = text.into_bytes();
        out.extend_from_slice(script.as_bytes());
        out
    }
}

// ============================================================================
// Route responses
// ============================================================================

/// Index page listing registered components.
pub fn respond_index(
    request: Request,
    components: &[Component],
    ws_port: Option<u16>,
) -> Result<()> {
    let mut rows = String::new();
    for c in components {
        let params: Vec<String> = c
            .params
            .iter()
            .map(|p| format!("{} {}", p.name, p.ty))
            .collect();
        let status = if c.unbuildable { " ⚠" } else { "" };
        rows.push_str(&format!(
            "<li><a href=\"/components/{name}\">{name}</a>{status} \
             <code>({params})</code></li>\n",
            name = escape(&c.name),
            status = status,
            params = escape(&params.join(", ")),
        ));
    }

    let body = format!(
        "<!DOCTYPE html>\n<html><head><title>templar</title></head><body>\n\
         <h1>Components</h1>\n<ul>\n{rows}</ul>\n\
         <p>{count} component(s) registered</p>\n</body></html>\n",
        rows = rows,
        count = components.len(),
    );
    let body = maybe_inject_reload(body.into_bytes(), types::HTML, ws_port);
    send_body(request, 200, types::HTML, body)
}

/// Respond with a static file.
pub fn respond_file(request: Request, path: &Path) -> Result<()> {
    let content_type = mime::from_path(path);

    if is_head_request(&request) {
        return send_head(request, 200, content_type);
    }

    let body = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    send_body(request, 200, content_type, body)
}

/// Rendered component preview (with reload script).
pub fn respond_preview(request: Request, html: Vec<u8>, ws_port: Option<u16>) -> Result<()> {
    let body = maybe_inject_reload(html, types::HTML, ws_port);
    send_body(request, 200, types::HTML, body)
}

/// JSON payload.
pub fn respond_json(request: Request, json: String) -> Result<()> {
    send_body(request, 200, types::JSON, json.into_bytes())
}

/// 404 with a plain body.
pub fn respond_not_found(request: Request, what: &str) -> Result<()> {
    send_body(
        request,
        404,
        types::PLAIN,
        format!("404 Not Found: {what}\n").into_bytes(),
    )
}

/// 400 for an invalid route parameter.
pub fn respond_bad_request(request: Request, reason: &str) -> Result<()> {
    send_body(
        request,
        400,
        types::PLAIN,
        format!("400 Bad Request: {reason}\n").into_bytes(),
    )
}

/// Loading page while the initial scan runs (auto-refreshing).
pub fn respond_loading(request: Request) -> Result<()> {
    let body = "<!DOCTYPE html>\n<html><head><title>templar</title>\
                <meta http-equiv=\"refresh\" content=\"1\"></head>\
                <body><p>Scanning components&hellip;</p></body></html>\n";
    send_body(request, 503, types::HTML, body.as_bytes().to_vec())
}

/// 503 during shutdown.
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(
        request,
        503,
        types::PLAIN,
        b"503 Service Unavailable\n".to_vec(),
    )
}

/// 500 with the render error (and reload script, so fixes auto-refresh).
pub fn respond_render_error(
    request: Request,
    error: &anyhow::Error,
    ws_port: Option<u16>,
) -> Result<()> {
    let msg = escape(&format!("{error:#}"));
    let body = format!(
        "<!DOCTYPE html>\n<html><body><h1>Render error</h1><pre>{msg}</pre></body></html>\n"
    );
    let body = maybe_inject_reload(body.into_bytes(), types::HTML, ws_port);
    send_body(request, 500, types::HTML, body)
}

// ============================================================================
// Low-level send helpers
// ============================================================================

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn send_head(request: Request, status: u16, content_type: &'static str) -> Result<()> {
    let response =
        Response::empty(StatusCode(status)).with_header(make_header("Content-Type", content_type));
    request.respond(response)?;
    Ok(())
}

fn send_body(request: Request, status: u16, content_type: &str, body: Vec<u8>) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type));
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &'static str, value: &str) -> Header {
    Header::from_bytes(key, value).expect("static header is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_reload_before_body_close() {
        let html = b"<html><body>hi</body></html>".to_vec();
        let out = maybe_inject_reload(html, types::HTML, Some(35729));
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("35729"));
        assert!(text.contains("WebSocket"));
        let script_at = text.find("<script>").unwrap();
        let body_close_at = text.find("</body>").unwrap();
        assert!(script_at < body_close_at);
    }

    #[test]
    fn test_no_injection_without_port() {
        let html = b"<html><body>hi</body></html>".to_vec();
        let out = maybe_inject_reload(html.clone(), types::HTML, None);
        assert_eq!(out, html);
    }

    #[test]
    fn test_no_injection_into_non_html() {
        let css = b"body{}".to_vec();
        let out = maybe_inject_reload(css.clone(), types::CSS, Some(35729));
        assert_eq!(out, css);
    }
}

//! Broadcast Hub Actor
//!
//! Owns the set of connected reload clients. Register/unregister/broadcast
//! are processed serially by the hub loop, so no per-session locking exists.
//! Each session drains its own bounded queue on a writer thread; a full
//! queue sheds that session without delaying the others.
//!
//! # Architecture
//!
//! ```text
//! bus bridge --[HubMsg]--> HubActor --[bounded queue]--> session writer → client
//! ```

mod delivery;
mod session;

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::Message;

use super::messages::HubMsg;
use crate::core::{CancelToken, Diagnostic};
use crate::monitor::Monitor;
use crate::registry::ComponentRegistry;
use crate::reload::ReloadMessage;
use session::ClientSession;

/// Reload broadcasts within this window collapse into one message.
const COALESCE_WINDOW: Duration = Duration::from_millis(50);

/// Expected client ping cadence; a session silent for twice this long is
/// disconnected.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How often dead/stale sessions are reaped.
const REAP_INTERVAL: Duration = Duration::from_secs(5);

/// Broadcast Hub - manages client sessions and reload fan-out
pub struct HubActor {
    rx: mpsc::Receiver<HubMsg>,
    sessions: Vec<ClientSession>,
    next_id: u64,
    /// Last build error, replayed to newly connected clients.
    pending_error: Option<Vec<Diagnostic>>,
    registry: Arc<ComponentRegistry>,
    allowed_origins: Arc<Vec<String>>,
    server_host: Arc<String>,
    monitor: Arc<dyn Monitor>,
    /// Components awaiting a coalesced reload.
    pending_reload: FxHashSet<String>,
    /// An unscoped reload was requested (all clients, no component list).
    reload_all: bool,
    /// Set when a reload is pending.
    reload_flush_at: Option<tokio::time::Instant>,
}

impl HubActor {
    pub fn new(
        rx: mpsc::Receiver<HubMsg>,
        registry: Arc<ComponentRegistry>,
        allowed_origins: Vec<String>,
        server_host: String,
        monitor: Arc<dyn Monitor>,
    ) -> Self {
        Self {
            rx,
            sessions: Vec::new(),
            next_id: 1,
            pending_error: None,
            registry,
            allowed_origins: Arc::new(allowed_origins),
            server_host: Arc::new(server_host),
            monitor,
            pending_reload: FxHashSet::default(),
            reload_all: false,
            reload_flush_at: None,
        }
    }

    /// Replay a persisted error to clients that connect before the next build.
    pub fn with_pending_error(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.pending_error = Some(diagnostics);
        self
    }

    /// Run the hub loop until shutdown.
    pub async fn run(mut self, cancel: CancelToken) {
        let mut reap = tokio::time::interval(REAP_INTERVAL);
        reap.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let flush_at = self
                .reload_flush_at
                .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                msg = self.rx.recv() => {
                    match msg {
                        Some(HubMsg::Shutdown) | None => break,
                        Some(msg) => self.handle(msg),
                    }
                }
                _ = tokio::time::sleep_until(flush_at) => self.flush_reload(),
                _ = reap.tick() => self.reap_sessions(),
            }
        }

        self.close_all();
        crate::debug!("ws"; "hub stopped");
    }

    fn handle(&mut self, msg: HubMsg) {
        match msg {
            HubMsg::AddClient(stream) => self.add_client(stream),

            HubMsg::Reload { components } => {
                // Coalesce: at most one reload per window per client. An
                // empty scope means "reload everything".
                if components.is_empty() {
                    self.reload_all = true;
                } else {
                    self.pending_reload.extend(components);
                }
                if self.reload_flush_at.is_none() {
                    self.reload_flush_at = Some(tokio::time::Instant::now() + COALESCE_WINDOW);
                }
            }

            HubMsg::Error { diagnostics } => {
                self.pending_error = Some(diagnostics.clone());
                self.broadcast(ReloadMessage::error(diagnostics));
            }

            HubMsg::ClearError => {
                self.pending_error = None;
                self.broadcast(ReloadMessage::ClearError);
            }

            HubMsg::ComponentsChanged { added, removed } => {
                self.broadcast(ReloadMessage::components_changed(added, removed));
            }

            HubMsg::Shutdown => unreachable!("handled in run()"),
        }
    }

    /// Emit the coalesced reload. The last build result within the window
    /// wins; earlier scopes are merged into one component list.
    fn flush_reload(&mut self) {
        self.reload_flush_at = None;
        if self.reload_all {
            self.reload_all = false;
            self.pending_reload.clear();
            crate::debug!("ws"; "reload: all");
            self.broadcast(ReloadMessage::reload(Vec::new()));
            return;
        }
        if self.pending_reload.is_empty() {
            return;
        }
        let mut components: Vec<String> = self.pending_reload.drain().collect();
        components.sort();
        crate::debug!("ws"; "reload: {:?}", components);
        self.broadcast(ReloadMessage::reload(components));
    }

    /// Handshake a new client: origin check, hello, error replay.
    fn add_client(&mut self, stream: TcpStream) {
        let allowed = Arc::clone(&self.allowed_origins);
        let host = Arc::clone(&self.server_host);

        let callback = move |req: &Request, response: Response| {
            match origin_permitted(req, &allowed, &host) {
                true => Ok(response),
                false => {
                    let reject: ErrorResponse = tungstenite::http::Response::builder()
                        .status(403)
                        .body(Some("origin not allowed".to_string()))
                        .expect("static response builds");
                    Err(reject)
                }
            }
        };

        let mut ws: WebSocket<TcpStream> = match tungstenite::accept_hdr(stream, callback) {
            Ok(ws) => ws,
            Err(e) => {
                crate::log!("ws"; "handshake failed: {}", e);
                return;
            }
        };

        // Hello with the current component list.
        let hello = ReloadMessage::hello(self.registry.names());
        if let Err(e) = ws.send(Message::Text(hello.to_json().into())) {
            crate::log!("ws"; "failed to send hello: {}", e);
            return;
        }

        // Snapshot recovery: replay the pending error to the new client.
        if let Some(ref diagnostics) = self.pending_error {
            let msg = ReloadMessage::error(diagnostics.clone());
            if let Err(e) = ws.send(Message::Text(msg.to_json().into())) {
                crate::log!("ws"; "failed to send pending error: {}", e);
                return;
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        let session = ClientSession::spawn(id, ws, Arc::clone(&self.monitor));
        crate::debug!("ws"; "client {} connected (total: {})", id, self.sessions.len() + 1);
        self.monitor.client_connected();
        self.sessions.push(session);
    }

    /// Drop dead sessions and disconnect clients that stopped ponging.
    fn reap_sessions(&mut self) {
        let before = self.sessions.len();
        self.sessions.retain(|s| {
            if s.is_dead() {
                return false;
            }
            if s.idle_for() > PING_INTERVAL * 2 {
                crate::debug!("ws"; "session {} timed out", s.id);
                return false;
            }
            true
        });
        let reaped = before - self.sessions.len();
        if reaped > 0 {
            crate::debug!("ws"; "reaped {} session(s), {} left", reaped, self.sessions.len());
        }
    }

    fn close_all(&mut self) {
        // Dropping the handles closes each session with a close frame.
        crate::debug!("ws"; "closing {} session(s)", self.sessions.len());
        self.sessions.clear();
    }
}

/// Origin validation for the upgrade: configured allowlist, defaulting to
/// the server's own bind host.
fn origin_permitted(req: &Request, allowed: &[String], server_host: &str) -> bool {
    let Some(origin) = req.headers().get("Origin").and_then(|v| v.to_str().ok()) else {
        // Non-browser clients (no Origin header) are permitted: the check
        // exists to stop cross-site pages in a browser.
        return true;
    };

    if allowed.iter().any(|a| a.trim_end_matches('/') == origin.trim_end_matches('/')) {
        return true;
    }

    let Ok(url) = url::Url::parse(origin) else {
        return false;
    };
    let Some(origin_host) = url.host_str() else {
        return false;
    };

    origin_host == server_host
        || (is_loopback(origin_host) && is_loopback(server_host))
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::NoopMonitor;
    use crate::registry::Component;
    use std::path::PathBuf;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handshake_hello_and_coalesced_reload() {
        let (hub_tx, hub_rx) = mpsc::channel(32);
        let registry = Arc::new(ComponentRegistry::new());
        registry
            .register(Component::new("Button", PathBuf::from("b.templ"), "ui"))
            .unwrap();

        let cancel = CancelToken::new();
        let hub = HubActor::new(
            hub_rx,
            Arc::clone(&registry),
            Vec::new(),
            "localhost".to_string(),
            Arc::new(NoopMonitor),
        );
        let hub_handle = tokio::spawn(hub.run(cancel.clone()));

        let port =
            crate::reload::server::start_ws_server(0, hub_tx.clone(), cancel.clone()).unwrap();

        // Connect and read the hello (handshake completes registration).
        let (ws, hello) = tokio::task::spawn_blocking(move || {
            let (mut ws, _) =
                tungstenite::connect(format!("ws://127.0.0.1:{port}")).unwrap();
            let hello = match ws.read().unwrap() {
                Message::Text(text) => text.to_string(),
                other => panic!("expected text frame, got {other:?}"),
            };
            (ws, hello)
        })
        .await
        .unwrap();

        match ReloadMessage::from_json(&hello) {
            Some(ReloadMessage::Hello { components, .. }) => {
                assert_eq!(components, ["Button"]);
            }
            other => panic!("expected hello, got {other:?}"),
        }

        // A burst of reloads within the window collapses into one message.
        for _ in 0..5 {
            hub_tx
                .send(HubMsg::Reload {
                    components: vec!["Button".to_string()],
                })
                .await
                .unwrap();
        }

        let reload = tokio::task::spawn_blocking(move || {
            let mut ws = ws;
            match ws.read().unwrap() {
                Message::Text(text) => text.to_string(),
                other => panic!("expected text frame, got {other:?}"),
            }
        })
        .await
        .unwrap();

        match ReloadMessage::from_json(&reload) {
            Some(ReloadMessage::Reload { components }) => {
                assert_eq!(components, ["Button"]);
            }
            other => panic!("expected reload, got {other:?}"),
        }

        cancel.cancel();
        let _ = hub_handle.await;
    }

    fn request_with_origin(origin: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("ws://localhost:35729/");
        if let Some(origin) = origin {
            builder = builder.header("Origin", origin);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_no_origin_header_is_permitted() {
        let req = request_with_origin(None);
        assert!(origin_permitted(&req, &[], "localhost"));
    }

    #[test]
    fn test_own_host_is_permitted_by_default() {
        let req = request_with_origin(Some("http://localhost:8080"));
        assert!(origin_permitted(&req, &[], "localhost"));
    }

    #[test]
    fn test_loopback_aliases_are_equivalent() {
        let req = request_with_origin(Some("http://127.0.0.1:8080"));
        assert!(origin_permitted(&req, &[], "localhost"));
    }

    #[test]
    fn test_foreign_origin_is_rejected() {
        let req = request_with_origin(Some("http://evil.example.com"));
        assert!(!origin_permitted(&req, &[], "localhost"));
    }

    #[test]
    fn test_configured_origin_is_permitted() {
        let req = request_with_origin(Some("http://preview.example.com"));
        let allowed = vec!["http://preview.example.com".to_string()];
        assert!(origin_permitted(&req, &allowed, "localhost"));
    }

    #[test]
    fn test_garbage_origin_is_rejected() {
        let req = request_with_origin(Some("not a url"));
        assert!(!origin_permitted(&req, &[], "localhost"));
    }
}

//! Server lifecycle management.

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use crossbeam::channel::Receiver;
use thiserror::Error;
use tiny_http::Server;

use crate::actor::Coordinator;
use crate::bus::EventBus;
use crate::config::TemplarConfig;
use crate::core::{CancelToken, register_server};
use crate::monitor::Monitor;
use crate::pipeline::BuildPipeline;
use crate::registry::ComponentRegistry;

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Port binding failed after all retries. Exits with code 3.
#[derive(Debug, Error)]
#[error(
    "failed to bind {host}:{port} (tried {attempts} ports): {reason}{}",
    free_port_hint(.free_port)
)]
pub struct BindError {
    pub host: String,
    pub port: u16,
    pub attempts: u16,
    pub reason: String,
    pub free_port: Option<u16>,
}

fn free_port_hint(port: &Option<u16>) -> String {
    match port {
        Some(port) => format!("; try --port {port}"),
        None => String::new(),
    }
}

/// Bind to the configured host and port, with automatic port retry.
pub fn bind_with_retry(host: &str, base_port: u16) -> Result<(Server, SocketAddr), BindError> {
    let mut last_error = String::new();

    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = match resolve_addr(host, port) {
            Ok(addr) => addr,
            Err(e) => {
                return Err(BindError {
                    host: host.to_string(),
                    port: base_port,
                    attempts: 1,
                    reason: e,
                    free_port: None,
                });
            }
        };

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    crate::log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(BindError {
        host: host.to_string(),
        port: base_port,
        attempts: MAX_PORT_RETRIES,
        reason: last_error,
        free_port: probe_free_port(host),
    })
}

fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("cannot resolve host `{host}`: {e}"))?
        .next()
        .ok_or_else(|| format!("host `{host}` resolves to no address"))
}

/// Ask the OS for a currently-free port, for the error suggestion.
fn probe_free_port(host: &str) -> Option<u16> {
    let addr = resolve_addr(host, 0).ok()?;
    let listener = TcpListener::bind(addr).ok()?;
    Some(listener.local_addr().ok()?.port())
}

/// Register server for graceful shutdown.
pub fn register_server_for_shutdown(
    server: Arc<Server>,
    shutdown_tx: crossbeam::channel::Sender<()>,
) {
    register_server(server, shutdown_tx);
}

/// Spawn the single-line build status: successes overwrite in place,
/// failures pin their diagnostics below. Covers the initial build and
/// every watch rebuild, with or without the broadcast layer.
pub fn spawn_watch_status(bus: &EventBus, cancel: CancelToken) {
    use crate::bus::{BuildStatus, Event, EventKind};
    use crate::logger::WatchStatus;

    let sub = bus.subscribe(&[EventKind::BuildCompleted, EventKind::BuildFailed]);

    thread::spawn(move || {
        let mut status = WatchStatus::new();

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some(event) = sub.recv_timeout(std::time::Duration::from_millis(200)) else {
                continue;
            };

            match event {
                Event::BuildCompleted {
                    name,
                    status: outcome,
                    duration,
                    ..
                } => {
                    // Cached results stay quiet; only real rebuilds are news.
                    if outcome == BuildStatus::Success {
                        status.ok(&format!("{} built in {}ms", name, duration.as_millis()));
                    }
                }
                Event::BuildFailed { name, diagnostics } => {
                    let detail = diagnostics
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("\n");
                    status.error(&format!("build failed: {name}"), &detail);
                }
                _ => {}
            }
        }
    });
}

/// Spawn the actor system for file watching and incremental rebuilds.
///
/// Gated on `development.watch`: without the watcher there is nothing to
/// drive the loop. Whether rebuilds are pushed to browsers is the
/// coordinator's concern (`development.hot_reload`).
#[allow(clippy::too_many_arguments)]
pub fn spawn_actors(
    config: Arc<TemplarConfig>,
    registry: Arc<ComponentRegistry>,
    pipeline: Arc<BuildPipeline>,
    bus: EventBus,
    monitor: Arc<dyn Monitor>,
    cancel: CancelToken,
    ws_port: Option<u16>,
    shutdown_rx: Receiver<()>,
) -> Option<JoinHandle<()>> {
    if !config.development.watch {
        return None;
    }

    Some(thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                crate::log!("actor"; "failed to create runtime: {}", e);
                return;
            }
        };

        rt.block_on(async {
            let mut coordinator =
                Coordinator::new(config, registry, pipeline, bus, monitor, cancel)
                    .with_shutdown_signal(shutdown_rx);
            if let Some(port) = ws_port {
                coordinator = coordinator.with_ws_port(port);
            }
            if let Err(e) = coordinator.run().await {
                crate::log!("actor"; "error: {}", e);
            }
        });
    }))
}

/// Wait for the actor system to shut down gracefully (bounded).
pub fn wait_for_shutdown(handle: Option<JoinHandle<()>>) {
    let Some(handle) = handle else { return };

    for _ in 0..40 {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        thread::sleep(std::time::Duration::from_millis(50));
    }
    crate::log!("serve"; "actor system did not stop in time");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_retry_moves_past_taken_port() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = taken.local_addr().unwrap().port();

        let (server, addr) = bind_with_retry("127.0.0.1", base).unwrap();
        assert_ne!(addr.port(), base);
        drop(server);
    }

    #[test]
    fn test_bind_unresolvable_host_is_error() {
        let err = match bind_with_retry("definitely.not.a.real.host.invalid", 8080) {
            Err(e) => e,
            Ok(_) => panic!("expected bind_with_retry to fail"),
        };
        assert!(err.to_string().contains("cannot resolve"));
    }

    #[test]
    fn test_probe_free_port() {
        assert!(probe_free_port("127.0.0.1").is_some());
    }
}

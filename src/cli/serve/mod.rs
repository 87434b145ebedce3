//! Development server with live reload support.

mod lifecycle;
mod path;
mod render;
mod response;

pub use lifecycle::BindError;
pub use render::{ParamMap, PreviewRenderer, Render, Rendered, parse_query};

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use anyhow::Result;
use crossbeam::channel;
use tiny_http::{Request, Server};

use crate::bus::EventBus;
use crate::cache::BuildCache;
use crate::config::TemplarConfig;
use crate::core::{CancelToken, is_serving, is_shutdown, set_healthy, set_serving};
use crate::log;
use crate::monitor::{DevMonitor, Monitor};
use crate::pipeline::BuildPipeline;
use crate::registry::{ComponentRegistry, validate_name};
use crate::reload::server::DEFAULT_WS_PORT;
use crate::scanner::Scanner;

/// Actual reload-channel port (may differ from DEFAULT_WS_PORT after retry).
/// Updated by the coordinator after the listener binds.
static ACTUAL_WS_PORT: AtomicU16 = AtomicU16::new(DEFAULT_WS_PORT);

/// Update the actual reload-channel port (called by the coordinator).
pub fn set_actual_ws_port(port: u16) {
    ACTUAL_WS_PORT.store(port, Ordering::Relaxed);
}

fn get_actual_ws_port() -> u16 {
    ACTUAL_WS_PORT.load(Ordering::Relaxed)
}

/// Shared state handed to request handlers.
struct ServeContext {
    config: Arc<TemplarConfig>,
    registry: Arc<ComponentRegistry>,
    cache: Arc<BuildCache>,
    pipeline: Arc<BuildPipeline>,
    monitor: Arc<DevMonitor>,
    renderer: Arc<dyn Render>,
    /// Watcher and broadcast layer both enabled: inject the reload client.
    push_enabled: bool,
}

impl ServeContext {
    fn ws_port(&self) -> Option<u16> {
        self.push_enabled.then(get_actual_ws_port)
    }
}

/// Run the development server until shutdown.
pub fn serve(config: Arc<TemplarConfig>) -> Result<()> {
    let registry = Arc::new(ComponentRegistry::new());
    let cache = Arc::new(BuildCache::from_config(&config));
    let bus = EventBus::new();
    let monitor = Arc::new(DevMonitor::new());
    let cancel = CancelToken::new();

    let pipeline = BuildPipeline::new(
        &config,
        Arc::clone(&registry),
        Arc::clone(&cache),
        bus.clone(),
        Arc::clone(&monitor) as Arc<dyn Monitor>,
        cancel.clone(),
    )?;

    // Bind first so early requests get a loading page during the scan.
    let (server, addr) = lifecycle::bind_with_retry(&config.server.host, config.server.port)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    lifecycle::register_server_for_shutdown(Arc::clone(&server), shutdown_tx);

    log!("serve"; "http://{}", addr);

    pipeline.start_workers();
    lifecycle::spawn_watch_status(&bus, cancel.clone());

    // Browser push needs both the watcher (to produce rebuilds) and the
    // broadcast switch; either alone leaves nothing to deliver.
    let push_enabled = config.development.watch && config.development.hot_reload;
    let ws_port = push_enabled.then_some(DEFAULT_WS_PORT);

    // Initial scan + build in the background (progressive serving).
    {
        let config = Arc::clone(&config);
        let registry = Arc::clone(&registry);
        let pipeline = Arc::clone(&pipeline);
        std::thread::spawn(move || {
            let scanner = Scanner::new(&config);
            let scan = scanner.scan_roots(&config.scan_roots());
            for diagnostic in &scan.diagnostics {
                log!("scan"; "{}", diagnostic);
            }

            let delta = registry.apply_batch(scan.components, crate::registry::BatchMode::Replace);
            for diagnostic in &delta.diagnostics {
                log!("scan"; "{}", diagnostic);
            }
            for cycle in registry.detect_cycles() {
                log!("scan"; "dependency cycle: {}", cycle.join(" -> "));
            }

            log!("scan"; "{} component(s) registered", registry.len());
            set_serving();
            set_healthy(true);
            pipeline.build_all();
        });
    }

    let renderer: Arc<dyn Render> =
        Arc::new(PreviewRenderer::new(Arc::clone(&registry), Arc::clone(&cache)));

    let actor_handle = lifecycle::spawn_actors(
        Arc::clone(&config),
        Arc::clone(&registry),
        Arc::clone(&pipeline),
        bus,
        Arc::clone(&monitor) as Arc<dyn Monitor>,
        cancel.clone(),
        ws_port,
        shutdown_rx,
    );

    let ctx = Arc::new(ServeContext {
        config,
        registry,
        cache,
        pipeline,
        monitor,
        renderer,
        push_enabled,
    });

    run_request_loop(&server, ctx);

    cancel.cancel();
    lifecycle::wait_for_shutdown(actor_handle);
    Ok(())
}

fn run_request_loop(server: &Server, ctx: Arc<ServeContext>) {
    // Thread pool so one slow render cannot block other requests.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .expect("failed to create request thread pool");

    for request in server.incoming_requests() {
        let ctx = Arc::clone(&ctx);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &ctx) {
                log!("serve"; "request error: {e}");
            }
        });
    }
}

/// Handle a single HTTP request.
fn handle_request(request: Request, ctx: &ServeContext) -> Result<()> {
    if is_shutdown() {
        return response::respond_unavailable(request);
    }

    let url = request.url().to_string();
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url.as_str(), ""),
    };

    match path {
        "/health" => return respond_health(request, ctx),
        "/ws" => return respond_ws_bootstrap(request, ctx),
        _ => {}
    }

    if !is_serving() {
        return response::respond_loading(request);
    }

    if path == "/" {
        return response::respond_index(request, &ctx.registry.get_all(), ctx.ws_port());
    }

    if let Some(suffix) = path.strip_prefix("/static/") {
        return match path::resolve_static(suffix, &ctx.config.static_root()) {
            Some(file) => response::respond_file(request, &file),
            None => response::respond_not_found(request, suffix),
        };
    }

    if let Some(rest) = path.strip_prefix("/components/") {
        return respond_component(request, ctx, rest, query);
    }

    response::respond_not_found(request, path)
}

/// `/components/{name}` and `/components/{name}/props`.
fn respond_component(request: Request, ctx: &ServeContext, rest: &str, query: &str) -> Result<()> {
    let (name, props_route) = match rest.strip_suffix("/props") {
        Some(name) => (name, true),
        None => (rest, false),
    };

    if let Err(e) = validate_name(name) {
        return response::respond_bad_request(request, &e.to_string());
    }

    let query_params = parse_query(query);
    let mut params = ParamMap::new();

    // The props route may pull parameters from a named mock-data source,
    // with query parameters overriding.
    if props_route
        && let Some(mock) = query_params.get("mock")
    {
        match load_mock(ctx, mock) {
            Ok(mock_params) => params.extend(mock_params),
            Err(e) => return response::respond_bad_request(request, &format!("mock: {e}")),
        }
    }

    for (key, value) in query_params {
        if key != "mock" {
            params.insert(key, value);
        }
    }

    if !ctx.registry.contains(name) {
        return response::respond_not_found(request, name);
    }

    match ctx.renderer.render(name, &params) {
        Ok(rendered) => {
            for diagnostic in &rendered.diagnostics {
                crate::debug!("serve"; "{}", diagnostic);
            }
            response::respond_preview(request, rendered.html, ctx.ws_port())
        }
        Err(e) => response::respond_render_error(request, &e, ctx.ws_port()),
    }
}

/// Load `static/mocks/<name>.json` as a parameter map.
fn load_mock(ctx: &ServeContext, mock: &str) -> Result<ParamMap> {
    validate_name(mock).map_err(|e| anyhow::anyhow!("{e}"))?;

    let path = ctx
        .config
        .static_root()
        .join("mocks")
        .join(format!("{mock}.json"));
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;

    let value: serde_json::Value = serde_json::from_str(&content)?;
    let Some(object) = value.as_object() else {
        anyhow::bail!("mock `{mock}` is not a JSON object");
    };

    let mut params = ParamMap::new();
    for (key, value) in object {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        params.insert(key.clone(), text);
    }
    Ok(params)
}

/// `/ws`: tell the client where the reload channel listens.
fn respond_ws_bootstrap(request: Request, ctx: &ServeContext) -> Result<()> {
    match ctx.ws_port() {
        Some(port) => {
            let json = serde_json::json!({ "endpoint": format!("ws://127.0.0.1:{port}") });
            response::respond_json(request, json.to_string())
        }
        None => response::respond_not_found(request, "hot reload disabled"),
    }
}

/// `/health`: readiness probe with current status.
fn respond_health(request: Request, ctx: &ServeContext) -> Result<()> {
    let cache = ctx.cache.stats();
    let pipeline = ctx.pipeline.metrics();
    let monitor = ctx.monitor.snapshot();

    let json = serde_json::json!({
        "status": if is_serving() { "ready" } else { "starting" },
        "healthy": crate::core::is_healthy(),
        "components": ctx.registry.len(),
        "unresolved": ctx.registry.unresolved().len(),
        "builds": {
            "queued": pipeline.queued,
            "active": pipeline.active,
            "completed": pipeline.completed,
            "cached": pipeline.cached,
            "failed": pipeline.failed,
            "retries": pipeline.retries,
        },
        "cache": {
            "entries": cache.entries,
            "bytes": cache.total_bytes,
            "hits": cache.hits,
            "misses": cache.misses,
            "evictions": cache.evictions,
        },
        "clients": {
            "connected": monitor.clients_connected,
            "shed": monitor.clients_shed,
        },
    });
    response::respond_json(request, json.to_string())
}

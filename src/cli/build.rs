//! One-shot build command: scan everything, build everything, report.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::bus::{Event, EventBus, EventKind};
use crate::cache::BuildCache;
use crate::config::TemplarConfig;
use crate::core::CancelToken;
use crate::log;
use crate::monitor::{DevMonitor, Monitor};
use crate::pipeline::BuildPipeline;
use crate::registry::{BatchMode, ComponentRegistry};
use crate::scanner::Scanner;

/// Upper bound for a full build; generous, but prevents a wedged generator
/// from hanging the command forever.
const BUILD_TIMEOUT: Duration = Duration::from_secs(600);

/// Scan all roots and build all components once.
///
/// Returns an error (exit 1) when any component fails to build.
pub fn build_project(config: &Arc<TemplarConfig>) -> Result<()> {
    let registry = Arc::new(ComponentRegistry::new());
    let cache = Arc::new(BuildCache::from_config(config));
    let bus = EventBus::new();
    let monitor = Arc::new(DevMonitor::new());
    let cancel = CancelToken::new();

    let pipeline = BuildPipeline::new(
        config,
        Arc::clone(&registry),
        Arc::clone(&cache),
        bus.clone(),
        Arc::clone(&monitor) as Arc<dyn Monitor>,
        cancel.clone(),
    )?;

    // Scan.
    let scanner = Scanner::new(config);
    let scan = scanner.scan_roots(&config.scan_roots());
    let scan_errors = scan.has_errors();
    for diagnostic in &scan.diagnostics {
        log!("scan"; "{}", diagnostic);
    }

    let delta = registry.apply_batch(scan.components, BatchMode::Replace);
    for diagnostic in &delta.diagnostics {
        log!("scan"; "{}", diagnostic);
    }
    for cycle in registry.detect_cycles() {
        log!("scan"; "dependency cycle: {}", cycle.join(" -> "));
    }
    for (component, missing) in registry.unresolved() {
        log!("scan"; "`{}` references unknown component `{}`", component, missing);
    }

    if registry.is_empty() {
        log!("build"; "no components found under the configured scan paths");
        return Ok(());
    }
    log!("build"; "building {} component(s)", registry.len());

    // Collect failures while building.
    let failures = bus.subscribe(&[EventKind::BuildFailed]);

    pipeline.start_workers();
    pipeline.build_all();
    if !pipeline.wait_idle(BUILD_TIMEOUT) {
        cancel.cancel();
        anyhow::bail!("build timed out after {}s", BUILD_TIMEOUT.as_secs());
    }
    cancel.cancel();

    let mut failed = 0usize;
    while let Some(event) = failures.try_recv() {
        if let Event::BuildFailed { name, diagnostics } = event {
            failed += 1;
            log!("error"; "{} failed:", name);
            for diagnostic in diagnostics {
                log!("error"; "  {}", diagnostic);
            }
        }
    }

    let metrics = pipeline.metrics();
    log!(
        "build";
        "done: {} built, {} cached, {} failed",
        metrics.completed,
        metrics.cached,
        metrics.failed
    );

    if failed > 0 || scan_errors {
        anyhow::bail!("build finished with errors");
    }
    Ok(())
}

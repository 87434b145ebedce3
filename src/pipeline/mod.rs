//! Build pipeline.
//!
//! A worker pool of N = min(cpu, 8) threads drains a single queue of
//! component names. Submissions are deduplicated by name while queued.
//! Each task fingerprints its input, consults the content-addressed cache,
//! and only then invokes the validated generator subprocess. Dependents of a
//! just-built component are requeued only when the artifact bytes changed.
//!
//! Per component: `Idle → Queued → Running → {Success, Failure, Cached}`.
//! Success/Cached return to Idle; Failure returns to Idle with the registry
//! entry marked unbuildable; cancellation discards in-flight results.

pub mod command;
pub mod diagnostics;
mod task;

pub use command::InvalidCommand;
pub use task::{BuildResult, BuildTask, GRACE_PERIOD, InvokeOutcome, ResultStatus};

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::bus::{BuildStatus, Event, EventBus};
use crate::cache::{BuildCache, ContentHash, Fingerprint, hash_bytes};
use crate::config::TemplarConfig;
use crate::core::{CancelToken, Diagnostic};
use crate::monitor::Monitor;
use crate::registry::ComponentRegistry;

/// Upper bound on the worker pool, regardless of core count.
const MAX_WORKERS: usize = 8;

/// Where a component currently sits in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Queued,
    Running,
}

/// Counter snapshot exposed by `metrics()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineMetrics {
    pub queued: usize,
    pub active: usize,
    pub completed: u64,
    pub cached: u64,
    pub failed: u64,
    pub retries: u64,
}

pub struct BuildPipeline {
    queue: Mutex<VecDeque<String>>,
    notify: Condvar,
    /// Names currently in the queue (dedup while queued).
    queued: DashMap<String, ()>,
    /// Names currently building.
    active: DashMap<String, ()>,
    /// Last built artifact hash per component, for dependent requeueing.
    last_artifact: DashMap<String, ContentHash>,
    /// Last terminal result per component.
    results: DashMap<String, BuildResult>,

    registry: Arc<ComponentRegistry>,
    cache: Arc<BuildCache>,
    bus: EventBus,
    monitor: Arc<dyn Monitor>,
    cancel: CancelToken,

    /// Validated generator argv (head + configured flags).
    argv: Vec<String>,
    allowlist: Vec<String>,
    generator_version: String,
    retry_attempts: u32,
    root: PathBuf,

    started: AtomicBool,
    completed: AtomicU64,
    cached: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

impl BuildPipeline {
    /// Create a pipeline. The configured command is validated here; an
    /// invalid command is a startup failure, before any subprocess spawns.
    pub fn new(
        config: &TemplarConfig,
        registry: Arc<ComponentRegistry>,
        cache: Arc<BuildCache>,
        bus: EventBus,
        monitor: Arc<dyn Monitor>,
        cancel: CancelToken,
    ) -> Result<Arc<Self>, InvalidCommand> {
        let argv = config.build.command_tokens();
        command::validate_command(&argv, &config.build.allowed_commands)?;

        let generator_version = task::detect_generator_version(&argv);
        crate::debug!("build"; "generator version: {}", generator_version);

        Ok(Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Condvar::new(),
            queued: DashMap::new(),
            active: DashMap::new(),
            last_artifact: DashMap::new(),
            results: DashMap::new(),
            registry,
            cache,
            bus,
            monitor,
            cancel,
            argv,
            allowlist: config.build.allowed_commands.clone(),
            generator_version,
            retry_attempts: config.build.retry_attempts,
            root: config.get_root().to_path_buf(),
            started: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }))
    }

    /// Start the default-sized worker pool.
    pub fn start_workers(self: &Arc<Self>) {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(MAX_WORKERS);
        self.start_workers_n(n);
    }

    /// Start an explicit number of workers (a pool of 1 still drains).
    pub fn start_workers_n(self: &Arc<Self>, n: usize) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        for _ in 0..n.max(1) {
            let pipeline = Arc::clone(self);
            std::thread::spawn(move || pipeline.run_worker());
        }
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Queue components for building. Names already queued are skipped.
    pub fn submit<I>(&self, names: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut enqueued = false;
        {
            let mut queue = self.queue.lock();
            for name in names {
                let name = name.into();
                if self.queued.insert(name.clone(), ()).is_some() {
                    continue; // deduplicated while queued
                }
                queue.push_back(name);
                enqueued = true;
            }
        }
        if enqueued {
            self.notify.notify_all();
        }
    }

    /// Queue every registered component.
    pub fn build_all(&self) {
        self.submit(self.registry.names());
    }

    /// Signal the worker pool to stop; in-flight subprocesses get the grace
    /// period, then are killed, and their results are discarded.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
        let mut queue = self.queue.lock();
        queue.clear();
        self.queued.clear();
        self.notify.notify_all();
    }

    pub fn metrics(&self) -> PipelineMetrics {
        PipelineMetrics {
            queued: self.queue.lock().len(),
            active: self.active.len(),
            completed: self.completed.load(Ordering::Relaxed),
            cached: self.cached.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Last terminal result for a component, if it has been built.
    pub fn last_result(&self, name: &str) -> Option<BuildResult> {
        self.results.get(name).map(|r| r.clone())
    }

    pub fn state(&self, name: &str) -> BuildState {
        if self.active.contains_key(name) {
            BuildState::Running
        } else if self.queued.contains_key(name) {
            BuildState::Queued
        } else {
            BuildState::Idle
        }
    }

    /// Block until the queue and all workers are idle (tests, one-shot build).
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.queue.lock().is_empty() && self.active.is_empty() {
                return true;
            }
            if Instant::now() >= deadline || self.cancel.is_cancelled() {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    // ------------------------------------------------------------------
    // Worker
    // ------------------------------------------------------------------

    fn run_worker(&self) {
        while !self.cancel.is_cancelled() {
            let Some(name) = self.next_task() else {
                continue;
            };
            self.execute(name);
        }
        crate::debug!("build"; "worker stopped");
    }

    /// Pop the next buildable name. A name already building is requeued so
    /// per-component results keep submission order.
    fn next_task(&self) -> Option<String> {
        let mut queue = self.queue.lock();
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            match queue.pop_front() {
                Some(name) if self.active.contains_key(&name) => {
                    self.queued.insert(name.clone(), ());
                    queue.push_back(name);
                    self.notify
                        .wait_for(&mut queue, Duration::from_millis(20));
                }
                Some(name) => {
                    self.queued.remove(&name);
                    // Claimed under the queue lock so idle checks never see
                    // a task that is neither queued nor active.
                    self.active.insert(name.clone(), ());
                    return Some(name);
                }
                None => {
                    self.notify
                        .wait_for(&mut queue, Duration::from_millis(200));
                }
            }
        }
    }

    /// Run one task, catching panics so no worker dies and no panic crosses
    /// the component boundary. The name is already claimed in `active`.
    fn execute(&self, name: String) {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.build_component(&name)
        }));

        self.active.remove(&name);

        if outcome.is_err() {
            crate::log!("build"; "build task for `{}` panicked", name);
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.registry.set_unbuildable(&name, true);
            self.bus.publish(Event::BuildFailed {
                name: name.clone(),
                diagnostics: vec![Diagnostic::error(&name, 0, 0, "build task panicked")],
            });
        }
    }

    // ------------------------------------------------------------------
    // Per-task algorithm
    // ------------------------------------------------------------------

    fn build_component(&self, name: &str) {
        let Some(component) = self.registry.get(name) else {
            crate::debug!("build"; "`{}` vanished from registry, skipping", name);
            return;
        };

        let started = Instant::now();
        self.bus.publish(Event::BuildStarted {
            name: name.to_string(),
        });
        self.monitor.build_started(name);

        let file = component
            .path
            .strip_prefix(&self.root)
            .unwrap_or(&component.path)
            .to_string_lossy()
            .into_owned();

        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            // 1. Read source; an I/O failure here is transient.
            let source = match std::fs::read(&component.path) {
                Ok(source) => source,
                Err(e) => {
                    if self.retry_transient(&mut attempt, &format!("read failed: {e}")) {
                        continue;
                    }
                    self.finish_failed(
                        name,
                        started,
                        None,
                        vec![Diagnostic::error(
                            &file,
                            0,
                            0,
                            format!("cannot read source: {e}"),
                        )],
                    );
                    return;
                }
            };

            // 2. Fingerprint from source bytes + generator version + flags.
            let flags: Vec<String> = self.argv[1..].to_vec();
            let fingerprint = Fingerprint::compute(&source, &self.generator_version, &flags);

            let mut build_task = BuildTask {
                component: name.to_string(),
                input_hash: fingerprint,
                submitted: started,
                attempt,
            };

            // 3. Cache lookup.
            if let Some(entry) = self.cache.lookup(&fingerprint) {
                let changed = self.note_artifact(name, hash_bytes(&entry.artifact));
                self.registry.record_built(name, fingerprint);
                self.cached.fetch_add(1, Ordering::Relaxed);
                self.finish_completed(
                    &build_task,
                    BuildStatus::Cached,
                    started,
                    changed,
                    entry.diagnostics.clone(),
                );
                return;
            }

            // 4. Validate the full argv, file argument included.
            let mut argv = self.argv.clone();
            argv.push(file.clone());
            if let Err(e) = command::validate_command(&argv, &self.allowlist) {
                crate::log!("build"; "refusing to build `{}`: {}", name, e);
                self.finish_failed(
                    name,
                    started,
                    Some(fingerprint),
                    vec![Diagnostic::error(&file, 0, 0, e.to_string())],
                );
                return;
            }

            // 5. Invoke the generator.
            match task::invoke_generator(&argv, &self.root, &file, &self.cancel) {
                InvokeOutcome::Success {
                    artifact,
                    diagnostics,
                } => {
                    let artifact_hash = hash_bytes(&artifact);
                    self.cache.store(fingerprint, artifact, diagnostics.clone());
                    let changed = self.note_artifact(name, artifact_hash);
                    self.registry.record_built(name, fingerprint);
                    self.completed.fetch_add(1, Ordering::Relaxed);
                    build_task.attempt = attempt;
                    self.finish_completed(
                        &build_task,
                        BuildStatus::Success,
                        started,
                        changed,
                        diagnostics,
                    );
                    return;
                }
                InvokeOutcome::Failed { diagnostics } => {
                    self.finish_failed(name, started, Some(fingerprint), diagnostics);
                    return;
                }
                InvokeOutcome::Transient { reason } => {
                    if self.retry_transient(&mut attempt, &reason) {
                        continue;
                    }
                    self.finish_failed(
                        name,
                        started,
                        Some(fingerprint),
                        vec![Diagnostic::error(&file, 0, 0, reason)],
                    );
                    return;
                }
                InvokeOutcome::Cancelled => {
                    crate::debug!("build"; "`{}` cancelled, result discarded", name);
                    return;
                }
            }
        }
    }

    /// Record a transient failure; returns true when a retry should run.
    fn retry_transient(&self, attempt: &mut u32, reason: &str) -> bool {
        if *attempt >= self.retry_attempts || self.cancel.is_cancelled() {
            return false;
        }
        *attempt += 1;
        self.retries.fetch_add(1, Ordering::Relaxed);
        crate::debug!("build"; "transient failure ({}), retry {}/{}", reason, attempt, self.retry_attempts);
        task::backoff(*attempt, &self.cancel);
        true
    }

    fn finish_completed(
        &self,
        build_task: &BuildTask,
        status: BuildStatus,
        started: Instant,
        artifact_changed: bool,
        diagnostics: Vec<Diagnostic>,
    ) {
        let duration = started.elapsed();
        self.results.insert(
            build_task.component.clone(),
            BuildResult {
                component: build_task.component.clone(),
                status: match status {
                    BuildStatus::Success => ResultStatus::Success,
                    BuildStatus::Cached => ResultStatus::Cached,
                },
                diagnostics,
                duration,
                input_hash: Some(build_task.input_hash),
            },
        );
        self.monitor
            .build_finished(&build_task.component, status.label(), duration);
        self.bus.publish(Event::BuildCompleted {
            name: build_task.component.clone(),
            status,
            duration,
            artifact_changed,
        });

        if artifact_changed {
            let dependents = self.registry.dependents(&build_task.component);
            if !dependents.is_empty() {
                crate::debug!(
                    "build";
                    "artifact changed, requeueing {} dependent(s) of `{}`",
                    dependents.len(),
                    build_task.component
                );
                self.submit(dependents);
            }
        }
    }

    fn finish_failed(
        &self,
        name: &str,
        started: Instant,
        input_hash: Option<Fingerprint>,
        diagnostics: Vec<Diagnostic>,
    ) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.registry.set_unbuildable(name, true);
        self.results.insert(
            name.to_string(),
            BuildResult {
                component: name.to_string(),
                status: ResultStatus::Failure,
                diagnostics: diagnostics.clone(),
                duration: started.elapsed(),
                input_hash,
            },
        );
        self.monitor
            .build_finished(name, "failure", started.elapsed());
        self.bus.publish(Event::BuildFailed {
            name: name.to_string(),
            diagnostics,
        });
    }

    /// Track the latest artifact hash; returns whether it changed.
    fn note_artifact(&self, name: &str, hash: ContentHash) -> bool {
        match self.last_artifact.insert(name.to_string(), hash) {
            Some(previous) => previous != hash,
            None => true,
        }
    }
}

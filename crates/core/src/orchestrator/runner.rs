//! Update orchestrator implementation.
//!
//! Session state lives behind a single mutex shared by the public operations
//! and one delivery task. Fetches run as spawned tasks and report back through
//! a channel; the delivery task is the only place a running cycle advances.
//! Events are queued under the lock and handed to the listener after it is
//! released, in the order they were produced.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::PersistentCache;
use crate::manifest::{validate_manifest_url, ManifestDocument, ManifestError};
use crate::metrics;
use crate::request::{FetchTag, ManifestRequest, ResourceRequest, SessionTag};
use crate::transport::{ManifestResponse, ResourceResponse, Transport, TransportError};

use super::config::OrchestratorConfig;
use super::types::{CacheEvent, EventCallback, OrchestratorError, OrchestratorStatus, Status};

/// A finished fetch (or watchdog tick) on its way to the delivery task.
enum Completion {
    Manifest {
        request: ManifestRequest,
        result: Result<ManifestResponse, TransportError>,
    },
    Resource {
        request: ResourceRequest,
        result: Result<ResourceResponse, TransportError>,
    },
    StallCheck {
        tag: FetchTag,
    },
}

impl Completion {
    fn tag(&self) -> FetchTag {
        match self {
            Completion::Manifest { request, .. } => request.tag,
            Completion::Resource { request, .. } => request.tag,
            Completion::StallCheck { tag } => *tag,
        }
    }
}

/// Bookkeeping for one update cycle.
struct CycleContext {
    id: u64,
    started: Instant,
    total: usize,
    loaded: usize,
    loaded_at_last_check: usize,
    tasks: Vec<AbortHandle>,
}

impl CycleContext {
    fn cancel(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

struct SessionState {
    status: Status,
    manifest_url: Option<Url>,
    last_cycle: u64,
    cycle: Option<CycleContext>,
    generation: u64,
    events: VecDeque<CacheEvent>,
    dispatching: bool,
}

struct Shared {
    config: OrchestratorConfig,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn PersistentCache>,
    session: SessionTag,
    state: Mutex<SessionState>,
    listener: RwLock<Option<EventCallback>>,
    completions: mpsc::UnboundedSender<Completion>,
}

/// Drives manifest checks and resource downloads for one manifest URL.
///
/// Every operation returns immediately; progress is reported through the
/// event listener. Operations must be called from within a Tokio runtime.
pub struct UpdateOrchestrator {
    shared: Arc<Shared>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Completion>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateOrchestrator {
    /// Create a new orchestrator in the `Uncached` state.
    pub fn new(
        config: OrchestratorConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn PersistentCache>,
    ) -> Self {
        let (completions, receiver) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                cache,
                session: SessionTag::new(),
                state: Mutex::new(SessionState {
                    status: Status::Uncached,
                    manifest_url: None,
                    last_cycle: 0,
                    cycle: None,
                    generation: 0,
                    events: VecDeque::new(),
                    dispatching: false,
                }),
                listener: RwLock::new(None),
                completions,
            }),
            receiver: Mutex::new(Some(receiver)),
            driver: Mutex::new(None),
        }
    }

    /// Install the event listener, replacing any previous one.
    pub fn set_event_listener(&self, listener: EventCallback) {
        *self
            .shared
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    pub fn session(&self) -> SessionTag {
        self.shared.session
    }

    pub fn cache(&self) -> Arc<dyn PersistentCache> {
        Arc::clone(&self.shared.cache)
    }

    /// The newest manifest held by the persistent cache.
    pub fn stored_manifest(&self) -> Result<Option<ManifestDocument>, OrchestratorError> {
        Ok(self.shared.cache.stored_manifest()?)
    }

    /// Bind the session to `manifest_url` and start the first cycle.
    pub fn init(&self, manifest_url: &str) -> Result<(), OrchestratorError> {
        let mut url = Url::parse(manifest_url).map_err(|e| ManifestError::InvalidManifestUrl {
            url: manifest_url.to_string(),
            reason: e.to_string(),
        })?;
        validate_manifest_url(&url)?;
        url.set_fragment(None);

        {
            let mut state = self.shared.lock();
            if state.status != Status::Uncached {
                return Err(OrchestratorError::InvalidState(
                    "already initialized".to_string(),
                ));
            }

            self.start_driver();
            info!(
                manifest_url = %url,
                session = %self.shared.session,
                "Initializing application cache"
            );
            state.manifest_url = Some(url);
            self.shared.begin_cycle(&mut state);
        }

        self.shared.dispatch_events();
        Ok(())
    }

    /// Start a new cycle.
    ///
    /// Returns `Ok(false)` without doing anything when a cycle is already in
    /// flight. With `force` the cached manifest validators are dropped so the
    /// manifest is fetched unconditionally.
    pub fn update(&self, force: bool) -> Result<bool, OrchestratorError> {
        let started = {
            let mut state = self.shared.lock();
            let status = state.status;
            match status {
                Status::Uncached => {
                    return Err(OrchestratorError::InvalidState("init required".to_string()));
                }
                _ if status.is_busy() => {
                    debug!(status = status.as_str(), "Update already in progress");
                    false
                }
                _ => {
                    if force {
                        if let Some(url) = state.manifest_url.clone() {
                            self.shared.cache.invalidate_manifest(&url, true)?;
                        }
                    }
                    info!(force, "Starting update");
                    self.shared.begin_cycle(&mut state);
                    true
                }
            }
        };

        self.shared.dispatch_events();
        Ok(started)
    }

    /// Cancel every fetch of the running cycle and return to `Idle`.
    ///
    /// Does nothing before `init`.
    pub fn abort(&self) {
        let mut state = self.shared.lock();
        if state.status == Status::Uncached {
            debug!("Abort before init ignored");
            return;
        }

        let busy = state.status.is_busy();
        if let Some(mut cycle) = state.cycle.take() {
            cycle.cancel();
            if busy {
                metrics::UPDATE_CYCLES.with_label_values(&["aborted"]).inc();
                info!(
                    cycle = cycle.id,
                    loaded = cycle.loaded,
                    total = cycle.total,
                    "Update aborted"
                );
            }
        }
        state.status = Status::Idle;
    }

    /// Make the freshly downloaded generation the active one.
    pub fn swap_cache(&self) -> Result<(), OrchestratorError> {
        let mut state = self.shared.lock();
        if state.status != Status::UpdateReady {
            return Err(OrchestratorError::InvalidState("not ready".to_string()));
        }

        state.generation += 1;
        state.status = Status::Idle;
        info!(generation = state.generation, "Swapped to new cache generation");
        Ok(())
    }

    pub fn status(&self) -> Status {
        self.shared.lock().status
    }

    pub fn snapshot(&self) -> OrchestratorStatus {
        let state = self.shared.lock();
        let (loaded, total) = state
            .cycle
            .as_ref()
            .map(|c| (c.loaded, c.total))
            .unwrap_or((0, 0));

        OrchestratorStatus {
            status: state.status,
            manifest_url: state.manifest_url.as_ref().map(Url::to_string),
            session: self.shared.session,
            cycle: state.last_cycle,
            loaded,
            total,
            generation: state.generation,
        }
    }

    fn start_driver(&self) {
        let mut driver = lock_or_recover(&self.driver);
        if driver.is_some() {
            return;
        }
        let Some(mut receiver) = lock_or_recover(&self.receiver).take() else {
            return;
        };

        let shared = Arc::clone(&self.shared);
        *driver = Some(tokio::spawn(async move {
            debug!(session = %shared.session, "Delivery task started");
            while let Some(completion) = receiver.recv().await {
                shared.deliver(completion);
            }
        }));
    }

    #[cfg(test)]
    fn deliver_for_test(&self, completion: Completion) {
        self.shared.deliver(completion);
    }
}

impl Drop for UpdateOrchestrator {
    fn drop(&mut self) {
        if let Some(driver) = lock_or_recover(&self.driver).take() {
            driver.abort();
        }
        if let Some(cycle) = self.shared.lock().cycle.as_mut() {
            cycle.cancel();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock_or_recover(&self.state)
    }

    /// Start a cycle: status `Checking` and a conditional manifest fetch.
    fn begin_cycle(&self, state: &mut SessionState) {
        let Some(url) = state.manifest_url.clone() else {
            return;
        };
        if let Some(mut previous) = state.cycle.take() {
            previous.cancel();
        }

        state.last_cycle += 1;
        let tag = FetchTag {
            session: self.session,
            cycle: state.last_cycle,
        };

        let cached = self.cache.get(&url).unwrap_or_else(|e| {
            warn!(error = %e, "Could not read cached manifest, fetching unconditionally");
            None
        });
        let request = ManifestRequest::new(url, cached, tag);

        let transport = Arc::clone(&self.transport);
        let completions = self.completions.clone();
        let task = tokio::spawn(async move {
            debug!(url = %request.url, tag = %request.tag, "Fetching manifest");
            let result = transport.fetch_manifest(&request).await;
            let _ = completions.send(Completion::Manifest { request, result });
        });

        state.cycle = Some(CycleContext {
            id: tag.cycle,
            started: Instant::now(),
            total: 0,
            loaded: 0,
            loaded_at_last_check: 0,
            tasks: vec![task.abort_handle()],
        });
        state.status = Status::Checking;
        state.events.push_back(CacheEvent::Checking);
    }

    fn deliver(&self, completion: Completion) {
        let tag = completion.tag();
        {
            let mut state = self.lock();
            if !self.is_live(&state, tag) {
                debug!(tag = %tag, "Dropping completion of a finished cycle");
                metrics::STALE_COMPLETIONS.inc();
                return;
            }

            match completion {
                Completion::Manifest { request, result } => {
                    self.on_manifest(&mut state, request, result)
                }
                Completion::Resource { request, result } => {
                    self.on_resource(&mut state, request, result)
                }
                Completion::StallCheck { .. } => self.on_stall_check(&mut state),
            }
        }
        self.dispatch_events();
    }

    fn is_live(&self, state: &SessionState, tag: FetchTag) -> bool {
        tag.session == self.session
            && state.status.is_busy()
            && state.cycle.as_ref().is_some_and(|c| c.id == tag.cycle)
    }

    fn on_manifest(
        &self,
        state: &mut SessionState,
        request: ManifestRequest,
        result: Result<ManifestResponse, TransportError>,
    ) {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::MANIFEST_FETCHES.with_label_values(&["failed"]).inc();
                self.fail_cycle(state, &request.url, e.to_string());
                return;
            }
        };
        let outcome = if response.not_modified {
            "not_modified"
        } else {
            "fetched"
        };
        metrics::MANIFEST_FETCHES.with_label_values(&[outcome]).inc();

        let plan = match self.plan_downloads(&request, &response) {
            Ok(plan) => plan,
            Err(e) => {
                self.fail_cycle(state, &request.url, e.to_string());
                return;
            }
        };

        if plan.is_empty() {
            info!(cycle = request.tag.cycle, "Cache is up to date");
            state.status = Status::Idle;
            state.events.push_back(CacheEvent::NoUpdate);
            self.finish_cycle(state, "no_update");
            return;
        }

        let total = plan.len();
        let mut tasks = Vec::with_capacity(total + 1);
        for url in plan {
            let cached = self.cache.get(&url).unwrap_or_else(|e| {
                warn!(url = %url, error = %e, "Could not read cached entry");
                None
            });
            tasks.push(self.spawn_resource_fetch(ResourceRequest::new(
                url,
                total,
                cached,
                request.tag,
            )));
        }
        if self.config.stall_timeout_secs > 0 {
            tasks.push(self.spawn_watchdog(
                request.tag,
                Duration::from_secs(self.config.stall_timeout_secs),
            ));
        }

        if let Some(cycle) = state.cycle.as_mut() {
            cycle.total = total;
            cycle.loaded = 0;
            cycle.loaded_at_last_check = 0;
            cycle.tasks.extend(tasks);
        }
        info!(cycle = request.tag.cycle, total, "Downloading resources");
        state.status = Status::Downloading;
        state.events.push_back(CacheEvent::Downloading { total });
    }

    /// Record the manifest response and work out which resources to fetch.
    fn plan_downloads(
        &self,
        request: &ManifestRequest,
        response: &ManifestResponse,
    ) -> Result<Vec<Url>, OrchestratorError> {
        let fetched = request.parse_response(response, self.config.manifest_options())?;
        self.cache.put(&request.url, &fetched.entry)?;

        if !fetched.not_modified || self.cache.stored_manifest()?.is_none() {
            self.cache.store_manifest(&fetched.document)?;
            let marked = self.cache.mark_pending_master_entries()?;
            debug!(entries = marked, "Marked master entries pending");
        }

        Ok(self.cache.pending_master_entries()?)
    }

    fn on_resource(
        &self,
        state: &mut SessionState,
        request: ResourceRequest,
        result: Result<ResourceResponse, TransportError>,
    ) {
        let url = request.url.clone();
        let stored = result
            .and_then(|response| request.into_entry(response))
            .map_err(|e| e.to_string())
            .and_then(|entry| {
                self.cache
                    .put(&url, &entry)
                    .map(|_| entry.body.len())
                    .map_err(|e| e.to_string())
            });

        let bytes = match stored {
            Ok(bytes) => bytes,
            Err(message) => {
                metrics::RESOURCE_FETCHES.with_label_values(&["failed"]).inc();
                warn!(url = %url, error = %message, "Resource fetch failed");
                state.events.push_back(CacheEvent::Error {
                    manifest: false,
                    url: url.to_string(),
                    message,
                });
                return;
            }
        };
        metrics::RESOURCE_FETCHES.with_label_values(&["stored"]).inc();
        metrics::RESOURCE_BYTES_STORED.inc_by(bytes as u64);

        let Some(cycle) = state.cycle.as_mut() else {
            return;
        };
        cycle.loaded += 1;
        let (loaded, total) = (cycle.loaded, cycle.total);
        debug!(url = %url, loaded, total, "Stored resource");

        state.events.push_back(CacheEvent::Progress {
            url: url.to_string(),
            loaded,
            total,
        });
        if loaded == total {
            info!(total, "All resources stored, update ready");
            state.status = Status::UpdateReady;
            state.events.push_back(CacheEvent::UpdateReady);
            self.finish_cycle(state, "update_ready");
        }
    }

    fn on_stall_check(&self, state: &mut SessionState) {
        if state.status != Status::Downloading {
            return;
        }
        let Some(cycle) = state.cycle.as_mut() else {
            return;
        };

        let stalled = cycle.loaded == cycle.loaded_at_last_check;
        cycle.loaded_at_last_check = cycle.loaded;
        let (loaded, total) = (cycle.loaded, cycle.total);

        if stalled {
            warn!(loaded, total, "Download made no progress");
            metrics::STALL_DETECTIONS.inc();
            state.events.push_back(CacheEvent::Stalled { loaded, total });
        }
    }

    fn fail_cycle(&self, state: &mut SessionState, manifest_url: &Url, message: String) {
        warn!(manifest_url = %manifest_url, error = %message, "Manifest check failed, cache is obsolete");
        state.status = Status::Obsolete;
        state.events.push_back(CacheEvent::Error {
            manifest: true,
            url: manifest_url.to_string(),
            message,
        });
        state.events.push_back(CacheEvent::Obsolete);
        self.finish_cycle(state, "obsolete");
    }

    /// Stop what is left of the cycle (the watchdog) and record its outcome.
    fn finish_cycle(&self, state: &mut SessionState, result: &str) {
        if let Some(cycle) = state.cycle.as_mut() {
            cycle.cancel();
            metrics::UPDATE_CYCLES.with_label_values(&[result]).inc();
            metrics::UPDATE_CYCLE_DURATION
                .with_label_values(&[result])
                .observe(cycle.started.elapsed().as_secs_f64());
        }
    }

    fn spawn_resource_fetch(&self, request: ResourceRequest) -> AbortHandle {
        let transport = Arc::clone(&self.transport);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            debug!(url = %request.url, tag = %request.tag, "Fetching resource");
            let result = transport.fetch_resource(&request).await;
            let _ = completions.send(Completion::Resource { request, result });
        })
        .abort_handle()
    }

    fn spawn_watchdog(&self, tag: FetchTag, period: Duration) -> AbortHandle {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if completions.send(Completion::StallCheck { tag }).is_err() {
                    break;
                }
            }
        })
        .abort_handle()
    }

    /// Hand queued events to the listener outside the state lock.
    ///
    /// Events queued by a listener that calls back into the orchestrator are
    /// delivered by the outer call, after the current event.
    fn dispatch_events(&self) {
        {
            let mut state = self.lock();
            if state.dispatching || state.events.is_empty() {
                return;
            }
            state.dispatching = true;
        }

        loop {
            let event = {
                let mut state = self.lock();
                match state.events.pop_front() {
                    Some(event) => event,
                    None => {
                        state.dispatching = false;
                        return;
                    }
                }
            };

            debug!(event = event.name(), "Emitting cache event");
            let listener = self
                .listener
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(listener) = listener {
                listener(&event);
            }
        }
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

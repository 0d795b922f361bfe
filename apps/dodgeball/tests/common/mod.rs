//! Shared fakes for the engine integration tests.
//!
//! - [`FakeService`] replays scripted verification snapshots
//! - [`FakeSpec`] registers a recording integration in a registry
//! - [`InlineFetcher`] / [`FailingFetcher`] stand in for module download
//! - [`RecordingHandler`] captures terminal callbacks

#![allow(dead_code, clippy::unwrap_used, clippy::panic)]

use async_trait::async_trait;
use dodgeball::{
    Dodgeball, Integration, IntegrationConfig, IntegrationLoader, IntegrationRegistry,
    MemorySourceIdStore, ModuleFetcher, ModuleOrigin, ModuleSource, SharedIntegration,
    StepContext, StepResponder, StepSubmission, VerificationHandler, VerificationService,
};
use dodgeball_core::{
    DodgeballConfig, DodgeballError, Fingerprint, InitConfig, IntegrationPurpose, LibConfig,
    LibContent, Purposes, StepResponse, Verification, VerificationOutcome, VerificationStatus,
    VerificationStep,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// FIXTURES
// =============================================================================

pub fn content(name: &str) -> LibContent {
    LibContent::from_url(format!("https://cdn.example.com/{name}.js"))
}

pub fn lib(name: &str) -> LibConfig {
    LibConfig::new(name).with_content(content(name))
}

pub fn step(id: &str, name: &str) -> VerificationStep {
    VerificationStep::new(id, name)
        .with_verification_step_id(format!("vs-{id}"))
        .with_content(content(name))
}

pub fn snapshot(outcome: VerificationOutcome, steps: Vec<VerificationStep>) -> Verification {
    let status = match outcome {
        VerificationOutcome::Pending | VerificationOutcome::Waiting | VerificationOutcome::Blocked => {
            VerificationStatus::Pending
        }
        VerificationOutcome::Error => VerificationStatus::Failed,
        _ => VerificationStatus::Complete,
    };
    Verification::new("v-1", status, outcome).with_steps(steps)
}

/// Config with a short poll interval so real-time tests stay fast.
pub fn fast_config() -> DodgeballConfig {
    DodgeballConfig {
        poll_interval_ms: 5,
        load_timeout_ms: 500,
        max_poll_failures: 3,
        ..DodgeballConfig::default()
    }
}

// =============================================================================
// FAKE VERIFICATION SERVICE
// =============================================================================

/// Scripted [`VerificationService`].
///
/// Snapshots are served in order; the last one repeats forever.
pub struct FakeService {
    init: Mutex<Result<InitConfig, DodgeballError>>,
    snapshots: Mutex<VecDeque<Result<Verification, DodgeballError>>>,
    identify_result: Mutex<Result<String, DodgeballError>>,
    identify_ids: Mutex<VecDeque<String>>,
    submit_fails: AtomicBool,
    pub polls: AtomicUsize,
    pub identify_calls: AtomicUsize,
    pub previous_ids: Mutex<Vec<Option<String>>>,
    pub fingerprints: Mutex<Vec<Fingerprint>>,
    pub submissions: Mutex<Vec<StepSubmission>>,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            init: Mutex::new(Ok(InitConfig::default())),
            snapshots: Mutex::new(VecDeque::new()),
            identify_result: Mutex::new(Ok("src-1".to_string())),
            identify_ids: Mutex::new(VecDeque::new()),
            submit_fails: AtomicBool::new(false),
            polls: AtomicUsize::new(0),
            identify_calls: AtomicUsize::new(0),
            previous_ids: Mutex::new(Vec::new()),
            fingerprints: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init(self, init: Result<InitConfig, DodgeballError>) -> Self {
        *self.init.lock().unwrap() = init;
        self
    }

    pub fn with_identify(self, result: Result<String, DodgeballError>) -> Self {
        *self.identify_result.lock().unwrap() = result;
        self
    }

    /// Hand out these ids, one per identify call, before the fixed result.
    pub fn with_identify_sequence(self, ids: &[&str]) -> Self {
        *self.identify_ids.lock().unwrap() = ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    pub fn with_snapshots(self, snapshots: Vec<Result<Verification, DodgeballError>>) -> Self {
        *self.snapshots.lock().unwrap() = snapshots.into();
        self
    }

    pub fn failing_submissions(self) -> Self {
        self.submit_fails.store(true, Ordering::SeqCst);
        self
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<StepSubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl VerificationService for FakeService {
    async fn init_config(&self) -> Result<InitConfig, DodgeballError> {
        self.init.lock().unwrap().clone()
    }

    async fn verification(&self, _verification_id: &str) -> Result<Verification, DodgeballError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots.len() > 1 {
            return snapshots.pop_front().unwrap();
        }
        snapshots
            .front()
            .cloned()
            .unwrap_or_else(|| Err(DodgeballError::ServerError(404, "no snapshot".to_string())))
    }

    async fn identify(
        &self,
        fingerprints: &[Fingerprint],
        source_id: Option<&str>,
    ) -> Result<String, DodgeballError> {
        self.identify_calls.fetch_add(1, Ordering::SeqCst);
        self.previous_ids
            .lock()
            .unwrap()
            .push(source_id.map(str::to_string));
        self.fingerprints
            .lock()
            .unwrap()
            .extend_from_slice(fingerprints);
        let queued = self.identify_ids.lock().unwrap().pop_front();
        // Yield like a network round trip so concurrent callers interleave.
        tokio::task::yield_now().await;
        match queued {
            Some(id) => Ok(id),
            None => self.identify_result.lock().unwrap().clone(),
        }
    }

    async fn submit_step_response(
        &self,
        submission: &StepSubmission,
    ) -> Result<(), DodgeballError> {
        self.submissions.lock().unwrap().push(submission.clone());
        if self.submit_fails.load(Ordering::SeqCst) {
            return Err(DodgeballError::ServerError(500, "down".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// FAKE INTEGRATION
// =============================================================================

/// Counters and an ordered event log shared by every instance of a spec.
#[derive(Default)]
pub struct Counters {
    pub constructed: AtomicUsize,
    pub loads: AtomicUsize,
    pub configures: AtomicUsize,
    pub reconfigures: AtomicUsize,
    pub observes: AtomicUsize,
    pub executes: AtomicUsize,
    request_ids: Mutex<Vec<String>>,
}

impl Counters {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn request_ids(&self) -> Vec<String> {
        self.request_ids.lock().unwrap().clone()
    }
}

/// Log of hook calls across integrations, e.g. `"otp:EXECUTE:s1"`.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Blueprint for a fake integration registered under `name`.
#[derive(Clone)]
pub struct FakeSpec {
    pub name: String,
    pub purposes: Purposes,
    pub counters: Arc<Counters>,
    pub events: EventLog,
    pub fail_configure: bool,
    pub fail_reconfigure: bool,
    pub fail_execute: bool,
    pub hang_load: bool,
    pub load_delay: Option<Duration>,
    pub fingerprint: Option<Fingerprint>,
    pub response: Option<Value>,
}

impl FakeSpec {
    pub fn new(name: &str, purposes: impl IntoIterator<Item = IntegrationPurpose>) -> Self {
        Self {
            name: name.to_string(),
            purposes: Purposes::of(purposes),
            counters: Arc::new(Counters::default()),
            events: Arc::new(Mutex::new(Vec::new())),
            fail_configure: false,
            fail_reconfigure: false,
            fail_execute: false,
            hang_load: false,
            load_delay: None,
            fingerprint: None,
            response: None,
        }
    }

    pub fn sharing_events(mut self, events: &EventLog) -> Self {
        self.events = Arc::clone(events);
        self
    }

    pub fn failing_configure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    pub fn failing_reconfigure(mut self) -> Self {
        self.fail_reconfigure = true;
        self
    }

    pub fn failing_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub fn hanging_load(mut self) -> Self {
        self.hang_load = true;
        self
    }

    pub fn slow_load(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn with_fingerprint(mut self, props: Value) -> Self {
        self.fingerprint = Some(Fingerprint::new(self.name.clone(), props));
        self
    }

    pub fn responding(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    /// Add this integration's factory to `registry`.
    pub fn register(&self, registry: IntegrationRegistry) -> IntegrationRegistry {
        let spec = self.clone();
        registry.with(self.name.clone(), move |config: IntegrationConfig, _source: &ModuleSource| {
            spec.counters.constructed.fetch_add(1, Ordering::SeqCst);
            spec.counters
                .request_ids
                .lock()
                .unwrap()
                .push(config.request_id.clone());
            let integration: SharedIntegration = Arc::new(FakeIntegration {
                spec: spec.clone(),
                loaded: AtomicBool::new(false),
            });
            Ok(integration)
        })
    }
}

pub struct FakeIntegration {
    spec: FakeSpec,
    loaded: AtomicBool,
}

impl FakeIntegration {
    fn record(&self, event: String) {
        self.spec.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Integration for FakeIntegration {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn purposes(&self) -> Purposes {
        self.spec.purposes.clone()
    }

    fn has_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn load(&self) -> Result<(), DodgeballError> {
        self.spec.counters.loads.fetch_add(1, Ordering::SeqCst);
        if self.spec.hang_load {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.spec.load_delay {
            tokio::time::sleep(delay).await;
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn configure(&self) -> Result<(), DodgeballError> {
        self.spec.counters.configures.fetch_add(1, Ordering::SeqCst);
        if self.spec.fail_configure {
            return Err(DodgeballError::integration(&self.spec.name, "configure failed"));
        }
        Ok(())
    }

    async fn reconfigure(&self, config: IntegrationConfig) -> Result<(), DodgeballError> {
        self.spec.counters.reconfigures.fetch_add(1, Ordering::SeqCst);
        self.spec
            .counters
            .request_ids
            .lock()
            .unwrap()
            .push(config.request_id);
        if self.spec.fail_reconfigure {
            return Err(DodgeballError::integration(&self.spec.name, "reconfigure failed"));
        }
        Ok(())
    }

    async fn observe(&self, source_id: &str) -> Result<(), DodgeballError> {
        self.spec.counters.observes.fetch_add(1, Ordering::SeqCst);
        self.record(format!("{}:OBSERVE:{}", self.spec.name, source_id));
        Ok(())
    }

    async fn identify(&self) -> Result<Option<Fingerprint>, DodgeballError> {
        self.record(format!("{}:IDENTIFY", self.spec.name));
        Ok(self.spec.fingerprint.clone())
    }

    async fn qualify(&self, _context: &StepContext) -> Result<(), DodgeballError> {
        self.record(format!("{}:QUALIFY", self.spec.name));
        Ok(())
    }

    async fn execute(
        &self,
        step: &VerificationStep,
        _context: &StepContext,
        responder: StepResponder,
    ) -> Result<(), DodgeballError> {
        self.spec.counters.executes.fetch_add(1, Ordering::SeqCst);
        self.record(format!("{}:EXECUTE:{}", self.spec.name, step.id));
        if self.spec.fail_execute {
            return Err(DodgeballError::integration(&self.spec.name, "execute failed"));
        }
        if let Some(response) = &self.spec.response {
            responder.submit(StepResponse::new(response.clone())).await?;
        }
        Ok(())
    }
}

// =============================================================================
// FETCHERS
// =============================================================================

/// Serves every loadable descriptor as inline source.
#[derive(Default)]
pub struct InlineFetcher {
    pub fetches: AtomicUsize,
}

#[async_trait]
impl ModuleFetcher for InlineFetcher {
    async fn fetch(&self, name: &str, content: &LibContent) -> Result<ModuleSource, DodgeballError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(ModuleSource {
            name: name.to_string(),
            origin: content
                .url
                .clone()
                .map(ModuleOrigin::Url)
                .unwrap_or(ModuleOrigin::Inline),
            body: String::new(),
        })
    }
}

/// Fails every fetch, as an unreachable CDN would.
pub struct FailingFetcher;

#[async_trait]
impl ModuleFetcher for FailingFetcher {
    async fn fetch(&self, name: &str, _content: &LibContent) -> Result<ModuleSource, DodgeballError> {
        Err(DodgeballError::integration(name, "script load failed"))
    }
}

pub fn loader(registry: IntegrationRegistry) -> Arc<IntegrationLoader> {
    Arc::new(IntegrationLoader::new(registry, Arc::new(InlineFetcher::default())))
}

// =============================================================================
// HANDLER
// =============================================================================

/// Records which terminal callback fired.
#[derive(Default)]
pub struct RecordingHandler {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VerificationHandler for RecordingHandler {
    async fn on_verified(&self, verification: &Verification) {
        self.push(format!("verified:{}", verification.id));
    }

    async fn on_denied(&self, verification: &Verification) {
        self.push(format!("denied:{}", verification.id));
    }

    async fn on_error(&self, message: &str) {
        self.push(format!("error:{message}"));
    }

    async fn on_approved(&self, verification: Option<&Verification>) {
        self.push(format!("approved:{}", verification.is_some()));
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// A context wired to fakes only.
pub fn context(service: Arc<FakeService>, registry: IntegrationRegistry) -> Dodgeball {
    Dodgeball::builder("pk_test")
        .config(fast_config())
        .registry(registry)
        .service(service)
        .fetcher(Arc::new(InlineFetcher::default()))
        .store(Arc::new(MemorySourceIdStore::new()))
        .build()
}

/// Let spawned observers run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}

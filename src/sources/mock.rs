//! Scripted source for testing purposes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::{CasNumber, SdsHit};
use crate::sources::{Source, SourceCapabilities, SourceError};

/// Scripted outcome of one lookup
#[derive(Debug, Clone)]
pub enum Script {
    Hit(SdsHit),
    Miss,
    UpstreamError,
    Timeout,
    /// Never completes
    Hang,
}

/// A source that returns predefined outcomes and records how it was called.
#[derive(Debug)]
pub struct ScriptedSource {
    id: String,
    capabilities: SourceCapabilities,
    default: Script,
    responses: HashMap<String, Script>,
    delay: Duration,
    delays: HashMap<String, Duration>,
    failures_before: usize,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedSource {
    /// Create a source that finds nothing, serving both lookup kinds
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: SourceCapabilities::BY_CAS | SourceCapabilities::BY_NAME,
            default: Script::Miss,
            responses: HashMap::new(),
            delay: Duration::ZERO,
            delays: HashMap::new(),
            failures_before: 0,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Answer every lookup with the given document URL
    pub fn hit(mut self, url: impl Into<String>) -> Self {
        self.default = Script::Hit(SdsHit::new(url));
        self
    }

    /// Outcome for identifiers without a specific response
    pub fn script(mut self, script: Script) -> Self {
        self.default = script;
        self
    }

    /// Outcome for one identifier
    pub fn respond(mut self, identifier: impl Into<String>, script: Script) -> Self {
        self.responses.insert(identifier.into(), script);
        self
    }

    /// Latency applied before every answer
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Latency for one identifier
    pub fn delay_for(mut self, identifier: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(identifier.into(), delay);
        self
    }

    /// Fail the first `n` calls with an upstream error
    pub fn fail_first(mut self, n: usize) -> Self {
        self.failures_before = n;
        self
    }

    /// Number of lookups performed
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identifiers looked up, in call order
    pub fn seen(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn run(&self, key: &str) -> Result<Option<SdsHit>, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key.to_string());

        let delay = self.delays.get(key).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if call < self.failures_before {
            return Err(SourceError::Api(format!(
                "{} scripted failure #{}",
                self.id,
                call + 1
            )));
        }

        match self.responses.get(key).unwrap_or(&self.default) {
            Script::Hit(hit) => Ok(Some(hit.clone())),
            Script::Miss => Ok(None),
            Script::UpstreamError => Err(SourceError::Api(format!("{} returned status: 503", self.id))),
            Script::Timeout => Err(SourceError::Timeout),
            Script::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    async fn search_by_cas(&self, cas: &CasNumber) -> Result<Option<SdsHit>, SourceError> {
        self.run(cas.as_str()).await
    }

    async fn search_by_name(&self, name: &str) -> Result<Option<SdsHit>, SourceError> {
        self.run(name).await
    }
}

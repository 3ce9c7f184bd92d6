//! Batch resolution: worker pool, provider fan-out, budgets and deadlines.
//!
//! Each identifier in a batch walks the registry's provider list for its lookup kind
//! until one provider reports a document. The provider list order is the priority; the
//! fan-out policy only decides whether the providers are polled one after another or
//! all at once. Three bounds apply:
//!
//! - each provider call is bounded by `resolver.adapter_timeout_secs`
//! - all calls for one identifier share `resolver.identifier_timeout_secs`
//! - the whole batch ends at `resolver.batch_timeout_secs`; identifiers still running
//!   then are reported as timed out
//!
//! Downloads start once resolution has finished and share what is left of the batch
//! deadline. A download cut off by the deadline leaves its row found, without a file.
//!
//! # Example
//!
//! ```no_run
//! use sds_finder::{config::get_config, BatchResolver};
//!
//! # async fn run() -> Result<(), sds_finder::ResolveError> {
//! let resolver = BatchResolver::from_config(&get_config())?;
//! let response = resolver.resolve_by_cas(["67-63-0", "64-19-7"], false).await?;
//! println!("{} of {} found", response.found_count, response.total_searched);
//! # Ok(())
//! # }
//! ```

mod aggregate;

pub use aggregate::aggregate;

use futures_util::stream::{self, FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant as StdInstant;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;

use crate::config::{Config, FanOut, ResolverConfig};
use crate::models::{
    BatchEntry, BatchError, BatchRequest, BatchResponse, ErrorKind, Identifier, ProviderResult,
    ResolutionRecord, SearchMode,
};
use crate::sources::{RegistryError, Source, SourceError, SourceRegistry};
use crate::storage::{Materializer, StorageError};
use crate::utils::{with_retry, HttpClient};

/// Errors that fail a whole operation rather than one identifier
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("Invalid source configuration: {0}")]
    Registry(#[from] RegistryError),

    #[error("HTTP client error: {0}")]
    Http(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("No download storage configured")]
    NoStorage,
}

/// Resolves batches of identifiers against a provider registry
#[derive(Debug, Clone)]
pub struct BatchResolver {
    registry: Arc<SourceRegistry>,
    config: ResolverConfig,
    materializer: Option<Materializer>,
}

impl BatchResolver {
    /// Resolver over an existing registry, without download storage
    pub fn new(registry: Arc<SourceRegistry>, config: ResolverConfig) -> Self {
        Self {
            registry,
            config,
            materializer: None,
        }
    }

    /// Build the built-in registry, HTTP client and download storage from configuration
    pub fn from_config(config: &Config) -> Result<Self, ResolveError> {
        let client = HttpClient::from_config(&config.http)?;
        let registry = SourceRegistry::from_config(&config.sources, &client)?;
        let materializer =
            Materializer::new(config.downloads.clone(), config.cleanup.clone(), client);

        Ok(Self::new(Arc::new(registry), config.resolver.clone()).with_materializer(materializer))
    }

    /// Enable downloads for batches that request them
    pub fn with_materializer(mut self, materializer: Materializer) -> Self {
        self.materializer = Some(materializer);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn materializer(&self) -> Option<&Materializer> {
        self.materializer.as_ref()
    }

    /// Resolve CAS numbers
    pub async fn resolve_by_cas<I, S>(
        &self,
        identifiers: I,
        download: bool,
    ) -> Result<BatchResponse, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let batch = BatchRequest::new(identifiers, SearchMode::ByCas, download)?;
        Ok(self.resolve(&batch).await)
    }

    /// Resolve product names
    pub async fn resolve_by_name<I, S>(
        &self,
        identifiers: I,
        download: bool,
    ) -> Result<BatchResponse, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let batch = BatchRequest::new(identifiers, SearchMode::ByName, download)?;
        Ok(self.resolve(&batch).await)
    }

    /// Resolve a mix of CAS numbers and product names, each by its own kind
    pub async fn resolve_mixed<I, S>(
        &self,
        identifiers: I,
        download: bool,
    ) -> Result<BatchResponse, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let batch = BatchRequest::new(identifiers, SearchMode::Mixed, download)?;
        Ok(self.resolve(&batch).await)
    }

    /// Fetch a document materialized by an earlier batch
    pub async fn retrieve(&self, request_id: &str, filename: &str) -> Result<Vec<u8>, ResolveError> {
        let materializer = self.materializer.as_ref().ok_or(ResolveError::NoStorage)?;
        Ok(materializer.retrieve(request_id, filename).await?)
    }

    /// Resolve every identifier of a batch.
    ///
    /// Never fails: per-identifier problems are reported in the rows, which keep the
    /// input order.
    pub async fn resolve(&self, batch: &BatchRequest) -> BatchResponse {
        let span = tracing::info_span!(
            "batch",
            request_id = %batch.request_id,
            mode = ?batch.mode,
            size = batch.len()
        );
        self.resolve_batch(batch).instrument(span).await
    }

    async fn resolve_batch(&self, batch: &BatchRequest) -> BatchResponse {
        let started = StdInstant::now();
        let deadline = Instant::now() + self.config.batch_timeout();
        let pool = self.config.worker_pool_size.max(1);

        let mut slots: Vec<Option<ResolutionRecord>> = vec![None; batch.len()];
        let mut work = stream::iter(batch.entries.iter().enumerate())
            .map(|(index, entry)| async move { (index, self.resolve_entry(entry).await) })
            .buffer_unordered(pool);

        let completed = timeout_at(deadline, async {
            while let Some((index, record)) = work.next().await {
                slots[index] = Some(record);
            }
        })
        .await;
        drop(work);

        if completed.is_err() {
            let pending = slots.iter().filter(|slot| slot.is_none()).count();
            tracing::warn!(
                "Batch deadline of {:?} reached with {} identifiers unresolved",
                self.config.batch_timeout(),
                pending
            );
        }

        let mut records: Vec<ResolutionRecord> = batch
            .entries
            .iter()
            .zip(slots)
            .map(|(entry, slot)| slot.unwrap_or_else(|| ResolutionRecord::timed_out(entry)))
            .collect();

        if batch.download {
            self.download_hits(batch, &mut records, deadline).await;
        }

        let response = aggregate(batch.request_id, records);
        tracing::info!(
            "Resolved {}/{} identifiers in {:.2?}",
            response.found_count,
            response.total_searched,
            started.elapsed()
        );
        response
    }

    async fn resolve_entry(&self, entry: &BatchEntry) -> ResolutionRecord {
        let identifier = match &entry.parsed {
            Ok(identifier) => identifier,
            Err(e) => {
                tracing::debug!("Skipping invalid identifier {:?}: {}", entry.raw, e);
                return ResolutionRecord::invalid(&entry.raw, e);
            }
        };

        let mut record = self.resolve_identifier(identifier).await;
        record.identifier = entry.raw.clone();
        record
    }

    /// Walk the providers for one identifier within its budget
    pub async fn resolve_identifier(&self, identifier: &Identifier) -> ResolutionRecord {
        let kind = identifier.kind();
        let providers = self.registry.providers_for(kind);
        if providers.is_empty() {
            tracing::warn!("No enabled source can look up by {}", kind);
            return ResolutionRecord::not_found(identifier, ErrorKind::UnsupportedMode);
        }

        let deadline = Instant::now() + self.config.identifier_timeout();
        let winner = match self.config.fan_out.for_kind(kind) {
            FanOut::Sequential => self.poll_sequential(identifier, &providers, deadline).await,
            FanOut::Concurrent => self.poll_concurrent(identifier, &providers, deadline).await,
        };

        match winner {
            Some(result) => ResolutionRecord::found(identifier, result),
            None if Instant::now() >= deadline => {
                tracing::warn!(
                    "{} exhausted its {:?} budget",
                    identifier,
                    self.config.identifier_timeout()
                );
                ResolutionRecord::not_found(identifier, ErrorKind::Timeout)
            }
            None => ResolutionRecord::not_found(identifier, ErrorKind::NotFound),
        }
    }

    /// Providers one at a time; the first hit ends the walk
    async fn poll_sequential(
        &self,
        identifier: &Identifier,
        providers: &[Arc<dyn Source>],
        deadline: Instant,
    ) -> Option<ProviderResult> {
        for (position, source) in providers.iter().enumerate() {
            if Instant::now() >= deadline {
                tracing::debug!(
                    "{}: budget spent, skipping {} remaining sources",
                    identifier,
                    providers.len() - position
                );
                break;
            }

            let result = self.call(source.as_ref(), identifier, deadline).await;
            if result.found {
                return Some(result);
            }
        }
        None
    }

    /// All providers at once. A hit is accepted once every higher-priority provider has
    /// reported a non-hit; the calls still running are then dropped.
    async fn poll_concurrent(
        &self,
        identifier: &Identifier,
        providers: &[Arc<dyn Source>],
        deadline: Instant,
    ) -> Option<ProviderResult> {
        let mut pending: FuturesUnordered<_> = providers
            .iter()
            .enumerate()
            .map(|(position, source)| {
                let source: &dyn Source = source.as_ref();
                async move { (position, self.call(source, identifier, deadline).await) }
            })
            .collect();

        let mut settled: Vec<Option<ProviderResult>> = vec![None; providers.len()];
        let mut next = 0;

        while let Some((position, result)) = pending.next().await {
            settled[position] = Some(result);

            while let Some(Some(result)) = settled.get(next) {
                if result.found {
                    return settled[next].take();
                }
                next += 1;
            }

            if next == settled.len() {
                break;
            }
        }
        None
    }

    /// One provider call with retries, bounded by the adapter timeout and the deadline
    async fn call(&self, source: &dyn Source, identifier: &Identifier, deadline: Instant) -> ProviderResult {
        let adapter_timeout = self.config.adapter_timeout();

        with_retry(self.config.retry, deadline, move || async move {
            let bound = (Instant::now() + adapter_timeout).min(deadline);
            match timeout_at(bound, source.search(identifier)).await {
                Ok(result) => {
                    if let Some(kind) = result.error_kind.filter(|kind| *kind != ErrorKind::NotFound) {
                        tracing::warn!("{} failed for {}: {:?}", source.id(), identifier, kind);
                    }
                    result
                }
                Err(_) => {
                    tracing::warn!("{} timed out for {}", source.id(), identifier);
                    ProviderResult::failure(source.name(), ErrorKind::Timeout)
                }
            }
        })
        .await
    }

    /// Materialize the documents of every found record through the worker pool
    async fn download_hits(
        &self,
        batch: &BatchRequest,
        records: &mut [ResolutionRecord],
        deadline: Instant,
    ) {
        let jobs: Vec<(usize, String, String, String)> = records
            .iter()
            .zip(&batch.entries)
            .enumerate()
            .filter_map(|(index, (record, entry))| {
                let identifier = entry.parsed.as_ref().ok()?;
                match (record.found, &record.source, &record.url) {
                    (true, Some(source), Some(url)) => Some((
                        index,
                        identifier.as_str().to_string(),
                        source.clone(),
                        url.clone(),
                    )),
                    _ => None,
                }
            })
            .collect();
        if jobs.is_empty() {
            return;
        }

        let Some(materializer) = &self.materializer else {
            for (index, ..) in jobs {
                download_failed(&mut records[index], ResolveError::NoStorage.to_string());
            }
            return;
        };

        let mut queued: Vec<usize> = jobs.iter().map(|(index, ..)| *index).collect();
        let mut downloads = stream::iter(jobs)
            .map(|(index, identifier, source, url)| async move {
                let result = materializer
                    .materialize(batch.request_id, &identifier, &source, &url)
                    .await;
                if let Err(e) = &result {
                    tracing::warn!("Download of {} from {} failed: {}", identifier, url, e);
                }
                (index, result)
            })
            .buffer_unordered(self.config.worker_pool_size.max(1));

        let _ = timeout_at(deadline, async {
            while let Some((index, result)) = downloads.next().await {
                queued.retain(|pending| *pending != index);
                match result {
                    Ok(handle) => records[index].download = Some(handle),
                    Err(e) => {
                        records[index].error_kind = Some(e.kind());
                        records[index].error = Some(e.to_string());
                    }
                }
            }
        })
        .await;
        drop(downloads);

        if !queued.is_empty() {
            tracing::warn!(
                "Batch deadline reached with {} downloads unfinished",
                queued.len()
            );
            for index in queued {
                download_failed(
                    &mut records[index],
                    "batch deadline exceeded before the download completed".to_string(),
                );
            }
        }
    }
}

fn download_failed(record: &mut ResolutionRecord, error: String) {
    record.error_kind = Some(ErrorKind::DownloadFailed);
    record.error = Some(error);
}

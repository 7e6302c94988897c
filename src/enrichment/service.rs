//! Enrichment service - orchestrates metadata lookup for one entity at a time
//!
//! This is the high-level API for enriching artists and albums:
//! 1. Search MusicBrainz for an MBID if the entity has none (auto-search)
//! 2. Fetch from every provider that can serve the entity, concurrently
//! 3. Merge results in provider priority order
//! 4. Apply trusted fields, queue everything else as conflicts
//!
//! Each run is a spawned task. At most one run per entity is in flight; a
//! second trigger gets [`EnrichmentError::AlreadyRunning`]. Provider and
//! image failures only affect the provider that produced them. Storage
//! failures end the run.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use parking_lot::Mutex;
use sqlx::sqlite::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::coverart::{CoverArtClient, CoverSize};
use super::domain::{
    EnrichmentError, FetchTarget, ImageRejection, ProviderFailure, ProviderResult, RejectedField,
    RunOutcome, RunSummary,
};
use super::events::{
    CompletedEvent, EnrichmentEvent, ErrorEvent, EventEntity, EventPublisher, ProgressEvent,
    StartedEvent,
};
use super::fanart::FanartClient;
use super::http::{ApiClient, run_with_deadline};
use super::image::ImageValidator;
use super::lastfm::LastFmClient;
use super::log::{self, EnrichmentStats, LogStatus, NewLogEntry, StatsPeriod};
use super::musicbrainz::MusicBrainzClient;
use super::scoring;
use super::traits::{ImageFetcher, MetadataProvider, SearchQuery};
use crate::config::{self, EnrichmentSettings, KeyValidation};
use crate::conflicts::{self, ConflictFilter, ConflictPage, MetadataConflict, NewConflict, ResolveAction};
use crate::db::{self, runs};
use crate::model::{EntityType, LibraryEntity, MetadataField, Provider, ProviderTrust};

/// A provider gets this many HTTP timeouts before the run stops waiting on it.
const PROVIDER_DEADLINE_FACTOR: u32 = 2;

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Explicit user request
    Manual,
    /// Post-scan hook; only honoured with auto-enrich enabled
    Scan,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Scan => "scan",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerSource {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TriggerSource::Manual),
            "scan" => Ok(TriggerSource::Scan),
            other => Err(EnrichmentError::Validation(format!(
                "unknown trigger source '{}'",
                other
            ))),
        }
    }
}

/// Handle to a spawned run.
pub struct RunHandle {
    run_id: i64,
    cancel: CancellationToken,
    join: JoinHandle<Result<RunSummary, EnrichmentError>>,
}

impl RunHandle {
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Stop the run. Fields already applied stay applied.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<RunSummary, EnrichmentError> {
        self.join
            .await
            .map_err(|e| EnrichmentError::Infrastructure(format!("enrichment task failed: {}", e)))?
    }
}

/// Service for enriching artists and albums from external sources
#[derive(Clone)]
pub struct EnrichmentService {
    inner: Arc<Inner>,
}

struct Inner {
    pool: SqlitePool,
    settings: EnrichmentSettings,
    /// Sorted by merge priority
    providers: Vec<Arc<dyn MetadataProvider>>,
    images: Arc<dyn ImageFetcher>,
    events: Arc<dyn EventPublisher>,
    active: Mutex<HashSet<(EntityType, i64)>>,
    shutdown: CancellationToken,
}

/// Releases the per-entity run slot on drop.
struct RunSlot {
    inner: Arc<Inner>,
    key: (EntityType, i64),
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        self.inner.active.lock().remove(&self.key);
    }
}

impl EnrichmentService {
    /// Create a service with the real provider adapters.
    ///
    /// Last.fm and Fanart.tv are only registered when an API key is configured.
    pub fn new(
        pool: SqlitePool,
        settings: EnrichmentSettings,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self, EnrichmentError> {
        let api = ApiClient::new(&settings.http)?;

        let mut providers: Vec<Arc<dyn MetadataProvider>> = vec![
            Arc::new(MusicBrainzClient::new(api.clone())),
            Arc::new(CoverArtClient::new(api.clone(), CoverSize::default())),
        ];
        if let Some(key) = settings.lastfm_api_key.as_deref() {
            providers.push(Arc::new(LastFmClient::new(api.clone(), key)));
        }
        if let Some(key) = settings.fanart_api_key.as_deref() {
            providers.push(Arc::new(FanartClient::new(api.clone(), key)));
        }

        Self::from_parts(pool, settings, providers, Arc::new(api), events)
    }

    /// Create a service from explicit parts.
    pub fn from_parts(
        pool: SqlitePool,
        settings: EnrichmentSettings,
        mut providers: Vec<Arc<dyn MetadataProvider>>,
        images: Arc<dyn ImageFetcher>,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self, EnrichmentError> {
        settings.validate()?;
        providers.sort_by_key(|p| p.provider().priority());

        info!(
            providers = ?providers.iter().map(|p| p.provider().as_str()).collect::<Vec<_>>(),
            threshold = settings.auto_search.confidence_threshold,
            "Enrichment service ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                settings,
                providers,
                images,
                events,
                active: Mutex::new(HashSet::new()),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn settings(&self) -> &EnrichmentSettings {
        &self.inner.settings
    }

    /// Whether a run for the entity is in flight.
    pub fn is_running(&self, entity_type: EntityType, entity_id: i64) -> bool {
        self.inner.active.lock().contains(&(entity_type, entity_id))
    }

    pub fn active_runs(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Start a run for one entity.
    ///
    /// Input is checked and the run row is created before this returns; the
    /// run itself proceeds on a spawned task.
    pub async fn trigger_enrichment(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        source: TriggerSource,
    ) -> Result<RunHandle, EnrichmentError> {
        if entity_id <= 0 {
            return Err(EnrichmentError::Validation(format!(
                "invalid {} id {}",
                entity_type, entity_id
            )));
        }
        if source == TriggerSource::Scan && !self.inner.settings.auto_enrich_enabled {
            return Err(EnrichmentError::Validation(
                "automatic enrichment is disabled".to_string(),
            ));
        }
        if self.inner.shutdown.is_cancelled() {
            return Err(EnrichmentError::Cancelled);
        }

        // Claim the slot before the first await so simultaneous triggers
        // cannot both pass.
        let slot = self.claim(entity_type, entity_id)?;

        let entity = db::load_entity(&self.inner.pool, entity_type, entity_id)
            .await?
            .ok_or_else(|| {
                EnrichmentError::Validation(format!("{} {} not found", entity_type, entity_id))
            })?;

        let run_id =
            runs::insert_run(&self.inner.pool, entity_type, entity_id, source.as_str()).await?;

        info!(run_id, entity = %entity_type, entity_id, name = %entity.name, trigger = %source, "Enrichment triggered");

        let cancel = self.inner.shutdown.child_token();
        let inner = self.inner.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let _slot = slot;
            inner.execute(run_id, entity, token).await
        });

        Ok(RunHandle {
            run_id,
            cancel,
            join,
        })
    }

    /// Trigger a manual run and wait for it.
    pub async fn enrich(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> Result<RunSummary, EnrichmentError> {
        self.trigger_enrichment(entity_type, entity_id, TriggerSource::Manual)
            .await?
            .wait()
            .await
    }

    pub async fn list_conflicts(&self, filter: &ConflictFilter) -> Result<ConflictPage, EnrichmentError> {
        conflicts::list_conflicts(&self.inner.pool, filter).await
    }

    /// Accept, reject or ignore a pending conflict.
    pub async fn resolve_conflict(
        &self,
        id: i64,
        action: ResolveAction,
        resolved_by: Option<&str>,
    ) -> Result<MetadataConflict, EnrichmentError> {
        conflicts::resolve(&self.inner.pool, id, action, resolved_by).await
    }

    pub async fn get_stats(&self, period: StatsPeriod) -> Result<EnrichmentStats, EnrichmentError> {
        log::get_stats(&self.inner.pool, period).await
    }

    pub fn validate_provider_api_key(
        &self,
        service: &str,
        key: &str,
    ) -> Result<KeyValidation, EnrichmentError> {
        config::validate_provider_api_key(service, key)
    }

    /// Cancel every in-flight run and refuse new ones.
    pub fn shutdown(&self) {
        info!(active = self.active_runs(), "Shutting down enrichment");
        self.inner.shutdown.cancel();
    }

    fn claim(&self, entity_type: EntityType, entity_id: i64) -> Result<RunSlot, EnrichmentError> {
        let key = (entity_type, entity_id);
        if !self.inner.active.lock().insert(key) {
            debug!(entity = %entity_type, entity_id, "Run already in flight");
            return Err(EnrichmentError::AlreadyRunning {
                entity_type,
                entity_id,
            });
        }
        Ok(RunSlot {
            inner: self.inner.clone(),
            key,
        })
    }
}

/// Mutable state of one run.
struct RunState {
    run_id: i64,
    entity: LibraryEntity,
    started: Instant,
    cancel: CancellationToken,
    fields_updated: Vec<MetadataField>,
    conflicts_queued: usize,
    failed_providers: Vec<ProviderFailure>,
    rejected_fields: Vec<RejectedField>,
    succeeded: usize,
    failed: usize,
    steps_total: usize,
    steps_done: usize,
}

impl RunState {
    fn event_entity(&self) -> EventEntity {
        EventEntity {
            entity_type: self.entity.entity_type,
            entity_id: self.entity.id,
            entity_name: self.entity.name.clone(),
        }
    }

    fn check_cancelled(&self) -> Result<(), EnrichmentError> {
        if self.cancel.is_cancelled() {
            Err(EnrichmentError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn record_failure(&mut self, provider: Provider, error: &EnrichmentError) {
        self.failed += 1;
        self.failed_providers.push(ProviderFailure {
            provider,
            code: error.code().to_string(),
            message: error.to_string(),
        });
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            entity_type: self.entity.entity_type,
            entity_id: self.entity.id,
            entity_name: self.entity.name.clone(),
            outcome: RunOutcome::from_counts(self.succeeded, self.failed),
            fields_updated: self.fields_updated.clone(),
            conflicts_queued: self.conflicts_queued,
            failed_providers: self.failed_providers.clone(),
            rejected_fields: self.rejected_fields.clone(),
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// What happened to one proposed field.
enum Disposition {
    Applied,
    Queued,
    Skipped,
    Rejected(ImageRejection),
}

impl Inner {
    async fn execute(
        &self,
        run_id: i64,
        entity: LibraryEntity,
        cancel: CancellationToken,
    ) -> Result<RunSummary, EnrichmentError> {
        let mut state = RunState {
            run_id,
            entity,
            started: Instant::now(),
            cancel,
            fields_updated: Vec::new(),
            conflicts_queued: 0,
            failed_providers: Vec::new(),
            rejected_fields: Vec::new(),
            succeeded: 0,
            failed: 0,
            steps_total: 0,
            steps_done: 0,
        };

        self.events.publish(EnrichmentEvent::Started(StartedEvent {
            entity: state.event_entity(),
            run_id,
        }));

        let result = match self.run_pipeline(&mut state).await {
            Ok(()) => {
                let summary = state.summary();
                runs::finish_run(
                    &self.pool,
                    run_id,
                    runs::RunStatus::Completed,
                    Some(summary.outcome),
                    None,
                )
                .await
                .map(|()| summary)
                .map_err(EnrichmentError::from)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(summary) => {
                info!(
                    run_id,
                    outcome = summary.outcome.as_str(),
                    updated = summary.fields_updated.len(),
                    queued = summary.conflicts_queued,
                    failed = summary.failed_providers.len(),
                    duration_ms = summary.duration_ms,
                    "Enrichment completed"
                );
                self.events.publish(EnrichmentEvent::Completed(CompletedEvent {
                    entity: state.event_entity(),
                    run_id,
                    bio_updated: summary.updated(MetadataField::Biography),
                    images_updated: summary.updated(MetadataField::ProfileImage)
                        || summary.updated(MetadataField::BackgroundImage),
                    cover_updated: summary.updated(MetadataField::Cover),
                    duration: summary.duration_ms,
                    status: summary.outcome,
                    fields_updated: summary.fields_updated.clone(),
                    conflicts_queued: summary.conflicts_queued,
                    failed_providers: summary.failed_providers.clone(),
                }));
                Ok(summary)
            }
            Err(e) => {
                let message = if e == EnrichmentError::Cancelled {
                    info!(run_id, "Enrichment cancelled");
                    "cancelled".to_string()
                } else {
                    error!(run_id, error = %e, "Enrichment failed");
                    e.to_string()
                };

                if let Err(db_err) = runs::finish_run(
                    &self.pool,
                    run_id,
                    runs::RunStatus::Error,
                    Some(RunOutcome::Error),
                    Some(&message),
                )
                .await
                {
                    error!(run_id, error = %db_err, "Could not close run record");
                }

                self.events.publish(EnrichmentEvent::Error(ErrorEvent {
                    entity: state.event_entity(),
                    run_id: Some(run_id),
                    error: message,
                    code: e.code().to_string(),
                }));
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, state: &mut RunState) -> Result<(), EnrichmentError> {
        let search = self.settings.auto_search.enabled
            && state.entity.mbid.is_none()
            && self.provider(Provider::MusicBrainz).is_some();

        let target = self.fetch_target(&state.entity);
        let eligible_now: Vec<_> = self.eligible(&target);
        // MBID-keyed providers may become eligible after a successful search
        state.steps_total = if search {
            1 + self.providers.len()
        } else {
            eligible_now.len()
        };

        if search {
            self.auto_search(state).await?;
            self.step_done(state, "mbid_search");
        }

        state.check_cancelled()?;

        let target = self.fetch_target(&state.entity);
        let eligible = self.eligible(&target);
        if search {
            // steps for providers that stayed ineligible are done already
            state.steps_total = state.steps_done + eligible.len();
        }

        let results = self.fetch_all(state, &target, eligible).await?;
        self.merge(state, results).await
    }

    fn provider(&self, provider: Provider) -> Option<&Arc<dyn MetadataProvider>> {
        self.providers.iter().find(|p| p.provider() == provider)
    }

    fn eligible(&self, target: &FetchTarget) -> Vec<Arc<dyn MetadataProvider>> {
        self.providers
            .iter()
            .filter(|p| {
                let ok = p.can_fetch(target);
                if !ok {
                    debug!(provider = %p.provider(), "Provider skipped for target");
                }
                ok
            })
            .cloned()
            .collect()
    }

    fn fetch_target(&self, entity: &LibraryEntity) -> FetchTarget {
        FetchTarget {
            entity_type: entity.entity_type,
            name: entity.name.clone(),
            artist_name: entity.artist_name.clone(),
            mbid: entity.mbid.clone(),
            artist_mbid: entity.artist_mbid.clone(),
        }
    }

    fn step_done(&self, state: &mut RunState, step: &str) {
        state.steps_done += 1;
        let total = state.steps_total.max(state.steps_done);
        self.events.publish(EnrichmentEvent::Progress(ProgressEvent {
            entity: state.event_entity(),
            run_id: state.run_id,
            total,
            current: state.steps_done,
            step: step.to_string(),
            percentage: ((state.steps_done * 100) / total.max(1)).min(100) as u8,
        }));
    }

    /// Look for an MBID by name and apply or queue the best hit.
    async fn auto_search(&self, state: &mut RunState) -> Result<(), EnrichmentError> {
        let Some(musicbrainz) = self.provider(Provider::MusicBrainz).cloned() else {
            return Ok(());
        };

        let query = SearchQuery {
            entity_type: state.entity.entity_type,
            name: state.entity.name.clone(),
            artist_hint: state.entity.artist_name.clone(),
        };

        let started = Instant::now();
        let candidates = match musicbrainz.search_by_name(&query, &state.cancel).await {
            Ok(candidates) => candidates,
            Err(e) => {
                if is_fatal(&e) {
                    return Err(e);
                }
                warn!(run_id = state.run_id, error = %e, "MBID search failed");
                state.record_failure(Provider::MusicBrainz, &e);
                self.write_log(state, Provider::MusicBrainz, "mbid_search", LogStatus::Error, vec![], Some(e.to_string()), None, started)
                    .await?;
                return Ok(());
            }
        };
        state.succeeded += 1;

        let is_album = state.entity.entity_type == EntityType::Album;
        let best = scoring::best_candidate(
            &candidates,
            &state.entity.name,
            state.entity.artist_name.as_deref(),
            is_album,
        );

        let Some((candidate, confidence)) = best else {
            debug!(run_id = state.run_id, "No MBID candidates");
            self.write_log(state, Provider::MusicBrainz, "mbid_search", LogStatus::Success, vec![], None, None, started)
                .await?;
            return Ok(());
        };

        let threshold = self.settings.auto_search.confidence_threshold;
        let confident = scoring::meets_threshold(confidence, threshold);
        debug!(
            run_id = state.run_id,
            mbid = %candidate.id,
            confidence,
            threshold,
            "Best MBID candidate"
        );

        let mut applied = Vec::new();
        if confident && self.settings.auto_search.auto_apply {
            self.apply(state, MetadataField::Mbid, &candidate.id).await?;
            applied.push(MetadataField::Mbid);
        } else if !conflicts::was_dismissed(
            &self.pool,
            state.entity.entity_type,
            state.entity.id,
            MetadataField::Mbid,
            Provider::MusicBrainz,
            &candidate.id,
        )
        .await?
        {
            self.queue(state, Provider::MusicBrainz, MetadataField::Mbid, &candidate.id, Some(confidence))
                .await?;
        }

        self.write_log(state, Provider::MusicBrainz, "mbid_search", LogStatus::Success, applied, None, None, started)
            .await
    }

    /// Call every eligible provider concurrently.
    async fn fetch_all(
        &self,
        state: &mut RunState,
        target: &FetchTarget,
        eligible: Vec<Arc<dyn MetadataProvider>>,
    ) -> Result<Vec<ProviderResult>, EnrichmentError> {
        let deadline = self.settings.http.timeout * PROVIDER_DEADLINE_FACTOR;
        let cancel = state.cancel.clone();
        let run_id = state.run_id;

        let mut pending: FuturesUnordered<_> = eligible
            .into_iter()
            .map(|provider| {
                let cancel = cancel.clone();
                async move {
                    let started = Instant::now();
                    let operation = format!("{} fetch", provider.provider());
                    let result = run_with_deadline(
                        deadline,
                        &operation,
                        provider.fetch_by_id(target, &cancel),
                    )
                    .await;
                    (provider.provider(), result, started.elapsed())
                }
            })
            .collect();

        let mut results = Vec::new();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(EnrichmentError::Cancelled),
                next = pending.next() => next,
            };
            let Some((provider, result, elapsed)) = next else {
                break;
            };

            let (fields, error) = match result {
                Ok(metadata) => (
                    metadata
                        .into_proposals(target.entity_type)
                        .into_iter()
                        .collect::<BTreeMap<_, _>>(),
                    None,
                ),
                Err(e) => (BTreeMap::new(), Some(e)),
            };
            debug!(run_id, provider = %provider, fields = fields.len(), error = ?error, "Provider responded");

            results.push(ProviderResult {
                run_id,
                provider,
                fields,
                confidence: None,
                fetched_at: Utc::now(),
                error,
                processing_time_ms: elapsed.as_millis() as u64,
            });
            self.step_done(state, provider.as_str());
        }

        results.sort_by_key(|r| r.provider.priority());
        Ok(results)
    }

    /// Route every proposed field, highest-priority provider first.
    async fn merge(&self, state: &mut RunState, results: Vec<ProviderResult>) -> Result<(), EnrichmentError> {
        for result in results {
            state.check_cancelled()?;
            let provider = result.provider;
            let metadata_type = metadata_type(provider, state.entity.entity_type);
            let elapsed = Duration::from_millis(result.processing_time_ms);

            if let Some(e) = result.error {
                if is_fatal(&e) {
                    return Err(e);
                }
                warn!(run_id = state.run_id, provider = %provider, error = %e, "Provider failed");
                state.record_failure(provider, &e);
                self.insert_log(state, provider, metadata_type, LogStatus::Error, vec![], Some(e.to_string()), None, elapsed)
                    .await?;
                continue;
            }

            let mut applied = Vec::new();
            let mut preview_url = None;
            // Image fields carry ranked alternates; the first one not rejected wins
            let mut settled: Vec<MetadataField> = Vec::new();
            let mut rejected: Vec<(MetadataField, ImageRejection)> = Vec::new();

            for (field, value) in result.fields {
                if settled.contains(&field) {
                    continue;
                }
                match self.route(state, provider, field, &value).await? {
                    Disposition::Applied => {
                        applied.push(field);
                        if field.is_image() {
                            preview_url.get_or_insert_with(|| value.clone());
                        }
                        settled.push(field);
                    }
                    Disposition::Queued => {
                        if field.is_image() {
                            preview_url.get_or_insert_with(|| value.clone());
                        }
                        settled.push(field);
                    }
                    Disposition::Skipped => settled.push(field),
                    Disposition::Rejected(reason) => {
                        debug!(run_id = state.run_id, provider = %provider, field = %field, url = %value, reason = %reason, "Image candidate rejected");
                        rejected.retain(|(f, _)| *f != field);
                        rejected.push((field, reason));
                    }
                }
            }

            let mut rejections = Vec::new();
            for (field, reason) in rejected {
                if settled.contains(&field) {
                    continue;
                }
                warn!(run_id = state.run_id, provider = %provider, field = %field, reason = %reason, "Image rejected");
                rejections.push(format!("{}: {}", field, reason));
                state.rejected_fields.push(RejectedField {
                    provider,
                    field,
                    reason: reason.as_str().to_string(),
                });
            }

            state.succeeded += 1;
            let (status, message) = if rejections.is_empty() {
                (LogStatus::Success, None)
            } else {
                (LogStatus::Partial, Some(rejections.join("; ")))
            };
            self.insert_log(state, provider, metadata_type, status, applied, message, preview_url, elapsed)
                .await?;
        }
        Ok(())
    }

    /// Decide what happens to one proposed value.
    async fn route(
        &self,
        state: &mut RunState,
        provider: Provider,
        field: MetadataField,
        value: &str,
    ) -> Result<Disposition, EnrichmentError> {
        if state.entity.value(field) == Some(value) {
            return Ok(Disposition::Skipped);
        }

        let trust = provider.trust();
        if trust == ProviderTrust::RequiresReview
            && conflicts::was_dismissed(
                &self.pool,
                state.entity.entity_type,
                state.entity.id,
                field,
                provider,
                value,
            )
            .await?
        {
            debug!(provider = %provider, field = %field, "Value was dismissed before");
            return Ok(Disposition::Skipped);
        }

        if field.is_image()
            && let Err(reason) = self.check_image(state, provider, field, value).await?
        {
            return Ok(Disposition::Rejected(reason));
        }

        match trust {
            ProviderTrust::AutoApply => {
                self.apply(state, field, value).await?;
                Ok(Disposition::Applied)
            }
            ProviderTrust::RequiresReview => {
                self.queue(state, provider, field, value, None).await?;
                Ok(Disposition::Queued)
            }
        }
    }

    /// Download and validate an image. The outer error is for failures that
    /// end the run; the inner one rejects just this field.
    async fn check_image(
        &self,
        state: &RunState,
        provider: Provider,
        field: MetadataField,
        url: &str,
    ) -> Result<Result<(), ImageRejection>, EnrichmentError> {
        let validator = match field {
            MetadataField::ProfileImage => ImageValidator::avatar(),
            _ => ImageValidator::general(),
        };

        let image = match self
            .images
            .fetch_image(provider, url, validator.max_bytes(), &state.cancel)
            .await
        {
            Ok(image) => image,
            Err(e) if is_fatal(&e) => return Err(e),
            Err(EnrichmentError::ImageProcessing { reason }) => return Ok(Err(reason)),
            Err(e) => {
                debug!(url = %url, error = %e, "Image download failed");
                return Ok(Err(ImageRejection::DownloadFailed));
            }
        };

        match validator.validate(&image.data, &image.mime_type) {
            Ok(validated) => {
                debug!(url = %url, width = validated.width, height = validated.height, "Image accepted");
                Ok(Ok(()))
            }
            Err(EnrichmentError::ImageProcessing { reason }) => Ok(Err(reason)),
            Err(other) => Err(other),
        }
    }

    async fn apply(&self, state: &mut RunState, field: MetadataField, value: &str) -> Result<(), EnrichmentError> {
        let entity_type = state.entity.entity_type;
        let updated = db::apply_field(&self.pool, entity_type, state.entity.id, field, value).await?;
        if !updated {
            return Err(EnrichmentError::Validation(format!(
                "{} {} was deleted during enrichment",
                entity_type, state.entity.id
            )));
        }

        state.entity.set_value(field, value);
        if !state.fields_updated.contains(&field) {
            state.fields_updated.push(field);
        }
        debug!(run_id = state.run_id, field = %field, "Applied field");
        Ok(())
    }

    async fn queue(
        &self,
        state: &mut RunState,
        provider: Provider,
        field: MetadataField,
        value: &str,
        confidence: Option<f64>,
    ) -> Result<(), EnrichmentError> {
        let conflict = NewConflict {
            entity_type: state.entity.entity_type,
            entity_id: state.entity.id,
            entity_name: state.entity.name.clone(),
            provider,
            field,
            proposed_value: value.to_string(),
            previous_value: state.entity.value(field).map(str::to_string),
            confidence,
        };
        conflicts::upsert_pending(&self.pool, &conflict).await?;
        state.conflicts_queued += 1;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_log(
        &self,
        state: &RunState,
        provider: Provider,
        metadata_type: &str,
        status: LogStatus,
        fields_updated: Vec<MetadataField>,
        error_message: Option<String>,
        preview_url: Option<String>,
        started: Instant,
    ) -> Result<(), EnrichmentError> {
        self.insert_log(state, provider, metadata_type, status, fields_updated, error_message, preview_url, started.elapsed())
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_log(
        &self,
        state: &RunState,
        provider: Provider,
        metadata_type: &str,
        status: LogStatus,
        fields_updated: Vec<MetadataField>,
        error_message: Option<String>,
        preview_url: Option<String>,
        elapsed: Duration,
    ) -> Result<(), EnrichmentError> {
        let entry = NewLogEntry {
            run_id: Some(state.run_id),
            entity_type: state.entity.entity_type,
            entity_id: state.entity.id,
            entity_name: state.entity.name.clone(),
            provider,
            metadata_type: metadata_type.to_string(),
            status,
            fields_updated,
            error_message,
            preview_url,
            processing_time_ms: elapsed.as_millis() as u64,
        };
        log::insert_log(&self.pool, &entry).await?;
        Ok(())
    }
}

/// Errors that end the whole run rather than one provider's contribution.
fn is_fatal(error: &EnrichmentError) -> bool {
    matches!(
        error,
        EnrichmentError::Infrastructure(_) | EnrichmentError::Cancelled
    )
}

fn metadata_type(provider: Provider, entity_type: EntityType) -> &'static str {
    match (provider, entity_type) {
        (Provider::CoverArtArchive, _) => "cover",
        (Provider::FanartTv, _) => "images",
        (_, EntityType::Artist) => "artist_info",
        (_, EntityType::Album) => "album_info",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::conflicts::ConflictStatus;
    use crate::enrichment::domain::ImageKind;
    use crate::enrichment::events::ProgressNotifier;
    use crate::enrichment::traits::mocks::{MockImageFetcher, MockProvider, tiny_png};
    use crate::test_utils::{seed_album, seed_artist, set_artist_column, temp_db};

    const MBID: &str = "8f6bd1e4-fbe1-4f50-aa9b-94c450ec0f11";

    fn settings() -> EnrichmentSettings {
        EnrichmentSettings::default()
    }

    fn service(
        pool: &SqlitePool,
        settings: EnrichmentSettings,
        providers: Vec<MockProvider>,
        images: MockImageFetcher,
    ) -> EnrichmentService {
        let providers = providers
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn MetadataProvider>)
            .collect();
        EnrichmentService::from_parts(
            pool.clone(),
            settings,
            providers,
            Arc::new(images),
            Arc::new(ProgressNotifier::default()),
        )
        .unwrap()
    }

    fn timeout_error() -> EnrichmentError {
        EnrichmentError::Timeout {
            timeout_ms: 10_000,
            operation: "lastfm GET".to_string(),
        }
    }

    async fn pending_count(pool: &SqlitePool) -> i64 {
        conflicts::count_pending(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_trusted_fields_applied_review_fields_queued() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;

        let svc = service(
            &pool,
            settings(),
            vec![
                MockProvider::new(Provider::MusicBrainz).with_tags(&["trip hop"]),
                MockProvider::new(Provider::LastFm).with_biography("Bristol trio"),
            ],
            MockImageFetcher::default(),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Success);
        assert_eq!(summary.fields_updated, vec![MetadataField::Tags]);
        assert_eq!(summary.conflicts_queued, 1);

        let artist = db::get_artist(&pool, id).await.unwrap().unwrap();
        assert_eq!(artist.tags.as_deref(), Some("trip hop"));
        assert!(artist.biography.is_none());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;

        let svc = service(
            &pool,
            settings(),
            vec![
                MockProvider::new(Provider::MusicBrainz).with_tags(&["trip hop"]),
                MockProvider::new(Provider::LastFm).with_biography("Bristol trio"),
            ],
            MockImageFetcher::default(),
        );

        let first = svc.enrich(EntityType::Artist, id).await.unwrap();
        let second = svc.enrich(EntityType::Artist, id).await.unwrap();

        assert_eq!(first.fields_updated, vec![MetadataField::Tags]);
        assert!(second.fields_updated.is_empty());
        assert_eq!(pending_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_search_at_threshold_applies_mbid() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Beatles", None).await;

        let mut s = settings();
        s.auto_search.confidence_threshold = scoring::score_artist("Beatles", "Beatless");

        let svc = service(
            &pool,
            s,
            vec![MockProvider::new(Provider::MusicBrainz).with_candidate(MBID, "Beatless", None)],
            MockImageFetcher::default(),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert!(summary.updated(MetadataField::Mbid));
        let artist = db::get_artist(&pool, id).await.unwrap().unwrap();
        assert_eq!(artist.mbid.as_deref(), Some(MBID));
        assert_eq!(pending_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_search_below_threshold_queues_mbid() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Beatles", None).await;

        let score = scoring::score_artist("Beatles", "Beatless");
        let mut s = settings();
        s.auto_search.confidence_threshold = score + 1e-6;

        let svc = service(
            &pool,
            s,
            vec![MockProvider::new(Provider::MusicBrainz).with_candidate(MBID, "Beatless", None)],
            MockImageFetcher::default(),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert!(!summary.updated(MetadataField::Mbid));

        let page = svc.list_conflicts(&ConflictFilter::default()).await.unwrap();
        assert_eq!(page.items.len(), 1);
        let conflict = &page.items[0];
        assert_eq!(conflict.field, MetadataField::Mbid);
        assert_eq!(conflict.proposed_value, MBID);
        assert_eq!(conflict.confidence, Some(score));
    }

    #[tokio::test]
    async fn test_confident_hit_queued_when_auto_apply_off() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", None).await;

        let mut s = settings();
        s.auto_search.auto_apply = false;
        let svc = service(
            &pool,
            s,
            vec![MockProvider::new(Provider::MusicBrainz).with_candidate(MBID, "Portishead", None)],
            MockImageFetcher::default(),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert!(summary.fields_updated.is_empty());
        assert_eq!(summary.conflicts_queued, 1);
    }

    #[tokio::test]
    async fn test_search_without_candidates_is_not_an_error() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Unknown Local Band", None).await;

        let mb = MockProvider::new(Provider::MusicBrainz).with_tags(&["never fetched"]);
        let mb_calls = mb.fetch_calls.clone();
        let svc = service(
            &pool,
            settings(),
            vec![mb, MockProvider::new(Provider::LastFm).with_biography("Local heroes")],
            MockImageFetcher::default(),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Success);
        // no MBID, so MusicBrainz lookup never ran; Last.fm still did
        assert_eq!(mb_calls.load(Ordering::SeqCst), 0);
        assert_eq!(summary.conflicts_queued, 1);
    }

    #[tokio::test]
    async fn test_review_providers_never_update_directly() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Massive Attack", Some(MBID)).await;

        let svc = service(
            &pool,
            settings(),
            vec![
                MockProvider::new(Provider::LastFm)
                    .with_biography("Bristol collective")
                    .with_tags(&["trip-hop"])
                    .with_image(ImageKind::Profile, "https://img/lastfm.png"),
                MockProvider::new(Provider::FanartTv)
                    .with_image(ImageKind::Profile, "https://img/thumb.png")
                    .with_image(ImageKind::Background, "https://img/bg.png"),
            ],
            MockImageFetcher::default()
                .with_png("https://img/lastfm.png")
                .with_png("https://img/thumb.png")
                .with_png("https://img/bg.png"),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert!(summary.fields_updated.is_empty());
        assert_eq!(summary.conflicts_queued, 5);

        let logs = log::logs_for_run(&pool, summary.run_id).await.unwrap();
        assert!(logs.iter().all(|l| l.fields_updated.is_empty()));

        let artist = db::get_artist(&pool, id).await.unwrap().unwrap();
        assert!(artist.biography.is_none());
        assert!(artist.profile_image_url.is_none());
    }

    #[tokio::test]
    async fn test_timeout_gives_partial_run() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;

        let svc = service(
            &pool,
            settings(),
            vec![
                MockProvider::new(Provider::MusicBrainz).with_tags(&["trip hop"]),
                MockProvider::new(Provider::LastFm).with_error(timeout_error()),
            ],
            MockImageFetcher::default(),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Partial);
        assert_eq!(summary.fields_updated, vec![MetadataField::Tags]);
        assert_eq!(summary.failed_providers.len(), 1);
        assert_eq!(summary.failed_providers[0].provider, Provider::LastFm);
        assert_eq!(summary.failed_providers[0].code, "TIMEOUT_ERROR");
        assert_eq!(pending_count(&pool).await, 0);

        let artist = db::get_artist(&pool, id).await.unwrap().unwrap();
        assert!(artist.biography.is_none());

        let run = runs::get_run(&pool, summary.run_id).await.unwrap().unwrap();
        assert_eq!(run.outcome, Some(RunOutcome::Partial));
        assert_eq!(run.status, runs::RunStatus::Completed);

        let logs = log::logs_for_run(&pool, summary.run_id).await.unwrap();
        let lastfm = logs.iter().find(|l| l.provider == Provider::LastFm).unwrap();
        assert_eq!(lastfm.status, LogStatus::Error);
        assert!(lastfm.error_message.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_all_providers_failing_is_error_outcome() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;

        let svc = service(
            &pool,
            settings(),
            vec![
                MockProvider::new(Provider::MusicBrainz).with_error(EnrichmentError::ExternalApi {
                    provider: Provider::MusicBrainz,
                    http_status: Some(503),
                    http_status_text: "Service Unavailable".to_string(),
                    url: "https://musicbrainz.org/ws/2/artist/x".to_string(),
                }),
                MockProvider::new(Provider::LastFm).with_error(timeout_error()),
            ],
            MockImageFetcher::default(),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Error);
        assert_eq!(summary.failed_providers.len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_cover_neither_applied_nor_queued() {
        let (pool, _dir) = temp_db().await;
        let album = seed_album(&pool, "Mezzanine", None).await;
        db::apply_field(&pool, EntityType::Album, album, MetadataField::Mbid, MBID)
            .await
            .unwrap();

        let mut huge = vec![0xFF, 0xD8, 0xFF, 0xE0];
        huge.resize(15 * 1024 * 1024, 0);

        let svc = service(
            &pool,
            settings(),
            vec![
                MockProvider::new(Provider::CoverArtArchive)
                    .with_image(ImageKind::Cover, "https://caa/front.jpg"),
                MockProvider::new(Provider::FanartTv)
                    .with_image(ImageKind::Cover, "https://fanart/cover.jpg"),
            ],
            MockImageFetcher::default()
                .with_bytes("https://caa/front.jpg", huge.clone(), "image/jpeg")
                .with_bytes("https://fanart/cover.jpg", huge, "image/jpeg"),
        );

        let summary = svc.enrich(EntityType::Album, album).await.unwrap();
        assert!(summary.fields_updated.is_empty());
        assert_eq!(summary.conflicts_queued, 0);
        assert_eq!(summary.rejected_fields.len(), 2);
        assert!(summary.rejected_fields.iter().all(|r| r.reason == "FILE_TOO_LARGE"));

        let stored = db::get_album(&pool, album).await.unwrap().unwrap();
        assert!(stored.cover_url.is_none());
        assert_eq!(pending_count(&pool).await, 0);

        let logs = log::logs_for_run(&pool, summary.run_id).await.unwrap();
        assert!(logs.iter().all(|l| l.status == LogStatus::Partial));
    }

    #[tokio::test]
    async fn test_valid_cover_applied_with_preview() {
        let (pool, _dir) = temp_db().await;
        let album = seed_album(&pool, "Mezzanine", None).await;
        db::apply_field(&pool, EntityType::Album, album, MetadataField::Mbid, MBID)
            .await
            .unwrap();

        let svc = service(
            &pool,
            settings(),
            vec![MockProvider::new(Provider::CoverArtArchive).with_image(ImageKind::Cover, "https://caa/front.png")],
            MockImageFetcher::default().with_bytes("https://caa/front.png", tiny_png(), "image/png"),
        );

        let summary = svc.enrich(EntityType::Album, album).await.unwrap();
        assert_eq!(summary.fields_updated, vec![MetadataField::Cover]);

        let logs = log::logs_for_run(&pool, summary.run_id).await.unwrap();
        assert_eq!(logs[0].preview_url.as_deref(), Some("https://caa/front.png"));
    }

    #[tokio::test]
    async fn test_rejected_cover_falls_back_to_next_candidate() {
        let (pool, _dir) = temp_db().await;
        let album = seed_album(&pool, "Mezzanine", None).await;
        db::apply_field(&pool, EntityType::Album, album, MetadataField::Mbid, MBID)
            .await
            .unwrap();

        let mut huge = vec![0xFF, 0xD8, 0xFF, 0xE0];
        huge.resize(15 * 1024 * 1024, 0);

        let svc = service(
            &pool,
            settings(),
            vec![
                MockProvider::new(Provider::CoverArtArchive)
                    .with_image(ImageKind::Cover, "https://caa/front-huge.jpg")
                    .with_image(ImageKind::Cover, "https://caa/front.png")
                    .with_image(ImageKind::Cover, "https://caa/front-alt.png"),
            ],
            MockImageFetcher::default()
                .with_bytes("https://caa/front-huge.jpg", huge, "image/jpeg")
                .with_png("https://caa/front.png")
                .with_png("https://caa/front-alt.png"),
        );

        let summary = svc.enrich(EntityType::Album, album).await.unwrap();
        assert_eq!(summary.fields_updated, vec![MetadataField::Cover]);
        assert!(summary.rejected_fields.is_empty());

        let stored = db::get_album(&pool, album).await.unwrap().unwrap();
        assert_eq!(stored.cover_url.as_deref(), Some("https://caa/front.png"));

        let logs = log::logs_for_run(&pool, summary.run_id).await.unwrap();
        assert_eq!(logs[0].status, LogStatus::Success);
        assert_eq!(logs[0].preview_url.as_deref(), Some("https://caa/front.png"));
    }

    #[tokio::test]
    async fn test_unreachable_image_is_download_failed() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Massive Attack", Some(MBID)).await;

        let svc = service(
            &pool,
            settings(),
            vec![MockProvider::new(Provider::FanartTv).with_image(ImageKind::Background, "https://gone/bg.jpg")],
            MockImageFetcher::default(),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert_eq!(summary.rejected_fields[0].reason, "DOWNLOAD_FAILED");
        assert_eq!(pending_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_accept_then_accept_again() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;

        let svc = service(
            &pool,
            settings(),
            vec![MockProvider::new(Provider::LastFm).with_biography("Bristol trio")],
            MockImageFetcher::default(),
        );
        svc.enrich(EntityType::Artist, id).await.unwrap();

        let page = svc.list_conflicts(&ConflictFilter::default()).await.unwrap();
        let conflict_id = page.items[0].id;

        let accepted = svc
            .resolve_conflict(conflict_id, ResolveAction::Accept, Some("admin"))
            .await
            .unwrap();
        assert_eq!(accepted.status, ConflictStatus::Accepted);
        let artist = db::get_artist(&pool, id).await.unwrap().unwrap();
        assert_eq!(artist.biography.as_deref(), Some("Bristol trio"));

        // someone edits the bio; a second accept must not overwrite it
        db::apply_field(&pool, EntityType::Artist, id, MetadataField::Biography, "Edited")
            .await
            .unwrap();
        let again = svc.resolve_conflict(conflict_id, ResolveAction::Accept, None).await;
        assert!(matches!(
            again,
            Err(EnrichmentError::ConflictAlreadyResolved { status: ConflictStatus::Accepted, .. })
        ));
        let artist = db::get_artist(&pool, id).await.unwrap().unwrap();
        assert_eq!(artist.biography.as_deref(), Some("Edited"));
    }

    #[tokio::test]
    async fn test_rejected_value_not_requeued() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;

        let svc = service(
            &pool,
            settings(),
            vec![MockProvider::new(Provider::LastFm).with_biography("Wrong band")],
            MockImageFetcher::default(),
        );
        svc.enrich(EntityType::Artist, id).await.unwrap();
        let conflict_id = svc.list_conflicts(&ConflictFilter::default()).await.unwrap().items[0].id;
        svc.resolve_conflict(conflict_id, ResolveAction::Reject, None).await.unwrap();

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert_eq!(summary.conflicts_queued, 0);
        assert_eq!(pending_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_simultaneous_triggers_one_run() {
        let (pool, _dir) = temp_db().await;
        let album = seed_album(&pool, "Dummy", None).await;

        let svc = service(
            &pool,
            settings(),
            vec![MockProvider::new(Provider::LastFm)
                .with_biography("Debut")
                .with_delay(Duration::from_millis(200))],
            MockImageFetcher::default(),
        );

        let (first, second) = tokio::join!(
            svc.trigger_enrichment(EntityType::Album, album, TriggerSource::Manual),
            svc.trigger_enrichment(EntityType::Album, album, TriggerSource::Manual),
        );

        let handle = first.unwrap();
        assert_eq!(
            second.err(),
            Some(EnrichmentError::AlreadyRunning {
                entity_type: EntityType::Album,
                entity_id: album
            })
        );
        assert!(svc.is_running(EntityType::Album, album));

        handle.wait().await.unwrap();
        assert!(!svc.is_running(EntityType::Album, album));

        let runs = runs::runs_for_entity(&pool, EntityType::Album, album).await.unwrap();
        assert_eq!(runs.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_marked_error() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;

        let slow = MockProvider::new(Provider::LastFm)
            .with_biography("Never arrives")
            .with_delay(Duration::from_secs(30));
        let svc = service(&pool, settings(), vec![slow], MockImageFetcher::default());

        let handle = svc
            .trigger_enrichment(EntityType::Artist, id, TriggerSource::Manual)
            .await
            .unwrap();
        let run_id = handle.run_id();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        assert_eq!(handle.wait().await.unwrap_err(), EnrichmentError::Cancelled);

        let run = runs::get_run(&pool, run_id).await.unwrap().unwrap();
        assert_eq!(run.status, runs::RunStatus::Error);
        assert_eq!(run.error_message.as_deref(), Some("cancelled"));
        assert_eq!(pending_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_runs_and_refuses_new_ones() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;

        let svc = service(
            &pool,
            settings(),
            vec![MockProvider::new(Provider::LastFm).with_delay(Duration::from_secs(30))],
            MockImageFetcher::default(),
        );
        let handle = svc
            .trigger_enrichment(EntityType::Artist, id, TriggerSource::Manual)
            .await
            .unwrap();

        svc.shutdown();
        assert_eq!(handle.wait().await.unwrap_err(), EnrichmentError::Cancelled);
        assert_eq!(svc.enrich(EntityType::Artist, id).await.unwrap_err(), EnrichmentError::Cancelled);
    }

    #[tokio::test]
    async fn test_invalid_triggers_rejected_before_run() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", None).await;
        let svc = service(&pool, settings(), vec![], MockImageFetcher::default());

        assert!(matches!(
            svc.enrich(EntityType::Artist, 0).await,
            Err(EnrichmentError::Validation(_))
        ));
        assert!(matches!(
            svc.enrich(EntityType::Artist, 4242).await,
            Err(EnrichmentError::Validation(_))
        ));
        // auto-enrich is off by default
        assert!(matches!(
            svc.trigger_enrichment(EntityType::Artist, id, TriggerSource::Scan).await,
            Err(EnrichmentError::Validation(_))
        ));
        assert!(runs::runs_for_entity(&pool, EntityType::Artist, id).await.unwrap().is_empty());
        assert!(!svc.is_running(EntityType::Artist, 4242));
    }

    #[tokio::test]
    async fn test_events_published_in_order() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;

        let notifier = ProgressNotifier::default();
        let mut rx = notifier.subscribe();
        let providers: Vec<Arc<dyn MetadataProvider>> = vec![
            Arc::new(MockProvider::new(Provider::MusicBrainz).with_tags(&["trip hop"])),
            Arc::new(MockProvider::new(Provider::LastFm).with_biography("Bristol trio")),
        ];
        let svc = EnrichmentService::from_parts(
            pool.clone(),
            settings(),
            providers,
            Arc::new(MockImageFetcher::default()),
            Arc::new(notifier),
        )
        .unwrap();

        svc.enrich(EntityType::Artist, id).await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.event_name());
            if let EnrichmentEvent::Progress(p) = &event {
                assert_eq!(p.total, 2);
            }
            if let EnrichmentEvent::Completed(c) = &event {
                assert!(!c.bio_updated);
                assert_eq!(c.status, RunOutcome::Success);
            }
        }
        assert_eq!(
            names,
            vec![
                "enrichment:started",
                "enrichment:progress",
                "enrichment:progress",
                "enrichment:completed"
            ]
        );
    }

    #[tokio::test]
    async fn test_unclosable_run_record_publishes_error() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;
        sqlx::query(
            "CREATE TRIGGER runs_read_only BEFORE UPDATE ON enrichment_runs \
             BEGIN SELECT RAISE(ABORT, 'storage down'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let notifier = ProgressNotifier::default();
        let mut rx = notifier.subscribe();
        let providers: Vec<Arc<dyn MetadataProvider>> =
            vec![Arc::new(MockProvider::new(Provider::MusicBrainz).with_tags(&["trip hop"]))];
        let svc = EnrichmentService::from_parts(
            pool.clone(),
            settings(),
            providers,
            Arc::new(MockImageFetcher::default()),
            Arc::new(notifier),
        )
        .unwrap();

        let err = svc.enrich(EntityType::Artist, id).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Infrastructure(ref m) if m.contains("storage down")));

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, EnrichmentEvent::Completed(_)));
            last = Some(event);
        }
        match last {
            Some(EnrichmentEvent::Error(e)) => assert_eq!(e.code, "INFRASTRUCTURE_ERROR"),
            other => panic!("expected a terminal error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_search_counts_against_musicbrainz() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", None).await;

        let svc = service(
            &pool,
            settings(),
            vec![
                MockProvider::new(Provider::MusicBrainz).with_search_error(EnrichmentError::ExternalApi {
                    provider: Provider::MusicBrainz,
                    http_status: Some(503),
                    http_status_text: "Service Unavailable".to_string(),
                    url: "https://musicbrainz.org/ws/2/artist".to_string(),
                }),
                MockProvider::new(Provider::LastFm).with_biography("Bristol trio"),
            ],
            MockImageFetcher::default(),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Partial);
        assert_eq!(summary.failed_providers[0].provider, Provider::MusicBrainz);
        assert_eq!(summary.conflicts_queued, 1);

        let logs = log::logs_for_run(&pool, summary.run_id).await.unwrap();
        let search = logs.iter().find(|l| l.metadata_type == "mbid_search").unwrap();
        assert_eq!(search.status, LogStatus::Error);
    }

    #[tokio::test]
    async fn test_proposal_equal_to_current_value_is_skipped() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", Some(MBID)).await;
        set_artist_column(&pool, id, "biography", "Bristol trio").await;

        let svc = service(
            &pool,
            settings(),
            vec![MockProvider::new(Provider::LastFm).with_biography("Bristol trio")],
            MockImageFetcher::default(),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert_eq!(summary.conflicts_queued, 0);
        assert_eq!(pending_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_search_feeds_mbid_to_later_providers() {
        let (pool, _dir) = temp_db().await;
        let id = seed_artist(&pool, "Portishead", None).await;

        let fanart = MockProvider::new(Provider::FanartTv)
            .with_image(ImageKind::Background, "https://img/bg.png");
        let fanart_calls = fanart.fetch_calls.clone();
        let svc = service(
            &pool,
            settings(),
            vec![
                MockProvider::new(Provider::MusicBrainz)
                    .with_candidate(MBID, "Portishead", None)
                    .with_tags(&["trip hop"]),
                fanart,
            ],
            MockImageFetcher::default().with_png("https://img/bg.png"),
        );

        let summary = svc.enrich(EntityType::Artist, id).await.unwrap();
        assert_eq!(summary.fields_updated, vec![MetadataField::Mbid, MetadataField::Tags]);
        assert_eq!(fanart_calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.conflicts_queued, 1);
    }
}

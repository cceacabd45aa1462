//! Request pipelines: Collector (datastore reads) -> pure engines -> Sink
//! (datastore writes).

use crate::cache_validator::ValidatedCacheEntry;
use crate::config::Config;
use crate::datastore::LeadDatastore;
use crate::errors::{AppError, ResultExt};
use crate::insights::{generate_insights, generate_recommendations, next_best_actions};
use crate::models::{
    BuyingSignal, EngagementEvent, EngagementSummary, Lead, LeadInsightsResponse, LeadScore,
    LeadScoreResponse, PrioritizeQuery, PrioritizeResponse, RescoreSummary, ScoreHistoryEntry,
    ScoreLeadRequest,
};
use crate::prioritizer;
use crate::scoring::ScoreCalculator;
use crate::signals::{detect_signals, rank_signals};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

/// Entries returned when a score response includes history.
pub const HISTORY_LIMIT: usize = 20;

/// Which optional sections a score response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOptions {
    pub include_history: bool,
    pub include_predictive: bool,
    pub include_insights: bool,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            include_history: false,
            include_predictive: true,
            include_insights: true,
        }
    }
}

impl From<&ScoreLeadRequest> for ScoreOptions {
    fn from(req: &ScoreLeadRequest) -> Self {
        Self {
            include_history: req.include_history,
            include_predictive: req.include_predictive,
            include_insights: req.include_insights,
        }
    }
}

/// Dead lock entries are swept once the registry grows past this size.
const LOCK_SWEEP_THRESHOLD: usize = 1_024;

type PrioritizeCache = Cache<(Uuid, String), Arc<ValidatedCacheEntry>>;

struct Recalculated {
    lead: Lead,
    events: Vec<EngagementEvent>,
    score: LeadScore,
    change: Option<i32>,
    calculated_at: DateTime<Utc>,
}

/// Per-lead write locks. Entries are weak, so a lock lives exactly as long as
/// someone holds or waits on it and is never evicted while in use.
#[derive(Default)]
struct LeadLocks {
    locks: std::sync::Mutex<HashMap<Uuid, Weak<Mutex<()>>>>,
}

impl LeadLocks {
    fn lock_for(&self, lead_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(&lead_id).and_then(Weak::upgrade) {
            return lock;
        }
        if locks.len() >= LOCK_SWEEP_THRESHOLD {
            locks.retain(|_, lock| lock.strong_count() > 0);
        }
        let lock = Arc::new(Mutex::new(()));
        locks.insert(lead_id, Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Per-workspace write counters. A prioritization computed under an older
/// generation must not be cached.
#[derive(Default)]
struct CacheGenerations {
    generations: std::sync::Mutex<HashMap<Uuid, u64>>,
}

impl CacheGenerations {
    fn current(&self, workspace_id: Uuid) -> u64 {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&workspace_id)
            .copied()
            .unwrap_or(0)
    }

    fn bump(&self, workspace_id: Uuid) {
        *self
            .generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(workspace_id)
            .or_insert(0) += 1;
    }
}

/// Lead scoring, signal detection and prioritization over a datastore.
#[derive(Clone)]
pub struct LeadIntentService {
    store: Arc<dyn LeadDatastore>,
    calculator: ScoreCalculator,
    default_limit: usize,
    max_limit: usize,
    rescore_concurrency: usize,
    prioritize_cache: Option<PrioritizeCache>,
    cache_generations: Arc<CacheGenerations>,
    /// Serializes score writes per lead.
    lead_locks: Arc<LeadLocks>,
}

impl LeadIntentService {
    pub fn new(store: Arc<dyn LeadDatastore>, config: &Config) -> Self {
        let prioritize_cache = (config.prioritize_cache_ttl_secs > 0).then(|| {
            Cache::builder()
                .max_capacity(1_000)
                .time_to_live(Duration::from_secs(config.prioritize_cache_ttl_secs))
                .support_invalidation_closures()
                .build()
        });

        let calculator = ScoreCalculator::from_config(&config.scoring);
        let (behavior, intent) = calculator.strategy_names();
        tracing::info!(
            "Lead intent service ready (behavior strategy: {}, intent strategy: {})",
            behavior,
            intent
        );

        Self {
            store,
            calculator,
            default_limit: config.prioritize_default_limit,
            max_limit: config.prioritize_max_limit.max(1),
            rescore_concurrency: config.rescore_concurrency.max(1),
            prioritize_cache,
            cache_generations: Arc::default(),
            lead_locks: Arc::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn LeadDatastore> {
        &self.store
    }

    async fn load_lead(&self, workspace_id: Uuid, lead_id: Uuid) -> Result<Lead, AppError> {
        self.store
            .get_lead(workspace_id, lead_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", lead_id)))
    }

    /// Recomputes and persists one lead's score under its write lock.
    async fn recalculate(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
        trigger: &str,
    ) -> Result<Recalculated, AppError> {
        let lock = self.lead_locks.lock_for(lead_id);
        let _guard = lock.lock().await;

        let lead = self.load_lead(workspace_id, lead_id).await?;
        let events = self
            .store
            .get_engagement_events(workspace_id, lead_id, None)
            .await?;
        let previous = self.store.get_lead_score(workspace_id, lead_id).await?;
        tracing::debug!(
            "Collected lead {} with {} events (previous score: {:?})",
            lead_id,
            events.len(),
            previous.as_ref().map(LeadScore::total_score)
        );

        let now = Utc::now();
        let score = self.calculator.calculate(&lead, &events, now);
        let change = previous
            .as_ref()
            .map(|p| score.total_score() - p.total_score());

        self.store
            .upsert_lead_score(workspace_id, &score)
            .await
            .with_context(|| format!("persisting score for lead {}", lead_id))?;
        self.invalidate_prioritization(workspace_id);

        let reason = match change {
            None => format!("{}: initial score", trigger),
            Some(0) => format!("{}: unchanged", trigger),
            Some(delta) => format!("{}: {:+}", trigger, delta),
        };
        let entry = ScoreHistoryEntry {
            id: Uuid::new_v4(),
            lead_id,
            timestamp: now,
            score: score.total_score(),
            change: change.unwrap_or(0),
            reason,
        };
        self.store.append_score_history(workspace_id, &entry).await?;

        Ok(Recalculated {
            lead,
            events,
            score,
            change,
            calculated_at: now,
        })
    }

    fn invalidate_prioritization(&self, workspace_id: Uuid) {
        self.cache_generations.bump(workspace_id);
        if let Some(cache) = &self.prioritize_cache {
            if let Err(e) = cache.invalidate_entries_if(move |(ws, _), _| *ws == workspace_id) {
                tracing::warn!("Failed to invalidate prioritization cache: {}", e);
            }
        }
    }

    /// Scores a lead, persists the snapshot and a history entry.
    pub async fn score_lead(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
        options: ScoreOptions,
    ) -> Result<LeadScoreResponse, AppError> {
        let Recalculated {
            lead,
            events,
            score,
            change,
            calculated_at,
        } = self.recalculate(workspace_id, lead_id, "manual").await?;

        let (insights, recommendations, actions) = if options.include_insights {
            let summary = EngagementSummary::from_events(&events);
            let insights = generate_insights(&score, &lead, &summary, calculated_at);
            let recommendations = generate_recommendations(&score, &insights);
            let actions = next_best_actions(&score, &lead, &summary);
            (Some(insights), Some(recommendations), Some(actions))
        } else {
            (None, None, None)
        };

        let history = if options.include_history {
            Some(
                self.store
                    .get_score_history(workspace_id, lead_id, HISTORY_LIMIT)
                    .await?,
            )
        } else {
            None
        };

        tracing::info!(
            "Scored lead {} in workspace {}: total={} change={:?}",
            lead_id,
            workspace_id,
            score.total_score(),
            change
        );

        Ok(LeadScoreResponse {
            lead_id,
            total_score: score.total_score(),
            scores: score.scores(),
            breakdown: score.breakdown.clone(),
            flags: score.flags(),
            last_calculated: score.last_calculated,
            change,
            predictive: options.include_predictive.then_some(score.predictive),
            insights,
            recommendations,
            next_best_actions: actions,
            history,
        })
    }

    /// Detects, persists and returns the ranked signals for a lead.
    pub async fn detect_buying_signals(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Vec<BuyingSignal>, AppError> {
        let lead = self.load_lead(workspace_id, lead_id).await?;
        // Bounce and unsubscribe rules look at all history.
        let events = self
            .store
            .get_engagement_events(workspace_id, lead_id, None)
            .await?;

        let detected = detect_signals(&lead, &events, Utc::now());
        if detected.is_empty() {
            return Ok(detected);
        }

        let mut stored = self
            .store
            .upsert_buying_signals(workspace_id, &detected)
            .await
            .with_context(|| format!("persisting signals for lead {}", lead_id))?;
        rank_signals(&mut stored);

        tracing::info!(
            "Stored {} buying signals for lead {} in workspace {}",
            stored.len(),
            lead_id,
            workspace_id
        );
        Ok(stored)
    }

    /// Per-lead detail view. Uses the stored score when present, otherwise a
    /// fresh unpersisted computation.
    pub async fn lead_insights(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
    ) -> Result<LeadInsightsResponse, AppError> {
        let lead = self.load_lead(workspace_id, lead_id).await?;
        let events = self
            .store
            .get_engagement_events(workspace_id, lead_id, None)
            .await?;
        let now = Utc::now();

        let score = match self.store.get_lead_score(workspace_id, lead_id).await? {
            Some(stored) => stored,
            None => {
                tracing::debug!("No stored score for lead {}, computing on the fly", lead_id);
                self.calculator.calculate(&lead, &events, now)
            }
        };

        let summary = EngagementSummary::from_events(&events);
        let insights = generate_insights(&score, &lead, &summary, now);
        let recommendations = generate_recommendations(&score, &insights);
        let actions = next_best_actions(&score, &lead, &summary);

        Ok(LeadInsightsResponse {
            lead_id,
            score,
            insights,
            recommendations,
            next_best_actions: actions,
        })
    }

    /// Effective page size: default when absent, clamped to `[1, max]`.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }

    /// Ranks the workspace's active scored leads.
    pub async fn prioritize(
        &self,
        workspace_id: Uuid,
        query: &PrioritizeQuery,
    ) -> Result<PrioritizeResponse, AppError> {
        if let Some(min) = query.min_score {
            if !(0..=100).contains(&min) {
                return Err(AppError::BadRequest(
                    "min_score must be between 0 and 100".to_string(),
                ));
            }
        }

        let limit = self.effective_limit(query.limit);
        let filters = query.filters();
        let cache_key = (
            workspace_id,
            format!(
                "{}:{:?}:{}:{}",
                limit, filters.min_score, filters.engagement, filters.intent
            ),
        );

        if let Some(cache) = &self.prioritize_cache {
            if let Some(entry) = cache.get(&cache_key).await {
                if let Some(response) = entry.open::<PrioritizeResponse>() {
                    tracing::debug!("Prioritization cache hit for workspace {}", workspace_id);
                    return Ok(response);
                }
                cache.invalidate(&cache_key).await;
            }
        }

        let generation = self.cache_generations.current(workspace_id);
        let candidates = self
            .store
            .get_active_leads_with_scores(workspace_id, &filters)
            .await?;
        let lead_ids: Vec<Uuid> = candidates.iter().map(|(lead, _)| lead.id).collect();
        let events = self
            .store
            .get_events_for_leads(workspace_id, &lead_ids, None)
            .await?;
        tracing::debug!(
            "Prioritizing {} candidates with events for {} leads",
            candidates.len(),
            events.len()
        );

        let prioritized_leads = prioritizer::prioritize(candidates, &events, limit, Utc::now());
        let response = PrioritizeResponse {
            total: prioritized_leads.len(),
            prioritized_leads,
        };

        if let Some(cache) = &self.prioritize_cache {
            self.cache_prioritization(cache, cache_key, generation, &response)
                .await;
        }

        Ok(response)
    }

    /// Caches a ranking unless a score write landed since its inputs were read.
    async fn cache_prioritization(
        &self,
        cache: &PrioritizeCache,
        cache_key: (Uuid, String),
        generation: u64,
        response: &PrioritizeResponse,
    ) {
        let workspace_id = cache_key.0;
        if self.cache_generations.current(workspace_id) != generation {
            tracing::debug!("Skipping stale prioritization cache for workspace {}", workspace_id);
            return;
        }
        let entry = match ValidatedCacheEntry::seal(response) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Failed to cache prioritization: {}", e);
                return;
            }
        };
        cache.insert(cache_key.clone(), Arc::new(entry)).await;
        // A write between the check and the insert may have missed this entry.
        if self.cache_generations.current(workspace_id) != generation {
            cache.invalidate(&cache_key).await;
        }
    }

    /// Rescores every active lead with bounded concurrency. Individual
    /// failures are counted, not propagated.
    pub async fn rescore_workspace(&self, workspace_id: Uuid) -> Result<RescoreSummary, AppError> {
        let started = Instant::now();
        let lead_ids = self.store.get_active_lead_ids(workspace_id).await?;
        tracing::info!(
            "Rescoring {} leads in workspace {} (concurrency {})",
            lead_ids.len(),
            workspace_id,
            self.rescore_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.rescore_concurrency));
        let mut tasks = JoinSet::new();

        for lead_id in lead_ids {
            let service = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::InternalError(format!("rescore aborted: {}", e)))?;
                service
                    .recalculate(workspace_id, lead_id, "batch rescore")
                    .await
                    .map(|_| ())
                    .with_context(|| format!("rescoring lead {}", lead_id))
            });
        }

        let (mut scored, mut failed) = (0, 0);
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(AppError::from).and_then(|r| r) {
                Ok(()) => scored += 1,
                Err(e) => {
                    tracing::warn!("{}", e);
                    failed += 1;
                }
            }
        }

        let summary = RescoreSummary {
            workspace_id,
            scored,
            failed,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "Rescored workspace {}: {} scored, {} failed in {}ms",
            workspace_id,
            summary.scored,
            summary.failed,
            summary.duration_ms
        );
        Ok(summary)
    }
}

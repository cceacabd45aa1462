//! In-process [`LeadDatastore`] used by tests and local demos.

use crate::datastore::LeadDatastore;
use crate::errors::AppError;
use crate::models::{
    BuyingSignal, EngagementEvent, Lead, LeadScore, LeadStatus, PrioritizeFilters,
    ScoreHistoryEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    leads: HashMap<Uuid, Lead>,
    events: Vec<EngagementEvent>,
    scores: HashMap<Uuid, LeadScore>,
    history: Vec<(Uuid, ScoreHistoryEntry)>,
    signals: Vec<BuyingSignal>,
    members: HashSet<(Uuid, String)>,
    failing_writes: HashSet<Uuid>,
    failing_history: HashSet<Uuid>,
}

impl State {
    fn lead_in(&self, workspace_id: Uuid, lead_id: Uuid) -> Option<&Lead> {
        self.leads
            .get(&lead_id)
            .filter(|l| l.workspace_id == workspace_id)
    }
}

#[derive(Default)]
pub struct InMemoryDatastore {
    state: RwLock<State>,
    failing: AtomicBool,
    active_queries: AtomicUsize,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_lead(&self, lead: Lead) {
        self.state.write().await.leads.insert(lead.id, lead);
    }

    pub async fn insert_events(&self, events: impl IntoIterator<Item = EngagementEvent>) {
        self.state.write().await.events.extend(events);
    }

    pub async fn add_member(&self, workspace_id: Uuid, user_id: &str) {
        self.state
            .write()
            .await
            .members
            .insert((workspace_id, user_id.to_string()));
    }

    /// Makes every subsequent call fail as a downstream database error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes score writes for one lead fail.
    pub async fn fail_writes_for(&self, lead_id: Uuid) {
        self.state.write().await.failing_writes.insert(lead_id);
    }

    /// Makes history appends for one lead fail after the score write succeeded.
    pub async fn fail_history_for(&self, lead_id: Uuid) {
        self.state.write().await.failing_history.insert(lead_id);
    }

    /// Number of `get_active_leads_with_scores` calls served.
    pub fn active_query_count(&self) -> usize {
        self.active_queries.load(Ordering::SeqCst)
    }

    pub async fn stored_signals(&self, lead_id: Uuid) -> Vec<BuyingSignal> {
        self.state
            .read()
            .await
            .signals
            .iter()
            .filter(|s| s.lead_id == lead_id)
            .cloned()
            .collect()
    }

    fn check(&self) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

fn since_filter(since: Option<DateTime<Utc>>) -> impl Fn(&&EngagementEvent) -> bool {
    move |e: &&EngagementEvent| since.map_or(true, |s| e.occurred_at >= s)
}

#[async_trait]
impl LeadDatastore for InMemoryDatastore {
    async fn get_lead(&self, workspace_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, AppError> {
        self.check()?;
        Ok(self.state.read().await.lead_in(workspace_id, lead_id).cloned())
    }

    async fn get_engagement_events(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EngagementEvent>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        if state.lead_in(workspace_id, lead_id).is_none() {
            return Ok(Vec::new());
        }
        let mut events: Vec<EngagementEvent> = state
            .events
            .iter()
            .filter(|e| e.lead_id == lead_id)
            .filter(since_filter(since))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }

    async fn get_events_for_leads(
        &self,
        workspace_id: Uuid,
        lead_ids: &[Uuid],
        since: Option<DateTime<Utc>>,
    ) -> Result<HashMap<Uuid, Vec<EngagementEvent>>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        let wanted: HashSet<Uuid> = lead_ids
            .iter()
            .copied()
            .filter(|id| state.lead_in(workspace_id, *id).is_some())
            .collect();

        let mut grouped: HashMap<Uuid, Vec<EngagementEvent>> = HashMap::new();
        for event in state
            .events
            .iter()
            .filter(|e| wanted.contains(&e.lead_id))
            .filter(since_filter(since))
        {
            grouped.entry(event.lead_id).or_default().push(event.clone());
        }
        for events in grouped.values_mut() {
            events.sort_by_key(|e| e.occurred_at);
        }
        Ok(grouped)
    }

    async fn get_active_leads_with_scores(
        &self,
        workspace_id: Uuid,
        filters: &PrioritizeFilters,
    ) -> Result<Vec<(Lead, LeadScore)>, AppError> {
        self.check()?;
        self.active_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        let mut rows: Vec<(Lead, LeadScore)> = state
            .leads
            .values()
            .filter(|l| l.workspace_id == workspace_id && l.status == LeadStatus::Active)
            .filter_map(|l| {
                state
                    .scores
                    .get(&l.id)
                    .filter(|s| filters.matches(s))
                    .map(|s| (l.clone(), s.clone()))
            })
            .collect();
        // HashMap order is arbitrary; creation order keeps tie-breaks deterministic.
        rows.sort_by_key(|(l, _)| (l.created_at, l.id));
        Ok(rows)
    }

    async fn get_active_lead_ids(&self, workspace_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        let mut leads: Vec<&Lead> = state
            .leads
            .values()
            .filter(|l| l.workspace_id == workspace_id && l.status == LeadStatus::Active)
            .collect();
        leads.sort_by_key(|l| (l.created_at, l.id));
        Ok(leads.into_iter().map(|l| l.id).collect())
    }

    async fn get_lead_score(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Option<LeadScore>, AppError> {
        self.check()?;
        Ok(self
            .state
            .read()
            .await
            .scores
            .get(&lead_id)
            .filter(|s| s.workspace_id == workspace_id)
            .cloned())
    }

    async fn get_score_history(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ScoreHistoryEntry>, AppError> {
        self.check()?;
        let state = self.state.read().await;
        let mut entries: Vec<ScoreHistoryEntry> = state
            .history
            .iter()
            .filter(|(ws, e)| *ws == workspace_id && e.lead_id == lead_id)
            .map(|(_, e)| e.clone())
            .collect();
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn upsert_lead_score(
        &self,
        workspace_id: Uuid,
        score: &LeadScore,
    ) -> Result<(), AppError> {
        self.check()?;
        let mut state = self.state.write().await;
        if state.failing_writes.contains(&score.lead_id) {
            return Err(AppError::DatabaseError(sqlx::Error::WorkerCrashed));
        }
        if state.lead_in(workspace_id, score.lead_id).is_none() {
            return Err(AppError::NotFound(format!("lead {}", score.lead_id)));
        }
        state.scores.insert(score.lead_id, score.clone());
        Ok(())
    }

    async fn upsert_buying_signals(
        &self,
        workspace_id: Uuid,
        signals: &[BuyingSignal],
    ) -> Result<Vec<BuyingSignal>, AppError> {
        self.check()?;
        let mut state = self.state.write().await;
        let mut stored = Vec::with_capacity(signals.len());
        for signal in signals {
            let existing = state.signals.iter_mut().find(|s| {
                s.workspace_id == workspace_id && s.dedup_key() == signal.dedup_key()
            });
            match existing {
                Some(row) => {
                    row.merge_redetection(signal);
                    stored.push(row.clone());
                }
                None => {
                    let row = BuyingSignal {
                        workspace_id,
                        ..signal.clone()
                    };
                    state.signals.push(row.clone());
                    stored.push(row);
                }
            }
        }
        Ok(stored)
    }

    async fn append_score_history(
        &self,
        workspace_id: Uuid,
        entry: &ScoreHistoryEntry,
    ) -> Result<(), AppError> {
        self.check()?;
        let mut state = self.state.write().await;
        if state.failing_history.contains(&entry.lead_id) {
            return Err(AppError::DatabaseError(sqlx::Error::WorkerCrashed));
        }
        state.history.push((workspace_id, entry.clone()));
        Ok(())
    }

    async fn is_workspace_member(
        &self,
        workspace_id: Uuid,
        user_id: &str,
    ) -> Result<bool, AppError> {
        self.check()?;
        Ok(self
            .state
            .read()
            .await
            .members
            .contains(&(workspace_id, user_id.to_string())))
    }
}

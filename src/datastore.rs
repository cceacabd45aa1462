//! Persistence boundary for leads, engagement events, scores and signals.
//!
//! Every read is workspace scoped. The service only talks to this trait so
//! tests can swap in [`crate::memory_store::InMemoryDatastore`].

use crate::errors::AppError;
use crate::models::{
    BuyingSignal, EngagementEvent, Lead, LeadScore, PrioritizeFilters, ScoreHistoryEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait LeadDatastore: Send + Sync {
    async fn get_lead(&self, workspace_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, AppError>;

    /// Events for one lead, oldest first. `since` of `None` means all history.
    async fn get_engagement_events(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EngagementEvent>, AppError>;

    /// Batched variant of [`Self::get_engagement_events`], keyed by lead id.
    /// Leads without events are absent from the map.
    async fn get_events_for_leads(
        &self,
        workspace_id: Uuid,
        lead_ids: &[Uuid],
        since: Option<DateTime<Utc>>,
    ) -> Result<HashMap<Uuid, Vec<EngagementEvent>>, AppError>;

    /// Active leads joined with their stored score, filtered but unbounded.
    async fn get_active_leads_with_scores(
        &self,
        workspace_id: Uuid,
        filters: &PrioritizeFilters,
    ) -> Result<Vec<(Lead, LeadScore)>, AppError>;

    /// Ids of every active lead in the workspace, scored or not.
    async fn get_active_lead_ids(&self, workspace_id: Uuid) -> Result<Vec<Uuid>, AppError>;

    async fn get_lead_score(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Option<LeadScore>, AppError>;

    /// Newest first.
    async fn get_score_history(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ScoreHistoryEntry>, AppError>;

    /// Last write wins on lead id.
    async fn upsert_lead_score(&self, workspace_id: Uuid, score: &LeadScore)
        -> Result<(), AppError>;

    /// Upserts keyed on (lead, type, name) and returns the stored rows.
    async fn upsert_buying_signals(
        &self,
        workspace_id: Uuid,
        signals: &[BuyingSignal],
    ) -> Result<Vec<BuyingSignal>, AppError>;

    async fn append_score_history(
        &self,
        workspace_id: Uuid,
        entry: &ScoreHistoryEntry,
    ) -> Result<(), AppError>;

    async fn is_workspace_member(&self, workspace_id: Uuid, user_id: &str)
        -> Result<bool, AppError>;
}

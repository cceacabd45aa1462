//! Postgres-backed [`LeadDatastore`].
//!
//! Tables read and written (managed outside this service):
//!
//! - `leads (id uuid pk, workspace_id uuid, email text, first_name text,
//!   last_name text, company text, title text, phone text, linkedin_url text,
//!   twitter_handle text, enrichment jsonb, status text, created_at timestamptz)`
//! - `engagement_events (id uuid pk, lead_id uuid, event_type text,
//!   occurred_at timestamptz, metadata jsonb)`
//! - `lead_scores (lead_id uuid pk, workspace_id uuid, profile_score int,
//!   engagement_score int, behavior_score int, intent_score int, fit_score int,
//!   total_score int, breakdown jsonb, conversion_probability float8,
//!   churn_risk float8, estimated_deal_size float8, estimated_time_to_close float8,
//!   estimated_lifetime_value float8, is_hot bool, is_qualified bool,
//!   is_engaged bool, requires_nurturing bool, last_calculated timestamptz)`
//! - `lead_score_history (id uuid pk, workspace_id uuid, lead_id uuid,
//!   recorded_at timestamptz, score int, change int, reason text)`
//! - `buying_signals (id uuid pk, workspace_id uuid, lead_id uuid,
//!   signal_type text, signal_name text, description text, confidence float8,
//!   detected_at timestamptz, source text, metadata jsonb,
//!   unique (lead_id, signal_type, signal_name))`
//! - `workspace_members (workspace_id uuid, user_id text)`

use crate::datastore::LeadDatastore;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    BuyingSignal, EngagementEvent, Enrichment, Lead, LeadScore, PredictiveScores,
    PrioritizeFilters, ScoreHistoryEntry, SubScores,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use uuid::Uuid;

const LEAD_COLUMNS: &str = "l.id, l.workspace_id, l.email, l.first_name, l.last_name, \
     l.company, l.title, l.phone, l.linkedin_url, l.twitter_handle, l.enrichment, \
     l.status, l.created_at";

const SCORE_COLUMNS: &str = "s.lead_id, s.profile_score, s.engagement_score, \
     s.behavior_score, s.intent_score, s.fit_score, s.total_score, s.breakdown, \
     s.conversion_probability, s.churn_risk, s.estimated_deal_size, \
     s.estimated_time_to_close, s.estimated_lifetime_value, s.last_calculated";

fn parse_column<T: FromStr<Err = String>>(value: &str) -> Result<T, AppError> {
    value
        .parse()
        .map_err(|e: String| AppError::InternalError(format!("corrupt row: {}", e)))
}

#[derive(sqlx::FromRow)]
struct LeadRow {
    id: Uuid,
    workspace_id: Uuid,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    company: Option<String>,
    title: Option<String>,
    phone: Option<String>,
    linkedin_url: Option<String>,
    twitter_handle: Option<String>,
    enrichment: Option<Value>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = AppError;

    fn try_from(row: LeadRow) -> Result<Self, Self::Error> {
        Ok(Lead {
            id: row.id,
            workspace_id: row.workspace_id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            company: row.company,
            title: row.title,
            phone: row.phone,
            linkedin_url: row.linkedin_url,
            twitter_handle: row.twitter_handle,
            enrichment: Enrichment::new(row.enrichment.unwrap_or(Value::Null)),
            status: parse_column(&row.status)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    lead_id: Uuid,
    event_type: String,
    occurred_at: DateTime<Utc>,
    metadata: Option<Value>,
}

impl TryFrom<EventRow> for EngagementEvent {
    type Error = AppError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(EngagementEvent {
            id: row.id,
            lead_id: row.lead_id,
            kind: parse_column(&row.event_type)?,
            occurred_at: row.occurred_at,
            metadata: row.metadata.unwrap_or(Value::Null),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScoreRow {
    lead_id: Uuid,
    profile_score: i32,
    engagement_score: i32,
    behavior_score: i32,
    intent_score: i32,
    fit_score: i32,
    total_score: i32,
    breakdown: Json<BTreeMap<String, i32>>,
    conversion_probability: f64,
    churn_risk: f64,
    estimated_deal_size: f64,
    estimated_time_to_close: f64,
    estimated_lifetime_value: f64,
    last_calculated: DateTime<Utc>,
}

impl ScoreRow {
    fn into_score(self, workspace_id: Uuid) -> LeadScore {
        LeadScore::from_stored(
            self.lead_id,
            workspace_id,
            SubScores {
                profile: self.profile_score,
                engagement: self.engagement_score,
                behavior: self.behavior_score,
                intent: self.intent_score,
                fit: self.fit_score,
            },
            self.total_score,
            self.breakdown.0,
            PredictiveScores {
                conversion_probability: self.conversion_probability,
                churn_risk: self.churn_risk,
                estimated_deal_size: self.estimated_deal_size,
                estimated_time_to_close: self.estimated_time_to_close,
                estimated_lifetime_value: self.estimated_lifetime_value,
            },
            self.last_calculated,
        )
    }
}

#[derive(sqlx::FromRow)]
struct LeadWithScoreRow {
    #[sqlx(flatten)]
    lead: LeadRow,
    #[sqlx(flatten)]
    score: ScoreRow,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    lead_id: Uuid,
    recorded_at: DateTime<Utc>,
    score: i32,
    change: i32,
    reason: String,
}

impl From<HistoryRow> for ScoreHistoryEntry {
    fn from(row: HistoryRow) -> Self {
        ScoreHistoryEntry {
            id: row.id,
            lead_id: row.lead_id,
            timestamp: row.recorded_at,
            score: row.score,
            change: row.change,
            reason: row.reason,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SignalRow {
    id: Uuid,
    lead_id: Uuid,
    workspace_id: Uuid,
    signal_type: String,
    signal_name: String,
    description: String,
    confidence: f64,
    detected_at: DateTime<Utc>,
    source: String,
    metadata: Option<Value>,
}

impl TryFrom<SignalRow> for BuyingSignal {
    type Error = AppError;

    fn try_from(row: SignalRow) -> Result<Self, Self::Error> {
        Ok(BuyingSignal {
            id: row.id,
            lead_id: row.lead_id,
            workspace_id: row.workspace_id,
            signal_type: parse_column(&row.signal_type)?,
            signal_name: row.signal_name,
            description: row.description,
            confidence: row.confidence,
            detected_at: row.detected_at,
            source: parse_column(&row.source)?,
            metadata: row.metadata.unwrap_or(Value::Null),
        })
    }
}

/// sqlx implementation of the lead datastore.
#[derive(Clone)]
pub struct PgDatastore {
    pool: PgPool,
}

impl PgDatastore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadDatastore for PgDatastore {
    async fn get_lead(&self, workspace_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, AppError> {
        let sql = format!(
            "SELECT {} FROM leads l WHERE l.id = $1 AND l.workspace_id = $2",
            LEAD_COLUMNS
        );
        sqlx::query_as::<_, LeadRow>(&sql)
            .bind(lead_id)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("loading lead {}", lead_id))?
            .map(Lead::try_from)
            .transpose()
    }

    async fn get_engagement_events(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EngagementEvent>, AppError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT e.id, e.lead_id, e.event_type, e.occurred_at, e.metadata
            FROM engagement_events e
            JOIN leads l ON l.id = e.lead_id
            WHERE e.lead_id = $1
              AND l.workspace_id = $2
              AND ($3::timestamptz IS NULL OR e.occurred_at >= $3)
            ORDER BY e.occurred_at ASC
            "#,
        )
        .bind(lead_id)
        .bind(workspace_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("loading events for lead {}", lead_id))?;

        rows.into_iter().map(EngagementEvent::try_from).collect()
    }

    async fn get_events_for_leads(
        &self,
        workspace_id: Uuid,
        lead_ids: &[Uuid],
        since: Option<DateTime<Utc>>,
    ) -> Result<HashMap<Uuid, Vec<EngagementEvent>>, AppError> {
        if lead_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT e.id, e.lead_id, e.event_type, e.occurred_at, e.metadata
            FROM engagement_events e
            JOIN leads l ON l.id = e.lead_id
            WHERE e.lead_id = ANY($1)
              AND l.workspace_id = $2
              AND ($3::timestamptz IS NULL OR e.occurred_at >= $3)
            ORDER BY e.occurred_at ASC
            "#,
        )
        .bind(lead_ids)
        .bind(workspace_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("loading events for prioritization")?;

        let mut grouped: HashMap<Uuid, Vec<EngagementEvent>> = HashMap::new();
        for row in rows {
            let event = EngagementEvent::try_from(row)?;
            grouped.entry(event.lead_id).or_default().push(event);
        }
        Ok(grouped)
    }

    async fn get_active_leads_with_scores(
        &self,
        workspace_id: Uuid,
        filters: &PrioritizeFilters,
    ) -> Result<Vec<(Lead, LeadScore)>, AppError> {
        let sql = format!(
            r#"
            SELECT {}, {}
            FROM leads l
            JOIN lead_scores s ON s.lead_id = l.id
            WHERE l.workspace_id = $1
              AND l.status = 'active'
              AND ($2::int IS NULL OR s.total_score >= $2)
              AND (NOT $3 OR s.engagement_score >= $5)
              AND (NOT $4 OR s.intent_score >= $5)
            ORDER BY l.created_at ASC, l.id ASC
            "#,
            LEAD_COLUMNS, SCORE_COLUMNS
        );

        let rows = sqlx::query_as::<_, LeadWithScoreRow>(&sql)
            .bind(workspace_id)
            .bind(filters.min_score)
            .bind(filters.engagement)
            .bind(filters.intent)
            .bind(PrioritizeFilters::SUB_SCORE_THRESHOLD)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("loading active leads for workspace {}", workspace_id))?;

        rows.into_iter()
            .map(|row| {
                let lead = Lead::try_from(row.lead)?;
                let score = row.score.into_score(lead.workspace_id);
                Ok((lead, score))
            })
            .collect()
    }

    async fn get_active_lead_ids(&self, workspace_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM leads WHERE workspace_id = $1 AND status = 'active' ORDER BY created_at ASC, id ASC",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("listing active leads for workspace {}", workspace_id))
    }

    async fn get_lead_score(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Option<LeadScore>, AppError> {
        let sql = format!(
            "SELECT {} FROM lead_scores s WHERE s.lead_id = $1 AND s.workspace_id = $2",
            SCORE_COLUMNS
        );
        let row = sqlx::query_as::<_, ScoreRow>(&sql)
            .bind(lead_id)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("loading score for lead {}", lead_id))?;

        Ok(row.map(|r| r.into_score(workspace_id)))
    }

    async fn get_score_history(
        &self,
        workspace_id: Uuid,
        lead_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ScoreHistoryEntry>, AppError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, lead_id, recorded_at, score, change, reason
            FROM lead_score_history
            WHERE lead_id = $1 AND workspace_id = $2
            ORDER BY recorded_at DESC
            LIMIT $3
            "#,
        )
        .bind(lead_id)
        .bind(workspace_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("loading score history for lead {}", lead_id))?;

        Ok(rows.into_iter().map(ScoreHistoryEntry::from).collect())
    }

    async fn upsert_lead_score(
        &self,
        workspace_id: Uuid,
        score: &LeadScore,
    ) -> Result<(), AppError> {
        let flags = score.flags();
        let predictive = score.predictive;

        sqlx::query(
            r#"
            INSERT INTO lead_scores (
                lead_id, workspace_id, profile_score, engagement_score, behavior_score,
                intent_score, fit_score, total_score, breakdown, conversion_probability,
                churn_risk, estimated_deal_size, estimated_time_to_close,
                estimated_lifetime_value, is_hot, is_qualified, is_engaged,
                requires_nurturing, last_calculated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (lead_id) DO UPDATE
            SET profile_score = EXCLUDED.profile_score,
                engagement_score = EXCLUDED.engagement_score,
                behavior_score = EXCLUDED.behavior_score,
                intent_score = EXCLUDED.intent_score,
                fit_score = EXCLUDED.fit_score,
                total_score = EXCLUDED.total_score,
                breakdown = EXCLUDED.breakdown,
                conversion_probability = EXCLUDED.conversion_probability,
                churn_risk = EXCLUDED.churn_risk,
                estimated_deal_size = EXCLUDED.estimated_deal_size,
                estimated_time_to_close = EXCLUDED.estimated_time_to_close,
                estimated_lifetime_value = EXCLUDED.estimated_lifetime_value,
                is_hot = EXCLUDED.is_hot,
                is_qualified = EXCLUDED.is_qualified,
                is_engaged = EXCLUDED.is_engaged,
                requires_nurturing = EXCLUDED.requires_nurturing,
                last_calculated = EXCLUDED.last_calculated
            "#,
        )
        .bind(score.lead_id)
        .bind(workspace_id)
        .bind(score.profile_score())
        .bind(score.engagement_score())
        .bind(score.behavior_score())
        .bind(score.intent_score())
        .bind(score.fit_score())
        .bind(score.total_score())
        .bind(Json(&score.breakdown))
        .bind(predictive.conversion_probability)
        .bind(predictive.churn_risk)
        .bind(predictive.estimated_deal_size)
        .bind(predictive.estimated_time_to_close)
        .bind(predictive.estimated_lifetime_value)
        .bind(flags.is_hot())
        .bind(flags.is_qualified())
        .bind(flags.is_engaged())
        .bind(flags.requires_nurturing())
        .bind(score.last_calculated)
        .execute(&self.pool)
        .await
        .with_context(|| format!("storing score for lead {}", score.lead_id))?;

        Ok(())
    }

    async fn upsert_buying_signals(
        &self,
        workspace_id: Uuid,
        signals: &[BuyingSignal],
    ) -> Result<Vec<BuyingSignal>, AppError> {
        let mut tx = self.pool.begin().await.context("opening signal transaction")?;
        let mut stored = Vec::with_capacity(signals.len());

        for signal in signals {
            let row = sqlx::query_as::<_, SignalRow>(
                r#"
                INSERT INTO buying_signals (
                    id, workspace_id, lead_id, signal_type, signal_name, description,
                    confidence, detected_at, source, metadata
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (lead_id, signal_type, signal_name) DO UPDATE
                SET confidence = GREATEST(buying_signals.confidence, EXCLUDED.confidence),
                    detected_at = GREATEST(buying_signals.detected_at, EXCLUDED.detected_at),
                    description = EXCLUDED.description,
                    source = EXCLUDED.source,
                    metadata = EXCLUDED.metadata
                RETURNING id, lead_id, workspace_id, signal_type, signal_name, description,
                          confidence, detected_at, source, metadata
                "#,
            )
            .bind(signal.id)
            .bind(workspace_id)
            .bind(signal.lead_id)
            .bind(signal.signal_type.as_str())
            .bind(&signal.signal_name)
            .bind(&signal.description)
            .bind(signal.confidence)
            .bind(signal.detected_at)
            .bind(signal.source.as_str())
            .bind(&signal.metadata)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("storing signal '{}'", signal.signal_name))?;

            stored.push(BuyingSignal::try_from(row)?);
        }

        tx.commit().await.context("committing signals")?;
        Ok(stored)
    }

    async fn append_score_history(
        &self,
        workspace_id: Uuid,
        entry: &ScoreHistoryEntry,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO lead_score_history (id, workspace_id, lead_id, recorded_at, score, change, reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(workspace_id)
        .bind(entry.lead_id)
        .bind(entry.timestamp)
        .bind(entry.score)
        .bind(entry.change)
        .bind(&entry.reason)
        .execute(&self.pool)
        .await
        .with_context(|| format!("appending score history for lead {}", entry.lead_id))?;

        Ok(())
    }

    async fn is_workspace_member(
        &self,
        workspace_id: Uuid,
        user_id: &str,
    ) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM workspace_members WHERE workspace_id = $1 AND user_id = $2)",
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("checking workspace membership")
    }
}

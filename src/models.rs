use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Lead ============

/// Lifecycle status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Active,
    Contacted,
    Qualified,
    Converted,
    Bounced,
    Unsubscribed,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Active => "active",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Converted => "converted",
            LeadStatus::Bounced => "bounced",
            LeadStatus::Unsubscribed => "unsubscribed",
            LeadStatus::Lost => "lost",
        }
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(LeadStatus::New),
            "active" => Ok(LeadStatus::Active),
            "contacted" => Ok(LeadStatus::Contacted),
            "qualified" => Ok(LeadStatus::Qualified),
            "converted" => Ok(LeadStatus::Converted),
            "bounced" => Ok(LeadStatus::Bounced),
            "unsubscribed" => Ok(LeadStatus::Unsubscribed),
            "lost" => Ok(LeadStatus::Lost),
            other => Err(format!("unknown lead status '{}'", other)),
        }
    }
}

/// Free-form enrichment attribute bag attached to a lead.
///
/// Providers disagree on types, so numeric attributes are accepted either as
/// JSON numbers or as strings with a leading integer ("300", "51-200").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Enrichment(pub Value);

impl Enrichment {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Lower-cased industry, if present.
    pub fn industry(&self) -> Option<String> {
        self.get("industry")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }

    /// Employee count from `company_size`, falling back to `employee_count`.
    pub fn company_size(&self) -> Option<u64> {
        self.get("company_size")
            .and_then(leading_integer)
            .or_else(|| self.get("employee_count").and_then(leading_integer))
    }

    /// Total funding raised, in currency units.
    pub fn funding_total(&self) -> Option<f64> {
        self.get("funding_total").and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
            _ => None,
        })
    }
}

fn leading_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            // "1,001-5,000" reads as 1001
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '_')
                .filter(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// A prospect record owned by exactly one workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    /// Primary social profile URL (LinkedIn).
    pub linkedin_url: Option<String>,
    /// Secondary social handle (Twitter/X).
    pub twitter_handle: Option<String>,
    #[serde(default)]
    pub enrichment: Enrichment,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Lead {
    pub fn title(&self) -> Option<&str> {
        present(&self.title)
    }

    pub fn has_company(&self) -> bool {
        present(&self.company).is_some()
    }

    pub fn has_phone(&self) -> bool {
        present(&self.phone).is_some()
    }

    pub fn has_social_url(&self) -> bool {
        present(&self.linkedin_url).is_some()
    }

    pub fn has_secondary_social(&self) -> bool {
        present(&self.twitter_handle).is_some()
    }

    pub fn display_name(&self) -> String {
        let name = [present(&self.first_name), present(&self.last_name)]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }
}

// ============ Engagement events ============

/// Kind of tracked interaction with an email or asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Replied,
    Bounced,
    Unsubscribed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Sent => "sent",
            EventKind::Delivered => "delivered",
            EventKind::Opened => "opened",
            EventKind::Clicked => "clicked",
            EventKind::Replied => "replied",
            EventKind::Bounced => "bounced",
            EventKind::Unsubscribed => "unsubscribed",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sent" => Ok(EventKind::Sent),
            "delivered" => Ok(EventKind::Delivered),
            "opened" | "open" => Ok(EventKind::Opened),
            "clicked" | "click" => Ok(EventKind::Clicked),
            "replied" | "reply" => Ok(EventKind::Replied),
            "bounced" | "bounce" => Ok(EventKind::Bounced),
            "unsubscribed" | "unsubscribe" => Ok(EventKind::Unsubscribed),
            other => Err(format!("unknown event kind '{}'", other)),
        }
    }
}

/// Immutable, timestamped interaction fact produced by the tracking subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementEvent {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

impl EngagementEvent {
    /// Clicked URL carried in the event metadata.
    pub fn url(&self) -> Option<&str> {
        self.metadata
            .get("url")
            .or_else(|| self.metadata.get("clicked_url"))
            .and_then(|v| v.as_str())
    }

    pub fn message_id(&self) -> Option<&str> {
        self.metadata.get("message_id").and_then(|v| v.as_str())
    }
}

/// Per-kind event counts over some window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSummary {
    pub sent: u32,
    pub delivered: u32,
    pub opens: u32,
    pub clicks: u32,
    pub replies: u32,
    pub bounces: u32,
    pub unsubscribes: u32,
    pub total: u32,
}

impl EngagementSummary {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a EngagementEvent>) -> Self {
        let mut summary = Self::default();
        for event in events {
            summary.total += 1;
            match event.kind {
                EventKind::Sent => summary.sent += 1,
                EventKind::Delivered => summary.delivered += 1,
                EventKind::Opened => summary.opens += 1,
                EventKind::Clicked => summary.clicks += 1,
                EventKind::Replied => summary.replies += 1,
                EventKind::Bounced => summary.bounces += 1,
                EventKind::Unsubscribed => summary.unsubscribes += 1,
            }
        }
        summary
    }

    /// Counts events with `since <= occurred_at <= until`.
    pub fn within(events: &[EngagementEvent], since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self::from_events(
            events
                .iter()
                .filter(|e| e.occurred_at >= since && e.occurred_at <= until),
        )
    }
}

// ============ Scores ============

/// The five independent sub-scores, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    pub profile: i32,
    pub engagement: i32,
    pub behavior: i32,
    pub intent: i32,
    pub fit: i32,
}

impl SubScores {
    /// Weights in percent: profile 20, engagement 25, behavior 20, intent 25, fit 10.
    pub const PROFILE_WEIGHT: i32 = 20;
    pub const ENGAGEMENT_WEIGHT: i32 = 25;
    pub const BEHAVIOR_WEIGHT: i32 = 20;
    pub const INTENT_WEIGHT: i32 = 25;
    pub const FIT_WEIGHT: i32 = 10;

    pub fn clamped(self) -> Self {
        Self {
            profile: clamp_score(self.profile),
            engagement: clamp_score(self.engagement),
            behavior: clamp_score(self.behavior),
            intent: clamp_score(self.intent),
            fit: clamp_score(self.fit),
        }
    }

    /// Weighted total, rounded half up. Integer arithmetic keeps .5 exact.
    pub fn weighted_total(&self) -> i32 {
        let weighted = self.profile * Self::PROFILE_WEIGHT
            + self.engagement * Self::ENGAGEMENT_WEIGHT
            + self.behavior * Self::BEHAVIOR_WEIGHT
            + self.intent * Self::INTENT_WEIGHT
            + self.fit * Self::FIT_WEIGHT;
        clamp_score((weighted + 50).div_euclid(100))
    }
}

pub fn clamp_score(value: i32) -> i32 {
    value.clamp(0, 100)
}

/// Derived predictive estimates (heuristic, not learned).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveScores {
    pub conversion_probability: f64,
    pub churn_risk: f64,
    pub estimated_deal_size: f64,
    /// Days.
    pub estimated_time_to_close: f64,
    pub estimated_lifetime_value: f64,
}

impl PredictiveScores {
    pub const MAX_CONVERSION_PROBABILITY: f64 = 0.95;
    pub const MIN_CHURN_RISK: f64 = 0.05;

    pub fn clamped(self) -> Self {
        Self {
            conversion_probability: self
                .conversion_probability
                .clamp(0.0, Self::MAX_CONVERSION_PROBABILITY),
            churn_risk: self.churn_risk.clamp(Self::MIN_CHURN_RISK, 1.0),
            estimated_deal_size: self.estimated_deal_size.max(0.0),
            estimated_time_to_close: self.estimated_time_to_close.max(0.0),
            estimated_lifetime_value: self.estimated_lifetime_value.max(0.0),
        }
    }
}

/// Boolean classification flags. Only constructible from scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreFlags {
    is_hot: bool,
    is_qualified: bool,
    is_engaged: bool,
    requires_nurturing: bool,
}

impl ScoreFlags {
    pub fn derive(total: i32, engagement: i32, fit: i32) -> Self {
        Self {
            is_hot: total >= 80,
            is_qualified: total >= 60 && fit >= 70,
            is_engaged: engagement >= 70,
            requires_nurturing: total < 60 || engagement < 50,
        }
    }

    pub fn is_hot(&self) -> bool {
        self.is_hot
    }

    pub fn is_qualified(&self) -> bool {
        self.is_qualified
    }

    pub fn is_engaged(&self) -> bool {
        self.is_engaged
    }

    pub fn requires_nurturing(&self) -> bool {
        self.requires_nurturing
    }
}

/// Current score snapshot for one lead (upserted by lead id).
///
/// Scores, total and flags are private so the clamping and qualification
/// invariants cannot be bypassed after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadScore {
    pub lead_id: Uuid,
    pub workspace_id: Uuid,
    scores: SubScores,
    total_score: i32,
    pub breakdown: BTreeMap<String, i32>,
    pub predictive: PredictiveScores,
    flags: ScoreFlags,
    pub last_calculated: DateTime<Utc>,
}

impl Serialize for LeadScore {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Row<'a> {
            lead_id: Uuid,
            workspace_id: Uuid,
            profile_score: i32,
            engagement_score: i32,
            behavior_score: i32,
            intent_score: i32,
            fit_score: i32,
            total_score: i32,
            breakdown: &'a BTreeMap<String, i32>,
            predictive: &'a PredictiveScores,
            is_hot: bool,
            is_qualified: bool,
            is_engaged: bool,
            requires_nurturing: bool,
            last_calculated: DateTime<Utc>,
        }

        Row {
            lead_id: self.lead_id,
            workspace_id: self.workspace_id,
            profile_score: self.scores.profile,
            engagement_score: self.scores.engagement,
            behavior_score: self.scores.behavior,
            intent_score: self.scores.intent,
            fit_score: self.scores.fit,
            total_score: self.total_score,
            breakdown: &self.breakdown,
            predictive: &self.predictive,
            is_hot: self.flags.is_hot,
            is_qualified: self.flags.is_qualified,
            is_engaged: self.flags.is_engaged,
            requires_nurturing: self.flags.requires_nurturing,
            last_calculated: self.last_calculated,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LeadScore {
    /// Flags in the input are ignored and re-derived from the scores.
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Row {
            lead_id: Uuid,
            workspace_id: Uuid,
            profile_score: i32,
            engagement_score: i32,
            behavior_score: i32,
            intent_score: i32,
            fit_score: i32,
            total_score: i32,
            #[serde(default)]
            breakdown: BTreeMap<String, i32>,
            predictive: PredictiveScores,
            last_calculated: DateTime<Utc>,
        }

        let row = Row::deserialize(deserializer)?;
        Ok(LeadScore::from_stored(
            row.lead_id,
            row.workspace_id,
            SubScores {
                profile: row.profile_score,
                engagement: row.engagement_score,
                behavior: row.behavior_score,
                intent: row.intent_score,
                fit: row.fit_score,
            },
            row.total_score,
            row.breakdown,
            row.predictive,
            row.last_calculated,
        ))
    }
}

impl LeadScore {
    /// Builds a fresh snapshot; the total is the weighted sum of the sub-scores.
    pub fn new(
        lead_id: Uuid,
        workspace_id: Uuid,
        scores: SubScores,
        breakdown: BTreeMap<String, i32>,
        predictive: PredictiveScores,
        last_calculated: DateTime<Utc>,
    ) -> Self {
        let scores = scores.clamped();
        let total = scores.weighted_total();
        Self::assemble(
            lead_id,
            workspace_id,
            scores,
            total,
            breakdown,
            predictive,
            last_calculated,
        )
    }

    /// Rehydrates a persisted snapshot, keeping its stored total.
    pub fn from_stored(
        lead_id: Uuid,
        workspace_id: Uuid,
        scores: SubScores,
        total: i32,
        breakdown: BTreeMap<String, i32>,
        predictive: PredictiveScores,
        last_calculated: DateTime<Utc>,
    ) -> Self {
        Self::assemble(
            lead_id,
            workspace_id,
            scores.clamped(),
            clamp_score(total),
            breakdown,
            predictive,
            last_calculated,
        )
    }

    fn assemble(
        lead_id: Uuid,
        workspace_id: Uuid,
        scores: SubScores,
        total_score: i32,
        breakdown: BTreeMap<String, i32>,
        predictive: PredictiveScores,
        last_calculated: DateTime<Utc>,
    ) -> Self {
        Self {
            lead_id,
            workspace_id,
            scores,
            total_score,
            breakdown,
            predictive: predictive.clamped(),
            flags: ScoreFlags::derive(total_score, scores.engagement, scores.fit),
            last_calculated,
        }
    }

    pub fn scores(&self) -> SubScores {
        self.scores
    }

    pub fn total_score(&self) -> i32 {
        self.total_score
    }

    pub fn profile_score(&self) -> i32 {
        self.scores.profile
    }

    pub fn engagement_score(&self) -> i32 {
        self.scores.engagement
    }

    pub fn behavior_score(&self) -> i32 {
        self.scores.behavior
    }

    pub fn intent_score(&self) -> i32 {
        self.scores.intent
    }

    pub fn fit_score(&self) -> i32 {
        self.scores.fit
    }

    pub fn flags(&self) -> ScoreFlags {
        self.flags
    }
}

/// Append-only record of score changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreHistoryEntry {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub score: i32,
    pub change: i32,
    pub reason: String,
}

// ============ Buying signals ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    HighIntent,
    MediumIntent,
    LowIntent,
    Negative,
}

impl SignalType {
    /// Display rank; lower is shown first.
    pub fn tier(&self) -> u8 {
        match self {
            SignalType::HighIntent => 0,
            SignalType::MediumIntent => 1,
            SignalType::LowIntent => 2,
            SignalType::Negative => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::HighIntent => "high_intent",
            SignalType::MediumIntent => "medium_intent",
            SignalType::LowIntent => "low_intent",
            SignalType::Negative => "negative",
        }
    }
}

impl FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high_intent" => Ok(SignalType::HighIntent),
            "medium_intent" => Ok(SignalType::MediumIntent),
            "low_intent" => Ok(SignalType::LowIntent),
            "negative" => Ok(SignalType::Negative),
            other => Err(format!("unknown signal type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    EmailTracking,
    Enrichment,
    Profile,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::EmailTracking => "email_tracking",
            SignalSource::Enrichment => "enrichment",
            SignalSource::Profile => "profile",
        }
    }
}

impl FromStr for SignalSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_tracking" => Ok(SignalSource::EmailTracking),
            "enrichment" => Ok(SignalSource::Enrichment),
            "profile" => Ok(SignalSource::Profile),
            other => Err(format!("unknown signal source '{}'", other)),
        }
    }
}

/// A detected qualitative buying (or negative) signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyingSignal {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub workspace_id: Uuid,
    pub signal_type: SignalType,
    pub signal_name: String,
    pub description: String,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    pub source: SignalSource,
    #[serde(default)]
    pub metadata: Value,
}

impl BuyingSignal {
    /// Persistence dedup key.
    pub fn dedup_key(&self) -> (Uuid, SignalType, &str) {
        (self.lead_id, self.signal_type, self.signal_name.as_str())
    }

    /// Merges a re-detection into this stored signal: the row id is kept,
    /// confidence and detection time take the maximum, payload takes the newer.
    pub fn merge_redetection(&mut self, newer: &BuyingSignal) {
        self.confidence = self.confidence.max(newer.confidence);
        self.detected_at = self.detected_at.max(newer.detected_at);
        self.description = newer.description.clone();
        self.metadata = newer.metadata.clone();
        self.source = newer.source;
    }
}

// ============ Insights & actions ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Positive,
    Negative,
    Warning,
    Neutral,
    Opportunity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    Score,
    Engagement,
    Profile,
    Timing,
}

/// Importance of an insight or priority of an action. Orders `High` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub category: InsightCategory,
    pub title: String,
    pub description: String,
    pub importance: Priority,
    pub actionable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Phone,
    Linkedin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTiming {
    Immediate,
    Today,
    ThisWeek,
    NextWeek,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextBestAction {
    pub id: Uuid,
    pub action: String,
    pub channel: Channel,
    pub priority: Priority,
    pub timing: ActionTiming,
    pub reason: String,
    pub expected_impact: f64,
    pub confidence: f64,
}

// ============ Prioritization ============

/// Priority tier. Orders `Critical` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PriorityTier::Critical => "critical",
            PriorityTier::High => "high",
            PriorityTier::Medium => "medium",
            PriorityTier::Low => "low",
        };
        f.write_str(label)
    }
}

/// Optional filters for the active-lead query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PrioritizeFilters {
    pub min_score: Option<i32>,
    /// Require engagement score >= 60.
    pub engagement: bool,
    /// Require intent score >= 60.
    pub intent: bool,
}

impl PrioritizeFilters {
    pub const SUB_SCORE_THRESHOLD: i32 = 60;

    pub fn matches(&self, score: &LeadScore) -> bool {
        self.min_score
            .map_or(true, |min| score.total_score() >= min)
            && (!self.engagement || score.engagement_score() >= Self::SUB_SCORE_THRESHOLD)
            && (!self.intent || score.intent_score() >= Self::SUB_SCORE_THRESHOLD)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub title: Option<String>,
    pub status: LeadStatus,
}

impl From<&Lead> for LeadSummary {
    fn from(lead: &Lead) -> Self {
        Self {
            id: lead.id,
            email: lead.email.clone(),
            name: lead.display_name(),
            company: lead.company.clone(),
            title: lead.title.clone(),
            status: lead.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizedLead {
    pub lead: LeadSummary,
    pub score: LeadScore,
    pub priority: PriorityTier,
    pub next_best_action: NextBestAction,
    pub last_activity: DateTime<Utc>,
    pub recent_replies: u32,
    pub recent_clicks: u32,
}

// ============ API request / response shapes ============

fn default_true() -> bool {
    true
}

/// Body of `POST /leads/{id}/score`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreLeadRequest {
    pub workspace_id: Option<Uuid>,
    #[serde(default)]
    pub include_history: bool,
    #[serde(default = "default_true")]
    pub include_predictive: bool,
    #[serde(default = "default_true")]
    pub include_insights: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadScoreResponse {
    pub lead_id: Uuid,
    pub total_score: i32,
    pub scores: SubScores,
    pub breakdown: BTreeMap<String, i32>,
    pub flags: ScoreFlags,
    pub last_calculated: DateTime<Utc>,
    /// Total change against the previous snapshot, if one existed.
    pub change: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictive: Option<PredictiveScores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<Vec<Insight>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_best_actions: Option<Vec<NextBestAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<ScoreHistoryEntry>>,
}

/// Body of `POST /leads/{id}/buying-signals` and query of `GET /leads/{id}/insights`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceScope {
    pub workspace_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadInsightsResponse {
    pub lead_id: Uuid,
    pub score: LeadScore,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<String>,
    pub next_best_actions: Vec<NextBestAction>,
}

/// Query of `GET /leads/prioritize`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrioritizeQuery {
    pub workspace_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub min_score: Option<i32>,
    pub filter_engagement: Option<bool>,
    pub filter_intent: Option<bool>,
}

impl PrioritizeQuery {
    pub fn filters(&self) -> PrioritizeFilters {
        PrioritizeFilters {
            min_score: self.min_score,
            engagement: self.filter_engagement.unwrap_or(false),
            intent: self.filter_intent.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizeResponse {
    pub prioritized_leads: Vec<PrioritizedLead>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescoreSummary {
    pub workspace_id: Uuid,
    pub scored: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enrichment_accepts_strings_and_numbers() {
        let enrichment = Enrichment::new(json!({
            "industry": " SaaS ",
            "company_size": "51-200",
            "funding_total": "12,500,000"
        }));
        assert_eq!(enrichment.industry().as_deref(), Some("saas"));
        assert_eq!(enrichment.company_size(), Some(51));
        assert_eq!(enrichment.funding_total(), Some(12_500_000.0));

        let numeric = Enrichment::new(json!({ "employee_count": 750, "funding_total": 5e6 }));
        assert_eq!(numeric.company_size(), Some(750));
        assert_eq!(numeric.funding_total(), Some(5_000_000.0));

        let empty = Enrichment::default();
        assert_eq!(empty.industry(), None);
        assert_eq!(empty.company_size(), None);
        assert_eq!(empty.funding_total(), None);
    }

    #[test]
    fn test_company_size_skips_thousands_separators() {
        let linkedin = Enrichment::new(json!({ "company_size": "1,001-5,000" }));
        assert_eq!(linkedin.company_size(), Some(1001));

        let underscored = Enrichment::new(json!({ "company_size": "10_000+" }));
        assert_eq!(underscored.company_size(), Some(10_000));
    }

    #[test]
    fn test_qualification_requires_total_and_fit() {
        let flags = ScoreFlags::derive(59, 90, 100);
        assert!(!flags.is_qualified());
        assert!(flags.requires_nurturing());

        let flags = ScoreFlags::derive(60, 70, 70);
        assert!(flags.is_qualified());
        assert!(flags.is_engaged());
        assert!(!flags.requires_nurturing());
        assert!(!flags.is_hot());

        assert!(ScoreFlags::derive(80, 40, 10).is_hot());
    }

    #[test]
    fn test_lead_score_clamps_on_construction() {
        let score = LeadScore::from_stored(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SubScores {
                profile: 140,
                engagement: -10,
                behavior: 50,
                intent: 50,
                fit: 101,
            },
            250,
            BTreeMap::new(),
            PredictiveScores {
                conversion_probability: 1.4,
                churn_risk: 0.0,
                estimated_deal_size: 1000.0,
                estimated_time_to_close: 30.0,
                estimated_lifetime_value: 3600.0,
            },
            Utc::now(),
        );

        assert_eq!(score.profile_score(), 100);
        assert_eq!(score.engagement_score(), 0);
        assert_eq!(score.fit_score(), 100);
        assert_eq!(score.total_score(), 100);
        assert_eq!(score.predictive.conversion_probability, 0.95);
        assert_eq!(score.predictive.churn_risk, 0.05);
    }

    #[test]
    fn test_lead_score_serializes_flat_fields() {
        let score = LeadScore::new(
            Uuid::nil(),
            Uuid::nil(),
            SubScores {
                profile: 90,
                engagement: 100,
                behavior: 50,
                intent: 50,
                fit: 90,
            },
            BTreeMap::new(),
            PredictiveScores {
                conversion_probability: 0.5,
                churn_risk: 0.2,
                estimated_deal_size: 0.0,
                estimated_time_to_close: 60.0,
                estimated_lifetime_value: 0.0,
            },
            Utc::now(),
        );
        let value = serde_json::to_value(&score).unwrap();

        assert_eq!(value["profileScore"], 90);
        assert_eq!(value["totalScore"], 75);
        assert_eq!(value["isQualified"], true);
        assert_eq!(value["isHot"], false);
        assert!(value["predictive"]["churnRisk"].is_number());
    }

    #[test]
    fn test_tier_ordering_puts_critical_first() {
        let mut tiers = vec![
            PriorityTier::Low,
            PriorityTier::Critical,
            PriorityTier::Medium,
            PriorityTier::High,
        ];
        tiers.sort();
        assert_eq!(
            tiers,
            vec![
                PriorityTier::Critical,
                PriorityTier::High,
                PriorityTier::Medium,
                PriorityTier::Low
            ]
        );
    }

    #[test]
    fn test_signal_merge_keeps_id_and_max_confidence() {
        let lead_id = Uuid::new_v4();
        let earlier = Utc::now() - chrono::Duration::days(1);
        let mut stored = BuyingSignal {
            id: Uuid::new_v4(),
            lead_id,
            workspace_id: Uuid::new_v4(),
            signal_type: SignalType::HighIntent,
            signal_name: "Demo Interest".into(),
            description: "old".into(),
            confidence: 0.95,
            detected_at: earlier,
            source: SignalSource::EmailTracking,
            metadata: json!({}),
        };
        let original_id = stored.id;
        let newer = BuyingSignal {
            id: Uuid::new_v4(),
            confidence: 0.5,
            detected_at: Utc::now(),
            description: "new".into(),
            ..stored.clone()
        };

        stored.merge_redetection(&newer);

        assert_eq!(stored.id, original_id);
        assert_eq!(stored.confidence, 0.95);
        assert_eq!(stored.detected_at, newer.detected_at);
        assert_eq!(stored.description, "new");
    }
}

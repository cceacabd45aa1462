//! Score calculator: profile, engagement, behavior, intent and fit sub-scores,
//! their weighted total, and the derived predictive estimates.
//!
//! Everything here is pure. Missing lead attributes fall back to the
//! documented defaults instead of failing.

use crate::config::{BehaviorStrategyKind, ScoringConfig};
use crate::models::{
    clamp_score, EngagementEvent, EngagementSummary, EventKind, Lead, LeadScore, PredictiveScores,
    SubScores,
};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Industries in the ideal customer profile.
pub const TARGET_INDUSTRIES: [&str; 4] = ["technology", "software", "saas", "finance"];

fn senior_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(ceo|cto|cfo|[sea]?vp|director|head)\b").expect("senior title regex")
    })
}

fn manager_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bmanager\b").expect("manager title regex"))
}

pub fn is_senior_title(title: &str) -> bool {
    senior_title_re().is_match(title)
}

/// Everything a sub-score strategy may look at.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub lead: &'a Lead,
    /// All known events for the lead, any age.
    pub events: &'a [EngagementEvent],
    pub now: DateTime<Utc>,
}

/// Pluggable source for sub-scores that have no agreed formula yet
/// (behavior and intent). Implementations return a value in [0, 100];
/// the calculator clamps anything outside.
pub trait SubScoreStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn score(&self, input: &ScoringInput<'_>) -> i32;
}

/// Constant sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedScore(pub i32);

impl SubScoreStrategy for FixedScore {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn score(&self, _input: &ScoringInput<'_>) -> i32 {
        clamp_score(self.0)
    }
}

/// Activity points decayed by age: opens 5, clicks 10, replies 20,
/// each weighted by `2^(-age_days / half_life_days)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecencyDecay {
    pub half_life_days: f64,
}

/// `base * 2^(-age_days / half_life_days)`; non-positive half-life or
/// future events keep the full weight.
pub fn decayed_weight(base_weight: f64, age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 || age_days < 0.0 {
        return base_weight;
    }
    base_weight * (2.0_f64).powf(-age_days / half_life_days)
}

impl SubScoreStrategy for RecencyDecay {
    fn name(&self) -> &'static str {
        "recency"
    }

    fn score(&self, input: &ScoringInput<'_>) -> i32 {
        let points: f64 = input
            .events
            .iter()
            .filter_map(|event| {
                let base = match event.kind {
                    EventKind::Opened => 5.0,
                    EventKind::Clicked => 10.0,
                    EventKind::Replied => 20.0,
                    _ => return None,
                };
                let age_days = (input.now - event.occurred_at).num_seconds() as f64 / 86_400.0;
                Some(decayed_weight(base, age_days, self.half_life_days))
            })
            .sum();
        clamp_score(points.round() as i32)
    }
}

/// Profile completeness and seniority.
pub fn profile_score(lead: &Lead) -> i32 {
    let mut score = 50;

    match lead.title() {
        Some(title) if is_senior_title(title) => score += 20,
        Some(title) if manager_title_re().is_match(title) => score += 15,
        Some(_) => score += 10,
        None => {}
    }
    if lead.has_company() {
        score += 10;
    }
    if lead.has_phone() {
        score += 5;
    }
    if lead.has_social_url() {
        score += 5;
    }

    clamp_score(score)
}

/// Capped contributions from opens, clicks and replies in the window.
pub fn engagement_score(summary: &EngagementSummary) -> i32 {
    let opens = (summary.opens as i64 * 5).min(30);
    let clicks = (summary.clicks as i64 * 10).min(40);
    let replies = (summary.replies as i64 * 20).min(30);
    clamp_score((opens + clicks + replies) as i32)
}

/// Ideal-customer-profile fit from enrichment.
pub fn fit_score(lead: &Lead) -> i32 {
    let mut score = 50;

    if lead
        .enrichment
        .industry()
        .is_some_and(|industry| TARGET_INDUSTRIES.contains(&industry.as_str()))
    {
        score += 20;
    }
    match lead.enrichment.company_size() {
        Some(size) if (50..=500).contains(&size) => score += 20,
        Some(size) if size > 500 => score += 15,
        _ => {}
    }

    clamp_score(score)
}

pub fn social_score(lead: &Lead) -> i32 {
    let mut score = 0;
    if lead.has_social_url() {
        score += 50;
    }
    if lead.has_secondary_social() {
        score += 25;
    }
    clamp_score(score)
}

/// Base deal size tier by company size.
pub fn base_deal_size(company_size: Option<u64>) -> f64 {
    match company_size.unwrap_or(0) {
        size if size > 1000 => 100_000.0,
        size if size > 500 => 50_000.0,
        size if size > 100 => 25_000.0,
        _ => 10_000.0,
    }
}

const LIFETIME_YEARS: f64 = 3.0;
const EXPANSION_FACTOR: f64 = 1.2;

pub fn predictive_scores(
    scores: &SubScores,
    total: i32,
    company_size: Option<u64>,
) -> PredictiveScores {
    let total = total as f64;
    let engagement = scores.engagement as f64;
    let behavior = scores.behavior as f64;
    let intent = scores.intent as f64;
    let fit = scores.fit as f64;

    let conversion_probability = ((total * 0.3 + engagement * 0.4 + intent * 0.3) / 100.0 * 1.2)
        .min(PredictiveScores::MAX_CONVERSION_PROBABILITY);
    let churn_risk =
        ((1.0 - (engagement + behavior) / 200.0) * 0.8).max(PredictiveScores::MIN_CHURN_RISK);
    let estimated_deal_size = base_deal_size(company_size) * (fit / 100.0);
    let estimated_time_to_close = 90.0 - ((total + intent) / 200.0) * 60.0;
    let estimated_lifetime_value = estimated_deal_size * LIFETIME_YEARS * EXPANSION_FACTOR;

    PredictiveScores {
        conversion_probability,
        churn_risk,
        estimated_deal_size,
        estimated_time_to_close,
        estimated_lifetime_value,
    }
    .clamped()
}

/// Stateless calculator; the strategies are shared across requests.
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    behavior: Arc<dyn SubScoreStrategy>,
    intent: Arc<dyn SubScoreStrategy>,
    engagement_window: Duration,
}

impl ScoreCalculator {
    pub fn new(behavior: Arc<dyn SubScoreStrategy>, intent: Arc<dyn SubScoreStrategy>) -> Self {
        Self {
            behavior,
            intent,
            engagement_window: Duration::days(30),
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        let behavior: Arc<dyn SubScoreStrategy> = match config.behavior_strategy {
            BehaviorStrategyKind::Fixed => Arc::new(FixedScore(config.behavior_score_default)),
            BehaviorStrategyKind::Recency => Arc::new(RecencyDecay {
                half_life_days: config.recency_half_life_days,
            }),
        };
        let intent = Arc::new(FixedScore(config.intent_score_default));

        Self {
            behavior,
            intent,
            engagement_window: Duration::days(config.engagement_window_days),
        }
    }

    pub fn strategy_names(&self) -> (&'static str, &'static str) {
        (self.behavior.name(), self.intent.name())
    }

    /// Computes a full snapshot for `lead` from its events as of `now`.
    pub fn calculate(&self, lead: &Lead, events: &[EngagementEvent], now: DateTime<Utc>) -> LeadScore {
        let input = ScoringInput { lead, events, now };
        let window = EngagementSummary::within(events, now - self.engagement_window, now);

        let scores = SubScores {
            profile: profile_score(lead),
            engagement: engagement_score(&window),
            behavior: self.behavior.score(&input),
            intent: self.intent.score(&input),
            fit: fit_score(lead),
        }
        .clamped();
        let total = scores.weighted_total();

        let mut breakdown = BTreeMap::new();
        breakdown.insert("profile".to_string(), scores.profile);
        breakdown.insert("engagement".to_string(), scores.engagement);
        breakdown.insert("behavior".to_string(), scores.behavior);
        breakdown.insert("intent".to_string(), scores.intent);
        breakdown.insert("fit".to_string(), scores.fit);
        // demographic and firmographic alias profile and fit
        breakdown.insert("demographic".to_string(), scores.profile);
        breakdown.insert("firmographic".to_string(), scores.fit);
        breakdown.insert("social".to_string(), social_score(lead));

        let predictive = predictive_scores(&scores, total, lead.enrichment.company_size());

        tracing::debug!(
            "Scored lead {}: total={} profile={} engagement={} behavior={} intent={} fit={}",
            lead.id,
            total,
            scores.profile,
            scores.engagement,
            scores.behavior,
            scores.intent,
            scores.fit
        );

        LeadScore::new(lead.id, lead.workspace_id, scores, breakdown, predictive, now)
    }
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

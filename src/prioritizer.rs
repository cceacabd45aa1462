//! Ranks scored leads into priority tiers for the daily work queue.

use crate::insights::next_best_action;
use crate::models::{
    EngagementEvent, EngagementSummary, Lead, LeadScore, LeadSummary, PrioritizedLead,
    PriorityTier,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Look-back for the reply/click upgrade rule.
pub const RECENT_ACTIVITY_DAYS: i64 = 7;
/// Clicks within the look-back that lift a low-tier lead.
pub const RECENT_CLICK_UPGRADE: u32 = 3;

pub fn assign_tier(total: i32) -> PriorityTier {
    match total {
        t if t >= 90 => PriorityTier::Critical,
        t if t >= 80 => PriorityTier::High,
        t if t >= 60 => PriorityTier::Medium,
        _ => PriorityTier::Low,
    }
}

/// Lifts `Low` to `Medium` on recent conversation or repeated clicks.
/// Other tiers are never changed.
pub fn upgrade_tier(tier: PriorityTier, recent: &EngagementSummary) -> PriorityTier {
    if tier == PriorityTier::Low
        && (recent.replies > 0 || recent.clicks >= RECENT_CLICK_UPGRADE)
    {
        PriorityTier::Medium
    } else {
        tier
    }
}

/// Builds the ranked list. `candidates` must already satisfy the caller's
/// filters; `events` holds every known event keyed by lead id.
///
/// Ordering is tier first, then total descending, stable on input order for
/// ties. The limit is applied after the full set is sorted.
pub fn prioritize(
    candidates: Vec<(Lead, LeadScore)>,
    events: &HashMap<Uuid, Vec<EngagementEvent>>,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<PrioritizedLead> {
    let since = now - Duration::days(RECENT_ACTIVITY_DAYS);
    let empty = Vec::new();

    let mut ranked: Vec<PrioritizedLead> = candidates
        .into_iter()
        .map(|(lead, score)| {
            let lead_events = events.get(&lead.id).unwrap_or(&empty);
            let recent = EngagementSummary::within(lead_events, since, now);
            let last_activity = lead_events
                .iter()
                .map(|e| e.occurred_at)
                .max()
                .unwrap_or(lead.created_at);
            let priority = upgrade_tier(assign_tier(score.total_score()), &recent);

            PrioritizedLead {
                lead: LeadSummary::from(&lead),
                next_best_action: next_best_action(&score),
                score,
                priority,
                last_activity,
                recent_replies: recent.replies,
                recent_clicks: recent.clicks,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.score.total_score().cmp(&a.score.total_score()))
    });
    ranked.truncate(limit);
    ranked
}

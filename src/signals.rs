//! Buying-signal detection over a lead's engagement history and enrichment.
//!
//! Every rule is independent and may fire alongside the others. Windows are
//! anchored on the injected `now`: the current window is the trailing 14 days,
//! the previous window the 14 days before that. Bounces and unsubscribes count
//! regardless of age.

use crate::models::{BuyingSignal, EngagementEvent, EventKind, Lead, SignalSource, SignalType};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;
use uuid::Uuid;

pub const WINDOW_DAYS: i64 = 14;
pub const FUNDING_THRESHOLD: f64 = 10_000_000.0;

const PRICING_KEYWORDS: [&str; 2] = ["pricing", "plans"];
const CONTENT_KEYWORDS: [&str; 4] = ["download", "whitepaper", "ebook", "guide"];
const DEMO_KEYWORDS: [&str; 3] = ["demo", "trial", "get-started"];

fn decision_maker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(director|[sea]?vp|head|chief|president|ceo|cto|cfo)\b")
            .expect("decision maker regex")
    })
}

pub fn is_decision_maker(title: &str) -> bool {
    decision_maker_re().is_match(title)
}

fn url_contains_any(event: &EngagementEvent, keywords: &[&str]) -> bool {
    event.url().is_some_and(|url| {
        let url = url.to_lowercase();
        keywords.iter().any(|keyword| url.contains(keyword))
    })
}

/// Pending signal before ids and timestamps are stamped on.
struct Detection {
    signal_type: SignalType,
    name: &'static str,
    description: String,
    confidence: f64,
    source: SignalSource,
    metadata: Value,
}

/// Runs every detection rule for `lead` and returns the signals ranked:
/// intent tier first (high, medium, low, negative), then descending
/// confidence. The sort is stable so equal signals keep rule order.
pub fn detect_signals(
    lead: &Lead,
    events: &[EngagementEvent],
    now: DateTime<Utc>,
) -> Vec<BuyingSignal> {
    let window = Duration::days(WINDOW_DAYS);
    let current_start = now - window;
    let previous_start = current_start - window;

    let current: Vec<&EngagementEvent> = events
        .iter()
        .filter(|e| e.occurred_at >= current_start && e.occurred_at <= now)
        .collect();
    let previous_opens = events
        .iter()
        .filter(|e| {
            e.kind == EventKind::Opened
                && e.occurred_at >= previous_start
                && e.occurred_at < current_start
        })
        .count();

    let clicks: Vec<&EngagementEvent> = current
        .iter()
        .copied()
        .filter(|e| e.kind == EventKind::Clicked)
        .collect();
    let current_opens = current
        .iter()
        .filter(|e| e.kind == EventKind::Opened)
        .count();
    let replies: Vec<&EngagementEvent> = current
        .iter()
        .copied()
        .filter(|e| e.kind == EventKind::Replied)
        .collect();

    let mut detections = Vec::new();

    if clicks.len() >= 5 {
        detections.push(Detection {
            signal_type: SignalType::HighIntent,
            name: "High Email Engagement",
            description: format!(
                "Clicked {} email links in the last {} days",
                clicks.len(),
                WINDOW_DAYS
            ),
            confidence: 0.85,
            source: SignalSource::EmailTracking,
            metadata: json!({ "click_count": clicks.len() }),
        });
    }

    let pricing_urls: Vec<&str> = clicks
        .iter()
        .copied()
        .filter(|e| url_contains_any(e, &PRICING_KEYWORDS))
        .filter_map(|e| e.url())
        .collect();
    if !pricing_urls.is_empty() {
        detections.push(Detection {
            signal_type: SignalType::HighIntent,
            name: "Pricing Interest",
            description: "Viewed pricing or plans page".to_string(),
            confidence: 0.90,
            source: SignalSource::EmailTracking,
            metadata: json!({ "urls": pricing_urls }),
        });
    }

    if !replies.is_empty() {
        let message_ids: Vec<&str> = replies.iter().filter_map(|e| e.message_id()).collect();
        detections.push(Detection {
            signal_type: SignalType::MediumIntent,
            name: "Email Reply",
            description: format!("Replied to {} email(s)", replies.len()),
            confidence: 0.80,
            source: SignalSource::EmailTracking,
            metadata: json!({ "reply_count": replies.len(), "message_ids": message_ids }),
        });
    }

    if current_opens >= 3 && current_opens > previous_opens * 2 {
        detections.push(Detection {
            signal_type: SignalType::MediumIntent,
            name: "Engagement Surge",
            description: format!(
                "Opens rose to {} from {} in the previous {} days",
                current_opens, previous_opens, WINDOW_DAYS
            ),
            confidence: 0.70,
            source: SignalSource::EmailTracking,
            metadata: json!({
                "current_opens": current_opens,
                "previous_opens": previous_opens,
            }),
        });
    }

    let content_clicks = clicks
        .iter()
        .filter(|e| url_contains_any(e, &CONTENT_KEYWORDS))
        .count();
    if content_clicks >= 2 {
        detections.push(Detection {
            signal_type: SignalType::MediumIntent,
            name: "Content Consumer",
            description: format!("Downloaded or viewed {} content assets", content_clicks),
            confidence: 0.65,
            source: SignalSource::EmailTracking,
            metadata: json!({ "content_clicks": content_clicks }),
        });
    }

    let demo_urls: Vec<&str> = clicks
        .iter()
        .copied()
        .filter(|e| url_contains_any(e, &DEMO_KEYWORDS))
        .filter_map(|e| e.url())
        .collect();
    if !demo_urls.is_empty() {
        detections.push(Detection {
            signal_type: SignalType::HighIntent,
            name: "Demo Interest",
            description: "Clicked a demo, trial or get-started link".to_string(),
            confidence: 0.95,
            source: SignalSource::EmailTracking,
            metadata: json!({ "urls": demo_urls }),
        });
    }

    if let Some(funding) = lead
        .enrichment
        .funding_total()
        .filter(|f| *f > FUNDING_THRESHOLD)
    {
        detections.push(Detection {
            signal_type: SignalType::MediumIntent,
            name: "Well-Funded Company",
            description: format!("Company has raised ${:.0}", funding),
            confidence: 0.60,
            source: SignalSource::Enrichment,
            metadata: json!({ "funding_total": funding }),
        });
    }

    if let Some(title) = lead.title().filter(|t| is_decision_maker(t)) {
        detections.push(Detection {
            signal_type: SignalType::MediumIntent,
            name: "Decision Maker",
            description: format!("Title '{}' indicates buying authority", title),
            confidence: 0.70,
            source: SignalSource::Profile,
            metadata: json!({ "title": title }),
        });
    }

    let bounces = events
        .iter()
        .filter(|e| e.kind == EventKind::Bounced)
        .count();
    if bounces > 0 {
        detections.push(Detection {
            signal_type: SignalType::Negative,
            name: "Email Bounced",
            description: "Email address bounced; deliverability at risk".to_string(),
            confidence: 0.90,
            source: SignalSource::EmailTracking,
            metadata: json!({ "bounce_count": bounces }),
        });
    }

    let unsubscribes = events
        .iter()
        .filter(|e| e.kind == EventKind::Unsubscribed)
        .count();
    if unsubscribes > 0 {
        detections.push(Detection {
            signal_type: SignalType::Negative,
            name: "Unsubscribed",
            description: "Lead unsubscribed from email".to_string(),
            confidence: 1.00,
            source: SignalSource::EmailTracking,
            metadata: json!({ "unsubscribe_count": unsubscribes }),
        });
    }

    let mut signals: Vec<BuyingSignal> = detections
        .into_iter()
        .map(|d| BuyingSignal {
            id: Uuid::new_v4(),
            lead_id: lead.id,
            workspace_id: lead.workspace_id,
            signal_type: d.signal_type,
            signal_name: d.name.to_string(),
            description: d.description,
            confidence: d.confidence,
            detected_at: now,
            source: d.source,
            metadata: d.metadata,
        })
        .collect();

    rank_signals(&mut signals);

    tracing::debug!("Detected {} signals for lead {}", signals.len(), lead.id);

    signals
}

/// Stable sort by tier ascending, then confidence descending.
pub fn rank_signals(signals: &mut [BuyingSignal]) {
    signals.sort_by(|a, b| {
        a.signal_type
            .tier()
            .cmp(&b.signal_type.tier())
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Enrichment, LeadStatus};

    fn lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            email: "sam@example.com".to_string(),
            first_name: Some("Sam".to_string()),
            last_name: None,
            company: Some("Example".to_string()),
            title: None,
            phone: None,
            linkedin_url: None,
            twitter_handle: None,
            enrichment: Enrichment::default(),
            status: LeadStatus::Active,
            created_at: Utc::now() - Duration::days(60),
        }
    }

    fn event(lead: &Lead, kind: EventKind, age: Duration, now: DateTime<Utc>, url: Option<&str>) -> EngagementEvent {
        EngagementEvent {
            id: Uuid::new_v4(),
            lead_id: lead.id,
            kind,
            occurred_at: now - age,
            metadata: url.map(|u| json!({ "url": u })).unwrap_or_else(|| json!({})),
        }
    }

    fn names(signals: &[BuyingSignal]) -> Vec<&str> {
        signals.iter().map(|s| s.signal_name.as_str()).collect()
    }

    #[test]
    fn test_no_events_no_signals() {
        assert!(detect_signals(&lead(), &[], Utc::now()).is_empty());
    }

    #[test]
    fn test_demo_interest() {
        let now = Utc::now();
        let l = lead();
        let events = vec![event(&l, EventKind::Clicked, Duration::days(2), now, Some("https://site.com/demo"))];

        let signals = detect_signals(&l, &events, now);

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::HighIntent);
        assert_eq!(signals[0].signal_name, "Demo Interest");
        assert_eq!(signals[0].confidence, 0.95);
    }

    #[test]
    fn test_old_clicks_outside_window_ignored() {
        let now = Utc::now();
        let l = lead();
        let events = vec![event(&l, EventKind::Clicked, Duration::days(20), now, Some("https://site.com/pricing"))];
        assert!(detect_signals(&l, &events, now).is_empty());
    }

    #[test]
    fn test_pricing_and_high_engagement() {
        let now = Utc::now();
        let l = lead();
        let mut events: Vec<_> = (0..4)
            .map(|i| event(&l, EventKind::Clicked, Duration::hours(i + 1), now, Some("https://site.com/blog")))
            .collect();
        events.push(event(&l, EventKind::Clicked, Duration::hours(10), now, Some("https://site.com/PLANS")));

        let signals = detect_signals(&l, &events, now);

        assert_eq!(names(&signals), vec!["Pricing Interest", "High Email Engagement"]);
    }

    #[test]
    fn test_engagement_surge_requires_doubling_and_minimum() {
        let now = Utc::now();
        let l = lead();
        let mut events: Vec<_> = (0..3)
            .map(|i| event(&l, EventKind::Opened, Duration::days(i + 1), now, None))
            .collect();
        events.push(event(&l, EventKind::Opened, Duration::days(20), now, None));

        assert_eq!(names(&detect_signals(&l, &events, now)), vec!["Engagement Surge"]);

        // 3 current vs 2 previous is not a doubling
        events.push(event(&l, EventKind::Opened, Duration::days(21), now, None));
        assert!(detect_signals(&l, &events, now).is_empty());
    }

    #[test]
    fn test_content_consumer_needs_two_assets() {
        let now = Utc::now();
        let l = lead();
        let mut events = vec![event(&l, EventKind::Clicked, Duration::days(1), now, Some("https://x.io/ebook"))];
        assert!(detect_signals(&l, &events, now).is_empty());

        events.push(event(&l, EventKind::Clicked, Duration::days(3), now, Some("https://x.io/guide/setup")));
        assert_eq!(names(&detect_signals(&l, &events, now)), vec!["Content Consumer"]);
    }

    #[test]
    fn test_profile_and_enrichment_signals() {
        let now = Utc::now();
        let mut l = lead();
        l.title = Some("Chief Revenue Officer".to_string());
        l.enrichment = Enrichment::new(json!({ "funding_total": 25_000_000 }));

        let signals = detect_signals(&l, &[], now);

        assert_eq!(names(&signals), vec!["Decision Maker", "Well-Funded Company"]);
        assert_eq!(signals[1].source, SignalSource::Enrichment);
    }

    #[test]
    fn test_prefixed_vp_titles_are_decision_makers() {
        for title in ["SVP of Sales", "EVP Engineering", "AVP, Finance", "vp marketing"] {
            assert!(is_decision_maker(title), "{}", title);
        }
        assert!(!is_decision_maker("MVP Program Lead"));

        let mut l = lead();
        l.title = Some("SVP of Sales".to_string());
        assert_eq!(names(&detect_signals(&l, &[], Utc::now())), vec!["Decision Maker"]);
    }

    #[test]
    fn test_funding_at_threshold_not_signal() {
        let mut l = lead();
        l.enrichment = Enrichment::new(json!({ "funding_total": 10_000_000 }));
        assert!(detect_signals(&l, &[], Utc::now()).is_empty());
    }

    #[test]
    fn test_negative_signals_any_age_and_ranked_last() {
        let now = Utc::now();
        let l = lead();
        let events = vec![
            event(&l, EventKind::Unsubscribed, Duration::days(200), now, None),
            event(&l, EventKind::Bounced, Duration::days(90), now, None),
            event(&l, EventKind::Replied, Duration::days(1), now, None),
        ];

        let signals = detect_signals(&l, &events, now);

        assert_eq!(names(&signals), vec!["Email Reply", "Unsubscribed", "Email Bounced"]);
        assert_eq!(signals[2].signal_type, SignalType::Negative);
    }

    #[test]
    fn test_rank_negative_last_regardless_of_confidence() {
        let now = Utc::now();
        let l = lead();
        let base = BuyingSignal {
            id: Uuid::new_v4(),
            lead_id: l.id,
            workspace_id: l.workspace_id,
            signal_type: SignalType::Negative,
            signal_name: "Email Bounced".to_string(),
            description: String::new(),
            confidence: 0.5,
            detected_at: now,
            source: SignalSource::EmailTracking,
            metadata: json!({}),
        };
        let high = BuyingSignal {
            signal_type: SignalType::HighIntent,
            signal_name: "Pricing Interest".to_string(),
            confidence: 0.7,
            ..base.clone()
        };
        let mut signals = vec![base, high];

        rank_signals(&mut signals);

        assert_eq!(signals[0].signal_type, SignalType::HighIntent);
        assert_eq!(signals[1].signal_type, SignalType::Negative);
    }
}

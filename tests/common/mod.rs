//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use chrono::{Duration, Utc};
use lead_intent_api::config::Config;
use lead_intent_api::memory_store::InMemoryDatastore;
use lead_intent_api::models::{EngagementEvent, Enrichment, EventKind, Lead, LeadStatus};
use lead_intent_api::service::LeadIntentService;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const MEMBER: &str = "user-1";

pub fn test_config() -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        ..Config::default()
    }
}

pub fn lead(workspace_id: Uuid) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        workspace_id,
        email: "jordan@acme.io".to_string(),
        first_name: Some("Jordan".to_string()),
        last_name: Some("Lee".to_string()),
        company: Some("Acme".to_string()),
        title: Some("VP of Sales".to_string()),
        phone: Some("+15550100".to_string()),
        linkedin_url: Some("https://linkedin.com/in/jordan".to_string()),
        twitter_handle: None,
        enrichment: Enrichment::new(json!({ "industry": "saas", "company_size": "300" })),
        status: LeadStatus::Active,
        created_at: Utc::now() - Duration::days(10),
    }
}

pub fn event(lead_id: Uuid, kind: EventKind, days_ago: i64, metadata: Value) -> EngagementEvent {
    EngagementEvent {
        id: Uuid::new_v4(),
        lead_id,
        kind,
        occurred_at: Utc::now() - Duration::days(days_ago) - Duration::minutes(5),
        metadata,
    }
}

/// 10 opens, 6 clicks and 2 replies within the last 30 days.
pub fn engaged_events(lead_id: Uuid) -> Vec<EngagementEvent> {
    let mut events = Vec::new();
    for i in 0..10 {
        events.push(event(lead_id, EventKind::Opened, i % 20, json!({})));
    }
    for i in 0..6 {
        events.push(event(lead_id, EventKind::Clicked, 20 + i, json!({})));
    }
    events.push(event(lead_id, EventKind::Replied, 21, json!({})));
    events.push(event(lead_id, EventKind::Replied, 22, json!({})));
    events
}

pub struct Harness {
    pub store: Arc<InMemoryDatastore>,
    pub service: LeadIntentService,
    pub workspace_id: Uuid,
}

pub async fn harness_with(config: Config) -> Harness {
    let store = Arc::new(InMemoryDatastore::new());
    let workspace_id = Uuid::new_v4();
    store.add_member(workspace_id, MEMBER).await;
    let service = LeadIntentService::new(store.clone(), &config);
    Harness {
        store,
        service,
        workspace_id,
    }
}

pub async fn harness() -> Harness {
    harness_with(test_config()).await
}

use chrono::Utc;
use std::env;
use uuid::Uuid;

use lead_intent_api::config::Config;
use lead_intent_api::datastore::LeadDatastore;
use lead_intent_api::db::Database;
use lead_intent_api::db_storage::PgDatastore;
use lead_intent_api::models::{BuyingSignal, SignalSource, SignalType};

/// Smoke test for the Postgres datastore against an existing schema.
/// Marked ignored to avoid touching a real database by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn signal_upsert_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;

    let config = Config {
        database_url: db_url,
        ..Config::default()
    };
    let db = Database::new(&config).await?;
    let store = PgDatastore::new(db.pool.clone());

    let workspace_id = Uuid::new_v4();
    let lead_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO leads (id, workspace_id, email, status, created_at) VALUES ($1, $2, $3, 'active', now())",
    )
    .bind(lead_id)
    .bind(workspace_id)
    .bind(format!("smoke-{}@test.dev", lead_id))
    .execute(&db.pool)
    .await?;

    let signal = BuyingSignal {
        id: Uuid::new_v4(),
        lead_id,
        workspace_id,
        signal_type: SignalType::HighIntent,
        signal_name: "Demo Interest".to_string(),
        description: "first".to_string(),
        confidence: 0.95,
        detected_at: Utc::now(),
        source: SignalSource::EmailTracking,
        metadata: serde_json::json!({}),
    };
    let first = store
        .upsert_buying_signals(workspace_id, &[signal.clone()])
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let redetected = BuyingSignal {
        id: Uuid::new_v4(),
        confidence: 0.5,
        description: "second".to_string(),
        ..signal
    };
    let second = store
        .upsert_buying_signals(workspace_id, &[redetected])
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    assert_eq!(first[0].id, second[0].id);
    assert_eq!(second[0].confidence, 0.95);
    assert_eq!(second[0].description, "second");

    let lead = store
        .get_lead(workspace_id, lead_id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(lead.is_some());

    sqlx::query("DELETE FROM buying_signals WHERE lead_id = $1")
        .bind(lead_id)
        .execute(&db.pool)
        .await?;
    sqlx::query("DELETE FROM leads WHERE id = $1")
        .bind(lead_id)
        .execute(&db.pool)
        .await?;

    Ok(())
}

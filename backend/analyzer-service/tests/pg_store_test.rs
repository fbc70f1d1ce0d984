// Integration tests for the Postgres recommendation store
//
// Requires a running Postgres; set DATABASE_URL and run with `--ignored`.

use analyzer_service::repository::{PgRecommendationStore, RecommendationStore, ScoredEvent};
use chrono::{TimeZone, Utc};
use event_schema::{ActionEvent, ActionType, EventSimilarity};
use sqlx::postgres::PgPoolOptions;

async fn store() -> PgRecommendationStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    sqlx::query("TRUNCATE actions, event_similarity")
        .execute(&pool)
        .await
        .expect("Failed to reset tables");

    PgRecommendationStore::new(pool)
}

fn action_at(user: i64, event: i64, kind: ActionType, secs: i64) -> ActionEvent {
    let mut action = ActionEvent::new(user, event, kind);
    action.timestamp = Utc.timestamp_opt(secs, 0).unwrap();
    action
}

#[tokio::test]
#[ignore] // Needs Postgres
async fn test_similarity_upsert_and_lookup() {
    let store = store().await;
    let now = Utc::now();

    store
        .upsert_similarity(&EventSimilarity::new(10, 11, 0.632, now))
        .await
        .unwrap();
    store
        .upsert_similarity(&EventSimilarity::new(11, 10, 0.894, now))
        .await
        .unwrap();
    store
        .upsert_similarity(&EventSimilarity::new(12, 10, 0.5, now))
        .await
        .unwrap();
    store
        .append_action(&ActionEvent::new(1, 12, ActionType::View))
        .await
        .unwrap();

    let similar = store.similar_events(1, 10, 5).await.unwrap();
    assert_eq!(similar, vec![ScoredEvent::new(11, 0.894)]);

    let similar = store.similar_events(2, 10, 5).await.unwrap();
    assert_eq!(
        similar,
        vec![ScoredEvent::new(11, 0.894), ScoredEvent::new(12, 0.5)]
    );
}

#[tokio::test]
#[ignore] // Needs Postgres
async fn test_recent_events_and_actions() {
    let store = store().await;

    store.append_action(&action_at(1, 10, ActionType::View, 100)).await.unwrap();
    store.append_action(&action_at(1, 20, ActionType::Like, 200)).await.unwrap();
    store.append_action(&action_at(1, 10, ActionType::Register, 300)).await.unwrap();
    store.append_action(&action_at(2, 20, ActionType::View, 400)).await.unwrap();

    assert_eq!(store.recent_event_ids(1, 20).await.unwrap(), vec![10, 20]);
    assert_eq!(store.recent_event_ids(1, 1).await.unwrap(), vec![10]);

    let actions = store.actions_for_events(&[20]).await.unwrap();
    assert_eq!(actions.len(), 2);
    assert!(actions.iter().any(|a| a.user_id == 1 && a.action_type == ActionType::Like));

    assert!(store.actions_for_events(&[]).await.unwrap().is_empty());
}

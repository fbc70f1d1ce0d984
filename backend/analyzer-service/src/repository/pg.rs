use super::{RecommendationStore, ScoredEvent, StoredAction};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_schema::{ActionEvent, ActionType, EventSimilarity};
use sqlx::PgPool;
use tracing::debug;

#[derive(Debug, sqlx::FromRow)]
struct ActionRow {
    user_id: i64,
    event_id: i64,
    action_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActionRow> for StoredAction {
    type Error = AppError;

    fn try_from(row: ActionRow) -> Result<Self> {
        let action_type: ActionType = row.action_type.parse()?;
        Ok(StoredAction {
            user_id: row.user_id,
            event_id: row.event_id,
            action_type,
            created_at: row.created_at,
        })
    }
}

/// Postgres-backed store over the `actions` and `event_similarity` tables
#[derive(Clone)]
pub struct PgRecommendationStore {
    pool: PgPool,
}

impl PgRecommendationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecommendationStore for PgRecommendationStore {
    async fn append_action(&self, action: &ActionEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO actions (user_id, event_id, action_type, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(action.user_id)
        .bind(action.event_id)
        .bind(action.action_type.as_str())
        .bind(action.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_similarity(&self, record: &EventSimilarity) -> Result<()> {
        if record.event_a == record.event_b {
            return Err(AppError::Validation(format!(
                "event {} cannot be paired with itself",
                record.event_a
            )));
        }
        let record = record.clone().canonicalized();

        sqlx::query(
            r#"
            INSERT INTO event_similarity (event_a, event_b, score, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_a, event_b) DO UPDATE
            SET score = EXCLUDED.score,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.event_a)
        .bind(record.event_b)
        .bind(record.score)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;

        debug!(
            event_a = record.event_a,
            event_b = record.event_b,
            score = record.score,
            "Upserted similarity"
        );
        Ok(())
    }

    async fn recent_event_ids(&self, user_id: i64, limit: usize) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT event_id
            FROM actions
            WHERE user_id = $1
            GROUP BY event_id
            ORDER BY MAX(created_at) DESC, event_id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn similar_events(
        &self,
        user_id: i64,
        event_id: i64,
        limit: usize,
    ) -> Result<Vec<ScoredEvent>> {
        let candidates = sqlx::query_as::<_, ScoredEvent>(
            r#"
            SELECT c.event_id, c.score
            FROM (
                SELECT CASE WHEN s.event_a = $2 THEN s.event_b ELSE s.event_a END AS event_id,
                       s.score
                FROM event_similarity s
                WHERE s.event_a = $2 OR s.event_b = $2
            ) c
            WHERE NOT EXISTS (
                SELECT 1 FROM actions a
                WHERE a.user_id = $1 AND a.event_id = c.event_id
            )
            ORDER BY c.score DESC, c.event_id ASC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(event_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(candidates)
    }

    async fn actions_for_events(&self, event_ids: &[i64]) -> Result<Vec<StoredAction>> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT user_id, event_id, action_type, created_at
            FROM actions
            WHERE event_id = ANY($1)
            "#,
        )
        .bind(event_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredAction::try_from).collect()
    }
}

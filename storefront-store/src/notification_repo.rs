use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use storefront_core::{CoreError, CoreResult, NotificationRepository};
use storefront_shared::{NotificationEvent, NotificationType};
use uuid::Uuid;

use crate::database::storage;

pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    kind: String,
    message: String,
    recipient: String,
    reference_id: i64,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for NotificationEvent {
    type Error = CoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = NotificationType::parse(&row.kind)
            .ok_or_else(|| CoreError::Storage(format!("unknown notification type {}", row.kind)))?;
        Ok(NotificationEvent {
            id: row.id,
            kind,
            message: row.message,
            recipient: row.recipient,
            reference_id: row.reference_id,
            created_at: row.created_at,
            read: row.is_read,
        })
    }
}

const COLUMNS: &str = "id, type, message, recipient, reference_id, is_read, created_at";

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert_if_absent(&self, event: &NotificationEvent) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (id, type, message, recipient, reference_id, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(event.kind.as_str())
        .bind(&event.message)
        .bind(&event.recipient)
        .bind(event.reference_id)
        .bind(event.read)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, id: Uuid) -> CoreResult<Option<NotificationEvent>> {
        let row: Option<NotificationRow> =
            sqlx::query_as(&format!("SELECT {} FROM notifications WHERE id = $1", COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        row.map(NotificationEvent::try_from).transpose()
    }

    async fn is_delivered(&self, id: Uuid) -> CoreResult<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT delivered_at IS NOT NULL FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        Ok(row.map(|(delivered,)| delivered).unwrap_or(false))
    }

    async fn mark_delivered(&self, id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("UPDATE notifications SET delivered_at = COALESCE(delivered_at, NOW()) WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("notification {}", id)));
        }
        Ok(())
    }

    async fn list_for(&self, recipient: &str) -> CoreResult<Vec<NotificationEvent>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE recipient = $1 ORDER BY created_at DESC",
            COLUMNS
        ))
        .bind(recipient)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter().map(NotificationEvent::try_from).collect()
    }

    async fn unread_count_for(&self, recipient: &str) -> CoreResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE recipient = $1 AND NOT is_read")
                .bind(recipient)
                .fetch_one(&self.pool)
                .await
                .map_err(storage)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn mark_read(&self, id: Uuid) -> CoreResult<bool> {
        let (flipped, exists): (bool, bool) = sqlx::query_as(
            r#"
            WITH flipped AS (
                UPDATE notifications SET is_read = TRUE WHERE id = $1 AND NOT is_read RETURNING id
            )
            SELECT EXISTS (SELECT 1 FROM flipped),
                   EXISTS (SELECT 1 FROM notifications WHERE id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        if !exists {
            return Err(CoreError::NotFound(format!("notification {}", id)));
        }
        Ok(flipped)
    }

    async fn mark_all_read(&self, recipient: &str) -> CoreResult<u64> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE recipient = $1 AND NOT is_read")
            .bind(recipient)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected())
    }
}

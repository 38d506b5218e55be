//! Notification channel rows and their monitor assignments.

use sqlx::SqlitePool;

use crate::db::models::NotificationChannel;

pub async fn list_for_monitor(
    pool: &SqlitePool,
    monitor_id: i64,
) -> Result<Vec<NotificationChannel>, sqlx::Error> {
    sqlx::query_as::<_, NotificationChannel>(
        r#"
        SELECT n.* FROM notification n
        JOIN monitor_notification mn ON mn.notification_id = n.id
        WHERE mn.monitor_id = ? AND n.active = 1
        ORDER BY n.id
        "#,
    )
    .bind(monitor_id)
    .fetch_all(pool)
    .await
}

//! Key/value settings, stored as JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;

pub async fn get_setting<T: DeserializeOwned>(
    pool: &SqlitePool,
    key: &str,
) -> Result<Option<T>, sqlx::Error> {
    let raw: Option<String> = sqlx::query_scalar("SELECT value FROM setting WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
}

pub async fn set_setting<T: Serialize>(
    pool: &SqlitePool,
    key: &str,
    value: &T,
    namespace: &str,
) -> Result<(), sqlx::Error> {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    sqlx::query(
        r#"
        INSERT INTO setting (key, value, type) VALUES (?, ?, ?)
        ON CONFLICT (key) DO UPDATE SET value = excluded.value, type = excluded.type
        "#,
    )
    .bind(key)
    .bind(json)
    .bind(namespace)
    .execute(pool)
    .await?;
    Ok(())
}

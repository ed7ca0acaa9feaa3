//! # Settings Repository
//!
//! Settings are stored one key per row with JSON values, keyed by the
//! camelCase field name of [`Settings`]. Unknown keys are ignored on load so
//! older databases keep working after fields are added.

use serde_json::{Map, Value};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use gaspro_core::Settings;

/// Key of the argon2 admin hash. Written separately because the hash is
/// excluded from the serialized form of [`Settings`].
pub const ADMIN_PASSWORD_HASH: &str = "adminPasswordHash";

/// Key of the sticky replication flag.
pub const NEEDS_SYNC: &str = "needsSync";

#[derive(Debug, FromRow)]
struct SettingRow {
    key: String,
    value: String,
}

/// Repository for the key/value settings table.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self) -> DbResult<Settings> {
        let mut conn = self.pool.acquire().await?;
        Self::load(&mut conn).await
    }

    /// The sticky "local changes not yet replicated" flag.
    pub async fn needs_sync(&self) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(Self::get_value(&mut conn, NEEDS_SYNC)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    pub async fn set_needs_sync(&self, value: bool) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::mark_needs_sync(&mut conn, value).await
    }

    // =========================================================================
    // Connection-scoped
    // =========================================================================

    pub async fn load(conn: &mut SqliteConnection) -> DbResult<Settings> {
        let rows: Vec<SettingRow> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&mut *conn)
            .await?;

        let mut map = Map::new();
        for row in rows {
            map.insert(row.key, serde_json::from_str(&row.value)?);
        }
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Writes every field. The admin hash is only touched when present, so
    /// saving settings read from an export never clears a local password.
    pub async fn save(conn: &mut SqliteConnection, settings: &Settings) -> DbResult<()> {
        debug!(
            auto_backup = settings.auto_backup_enabled,
            needs_sync = settings.needs_sync,
            "Saving settings"
        );

        if let Value::Object(fields) = serde_json::to_value(settings)? {
            for (key, value) in fields {
                Self::put_value(conn, &key, &value).await?;
            }
        }
        if let Some(hash) = &settings.admin_password_hash {
            Self::put_value(conn, ADMIN_PASSWORD_HASH, &Value::String(hash.clone())).await?;
        }
        Ok(())
    }

    pub async fn mark_needs_sync(conn: &mut SqliteConnection, value: bool) -> DbResult<()> {
        Self::put_value(conn, NEEDS_SYNC, &Value::Bool(value)).await
    }

    pub async fn get_value(conn: &mut SqliteConnection, key: &str) -> DbResult<Option<Value>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put_value(conn: &mut SqliteConnection, key: &str, value: &Value) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Removes every setting except the admin password hash.
    pub async fn clear(conn: &mut SqliteConnection) -> DbResult<()> {
        sqlx::query("DELETE FROM settings WHERE key <> ?1")
            .bind(ADMIN_PASSWORD_HASH)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = db.settings().get().await.unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!db.settings().needs_sync().await.unwrap());
    }

    #[tokio::test]
    async fn test_save_and_load_keeps_hash() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = Settings {
            admin_password_hash: Some("$argon2id$fake".to_string()),
            admin_email: Some("owner@example.com".to_string()),
            allowed_emails: vec!["clerk@example.com".to_string()],
            last_backup_date: Some(Utc::now()),
            auto_backup_enabled: true,
            ..Default::default()
        };

        let mut conn = db.pool().acquire().await.unwrap();
        SettingsRepository::save(&mut conn, &settings).await.unwrap();

        // Saving a copy without the hash keeps the stored one
        let exported = Settings {
            admin_password_hash: None,
            ..settings.clone()
        };
        SettingsRepository::save(&mut conn, &exported).await.unwrap();

        let loaded = SettingsRepository::load(&mut conn).await.unwrap();
        assert_eq!(loaded.admin_password_hash.as_deref(), Some("$argon2id$fake"));
        assert_eq!(loaded.allowed_emails, settings.allowed_emails);
        assert!(loaded.auto_backup_enabled);
    }

    #[tokio::test]
    async fn test_needs_sync_flag() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settings().set_needs_sync(true).await.unwrap();
        assert!(db.settings().needs_sync().await.unwrap());
        assert!(db.settings().get().await.unwrap().needs_sync);
        db.settings().set_needs_sync(false).await.unwrap();
        assert!(!db.settings().needs_sync().await.unwrap());
    }
}

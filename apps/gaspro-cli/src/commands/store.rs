//! # Store Commands
//!
//! Whole-store operations: reconciliation, snapshot export/import, factory
//! reset, and settings.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::info;

use gaspro_core::Snapshot;
use gaspro_db::Database;

use super::to_json;
use crate::cli::{AdminAuth, SettingsCommand};
use crate::error::{CliError, CliResult};

pub async fn reconcile(db: &Database) -> CliResult<Value> {
    let report = db.reconciler().reconcile_all().await?;
    to_json(&report)
}

/// Prints the snapshot, or writes it to `output` and stamps the backup date.
pub async fn export(db: &Database, output: Option<PathBuf>) -> CliResult<Value> {
    let snapshot = db.snapshots().export_snapshot().await?;
    let Some(path) = output else {
        return to_json(&snapshot);
    };

    let body = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| CliError::internal(e.to_string()))?;
    tokio::fs::write(&path, body).await?;
    let settings = db.registry().record_backup().await?;
    info!(path = %path.display(), "Snapshot exported");

    Ok(json!({
        "path": path.display().to_string(),
        "customers": snapshot.customers.len(),
        "invoices": snapshot.invoices.len(),
        "repayments": snapshot.repayments.len(),
        "cylinderTransactions": snapshot.cylinder_transactions.len(),
        "lastBackupDate": settings.last_backup_date,
    }))
}

pub async fn import(db: &Database, file: PathBuf, auth: AdminAuth) -> CliResult<Value> {
    db.registry()
        .require_admin_password(auth.password.as_deref())
        .await?;

    let body = tokio::fs::read_to_string(&file).await?;
    let snapshot: Snapshot = serde_json::from_str(&body)?;
    let report = db.snapshots().import_snapshot(snapshot).await?;
    info!(file = %file.display(), customers = report.customers, "Snapshot imported");
    to_json(&report)
}

pub async fn reset(db: &Database, auth: AdminAuth, yes: bool) -> CliResult<Value> {
    if !yes {
        return Err(CliError::validation(
            "Reset deletes every customer and transaction; pass --yes to confirm",
        ));
    }
    db.registry()
        .require_admin_password(auth.password.as_deref())
        .await?;
    db.snapshots().factory_reset().await?;
    Ok(json!({ "reset": true }))
}

pub async fn settings(db: &Database, cmd: SettingsCommand) -> CliResult<Value> {
    let registry = db.registry();
    match cmd {
        SettingsCommand::Show => {
            let settings = registry.get_settings().await?;
            let mut value = to_json(&settings)?;
            value["adminPasswordSet"] = json!(settings.admin_password_hash.is_some());
            Ok(value)
        }
        SettingsCommand::Password { new, current } => {
            registry.set_admin_password(current.as_deref(), &new).await?;
            Ok(json!({ "adminPasswordSet": true }))
        }
        SettingsCommand::Types { labels } if labels.is_empty() => {
            to_json(&registry.list_customer_types().await?)
        }
        SettingsCommand::Types { labels } => to_json(&registry.save_customer_types(labels).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{customer, setup};
    use crate::error::ErrorCode;
    use gaspro_core::Money;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gaspro-{}-{}.json", name, unique_suffix()))
    }

    fn unique_suffix() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }

    #[tokio::test]
    async fn test_export_to_file_then_import() {
        let source = setup().await;
        let c = customer(&source, "Lina").await;
        source
            .ledger()
            .record_manual_debt(&c.id, Money::from_minor(7_500), "")
            .await
            .unwrap();

        let path = temp_file("export");
        let summary = export(&source, Some(path.clone())).await.unwrap();
        assert_eq!(summary["customers"], 1);
        assert!(source.registry().get_settings().await.unwrap().last_backup_date.is_some());

        let target = setup().await;
        let report = import(&target, path.clone(), AdminAuth::default()).await.unwrap();
        assert_eq!(report["customers"], 1);
        let imported = target.registry().get_customer(&c.id).await.unwrap();
        assert_eq!(imported.balance, Money::from_minor(7_500));

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_import_rejects_bad_json() {
        let db = setup().await;
        let path = temp_file("bad");
        std::fs::write(&path, "{ not json").unwrap();

        let err = import(&db, path.clone(), AdminAuth::default()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_reset_needs_confirmation() {
        let db = setup().await;
        customer(&db, "Lina").await;

        let err = reset(&db, AdminAuth::default(), false).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(db.registry().list_customers().await.unwrap().len(), 1);

        reset(&db, AdminAuth::default(), true).await.unwrap();
        assert!(db.registry().list_customers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settings_show_hides_hash() {
        let db = setup().await;
        settings(
            &db,
            SettingsCommand::Password {
                new: "pw".into(),
                current: None,
            },
        )
        .await
        .unwrap();

        let shown = settings(&db, SettingsCommand::Show).await.unwrap();
        assert_eq!(shown["adminPasswordSet"], true);
        assert!(shown.get("adminPasswordHash").is_none());

        let types = settings(&db, SettingsCommand::Types { labels: vec![] }).await.unwrap();
        assert!(!types.as_array().unwrap().is_empty());
    }
}

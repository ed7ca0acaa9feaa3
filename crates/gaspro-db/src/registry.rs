//! # Registry
//!
//! Administration of everything that is not a ledger transaction: customer
//! profiles, the product catalog, customer-type labels and settings.
//!
//! None of these operations change a balance. Customer profile writes still
//! take the customer lock so an outbox payload never mixes a new profile with
//! a balance from a concurrent ledger write.
//!
//! ## Serial Numbers
//! ```text
//! add_customer
//!      │
//!      ▼
//! BEGIN ── SELECT MAX(serial_number) + 1 ── INSERT ── COMMIT
//!          └──────── same transaction ────────┘
//! ```
//! The UNIQUE constraint on `serial_number` backs this up. A serial freed by
//! deleting the highest customer may be handed out again, but two customers
//! never share one.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::customer::CustomerRepository;
use crate::repository::product::ProductRepository;
use crate::repository::settings::{SettingsRepository, ADMIN_PASSWORD_HASH};
use crate::repository::sync::SyncOutboxRepository;
use gaspro_core::validation::{validate_customer_profile, validate_name, validate_search_query};
use gaspro_core::{
    CoreError, Customer, CustomerProfile, EntityKind, NewProduct, Product, Settings,
    ValidationError,
};

/// Outbox entity id used for the customer-type label list.
pub const CUSTOMER_TYPES_ENTITY_ID: &str = "customer-types";

/// Outbox entity id used for settings.
pub const SETTINGS_ENTITY_ID: &str = "settings";

const SEARCH_LIMIT: u32 = 50;

/// Obtain one with [`Database::registry`].
#[derive(Debug, Clone)]
pub struct Registry {
    db: Database,
}

impl Registry {
    pub fn new(db: Database) -> Self {
        Registry { db }
    }

    // =========================================================================
    // Customers
    // =========================================================================

    /// Creates a customer with the next serial number and zero balances.
    pub async fn add_customer(&self, profile: CustomerProfile) -> DbResult<Customer> {
        let profile = normalize_profile(profile);
        validate_customer_profile(&profile)?;

        let _gate = self.db.locks().shared().await;
        let mut tx = self.db.begin_write().await?;

        let serial = CustomerRepository::next_serial(&mut tx).await?;
        let customer = Customer::new(Uuid::new_v4().to_string(), serial, profile);
        CustomerRepository::insert(&mut tx, &customer).await?;
        SyncOutboxRepository::enqueue_upsert(&mut tx, EntityKind::Customer, &customer.id, &customer)
            .await?;

        tx.commit().await?;
        self.db.notify_change();

        info!(id = %customer.id, serial = serial, name = %customer.name, "Customer added");
        Ok(customer)
    }

    /// Replaces the profile fields. Balances and holdings are untouched.
    pub async fn update_customer(&self, id: &str, profile: CustomerProfile) -> DbResult<Customer> {
        let profile = normalize_profile(profile);
        validate_customer_profile(&profile)?;

        let _guard = self.db.locks().customer(id).await;
        let mut tx = self.db.begin_write().await?;

        let mut customer = CustomerRepository::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))?;
        customer.apply_profile(profile);
        CustomerRepository::update_profile(&mut tx, &customer).await?;
        SyncOutboxRepository::enqueue_upsert(&mut tx, EntityKind::Customer, id, &customer).await?;

        tx.commit().await?;
        self.db.notify_change();
        Ok(customer)
    }

    /// Deletes a customer that has no invoices, repayments or cylinder movements.
    pub async fn delete_customer(&self, id: &str) -> DbResult<Customer> {
        let _guard = self.db.locks().customer(id).await;
        let mut tx = self.db.begin_write().await?;

        let customer = CustomerRepository::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))?;

        let history = CustomerRepository::history_count(&mut tx, id).await?;
        if history > 0 {
            return Err(CoreError::CustomerHasHistory {
                customer_id: id.to_string(),
                transactions: history,
            }
            .into());
        }

        CustomerRepository::delete(&mut tx, id).await?;
        SyncOutboxRepository::enqueue_delete(&mut tx, EntityKind::Customer, id).await?;

        tx.commit().await?;
        self.db.notify_change();

        info!(id = %id, serial = customer.serial_number, "Customer deleted");
        Ok(customer)
    }

    pub async fn list_customers(&self) -> DbResult<Vec<Customer>> {
        self.db.customers().list().await
    }

    pub async fn get_customer(&self, id: &str) -> DbResult<Customer> {
        self.db
            .customers()
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }

    pub async fn find_customer_by_serial(&self, serial: i64) -> DbResult<Customer> {
        self.db
            .customers()
            .get_by_serial(serial)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", serial.to_string()))
    }

    pub async fn search_customers(&self, term: &str) -> DbResult<Vec<Customer>> {
        let term = validate_search_query(term)?;
        self.db.customers().search(&term, SEARCH_LIMIT).await
    }

    pub async fn debtors(&self) -> DbResult<Vec<Customer>> {
        self.db.customers().debtors().await
    }

    pub async fn customers_with_active_loans(&self) -> DbResult<Vec<Customer>> {
        self.db.customers().with_active_loans().await
    }

    // =========================================================================
    // Products
    // =========================================================================

    pub async fn add_product(&self, input: NewProduct) -> DbResult<Product> {
        validate_name("name", &input.name)?;

        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            size: input.size.trim().to_string(),
            is_active: true,
        };

        let _gate = self.db.locks().shared().await;
        let mut tx = self.db.begin_write().await?;
        ProductRepository::insert(&mut tx, &product).await?;
        SyncOutboxRepository::enqueue_upsert(&mut tx, EntityKind::Product, &product.id, &product)
            .await?;
        tx.commit().await?;
        self.db.notify_change();

        info!(id = %product.id, name = %product.name, "Product added");
        Ok(product)
    }

    /// Renames a product. History keeps the old name; holdings follow the id.
    pub async fn update_product(&self, id: &str, input: NewProduct) -> DbResult<Product> {
        validate_name("name", &input.name)?;
        let name = input.name.trim().to_string();
        let size = input.size.trim().to_string();
        self.modify_product(id, move |p| {
            p.name = name;
            p.size = size;
        })
        .await
    }

    /// Hides (or restores) a product for new sales and loans.
    pub async fn set_product_active(&self, id: &str, active: bool) -> DbResult<Product> {
        self.modify_product(id, move |p| p.is_active = active).await
    }

    pub async fn list_products(&self) -> DbResult<Vec<Product>> {
        self.db.products().list().await
    }

    pub async fn list_active_products(&self) -> DbResult<Vec<Product>> {
        self.db.products().list_active().await
    }

    async fn modify_product(&self, id: &str, change: impl FnOnce(&mut Product)) -> DbResult<Product> {
        let _gate = self.db.locks().shared().await;
        let mut tx = self.db.begin_write().await?;

        let mut product = ProductRepository::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;
        change(&mut product);
        ProductRepository::update(&mut tx, &product).await?;
        SyncOutboxRepository::enqueue_upsert(&mut tx, EntityKind::Product, id, &product).await?;

        tx.commit().await?;
        self.db.notify_change();
        Ok(product)
    }

    // =========================================================================
    // Customer Types
    // =========================================================================

    pub async fn list_customer_types(&self) -> DbResult<Vec<String>> {
        self.db.products().customer_types().await
    }

    /// Replaces the label list. Blank labels are dropped; duplicates are refused.
    pub async fn save_customer_types(&self, labels: Vec<String>) -> DbResult<Vec<String>> {
        let mut cleaned: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.trim().to_string();
            if label.is_empty() {
                continue;
            }
            if cleaned.contains(&label) {
                return Err(ValidationError::Duplicate {
                    field: "customer type".to_string(),
                    value: label,
                }
                .into());
            }
            cleaned.push(label);
        }

        let _gate = self.db.locks().shared().await;
        let mut tx = self.db.begin_write().await?;
        ProductRepository::replace_customer_types(&mut tx, &cleaned).await?;
        SyncOutboxRepository::enqueue_upsert(
            &mut tx,
            EntityKind::CustomerTypes,
            CUSTOMER_TYPES_ENTITY_ID,
            &cleaned,
        )
        .await?;
        tx.commit().await?;
        self.db.notify_change();
        Ok(cleaned)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub async fn get_settings(&self) -> DbResult<Settings> {
        self.db.settings().get().await
    }

    /// Saves the operator-editable settings.
    ///
    /// The admin hash and the `needsSync` flag are managed elsewhere and
    /// keep their stored values.
    pub async fn save_settings(&self, settings: Settings) -> DbResult<Settings> {
        for email in settings.admin_email.iter().chain(settings.allowed_emails.iter()) {
            if !email.contains('@') {
                return Err(ValidationError::InvalidFormat {
                    field: "email".to_string(),
                    reason: format!("'{email}' is not an email address"),
                }
                .into());
            }
        }

        let _gate = self.db.locks().shared().await;
        let mut tx = self.db.begin_write().await?;

        let stored = SettingsRepository::load(&mut tx).await?;
        let settings = Settings {
            admin_password_hash: None,
            needs_sync: stored.needs_sync,
            ..settings
        };
        SettingsRepository::save(&mut tx, &settings).await?;
        SyncOutboxRepository::enqueue_upsert(
            &mut tx,
            EntityKind::Settings,
            SETTINGS_ENTITY_ID,
            &settings,
        )
        .await?;
        let saved = SettingsRepository::load(&mut tx).await?;

        tx.commit().await?;
        self.db.notify_change();
        Ok(saved)
    }

    /// Sets the admin password used to confirm deletions.
    ///
    /// When a password already exists, `current` must match it. The check
    /// and the write share one transaction. The hash is local to this
    /// device: it is never exported and never queued for replication.
    pub async fn set_admin_password(&self, current: Option<&str>, new: &str) -> DbResult<()> {
        if new.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "password".to_string(),
            }
            .into());
        }

        let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
            .map_err(|e| DbError::Internal(format!("Failed to create salt: {e}")))?;
        let hash = Argon2::default()
            .hash_password(new.as_bytes(), &salt)
            .map_err(|e| DbError::Internal(format!("Failed to hash password: {e}")))?
            .to_string();

        let mut tx = self.db.begin_write().await?;
        let stored = SettingsRepository::load(&mut tx).await?.admin_password_hash;
        if !password_matches(stored.as_deref(), current.unwrap_or_default()) {
            return Err(CoreError::WrongPassword.into());
        }
        SettingsRepository::put_value(&mut tx, ADMIN_PASSWORD_HASH, &Value::String(hash)).await?;
        tx.commit().await?;

        info!("Admin password updated");
        Ok(())
    }

    /// Checks a password against the stored hash. With no password set,
    /// every attempt passes.
    pub async fn verify_admin_password(&self, password: &str) -> DbResult<bool> {
        let settings = self.db.settings().get().await?;
        Ok(password_matches(
            settings.admin_password_hash.as_deref(),
            password,
        ))
    }

    /// Like [`Self::verify_admin_password`] but fails with `WrongPassword`.
    pub async fn require_admin_password(&self, password: Option<&str>) -> DbResult<()> {
        if self.verify_admin_password(password.unwrap_or_default()).await? {
            Ok(())
        } else {
            Err(CoreError::WrongPassword.into())
        }
    }

    /// True while local changes have not been replicated.
    pub async fn has_pending_changes(&self) -> DbResult<bool> {
        self.db.settings().needs_sync().await
    }

    /// Stamps `lastBackupDate` with the current time.
    pub async fn record_backup(&self) -> DbResult<Settings> {
        let mut settings = self.get_settings().await?;
        settings.last_backup_date = Some(Utc::now());
        self.save_settings(settings).await
    }
}

fn password_matches(stored: Option<&str>, password: &str) -> bool {
    let Some(stored) = stored else {
        return true;
    };
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            debug!(error = %e, "Stored admin hash is unreadable");
            false
        }
    }
}

/// Trims text fields and turns blank contact numbers into `None`.
fn normalize_profile(profile: CustomerProfile) -> CustomerProfile {
    let contact = |v: Option<String>| {
        v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
    };
    CustomerProfile {
        name: profile.name.trim().to_string(),
        customer_type: profile.customer_type.trim().to_string(),
        city: profile.city.trim().to_string(),
        village: profile.village.trim().to_string(),
        neighborhood: profile.neighborhood.trim().to_string(),
        phone: contact(profile.phone),
        whatsapp: contact(profile.whatsapp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use gaspro_core::Money;

    fn profile(name: &str) -> CustomerProfile {
        CustomerProfile {
            name: name.to_string(),
            city: "Nablus".to_string(),
            phone: Some("0591234567".to_string()),
            ..Default::default()
        }
    }

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_serials_are_unique_after_deletes() {
        let db = db().await;
        let registry = db.registry();

        let mut created = Vec::new();
        for i in 0..5 {
            created.push(registry.add_customer(profile(&format!("Customer {i}"))).await.unwrap());
        }
        registry.delete_customer(&created[1].id).await.unwrap();
        registry.delete_customer(&created[4].id).await.unwrap();
        for i in 5..8 {
            registry.add_customer(profile(&format!("Customer {i}"))).await.unwrap();
        }

        let mut serials: Vec<i64> = registry
            .list_customers()
            .await
            .unwrap()
            .iter()
            .map(|c| c.serial_number)
            .collect();
        let total = serials.len();
        serials.sort_unstable();
        serials.dedup();
        assert_eq!(serials.len(), total);
        assert_eq!(total, 6);
        assert!(serials.iter().all(|s| *s > 0));
    }

    #[tokio::test]
    async fn test_add_customer_validates() {
        let db = db().await;
        let err = db
            .registry()
            .add_customer(CustomerProfile {
                name: "Shifa".into(),
                phone: Some("05912".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::Validation(_))));

        let err = db.registry().add_customer(profile("   ")).await.unwrap_err();
        assert!(err.is_rejection());

        // Blank phone is stored as absent
        let customer = db
            .registry()
            .add_customer(CustomerProfile {
                name: "  Shifa  ".into(),
                phone: Some("  ".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(customer.name, "Shifa");
        assert_eq!(customer.phone, None);
        assert_eq!(customer.serial_number, 1);
    }

    #[tokio::test]
    async fn test_delete_refused_with_history() {
        let db = db().await;
        let customer = db.registry().add_customer(profile("Rafidia Hospital")).await.unwrap();
        db.ledger()
            .record_manual_debt(&customer.id, Money::from_minor(1000), "")
            .await
            .unwrap();

        let err = db.registry().delete_customer(&customer.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(CoreError::CustomerHasHistory { transactions: 1, .. })
        ));
        assert!(db.customers().get_by_id(&customer.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_keeps_balances() {
        let db = db().await;
        let customer = db.registry().add_customer(profile("Old Name")).await.unwrap();
        db.ledger()
            .record_manual_debt(&customer.id, Money::from_minor(2500), "")
            .await
            .unwrap();

        let updated = db
            .registry()
            .update_customer(&customer.id, profile("New Name"))
            .await
            .unwrap();
        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.balance, Money::from_minor(2500));
        assert_eq!(updated.serial_number, customer.serial_number);
    }

    #[tokio::test]
    async fn test_search_and_lookups() {
        let db = db().await;
        let registry = db.registry();
        let first = registry.add_customer(profile("Al-Quds Restaurant")).await.unwrap();
        registry.add_customer(profile("Hebron Clinic")).await.unwrap();

        assert_eq!(registry.search_customers("quds").await.unwrap().len(), 1);
        assert_eq!(registry.search_customers("Nablus").await.unwrap().len(), 2);
        assert_eq!(registry.search_customers("2").await.unwrap().len(), 1);

        let by_serial = registry.find_customer_by_serial(first.serial_number).await.unwrap();
        assert_eq!(by_serial.id, first.id);
        assert!(matches!(
            registry.find_customer_by_serial(42).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_debtors_sorted_by_debt() {
        let db = db().await;
        let registry = db.registry();
        let small = registry.add_customer(profile("Small")).await.unwrap();
        let big = registry.add_customer(profile("Big")).await.unwrap();
        registry.add_customer(profile("Settled")).await.unwrap();

        let ledger = db.ledger();
        ledger.record_manual_debt(&small.id, Money::from_minor(100), "").await.unwrap();
        ledger.record_manual_debt(&big.id, Money::from_minor(9000), "").await.unwrap();

        let debtors = registry.debtors().await.unwrap();
        assert_eq!(debtors.len(), 2);
        assert_eq!(debtors[0].id, big.id);
    }

    #[tokio::test]
    async fn test_products() {
        let db = db().await;
        let registry = db.registry();
        let product = registry
            .add_product(NewProduct {
                name: "12kg".into(),
                size: "12".into(),
            })
            .await
            .unwrap();

        let hidden = registry.set_product_active(&product.id, false).await.unwrap();
        assert!(!hidden.is_active);
        assert!(registry.list_active_products().await.unwrap().is_empty());
        assert_eq!(registry.list_products().await.unwrap().len(), 1);

        let err = registry
            .update_product(
                "missing",
                NewProduct {
                    name: "48kg".into(),
                    size: "48".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_customer_types() {
        let db = db().await;
        let registry = db.registry();
        let defaults = registry.list_customer_types().await.unwrap();
        assert_eq!(defaults.len(), gaspro_core::DEFAULT_CUSTOMER_TYPES.len());
        assert_eq!(defaults[0], "Unclassified");

        let saved = registry
            .save_customer_types(vec!["Hospital".into(), " ".into(), "Bakery".into()])
            .await
            .unwrap();
        assert_eq!(saved, vec!["Hospital".to_string(), "Bakery".to_string()]);
        assert_eq!(registry.list_customer_types().await.unwrap(), saved);

        let err = registry
            .save_customer_types(vec!["Hospital".into(), "Hospital".into()])
            .await
            .unwrap_err();
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn test_admin_password() {
        let db = db().await;
        let registry = db.registry();

        // No password set: everything passes
        assert!(registry.verify_admin_password("anything").await.unwrap());
        let pending = db.sync_outbox().count_pending().await.unwrap();

        registry.set_admin_password(None, "s3cret").await.unwrap();
        // The hash stays on this device
        assert_eq!(db.sync_outbox().count_pending().await.unwrap(), pending);
        assert!(registry.verify_admin_password("s3cret").await.unwrap());
        assert!(!registry.verify_admin_password("wrong").await.unwrap());

        let err = registry.set_admin_password(Some("wrong"), "other").await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::WrongPassword)));

        registry.set_admin_password(Some("s3cret"), "other").await.unwrap();
        assert!(registry.verify_admin_password("other").await.unwrap());
        assert!(registry.require_admin_password(Some("s3cret")).await.is_err());
    }

    #[tokio::test]
    async fn test_settings_and_backup() {
        let db = db().await;
        let registry = db.registry();
        registry.set_admin_password(None, "pw").await.unwrap();

        let saved = registry
            .save_settings(Settings {
                admin_email: Some("owner@example.com".into()),
                auto_backup_enabled: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(saved.auto_backup_enabled);
        assert!(saved.admin_password_hash.is_some());
        assert!(registry.has_pending_changes().await.unwrap());

        let after = registry.record_backup().await.unwrap();
        assert!(after.last_backup_date.is_some());

        let err = registry
            .save_settings(Settings {
                allowed_emails: vec!["not-an-email".into()],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_rejection());
    }
}

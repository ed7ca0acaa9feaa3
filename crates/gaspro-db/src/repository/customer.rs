//! # Customer Repository
//!
//! Customers plus their per-product cylinder holdings.
//!
//! ## Storage Layout
//! ```text
//! customers                          customer_cylinder_balances
//! ┌────┬────────┬──────┬─────────┐   ┌─────────────┬────────────┬──────────┐
//! │ id │ serial │ name │ balance │   │ customer_id │ product_id │ quantity │
//! ├────┼────────┼──────┼─────────┤   ├─────────────┼────────────┼──────────┤
//! │ c1 │   1    │ ...  │  15000  │◄──│ c1          │ p12        │    3     │
//! └────┴────────┴──────┴─────────┘   │ c1          │ p48        │    1     │
//!                                    └─────────────┴────────────┴──────────┘
//! ```
//! Zero holdings have no row.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use gaspro_core::{Customer, CylinderBalance, Money};

const CUSTOMER_COLUMNS: &str = r#"
    id, serial_number, name, customer_type, city, village, neighborhood,
    phone, whatsapp, total_purchases, balance
"#;

#[derive(Debug, FromRow)]
struct CustomerRow {
    id: String,
    serial_number: i64,
    name: String,
    customer_type: String,
    city: String,
    village: String,
    neighborhood: String,
    phone: Option<String>,
    whatsapp: Option<String>,
    total_purchases: i64,
    balance: i64,
}

impl CustomerRow {
    fn into_customer(self, cylinder_balance: CylinderBalance) -> Customer {
        Customer {
            id: self.id,
            serial_number: self.serial_number,
            name: self.name,
            customer_type: self.customer_type,
            city: self.city,
            village: self.village,
            neighborhood: self.neighborhood,
            phone: self.phone,
            whatsapp: self.whatsapp,
            total_purchases: Money::from_minor(self.total_purchases),
            balance: Money::from_minor(self.balance),
            cylinder_balance,
        }
    }
}

#[derive(Debug, FromRow)]
struct HoldingRow {
    customer_id: String,
    product_id: String,
    quantity: i64,
}

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    // =========================================================================
    // Pooled reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    pub async fn get_by_serial(&self, serial: i64) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE serial_number = ?1");
        let row: Option<CustomerRow> = sqlx::query_as(&sql)
            .bind(serial)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => {
                let holdings = Self::fetch_holdings(&mut conn, &row.id).await?;
                Ok(Some(row.into_customer(holdings)))
            }
            None => Ok(None),
        }
    }

    /// All customers ordered by serial number.
    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_all(&mut conn).await
    }

    /// Matches name, phone or city (substring) or an exact serial number.
    pub async fn search(&self, term: &str, limit: u32) -> DbResult<Vec<Customer>> {
        let term = term.trim();
        if term.is_empty() {
            let mut all = self.list().await?;
            all.truncate(limit as usize);
            return Ok(all);
        }

        debug!(term = %term, limit = %limit, "Searching customers");

        let pattern = format!("%{}%", term);
        let serial: i64 = term.parse().unwrap_or(-1);
        let sql = format!(
            r#"
            SELECT {CUSTOMER_COLUMNS} FROM customers
            WHERE name LIKE ?1 OR phone LIKE ?1 OR city LIKE ?1 OR serial_number = ?2
            ORDER BY serial_number
            LIMIT ?3
            "#
        );
        let rows: Vec<CustomerRow> = sqlx::query_as(&sql)
            .bind(&pattern)
            .bind(serial)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        self.attach_holdings(rows).await
    }

    /// Customers with a non-zero balance, largest debt first.
    pub async fn debtors(&self) -> DbResult<Vec<Customer>> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE balance != 0 ORDER BY balance DESC, serial_number"
        );
        let rows: Vec<CustomerRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        self.attach_holdings(rows).await
    }

    /// Customers currently holding at least one cylinder.
    pub async fn with_active_loans(&self) -> DbResult<Vec<Customer>> {
        let sql = format!(
            r#"
            SELECT {CUSTOMER_COLUMNS} FROM customers
            WHERE id IN (SELECT customer_id FROM customer_cylinder_balances WHERE quantity > 0)
            ORDER BY serial_number
            "#
        );
        let rows: Vec<CustomerRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        self.attach_holdings(rows).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Sum of every holding across all customers.
    pub async fn total_cylinders_out(&self) -> DbResult<i64> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(quantity), 0) FROM customer_cylinder_balances")
                .fetch_one(&self.pool)
                .await?;
        Ok(total)
    }

    async fn attach_holdings(&self, rows: Vec<CustomerRow>) -> DbResult<Vec<Customer>> {
        let mut conn = self.pool.acquire().await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let holdings = Self::fetch_holdings(&mut conn, &row.id).await?;
            out.push(row.into_customer(holdings));
        }
        Ok(out)
    }

    // =========================================================================
    // Connection-scoped reads (usable inside a transaction)
    // =========================================================================

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");
        let row: Option<CustomerRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => {
                let holdings = Self::fetch_holdings(conn, id).await?;
                Ok(Some(row.into_customer(holdings)))
            }
            None => Ok(None),
        }
    }

    pub async fn fetch_holdings(
        conn: &mut SqliteConnection,
        customer_id: &str,
    ) -> DbResult<CylinderBalance> {
        let rows: Vec<HoldingRow> = sqlx::query_as(
            "SELECT customer_id, product_id, quantity FROM customer_cylinder_balances WHERE customer_id = ?1",
        )
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(|r| (r.product_id, r.quantity)).collect())
    }

    /// The current holding of one product, read on the given connection.
    pub async fn fetch_holding(
        conn: &mut SqliteConnection,
        customer_id: &str,
        product_id: &str,
    ) -> DbResult<i64> {
        let quantity: Option<i64> = sqlx::query_scalar(
            "SELECT quantity FROM customer_cylinder_balances WHERE customer_id = ?1 AND product_id = ?2",
        )
        .bind(customer_id)
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(quantity.unwrap_or(0))
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> DbResult<Vec<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY serial_number");
        let rows: Vec<CustomerRow> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;

        let holdings: Vec<HoldingRow> = sqlx::query_as(
            "SELECT customer_id, product_id, quantity FROM customer_cylinder_balances",
        )
        .fetch_all(&mut *conn)
        .await?;
        let mut by_customer: HashMap<String, CylinderBalance> = HashMap::new();
        for h in holdings {
            by_customer
                .entry(h.customer_id)
                .or_default()
                .apply(&h.product_id, h.quantity);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let holdings = by_customer.remove(&row.id).unwrap_or_default();
                row.into_customer(holdings)
            })
            .collect())
    }

    /// Next serial number: max existing + 1.
    pub async fn next_serial(conn: &mut SqliteConnection) -> DbResult<i64> {
        let next: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(serial_number), 0) + 1 FROM customers")
                .fetch_one(&mut *conn)
                .await?;
        Ok(next)
    }

    /// Number of invoices, repayments and cylinder movements referencing a customer.
    pub async fn history_count(conn: &mut SqliteConnection, customer_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT
                (SELECT COUNT(*) FROM invoices WHERE customer_id = ?1) +
                (SELECT COUNT(*) FROM repayments WHERE customer_id = ?1) +
                (SELECT COUNT(*) FROM cylinder_transactions WHERE customer_id = ?1)
            "#,
        )
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    // =========================================================================
    // Writes (transaction-scoped)
    // =========================================================================

    /// Takes the write lock on a customer row and reports whether it exists.
    ///
    /// Run as the first statement of a ledger transaction so that the guard
    /// reads that follow see the committed state of this customer.
    pub async fn claim(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE customers SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn insert(conn: &mut SqliteConnection, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, serial = customer.serial_number, "Inserting customer");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, serial_number, name, customer_type, city, village, neighborhood,
                phone, whatsapp, total_purchases, balance, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            "#,
        )
        .bind(&customer.id)
        .bind(customer.serial_number)
        .bind(&customer.name)
        .bind(&customer.customer_type)
        .bind(&customer.city)
        .bind(&customer.village)
        .bind(&customer.neighborhood)
        .bind(&customer.phone)
        .bind(&customer.whatsapp)
        .bind(customer.total_purchases.minor())
        .bind(customer.balance.minor())
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Self::write_holdings(conn, &customer.id, &customer.cylinder_balance).await
    }

    /// Writes the editable profile columns only.
    pub async fn update_profile(conn: &mut SqliteConnection, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Updating customer profile");

        sqlx::query(
            r#"
            UPDATE customers SET
                name = ?2, customer_type = ?3, city = ?4, village = ?5,
                neighborhood = ?6, phone = ?7, whatsapp = ?8, updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.customer_type)
        .bind(&customer.city)
        .bind(&customer.village)
        .bind(&customer.neighborhood)
        .bind(&customer.phone)
        .bind(&customer.whatsapp)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Writes the derived state: balance, total purchases and holdings.
    pub async fn save_derived(conn: &mut SqliteConnection, customer: &Customer) -> DbResult<()> {
        debug!(
            id = %customer.id,
            balance = customer.balance.minor(),
            total_purchases = customer.total_purchases.minor(),
            "Saving customer balances"
        );

        sqlx::query(
            "UPDATE customers SET balance = ?2, total_purchases = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(&customer.id)
        .bind(customer.balance.minor())
        .bind(customer.total_purchases.minor())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Self::write_holdings(conn, &customer.id, &customer.cylinder_balance).await
    }

    async fn write_holdings(
        conn: &mut SqliteConnection,
        customer_id: &str,
        holdings: &CylinderBalance,
    ) -> DbResult<()> {
        sqlx::query("DELETE FROM customer_cylinder_balances WHERE customer_id = ?1")
            .bind(customer_id)
            .execute(&mut *conn)
            .await?;
        for (product_id, quantity) in holdings.iter() {
            sqlx::query(
                "INSERT INTO customer_cylinder_balances (customer_id, product_id, quantity) VALUES (?1, ?2, ?3)",
            )
            .bind(customer_id)
            .bind(product_id)
            .bind(quantity)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        debug!(id = %id, "Deleting customer");
        let result = sqlx::query("DELETE FROM customers WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_all(conn: &mut SqliteConnection) -> DbResult<u64> {
        sqlx::query("DELETE FROM customer_cylinder_balances")
            .execute(&mut *conn)
            .await?;
        let result = sqlx::query("DELETE FROM customers").execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }
}

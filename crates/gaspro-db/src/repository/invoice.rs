//! # Invoice Repository
//!
//! Invoices and their line items. Lines are ordered by `position` and carry
//! the product name frozen at sale time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use gaspro_core::{Invoice, InvoiceItem, InvoiceStatus, Money, PaymentDetails};

const INVOICE_COLUMNS: &str = r#"
    id, customer_id, customer_name, date, total_amount,
    cash, cheque, cheque_number, debt, status
"#;

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: String,
    customer_id: String,
    customer_name: String,
    date: DateTime<Utc>,
    total_amount: i64,
    cash: i64,
    cheque: i64,
    cheque_number: Option<String>,
    debt: i64,
    status: InvoiceStatus,
}

impl InvoiceRow {
    fn into_invoice(self, items: Vec<InvoiceItem>) -> Invoice {
        Invoice {
            id: self.id,
            customer_id: self.customer_id,
            customer_name: self.customer_name,
            date: self.date,
            items,
            total_amount: Money::from_minor(self.total_amount),
            payment_details: PaymentDetails {
                cash: Money::from_minor(self.cash),
                cheque: Money::from_minor(self.cheque),
                cheque_number: self.cheque_number,
                debt: Money::from_minor(self.debt),
            },
            status: self.status,
        }
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    invoice_id: String,
    product_id: String,
    product_name: String,
    quantity: i64,
}

/// Repository for invoice database operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Every invoice, most recent first.
    pub async fn list(&self) -> DbResult<Vec<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_all(&mut conn).await
    }

    /// One customer's invoices, most recent first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE customer_id = ?1 ORDER BY date DESC, created_at DESC"
        );
        let rows: Vec<InvoiceRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_all(&mut *conn)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let items = Self::fetch_items(&mut conn, &row.id).await?;
            out.push(row.into_invoice(items));
        }
        Ok(out)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    // =========================================================================
    // Connection-scoped
    // =========================================================================

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1");
        let row: Option<InvoiceRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => {
                let items = Self::fetch_items(conn, id).await?;
                Ok(Some(row.into_invoice(items)))
            }
            None => Ok(None),
        }
    }

    async fn fetch_items(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<InvoiceItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT invoice_id, product_id, product_name, quantity
            FROM invoice_items WHERE invoice_id = ?1 ORDER BY position
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| InvoiceItem {
                product_id: r.product_id,
                product_name: r.product_name,
                quantity: r.quantity,
            })
            .collect())
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> DbResult<Vec<Invoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY date DESC, created_at DESC");
        let rows: Vec<InvoiceRow> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;

        let items: Vec<ItemRow> = sqlx::query_as(
            "SELECT invoice_id, product_id, product_name, quantity FROM invoice_items ORDER BY invoice_id, position",
        )
        .fetch_all(&mut *conn)
        .await?;
        let mut by_invoice: HashMap<String, Vec<InvoiceItem>> = HashMap::new();
        for r in items {
            by_invoice.entry(r.invoice_id).or_default().push(InvoiceItem {
                product_id: r.product_id,
                product_name: r.product_name,
                quantity: r.quantity,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = by_invoice.remove(&row.id).unwrap_or_default();
                row.into_invoice(items)
            })
            .collect())
    }

    pub async fn insert(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
        debug!(
            id = %invoice.id,
            customer_id = %invoice.customer_id,
            total = invoice.total_amount.minor(),
            debt = invoice.payment_details.debt.minor(),
            "Inserting invoice"
        );

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, customer_id, customer_name, date, total_amount,
                cash, cheque, cheque_number, debt, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.customer_id)
        .bind(&invoice.customer_name)
        .bind(invoice.date)
        .bind(invoice.total_amount.minor())
        .bind(invoice.payment_details.cash.minor())
        .bind(invoice.payment_details.cheque.minor())
        .bind(&invoice.payment_details.cheque_number)
        .bind(invoice.payment_details.debt.minor())
        .bind(invoice.status)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        for (position, item) in invoice.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO invoice_items (invoice_id, position, product_id, product_name, quantity)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&invoice.id)
            .bind(position as i64)
            .bind(&item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Removes an invoice and its lines. Returns false when the id is unknown.
    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        debug!(id = %id, "Deleting invoice");
        let result = sqlx::query("DELETE FROM invoices WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn update_date(
        conn: &mut SqliteConnection,
        id: &str,
        date: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(id = %id, date = %date, "Redating invoice");
        let result = sqlx::query("UPDATE invoices SET date = ?2 WHERE id = ?1")
            .bind(id)
            .bind(date)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_all(conn: &mut SqliteConnection) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM invoices").execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }
}

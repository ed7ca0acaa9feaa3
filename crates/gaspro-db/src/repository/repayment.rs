//! # Repayment Repository

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use gaspro_core::{Money, Repayment, RepaymentMethod};

const REPAYMENT_COLUMNS: &str = "id, customer_id, customer_name, amount, date, method, note";

#[derive(Debug, FromRow)]
struct RepaymentRow {
    id: String,
    customer_id: String,
    customer_name: String,
    amount: i64,
    date: DateTime<Utc>,
    method: RepaymentMethod,
    note: Option<String>,
}

impl From<RepaymentRow> for Repayment {
    fn from(row: RepaymentRow) -> Self {
        Repayment {
            id: row.id,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            amount: Money::from_minor(row.amount),
            date: row.date,
            method: row.method,
            note: row.note,
        }
    }
}

/// Repository for repayment database operations.
#[derive(Debug, Clone)]
pub struct RepaymentRepository {
    pool: SqlitePool,
}

impl RepaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RepaymentRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<Repayment>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_all(&mut conn).await
    }

    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Repayment>> {
        let sql = format!(
            "SELECT {REPAYMENT_COLUMNS} FROM repayments WHERE customer_id = ?1 ORDER BY date DESC, created_at DESC"
        );
        let rows: Vec<RepaymentRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Repayment::from).collect())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Repayment>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Repayment>> {
        let sql = format!("SELECT {REPAYMENT_COLUMNS} FROM repayments WHERE id = ?1");
        let row: Option<RepaymentRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(Repayment::from))
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> DbResult<Vec<Repayment>> {
        let sql = format!("SELECT {REPAYMENT_COLUMNS} FROM repayments ORDER BY date DESC, created_at DESC");
        let rows: Vec<RepaymentRow> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(Repayment::from).collect())
    }

    pub async fn insert(conn: &mut SqliteConnection, repayment: &Repayment) -> DbResult<()> {
        debug!(
            id = %repayment.id,
            customer_id = %repayment.customer_id,
            amount = repayment.amount.minor(),
            "Inserting repayment"
        );

        sqlx::query(
            r#"
            INSERT INTO repayments (
                id, customer_id, customer_name, amount, date, method, note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&repayment.id)
        .bind(&repayment.customer_id)
        .bind(&repayment.customer_name)
        .bind(repayment.amount.minor())
        .bind(repayment.date)
        .bind(repayment.method)
        .bind(&repayment.note)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        debug!(id = %id, "Deleting repayment");
        let result = sqlx::query("DELETE FROM repayments WHERE id = ?1")
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
        debug!(id = %id, date = %date, "Redating repayment");
        let result = sqlx::query("UPDATE repayments SET date = ?2 WHERE id = ?1")
            .bind(id)
            .bind(date)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_all(conn: &mut SqliteConnection) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM repayments").execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }
}

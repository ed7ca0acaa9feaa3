//! # Cylinder Transaction Repository
//!
//! The loan/return log. Holdings themselves live with the customer
//! (see [`super::customer`]).

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use gaspro_core::{CylinderDirection, CylinderTransaction};

const CYLINDER_COLUMNS: &str =
    "id, customer_id, customer_name, product_id, product_name, quantity, direction, date, note";

#[derive(Debug, FromRow)]
struct CylinderRow {
    id: String,
    customer_id: String,
    customer_name: String,
    product_id: String,
    product_name: String,
    quantity: i64,
    direction: CylinderDirection,
    date: DateTime<Utc>,
    note: Option<String>,
}

impl From<CylinderRow> for CylinderTransaction {
    fn from(row: CylinderRow) -> Self {
        CylinderTransaction {
            id: row.id,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            direction: row.direction,
            date: row.date,
            note: row.note,
        }
    }
}

/// Repository for cylinder movement operations.
#[derive(Debug, Clone)]
pub struct CylinderRepository {
    pool: SqlitePool,
}

impl CylinderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CylinderRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<CylinderTransaction>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_all(&mut conn).await
    }

    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<CylinderTransaction>> {
        let sql = format!(
            "SELECT {CYLINDER_COLUMNS} FROM cylinder_transactions WHERE customer_id = ?1 ORDER BY date DESC, created_at DESC"
        );
        let rows: Vec<CylinderRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CylinderTransaction::from).collect())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CylinderTransaction>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    pub async fn fetch(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<CylinderTransaction>> {
        let sql = format!("SELECT {CYLINDER_COLUMNS} FROM cylinder_transactions WHERE id = ?1");
        let row: Option<CylinderRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(CylinderTransaction::from))
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> DbResult<Vec<CylinderTransaction>> {
        let sql = format!(
            "SELECT {CYLINDER_COLUMNS} FROM cylinder_transactions ORDER BY date DESC, created_at DESC"
        );
        let rows: Vec<CylinderRow> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(CylinderTransaction::from).collect())
    }

    pub async fn insert(conn: &mut SqliteConnection, tx: &CylinderTransaction) -> DbResult<()> {
        debug!(
            id = %tx.id,
            customer_id = %tx.customer_id,
            product_id = %tx.product_id,
            direction = ?tx.direction,
            quantity = tx.quantity,
            "Inserting cylinder transaction"
        );

        sqlx::query(
            r#"
            INSERT INTO cylinder_transactions (
                id, customer_id, customer_name, product_id, product_name,
                quantity, direction, date, note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.customer_id)
        .bind(&tx.customer_name)
        .bind(&tx.product_id)
        .bind(&tx.product_name)
        .bind(tx.quantity)
        .bind(tx.direction)
        .bind(tx.date)
        .bind(&tx.note)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        debug!(id = %id, "Deleting cylinder transaction");
        let result = sqlx::query("DELETE FROM cylinder_transactions WHERE id = ?1")
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
        debug!(id = %id, date = %date, "Redating cylinder transaction");
        let result = sqlx::query("UPDATE cylinder_transactions SET date = ?2 WHERE id = ?1")
            .bind(id)
            .bind(date)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_all(conn: &mut SqliteConnection) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cylinder_transactions")
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

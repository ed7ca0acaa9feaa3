//! # Product Repository
//!
//! The cylinder catalog and the customer-type label list.
//!
//! Products are never deleted: deactivating hides them from new sales while
//! invoices and cylinder history keep pointing at them.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use gaspro_core::Product;

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    name: String,
    size: String,
    is_active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            size: row.size,
            is_active: row.is_active,
        }
    }
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// All products, active first, then by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_all(&mut conn).await
    }

    /// Products offered for new sales and loans.
    pub async fn list_active(&self) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, name, size, is_active FROM products WHERE is_active = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Customer-type labels in display order.
    pub async fn customer_types(&self) -> DbResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_customer_types(&mut conn).await
    }

    // =========================================================================
    // Connection-scoped
    // =========================================================================

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> =
            sqlx::query_as("SELECT id, name, size, is_active FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(row.map(Product::from))
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, name, size, is_active FROM products ORDER BY is_active DESC, name",
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO products (id, name, size, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.size)
        .bind(product.is_active)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Writes name, size and active flag. Returns false when the id is unknown.
    pub async fn update(conn: &mut SqliteConnection, product: &Product) -> DbResult<bool> {
        debug!(id = %product.id, name = %product.name, active = product.is_active, "Updating product");

        let result = sqlx::query(
            "UPDATE products SET name = ?2, size = ?3, is_active = ?4, updated_at = ?5 WHERE id = ?1",
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.size)
        .bind(product.is_active)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_all(conn: &mut SqliteConnection) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM products").execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    pub async fn list_customer_types(conn: &mut SqliteConnection) -> DbResult<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM customer_types ORDER BY position")
                .fetch_all(&mut *conn)
                .await?;
        Ok(names)
    }

    /// Replaces the label list, keeping the given order.
    pub async fn replace_customer_types(
        conn: &mut SqliteConnection,
        names: &[String],
    ) -> DbResult<()> {
        debug!(count = names.len(), "Replacing customer types");

        sqlx::query("DELETE FROM customer_types")
            .execute(&mut *conn)
            .await?;
        for (position, name) in names.iter().enumerate() {
            sqlx::query("INSERT INTO customer_types (name, position) VALUES (?1, ?2)")
                .bind(name)
                .bind(position as i64)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

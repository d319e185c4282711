use drape_core::error::AppError;
use drape_core::models::{ProductRecord, SaveReport};
use drape_core::traits::ProductSink;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};

/// Repository for product records in PostgreSQL.
#[derive(Clone)]
pub struct ProductRepository {
    pool: Pool<Postgres>,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts every record tagged with `source` in one transaction.
    ///
    /// Either the whole batch lands or none of it does. An empty batch
    /// returns `stored == 0` without opening a connection.
    pub async fn save_batch(
        &self,
        records: &[ProductRecord],
        source: &str,
    ) -> Result<SaveReport, AppError> {
        if records.is_empty() {
            tracing::debug!(source, "Empty batch, nothing to store");
            return Ok(SaveReport::default());
        }

        let mut tx = self.pool.begin().await.map_err(storage)?;
        let mut stored = 0;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO products (brand, name, size, price, note, url, images, source)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&record.brand)
            .bind(&record.name)
            .bind(&record.size)
            .bind(&record.price)
            .bind(&record.note)
            .bind(&record.url)
            .bind(Json(&record.images))
            .bind(source)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
            stored += result.rows_affected();
        }
        tx.commit().await.map_err(storage)?;

        tracing::info!(stored, source, "Stored product batch");
        Ok(SaveReport { stored })
    }

    /// Most recent records of a source, newest first.
    pub async fn recent(&self, source: &str, limit: usize) -> Result<Vec<ProductRecord>, AppError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT brand, name, size, price, note, url, images, source
            FROM products
            WHERE source = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(source)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Number of stored records for a source.
    pub async fn count(&self, source: &str) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE source = $1")
            .bind(source)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.0)
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}

fn storage(e: sqlx::Error) -> AppError {
    AppError::Storage(e.to_string())
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ProductRow {
    brand: String,
    name: String,
    size: String,
    price: String,
    note: String,
    url: String,
    images: Json<Vec<String>>,
    source: String,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        ProductRecord {
            brand: row.brand,
            name: row.name,
            size: row.size,
            price: row.price,
            note: row.note,
            url: row.url,
            images: row.images.0,
            source: row.source,
        }
    }
}

// -- Trait implementation --

impl ProductSink for ProductRepository {
    async fn save(&self, records: &[ProductRecord], source: &str) -> Result<SaveReport, AppError> {
        self.save_batch(records, source).await
    }
}

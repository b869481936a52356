//! # Catalog Reconciliation Engine
//!
//! Applies a batch of upserts and deletions to the `products` table.
//!
//! Every step runs inside a transaction that is rolled back when dropped, so
//! any early return (store error, cancellation, deadline) discards staged
//! work. A step given a parent transaction runs as a savepoint and leaves the
//! final commit to its caller.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Acquire, PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, info};

use crate::domain::{CatalogStore, Product, ProductFilter, ReconcileCounts, StorageError, TaskContext};
use crate::infrastructure::product_query::list_products;
use crate::infrastructure::staging::{
    self, OFFER_IDS_STAGING, PRODUCTS_STAGING, create_offer_ids_staging, create_products_staging,
};

/// Key sets at or above this size are deleted through a staging table
pub const DELETE_STAGING_THRESHOLD: usize = 500;

const PRODUCT_COLUMNS: [&str; 5] = ["merchant_id", "offer_id", "name", "price", "quantity"];

const MERGE_FROM_STAGING: &str = r"
    WITH merged AS
         (INSERT INTO products (merchant_id, offer_id, name, price, quantity)
          SELECT merchant_id, offer_id, name, price, quantity
            FROM products_staging
              ON CONFLICT (merchant_id, offer_id) DO UPDATE
             SET name = EXCLUDED.name,
                 price = EXCLUDED.price,
                 quantity = EXCLUDED.quantity
           WHERE products.name IS DISTINCT FROM EXCLUDED.name
              OR products.price IS DISTINCT FROM EXCLUDED.price
              OR products.quantity IS DISTINCT FROM EXCLUDED.quantity
       RETURNING (xmax = 0) AS inserted)
  SELECT COUNT(*) FILTER (WHERE inserted) AS inserted,
         COUNT(*) FILTER (WHERE NOT inserted) AS updated
    FROM merged";

const DELETE_USING_STAGING: &str = r"
    DELETE FROM products
     USING offer_ids_staging
     WHERE products.merchant_id = $1
       AND products.offer_id = offer_ids_staging.offer_id";

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Stages `products` and merges them into the table.
    ///
    /// Rows whose name, price and quantity already match are skipped and
    /// counted as neither inserted nor updated.
    pub async fn upsert(
        &self,
        ctx: &TaskContext,
        products: &[Product],
        parent: Option<&mut Transaction<'_, Postgres>>,
    ) -> Result<(u64, u64), StorageError> {
        let nested = parent.is_some();
        let rows = dedupe_products(products)?;
        if rows.is_empty() {
            return Ok((0, 0));
        }

        let mut tx = self.begin(parent, "upsert").await?;

        create_products_staging(&mut tx).await?;
        let chunks = staging::encode_products(&rows)?;
        let copied = staging::copy_into(&mut tx, PRODUCTS_STAGING, &PRODUCT_COLUMNS, chunks).await?;
        debug!(copied, "products staged");

        let (inserted, updated): (i64, i64) = sqlx::query_as(MERGE_FROM_STAGING)
            .fetch_one(&mut *tx)
            .await?;

        finish(tx, ctx, nested, "upsert").await?;

        let counts = (to_count(inserted), to_count(updated));
        info!(inserted = counts.0, updated = counts.1, nested, "upsert applied");
        Ok(counts)
    }

    /// Deletes the merchant's `offer_ids`, returns the rows removed
    pub async fn delete(
        &self,
        ctx: &TaskContext,
        merchant_id: i64,
        offer_ids: &[i64],
        parent: Option<&mut Transaction<'_, Postgres>>,
    ) -> Result<u64, StorageError> {
        let nested = parent.is_some();
        if offer_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.begin(parent, "delete").await?;

        let deleted = if offer_ids.len() < DELETE_STAGING_THRESHOLD {
            debug!(keys = offer_ids.len(), "performing values based delete");
            sqlx::query(&values_delete_sql(offer_ids))
                .bind(merchant_id)
                .execute(&mut *tx)
                .await?
                .rows_affected()
        } else {
            debug!(keys = offer_ids.len(), "performing staging table based delete");
            delete_using_staging(&mut tx, merchant_id, offer_ids).await?
        };

        finish(tx, ctx, nested, "delete").await?;

        info!(deleted, nested, "delete applied");
        Ok(deleted)
    }

    /// Upsert and delete in one outer transaction; both or neither commit
    pub async fn upsert_and_delete(
        &self,
        ctx: &TaskContext,
        products: &[Product],
        merchant_id: i64,
        offer_ids: &[i64],
    ) -> Result<ReconcileCounts, StorageError> {
        let mut tx = self.pool.begin().await?;

        let (inserted, updated) = self.upsert(ctx, products, Some(&mut tx)).await?;
        let deleted = self.delete(ctx, merchant_id, offer_ids, Some(&mut tx)).await?;

        finish(tx, ctx, false, "upsert and delete").await?;

        Ok(ReconcileCounts {
            inserted,
            updated,
            deleted,
        })
    }

    async fn begin<'p>(
        &'p self,
        parent: Option<&'p mut Transaction<'_, Postgres>>,
        operation: &'static str,
    ) -> Result<Transaction<'p, Postgres>, sqlx::Error> {
        match parent {
            Some(parent) => {
                debug!(operation, "running as nested transaction");
                parent.begin().await
            }
            None => {
                debug!(operation, "running as stand-alone transaction");
                self.pool.begin().await
            }
        }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn upsert(&self, ctx: &TaskContext, products: &[Product]) -> Result<(u64, u64), StorageError> {
        Self::upsert(self, ctx, products, None).await
    }

    async fn delete(&self, ctx: &TaskContext, merchant_id: i64, offer_ids: &[i64]) -> Result<u64, StorageError> {
        Self::delete(self, ctx, merchant_id, offer_ids, None).await
    }

    async fn upsert_and_delete(
        &self,
        ctx: &TaskContext,
        products: &[Product],
        merchant_id: i64,
        offer_ids: &[i64],
    ) -> Result<ReconcileCounts, StorageError> {
        Self::upsert_and_delete(self, ctx, products, merchant_id, offer_ids).await
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StorageError> {
        list_products(&self.pool, filter).await
    }
}

/// Commits `tx` once the task is still live.
///
/// Nested steps release their savepoint without a liveness check; the outer
/// transaction checks once before its own commit.
async fn finish(
    tx: Transaction<'_, Postgres>,
    ctx: &TaskContext,
    nested: bool,
    operation: &'static str,
) -> Result<(), StorageError> {
    if nested {
        debug!(operation, "releasing nested transaction");
    } else {
        if let Err(reason) = ctx.ensure_alive() {
            info!(operation, %reason, "rolling back instead of committing");
            return Err(reason.into());
        }
        debug!(operation, "committing transaction");
    }
    tx.commit().await?;
    Ok(())
}

async fn delete_using_staging(
    conn: &mut PgConnection,
    merchant_id: i64,
    offer_ids: &[i64],
) -> Result<u64, StorageError> {
    create_offer_ids_staging(conn).await?;
    let chunks = staging::encode_offer_ids(offer_ids)?;
    staging::copy_into(conn, OFFER_IDS_STAGING, &["offer_id"], chunks).await?;

    let result = sqlx::query(DELETE_USING_STAGING)
        .bind(merchant_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// `DELETE` with a literal `VALUES` list; ids are integers so no quoting applies
#[must_use]
pub fn values_delete_sql(offer_ids: &[i64]) -> String {
    let values = offer_ids
        .iter()
        .map(|id| format!("({id})"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "DELETE FROM products WHERE merchant_id = $1 AND offer_id IN (VALUES {values})"
    )
}

/// Validates every record and keeps the last occurrence of each key
fn dedupe_products(products: &[Product]) -> Result<Vec<Product>, StorageError> {
    let mut position: HashMap<(i64, i64), usize> = HashMap::with_capacity(products.len());
    let mut rows: Vec<Product> = Vec::with_capacity(products.len());

    for product in products {
        product.validate()?;
        match position.get(&product.key()) {
            Some(&index) => rows[index] = product.clone(),
            None => {
                position.insert(product.key(), rows.len());
                rows.push(product.clone());
            }
        }
    }

    if rows.len() < products.len() {
        debug!(duplicates = products.len() - rows.len(), "collapsed duplicate keys");
    }
    Ok(rows)
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_values_delete_sql() {
        assert_eq!(
            values_delete_sql(&[3, 1, 2]),
            "DELETE FROM products WHERE merchant_id = $1 AND offer_id IN (VALUES (3), (1), (2))"
        );
        assert_eq!(
            values_delete_sql(&[7]),
            "DELETE FROM products WHERE merchant_id = $1 AND offer_id IN (VALUES (7))"
        );
    }

    #[test]
    fn test_dedupe_keeps_last_occurrence_in_first_position() {
        let first = Product::new(1, 1, "old", Decimal::ONE, 1).unwrap();
        let other = Product::new(1, 2, "other", Decimal::ONE, 1).unwrap();
        let last = Product::new(1, 1, "new", Decimal::TWO, 5).unwrap();

        let rows = dedupe_products(&[first, other.clone(), last.clone()]).unwrap();
        assert_eq!(rows, vec![last, other]);
    }

    #[test]
    fn test_dedupe_rejects_invalid_records() {
        let invalid = Product {
            merchant_id: 1,
            offer_id: 1,
            name: String::new(),
            price: Decimal::ONE,
            quantity: 1,
        };
        let err = dedupe_products(&[invalid]).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }
}

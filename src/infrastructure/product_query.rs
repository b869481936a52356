//! Filtered reads over the `products` table.

use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::domain::{Product, ProductFilter, StorageError};

/// Builds the `SELECT` for `filter`, ANDing only the filters that are present
#[must_use]
pub fn build_list_query(filter: &ProductFilter) -> QueryBuilder<'_, Postgres> {
    let mut query =
        QueryBuilder::new("SELECT merchant_id, offer_id, name, price, quantity FROM products");
    let mut separator = " WHERE ";

    if let Some(merchant_id) = filter.merchant_id {
        query.push(separator).push("merchant_id = ").push_bind(merchant_id);
        separator = " AND ";
    }
    if let Some(offer_id) = filter.offer_id {
        query.push(separator).push("offer_id = ").push_bind(offer_id);
        separator = " AND ";
    }
    if let Some(prefix) = filter.name_prefix.as_deref() {
        query.push(separator).push("starts_with(name, ").push_bind(prefix).push(")");
    }

    query.push(" ORDER BY merchant_id, offer_id");
    query
}

pub async fn list_products(pool: &PgPool, filter: &ProductFilter) -> Result<Vec<Product>, StorageError> {
    let mut query = build_list_query(filter);
    debug!(sql = query.sql(), "listing products");

    let products = query.build_query_as::<Product>().fetch_all(pool).await?;
    Ok(products)
}

//! Bulk loading into transaction-scoped staging tables.
//!
//! Rows are encoded as CSV and streamed with `COPY ... FROM STDIN`. The
//! staging tables are created `ON COMMIT DROP`, so concurrent tasks sharing
//! a table name never see each other's rows.

use sqlx::PgConnection;
use tracing::debug;

use crate::domain::Product;

pub const PRODUCTS_STAGING: &str = "products_staging";
pub const OFFER_IDS_STAGING: &str = "offer_ids_staging";

/// Flush threshold for a single `CopyData` message
const COPY_CHUNK_BYTES: usize = 64 * 1024;

pub async fn create_products_staging(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    debug!("creating products staging table");
    sqlx::query(
        r"CREATE TEMPORARY TABLE products_staging
             (LIKE products
         INCLUDING CONSTRAINTS
         INCLUDING INDEXES)
                ON COMMIT DROP",
    )
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn create_offer_ids_staging(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    debug!("creating offer ids staging table");
    sqlx::query(
        r"CREATE TEMPORARY TABLE offer_ids_staging
             (offer_id BIGINT NOT NULL)
                ON COMMIT DROP",
    )
    .execute(conn)
    .await?;
    Ok(())
}

/// Encodes products as CSV records in staging column order
pub fn encode_products(products: &[Product]) -> Result<Vec<Vec<u8>>, csv::Error> {
    encode_chunks(products.iter().map(|p| {
        [
            p.merchant_id.to_string(),
            p.offer_id.to_string(),
            p.name.clone(),
            p.price.to_string(),
            p.quantity.to_string(),
        ]
    }))
}

pub fn encode_offer_ids(offer_ids: &[i64]) -> Result<Vec<Vec<u8>>, csv::Error> {
    encode_chunks(offer_ids.iter().map(|id| [id.to_string()]))
}

fn encode_chunks<R, I>(records: I) -> Result<Vec<Vec<u8>>, csv::Error>
where
    R: AsRef<[String]>,
    I: Iterator<Item = R>,
{
    let mut chunks = Vec::new();
    let mut writer = new_writer();

    for record in records {
        writer.write_record(record.as_ref())?;
        if writer.get_ref().len() >= COPY_CHUNK_BYTES {
            chunks.push(finish(writer)?);
            writer = new_writer();
        }
    }

    let tail = finish(writer)?;
    if !tail.is_empty() {
        chunks.push(tail);
    }
    Ok(chunks)
}

fn new_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, csv::Error> {
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Streams pre-encoded CSV chunks into `table`, returns rows copied
pub async fn copy_into(
    conn: &mut PgConnection,
    table: &str,
    columns: &[&str],
    chunks: Vec<Vec<u8>>,
) -> Result<u64, sqlx::Error> {
    let statement = format!(
        "COPY {table} ({}) FROM STDIN WITH (FORMAT csv)",
        columns.join(", ")
    );
    debug!(%table, chunks = chunks.len(), "bulk loading staging table");

    let mut copy = conn.copy_in_raw(&statement).await?;
    for chunk in chunks {
        copy.send(chunk).await?;
    }
    copy.finish().await
}

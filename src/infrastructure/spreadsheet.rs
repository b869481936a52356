//! Workbook parsing for catalog uploads
//!
//! The first worksheet is read with calamine. Row 0 is a header; every other
//! row carries `offer_id | name | price | quantity | available`. Available
//! rows become upserts for the uploading merchant, unavailable rows become
//! deletions, and rows failing cell validation are counted as ignored.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use calamine::{Data, Reader, open_workbook_auto};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::debug;

use crate::domain::{CatalogSource, PRICE_SCALE, ParsedCatalog, Product, SourceError};

const OFFER_ID: usize = 0;
const NAME: usize = 1;
const PRICE: usize = 2;
const QUANTITY: usize = 3;
const AVAILABLE: usize = 4;

/// Largest float that still converts to `i64` without losing integer precision
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetSource;

impl SpreadsheetSource {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CatalogSource for SpreadsheetSource {
    async fn load(&self, merchant_id: i64, input: &Path) -> Result<ParsedCatalog, SourceError> {
        let path: PathBuf = input.to_path_buf();
        tokio::task::spawn_blocking(move || read_workbook(merchant_id, &path))
            .await
            .map_err(|e| SourceError::Join(e.to_string()))?
    }
}

pub fn read_workbook(merchant_id: i64, path: &Path) -> Result<ParsedCatalog, SourceError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| SourceError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SourceError::NoWorksheet(path.display().to_string()))?
        .map_err(|e| SourceError::Read(e.to_string()))?;

    debug!(path = %path.display(), rows = range.height(), "reading worksheet");
    Ok(parse_rows(merchant_id, range.rows()))
}

/// Splits worksheet rows (header included) into a reconciliation batch
pub fn parse_rows<'a, I>(merchant_id: i64, rows: I) -> ParsedCatalog
where
    I: IntoIterator<Item = &'a [Data]>,
{
    let mut catalog = ParsedCatalog::default();

    for row in rows.into_iter().skip(1) {
        if row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        catalog.total += 1;

        match parse_row(merchant_id, row) {
            Some(RowAction::Upsert(product)) => catalog.to_upsert.push(product),
            Some(RowAction::Delete(offer_id)) => catalog.to_delete.push(offer_id),
            None => catalog.ignored += 1,
        }
    }

    catalog
}

#[derive(Debug, PartialEq, Eq)]
enum RowAction {
    Upsert(Product),
    Delete(i64),
}

fn parse_row(merchant_id: i64, row: &[Data]) -> Option<RowAction> {
    let cell = |index: usize| row.get(index).unwrap_or(&Data::Empty);

    let offer_id = integer(cell(OFFER_ID))?;
    let name = text(cell(NAME))?;
    let price = decimal(cell(PRICE))?;
    let quantity = integer(cell(QUANTITY))?;
    let available = flag(cell(AVAILABLE))?;

    let product = Product::new(merchant_id, offer_id, name, price, quantity).ok()?;
    if available {
        Some(RowAction::Upsert(product))
    } else {
        Some(RowAction::Delete(product.offer_id))
    }
}

fn integer(cell: &Data) -> Option<i64> {
    match cell {
        Data::Int(value) => Some(*value),
        Data::Float(value) => float_to_integer(*value),
        Data::String(value) => {
            let value = value.trim();
            value
                .parse::<i64>()
                .ok()
                .or_else(|| value.parse::<f64>().ok().and_then(float_to_integer))
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_integer(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_EXACT_FLOAT).then(|| value as i64)
}

fn decimal(cell: &Data) -> Option<Decimal> {
    let value = match cell {
        Data::Int(value) => Decimal::from(*value),
        Data::Float(value) => Decimal::from_f64(*value)?,
        Data::String(value) => Decimal::from_str(value.trim()).ok()?,
        _ => return None,
    };
    Some(value.round_dp(PRICE_SCALE))
}

fn text(cell: &Data) -> Option<String> {
    let value = match cell {
        Data::String(value) => value.trim().to_string(),
        Data::Int(_) | Data::Float(_) => cell.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

fn flag(cell: &Data) -> Option<bool> {
    match cell {
        Data::Bool(value) => Some(*value),
        Data::Int(1) => Some(true),
        Data::Int(0) => Some(false),
        Data::Float(value) if *value == 1.0 => Some(true),
        Data::Float(value) if *value == 0.0 => Some(false),
        Data::String(value) => match value.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

//! Product listing endpoint

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::commands::AppState;
use crate::commands::error::{ApiError, ApiResult};
use crate::commands::parse_positive_id;
use crate::domain::{Product, ProductFilter};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub merchant_id: Option<String>,
    pub offer_id: Option<String>,
    pub name: Option<String>,
}

impl ListParams {
    /// Validates the raw query values; an absent parameter is no filter
    pub fn to_filter(&self) -> ApiResult<ProductFilter> {
        let mut filter = ProductFilter::new();

        if let Some(merchant_id) = parse_positive_id("merchant_id", self.merchant_id.as_deref())? {
            filter = filter.with_merchant_id(merchant_id);
        }
        if let Some(offer_id) = parse_positive_id("offer_id", self.offer_id.as_deref())? {
            filter = filter.with_offer_id(offer_id);
        }
        if let Some(name) = self.name.as_deref() {
            if name.trim().is_empty() {
                return Err(ApiError::bad_request("name must not be blank"));
            }
            filter = filter.with_name_prefix(name);
        }

        Ok(filter)
    }
}

/// `GET /list?merchant_id=&offer_id=&name=`
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Product>>> {
    let filter = params.to_filter()?;
    let products = state.store.list(&filter).await?;
    Ok(Json(products))
}

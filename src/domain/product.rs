//! # Product Value Objects
//!
//! A catalog row is identified by `(merchant_id, offer_id)`. Construction goes
//! through [`Product::new`] so that nothing violating the table constraints
//! ever reaches the store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound of the `name` column (`VARCHAR(200)`), counted in characters.
pub const MAX_NAME_LEN: usize = 200;

/// Digits the `price` column (`NUMERIC(12,2)`) keeps after the point
pub const PRICE_SCALE: u32 = 2;

/// Whole units at which a price no longer fits `NUMERIC(12,2)`
const PRICE_LIMIT_UNITS: i64 = 10_000_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("merchant_id must be greater than zero, got {0}")]
    MerchantId(i64),

    #[error("offer_id must be greater than zero, got {0}")]
    OfferId(i64),

    #[error("name can not be blank")]
    EmptyName,

    #[error("name is {0} characters long, limit is {MAX_NAME_LEN}")]
    NameTooLong(usize),

    #[error("price must be greater than zero, got {0}")]
    Price(Decimal),

    #[error("price {0} does not fit NUMERIC(12,2)")]
    PriceOutOfRange(Decimal),

    #[error("quantity must be greater than zero, got {0}")]
    Quantity(i64),
}

/// One row of the `products` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub merchant_id: i64,
    pub offer_id: i64,
    pub name: String,
    pub price: Decimal,
    pub quantity: i64,
}

impl Product {
    /// Builds a validated product record
    pub fn new(
        merchant_id: i64,
        offer_id: i64,
        name: impl Into<String>,
        price: Decimal,
        quantity: i64,
    ) -> Result<Self, ValidationError> {
        let product = Self {
            merchant_id,
            offer_id,
            name: name.into(),
            price,
            quantity,
        };
        product.validate()?;
        Ok(product)
    }

    /// Checks every column constraint of the `products` table
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.merchant_id <= 0 {
            return Err(ValidationError::MerchantId(self.merchant_id));
        }
        if self.offer_id <= 0 {
            return Err(ValidationError::OfferId(self.offer_id));
        }
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let name_len = self.name.chars().count();
        if name_len > MAX_NAME_LEN {
            return Err(ValidationError::NameTooLong(name_len));
        }
        if self.price <= Decimal::ZERO {
            return Err(ValidationError::Price(self.price));
        }
        if self.price.normalize().scale() > PRICE_SCALE
            || self.price >= Decimal::new(PRICE_LIMIT_UNITS, 0)
        {
            return Err(ValidationError::PriceOutOfRange(self.price));
        }
        if self.quantity <= 0 {
            return Err(ValidationError::Quantity(self.quantity));
        }
        Ok(())
    }

    #[must_use]
    pub const fn key(&self) -> (i64, i64) {
        (self.merchant_id, self.offer_id)
    }
}

/// Independently optional filters for listing products.
///
/// Present filters are combined with AND; an empty filter lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub merchant_id: Option<i64>,
    pub offer_id: Option<i64>,
    pub name_prefix: Option<String>,
}

impl ProductFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_merchant_id(mut self, merchant_id: i64) -> Self {
        self.merchant_id = Some(merchant_id);
        self
    }

    #[must_use]
    pub const fn with_offer_id(mut self, offer_id: i64) -> Self {
        self.offer_id = Some(offer_id);
        self
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.merchant_id.is_none() && self.offer_id.is_none() && self.name_prefix.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn price(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_valid_product() {
        let product = Product::new(1, 42, "Kettle", price("19.99"), 3).unwrap();
        assert_eq!(product.key(), (1, 42));
    }

    #[rstest]
    #[case(0, 1, "a", "1", 1, ValidationError::MerchantId(0))]
    #[case(1, -5, "a", "1", 1, ValidationError::OfferId(-5))]
    #[case(1, 1, "", "1", 1, ValidationError::EmptyName)]
    #[case(1, 1, "a", "0", 1, ValidationError::Price(Decimal::ZERO))]
    #[case(1, 1, "a", "0.001", 1, ValidationError::PriceOutOfRange(price("0.001")))]
    #[case(1, 1, "a", "12.345", 1, ValidationError::PriceOutOfRange(price("12.345")))]
    #[case(1, 1, "a", "10000000000", 1, ValidationError::PriceOutOfRange(price("10000000000")))]
    #[case(1, 1, "a", "1", 0, ValidationError::Quantity(0))]
    fn test_invalid_product(
        #[case] merchant_id: i64,
        #[case] offer_id: i64,
        #[case] name: &str,
        #[case] raw_price: &str,
        #[case] quantity: i64,
        #[case] expected: ValidationError,
    ) {
        let err = Product::new(merchant_id, offer_id, name, price(raw_price), quantity).unwrap_err();
        assert_eq!(err, expected);
    }

    #[test]
    fn test_name_length_counts_characters() {
        let exact = "é".repeat(MAX_NAME_LEN);
        assert!(Product::new(1, 1, exact, price("1"), 1).is_ok());

        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert_eq!(
            Product::new(1, 1, long, price("1"), 1).unwrap_err(),
            ValidationError::NameTooLong(MAX_NAME_LEN + 1)
        );
    }

    #[test]
    fn test_price_bounds_follow_the_column() {
        assert!(Product::new(1, 1, "a", price("9999999999.99"), 1).is_ok());
        assert!(Product::new(1, 1, "a", price("0.01"), 1).is_ok());
        // trailing zeros do not count against the scale
        assert!(Product::new(1, 1, "a", price("19.9900"), 1).is_ok());
    }

    #[test]
    fn test_filter_builder() {
        assert!(ProductFilter::new().is_empty());
        let filter = ProductFilter::new().with_merchant_id(7).with_name_prefix("Tea");
        assert!(!filter.is_empty());
        assert_eq!(filter.merchant_id, Some(7));
        assert_eq!(filter.offer_id, None);
    }

    proptest! {
        #[test]
        fn prop_positive_fields_always_validate(
            merchant_id in 1i64..i64::MAX,
            offer_id in 1i64..i64::MAX,
            cents in 1i64..1_000_000_000,
            quantity in 1i64..i64::MAX,
            name in "[a-zA-Z0-9 ]{1,200}",
        ) {
            let product = Product::new(merchant_id, offer_id, name, Decimal::new(cents, 2), quantity);
            prop_assert!(product.is_ok());
        }

        #[test]
        fn prop_non_positive_quantity_is_rejected(quantity in i64::MIN..=0) {
            let result = Product::new(1, 1, "a", Decimal::ONE, quantity);
            prop_assert_eq!(result.unwrap_err(), ValidationError::Quantity(quantity));
        }
    }
}

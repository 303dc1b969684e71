use serde::{Deserialize, Serialize};

/// One dataset row reduced to the two columns the statistics need.
///
/// Cells that do not parse as a finite number are `None`: rows without a price
/// are skipped by the worker, a missing quantity counts as zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SaleRecord {
    pub price: Option<f64>,
    pub quantity: Option<f64>,
}

impl SaleRecord {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self {
            price: Some(price),
            quantity: Some(quantity),
        }
    }
}

/// Candidate header names for the price and quantity columns, tried in order
/// and compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAliases {
    pub price: Vec<String>,
    pub quantity: Vec<String>,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            price: vec!["price".into(), "unitprice".into(), "unit_price".into()],
            quantity: vec!["quantity".into(), "qty".into(), "units".into()],
        }
    }
}

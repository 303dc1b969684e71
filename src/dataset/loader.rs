use super::Dataset;
use super::types::{ColumnAliases, SaleRecord};
use crate::error::ConfigError;
use crate::planner::RowRange;

use std::io::Read;
use std::path::Path;

/// Fully materialised dataset.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    records: Vec<SaleRecord>,
}

impl InMemoryDataset {
    pub fn new(records: Vec<SaleRecord>) -> Self {
        Self { records }
    }

    /// Every row gets quantity 1.
    pub fn from_prices(prices: impl IntoIterator<Item = f64>) -> Self {
        Self::new(
            prices
                .into_iter()
                .map(|price| SaleRecord::new(price, 1.0))
                .collect(),
        )
    }

    pub fn records(&self) -> &[SaleRecord] {
        &self.records
    }
}

impl Dataset for InMemoryDataset {
    fn row_count(&self) -> u64 {
        self.records.len() as u64
    }

    fn slice(&self, range: RowRange) -> Vec<SaleRecord> {
        let len = self.records.len();
        let start = (range.start as usize).min(len);
        let end = (range.end as usize).clamp(start, len);
        self.records[start..end].to_vec()
    }
}

/// Finds the price and quantity column indices among `headers`.
pub fn resolve_columns(
    headers: &[String],
    aliases: &ColumnAliases,
) -> Result<(usize, usize), ConfigError> {
    let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    let find = |role: &'static str, candidates: &[String]| {
        candidates
            .iter()
            .find_map(|candidate| {
                let candidate = candidate.trim().to_lowercase();
                normalized.iter().position(|header| *header == candidate)
            })
            .ok_or_else(|| ConfigError::MissingColumn {
                role,
                available: headers.to_vec(),
            })
    };

    Ok((find("price", &aliases.price)?, find("quantity", &aliases.quantity)?))
}

pub fn load_csv(path: &Path, aliases: &ColumnAliases) -> Result<InMemoryDataset, ConfigError> {
    let file = std::fs::File::open(path)
        .map_err(|e| ConfigError::Dataset(format!("{}: {}", path.display(), e)))?;
    load_csv_reader(file, aliases)
}

pub fn load_csv_reader<R: Read>(
    reader: R,
    aliases: &ColumnAliases,
) -> Result<InMemoryDataset, ConfigError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ConfigError::Dataset(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    let (price_idx, quantity_idx) = resolve_columns(&headers, aliases)?;

    tracing::info!(
        "Using column '{}' for price and '{}' for quantity",
        headers[price_idx],
        headers[quantity_idx]
    );

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| ConfigError::Dataset(e.to_string()))?;
        records.push(SaleRecord {
            price: parse_cell(row.get(price_idx)),
            quantity: parse_cell(row.get(quantity_idx)),
        });
    }

    Ok(InMemoryDataset::new(records))
}

fn parse_cell(cell: Option<&str>) -> Option<f64> {
    cell?.parse::<f64>().ok().filter(|value| value.is_finite())
}

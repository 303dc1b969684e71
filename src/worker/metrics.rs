use crate::dataset::SaleRecord;
use crate::store::ChunkMetrics;

/// Statistics over the rows that have a price.
///
/// A missing quantity counts as zero sales but the row still counts. With no
/// priced rows every field is zero.
pub fn compute_metrics(records: &[SaleRecord]) -> ChunkMetrics {
    let mut rows_processed = 0u64;
    let mut total_sales = 0.0f64;
    let mut price_sum = 0.0f64;
    let mut min_price = f64::INFINITY;
    let mut max_price = f64::NEG_INFINITY;

    for record in records {
        let Some(price) = record.price else {
            continue;
        };
        rows_processed += 1;
        total_sales += price * record.quantity.unwrap_or(0.0);
        price_sum += price;
        min_price = min_price.min(price);
        max_price = max_price.max(price);
    }

    if rows_processed == 0 {
        return ChunkMetrics {
            rows_processed: 0,
            total_sales: 0.0,
            min_price: 0.0,
            max_price: 0.0,
            avg_price: 0.0,
        };
    }

    ChunkMetrics {
        rows_processed,
        total_sales,
        min_price,
        max_price,
        avg_price: price_sum / rows_processed as f64,
    }
}

//! Dataset Tests
//!
//! Column alias resolution and CSV coercion rules.

#[cfg(test)]
mod tests {
    use crate::dataset::{
        ColumnAliases, Dataset, InMemoryDataset, SaleRecord, load_csv, load_csv_reader,
        resolve_columns,
    };
    use crate::error::ConfigError;
    use crate::planner::RowRange;
    use std::io::Write;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let (price, qty) = resolve_columns(
            &headers(&["InvoiceNo", "UnitPrice", "Quantity"]),
            &ColumnAliases::default(),
        )
        .unwrap();

        assert_eq!(price, 1);
        assert_eq!(qty, 2);
    }

    #[test]
    fn test_resolve_follows_alias_order() {
        // Both "price" and "unit_price" exist; "price" is listed first.
        let (price, _) = resolve_columns(
            &headers(&["unit_price", "Price", "qty"]),
            &ColumnAliases::default(),
        )
        .unwrap();

        assert_eq!(price, 1);
    }

    #[test]
    fn test_custom_aliases() {
        let aliases = ColumnAliases {
            price: vec!["Cost".into()],
            quantity: vec!["Amount".into()],
        };

        let (price, qty) = resolve_columns(&headers(&["amount", "COST"]), &aliases).unwrap();

        assert_eq!((price, qty), (1, 0));
    }

    #[test]
    fn test_missing_column_is_config_error() {
        let result = resolve_columns(&headers(&["price", "sku"]), &ColumnAliases::default());

        match result {
            Err(ConfigError::MissingColumn { role, available }) => {
                assert_eq!(role, "quantity");
                assert_eq!(available, headers(&["price", "sku"]));
            }
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_csv_coerces_bad_cells_to_none() {
        let csv = "Price,Qty\n2.5,4\nabc,1\n3.0,\n";

        let dataset = load_csv_reader(csv.as_bytes(), &ColumnAliases::default()).unwrap();

        assert_eq!(dataset.row_count(), 3);
        assert_eq!(dataset.records()[0], SaleRecord::new(2.5, 4.0));
        assert_eq!(dataset.records()[1].price, None);
        assert_eq!(
            dataset.records()[2],
            SaleRecord {
                price: Some(3.0),
                quantity: None
            }
        );
    }

    #[test]
    fn test_load_csv_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,unit_price,units").unwrap();
        for i in 1..=10 {
            writeln!(file, "{},{},2", i, i).unwrap();
        }

        let dataset = load_csv(file.path(), &ColumnAliases::default()).unwrap();

        assert_eq!(dataset.row_count(), 10);
        assert_eq!(dataset.records()[9], SaleRecord::new(10.0, 2.0));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = load_csv(
            std::path::Path::new("/definitely/not/here.csv"),
            &ColumnAliases::default(),
        );

        assert!(matches!(result, Err(ConfigError::Dataset(_))));
    }

    #[test]
    fn test_slice_is_clamped() {
        let dataset = InMemoryDataset::from_prices((1..=5).map(f64::from));

        let tail = dataset.slice(RowRange { start: 3, end: 99 });
        let outside = dataset.slice(RowRange { start: 10, end: 12 });

        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].price, Some(4.0));
        assert!(outside.is_empty());
    }
}

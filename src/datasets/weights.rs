//! Product weight reference table.
//!
//! SKU -> expected unit weight in grams, loaded once from the products CSV
//! and read-only thereafter. Malformed rows are skipped; a missing file
//! yields an empty table so the weight-discrepancy rule simply never fires.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

/// Read-only SKU -> expected grams mapping shared by all stations.
#[derive(Debug, Clone, Default)]
pub struct ProductWeightTable {
    weights: HashMap<String, f64>,
}

impl ProductWeightTable {
    /// Load the table from a CSV with headers.
    ///
    /// Key column: `SKU` or `sku`. Weight column: `weight_g`, `Weight`, or
    /// `weight`. Rows missing either, or with an unparsable weight, are
    /// silently ignored.
    pub fn load(path: &Path) -> Self {
        let mut reader = match csv::Reader::from_path(path) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Product weight table unavailable");
                return Self::default();
            }
        };

        let headers = match reader.headers() {
            Ok(h) => h.clone(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Product weight table has no headers");
                return Self::default();
            }
        };

        let sku_col = column_index(&headers, &["SKU", "sku"]);
        let weight_col = column_index(&headers, &["weight_g", "Weight", "weight"]);
        let (sku_col, weight_col) = match (sku_col, weight_col) {
            (Some(s), Some(w)) => (s, w),
            _ => {
                warn!(path = %path.display(), "Product weight table missing SKU/weight columns");
                return Self::default();
            }
        };

        let mut weights = HashMap::new();
        for record in reader.records().flatten() {
            let sku = record.get(sku_col).unwrap_or("").trim();
            let raw_weight = record.get(weight_col).unwrap_or("").trim();
            if sku.is_empty() {
                continue;
            }
            if let Ok(grams) = raw_weight.parse::<f64>() {
                weights.insert(sku.to_string(), grams);
            }
        }

        Self { weights }
    }

    pub fn expected_grams(&self, sku: &str) -> Option<f64> {
        self.weights.get(sku).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        Self {
            weights: pairs
                .iter()
                .map(|(sku, grams)| (sku.to_string(), *grams))
                .collect(),
        }
    }
}

fn column_index(headers: &csv::StringRecord, candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.contains(&h.trim()))
}

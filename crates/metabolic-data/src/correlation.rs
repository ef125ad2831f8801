//! Pairwise Pearson correlation over the numeric columns of a feature table.

use metabolic_core::matrix::{CorrelationEdge, CorrelationMatrix};
use metabolic_core::stats::{has_variance, pearson};
use metabolic_core::table::FeatureTable;
use metabolic_core::Result;
use tracing::debug;

/// Square correlation matrix of every numeric column.
///
/// The `Date` column and categorical columns are ignored. Each pair uses
/// only the rows where both values are present; degenerate pairs are `NaN`.
pub fn corr_matrix(table: &FeatureTable) -> Result<CorrelationMatrix> {
    let columns: Vec<(&str, &[f64])> = table.numeric_columns().collect();
    let n = columns.len();
    let mut values = vec![f64::NAN; n * n];

    for i in 0..n {
        let (_, xs) = columns[i];
        values[i * n + i] = if has_variance(xs) { 1.0 } else { f64::NAN };
        for j in (i + 1)..n {
            let r = pearson(xs, columns[j].1);
            values[i * n + j] = r;
            values[j * n + i] = r;
        }
    }

    debug!("Correlation matrix over {} columns, {} rows", n, table.len());
    let labels = columns.iter().map(|(name, _)| name.to_string()).collect();
    CorrelationMatrix::new(labels, values)
}

/// [`corr_matrix`] in long form, one edge per `(x, y)` pair.
pub fn corr_matrix_long(table: &FeatureTable) -> Result<Vec<CorrelationEdge>> {
    Ok(corr_matrix(table)?.to_long())
}

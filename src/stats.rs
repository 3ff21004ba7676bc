use ndarray::ArrayView1;
use num_traits::Float;
use tracing::{debug, warn};

use crate::error::{Result, TargetEncodingError};
use crate::frame::Frame;
use crate::group::{group_by, Aggregation, NaPolicy};

pub const NUMERATOR_COL: &str = "numerator";
pub const DENOMINATOR_COL: &str = "denominator";

pub(crate) trait SummaryStatistics<T: Float> {
    /// Sum of the non-missing values.
    fn nan_sum(&self) -> T;
    fn valid_len(&self) -> usize;
}

impl<'a, T: Float> SummaryStatistics<T> for ArrayView1<'a, T> {
    fn nan_sum(&self) -> T {
        self.iter().filter(|x| !x.is_nan()).fold(T::zero(), |acc, &x| acc + x)
    }

    fn valid_len(&self) -> usize {
        self.iter().filter(|x| !x.is_nan()).count()
    }
}

/// Locates the numerator column and checks the denominator sits right after it.
pub(crate) fn statistics_columns(frame: &Frame, op: &'static str) -> Result<(usize, usize)> {
    let numerator = frame.find_required(op, NUMERATOR_COL)?;
    let denominator = frame.find_required(op, DENOMINATOR_COL)?;
    if denominator != numerator + 1 {
        return Err(TargetEncodingError::InvalidParameter {
            op,
            reason: format!(
                "`{}` must immediately follow `{}` (found at {} and {})",
                DENOMINATOR_COL, NUMERATOR_COL, denominator, numerator
            ),
        });
    }
    frame.numeric(op, numerator)?;
    frame.numeric(op, denominator)?;
    Ok((numerator, denominator))
}

/// Groups rows by the encoded column (and the fold column, if any) and
/// aggregates the target into `numerator` (sum) and `denominator` (count of
/// non-missing targets).
///
/// The result has columns `[category, (fold,) numerator, denominator]`.
pub fn build_statistics(frame: &Frame, column_to_encode: usize, target: usize, fold: Option<usize>) -> Result<Frame> {
    const OP: &str = "build_statistics";
    frame.col(OP, column_to_encode)?;
    frame.numeric(OP, target)?;
    let keys = match fold {
        Some(fold) => {
            frame.numeric(OP, fold)?;
            vec![column_to_encode, fold]
        }
        None => vec![column_to_encode],
    };
    let aggs = [
        Aggregation::sum(target, NaPolicy::Ignore, NUMERATOR_COL),
        Aggregation::count(target, NaPolicy::Ignore, DENOMINATOR_COL),
    ];
    let stats = group_by(frame, &keys, &aggs)?;
    debug!(
        column = column_to_encode,
        target,
        folds = fold.is_some(),
        groups = stats.nrows(),
        "built encoding statistics"
    );
    Ok(stats)
}

/// Sums a fold-partitioned statistics table down to one row per category.
/// Without folds the table already has that shape and an independent copy is
/// returned.
pub fn collapse_folds(stats: &Frame, category: usize, has_folds: bool) -> Result<Frame> {
    const OP: &str = "collapse_folds";
    let (numerator, denominator) = statistics_columns(stats, OP)?;
    if !has_folds {
        return Ok(stats.clone());
    }
    let aggs = [
        Aggregation::sum(numerator, NaPolicy::Ignore, NUMERATOR_COL),
        Aggregation::sum(denominator, NaPolicy::Ignore, DENOMINATOR_COL),
    ];
    group_by(stats, &[category], &aggs)
}

/// Ratio of the total numerator to the total denominator of a statistics
/// table. `NaN` when the table is empty or has no support.
pub fn compute_prior_mean(stats: &Frame) -> Result<f64> {
    const OP: &str = "compute_prior_mean";
    let (numerator, denominator) = statistics_columns(stats, OP)?;
    let num = ArrayView1::from(stats.numeric(OP, numerator)?);
    let den = ArrayView1::from(stats.numeric(OP, denominator)?);
    let total = den.nan_sum();
    if den.valid_len() == 0 || total == 0.0 {
        warn!(groups = stats.nrows(), "prior mean is undefined for a table without support");
        return Ok(f64::NAN);
    }
    Ok(num.nan_sum() / total)
}

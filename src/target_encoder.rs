use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TargetEncodingError};
use crate::frame::{Column, Frame};
use crate::stats::statistics_columns;

pub const ENCODED_COLUMN_POSTFIX: &str = "_te";
pub const NA_POSTFIX: &str = "_NA";

pub fn encoded_column_name(column: &str) -> String {
    format!("{}{}", column, ENCODED_COLUMN_POSTFIX)
}

pub fn na_category_label(column: &str) -> String {
    format!("{}{}", column, NA_POSTFIX)
}

/// Parameters of the logistic shrinkage `lambda(n) = 1 / (1 + exp((k - n) / f))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendingParams {
    inflection_point: f64,
    smoothing: f64,
}

pub const DEFAULT_BLENDING_PARAMS: BlendingParams = BlendingParams {
    inflection_point: 10.,
    smoothing: 20.,
};

impl BlendingParams {
    pub fn new(inflection_point: f64, smoothing: f64) -> Result<Self> {
        for (name, value) in [("inflection_point", inflection_point), ("smoothing", smoothing)] {
            if !(value.is_finite() && value > 0.) {
                return Err(TargetEncodingError::InvalidParameter {
                    op: "blending_params",
                    reason: format!("{} must be a positive number, got {}", name, value),
                });
            }
        }
        Ok(BlendingParams {
            inflection_point,
            smoothing,
        })
    }

    pub fn inflection_point(&self) -> f64 {
        self.inflection_point
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }
}

impl Default for BlendingParams {
    fn default() -> Self {
        DEFAULT_BLENDING_PARAMS
    }
}

/// Shrinks the posterior mean of a category with `n_rows` rows toward the prior.
/// The same formula serves classification and regression targets.
pub fn blended_value(posterior_mean: f64, prior_mean: f64, n_rows: f64, params: &BlendingParams) -> f64 {
    let lambda = 1.0 / (1.0 + ((params.inflection_point - n_rows) / params.smoothing).exp());
    lambda * posterior_mean + (1.0 - lambda) * prior_mean
}

/// Encoded value of one row. Missing statistics give a missing value, a zero
/// denominator falls back to the prior mean.
pub fn encode_value(numerator: f64, denominator: f64, prior_mean: f64, blending: Option<&BlendingParams>) -> f64 {
    if numerator.is_nan() || denominator.is_nan() {
        return f64::NAN;
    }
    if denominator == 0.0 {
        return prior_mean;
    }
    let posterior_mean = numerator / denominator;
    match blending {
        Some(params) => blended_value(posterior_mean, prior_mean, denominator, params),
        None => posterior_mean,
    }
}

/// Computes the encoded value of every row from the merged `numerator` and
/// `denominator` columns and appends it as `new_column`. Blending is applied
/// iff `blending` is given.
///
/// Returns the index of the new column.
pub fn apply_blended_encoding(
    frame: &mut Frame,
    new_column: &str,
    prior_mean: f64,
    blending: Option<&BlendingParams>,
) -> Result<usize> {
    const OP: &str = "apply_blended_encoding";
    let (num_idx, den_idx) = statistics_columns(frame, OP)?;
    if frame.find(new_column).is_some() {
        return Err(TargetEncodingError::DuplicateColumn {
            name: new_column.to_owned(),
        });
    }
    let encoded_idx = frame.ncols();
    let num = frame.numeric(OP, num_idx)?;
    let den = frame.numeric(OP, den_idx)?;
    let encoded = frame.map_partitions(|rows, out: &mut [f64]| {
        let mut zero_denominators = 0usize;
        for (o, row) in out.iter_mut().zip(rows) {
            if den[row] == 0.0 && !num[row].is_nan() {
                zero_denominators += 1;
            }
            *o = encode_value(num[row], den[row], prior_mean, blending);
        }
        if zero_denominators > 0 {
            debug!(
                column = encoded_idx,
                prior_mean,
                rows = zero_denominators,
                "denominator is zero, imputing with prior mean"
            );
        }
        Ok(())
    })?;
    frame.add_column(Column::numeric(new_column, encoded))
}

/// Removes every row's own target from its merged statistics: for each row
/// with a target, `numerator -= target` and `denominator -= 1`. Rows without a
/// target are left as they are.
pub fn subtract_leave_one_out(frame: &mut Frame, target_column: &str) -> Result<()> {
    const OP: &str = "subtract_leave_one_out";
    let (num_idx, den_idx) = statistics_columns(frame, OP)?;
    let target_idx = frame.find_required(OP, target_column)?;
    let target = frame.numeric(OP, target_idx)?;
    let num = frame.numeric(OP, num_idx)?;
    let den = frame.numeric(OP, den_idx)?;
    let adjusted = frame.map_partitions(|rows, out: &mut [(f64, f64)]| {
        for (o, row) in out.iter_mut().zip(rows) {
            *o = if target[row].is_nan() {
                (num[row], den[row])
            } else {
                (num[row] - target[row], den[row] - 1.0)
            };
        }
        Ok(())
    })?;
    let (num, den): (Vec<f64>, Vec<f64>) = adjusted.into_iter().unzip();
    frame.replace_numeric(OP, num_idx, num)?;
    frame.replace_numeric(OP, den_idx, den)
}

/// Replaces missing codes of a categorical column with a dedicated
/// `na_category` level. The level is appended to the domain only when some
/// row was imputed; an existing level with that label is reused.
///
/// Returns whether any row was imputed.
pub fn impute_categorical_column(frame: &mut Frame, column: usize, na_category: &str) -> Result<bool> {
    const OP: &str = "impute_categorical_column";
    let col = frame.col(OP, column)?;
    let (codes, domain) = match (col.codes(), col.domain()) {
        (Some(codes), Some(domain)) => (codes, domain),
        _ => return Err(TargetEncodingError::NotCategorical { op: OP, index: column }),
    };
    let existing = domain.iter().position(|l| l == na_category);
    let na_code = existing.unwrap_or(domain.len());
    let na_code = u32::try_from(na_code).map_err(|_| TargetEncodingError::UniqueValuesOverflow {
        op: OP,
        index: column,
        count: na_code + 1,
    })?;
    if !codes.iter().any(Option::is_none) {
        return Ok(false);
    }
    let imputed = frame.map_partitions(|rows, out: &mut [Option<u32>]| {
        for (o, row) in out.iter_mut().zip(rows) {
            *o = Some(codes[row].unwrap_or(na_code));
        }
        Ok(())
    })?;
    if existing.is_none() {
        let mut new_domain = domain.to_vec();
        new_domain.push(na_category.to_owned());
        frame.set_domain(column, new_domain)?;
    }
    frame.replace_codes(OP, column, imputed)?;
    debug!(column, na_category, "imputed missing categories");
    Ok(true)
}

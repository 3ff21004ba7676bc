//! Uniform jitter for encoded columns.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TargetEncodingError};
use crate::frame::Frame;
use crate::utils::{random_seed, row_stream, RowStream};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub level: f64,
    /// Seed of the per-row random stream. A random seed is picked when absent.
    pub seed: Option<u64>,
}

impl NoiseConfig {
    pub fn apply(&self, frame: &mut Frame, column: usize) -> Result<u64> {
        inject_noise(frame, column, self.level, self.seed)
    }
}

/// Adds `u * 2 * level - level`, with `u` uniform in `[0, 1)`, to every
/// non-missing value of `column`, in place.
///
/// Row `r` always draws the `r`-th value of the stream seeded by `seed`, so a
/// given seed yields the same column regardless of partitioning. Returns the
/// seed used.
pub fn inject_noise(frame: &mut Frame, column: usize, level: f64, seed: Option<u64>) -> Result<u64> {
    const OP: &str = "inject_noise";
    if !(level.is_finite() && level >= 0.) {
        return Err(TargetEncodingError::InvalidParameter {
            op: OP,
            reason: format!("noise level must be a non-negative number, got {}", level),
        });
    }
    let values = frame.numeric(OP, column)?;
    let seed = seed.unwrap_or_else(random_seed);
    let noisy = frame.map_partitions(|rows, out: &mut [f64]| {
        let mut rng = row_stream(seed, RowStream::Noise, rows.start);
        for (o, row) in out.iter_mut().zip(rows) {
            let u: f64 = rng.gen();
            let v = values[row];
            *o = if v.is_nan() { v } else { v + (u * 2. * level - level) };
        }
        Ok(())
    })?;
    frame.replace_numeric(OP, column, noisy)?;
    debug!(column, level, seed, "added noise");
    Ok(seed)
}

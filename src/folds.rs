use rand::Rng;
use tracing::debug;

use crate::error::{Result, TargetEncodingError};
use crate::frame::{Column, Frame};
use crate::utils::{random_seed, row_stream, RowStream};

/// Appends a column of fold ids in `[0, nfolds)` and returns its index.
///
/// Every row draws its fold from its own position in a seeded stream, so the
/// assignment does not depend on how the frame is partitioned. Without a seed
/// a random one is picked.
pub fn add_kfold_column(frame: &mut Frame, name: &str, nfolds: u32, seed: Option<u64>) -> Result<usize> {
    const OP: &str = "add_kfold_column";
    if nfolds == 0 {
        return Err(TargetEncodingError::InvalidParameter {
            op: OP,
            reason: "nfolds must be positive".into(),
        });
    }
    if frame.find(name).is_some() {
        return Err(TargetEncodingError::DuplicateColumn { name: name.to_owned() });
    }
    let seed = seed.unwrap_or_else(random_seed);
    let folds = frame.map_partitions(|rows, out: &mut [f64]| {
        let mut rng = row_stream(seed, RowStream::Folds, rows.start);
        for o in out.iter_mut() {
            let u: f64 = rng.gen();
            *o = ((u * f64::from(nfolds)) as u32).min(nfolds - 1) as f64;
        }
        Ok(())
    })?;
    debug!(nfolds, seed, rows = frame.nrows(), "assigned folds");
    frame.add_column(Column::numeric(name, folds))
}

//! Row-level relational helpers: row-bind, filtering, constant columns.

use fnv::FnvHashMap;
use tracing::debug;

use crate::error::{Result, TargetEncodingError};
use crate::frame::{Column, ColumnData, Frame};

/// Stacks `bottom` under `top`. Both frames must have the same column names
/// and kinds. Categorical domains are unioned by label, `top`'s labels first.
pub fn rbind(top: &Frame, bottom: &Frame) -> Result<Frame> {
    const OP: &str = "rbind";
    if top.ncols() != bottom.ncols() {
        return Err(TargetEncodingError::InvalidParameter {
            op: OP,
            reason: format!("column count mismatch: {} vs {}", top.ncols(), bottom.ncols()),
        });
    }
    let mut columns = Vec::with_capacity(top.ncols());
    for (index, (a, b)) in top.columns().iter().zip(bottom.columns()).enumerate() {
        if a.name() != b.name() {
            return Err(TargetEncodingError::ColumnNotFound {
                op: OP,
                name: a.name().to_owned(),
            });
        }
        let column = match (a.data(), b.data()) {
            (ColumnData::Numeric(x), ColumnData::Numeric(y)) => {
                Column::numeric(a.name(), x.iter().chain(y).copied().collect())
            }
            (
                ColumnData::Categorical { codes: x, domain: dx },
                ColumnData::Categorical { codes: y, domain: dy },
            ) => {
                let mut domain = dx.clone();
                let mut lookup: FnvHashMap<&str, u32> = dx
                    .iter()
                    .enumerate()
                    .map(|(code, label)| (label.as_str(), code as u32))
                    .collect();
                let remap: Vec<u32> = dy
                    .iter()
                    .map(|label| {
                        *lookup.entry(label.as_str()).or_insert_with(|| {
                            domain.push(label.clone());
                            (domain.len() - 1) as u32
                        })
                    })
                    .collect();
                let codes = x
                    .iter()
                    .copied()
                    .chain(y.iter().map(|c| c.map(|c| remap[c as usize])))
                    .collect();
                Column::categorical(a.name(), codes, domain)
            }
            (ColumnData::Numeric(_), _) => return Err(TargetEncodingError::NotNumeric { op: OP, index }),
            (ColumnData::Categorical { .. }, _) => {
                return Err(TargetEncodingError::NotCategorical { op: OP, index })
            }
        };
        columns.push(column);
    }
    Ok(Frame::new(columns)?.with_partition_len(top.partition_len()))
}

/// Keeps the rows for which `predicate` holds.
pub fn filter_by_predicate<P>(frame: &Frame, predicate: P) -> Result<Frame>
where
    P: Fn(usize) -> bool + Sync,
{
    let keep: Vec<bool> = frame.map_partitions(|rows, out| {
        for (o, row) in out.iter_mut().zip(rows) {
            *o = predicate(row);
        }
        Ok(())
    })?;
    let rows: Vec<usize> = keep.iter().enumerate().filter(|(_, k)| **k).map(|(r, _)| r).collect();
    debug!(rows = frame.nrows(), kept = rows.len(), "filtered frame");
    Ok(frame.take_rows(&rows))
}

/// Drops the rows with a missing value in `column`.
pub fn filter_out_nas(frame: &Frame, column: usize) -> Result<Frame> {
    let col = frame.col("filter_out_nas", column)?;
    filter_by_predicate(frame, |row| !col.is_na(row))
}

/// Keeps the rows whose value in `column` equals `value`. Categorical columns
/// compare their codes.
pub fn filter_by_value(frame: &Frame, column: usize, value: f64) -> Result<Frame> {
    let col = frame.col("filter_by_value", column)?;
    filter_by_predicate(frame, |row| col.value(row) == Some(value))
}

/// Keeps every row except those whose value in `column` equals `value`. Rows
/// with a missing value are kept.
pub fn filter_not_by_value(frame: &Frame, column: usize, value: f64) -> Result<Frame> {
    let col = frame.col("filter_not_by_value", column)?;
    filter_by_predicate(frame, |row| col.value(row) != Some(value))
}

/// Appends a numeric column holding `value` on every row.
pub fn add_constant_column(frame: &mut Frame, name: &str, value: f64) -> Result<usize> {
    frame.add_column(Column::numeric(name, vec![value; frame.nrows()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(vec![
            Column::from_labels("cat", &[Some("a"), Some("b"), None, Some("a")]),
            Column::numeric("fold", vec![0., 1., 1., f64::NAN]),
        ])
        .unwrap()
        .with_partition_len(3)
    }

    #[test]
    fn test_rbind_unions_domains() {
        let top = frame();
        let bottom = Frame::new(vec![
            Column::from_labels("cat", &[Some("c"), Some("a")]),
            Column::numeric("fold", vec![2., 0.]),
        ])
        .unwrap();
        let out = rbind(&top, &bottom).unwrap();
        assert_eq!(out.nrows(), 6);
        let cat = out.column(0).unwrap();
        assert_eq!(cat.domain().unwrap(), &["a", "b", "c"]);
        assert_eq!(cat.label(4), Some("c"));
        assert_eq!(cat.label(5), Some("a"));
        assert_eq!(out.column(1).unwrap().value(4), Some(2.));
    }

    #[test]
    fn test_rbind_rejects_schema_mismatch() {
        let top = frame();
        let bottom = Frame::new(vec![Column::numeric("cat", vec![1.]), Column::numeric("fold", vec![1.])]).unwrap();
        assert_eq!(
            rbind(&top, &bottom).unwrap_err(),
            TargetEncodingError::NotCategorical { op: "rbind", index: 0 }
        );
    }

    #[test]
    fn test_filters() {
        let fr = frame();
        let no_na = filter_out_nas(&fr, 0).unwrap();
        assert_eq!(no_na.nrows(), 3);

        let fold1 = filter_by_value(&fr, 1, 1.).unwrap();
        assert_eq!(fold1.nrows(), 2);

        let not_fold1 = filter_not_by_value(&fr, 1, 1.).unwrap();
        assert_eq!(not_fold1.nrows(), 2);
        assert!(not_fold1.column(1).unwrap().is_na(1));

        let by_code = filter_by_value(&fr, 0, 0.).unwrap();
        assert_eq!(by_code.nrows(), 2);
    }

    #[test]
    fn test_add_constant_column() {
        let mut fr = frame();
        let idx = add_constant_column(&mut fr, "one", 1.).unwrap();
        assert_eq!(fr.column(idx).unwrap().as_numeric().unwrap(), &[1.; 4]);
    }
}

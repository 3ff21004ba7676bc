//! Group-by with sum and row-count aggregations.
//!
//! Partitions are grouped independently into `FnvHashMap` partials on the
//! rayon pool. The partials are then merged one by one in partition order, so
//! float sums only depend on the partitioning and never on how the pool split
//! the work. The output has one row per
//! distinct key, keys sorted ascending. Rows with a missing value in any key
//! column do not belong to any group.

use fnv::FnvHashMap;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{Result, TargetEncodingError};
use crate::frame::{Column, ColumnData, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Sum,
    Count,
}

/// How missing inputs affect an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaPolicy {
    /// Skip missing inputs. A sum over no valid input is missing.
    Ignore,
    /// A sum with any missing input is missing; a count counts every row.
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub kind: AggKind,
    pub column: usize,
    pub na: NaPolicy,
    pub name: String,
}

impl Aggregation {
    pub fn sum(column: usize, na: NaPolicy, name: impl Into<String>) -> Self {
        Aggregation {
            kind: AggKind::Sum,
            column,
            na,
            name: name.into(),
        }
    }

    pub fn count(column: usize, na: NaPolicy, name: impl Into<String>) -> Self {
        Aggregation {
            kind: AggKind::Count,
            column,
            na,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Acc {
    sum: f64,
    valid: u64,
    rows: u64,
}

impl Acc {
    fn push(&mut self, value: Option<f64>) {
        self.rows += 1;
        if let Some(v) = value {
            self.sum += v;
            self.valid += 1;
        }
    }

    fn merge(&mut self, other: &Acc) {
        self.sum += other.sum;
        self.valid += other.valid;
        self.rows += other.rows;
    }

    fn finish(&self, kind: AggKind, na: NaPolicy) -> f64 {
        match (kind, na) {
            (AggKind::Sum, NaPolicy::Ignore) if self.valid == 0 => f64::NAN,
            (AggKind::Sum, NaPolicy::All) if self.valid < self.rows => f64::NAN,
            (AggKind::Sum, _) => self.sum,
            (AggKind::Count, NaPolicy::Ignore) => self.valid as f64,
            (AggKind::Count, NaPolicy::All) => self.rows as f64,
        }
    }
}

type Key = Vec<OrderedFloat<f64>>;
type Partial = FnvHashMap<Key, Vec<Acc>>;

pub fn group_by(frame: &Frame, keys: &[usize], aggs: &[Aggregation]) -> Result<Frame> {
    const OP: &str = "group_by";
    if keys.is_empty() {
        return Err(TargetEncodingError::InvalidParameter {
            op: OP,
            reason: "at least one key column is required".into(),
        });
    }
    let key_cols = keys.iter().map(|&k| frame.col(OP, k)).collect::<Result<Vec<_>>>()?;
    let agg_cols = aggs
        .iter()
        .map(|agg| {
            let col = frame.col(OP, agg.column)?;
            if agg.kind == AggKind::Sum && col.is_categorical() {
                return Err(TargetEncodingError::NotNumeric { op: OP, index: agg.column });
            }
            Ok(col)
        })
        .collect::<Result<Vec<_>>>()?;

    let partitions = frame.partitions().collect_vec();
    let partials: Vec<Partial> = partitions
        .into_par_iter()
        .map(|rows| {
            let mut partial = Partial::default();
            for row in rows {
                let key: Option<Key> = key_cols.iter().map(|c| c.key(row)).collect();
                let key = match key {
                    Some(key) => key,
                    None => continue,
                };
                let accs = partial
                    .entry(key)
                    .or_insert_with(|| vec![Acc::default(); aggs.len()]);
                for (acc, col) in accs.iter_mut().zip(&agg_cols) {
                    acc.push(col.value(row));
                }
            }
            partial
        })
        .collect();

    let mut groups = Partial::default();
    for partial in partials {
        for (key, accs) in partial {
            match groups.get_mut(&key) {
                Some(existing) => existing.iter_mut().zip(&accs).for_each(|(a, b)| a.merge(b)),
                None => {
                    groups.insert(key, accs);
                }
            }
        }
    }

    debug!(rows = frame.nrows(), groups = groups.len(), keys = keys.len(), "grouped frame");

    let sorted = groups.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)).collect_vec();
    let mut columns = Vec::with_capacity(keys.len() + aggs.len());
    for (pos, col) in key_cols.iter().enumerate() {
        let values = sorted.iter().map(|(key, _)| key[pos].0);
        let column = match col.data() {
            ColumnData::Categorical { domain, .. } => {
                Column::categorical(col.name(), values.map(|v| Some(v as u32)).collect(), domain.clone())
            }
            ColumnData::Numeric(_) => Column::numeric(col.name(), values.collect()),
        };
        columns.push(column);
    }
    for (pos, agg) in aggs.iter().enumerate() {
        let values = sorted.iter().map(|(_, accs)| accs[pos].finish(agg.kind, agg.na)).collect();
        columns.push(Column::numeric(agg.name.clone(), values));
    }
    Ok(Frame::new(columns)?.with_partition_len(frame.partition_len()))
}

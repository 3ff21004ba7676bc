//! Broadcast join of an encoding statistics table onto the working frame.
//!
//! The statistics table is small (one row per category, or per category and
//! fold), so it is indexed into a hash map once and every partition of the
//! working frame looks it up independently. The out-of-fold variant precomputes,
//! for every category and every fold `i` it occurs in, the sum over all folds
//! `j != i`, so a row never sees statistics that include its own fold.

use fnv::FnvHashMap;
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::error::{Result, TargetEncodingError};
use crate::frame::{Column, Frame};
use crate::stats::{statistics_columns, DENOMINATOR_COL, NUMERATOR_COL};

type Key = OrderedFloat<f64>;

/// Accumulated numerator/denominator for a key. A numerator stays missing
/// until a non-missing one is added; a key with no contributing entry at all
/// resolves to missing on both sides.
#[derive(Debug, Clone, Copy, Default)]
struct Support {
    numerator: f64,
    has_numerator: bool,
    denominator: f64,
    present: bool,
}

impl Support {
    fn add(&mut self, numerator: f64, denominator: f64) {
        self.present = true;
        if !numerator.is_nan() {
            self.numerator += numerator;
            self.has_numerator = true;
        }
        if !denominator.is_nan() {
            self.denominator += denominator;
        }
    }

    fn add_support(&mut self, other: &Support) {
        if other.present {
            self.present = true;
            if other.has_numerator {
                self.numerator += other.numerator;
                self.has_numerator = true;
            }
            self.denominator += other.denominator;
        }
    }

    fn resolve(&self) -> (f64, f64) {
        if !self.present {
            return (f64::NAN, f64::NAN);
        }
        let numerator = if self.has_numerator { self.numerator } else { f64::NAN };
        (numerator, self.denominator)
    }
}

/// Translates statistics-table keys into the key space of the working frame.
/// Categorical columns are matched by label since the two tables may carry
/// different domains.
enum KeyMapper {
    Numeric,
    Categorical(Vec<Option<u32>>),
}

impl KeyMapper {
    fn new(op: &'static str, left: &Column, left_idx: usize, right: &Column, right_idx: usize) -> Result<Self> {
        match (left.domain(), right.domain()) {
            (Some(left_domain), Some(right_domain)) => {
                let lookup: FnvHashMap<&str, u32> = left_domain
                    .iter()
                    .enumerate()
                    .map(|(code, label)| (label.as_str(), code as u32))
                    .collect();
                Ok(KeyMapper::Categorical(
                    right_domain.iter().map(|label| lookup.get(label.as_str()).copied()).collect(),
                ))
            }
            (None, None) => Ok(KeyMapper::Numeric),
            (Some(_), None) => Err(TargetEncodingError::NotCategorical { op, index: right_idx }),
            (None, Some(_)) => Err(TargetEncodingError::NotCategorical { op, index: left_idx }),
        }
    }

    fn key(&self, column: &Column, row: usize) -> Option<Key> {
        match self {
            KeyMapper::Numeric => column.key(row),
            KeyMapper::Categorical(translate) => column
                .codes()
                .and_then(|codes| codes.get(row).copied().flatten())
                .and_then(|code| translate.get(code as usize).copied().flatten())
                .map(|code| OrderedFloat(f64::from(code))),
        }
    }
}

fn check_free(frame: &Frame) -> Result<()> {
    for name in [NUMERATOR_COL, DENOMINATOR_COL] {
        if frame.find(name).is_some() {
            return Err(TargetEncodingError::DuplicateColumn { name: name.to_owned() });
        }
    }
    Ok(())
}

fn attach(frame: &mut Frame, merged: Vec<(f64, f64)>) -> Result<usize> {
    let (numerators, denominators): (Vec<f64>, Vec<f64>) = merged.into_iter().unzip();
    let numerator = frame.add_column(Column::numeric(NUMERATOR_COL, numerators))?;
    frame.add_column(Column::numeric(DENOMINATOR_COL, denominators))?;
    Ok(numerator)
}

/// Attaches the numerator/denominator of each row's category to the frame.
/// Rows whose category is missing from `stats` get missing values.
///
/// Returns the index of the new numerator column, the denominator follows it.
pub fn merge_statistics(frame: &mut Frame, stats: &Frame, category: usize, stats_category: usize) -> Result<usize> {
    const OP: &str = "merge_statistics";
    check_free(frame)?;
    let (num_idx, den_idx) = statistics_columns(stats, OP)?;
    let left = frame.col(OP, category)?;
    let right = stats.col(OP, stats_category)?;
    let mapper = KeyMapper::new(OP, left, category, right, stats_category)?;

    let num = stats.numeric(OP, num_idx)?;
    let den = stats.numeric(OP, den_idx)?;
    let mut index: FnvHashMap<Key, Support> = FnvHashMap::default();
    for row in 0..stats.nrows() {
        if let Some(key) = mapper.key(right, row) {
            index.entry(key).or_default().add(num[row], den[row]);
        }
    }

    let merged = frame.map_partitions(|rows, out: &mut [(f64, f64)]| {
        for (o, row) in out.iter_mut().zip(rows) {
            *o = match left.key(row).and_then(|k| index.get(&k)) {
                Some(support) => support.resolve(),
                None => (f64::NAN, f64::NAN),
            };
        }
        Ok(())
    })?;
    debug!(rows = frame.nrows(), categories = index.len(), "merged encoding statistics");
    attach(frame, merged)
}

/// Out-of-fold variant of [`merge_statistics`]: a row in fold `i` receives the
/// sum of its category's statistics over every fold in `[0, max_fold]` except
/// `i`. Rows with a missing fold, or a fold outside that range, have nothing
/// to exclude and receive the sum over all folds.
///
/// A category whose only entries lie in the row's own fold has no out-of-fold
/// support, so the row gets missing numerator and denominator and later
/// encodes to NA. This differs from subtracting the own fold from the
/// category total, which would leave `(0, 0)` and encode to the prior mean.
///
/// Only the folds a category actually occurs in are indexed, so `max_fold`
/// bounds the accepted fold labels without sizing any allocation.
pub fn merge_statistics_out_of_fold(
    frame: &mut Frame,
    stats: &Frame,
    category: usize,
    fold: usize,
    stats_category: usize,
    stats_fold: usize,
    max_fold: u32,
) -> Result<usize> {
    const OP: &str = "merge_statistics_out_of_fold";
    check_free(frame)?;
    let (num_idx, den_idx) = statistics_columns(stats, OP)?;
    let left = frame.col(OP, category)?;
    let left_fold = frame.col(OP, fold)?;
    let right = stats.col(OP, stats_category)?;
    let right_fold = stats.col(OP, stats_fold)?;
    let mapper = KeyMapper::new(OP, left, category, right, stats_category)?;

    let num = stats.numeric(OP, num_idx)?;
    let den = stats.numeric(OP, den_idx)?;
    let mut per_fold: FnvHashMap<Key, Vec<(u32, Support)>> = FnvHashMap::default();
    for row in 0..stats.nrows() {
        let (key, f) = match (mapper.key(right, row), fold_label(right_fold, row, max_fold)) {
            (Some(key), Some(f)) => (key, f),
            _ => continue,
        };
        let folds = per_fold.entry(key).or_default();
        let slot = match folds.binary_search_by_key(&f, |(fold, _)| *fold) {
            Ok(slot) => slot,
            Err(slot) => {
                folds.insert(slot, (f, Support::default()));
                slot
            }
        };
        folds[slot].1.add(num[row], den[row]);
    }

    let index: FnvHashMap<Key, OutOfFold> = per_fold
        .into_iter()
        .map(|(key, folds)| (key, OutOfFold::new(&folds)))
        .collect();

    let merged = frame.map_partitions(|rows, out: &mut [(f64, f64)]| {
        for (o, row) in out.iter_mut().zip(rows) {
            *o = match left.key(row).and_then(|k| index.get(&k)) {
                Some(sums) => sums.get(fold_label(left_fold, row, max_fold)),
                None => (f64::NAN, f64::NAN),
            };
        }
        Ok(())
    })?;
    debug!(
        rows = frame.nrows(),
        categories = index.len(),
        max_fold,
        "merged out-of-fold encoding statistics"
    );
    attach(frame, merged)
}

/// Resolved sums of one category: over all of its folds, and over all but
/// each fold it occurs in. Folds are added in ascending order.
struct OutOfFold {
    all: (f64, f64),
    excluding: Vec<(u32, (f64, f64))>,
}

impl OutOfFold {
    fn new(folds: &[(u32, Support)]) -> Self {
        let sum_without = |own: Option<u32>| {
            let mut total = Support::default();
            for (fold, support) in folds {
                if Some(*fold) != own {
                    total.add_support(support);
                }
            }
            total.resolve()
        };
        OutOfFold {
            all: sum_without(None),
            excluding: folds.iter().map(|(fold, _)| (*fold, sum_without(Some(*fold)))).collect(),
        }
    }

    fn get(&self, fold: Option<u32>) -> (f64, f64) {
        fold.and_then(|f| self.excluding.binary_search_by_key(&f, |(own, _)| *own).ok())
            .map_or(self.all, |slot| self.excluding[slot].1)
    }
}

fn fold_label(column: &Column, row: usize, max_fold: u32) -> Option<u32> {
    column
        .value(row)
        .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= f64::from(max_fold))
        .map(|f| f as u32)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::relational::filter_not_by_value;
    use crate::stats::{build_statistics, collapse_folds};
    use crate::target_encoder::apply_blended_encoding;

    fn statistics_table(cats: &[&str], num: Vec<f64>, den: Vec<f64>) -> Frame {
        let labels = cats.iter().map(|c| Some(*c)).collect::<Vec<_>>();
        Frame::new(vec![
            Column::from_labels("cat", &labels),
            Column::numeric(NUMERATOR_COL, num),
            Column::numeric(DENOMINATOR_COL, den),
        ])
        .unwrap()
    }

    fn merged_values(frame: &Frame, numerator: usize) -> (Vec<f64>, Vec<f64>) {
        (
            frame.column(numerator).unwrap().as_numeric().unwrap().to_vec(),
            frame.column(numerator + 1).unwrap().as_numeric().unwrap().to_vec(),
        )
    }

    #[test]
    fn test_merge_plain() {
        let stats = statistics_table(&["A", "B"], vec![5., 2.], vec![10., 10.]);
        let mut fr = Frame::new(vec![Column::from_labels(
            "cat",
            &[Some("B"), Some("A"), Some("C"), None, Some("A")],
        )])
        .unwrap()
        .with_partition_len(2);

        let numerator = merge_statistics(&mut fr, &stats, 0, 0).unwrap();
        assert_eq!(numerator, 1);
        assert_eq!(fr.names(), vec!["cat", NUMERATOR_COL, DENOMINATOR_COL]);
        let (num, den) = merged_values(&fr, numerator);
        assert_eq!(num[..2], [2., 5.]);
        assert_eq!(den[..2], [10., 10.]);
        assert!(num[2].is_nan() && den[2].is_nan());
        assert!(num[3].is_nan() && den[3].is_nan());
        assert_eq!((num[4], den[4]), (5., 10.));
    }

    #[test]
    fn test_merge_twice_is_rejected() {
        let stats = statistics_table(&["A"], vec![1.], vec![2.]);
        let mut fr = Frame::new(vec![Column::from_labels("cat", &[Some("A")])]).unwrap();
        merge_statistics(&mut fr, &stats, 0, 0).unwrap();
        assert!(matches!(
            merge_statistics(&mut fr, &stats, 0, 0),
            Err(TargetEncodingError::DuplicateColumn { .. })
        ));
        assert_eq!(fr.ncols(), 3);
    }

    #[test]
    fn test_merge_rejects_mixed_key_types() {
        let stats = statistics_table(&["A"], vec![1.], vec![2.]);
        let mut fr = Frame::new(vec![Column::numeric("cat", vec![0.])]).unwrap();
        assert!(matches!(
            merge_statistics(&mut fr, &stats, 0, 0),
            Err(TargetEncodingError::NotCategorical { .. })
        ));
        assert_eq!(fr.ncols(), 1);
    }

    #[test]
    fn test_out_of_fold_excludes_own_fold() {
        let fr = Frame::new(vec![
            Column::from_labels("cat", &[Some("c"), Some("c"), Some("c"), Some("d")]),
            Column::numeric("fold", vec![0., 1., 1., 0.]),
            Column::numeric("y", vec![1., 0., 1., 1.]),
        ])
        .unwrap();
        let stats = build_statistics(&fr, 0, 2, Some(1)).unwrap();

        let mut working = fr.clone();
        let numerator = merge_statistics_out_of_fold(&mut working, &stats, 0, 1, 0, 1, 1).unwrap();
        let (num, den) = merged_values(&working, numerator);
        // fold 0 row of c sees fold 1 only: (0 + 1, 2)
        assert_eq!((num[0], den[0]), (1., 2.));
        // fold 1 rows of c see fold 0 only
        assert_eq!((num[1], den[1]), (1., 1.));
        assert_eq!((num[2], den[2]), (1., 1.));
        // d only has fold 0 rows: nothing out of fold
        assert!(num[3].is_nan() && den[3].is_nan());
        // so d encodes to NA instead of the prior mean
        let encoded = apply_blended_encoding(&mut working, "cat_te", 0.75, None).unwrap();
        let values = working.column(encoded).unwrap().as_numeric().unwrap();
        assert!(values[3].is_nan());
        assert_eq!(values[0], 0.5);
    }

    #[test]
    fn test_out_of_fold_with_empty_fold_and_missing_fold() {
        let fr = Frame::new(vec![
            Column::from_labels("cat", &[Some("c"), Some("c"), Some("c")]),
            Column::numeric("fold", vec![0., 2., f64::NAN]),
            Column::numeric("y", vec![1., 3., 5.]),
        ])
        .unwrap();
        let stats = build_statistics(&fr, 0, 2, Some(1)).unwrap();
        let mut working = fr.clone();
        let numerator = merge_statistics_out_of_fold(&mut working, &stats, 0, 1, 0, 1, 2).unwrap();
        let (num, den) = merged_values(&working, numerator);
        assert_eq!((num[0], den[0]), (3., 1.));
        assert_eq!((num[1], den[1]), (1., 1.));
        assert_eq!((num[2], den[2]), (4., 2.));
    }

    #[test]
    fn test_out_of_fold_with_large_max_fold() {
        let fr = Frame::new(vec![
            Column::from_labels("cat", &[Some("c"), Some("c"), Some("c")]),
            Column::numeric("fold", vec![0., 4e9, f64::from(u32::MAX)]),
            Column::numeric("y", vec![1., 2., 4.]),
        ])
        .unwrap();
        let stats = build_statistics(&fr, 0, 2, Some(1)).unwrap();

        let mut working = fr.clone();
        let numerator = merge_statistics_out_of_fold(&mut working, &stats, 0, 1, 0, 1, u32::MAX).unwrap();
        let (num, den) = merged_values(&working, numerator);
        assert_eq!((num[0], den[0]), (6., 2.));
        assert_eq!((num[1], den[1]), (5., 2.));
        assert_eq!((num[2], den[2]), (3., 2.));

        // folds above max_fold are dropped from the table and excluded from nothing
        let mut working = fr.clone();
        let numerator = merge_statistics_out_of_fold(&mut working, &stats, 0, 1, 0, 1, 5).unwrap();
        let (num, den) = merged_values(&working, numerator);
        assert!(num[0].is_nan() && den[0].is_nan());
        assert_eq!((num[1], den[1]), (1., 1.));
        assert_eq!((num[2], den[2]), (1., 1.));
    }

    proptest! {
        #[test]
        fn prop_out_of_fold_equals_merge_of_other_folds(
            rows in prop::collection::vec((0u8..4, 0u8..3, 0.0f64..1.0), 1..120),
            row_fold in 0u8..3,
        ) {
            let labels = rows.iter().map(|(c, _, _)| Some(format!("c{}", c))).collect::<Vec<_>>();
            let fr = Frame::new(vec![
                Column::from_labels("cat", &labels),
                Column::numeric("fold", rows.iter().map(|r| r.1 as f64).collect()),
                Column::numeric("y", rows.iter().map(|r| r.2).collect()),
            ])
            .unwrap()
            .with_partition_len(8);
            let stats = build_statistics(&fr, 0, 2, Some(1)).unwrap();

            let mut oof = fr.clone();
            let oof_num = merge_statistics_out_of_fold(&mut oof, &stats, 0, 1, 0, 1, 2).unwrap();

            // one partition keeps the summation order fold-ascending, as in the out-of-fold slots
            let others = filter_not_by_value(&stats, 1, f64::from(row_fold)).unwrap().with_partition_len(1024);
            let others = collapse_folds(&others, 0, true).unwrap();
            let mut plain = fr.clone();
            let plain_num = merge_statistics(&mut plain, &others, 0, 0).unwrap();

            let (a_num, a_den) = merged_values(&oof, oof_num);
            let (b_num, b_den) = merged_values(&plain, plain_num);
            for (row, r) in rows.iter().enumerate() {
                if r.1 != row_fold {
                    continue;
                }
                prop_assert_eq!(a_den[row].to_bits(), b_den[row].to_bits());
                prop_assert_eq!(a_num[row].to_bits(), b_num[row].to_bits());
            }
        }
    }
}

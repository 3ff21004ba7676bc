use fnv::FnvHashSet;
use itertools::Itertools;
use num_traits::Num;
use ordered_float::OrderedFloat;
use rand::prelude::Distribution;
use rand::{thread_rng, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::error::{Result, TargetEncodingError};
use crate::frame::{ColumnData, Frame};

/// Distinct values of a column.
#[derive(Debug, Clone, PartialEq)]
pub enum UniqueValues {
    /// Every domain index of a categorical column.
    Levels(Vec<u32>),
    /// Distinct non-missing values of a numeric column, in no particular order.
    Numbers(Vec<f64>),
}

impl UniqueValues {
    pub fn len(&self) -> usize {
        match self {
            UniqueValues::Levels(levels) => levels.len(),
            UniqueValues::Numbers(numbers) => numbers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn unique_values(frame: &Frame, column: usize) -> Result<UniqueValues> {
    const OP: &str = "unique_values";
    let col = frame.col(OP, column)?;
    let overflow = |count: usize| TargetEncodingError::UniqueValuesOverflow {
        op: OP,
        index: column,
        count,
    };
    match col.data() {
        ColumnData::Categorical { domain, .. } => {
            let card = u32::try_from(domain.len()).map_err(|_| overflow(domain.len()))?;
            Ok(UniqueValues::Levels((0..card).collect()))
        }
        ColumnData::Numeric(values) => {
            // partials only ever hold distinct values
            let distinct = frame
                .partitions()
                .collect_vec()
                .into_par_iter()
                .map(|rows| {
                    values[rows]
                        .iter()
                        .filter(|v| !v.is_nan())
                        .map(|&v| OrderedFloat(v))
                        .collect::<FnvHashSet<_>>()
                })
                .reduce(FnvHashSet::default, |mut a, b| {
                    a.extend(b);
                    a
                });
            if distinct.len() > u32::MAX as usize {
                return Err(overflow(distinct.len()));
            }
            Ok(UniqueValues::Numbers(distinct.into_iter().map(|v| v.0).collect()))
        }
    }
}

/// ChaCha stream ids separating the consumers of a seed. A fold column and a
/// noise column built from the same seed draw independent values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowStream {
    Folds = 1,
    Noise = 2,
}

/// Random stream positioned at `first_row`. Each row draws exactly one `u64`,
/// so row `r` sees the same value whatever partition it falls into.
pub(crate) fn row_stream(seed: u64, stream: RowStream, first_row: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream as u64);
    rng.set_word_pos(first_row as u128 * 2);
    rng
}

pub(crate) fn random_seed() -> u64 {
    thread_rng().gen()
}

pub fn gen_array<T, D>(n: usize, distr: &D) -> Vec<T>
    where
        T: Num + Clone,
        D: Distribution<T> {
    let mut random = thread_rng();
    let result : Vec<T> = (0..n).map(|_| {
        random.sample(distr)
    }).collect();
    result
}

#[cfg(test)]
mod tests {
    use rand::distributions::Uniform;

    use super::*;
    use crate::frame::Column;

    #[test]
    fn test_unique_levels_cover_domain() {
        let fr = Frame::new(vec![Column::from_labels("cat", &[Some("x"), None, Some("y"), Some("x")])]).unwrap();
        assert_eq!(unique_values(&fr, 0).unwrap(), UniqueValues::Levels(vec![0, 1]));
    }

    #[test]
    fn test_unique_numbers_skip_nan() {
        let fr = Frame::new(vec![Column::numeric("x", vec![3., f64::NAN, 1., 3., 2., 1., f64::NAN])])
            .unwrap()
            .with_partition_len(2);
        let uniq = unique_values(&fr, 0).unwrap();
        let mut numbers = match uniq {
            UniqueValues::Numbers(n) => n,
            other => panic!("unexpected {:?}", other),
        };
        numbers.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(numbers, vec![1., 2., 3.]);
    }

    #[test]
    fn test_unique_values_bad_index() {
        let fr = Frame::new(vec![Column::numeric("x", vec![1.])]).unwrap();
        assert!(matches!(
            unique_values(&fr, 3),
            Err(TargetEncodingError::ColumnIndexOutOfBounds { index: 3, .. })
        ));
    }

    #[test]
    fn test_row_stream_is_partition_independent() {
        let mut whole = row_stream(7, RowStream::Noise, 0);
        let all: Vec<f64> = (0..10).map(|_| whole.gen()).collect();
        let mut tail = row_stream(7, RowStream::Noise, 6);
        let part: Vec<f64> = (0..4).map(|_| tail.gen()).collect();
        assert_eq!(&all[6..], &part[..]);
    }

    #[test]
    fn test_row_streams_differ_for_the_same_seed() {
        let draw = |stream| {
            let mut rng = row_stream(42, stream, 0);
            (0..16).map(|_| rng.gen::<u64>()).collect::<Vec<_>>()
        };
        let folds = draw(RowStream::Folds);
        let noise = draw(RowStream::Noise);
        assert!(folds.iter().zip(&noise).all(|(a, b)| a != b));
        assert_eq!(folds, draw(RowStream::Folds));
    }

    #[test]
    fn test_gen_array() {
        let data = gen_array::<i32, _>(100, &Uniform::new(0, 3));
        assert_eq!(data.len(), 100);
        assert!(data.iter().all(|x| (0..3).contains(x)));
    }
}

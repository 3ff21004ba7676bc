//! Column-oriented dataset split into row-contiguous partitions.
//!
//! Numeric columns hold `f64` with `NaN` as the missing value, categorical
//! columns hold `Option<u32>` codes into a label domain. Every stage that
//! touches row data runs through [`Frame::map_partitions`], which fills a fresh
//! buffer partition by partition on the rayon pool. Callers swap the buffer in
//! only once every partition succeeded.

use std::ops::Range;

use fnv::{FnvHashMap, FnvHashSet};
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::error::{Result, TargetEncodingError};

pub const DEFAULT_PARTITION_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Categorical {
        codes: Vec<Option<u32>>,
        domain: Vec<String>,
    },
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Categorical { codes, .. } => codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Column {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn categorical(name: impl Into<String>, codes: Vec<Option<u32>>, domain: Vec<String>) -> Self {
        Column {
            name: name.into(),
            data: ColumnData::Categorical { codes, domain },
        }
    }

    /// Builds a categorical column from labels. Codes follow the order in which
    /// labels first appear.
    pub fn from_labels<S: AsRef<str>>(name: impl Into<String>, labels: &[Option<S>]) -> Self {
        let mut domain: Vec<String> = Vec::new();
        let mut lookup: FnvHashMap<String, u32> = FnvHashMap::default();
        let codes = labels
            .iter()
            .map(|label| {
                label.as_ref().map(|l| {
                    let l = l.as_ref();
                    *lookup.entry(l.to_owned()).or_insert_with(|| {
                        domain.push(l.to_owned());
                        (domain.len() - 1) as u32
                    })
                })
            })
            .collect();
        Column::categorical(name, codes, domain)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.data, ColumnData::Categorical { .. })
    }

    pub fn domain(&self) -> Option<&[String]> {
        match &self.data {
            ColumnData::Categorical { domain, .. } => Some(domain),
            ColumnData::Numeric(_) => None,
        }
    }

    pub fn cardinality(&self) -> Option<usize> {
        self.domain().map(<[String]>::len)
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match &self.data {
            ColumnData::Numeric(values) => Some(values),
            ColumnData::Categorical { .. } => None,
        }
    }

    pub fn codes(&self) -> Option<&[Option<u32>]> {
        match &self.data {
            ColumnData::Categorical { codes, .. } => Some(codes),
            ColumnData::Numeric(_) => None,
        }
    }

    /// Value at `row` as a float, the code for categorical columns.
    /// `None` when the value is missing or `row` is past the end.
    pub fn value(&self, row: usize) -> Option<f64> {
        match &self.data {
            ColumnData::Numeric(values) => values.get(row).copied().filter(|v| !v.is_nan()),
            ColumnData::Categorical { codes, .. } => codes.get(row).copied().flatten().map(f64::from),
        }
    }

    pub fn is_na(&self, row: usize) -> bool {
        self.value(row).is_none()
    }

    pub fn label(&self, row: usize) -> Option<&str> {
        match &self.data {
            ColumnData::Categorical { codes, domain } => codes
                .get(row)
                .copied()
                .flatten()
                .and_then(|c| domain.get(c as usize))
                .map(String::as_str),
            ColumnData::Numeric(_) => None,
        }
    }

    pub(crate) fn key(&self, row: usize) -> Option<OrderedFloat<f64>> {
        self.value(row).map(OrderedFloat)
    }

    pub(crate) fn take(&self, rows: &[usize]) -> Column {
        let data = match &self.data {
            ColumnData::Numeric(values) => ColumnData::Numeric(rows.iter().map(|&r| values[r]).collect()),
            ColumnData::Categorical { codes, domain } => ColumnData::Categorical {
                codes: rows.iter().map(|&r| codes[r]).collect(),
                domain: domain.clone(),
            },
        };
        Column {
            name: self.name.clone(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
    nrows: usize,
    partition_len: usize,
}

impl Frame {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        const OP: &str = "frame";
        let nrows = columns.first().map_or(0, Column::len);
        let mut names = FnvHashSet::default();
        for column in &columns {
            if column.len() != nrows {
                return Err(TargetEncodingError::RowCountMismatch {
                    op: OP,
                    expected: nrows,
                    got: column.len(),
                });
            }
            if !names.insert(column.name()) {
                return Err(TargetEncodingError::DuplicateColumn {
                    name: column.name().to_owned(),
                });
            }
            check_codes(OP, column)?;
        }
        Ok(Frame {
            columns,
            nrows,
            partition_len: DEFAULT_PARTITION_LEN,
        })
    }

    pub fn with_partition_len(mut self, partition_len: usize) -> Self {
        self.partition_len = partition_len.max(1);
        self
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn partition_len(&self) -> usize {
        self.partition_len
    }

    pub fn n_partitions(&self) -> usize {
        (self.nrows + self.partition_len - 1) / self.partition_len
    }

    pub fn partitions(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.n_partitions()).map(move |p| {
            let start = p * self.partition_len;
            start..(start + self.partition_len).min(self.nrows)
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn col(&self, op: &'static str, index: usize) -> Result<&Column> {
        self.columns.get(index).ok_or(TargetEncodingError::ColumnIndexOutOfBounds {
            op,
            index,
            ncols: self.columns.len(),
        })
    }

    pub(crate) fn find_required(&self, op: &'static str, name: &str) -> Result<usize> {
        self.find(name).ok_or_else(|| TargetEncodingError::ColumnNotFound {
            op,
            name: name.to_owned(),
        })
    }

    pub(crate) fn numeric(&self, op: &'static str, index: usize) -> Result<&[f64]> {
        self.col(op, index)?
            .as_numeric()
            .ok_or(TargetEncodingError::NotNumeric { op, index })
    }

    /// Appends a column and returns its index.
    pub fn add_column(&mut self, column: Column) -> Result<usize> {
        const OP: &str = "add_column";
        if self.find(column.name()).is_some() {
            return Err(TargetEncodingError::DuplicateColumn {
                name: column.name().to_owned(),
            });
        }
        if self.columns.is_empty() {
            self.nrows = column.len();
        } else if column.len() != self.nrows {
            return Err(TargetEncodingError::RowCountMismatch {
                op: OP,
                expected: self.nrows,
                got: column.len(),
            });
        }
        check_codes(OP, &column)?;
        self.columns.push(column);
        Ok(self.columns.len() - 1)
    }

    pub fn remove_column(&mut self, index: usize) -> Result<Column> {
        self.col("remove_column", index)?;
        Ok(self.columns.remove(index))
    }

    pub fn rename_column(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.col("rename_column", index)?;
        if let Some(existing) = self.find(&name) {
            if existing != index {
                return Err(TargetEncodingError::DuplicateColumn { name });
            }
        }
        self.columns[index].name = name;
        Ok(())
    }

    /// Replaces the domain of a categorical column. Existing codes must stay
    /// addressable by the new domain.
    pub fn set_domain(&mut self, index: usize, new_domain: Vec<String>) -> Result<()> {
        const OP: &str = "set_domain";
        let column = self.col(OP, index)?;
        let codes = column
            .codes()
            .ok_or(TargetEncodingError::NotCategorical { op: OP, index })?;
        if let Some(max) = codes.iter().flatten().max() {
            if *max as usize >= new_domain.len() {
                return Err(TargetEncodingError::InvalidParameter {
                    op: OP,
                    reason: format!("code {} does not fit a domain of {} labels", max, new_domain.len()),
                });
            }
        }
        if let ColumnData::Categorical { domain, .. } = &mut self.columns[index].data {
            *domain = new_domain;
        }
        Ok(())
    }

    pub(crate) fn replace_numeric(&mut self, op: &'static str, index: usize, values: Vec<f64>) -> Result<()> {
        self.numeric(op, index)?;
        if values.len() != self.nrows {
            return Err(TargetEncodingError::RowCountMismatch {
                op,
                expected: self.nrows,
                got: values.len(),
            });
        }
        self.columns[index].data = ColumnData::Numeric(values);
        Ok(())
    }

    pub(crate) fn replace_codes(&mut self, op: &'static str, index: usize, new_codes: Vec<Option<u32>>) -> Result<()> {
        let column = self.col(op, index)?;
        if !column.is_categorical() {
            return Err(TargetEncodingError::NotCategorical { op, index });
        }
        if new_codes.len() != self.nrows {
            return Err(TargetEncodingError::RowCountMismatch {
                op,
                expected: self.nrows,
                got: new_codes.len(),
            });
        }
        if let ColumnData::Categorical { codes, .. } = &mut self.columns[index].data {
            *codes = new_codes;
        }
        Ok(())
    }

    pub(crate) fn take_rows(&self, rows: &[usize]) -> Frame {
        Frame {
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            nrows: rows.len(),
            partition_len: self.partition_len,
        }
    }

    /// Runs `f` over every partition in parallel and returns the assembled
    /// row-aligned output. `f` gets the partition's row range and the matching
    /// output slice, pre-filled with `T::default()`. The first failing
    /// partition fails the whole call.
    pub fn map_partitions<T, F>(&self, f: F) -> Result<Vec<T>>
    where
        T: Clone + Default + Send,
        F: Fn(Range<usize>, &mut [T]) -> Result<()> + Sync,
    {
        let len = self.partition_len;
        let mut out = vec![T::default(); self.nrows];
        out.par_chunks_mut(len).enumerate().try_for_each(|(p, chunk)| {
            let start = p * len;
            f(start..start + chunk.len(), chunk)
        })?;
        Ok(out)
    }
}

fn check_codes(op: &'static str, column: &Column) -> Result<()> {
    if let ColumnData::Categorical { codes, domain } = column.data() {
        if let Some(bad) = codes.iter().flatten().find(|&&c| c as usize >= domain.len()) {
            return Err(TargetEncodingError::InvalidParameter {
                op,
                reason: format!(
                    "column `{}` has code {} outside its domain of {} labels",
                    column.name(),
                    bad,
                    domain.len()
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::new(vec![
            Column::from_labels("cat", &[Some("a"), Some("b"), None, Some("a"), Some("c")]),
            Column::numeric("y", vec![1., 0., 1., f64::NAN, 0.]),
        ])
        .unwrap()
        .with_partition_len(2)
    }

    #[test]
    fn test_from_labels_codes_in_first_seen_order() {
        let fr = sample();
        let cat = fr.column(0).unwrap();
        assert_eq!(cat.domain().unwrap(), &["a", "b", "c"]);
        assert_eq!(cat.codes().unwrap(), &[Some(0), Some(1), None, Some(0), Some(2)]);
        assert_eq!(cat.label(4), Some("c"));
        assert!(cat.is_na(2));
    }

    #[test]
    fn test_row_past_the_end_reads_as_missing() {
        let fr = sample();
        for column in fr.columns() {
            assert_eq!(column.value(5), None);
            assert_eq!(column.label(usize::MAX), None);
            assert!(column.is_na(100));
        }
        assert_eq!(fr.column(1).unwrap().value(1), Some(0.));
    }

    #[test]
    fn test_partitions_cover_all_rows() {
        let fr = sample();
        assert_eq!(fr.n_partitions(), 3);
        let parts: Vec<_> = fr.partitions().collect();
        assert_eq!(parts, vec![0..2, 2..4, 4..5]);
    }

    #[test]
    fn test_map_partitions_row_aligned() {
        let fr = sample();
        let out: Vec<usize> = fr
            .map_partitions(|rows, out| {
                for (o, r) in out.iter_mut().zip(rows) {
                    *o = r * 10;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(out, vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_map_partitions_failure_fails_stage() {
        let fr = sample();
        let res: Result<Vec<f64>> = fr.map_partitions(|rows, _| {
            if rows.start == 2 {
                Err(TargetEncodingError::InvalidParameter {
                    op: "test",
                    reason: "boom".into(),
                })
            } else {
                Ok(())
            }
        });
        assert!(res.is_err());
    }

    #[test]
    fn test_new_rejects_ragged_and_duplicate_columns() {
        let ragged = Frame::new(vec![Column::numeric("a", vec![1.]), Column::numeric("b", vec![1., 2.])]);
        assert!(matches!(ragged, Err(TargetEncodingError::RowCountMismatch { .. })));

        let dup = Frame::new(vec![Column::numeric("a", vec![1.]), Column::numeric("a", vec![2.])]);
        assert!(matches!(dup, Err(TargetEncodingError::DuplicateColumn { .. })));
    }

    #[test]
    fn test_structural_mutations() {
        let mut fr = sample();
        let idx = fr.add_column(Column::numeric("z", vec![0.; 5])).unwrap();
        assert_eq!(idx, 2);
        assert!(fr.add_column(Column::numeric("w", vec![0.; 4])).is_err());
        assert!(fr.add_column(Column::numeric("z", vec![0.; 5])).is_err());

        fr.rename_column(2, "zz").unwrap();
        assert_eq!(fr.find("zz"), Some(2));
        assert!(fr.rename_column(2, "y").is_err());

        assert!(fr.set_domain(0, vec!["a".into()]).is_err());
        fr.set_domain(0, vec!["a".into(), "b".into(), "c".into(), "d".into()]).unwrap();
        assert_eq!(fr.column(0).unwrap().cardinality(), Some(4));
        assert!(matches!(
            fr.set_domain(1, vec![]),
            Err(TargetEncodingError::NotCategorical { index: 1, .. })
        ));

        let removed = fr.remove_column(2).unwrap();
        assert_eq!(removed.name(), "zz");
        assert_eq!(fr.ncols(), 2);
    }
}

//! Parallel building blocks for target encoding of categorical columns.
//! # About
//! Target encoding replaces each category with a statistic of the label computed
//! over the rows sharing that category. This crate provides the stages of that
//! computation over a partitioned, column-oriented [`Frame`]:
//!
//! * grouped sufficient statistics (`numerator` = sum of target, `denominator` =
//!   count of non-missing targets) per category, optionally per fold;
//! * the global prior mean and logistic shrinkage (blending) toward it;
//! * leave-one-out correction and seeded uniform noise;
//! * a broadcast merge attaching the statistics back onto the frame, with an
//!   out-of-fold variant so that no row is encoded with its own fold's target.
//!
//! Every stage that touches rows runs partition by partition on the rayon pool.
//!
//! # Usage
//! ```rust
//! use te_stats::{
//!     apply_blended_encoding, build_statistics, collapse_folds, compute_prior_mean,
//!     merge_statistics_out_of_fold, BlendingParams, Column, Frame,
//! };
//!
//! let mut frame = Frame::new(vec![
//!     Column::from_labels("city", &[Some("a"), Some("b"), Some("a"), Some("b")]),
//!     Column::numeric("fold", vec![0., 0., 1., 1.]),
//!     Column::numeric("y", vec![1., 0., 0., 1.]),
//! ])?;
//!
//! let stats = build_statistics(&frame, 0, 2, Some(1))?;
//! let prior = compute_prior_mean(&collapse_folds(&stats, 0, true)?)?;
//! merge_statistics_out_of_fold(&mut frame, &stats, 0, 1, 0, 1, 1)?;
//! let encoded = apply_blended_encoding(&mut frame, "city_te", prior, Some(&BlendingParams::default()))?;
//! assert_eq!(frame.column(encoded).unwrap().name(), "city_te");
//! # Ok::<(), te_stats::TargetEncodingError>(())
//! ```
//!
//! # Limitations
//! * Stages that rewrite columns in place (leave-one-out, noise, NA imputation)
//!   expect an exclusively owned working copy of the caller's data.
//! * The number of distinct categories must fit in a `u32`.

pub mod error;
pub mod folds;
pub mod frame;
pub mod group;
pub mod merge;
pub mod noise;
pub mod relational;
pub mod stats;
pub mod store;
pub mod target_encoder;
pub mod utils;

pub use crate::error::{Result, TargetEncodingError};
pub use crate::folds::add_kfold_column;
pub use crate::frame::{Column, ColumnData, Frame};
pub use crate::merge::{merge_statistics, merge_statistics_out_of_fold};
pub use crate::noise::{inject_noise, NoiseConfig};
pub use crate::stats::{build_statistics, collapse_folds, compute_prior_mean, DENOMINATOR_COL, NUMERATOR_COL};
pub use crate::store::{FrameKey, FrameStore, Scoped};
pub use crate::target_encoder::{
    apply_blended_encoding, blended_value, encoded_column_name, impute_categorical_column, subtract_leave_one_out,
    BlendingParams, DEFAULT_BLENDING_PARAMS,
};
pub use crate::utils::{unique_values, UniqueValues};

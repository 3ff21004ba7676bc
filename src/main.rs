use rand::distributions::Uniform;
use tracing::info;
use tracing_subscriber::EnvFilter;

use te_stats::utils::gen_array;
use te_stats::{
    add_kfold_column, apply_blended_encoding, build_statistics, collapse_folds, compute_prior_mean,
    encoded_column_name, inject_noise, merge_statistics_out_of_fold, BlendingParams, Column, Frame, FrameStore,
};

fn main() -> te_stats::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    const ROWS: usize = 1_000_000;
    let categories = gen_array::<u32, _>(ROWS, &Uniform::new(0, 3000));
    let target = gen_array::<f64, _>(ROWS, &Uniform::new(0.0, 1.0));
    let labels = categories.iter().map(|c| Some(format!("c{}", c))).collect::<Vec<_>>();

    let mut frame = Frame::new(vec![Column::from_labels("cat", &labels), Column::numeric("y", target)])?;
    let fold = add_kfold_column(&mut frame, "fold", 5, Some(42))?;

    let store = FrameStore::new();
    let stats = store.scoped(build_statistics(&frame, 0, 1, Some(fold))?);
    let prior = stats.read(|s| collapse_folds(s, 0, true).and_then(|c| compute_prior_mean(&c)))??;
    info!(prior, "computed prior mean");

    stats.read(|s| merge_statistics_out_of_fold(&mut frame, s, 0, fold, 0, 1, 4))??;
    let name = encoded_column_name("cat");
    let encoded = apply_blended_encoding(&mut frame, &name, prior, Some(&BlendingParams::default()))?;
    inject_noise(&mut frame, encoded, 0.01, Some(7))?;

    let values = frame.column(encoded).and_then(|c| c.as_numeric()).unwrap_or_default();
    info!(column = %name, rows = values.len(), first = ?&values[..values.len().min(5)], "encoded");
    Ok(())
}

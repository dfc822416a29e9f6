use clap::Parser;
use ivfadc::config::Config;
use ivfadc::index::{CoarseParams, IVFADCEngine, PqParams};
use ivfadc::io::ReaderRegistry;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ivfadc-eval", about = "Train, populate, and evaluate an IVFADC index")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Optional path to write the trained+populated index to.
    #[arg(long)]
    save_to: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_level.as_filter()))
        .init();

    match run(&config, args.save_to.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Run failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, save_to: Option<&std::path::Path>) -> ivfadc::Result<()> {
    let registry = ReaderRegistry::with_defaults();

    info!(path = %config.datasets.train_set, "reading train set");
    let train_set = registry
        .read(std::path::Path::new(&config.datasets.train_set))
        .map_err(|e| ivfadc::Error::invalid_argument(format!("train_set: {e}")))?;

    info!(path = %config.datasets.base_set, "reading base set");
    let base_set = registry
        .read(std::path::Path::new(&config.datasets.base_set))
        .map_err(|e| ivfadc::Error::invalid_argument(format!("base_set: {e}")))?;

    info!(path = %config.datasets.query_set, "reading query set");
    let query_set = registry
        .read(std::path::Path::new(&config.datasets.query_set))
        .map_err(|e| ivfadc::Error::invalid_argument(format!("query_set: {e}")))?;

    info!(path = %config.datasets.ground_truth, "reading ground truth");
    let ground_truth = registry
        .read(std::path::Path::new(&config.datasets.ground_truth))
        .map_err(|e| ivfadc::Error::invalid_argument(format!("ground_truth: {e}")))?;

    let coarse_params = CoarseParams {
        num_centroids: config.coarse.number_centroids,
        max_iterations: config.coarse.max_iterations,
        seed: config.coarse.seed,
    };
    let pq_params = PqParams {
        num_subquantizers: config.pq.number_subquantizers,
        num_centroids: config.pq.number_centroids,
        max_iterations: config.pq.max_iterations,
        seed: config.pq.seed,
    };

    let mut engine = IVFADCEngine::new(coarse_params, pq_params);

    info!(n = train_set.len(), dim = train_set.dim(), "training engine");
    engine.train(&train_set)?;

    info!(n = base_set.len(), "populating engine");
    engine.add(&base_set)?;

    if let Some(path) = save_to {
        info!(?path, "saving index");
        let mut file = std::fs::File::create(path)?;
        engine.save(&mut file)?;
    }

    let k = config.ivfadc.nearest_neighbors;
    let w = config.ivfadc.coarse_neighbors_lookup;

    let mut hits = vec![0usize; config.recall_rs.len()];
    let all_results = engine.search_many(&query_set, k, w)?;
    for (q_idx, results) in all_results.iter().enumerate() {
        let truth_row = ground_truth.row(q_idx).as_slice();

        for (slot, &r) in config.recall_rs.iter().enumerate() {
            let retrieved: std::collections::HashSet<i64> =
                results.iter().take(r).map(|n| n.id).collect();
            let truth_top1 = truth_row.first().map(|&id| id as i64);
            if let Some(truth_top1) = truth_top1 {
                if retrieved.contains(&truth_top1) {
                    hits[slot] += 1;
                }
            }
        }
    }

    if query_set.is_empty() {
        warn!("query set is empty; nothing to report");
        return Ok(());
    }

    for (slot, &r) in config.recall_rs.iter().enumerate() {
        let recall = hits[slot] as f64 / query_set.len() as f64;
        println!("recall@{r} = {recall:.4}");
    }

    Ok(())
}

//! pktstat CLI

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pkt_inference::{
    JsonTable, ModelConfig, OptimizerConfig, Predictor, SampleStore, SpectrumModel,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pktstat")]
#[command(about = "pktstat - Gamma packet spectra: fitting and posterior prediction")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Threads (0 = auto). Use 1 for bitwise-reproducible likelihood sums.
    #[arg(long, global = true, default_value = "0")]
    threads: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Packet table (JSON object with `energies` and `nus` row arrays)
    #[arg(short, long)]
    input: PathBuf,

    /// Row (simulation run) to read
    #[arg(long, default_value = "0")]
    run: usize,

    /// Read at most this many packets (0 = all)
    #[arg(long, default_value = "0")]
    max_elements: usize,

    /// Model configuration (JSON). Defaults to constant alpha and beta curves.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output file for results (pretty JSON). Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Discrete walk over the latent count
    Small,
    /// Joint refit with a continuous latent count
    Medium,
    /// Saddle-point approximation
    VeryLarge,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the mode and its Laplace evidence
    Fit {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Count and energy sum of packets in a frequency bin
    SumX {
        #[command(flatten)]
        data: DataArgs,

        /// Bin lower edge (same units as the input frequencies, inclusive)
        #[arg(long)]
        numin: f64,

        /// Bin upper edge (same units as the input frequencies, exclusive)
        #[arg(long)]
        numax: f64,
    },

    /// Posterior-predictive density of the energy sum in a frequency bin
    Predict {
        #[command(flatten)]
        data: DataArgs,

        /// Bin lower edge (same units as the input frequencies, inclusive)
        #[arg(long)]
        numin: f64,

        /// Bin upper edge (same units as the input frequencies, exclusive)
        #[arg(long)]
        numax: f64,

        /// Numerical regime
        #[arg(long, value_enum, default_value = "small")]
        mode: Mode,

        /// Energy sum to score (rescaled units). Defaults to the observed sum.
        #[arg(long)]
        x: Option<f64>,

        /// Mean packet energy used to seed the small-N walk
        #[arg(long)]
        xmean: Option<f64>,

        /// Relative contribution at which the small-N walk stops
        #[arg(long, default_value = "0.01")]
        precision: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    if cli.threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(cli.threads).build_global();
    }

    match cli.command {
        Commands::Fit { data } => cmd_fit(&data),
        Commands::SumX { data, numin, numax } => cmd_sum_x(&data, numin, numax),
        Commands::Predict { data, numin, numax, mode, x, xmean, precision } => {
            cmd_predict(&data, numin, numax, mode, x, xmean, precision)
        }
    }
}

fn load_model(data: &DataArgs) -> Result<SpectrumModel> {
    let config = match &data.config {
        Some(path) => ModelConfig::from_path(path)?,
        None => ModelConfig::default(),
    };

    tracing::info!(path = %data.input.display(), run = data.run, "loading packets");
    let table = JsonTable::from_path(&data.input)?;
    let store = SampleStore::load(&table, data.run, data.max_elements, &config.rescaling)?;
    tracing::info!(packets = store.len(), "packets loaded");

    Ok(SpectrumModel::new(store, config)?)
}

/// Bin edges on the model's frequency scale.
fn scaled_bin(model: &SpectrumModel, numin: f64, numax: f64) -> Result<(f64, f64)> {
    if !(numin < numax) {
        anyhow::bail!("empty frequency bin: numin {numin} must be below numax {numax}");
    }
    let scale = model.samples().frequency_scale();
    Ok((numin / scale, numax / scale))
}

fn cmd_fit(data: &DataArgs) -> Result<()> {
    let model = load_model(data)?;
    let predictor = Predictor::prepare(&model, OptimizerConfig::default())?;
    let result = predictor.fit_result();
    tracing::info!(nll = result.nll, converged = result.converged, "fit complete");

    let output_json = serde_json::json!({
        "parameter_names": result.names,
        "bestfit": result.parameters,
        "nll": result.nll,
        "log_evidence": result.log_evidence,
        "converged": result.converged,
        "n_iter": result.n_iter,
        "n_evaluations": result.n_evaluations,
        "n_packets": model.samples().len(),
    });

    write_json(data.output.as_ref(), output_json)
}

fn cmd_sum_x(data: &DataArgs, numin: f64, numax: f64) -> Result<()> {
    let model = load_model(data)?;
    let (lo, hi) = scaled_bin(&model, numin, numax)?;
    let (n, x) = model.samples().sum_x(lo, hi);

    write_json(data.output.as_ref(), serde_json::json!({ "n": n, "x": x }))
}

fn cmd_predict(
    data: &DataArgs,
    numin: f64,
    numax: f64,
    mode: Mode,
    x: Option<f64>,
    xmean: Option<f64>,
    precision: f64,
) -> Result<()> {
    let model = load_model(data)?;
    let (lo, hi) = scaled_bin(&model, numin, numax)?;
    let (n, observed) = model.samples().sum_x(lo, hi);
    let x = x.unwrap_or(observed);
    let nu = 0.5 * (lo + hi);
    tracing::info!(n, x, nu, ?mode, "predicting");

    let predictor = Predictor::prepare(&model, OptimizerConfig::default())?;
    let mut output_json = serde_json::json!({
        "mode": format!("{mode:?}"),
        "n": n,
        "x": x,
        "observed_x": observed,
        "nu": nu,
        "log_evidence": predictor.fitted().log_evidence,
    });

    let value = match mode {
        Mode::Small => {
            let small = predictor.predict_small(n, x, nu, xmean, precision)?;
            output_json["n_start"] = small.n_start.into();
            output_json["n_min"] = small.n_min.into();
            output_json["n_max"] = small.n_max.into();
            output_json["n_calls"] = small.n_calls.into();
            small.value
        }
        Mode::Medium => predictor.predict_medium(n, x, nu)?,
        Mode::VeryLarge => predictor.predict_very_large(n, x, nu)?,
    };
    output_json["value"] = value.into();

    write_json(data.output.as_ref(), output_json)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

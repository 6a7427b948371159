//! dml CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dml_core::DmlData;
use dml_inference::{
    DmlConfig, DoubleMl, IivmOptions, Model, ModelKind, PostLassoIvConfig, RobustVariance,
    SimulationConfig,
};
use dml_learners::LearnerKind;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dml")]
#[command(about = "Double/debiased machine learning with cross-fitting")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    Plr,
    Irm,
    Pliv,
    Iivm,
}

impl From<ModelArg> for ModelKind {
    fn from(m: ModelArg) -> Self {
        match m {
            ModelArg::Plr => ModelKind::Plr,
            ModelArg::Irm => ModelKind::Irm,
            ModelArg::Pliv => ModelKind::Pliv,
            ModelArg::Iivm => ModelKind::Iivm,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LearnerArg {
    Ols,
    Lasso,
    ElasticNet,
    PostLasso,
    Forest,
    Mean,
}

impl From<LearnerArg> for LearnerKind {
    fn from(l: LearnerArg) -> Self {
        match l {
            LearnerArg::Ols => LearnerKind::Ols,
            LearnerArg::Lasso => LearnerKind::Lasso,
            LearnerArg::ElasticNet => LearnerKind::ElasticNet,
            LearnerArg::PostLasso => LearnerKind::PostLasso,
            LearnerArg::Forest => LearnerKind::Forest,
            LearnerArg::Mean => LearnerKind::Mean,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum VarianceArg {
    Hc0,
    Hc1,
    Hc2,
    Hc3,
}

impl From<VarianceArg> for RobustVariance {
    fn from(v: VarianceArg) -> Self {
        match v {
            VarianceArg::Hc0 => RobustVariance::Hc0,
            VarianceArg::Hc1 => RobustVariance::Hc1,
            VarianceArg::Hc2 => RobustVariance::Hc2,
            VarianceArg::Hc3 => RobustVariance::Hc3,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-fitted estimate of a treatment effect
    Estimate {
        /// Input data (JSON: y, d, z?, x, x_names?)
        #[arg(short, long)]
        input: PathBuf,

        /// Model to estimate
        #[arg(long, value_enum)]
        model: ModelArg,

        /// Learner family for every nuisance function
        #[arg(long, value_enum, default_value = "lasso")]
        learner: LearnerArg,

        /// Estimator config (JSON). Explicit flags take precedence.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of folds
        #[arg(long)]
        folds: Option<usize>,

        /// Number of repeated partitions
        #[arg(long)]
        reps: Option<usize>,

        /// Seed for partitions and learners
        #[arg(long)]
        seed: Option<u64>,

        /// Propensity clipping bound
        #[arg(long)]
        clip: Option<f64>,

        /// Robust variance estimator of the final stage
        #[arg(long, value_enum)]
        variance: Option<VarianceArg>,

        /// Run folds in parallel
        #[arg(long)]
        parallel: bool,

        /// IIVM: assume no always-takers
        #[arg(long)]
        no_always_takers: bool,

        /// IIVM: assume no never-takers
        #[arg(long)]
        no_never_takers: bool,

        /// IIVM: do not clip the blended treatment prediction
        #[arg(long)]
        no_clip_blended: bool,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Post-LASSO IV: select controls, then 2SLS of y on d instrumented by z
    IvPostLasso {
        /// Input data (JSON, must contain z)
        #[arg(short, long)]
        input: PathBuf,

        /// Robust variance estimator
        #[arg(long, value_enum, default_value = "hc1")]
        variance: VarianceArg,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Simulate data with a known effect
    Simulate {
        /// Model whose assumptions the data satisfy
        #[arg(long, value_enum)]
        model: ModelArg,

        /// Number of observations
        #[arg(long, default_value = "500")]
        n: usize,

        /// Number of covariates
        #[arg(long, default_value = "10")]
        p: usize,

        /// True effect
        #[arg(long, default_value = "0.5")]
        theta: f64,

        /// RNG seed
        #[arg(long, default_value = "7")]
        seed: u64,

        /// Output file for the data (JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Estimate {
            input,
            model,
            learner,
            config,
            folds,
            reps,
            seed,
            clip,
            variance,
            parallel,
            no_always_takers,
            no_never_takers,
            no_clip_blended,
            output,
        } => {
            let mut cfg = match config {
                Some(path) => load_config(&path)?,
                None => DmlConfig::default(),
            };
            if let Some(v) = folds {
                cfg.n_folds = v;
            }
            if let Some(v) = reps {
                cfg.n_rep = v;
            }
            if let Some(v) = clip {
                cfg.clip = v;
            }
            if let Some(v) = variance {
                cfg.variance = v.into();
            }
            cfg.seed = seed.or(cfg.seed);
            cfg.parallel_folds |= parallel;
            let iivm = IivmOptions {
                always_takers: !no_always_takers,
                never_takers: !no_never_takers,
                clip_blended_treatment: !no_clip_blended,
            };
            cmd_estimate(&input, model.into(), learner.into(), cfg, iivm, output.as_ref())
        }
        Commands::IvPostLasso { input, variance, output } => {
            cmd_iv_post_lasso(&input, variance.into(), output.as_ref())
        }
        Commands::Simulate { model, n, p, theta, seed, output } => {
            let cfg =
                SimulationConfig { model: model.into(), n_obs: n, n_features: p, theta, seed };
            cmd_simulate(&cfg, output.as_ref())
        }
    }
}

fn load_config(path: &Path) -> Result<DmlConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("invalid config {}", path.display()))
}

fn load_data(path: &Path) -> Result<DmlData> {
    DmlData::from_path(path).with_context(|| format!("failed to load data from {}", path.display()))
}

fn cmd_estimate(
    input: &Path,
    kind: ModelKind,
    learner: LearnerKind,
    cfg: DmlConfig,
    iivm: IivmOptions,
    output: Option<&PathBuf>,
) -> Result<()> {
    let data = load_data(input)?;
    tracing::info!(
        model = %kind,
        n_obs = data.n_obs(),
        n_features = data.n_features(),
        "data loaded"
    );

    let model = Model::from_learner_kind(kind, learner, &data, iivm);
    let result = DoubleMl::new(model, cfg)?.fit(&data).context("estimation failed")?;
    tracing::info!(coef = result.estimate.coef, se = result.estimate.se, "estimate complete");

    let mut value = serde_json::to_value(&result)?;
    value["learner"] = serde_json::to_value(learner)?;
    write_json(output, value)
}

fn cmd_iv_post_lasso(
    input: &Path,
    variance: RobustVariance,
    output: Option<&PathBuf>,
) -> Result<()> {
    let data = load_data(input)?;
    let cfg = PostLassoIvConfig { variance, ..Default::default() };
    let result = dml_inference::post_lasso_iv(&data, &cfg).context("post-lasso IV failed")?;
    tracing::info!(
        coef = result.effect.coef,
        se = result.effect.se,
        n_selected = result.selected.len(),
        "post-lasso IV complete"
    );
    write_json(output, serde_json::to_value(&result)?)
}

fn cmd_simulate(cfg: &SimulationConfig, output: Option<&PathBuf>) -> Result<()> {
    let data = dml_inference::simulate(cfg)?;
    tracing::info!(model = %cfg.model, n_obs = cfg.n_obs, theta = cfg.theta, "data simulated");
    write_json(output, data.to_json_value()?)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

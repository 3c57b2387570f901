//! hydrofold CLI: grid-search a model family with K-fold cross-validation and
//! report cached results.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use hydrofold::dataset::CollectionInfo;
use hydrofold::experiment::persist::read_json;
use hydrofold::train::IterativeConfig;
use hydrofold::{
    DatasetDescriptor, ExperimentConfig, ExperimentManager, FeatureTable, FoldStrategy,
    ForestTrainer, LabelTarget, Metric, MismatchPolicy, MlpTrainer, ParamGrid, ProcessorSettings,
    ResultMap, RowFilter, Settings, Subset, Trainer, TrainingStrategy,
};

/// hydrofold: reproducible K-fold grid searches over signal classifiers
#[derive(Parser, Debug)]
#[command(name = "hydrofold", version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML) with directories and collections
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train (or reuse) every grid point on the selected folds and print the grids
    Run {
        #[command(flatten)]
        experiment: ExperimentArgs,

        /// Ignore cached artifacts and predictions
        #[arg(long = "override")]
        override_cache: bool,

        /// Overwrite a stored configuration that no longer matches
        #[arg(long)]
        rebuild_config: bool,
    },
    /// Print grids from cached predictions without training anything
    Report {
        #[command(flatten)]
        experiment: ExperimentArgs,

        /// Subsets to report (trn, val, test); all by default
        #[arg(long, value_delimiter = ',', value_parser = parse_subset)]
        subset: Vec<Subset>,

        /// Also print summed confusion matrices
        #[arg(long)]
        confusion: bool,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Family {
    Forest,
    Mlp,
}

#[derive(Args, Debug)]
struct ExperimentArgs {
    /// Model family to grid-search
    #[arg(long, value_enum, default_value = "forest")]
    family: Family,

    /// Experiment name prefix; the training strategy is appended
    #[arg(long)]
    name: Option<String>,

    /// Collection id registered in the settings file
    #[arg(long, conflicts_with = "catalog")]
    collection: Option<String>,

    /// Catalog CSV, when not using a registered collection
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Reduced catalog CSV used with --only-sample
    #[arg(long)]
    sample_catalog: Option<PathBuf>,

    #[arg(long, default_value = "ID")]
    id_column: String,

    /// Precomputed features: CSV rows of `id,f1,...,fn`
    #[arg(long)]
    features: PathBuf,

    /// Processor settings (JSON) the features were computed with
    #[arg(long)]
    processor_settings: Option<PathBuf>,

    #[arg(long, default_value = "Class")]
    target_column: String,

    /// Target class values, in class order
    #[arg(long, value_delimiter = ',', required = true)]
    classes: Vec<String>,

    /// Bucket other target values as "Others" instead of dropping them
    #[arg(long)]
    include_others: bool,

    /// Row filter `COLUMN=V1|V2`; repeatable, all must hold
    #[arg(long, value_parser = parse_filter)]
    filter: Vec<RowFilter>,

    /// Catalog column whose values never straddle two subsets
    #[arg(long)]
    group_column: Option<String>,

    #[arg(long, default_value_t = 10)]
    n_folds: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 0.1)]
    validation_fraction: f64,

    /// stratified or k-fold
    #[arg(long, default_value = "stratified", value_parser = parse_fold_strategy)]
    fold_strategy: FoldStrategy,

    /// class-specific or multiclass; both when omitted
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<TrainingStrategy>,

    /// Folds to execute, e.g. `0,4-7`; all when omitted
    #[arg(long, value_parser = parse_folds)]
    folds: Option<FoldSelection>,

    /// Use the collection's reduced sample catalog
    #[arg(long)]
    only_sample: bool,

    #[arg(long, default_value = "accuracy", value_parser = parse_metric)]
    sort_metric: Metric,

    /// Pass budget for the mlp family
    #[arg(long, default_value_t = 512)]
    epochs: usize,

    #[arg(long, default_value_t = 32)]
    patience: usize,

    #[arg(long, default_value_t = 64)]
    batch_size: usize,
}

/// Parsed `--folds` value.
#[derive(Clone, Debug, PartialEq, Eq)]
struct FoldSelection(Vec<usize>);

impl ExperimentArgs {
    fn folds(&self) -> Option<&[usize]> {
        self.folds.as_ref().map(|f| f.0.as_slice())
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));
    tracing_subscriber::registry().with(stderr_layer).init();

    let settings = Settings::load(cli.settings.as_deref()).context("loading settings")?;

    match cli.command {
        Command::Run { experiment, override_cache, rebuild_config } => {
            let policy = if rebuild_config { MismatchPolicy::Rebuild } else { MismatchPolicy::Fail };
            for strategy in strategies(&experiment) {
                let (config, info) = build_config(&settings, &experiment, strategy)?;
                let catalog = config.dataset.catalog(&info)?;
                let manager = ExperimentManager::open(
                    config,
                    &settings.directories.config_dir,
                    policy,
                    &catalog,
                    Box::new(load_features(&experiment)?),
                    build_trainers(&experiment, strategy)?,
                )?
                .with_override(override_cache);

                let results = manager.run(experiment.folds())?;
                print_grids(&manager, &results, &Subset::ALL, strategy, experiment.sort_metric, false)?;
            }
        }
        Command::Report { experiment, subset, confusion } => {
            let subsets = if subset.is_empty() { Subset::ALL.to_vec() } else { subset };
            for strategy in strategies(&experiment) {
                let (config, info) = build_config(&settings, &experiment, strategy)?;
                ExperimentConfig::load(&settings.directories.config_dir, &config.name, Some(&config))?;
                let catalog = config.dataset.catalog(&info)?;
                let manager = ExperimentManager::new(
                    config,
                    &catalog,
                    Box::new(load_features(&experiment)?),
                    build_trainers(&experiment, strategy)?,
                )?;

                let mut results = ResultMap::new();
                for &s in &subsets {
                    results.extend(manager.compile_results(s, experiment.folds(), None)?);
                }
                print_grids(&manager, &results, &subsets, strategy, experiment.sort_metric, confusion)?;
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Experiment assembly
// ---------------------------------------------------------------------------

fn strategies(args: &ExperimentArgs) -> Vec<TrainingStrategy> {
    match args.strategy {
        Some(s) => vec![s],
        None => TrainingStrategy::ALL.to_vec(),
    }
}

fn build_config(
    settings: &Settings,
    args: &ExperimentArgs,
    strategy: TrainingStrategy,
) -> anyhow::Result<(ExperimentConfig, CollectionInfo)> {
    let info = match (&args.collection, &args.catalog) {
        (Some(id), _) => settings.registry()?.get(id)?.clone(),
        (None, Some(path)) => {
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("catalog")
                .to_string();
            let mut info = CollectionInfo::new(id, path.clone()).with_id_column(args.id_column.clone());
            info.sample_catalog = args.sample_catalog.clone();
            info
        }
        (None, None) => bail!("either --collection or --catalog is required"),
    };

    let target = LabelTarget::new(args.target_column.clone(), args.classes.clone(), args.include_others);
    let mut dataset = DatasetDescriptor::new(info.id.clone(), target).with_only_sample(args.only_sample);
    for f in &args.filter {
        dataset = dataset.with_filter(f.clone());
    }

    let prefix = args.name.clone().unwrap_or_else(|| match args.family {
        Family::Forest => "forest".to_string(),
        Family::Mlp => "mlp".to_string(),
    });
    let grid_dir = if args.only_sample { "grid_search_sample" } else { "grid_search" };

    let mut config = ExperimentConfig::new(
        format!("{prefix}_{strategy}"),
        dataset,
        processor_settings(args)?,
        settings.directories.training_dir.join(grid_dir),
    )
    .with_n_folds(args.n_folds)
    .with_seed(args.seed)
    .with_validation_fraction(args.validation_fraction)
    .with_fold_strategy(args.fold_strategy);
    if let Some(column) = &args.group_column {
        config = config.with_group_column(column.clone());
    }
    Ok((config, info))
}

fn processor_settings(args: &ExperimentArgs) -> anyhow::Result<ProcessorSettings> {
    match &args.processor_settings {
        Some(path) => read_json(path)?
            .with_context(|| format!("processor settings file {} not found", path.display())),
        None => Ok(ProcessorSettings::default()),
    }
}

fn load_features(args: &ExperimentArgs) -> anyhow::Result<FeatureTable> {
    let table = FeatureTable::from_csv(&args.features, processor_settings(args)?)?;
    info!(path = %args.features.display(), samples = table.len(), width = table.width(), "loaded features");
    Ok(table)
}

fn build_trainers(args: &ExperimentArgs, strategy: TrainingStrategy) -> anyhow::Result<Vec<Box<dyn Trainer>>> {
    let mut trainers: Vec<Box<dyn Trainer>> = Vec::new();
    match args.family {
        Family::Forest => {
            let grid = ParamGrid::new()
                .axis("Estimators", [10, 20, 30, 40, 50])
                .axis("Max depth", [5, 10, 15, 20, 25, 30]);
            for params in grid.combinations() {
                let id = format!("forest_{}", params.slug());
                trainers.push(Box::new(ForestTrainer::from_params(id, strategy, params)?));
            }
        }
        Family::Mlp => {
            let config = IterativeConfig::new(args.epochs, args.batch_size, args.patience);
            let grid = ParamGrid::new()
                .axis("Neurons", [4, 16, 64, 256])
                .axis("Activation", ["tanh", "relu"]);
            for params in grid.combinations() {
                let id = format!("mlp_{}", params.slug());
                trainers.push(Box::new(MlpTrainer::from_params(id, strategy, params, config.clone())?));
            }
        }
    }
    Ok(trainers)
}

fn print_grids(
    manager: &ExperimentManager,
    results: &ResultMap,
    subsets: &[Subset],
    strategy: TrainingStrategy,
    sort_metric: Metric,
    confusion: bool,
) -> anyhow::Result<()> {
    for &subset in subsets {
        let grid = manager.grid(results, subset, strategy)?.with_sort_metric(sort_metric);
        if grid.is_empty() {
            continue;
        }
        println!("== {} / {strategy} / {subset} ==", manager.config().name);
        println!("{grid}");
        if confusion {
            println!("{}", grid.confusion_report());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Argument parsers
// ---------------------------------------------------------------------------

/// Parses fold selections such as `0,4-7` (ranges inclusive).
fn parse_folds(s: &str) -> Result<FoldSelection, String> {
    let mut folds = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.trim().parse().map_err(|_| format!("bad fold range '{part}'"))?;
                let end: usize = end.trim().parse().map_err(|_| format!("bad fold range '{part}'"))?;
                if end < start {
                    return Err(format!("fold range '{part}' is reversed"));
                }
                folds.extend(start..=end);
            }
            None => folds.push(part.parse().map_err(|_| format!("bad fold '{part}'"))?),
        }
    }
    if folds.is_empty() {
        return Err("no folds given".to_string());
    }
    Ok(FoldSelection(folds))
}

fn parse_filter(s: &str) -> Result<RowFilter, String> {
    let (column, values) = s
        .split_once('=')
        .ok_or_else(|| format!("filter '{s}' must look like COLUMN=V1|V2"))?;
    let values: Vec<&str> = values.split('|').map(str::trim).filter(|v| !v.is_empty()).collect();
    if column.trim().is_empty() || values.is_empty() {
        return Err(format!("filter '{s}' must look like COLUMN=V1|V2"));
    }
    Ok(RowFilter::new(column.trim(), values))
}

fn parse_strategy(s: &str) -> Result<TrainingStrategy, String> {
    s.parse().map_err(|e: hydrofold::Error| e.to_string())
}

fn parse_subset(s: &str) -> Result<Subset, String> {
    s.parse().map_err(|e: hydrofold::Error| e.to_string())
}

fn parse_metric(s: &str) -> Result<Metric, String> {
    s.parse().map_err(|e: hydrofold::Error| e.to_string())
}

fn parse_fold_strategy(s: &str) -> Result<FoldStrategy, String> {
    match s.to_lowercase().replace('_', "-").as_str() {
        "stratified" => Ok(FoldStrategy::Stratified),
        "k-fold" | "kfold" => Ok(FoldStrategy::KFold),
        other => Err(format!("unknown fold strategy '{other}'")),
    }
}

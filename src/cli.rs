use crate::{
    config::Config,
    dataset::{DatasetOptions, PairDataset, Shard},
    engine::{Auditor, python::PythonAuditor},
    paths,
    pipeline::Pipeline,
    report::{RunReport, WorkerReport},
    util::{ensure_dir, now_rfc3339, run_id},
    workers,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "edit-audit")]
#[command(about = "Batch auditor for image-edit pairs (VLM scoring + resumable sharded datasets)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./edit-audit.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Dataset selection shared by `plan` and `run`.
#[derive(clap::Args, Debug, Default)]
pub struct DatasetArgs {
    #[arg(long)]
    pub original_dir: Option<PathBuf>,
    #[arg(long)]
    pub edited_dir: Option<PathBuf>,
    /// Keep only the first N files of each directory.
    #[arg(long)]
    pub max_count: Option<usize>,
    /// Earlier result log whose edit paths are skipped (repeatable).
    #[arg(long = "resume")]
    pub resume_logs: Vec<PathBuf>,
    #[arg(long)]
    pub size_filter: bool,
    #[arg(long)]
    pub rank: Option<usize>,
    #[arg(long)]
    pub world_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Doctor {},
    /// Build the dataset and print the pairs this process would audit.
    Plan {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
    /// Audit a single pair and print the verdict.
    Audit {
        #[arg(long)]
        original: PathBuf,
        #[arg(long)]
        edited: PathBuf,
        #[arg(long)]
        prompt: Option<String>,
    },
    Run {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let mut cfg = Config::load(&cfg_path)?;

    match &args.cmd {
        Command::Doctor {} => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            doctor(&cfg)
        }
        Command::Plan { dataset } => {
            apply_dataset_args(&mut cfg, dataset);
            let _guard = init_logging(&args, &cfg, None)?;
            plan(&cfg)
        }
        Command::Audit {
            original,
            edited,
            prompt,
        } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            audit_one(&cfg, original, edited, prompt.as_deref())
        }
        Command::Run { dataset, out_dir } => {
            apply_dataset_args(&mut cfg, dataset);
            if let Some(out) = out_dir {
                cfg.paths.out_dir = out.display().to_string();
            }
            run(&args, &cfg)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("edit-audit.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("edit-audit.example.toml"))
    }
}

pub fn apply_dataset_args(cfg: &mut Config, a: &DatasetArgs) {
    if let Some(d) = &a.original_dir {
        cfg.paths.original_dir = d.display().to_string();
    }
    if let Some(d) = &a.edited_dir {
        cfg.paths.edited_dir = d.display().to_string();
    }
    if let Some(n) = a.max_count {
        cfg.dataset.max_count = n;
    }
    cfg.dataset
        .resume_logs
        .extend(a.resume_logs.iter().map(|p| p.display().to_string()));
    if a.size_filter {
        cfg.size_filter.enabled = true;
    }
    if a.rank.is_some() {
        cfg.workers.rank = a.rank;
    }
    if let Some(w) = a.world_size {
        cfg.workers.world_size = w;
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = PythonAuditor::start(cfg)?;
    let diag = engine.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    if !diag.ok {
        return Err(anyhow!(
            "engine not ready: {}",
            diag.error.as_deref().unwrap_or("no error message")
        ));
    }
    Ok(())
}

fn plan(cfg: &Config) -> Result<()> {
    let mut dataset = PairDataset::from_config(cfg).with_context(|| "building dataset")?;
    if let Some(rank) = cfg.workers.rank {
        dataset.shard(rank, cfg.workers.world_size)?;
    }
    let pairs: Vec<_> = dataset
        .iter()
        .map(|it| {
            serde_json::json!({
                "img_path": paths::display_key(it.original),
                "edit_path": paths::display_key(it.edited),
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "dataset": dataset.report(),
            "shard": dataset.shard_assignment(),
            "prompt": dataset.prompt(),
            "pairs": pairs,
        }))?
    );
    Ok(())
}

fn audit_one(cfg: &Config, original: &Path, edited: &Path, prompt: Option<&str>) -> Result<()> {
    let original = paths::resolve(original);
    let edited = paths::resolve(edited);
    for p in [&original, &edited] {
        if !p.is_file() {
            return Err(anyhow!("input does not exist: {}", p.display()));
        }
    }

    let pipeline = Pipeline::new(cfg, PythonAuditor::new(cfg)?);
    let res = pipeline.audit_pair(&original, &edited, prompt.unwrap_or(cfg.dataset.prompt.as_str()))?;

    println!("Success: {} (Score: {:.4})", res.is_success(), res.score());
    println!("Comment: {}", res.comment());
    if !res.is_success() {
        println!("Refinement Suggestion: {}", res.refine_prompt());
    }
    Ok(())
}

fn run(args: &Args, cfg: &Config) -> Result<()> {
    let original_dir = paths::resolve(&cfg.paths.original_dir);
    let edited_dir = paths::resolve(&cfg.paths.edited_dir);
    let run_id = run_id(&cfg.run_fingerprint(), &original_dir, &edited_dir);

    let run_dir = paths::resolve(&cfg.paths.out_dir).join(&run_id);
    ensure_dir(&run_dir)?;

    let shard = match cfg.workers.rank {
        Some(rank) => Some(Shard::new(rank, cfg.workers.world_size)?),
        None => None,
    };

    let log_path = resolve_log_path(cfg, Some(&run_dir)).map(|p| match shard {
        Some(s) => p.with_extension(format!("rank{:02}.log", s.rank())),
        None => p,
    });
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!("run_id={run_id} out={}", run_dir.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(run_dir.join("effective-config.toml"), raw)?;
    }

    let mut opts = DatasetOptions::from_config(cfg);
    if cfg.global.resume {
        opts.resume_logs
            .extend(workers::existing_results(&run_dir, &cfg.output.results_filename));
    }

    let started = now_rfc3339();
    let dataset = PairDataset::build(&original_dir, &edited_dir, &opts)
        .with_context(|| "building dataset")?;

    let make_engine = |_rank: usize| PythonAuditor::new(cfg);
    let worker_reports = match shard {
        Some(s) => vec![workers::run_worker(cfg, &dataset, Some(s), &run_dir, make_engine)],
        None if cfg.workers.world_size > 1 => {
            workers::run_pool(cfg, &dataset, cfg.workers.world_size, &run_dir, make_engine)?
        }
        None => vec![workers::run_worker(cfg, &dataset, None, &run_dir, make_engine)],
    };

    let report = RunReport {
        run_id: run_id.clone(),
        started,
        finished: now_rfc3339(),
        dataset: dataset.report().clone(),
        workers: worker_reports,
    };

    if cfg.output.write_report_json {
        let name = match shard {
            Some(s) => Path::new(&cfg.output.report_filename)
                .with_extension(format!("rank{:02}.json", s.rank())),
            None => PathBuf::from(&cfg.output.report_filename),
        };
        std::fs::write(run_dir.join(name), serde_json::to_string_pretty(&report)?)?;
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "run_id": run_id,
                "run_dir": run_dir,
                "pairs": dataset.len(),
                "processed": report.processed(),
                "passed": report.passed(),
                "errored": report.errored(),
            }))?
        );
    }

    let broken: Vec<&WorkerReport> = report
        .workers
        .iter()
        .filter(|w| w.init_error.is_some() || w.aborted.is_some())
        .collect();
    if !broken.is_empty() {
        for w in &broken {
            warn!(
                "rank {} left {} pairs unprocessed",
                w.rank,
                w.assigned.saturating_sub(w.processed + w.errored)
            );
        }
        return Err(anyhow!("{} of {} workers failed", broken.len(), report.workers.len()));
    }

    Ok(())
}

fn resolve_log_path(cfg: &Config, run_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(run_dir) = run_dir {
        return Some(run_dir.join("logs").join("edit-audit.log"));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("edit-audit.log"))
}

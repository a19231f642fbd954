use crate::{
    config::Config,
    dataset::{PairDataset, Shard},
    engine::Auditor,
    error::WorkerInitError,
    paths,
    pipeline::Pipeline,
    report::WorkerReport,
    sink::ResultSink,
};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::error;

/// `results.jsonl` unsharded, `results.rank01-of04.jsonl` for rank 1 of 4.
pub fn results_path(run_dir: &Path, filename: &str, shard: Option<Shard>) -> PathBuf {
    match shard {
        None => run_dir.join(filename),
        Some(s) => {
            let p = Path::new(filename);
            let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("results");
            let ext = p.extension().and_then(|s| s.to_str()).unwrap_or("jsonl");
            run_dir.join(format!(
                "{stem}.rank{:02}-of{:02}.{ext}",
                s.rank(), s.world_size()
            ))
        }
    }
}

pub fn existing_results(run_dir: &Path, filename: &str) -> Vec<PathBuf> {
    let p = Path::new(filename);
    let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("results");
    let Ok(entries) = std::fs::read_dir(run_dir) else {
        return Vec::new();
    };
    let mut out: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|path| {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            name == filename || (name.starts_with(&format!("{stem}.rank")) && name.ends_with(".jsonl"))
        })
        .collect();
    out.sort();
    out
}

pub fn run_worker<A, F>(
    cfg: &Config,
    dataset: &PairDataset,
    shard: Option<Shard>,
    run_dir: &Path,
    make_engine: F,
) -> WorkerReport
where
    A: Auditor,
    F: FnOnce(usize) -> Result<A>,
{
    let rank = shard.map(|s| s.rank()).unwrap_or(0);
    let results = results_path(run_dir, &cfg.output.results_filename, shard);
    let mut report = WorkerReport {
        rank,
        world_size: shard.map(|s| s.world_size()).unwrap_or(1),
        results_path: paths::display_key(&results),
        ..Default::default()
    };

    let ds = match shard {
        Some(s) => dataset.with_shard(s),
        None => dataset.clone(),
    };
    report.assigned = ds.assigned_len();

    let init = make_engine(rank).and_then(|engine| Ok((engine, ResultSink::open(&results)?)));
    let (engine, sink) = match init {
        Ok(v) => v,
        Err(err) => {
            let err = WorkerInitError {
                rank,
                reason: format!("{err:#}"),
            };
            error!("{err}");
            report.init_error = Some(err.to_string());
            return report;
        }
    };

    let pipeline = Pipeline::new(cfg, engine);
    if let Err(err) = pipeline.run_shard(&ds, &sink, &mut report) {
        error!("rank {rank} aborted: {err:#}");
        report.aborted = Some(format!("{err:#}"));
    }
    report
}

/// Runs `world_size` workers concurrently and waits for all of them.
///
/// Reports come back in rank order. A panicking worker is reported as aborted;
/// its shard is not reassigned.
pub fn run_pool<A, F>(
    cfg: &Config,
    dataset: &PairDataset,
    world_size: usize,
    run_dir: &Path,
    make_engine: F,
) -> Result<Vec<WorkerReport>>
where
    A: Auditor,
    F: Fn(usize) -> Result<A> + Sync,
{
    let shards = (0..world_size)
        .map(|rank| Shard::new(rank, world_size))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let reports = std::thread::scope(|scope| {
        let make_engine = &make_engine;
        let handles: Vec<_> = shards
            .iter()
            .map(|&shard| {
                scope.spawn(move || run_worker(cfg, dataset, Some(shard), run_dir, make_engine))
            })
            .collect();

        handles
            .into_iter()
            .zip(&shards)
            .map(|(handle, shard)| match handle.join() {
                Ok(report) => report,
                Err(_) => {
                    error!("worker {} panicked", shard.rank());
                    WorkerReport {
                        rank: shard.rank(),
                        world_size,
                        results_path: paths::display_key(&results_path(
                            run_dir,
                            &cfg.output.results_filename,
                            Some(*shard),
                        )),
                        aborted: Some("worker panicked".into()),
                        ..Default::default()
                    }
                }
            })
            .collect()
    });
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_path_names() {
        let dir = Path::new("/runs/x");
        assert_eq!(
            results_path(dir, "results.jsonl", None),
            PathBuf::from("/runs/x/results.jsonl")
        );
        assert_eq!(
            results_path(dir, "results.jsonl", Some(Shard::new(1, 4).unwrap())),
            PathBuf::from("/runs/x/results.rank01-of04.jsonl")
        );
    }

    #[test]
    fn existing_results_finds_plain_and_ranked_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "results.jsonl",
            "results.rank00-of02.jsonl",
            "report.json",
            "other.jsonl",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let found: Vec<_> = existing_results(dir.path(), "results.jsonl")
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, ["results.jsonl", "results.rank00-of02.jsonl"]);
    }
}

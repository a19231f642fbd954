use crate::{
    config::{Config, Pairing},
    error::DatasetError,
    paths,
    prompts::USER_PROMPT,
    report::DatasetReport,
    resume::ResumeLedger,
    size_filter::{self, SizeLimits},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePair {
    pub original: PathBuf,
    pub edited: PathBuf,
}

/// Static striped partition: rank `r` owns positions `r, r + n, r + 2n, ...`.
///
/// Only [`Shard::new`] builds one, so `rank < world_size` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Shard {
    rank: usize,
    world_size: usize,
}

impl Shard {
    pub fn new(rank: usize, world_size: usize) -> Result<Self, DatasetError> {
        if world_size == 0 || rank >= world_size {
            return Err(DatasetError::InvalidShard { rank, world_size });
        }
        Ok(Self { rank, world_size })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }
}

#[derive(Debug, Clone)]
pub struct DatasetOptions {
    pub extension: String,
    pub pairing: Pairing,
    pub max_count: Option<usize>,
    pub size_filter: Option<SizeLimits>,
    pub progress_every: usize,
    pub resume_logs: Vec<PathBuf>,
    pub prompt: String,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            extension: "png".into(),
            pairing: Pairing::Positional,
            max_count: None,
            size_filter: None,
            progress_every: 500,
            resume_logs: Vec::new(),
            prompt: USER_PROMPT.into(),
        }
    }
}

impl DatasetOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            extension: cfg.dataset.extension.clone(),
            pairing: cfg.dataset.pairing,
            max_count: cfg.dataset.max_count(),
            size_filter: cfg
                .size_filter
                .enabled
                .then(|| SizeLimits::from(&cfg.size_filter)),
            progress_every: cfg.size_filter.progress_every,
            resume_logs: paths::resolve_all(&cfg.dataset.resume_logs),
            prompt: cfg.dataset.prompt.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PairItem<'a> {
    pub original: &'a Path,
    pub edited: &'a Path,
    pub prompt: &'a str,
}

#[derive(Debug, Clone)]
pub struct PairDataset {
    pairs: Vec<ImagePair>,
    shard: Option<Shard>,
    prompt: String,
    report: DatasetReport,
}

impl PairDataset {
    pub fn build(
        original_dir: impl AsRef<Path>,
        edited_dir: impl AsRef<Path>,
        opts: &DatasetOptions,
    ) -> Result<Self, DatasetError> {
        let original_dir = paths::resolve(original_dir);
        let edited_dir = paths::resolve(edited_dir);

        let mut originals = list_images(&original_dir, &opts.extension)?;
        let mut edits = list_images(&edited_dir, &opts.extension)?;

        let mut report = DatasetReport {
            original_dir: paths::display_key(&original_dir),
            edited_dir: paths::display_key(&edited_dir),
            listed_original: originals.len(),
            listed_edited: edits.len(),
            ..Default::default()
        };

        if originals.len() != edits.len() {
            let msg = format!(
                "edit count ({}) does not equal original count ({})",
                edits.len(),
                originals.len()
            );
            warn!("{msg}");
            report.warnings.push(msg);
        }

        if let Some(n) = opts.max_count {
            originals.truncate(n);
            edits.truncate(n);
        }

        let mut pairs = match opts.pairing {
            Pairing::Positional => pair_positional(originals, edits),
            Pairing::ByName => {
                let pairs = pair_by_name(originals, edits, &mut report.warnings);
                if pairs.is_empty() {
                    return Err(DatasetError::NoNameMatches {
                        original_dir,
                        edited_dir,
                    });
                }
                pairs
            }
        };
        report.paired = pairs.len();

        if let Some(limits) = opts.size_filter {
            let (kept, stats) = size_filter::filter(pairs, limits, opts.progress_every);
            if stats.dropped() > 0 {
                report.warnings.push(format!(
                    "size filter dropped {} pairs ({} unreadable)",
                    stats.dropped(),
                    stats.unreadable
                ));
            }
            pairs = kept;
            report.size_filter = Some(stats);
        }

        if !opts.resume_logs.is_empty() {
            apply_resume(&mut pairs, &opts.resume_logs, &mut report);
        }

        report.final_count = pairs.len();
        info!(
            "dataset ready pairs={} (listed {}/{})",
            report.final_count, report.listed_original, report.listed_edited
        );

        Ok(Self {
            pairs,
            shard: None,
            prompt: opts.prompt.clone(),
            report,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, DatasetError> {
        Self::build(
            &cfg.paths.original_dir,
            &cfg.paths.edited_dir,
            &DatasetOptions::from_config(cfg),
        )
    }

    /// Restricts iteration to one stride of the collection. Set it once, before iterating.
    pub fn shard(&mut self, rank: usize, world_size: usize) -> Result<(), DatasetError> {
        if let Some(current) = self.shard {
            return Err(DatasetError::ShardAlreadySet {
                rank: current.rank,
                world_size: current.world_size,
            });
        }
        self.shard = Some(Shard::new(rank, world_size)?);
        Ok(())
    }

    pub fn with_shard(&self, shard: Shard) -> Self {
        Self {
            shard: Some(shard),
            ..self.clone()
        }
    }

    pub fn shard_assignment(&self) -> Option<Shard> {
        self.shard
    }

    pub fn iter(&self) -> impl Iterator<Item = PairItem<'_>> + '_ {
        let (start, step) = match self.shard {
            Some(s) => (s.rank, s.world_size),
            None => (0, 1),
        };
        self.pairs
            .iter()
            .skip(start)
            .step_by(step)
            .map(|p| PairItem {
                original: &p.original,
                edited: &p.edited,
                prompt: &self.prompt,
            })
    }

    pub fn assigned_len(&self) -> usize {
        match self.shard {
            Some(s) if s.rank < self.pairs.len() => {
                (self.pairs.len() - s.rank).div_ceil(s.world_size)
            }
            Some(_) => 0,
            None => self.pairs.len(),
        }
    }

    pub fn pairs(&self) -> &[ImagePair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn report(&self) -> &DatasetReport {
        &self.report
    }
}

impl<'a> IntoIterator for &'a PairDataset {
    type Item = PairItem<'a>;
    type IntoIter = Box<dyn Iterator<Item = PairItem<'a>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Files directly under `dir` with extension `ext`, sorted by path.
pub fn list_images(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, DatasetError> {
    let read_err = |source: std::io::Error| DatasetError::ReadDir {
        dir: dir.to_path_buf(),
        source,
    };
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext) {
            out.push(path);
        }
    }
    if out.is_empty() {
        return Err(DatasetError::Empty {
            dir: dir.to_path_buf(),
            extension: ext.to_string(),
        });
    }
    out.sort();
    Ok(out)
}

fn pair_positional(originals: Vec<PathBuf>, edits: Vec<PathBuf>) -> Vec<ImagePair> {
    originals
        .into_iter()
        .zip(edits)
        .map(|(o, e)| ImagePair {
            original: paths::resolve(o),
            edited: paths::resolve(e),
        })
        .collect()
}

fn pair_by_name(
    originals: Vec<PathBuf>,
    edits: Vec<PathBuf>,
    warnings: &mut Vec<String>,
) -> Vec<ImagePair> {
    let mut by_name: HashMap<_, _> = edits
        .into_iter()
        .filter_map(|e| Some((e.file_name()?.to_os_string(), e)))
        .collect();

    let mut pairs = Vec::with_capacity(originals.len());
    let mut unmatched_original = 0usize;
    for o in originals {
        let edited = o.file_name().and_then(|name| by_name.remove(name));
        match edited {
            Some(e) => pairs.push(ImagePair {
                original: paths::resolve(o),
                edited: paths::resolve(e),
            }),
            None => unmatched_original += 1,
        }
    }

    if unmatched_original > 0 || !by_name.is_empty() {
        let msg = format!(
            "name pairing left {} originals and {} edits unmatched",
            unmatched_original,
            by_name.len()
        );
        warn!("{msg}");
        warnings.push(msg);
    }
    pairs
}

fn apply_resume(pairs: &mut Vec<ImagePair>, logs: &[PathBuf], report: &mut DatasetReport) {
    let ledger = match ResumeLedger::load(logs) {
        Ok(ledger) => ledger,
        Err(err) => {
            let msg = format!("resume skipped, keeping all pairs: {err}");
            warn!("{msg}");
            report.resume_error = Some(err.to_string());
            report.warnings.push(msg);
            return;
        }
    };
    report.resume_sources = ledger
        .sources()
        .iter()
        .map(|p| paths::display_key(p))
        .collect();
    if ledger.is_empty() {
        return;
    }

    let before = pairs.len();
    pairs.retain(|p| !ledger.contains(&paths::display_key(&p.edited)));
    let after = pairs.len();
    report.resume_skipped = before - after;
    info!("resume: remaining {before} -> {after}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset_of(n: usize) -> PairDataset {
        PairDataset {
            pairs: (0..n)
                .map(|i| ImagePair {
                    original: PathBuf::from(format!("/o/{i}.png")),
                    edited: PathBuf::from(format!("/e/{i}.png")),
                })
                .collect(),
            shard: None,
            prompt: USER_PROMPT.into(),
            report: DatasetReport::default(),
        }
    }

    fn edited_indices(ds: &PairDataset) -> Vec<String> {
        ds.iter()
            .map(|it| it.edited.file_stem().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn rank_zero_is_a_real_shard() {
        let mut ds = dataset_of(4);
        ds.shard(0, 2).unwrap();
        assert_eq!(edited_indices(&ds), ["0", "2"]);
        let mut ds = dataset_of(4);
        ds.shard(1, 2).unwrap();
        assert_eq!(edited_indices(&ds), ["1", "3"]);
    }

    #[test]
    fn shards_partition_the_collection() {
        for n in 0..12 {
            for world in 1..6 {
                let base = dataset_of(n);
                let mut seen = Vec::new();
                for rank in 0..world {
                    let shard = base.with_shard(Shard::new(rank, world).unwrap());
                    assert_eq!(shard.assigned_len(), shard.iter().count());
                    seen.extend(shard.iter().map(|it| it.edited.to_path_buf()));
                }
                seen.sort();
                let mut all: Vec<_> = base.pairs().iter().map(|p| p.edited.clone()).collect();
                all.sort();
                assert_eq!(seen, all, "n={n} world={world}");
            }
        }
    }

    #[test]
    fn invalid_shards_are_rejected() {
        assert!(Shard::new(0, 0).is_err());
        assert!(Shard::new(2, 2).is_err());
        let mut ds = dataset_of(2);
        ds.shard(0, 1).unwrap();
        assert!(matches!(
            ds.shard(0, 1),
            Err(DatasetError::ShardAlreadySet { .. })
        ));
    }

    #[test]
    fn iteration_is_repeatable_and_carries_prompt() {
        let ds = dataset_of(3);
        assert_eq!(ds.iter().count(), 3);
        assert_eq!(ds.iter().count(), 3);
        assert!(ds.iter().all(|it| it.prompt == "Has this picture edited properly?"));
    }

    #[test]
    fn rejected_shard_leaves_dataset_unsharded() {
        let mut ds = dataset_of(5);
        for (rank, world) in [(0, 0), (3, 2)] {
            assert!(matches!(
                ds.shard(rank, world),
                Err(DatasetError::InvalidShard { .. })
            ));
        }
        assert_eq!(ds.shard_assignment(), None);
        assert_eq!(ds.iter().count(), 5);
        assert_eq!(ds.assigned_len(), 5);

        let s = Shard::new(1, 3).unwrap();
        assert_eq!((s.rank(), s.world_size()), (1, 3));
        let ds = ds.with_shard(s);
        assert_eq!(edited_indices(&ds), ["1", "4"]);
    }
}

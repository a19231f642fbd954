use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub dataset: Dataset,
    #[serde(default)]
    pub size_filter: SizeFilter,
    #[serde(default)]
    pub scoring: Scoring,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub workers: Workers,
    #[serde(default)]
    pub run: Run,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }

    /// Hash input that identifies a run: everything that changes which pairs are
    /// audited or how, and nothing about sharding, logging or output location.
    pub fn run_fingerprint(&self) -> String {
        let mut c = self.clone();
        c.global = Global {
            job_name: c.global.job_name,
            ..Default::default()
        };
        c.paths.out_dir.clear();
        c.dataset.resume_logs.clear();
        c.workers = Workers::default();
        c.run = Run::default();
        c.output = Output::default();
        c.logging = Logging::default();
        c.debug = Debug::default();
        c.normalized_for_hash()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub job_name: String,
    /// Seed the resume ledger from result files already in the run directory.
    pub resume: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            job_name: "default".into(),
            resume: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub original_dir: String,
    pub edited_dir: String,
    pub out_dir: String,
    pub scripts_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            original_dir: "input".into(),
            edited_dir: "output".into(),
            out_dir: "out".into(),
            scripts_dir: "scripts".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pairing {
    Positional,
    ByName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub extension: String,
    pub pairing: Pairing,
    /// 0 means no cap.
    pub max_count: usize,
    pub resume_logs: Vec<String>,
    pub prompt: String,
}
impl Default for Dataset {
    fn default() -> Self {
        Self {
            extension: "png".into(),
            pairing: Pairing::Positional,
            max_count: 0,
            resume_logs: Vec::new(),
            prompt: crate::prompts::USER_PROMPT.into(),
        }
    }
}

impl Dataset {
    pub fn max_count(&self) -> Option<usize> {
        (self.max_count > 0).then_some(self.max_count)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeFilter {
    pub enabled: bool,
    pub max_pixels: u64,
    pub max_edge: u32,
    pub progress_every: usize,
}
impl Default for SizeFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            max_pixels: 2048 * 2048,
            max_edge: 3000,
            progress_every: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scoring {
    pub flag: String,
    pub softmax: bool,
    pub positive_word: String,
    pub negative_word: String,
}
impl Default for Scoring {
    fn default() -> Self {
        Self {
            flag: crate::result::DEFAULT_FLAG.into(),
            softmax: false,
            positive_word: "yes".into(),
            negative_word: "no".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub python_exe: String,
    pub script: String,
    pub model_path: String,
    pub device_map: String,
    pub max_new_tokens: u32,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Engine {
    fn default() -> Self {
        Self {
            python_exe: "python3".into(),
            script: "vl_auditor.py".into(),
            model_path: "".into(),
            device_map: "auto".into(),
            max_new_tokens: 256,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workers {
    pub world_size: usize,
    /// When set, this process runs only that shard.
    pub rank: Option<usize>,
}
impl Default for Workers {
    fn default() -> Self {
        Self {
            world_size: 1,
            rank: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Run {
    pub stop_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub results_filename: String,
    pub write_report_json: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            results_filename: "results.jsonl".into(),
            write_report_json: true,
            report_filename: "report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub keep_engine_stderr: bool,
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_engine_stderr: true,
            dump_effective_config: true,
        }
    }
}

use crate::size_filter::SizeFilterStats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetReport {
    pub original_dir: String,
    pub edited_dir: String,
    pub listed_original: usize,
    pub listed_edited: usize,
    pub paired: usize,
    pub size_filter: Option<SizeFilterStats>,
    pub resume_sources: Vec<String>,
    pub resume_skipped: usize,
    pub resume_error: Option<String>,
    pub final_count: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerReport {
    pub rank: usize,
    pub world_size: usize,
    pub results_path: String,
    pub assigned: usize,
    pub processed: usize,
    pub passed: usize,
    pub errored: usize,
    pub init_error: Option<String>,
    pub aborted: Option<String>,
    pub errors: Vec<ItemError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    pub img_path: String,
    pub edit_path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started: String,
    pub finished: String,
    pub dataset: DatasetReport,
    pub workers: Vec<WorkerReport>,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.workers.iter().map(|w| w.processed).sum()
    }

    pub fn passed(&self) -> usize {
        self.workers.iter().map(|w| w.passed).sum()
    }

    pub fn errored(&self) -> usize {
        self.workers.iter().map(|w| w.errored).sum()
    }
}

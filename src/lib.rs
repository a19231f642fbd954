pub mod cli;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod result;
pub mod resume;
pub mod score;
pub mod sink;
pub mod size_filter;
pub mod util;
pub mod workers;

pub use dataset::{ImagePair, PairDataset, Shard};
pub use result::EvaluationResult;
pub use score::ScoreDeriver;
pub use sink::{Record, ResultSink};

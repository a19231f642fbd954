use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("no *.{extension} files in {dir}")]
    Empty { dir: PathBuf, extension: String },
    #[error("reading directory {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid shard rank={rank} world_size={world_size}")]
    InvalidShard { rank: usize, world_size: usize },
    #[error("dataset already sharded as rank={rank} world_size={world_size}")]
    ShardAlreadySet { rank: usize, world_size: usize },
    #[error("no pairs matched by name between {original_dir} and {edited_dir}")]
    NoNameMatches {
        original_dir: PathBuf,
        edited_dir: PathBuf,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    #[error("reading resume log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("resume log {path} line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("record is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, thiserror::Error)]
#[error("worker {rank} failed to initialize: {reason}")]
pub struct WorkerInitError {
    pub rank: usize,
    pub reason: String,
}

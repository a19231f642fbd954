//! Concurrent workers must write to distinct files; there is no locking.

use crate::{error::SinkError, result::EvaluationResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub enum Record {
    Evaluation(EvaluationResult),
    Mapping(Map<String, Value>),
}

impl From<EvaluationResult> for Record {
    fn from(r: EvaluationResult) -> Self {
        Record::Evaluation(r)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(m: Map<String, Value>) -> Self {
        Record::Mapping(m)
    }
}

impl Record {
    /// An evaluation with caller-owned fields merged on top of its record shape.
    pub fn merged<S: Serialize>(result: &EvaluationResult, extra: &S) -> Result<Self, SinkError> {
        let mut base = into_object(serde_json::to_value(result.to_record())?)?;
        base.extend(into_object(serde_json::to_value(extra)?)?);
        Ok(Record::Mapping(base))
    }

    pub fn to_json(&self) -> Result<String, SinkError> {
        let line = match self {
            Record::Evaluation(r) => serde_json::to_string(&r.to_record())?,
            Record::Mapping(m) => serde_json::to_string(m)?,
        };
        Ok(line)
    }
}

fn into_object(v: Value) -> Result<Map<String, Value>, SinkError> {
    match v {
        Value::Object(m) => Ok(m),
        _ => Err(SinkError::NotAnObject),
    }
}

#[derive(Debug, Clone)]
pub struct ResultSink {
    path: PathBuf,
}

impl ResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Fails early when the file cannot be opened for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let sink = Self::new(path);
        sink.open_append()?;
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: impl Into<Record>) -> Result<(), SinkError> {
        self.append_all(std::iter::once(record.into()))
    }

    pub fn append_all<I>(&self, records: I) -> Result<(), SinkError>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut writer = BufWriter::new(self.open_append()?);
        for record in records {
            let line = record.to_json()?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    fn open_append(&self) -> Result<std::fs::File, SinkError> {
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?)
    }
}

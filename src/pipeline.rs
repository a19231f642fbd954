use crate::{
    config::Config,
    dataset::{PairDataset, PairItem},
    engine::{AuditIn, Auditor},
    paths,
    prompts::SYSTEM_PROMPT,
    report::{ItemError, WorkerReport},
    result::EvaluationResult,
    score::ScoreDeriver,
    sink::{Record, ResultSink},
};
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
pub struct PairPaths {
    pub img_path: String,
    pub edit_path: String,
}

pub struct Pipeline<A: Auditor> {
    cfg: Config,
    engine: A,
    scorer: ScoreDeriver,
}

impl<A: Auditor> Pipeline<A> {
    pub fn new(cfg: &Config, engine: A) -> Self {
        Self {
            cfg: cfg.clone(),
            engine,
            scorer: ScoreDeriver::from_config(cfg),
        }
    }

    pub fn engine(&self) -> &A {
        &self.engine
    }

    pub fn audit_pair(&self, original: &Path, edited: &Path, prompt: &str) -> Result<EvaluationResult> {
        let req = AuditIn {
            system_prompt: SYSTEM_PROMPT.to_string(),
            original: paths::display_key(original),
            edited: paths::display_key(edited),
            user_prompt: prompt.to_string(),
            max_new_tokens: self.cfg.engine.max_new_tokens,
            score_tokens: self.scorer.candidate_forms(),
        };

        let out = self
            .engine
            .audit(&req)
            .with_context(|| format!("auditing {}", edited.display()))?;
        if !out.ok {
            return Err(anyhow!(
                "engine failed on {}: {}",
                edited.display(),
                out.error.unwrap_or_else(|| "unknown error".into())
            ));
        }

        let weights = self.scorer.class_weights(&out.logits(), &out.vocabulary());
        debug!(
            "weights {}={} {}={}",
            self.cfg.scoring.positive_word,
            weights.positive,
            self.cfg.scoring.negative_word,
            weights.negative
        );

        Ok(EvaluationResult::with_flag(
            out.raw_response,
            weights.score(),
            self.cfg.scoring.flag.clone(),
        ))
    }

    /// Audits every item `dataset` yields, appending each result to `sink` in order.
    ///
    /// Engine failures are recorded per item and skipped unless
    /// `run.stop_on_error` is set. Sink failures always abort.
    pub fn run_shard(
        &self,
        dataset: &PairDataset,
        sink: &ResultSink,
        report: &mut WorkerReport,
    ) -> Result<()> {
        report.assigned = dataset.assigned_len();
        info!(
            "rank {} auditing {} pairs -> {}",
            report.rank,
            report.assigned,
            sink.path().display()
        );

        for (i, item) in dataset.iter().enumerate() {
            match self.process(item, sink) {
                Ok(result) => {
                    report.processed += 1;
                    if result.is_success() {
                        report.passed += 1;
                    }
                    debug!(
                        "[{}/{}] {} score={:.4} success={}",
                        i + 1,
                        report.assigned,
                        item.edited.display(),
                        result.score(),
                        result.is_success()
                    );
                }
                Err(err) if self.cfg.run.stop_on_error => return Err(err),
                Err(err) => {
                    warn!("skipping {}: {:#}", item.edited.display(), err);
                    report.errored += 1;
                    report.errors.push(ItemError {
                        img_path: paths::display_key(item.original),
                        edit_path: paths::display_key(item.edited),
                        error: format!("{err:#}"),
                    });
                }
            }
        }

        info!(
            "rank {} done processed={} passed={} errored={}",
            report.rank, report.processed, report.passed, report.errored
        );
        Ok(())
    }

    fn process(&self, item: PairItem<'_>, sink: &ResultSink) -> Result<EvaluationResult> {
        let result = self.audit_pair(item.original, item.edited, item.prompt)?;
        let extra = PairPaths {
            img_path: paths::display_key(item.original),
            edit_path: paths::display_key(item.edited),
        };
        let record = Record::merged(&result, &extra)?;
        sink.append(record)
            .with_context(|| format!("appending to {}", sink.path().display()))?;
        Ok(result)
    }
}

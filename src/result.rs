use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_FLAG: &str = "ROP";

/// Scores strictly above this count as a passing edit.
pub const SUCCESS_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    score: f64,
    raw_response: String,
    flag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub score: f64,
    pub is_success: bool,
    pub comment: String,
    pub refine_prompt: String,
}

impl EvaluationResult {
    pub fn new(raw_response: impl Into<String>, score: f64) -> Self {
        Self::with_flag(raw_response, score, DEFAULT_FLAG)
    }

    pub fn with_flag(raw_response: impl Into<String>, score: f64, flag: impl Into<String>) -> Self {
        Self {
            score,
            raw_response: raw_response.into(),
            flag: flag.into(),
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn raw_response(&self) -> &str {
        &self.raw_response
    }

    pub fn flag(&self) -> &str {
        &self.flag
    }

    pub fn is_success(&self) -> bool {
        self.score > SUCCESS_THRESHOLD
    }

    /// Text before the first flag, trimmed. The whole response when there is no flag.
    pub fn comment(&self) -> &str {
        match self.split() {
            Some((head, _)) => head.trim(),
            None => self.raw_response.trim(),
        }
    }

    /// Text after the first flag, trimmed. Empty on success or when the flag is absent.
    pub fn refine_prompt(&self) -> &str {
        if self.is_success() {
            return "";
        }
        match self.split() {
            Some((_, tail)) => tail.trim(),
            None => "",
        }
    }

    pub fn to_record(&self) -> ResultRecord {
        ResultRecord {
            score: self.score,
            is_success: self.is_success(),
            comment: self.comment().to_string(),
            refine_prompt: self.refine_prompt().to_string(),
        }
    }

    fn split(&self) -> Option<(&str, &str)> {
        if self.flag.is_empty() {
            return None;
        }
        self.raw_response.split_once(self.flag.as_str())
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Success: {} | Score: {:.4}\nPrompt: {}",
            self.is_success(),
            self.score,
            self.comment()
        )
    }
}

impl From<&EvaluationResult> for ResultRecord {
    fn from(r: &EvaluationResult) -> Self {
        r.to_record()
    }
}

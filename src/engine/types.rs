use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDiag {
    pub python_exe: String,
    pub python_version: String,
    pub torch_version: Option<String>,
    pub transformers_version: Option<String>,
    pub device: Option<String>,
    pub model_path: String,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// One stateless audit request: the whole conversation travels with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditIn {
    pub system_prompt: String,
    pub original: String,
    pub edited: String,
    pub user_prompt: String,
    pub max_new_tokens: u32,
    /// Surface forms whose token id and next-token logit must be reported.
    pub score_tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLogit {
    pub surface: String,
    /// `None` when the tokenizer maps the form to its unknown token.
    pub token_id: Option<u32>,
    pub logit: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditOut {
    pub ok: bool,
    #[serde(default)]
    pub raw_response: String,
    #[serde(default)]
    pub candidates: Vec<TokenLogit>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AuditOut {
    pub fn vocabulary(&self) -> HashMap<String, u32> {
        self.candidates
            .iter()
            .filter_map(|c| Some((c.surface.clone(), c.token_id?)))
            .collect()
    }

    pub fn logits(&self) -> HashMap<u32, f64> {
        self.candidates
            .iter()
            .filter_map(|c| Some((c.token_id?, c.logit?)))
            .collect()
    }
}

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use edit_audit::engine::{AuditIn, AuditOut, Auditor, EngineDiag, TokenLogit};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub fn write_png(path: &Path, w: u32, h: u32) {
    image::RgbImage::new(w, h).save(path).unwrap();
}

/// Creates `dir/name` and fills it with `names` as 4x4 PNGs.
pub fn image_dir(root: &Path, name: &str, names: &[&str]) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for n in names {
        write_png(&dir.join(n), 4, 4);
    }
    dir
}

fn candidates(yes: f64, no: f64) -> Vec<TokenLogit> {
    vec![
        TokenLogit {
            surface: "Yes".into(),
            token_id: Some(9454),
            logit: Some(yes),
        },
        TokenLogit {
            surface: " yes".into(),
            token_id: None,
            logit: None,
        },
        TokenLogit {
            surface: "No".into(),
            token_id: Some(2753),
            logit: Some(no),
        },
    ]
}

/// Passes every pair except edits whose file name contains `reject`, and
/// errors on names containing `explode`.
#[derive(Default)]
pub struct FakeAuditor {
    pub calls: Mutex<Vec<String>>,
}

impl Auditor for FakeAuditor {
    fn doctor(&self) -> Result<EngineDiag> {
        Ok(EngineDiag {
            python_exe: "fake".into(),
            python_version: "0".into(),
            torch_version: None,
            transformers_version: None,
            device: None,
            model_path: "fake".into(),
            ok: true,
            error: None,
        })
    }

    fn audit(&self, req: &AuditIn) -> Result<AuditOut> {
        self.calls.lock().unwrap().push(req.edited.clone());
        assert_eq!(req.score_tokens.len(), 8);
        let name = Path::new(&req.edited)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        if name.contains("explode") {
            return Err(anyhow!("engine crashed on {name}"));
        }
        let out = if name.contains("reject") {
            AuditOut {
                ok: true,
                raw_response: "No. The background shifted. ROP Keep the background untouched.".into(),
                candidates: candidates(1.0, 5.0),
                error: None,
            }
        } else {
            AuditOut {
                ok: true,
                raw_response: "Yes. Clean edit. ROP".into(),
                candidates: candidates(5.0, 1.0),
                error: None,
            }
        };
        Ok(out)
    }
}

pub fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

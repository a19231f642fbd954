use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use time::format_description::well_known::Rfc3339;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Short, stable id for a run: same config and inputs land in the same run directory.
pub fn run_id(config_norm: &str, original_dir: &Path, edited_dir: &Path) -> String {
    let full = sha256_hex(
        format!(
            "{}:{}:{}",
            config_norm,
            original_dir.display(),
            edited_dir.display()
        )
        .as_bytes(),
    );
    full[..16].to_string()
}

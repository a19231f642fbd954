pub mod python;
pub mod types;

use anyhow::Result;

pub use python::PythonAuditor;
pub use types::{AuditIn, AuditOut, EngineDiag, TokenLogit};

/// The vision-language model behind the auditor. Each call is independent;
/// implementations keep no conversation state between requests.
pub trait Auditor {
    fn doctor(&self) -> Result<EngineDiag>;
    fn audit(&self, req: &AuditIn) -> Result<AuditOut>;
}

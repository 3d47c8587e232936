use miette::Diagnostic;
use thiserror::Error;

use crate::audit::errors::AuditError;
use crate::snapshot::SnapshotError;

#[derive(Debug, Error, Diagnostic)]
pub enum PlumbError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(plumbline::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(plumbline::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(plumbline::serde))]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Snapshot(#[from] SnapshotError),
}

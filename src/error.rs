use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid research id: {0}")]
    InvalidResearchId(String),

    #[error("invalid language tag: {0}")]
    InvalidLang(String),

    #[error("invalid page key: {0}")]
    InvalidPageKey(String),

    #[error("missing config file humandbs.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("cross-reference request failed: {0}")]
    XrefHttp(String),

    #[error("cross-reference service returned status {status}: {message}")]
    XrefStatus { status: u16, message: String },

    #[error("portal request failed: {0}")]
    PortalHttp(String),

    #[error("portal returned status {status}: {message}")]
    PortalStatus { status: u16, message: String },

    #[error("malformed parse result for {key}: {reason}")]
    MalformedPage { key: String, reason: String },

    #[error("no page versions found for {0}")]
    NoPageVersions(String),

    #[error("document {0} already exists with different content")]
    Conflict(String),

    #[error("worker for {0} panicked")]
    WorkerPanicked(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl PipelineError {
    /// Transient network failures that may succeed on a later run.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            PipelineError::XrefHttp(_)
                | PipelineError::XrefStatus { .. }
                | PipelineError::PortalHttp(_)
                | PipelineError::PortalStatus { .. }
        )
    }
}

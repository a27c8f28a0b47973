use thiserror::Error;

/// Fatal run outcomes. Each maps onto a process exit status.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("{} global record(s) have no lookup entry", .0.len())]
    GlobalLinkage(Vec<String>),

    #[error("{} US record(s) have no lookup entry", .0.len())]
    DomesticLinkage(Vec<String>),

    #[error("{} deaths/recovered record(s) were never linked", .0.len())]
    Unresolved(Vec<String>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Unresolved(_) => 1,
            PipelineError::GlobalLinkage(_) => 2,
            PipelineError::DomesticLinkage(_) => 3,
            PipelineError::Parse { .. } | PipelineError::Config(_) | PipelineError::Storage(_) => 4,
        }
    }

    /// Per-record diagnostics collected before the abort.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            PipelineError::GlobalLinkage(m)
            | PipelineError::DomesticLinkage(m)
            | PipelineError::Unresolved(m) => m,
            _ => &[],
        }
    }
}

/// Exit status for any error surfaced by the run.
pub fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<PipelineError>()
        .map(PipelineError::exit_code)
        .unwrap_or(4)
}

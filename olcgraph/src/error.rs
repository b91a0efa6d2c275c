use thiserror::Error;

/// Failures surfaced to the caller of an assembly run.
/// Broken graph invariants are not represented here: they panic.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid profile: {0}")]
    Profile(String),
    #[error("worker pool did not terminate within {seconds} seconds ({pending} tasks pending)")]
    PoolTimeout { seconds: u64, pending: usize },
    #[error("worker task {0} panicked")]
    WorkerPanic(usize),
}

pub type Result<T> = std::result::Result<T, AssemblyError>;

use build_core::error::BuildError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Kube error, {0}")]
    KubeError(#[from] kube::Error),

    // Unbuildable request, retried until someone fixes the spec
    #[error("Job construction error, {0}")]
    BuildError(#[from] BuildError),

    // Optimistic concurrency rejected a write, the whole reconcile runs again
    #[error("Write conflict, {0}")]
    Conflict(String),

    #[error("IO error, {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal server error, {0}")]
    InternalServerError(String),
}

use std::future::Future;

use build_core::crds::{BuildRequest, BuildStatus};
use k8s_openapi::api::batch::v1::Job;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCreation {
    Created,
    /// A job with the same name is already there, i.e. an earlier attempt got it in
    AlreadyExists,
}

/// The record store the reconciler drives, the API server in production.
pub trait BuildStore: Send + Sync {
    fn get_build(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<BuildRequest>, AppError>> + Send;

    fn get_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<Job>, AppError>> + Send;

    fn create_job(&self, job: &Job) -> impl Future<Output = Result<JobCreation, AppError>> + Send;

    /// Writes `status` onto `build`. Fails with [`AppError::Conflict`] when the stored object
    /// moved past the resourceVersion `build` was read at.
    fn update_status(
        &self,
        build: &BuildRequest,
        status: &BuildStatus,
    ) -> impl Future<Output = Result<BuildRequest, AppError>> + Send;

    /// Deletes the request together with everything it owns. Deleting a missing request is not an error.
    fn delete_build(&self, build: &BuildRequest)
    -> impl Future<Output = Result<(), AppError>> + Send;
}

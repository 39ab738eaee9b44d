use build_core::{
    configs::JobTemplateConfig,
    crds::{BuildPhase, BuildRequest, BuildStatus, CallbackStatus},
    determiners::{JobObservation, determine_build_phase, is_owned_by, should_delete},
    formatters::format_job_name,
    job_builder::build_job,
};
use chrono::Utc;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::services::{
    callback::Notifier,
    store::{BuildStore, JobCreation},
};

/// What a single reconcile pass ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No request under this identity
    Gone,
    /// Request is being deleted by someone else
    Terminating,
    /// Job created (or found created) and the request moved to `Running`
    JobSubmitted,
    /// Job has not finished yet
    InProgress,
    /// Terminal and kept around for inspection
    Retained,
    /// Succeeded, notified and deleted together with its job
    Deleted,
}

/// Drives one build request towards its next state.
///
/// Every step is safe to repeat: a pass can be cut short anywhere (conflict, crash,
/// failed write) and the next pass picks up from what is stored.
pub struct Reconciler<S, N> {
    pub store: S,
    pub notifier: N,
    pub job_template: JobTemplateConfig,
}

impl<S: BuildStore, N: Notifier> Reconciler<S, N> {
    pub fn new(store: S, notifier: N, job_template: JobTemplateConfig) -> Self {
        Self {
            store,
            notifier,
            job_template,
        }
    }

    #[tracing::instrument(name = "reconciler.reconcile", skip(self), err)]
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, AppError> {
        let Some(mut build) = self.store.get_build(namespace, name).await? else {
            debug!("BuildRequest is gone");
            return Ok(ReconcileOutcome::Gone);
        };

        if build.metadata.deletion_timestamp.is_some() {
            debug!("BuildRequest is being deleted");
            return Ok(ReconcileOutcome::Terminating);
        }

        let job_name = format_job_name(name);
        let mut status = build.current_status();

        match self.store.get_job(namespace, &job_name).await? {
            // Terminal builds are never rebuilt, even when their job was removed
            None if status.phase.is_terminal() => {
                debug!(job = %job_name, phase = %status.phase, "Job is gone, build stays terminal");
            }
            None => return self.submit_job(&build, status, job_name).await,
            Some(job)
                if !status.phase.is_terminal() && !is_owned_by(&job, build.uid().as_deref()) =>
            {
                return Ok(leftover_job(&job_name));
            }
            Some(job) => {
                let observation = JobObservation::from_job(&job);

                match determine_build_phase(&observation, Utc::now()) {
                    Some(target) if status.phase.can_advance_to(target.phase) => {
                        status.phase = target.phase;
                        status.completion_time = Some(target.completion_time);
                        status.job_ref.get_or_insert(job_name);
                        build = self.store.update_status(&build, &status).await?;

                        info!(
                            monotonic_counter.builds_finished = 1,
                            phase = %status.phase,
                            completion_time = %target.completion_time,
                            "🏁 Build finished"
                        );
                    }
                    None if !status.phase.is_terminal() => {
                        // The write after job creation may have been lost
                        if status.phase == BuildPhase::Pending {
                            status.phase = BuildPhase::Running;
                            status.job_ref.get_or_insert(job_name);
                            self.store.update_status(&build, &status).await?;
                            info!("🔁 Recovered Running phase for existing job");
                        }

                        debug!(active = observation.active, "⏳ Build in progress");
                        return Ok(ReconcileOutcome::InProgress);
                    }
                    _ => {}
                }
            }
        }

        self.finalize(build, status).await
    }

    async fn submit_job(
        &self,
        build: &BuildRequest,
        mut status: BuildStatus,
        job_name: String,
    ) -> Result<ReconcileOutcome, AppError> {
        let job = build_job(build, &self.job_template)?;

        match self.store.create_job(&job).await? {
            JobCreation::Created => info!(
                monotonic_counter.build_jobs_created = 1,
                job = %job_name,
                "🚀 Build job created"
            ),
            JobCreation::AlreadyExists => {
                let namespace = job.namespace().unwrap_or_default();
                match self.store.get_job(&namespace, &job_name).await? {
                    Some(existing) if is_owned_by(&existing, build.uid().as_deref()) => {
                        debug!(job = %job_name, "Build job already exists")
                    }
                    _ => return Ok(leftover_job(&job_name)),
                }
            }
        }

        let previous = status.clone();
        if status.phase.can_advance_to(BuildPhase::Running) {
            status.phase = BuildPhase::Running;
        }
        status.job_ref.get_or_insert(job_name);

        if status != previous {
            self.store.update_status(build, &status).await?;
        }

        Ok(ReconcileOutcome::JobSubmitted)
    }

    /// Terminal phase bookkeeping: deliver a pending callback, then apply the cleanup policy.
    ///
    /// The callback goes out whenever none was recorded yet, not only on the pass that
    /// observed the transition, so a crash between the two writes still gets it delivered.
    async fn finalize(
        &self,
        mut build: BuildRequest,
        mut status: BuildStatus,
    ) -> Result<ReconcileOutcome, AppError> {
        if build.has_callback() && status.callback_status == CallbackStatus::Unset {
            status.callback_status = match self.notifier.notify(&build, status.phase).await {
                Ok(()) => CallbackStatus::Success,
                Err(e) => {
                    warn!(
                        monotonic_counter.callbacks_failed = 1,
                        error = %e,
                        "❌ Failed to send callback"
                    );
                    CallbackStatus::Failed
                }
            };

            // Best effort, the outcome still drives the cleanup decision below
            match self.store.update_status(&build, &status).await {
                Ok(updated) => build = updated,
                Err(e) => warn!(
                    error = %e,
                    callback_status = %status.callback_status,
                    "⚠️ Failed to record callback status"
                ),
            }
        }

        if should_delete(status.phase, build.has_callback(), status.callback_status) {
            info!("🗑️ Build succeeded and callback sent, deleting BuildRequest");
            self.store.delete_build(&build).await?;
            return Ok(ReconcileOutcome::Deleted);
        }

        Ok(ReconcileOutcome::Retained)
    }
}

/// A same-named job owned by an earlier request, garbage collection will remove it
fn leftover_job(job_name: &str) -> ReconcileOutcome {
    warn!(job = %job_name, "⚠️ Job belongs to a previous request, waiting for its removal");
    ReconcileOutcome::InProgress
}

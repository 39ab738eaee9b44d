use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use crate::crds::{BuildPhase, CallbackStatus};

/// The part of a Job the controller cares about
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobObservation {
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub completion_time: Option<DateTime<Utc>>,
    /// `lastTransitionTime` of the `Failed` condition, Jobs never set a completion time on failure
    pub failed_at: Option<DateTime<Utc>>,
}

impl JobObservation {
    pub fn from_job(job: &Job) -> Self {
        let Some(status) = job.status.as_ref() else {
            return Self::default();
        };

        let failed_at = status
            .conditions
            .as_ref()
            .and_then(|conditions| {
                conditions
                    .iter()
                    .find(|c| c.type_ == "Failed" && c.status == "True")
            })
            .and_then(|c| c.last_transition_time.as_ref())
            .and_then(to_utc);

        Self {
            active: status.active.unwrap_or(0),
            succeeded: status.succeeded.unwrap_or(0),
            failed: status.failed.unwrap_or(0),
            completion_time: status.completion_time.as_ref().and_then(to_utc),
            failed_at,
        }
    }
}

/// Where a build should be after observing its job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseTarget {
    pub phase: BuildPhase,
    pub completion_time: DateTime<Utc>,
}

/// Maps job counters onto a terminal build phase, `None` while the job is still in progress.
/// Success wins over failure so a job that failed a pod and then succeeded counts as a success.
pub fn determine_build_phase(job: &JobObservation, now: DateTime<Utc>) -> Option<PhaseTarget> {
    if job.succeeded > 0 {
        return Some(PhaseTarget {
            phase: BuildPhase::Succeeded,
            completion_time: job.completion_time.unwrap_or(now),
        });
    }

    if job.failed > 0 {
        return Some(PhaseTarget {
            phase: BuildPhase::Failed,
            completion_time: job.completion_time.or(job.failed_at).unwrap_or(now),
        });
    }

    None
}

/// A job belongs to a request only when it names the request's uid as owner.
/// A same-named job of an earlier request with the same name fails this check.
pub fn is_owned_by(job: &Job, owner_uid: Option<&str>) -> bool {
    let Some(owner_uid) = owner_uid else {
        return false;
    };

    job.metadata
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|owner| owner.uid == owner_uid)
}

/// Only a successful build whose callback was delivered cleans itself up.
/// Everything else stays around for someone to inspect.
pub fn should_delete(
    phase: BuildPhase,
    callback_configured: bool,
    callback_status: CallbackStatus,
) -> bool {
    phase == BuildPhase::Succeeded
        && callback_configured
        && callback_status == CallbackStatus::Success
}

// k8s-openapi has moved between time crates, the wire format is the stable contract
fn to_utc(time: &Time) -> Option<DateTime<Utc>> {
    serde_json::to_value(time)
        .ok()?
        .as_str()?
        .parse::<DateTime<Utc>>()
        .ok()
}

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use build_core::{
    crds::BuildRequest,
    formatters::{MANAGED_BY_LABEL, MANAGED_BY_VALUE},
};
use futures::StreamExt;
use k8s_openapi::{
    api::batch::v1::Job,
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
use kube::{
    Api, Client, CustomResourceExt, ResourceExt,
    runtime::{
        Controller,
        controller::{self, Action, Error as ControllerError},
        watcher,
    },
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::{
    error::AppError,
    services::{
        callback::CallbackService,
        kubernetes_store::KubernetesStore,
        reconciler::{ReconcileOutcome, Reconciler},
    },
};

#[derive(Deserialize, Clone, Debug)]
pub struct ControllerConfig {
    /// Watch a single namespace instead of the whole cluster
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: u16,
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_error_backoff_base_secs")]
    pub error_backoff_base_secs: u64,
    #[serde(default = "default_error_backoff_max_secs")]
    pub error_backoff_max_secs: u64,
}

fn default_concurrency() -> u16 {
    8
}

fn default_resync_interval_secs() -> u64 {
    300
}

fn default_error_backoff_base_secs() -> u64 {
    5
}

fn default_error_backoff_max_secs() -> u64 {
    300
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            concurrency: default_concurrency(),
            resync_interval_secs: default_resync_interval_secs(),
            error_backoff_base_secs: default_error_backoff_base_secs(),
            error_backoff_max_secs: default_error_backoff_max_secs(),
        }
    }
}

const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Consecutive reconcile failures per request, keyed by namespace and name
#[derive(Default)]
pub struct FailureCounts {
    counts: Mutex<HashMap<(Option<String>, String), u32>>,
}

impl FailureCounts {
    fn lock(&self) -> MutexGuard<'_, HashMap<(Option<String>, String), u32>> {
        self.counts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the attempt number of this failure, starting at 1
    pub fn record(&self, namespace: Option<String>, name: String) -> u32 {
        let mut counts = self.lock();
        let attempt = counts.entry((namespace, name)).or_insert(0);
        *attempt += 1;
        *attempt
    }

    pub fn forget(&self, namespace: Option<String>, name: String) {
        self.lock().remove(&(namespace, name));
    }

    pub fn tracked(&self) -> usize {
        self.lock().len()
    }
}

pub struct Context {
    pub reconciler: Reconciler<KubernetesStore, CallbackService>,
    pub cfg: ControllerConfig,
    pub failures: FailureCounts,
}

impl Context {
    pub fn new(reconciler: Reconciler<KubernetesStore, CallbackService>, cfg: ControllerConfig) -> Self {
        Self {
            reconciler,
            cfg,
            failures: FailureCounts::default(),
        }
    }
}

/// Fails when the BuildRequest CRD isn't installed, there is nothing to watch without it.
#[tracing::instrument(name = "controller.preflight", skip_all, err)]
pub async fn preflight(client: Client) -> Result<(), AppError> {
    let crds: Api<CustomResourceDefinition> = Api::all(client);

    match crds.get(BuildRequest::crd_name()).await {
        Ok(_) => {
            info!("✅ {} CRD is installed", BuildRequest::crd_name());
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => Err(AppError::InternalServerError(format!(
            "{} CRD is not installed, apply the output of `crdgen` first",
            BuildRequest::crd_name()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Runs the controller until a shutdown signal arrives.
/// `ready` is raised once the CRD check passed and lowered again on the way out.
pub async fn start_controller(
    client: Client,
    ctx: Arc<Context>,
    ready: Arc<AtomicBool>,
) -> Result<(), AppError> {
    preflight(client.clone()).await?;

    let (builds, jobs): (Api<BuildRequest>, Api<Job>) = match ctx.cfg.namespace.as_deref() {
        Some(namespace) => (
            Api::namespaced(client.clone(), namespace),
            Api::namespaced(client, namespace),
        ),
        None => (Api::all(client.clone()), Api::all(client)),
    };

    let job_selector = format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE);
    let concurrency = ctx.cfg.concurrency;

    info!(
        namespace = ctx.cfg.namespace.as_deref().unwrap_or("*"),
        concurrency, "🔄 Starting BuildRequest controller"
    );
    ready.store(true, Ordering::SeqCst);

    Controller::new(builds, watcher::Config::default())
        .owns(jobs, watcher::Config::default().labels(&job_selector))
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|result| {
            let ctx = ctx.clone();
            async move {
                match result {
                    Ok((object, action)) => debug!(object = %object, ?action, "Reconciled"),
                    // Deleted while failing, it won't reach reconcile again
                    Err(ControllerError::ObjectNotFound(object)) => {
                        debug!(object = %object, "BuildRequest left the store");
                        ctx.failures.forget(object.namespace, object.name);
                    }
                    Err(e) => debug!(error = %e, "Reconcile round failed"),
                }
            }
        })
        .await;

    ready.store(false, Ordering::SeqCst);
    info!("🛑 BuildRequest controller stopped");

    Ok(())
}

async fn reconcile(build: Arc<BuildRequest>, ctx: Arc<Context>) -> Result<Action, AppError> {
    let namespace = build.namespace().ok_or_else(|| {
        AppError::InternalServerError(format!("BuildRequest {} has no namespace", build.name_any()))
    })?;

    let outcome = ctx
        .reconciler
        .reconcile(&namespace, &build.name_any())
        .await?;

    ctx.failures.forget(Some(namespace), build.name_any());

    Ok(next_action(outcome, &ctx.cfg))
}

fn next_action(outcome: ReconcileOutcome, cfg: &ControllerConfig) -> Action {
    match outcome {
        ReconcileOutcome::JobSubmitted
        | ReconcileOutcome::InProgress
        | ReconcileOutcome::Retained => {
            Action::requeue(Duration::from_secs(cfg.resync_interval_secs))
        }
        ReconcileOutcome::Gone | ReconcileOutcome::Terminating | ReconcileOutcome::Deleted => {
            Action::await_change()
        }
    }
}

fn error_policy(build: Arc<BuildRequest>, error: &AppError, ctx: Arc<Context>) -> Action {
    let attempt = ctx.failures.record(build.namespace(), build.name_any());

    if let AppError::Conflict(reason) = error {
        debug!(name = %build.name_any(), attempt, %reason, "Write conflict, requeueing");
        return Action::requeue(CONFLICT_REQUEUE);
    }

    let delay = backoff_delay(
        attempt,
        ctx.cfg.error_backoff_base_secs,
        ctx.cfg.error_backoff_max_secs,
    );

    if attempt > 1 && delay.as_secs() >= ctx.cfg.error_backoff_max_secs {
        error!(
            namespace = ?build.namespace(),
            name = %build.name_any(),
            attempt,
            error = %error,
            "❌ Reconcile keeps failing"
        );
    } else {
        warn!(
            namespace = ?build.namespace(),
            name = %build.name_any(),
            attempt,
            retry_in_secs = delay.as_secs(),
            error = %error,
            "⚠️ Reconcile failed, retrying"
        );
    }

    Action::requeue(delay)
}

/// `base * 2^(attempt - 1)`, capped at `max`
pub fn backoff_delay(attempt: u32, base_secs: u64, max_secs: u64) -> Duration {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);

    Duration::from_secs(base_secs.saturating_mul(factor).min(max_secs))
}

//! In-memory [`BuildStore`] with the API server behaviours the reconciler relies on:
//! resourceVersion checks, owner based cascading deletion, and injectable write failures.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use build_core::crds::{BuildRequest, BuildStatus};
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;

use crate::error::AppError;
use crate::services::store::{BuildStore, JobCreation};

type Key = (String, String);

#[derive(Default)]
struct Inner {
    builds: BTreeMap<Key, BuildRequest>,
    jobs: BTreeMap<Key, Job>,
    version: u64,
    jobs_created: usize,
    status_writes: usize,
    failing_status_writes: usize,
    failing_deletes: usize,
    missed_job_reads: usize,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stores a new request, assigning uid and resourceVersion like the API server would
    pub fn insert_build(&self, mut build: BuildRequest) {
        let mut inner = self.lock();
        let version = inner.next_version();
        let namespace = build.namespace().unwrap_or_else(|| "default".to_string());
        build.metadata.namespace = Some(namespace.clone());
        build.metadata.uid = Some(format!("uid-{}", build.name_any()));
        build.metadata.resource_version = Some(version);
        inner.builds.insert(key(&namespace, &build.name_any()), build);
    }

    pub fn build(&self, namespace: &str, name: &str) -> Option<BuildRequest> {
        self.lock().builds.get(&key(namespace, name)).cloned()
    }

    pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        self.lock().jobs.get(&key(namespace, name)).cloned()
    }

    /// Stores a job that was not created through this store, e.g. by an earlier request
    pub fn insert_job(&self, mut job: Job) {
        let mut inner = self.lock();
        job.metadata.resource_version = Some(inner.next_version());
        inner
            .jobs
            .insert(key(&job.namespace().unwrap_or_default(), &job.name_any()), job);
    }

    /// Next job reads come back empty, like a lagging cache
    pub fn miss_next_job_reads(&self, count: usize) {
        self.lock().missed_job_reads = count;
    }

    /// Simulates the job controller reporting progress
    pub fn set_job_status(&self, namespace: &str, name: &str, status: serde_json::Value) {
        let mut inner = self.lock();
        if let Some(job) = inner.jobs.get_mut(&key(namespace, name)) {
            job.status = Some(serde_json::from_value(status).expect("valid job status"));
        }
    }

    /// Simulates an operator removing the job by hand
    pub fn remove_job(&self, namespace: &str, name: &str) {
        self.lock().jobs.remove(&key(namespace, name));
    }

    /// Simulates another writer touching the request
    pub fn touch_build(&self, namespace: &str, name: &str) {
        let mut inner = self.lock();
        let version = inner.next_version();
        if let Some(build) = inner.builds.get_mut(&key(namespace, name)) {
            build.metadata.resource_version = Some(version);
        }
    }

    pub fn fail_next_status_writes(&self, count: usize) {
        self.lock().failing_status_writes = count;
    }

    pub fn fail_next_deletes(&self, count: usize) {
        self.lock().failing_deletes = count;
    }

    pub fn jobs_created(&self) -> usize {
        self.lock().jobs_created
    }

    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }
}

impl BuildStore for MemoryStore {
    async fn get_build(&self, namespace: &str, name: &str) -> Result<Option<BuildRequest>, AppError> {
        Ok(self.build(namespace, name))
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, AppError> {
        let mut inner = self.lock();
        if inner.missed_job_reads > 0 {
            inner.missed_job_reads -= 1;
            return Ok(None);
        }
        Ok(inner.jobs.get(&key(namespace, name)).cloned())
    }

    async fn create_job(&self, job: &Job) -> Result<JobCreation, AppError> {
        let mut inner = self.lock();
        let job_key = key(&job.namespace().unwrap_or_default(), &job.name_any());
        if inner.jobs.contains_key(&job_key) {
            return Ok(JobCreation::AlreadyExists);
        }

        let mut job = job.clone();
        job.metadata.resource_version = Some(inner.next_version());
        inner.jobs.insert(job_key, job);
        inner.jobs_created += 1;
        Ok(JobCreation::Created)
    }

    async fn update_status(
        &self,
        build: &BuildRequest,
        status: &BuildStatus,
    ) -> Result<BuildRequest, AppError> {
        let mut inner = self.lock();
        if inner.failing_status_writes > 0 {
            inner.failing_status_writes -= 1;
            return Err(AppError::InternalServerError(
                "injected status write failure".to_string(),
            ));
        }

        let version = inner.next_version();
        let build_key = key(&build.namespace().unwrap_or_default(), &build.name_any());
        let Some(stored) = inner.builds.get_mut(&build_key) else {
            return Err(AppError::InternalServerError("BuildRequest not found".to_string()));
        };
        if stored.metadata.resource_version != build.metadata.resource_version {
            return Err(AppError::Conflict(format!(
                "BuildRequest {} was modified concurrently",
                build.name_any()
            )));
        }

        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(version);
        let updated = stored.clone();
        inner.status_writes += 1;
        Ok(updated)
    }

    async fn delete_build(&self, build: &BuildRequest) -> Result<(), AppError> {
        let mut inner = self.lock();
        if inner.failing_deletes > 0 {
            inner.failing_deletes -= 1;
            return Err(AppError::InternalServerError(
                "injected delete failure".to_string(),
            ));
        }

        let namespace = build.namespace().unwrap_or_default();
        if inner
            .builds
            .remove(&key(&namespace, &build.name_any()))
            .is_none()
        {
            return Ok(());
        }

        // Cascade to owned jobs the way the garbage collector does
        let uid = build.uid();
        inner.jobs.retain(|(job_namespace, _), job| {
            let owned = job
                .owner_references()
                .iter()
                .any(|owner| Some(&owner.uid) == uid.as_ref());
            !(owned && *job_namespace == namespace)
        });
        Ok(())
    }
}

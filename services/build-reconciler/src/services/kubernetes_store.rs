use build_core::crds::{BuildRequest, BuildStatus};
use k8s_openapi::api::batch::v1::Job;
use kube::{
    Api, Client, ResourceExt,
    api::{DeleteParams, Patch, PatchParams, PostParams, Preconditions},
};
use serde_json::{Map, Value, json};
use tracing::{Instrument, debug, info_span};

use crate::error::AppError;
use crate::services::store::{BuildStore, JobCreation};

#[derive(Clone)]
pub struct KubernetesStore {
    pub client: Client,
}

impl KubernetesStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn builds(&self, namespace: &str) -> Api<BuildRequest> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl BuildStore for KubernetesStore {
    async fn get_build(&self, namespace: &str, name: &str) -> Result<Option<BuildRequest>, AppError> {
        Ok(self
            .builds(namespace)
            .get_opt(name)
            .instrument(info_span!("kubernetes_store.get_build"))
            .await?)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, AppError> {
        Ok(self
            .jobs(namespace)
            .get_opt(name)
            .instrument(info_span!("kubernetes_store.get_job"))
            .await?)
    }

    async fn create_job(&self, job: &Job) -> Result<JobCreation, AppError> {
        let namespace = job.namespace().ok_or_else(|| {
            AppError::InternalServerError(format!("Job {} has no namespace", job.name_any()))
        })?;

        match self
            .jobs(&namespace)
            .create(&PostParams::default(), job)
            .instrument(info_span!("kubernetes_store.create_job"))
            .await
        {
            Ok(_) => Ok(JobCreation::Created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(JobCreation::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(
        &self,
        build: &BuildRequest,
        status: &BuildStatus,
    ) -> Result<BuildRequest, AppError> {
        let name = build.name_any();
        let namespace = build.namespace().ok_or_else(|| {
            AppError::InternalServerError(format!("BuildRequest {} has no namespace", name))
        })?;

        // A merge patch carrying resourceVersion is rejected with 409 when the object moved on
        let mut metadata = Map::new();
        if let Some(resource_version) = build.resource_version() {
            metadata.insert("resourceVersion".to_string(), Value::String(resource_version));
        }
        let patch = json!({
            "metadata": metadata,
            "status": status,
        });

        match self
            .builds(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .instrument(info_span!("kubernetes_store.update_status"))
            .await
        {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(AppError::Conflict(format!(
                "BuildRequest {}/{} was modified concurrently",
                namespace, name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_build(&self, build: &BuildRequest) -> Result<(), AppError> {
        let name = build.name_any();
        let namespace = build.namespace().ok_or_else(|| {
            AppError::InternalServerError(format!("BuildRequest {} has no namespace", name))
        })?;

        // Background propagation: the API server garbage collects the owned Job and its Pods.
        // The uid precondition keeps us from deleting a newer request reusing the name.
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                uid: build.uid(),
                resource_version: None,
            }),
            ..DeleteParams::background()
        };

        match self
            .builds(&namespace)
            .delete(&name, &params)
            .instrument(info_span!("kubernetes_store.delete_build"))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(namespace = %namespace, name = %name, "BuildRequest already gone");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(AppError::Conflict(format!(
                "BuildRequest {}/{} was replaced before deletion",
                namespace, name
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

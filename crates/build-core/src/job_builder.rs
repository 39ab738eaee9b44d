use k8s_openapi::api::{
    batch::v1::{Job, JobSpec},
    core::v1::{
        Container, EmptyDirVolumeSource, EnvVar, PodSpec, PodTemplateSpec, SecretVolumeSource,
        SecurityContext, Volume, VolumeMount,
    },
};
use kube::{Resource, api::ObjectMeta};

use crate::{
    configs::JobTemplateConfig,
    crds::BuildRequest,
    error::BuildError,
    formatters::{format_job_name, format_labels},
};

pub const DEFAULT_REVISION: &str = "master";
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

const WORKSPACE_VOLUME: &str = "workspace";
const WORKSPACE_PATH: &str = "/workspace";
// buildah storage lives outside the workspace, overlaying it would nest filesystems
const STORAGE_VOLUME: &str = "containers-storage";
const STORAGE_PATH: &str = "/var/lib/containers";
const REGISTRY_AUTH_VOLUME: &str = "registry-auth";
const REGISTRY_AUTH_PATH: &str = "/root/.docker/config.json";
const REGISTRY_AUTH_KEY: &str = ".dockerconfigjson";

const FETCH_SCRIPT: &str = r#"set -e
git clone "$CONTEXT_URL" /workspace
cd /workspace
git checkout "$REVISION"
"#;

const BUILD_SCRIPT: &str = r#"set -e
echo "Building image $OUTPUT_IMAGE from $CONTEXT_URL..."
buildah bud --storage-driver=vfs -f "$DOCKERFILE" -t "$OUTPUT_IMAGE" .
echo "Pushing image..."
buildah push --storage-driver=vfs "$OUTPUT_IMAGE"
echo "Done!"
"#;

/// Turns a build request into its execution job.
///
/// The same request and template always produce the same job. The job is owned by the
/// request and goes away with it.
pub fn build_job(build: &BuildRequest, template: &JobTemplateConfig) -> Result<Job, BuildError> {
    let name = build
        .metadata
        .name
        .as_deref()
        .ok_or(BuildError::MissingIdentity("name"))?;
    let namespace = build
        .metadata
        .namespace
        .as_deref()
        .ok_or(BuildError::MissingIdentity("namespace"))?;
    let owner_reference = build
        .controller_owner_ref(&())
        .ok_or(BuildError::MissingIdentity("uid"))?;

    let spec = &build.spec;
    if spec.context_url.trim().is_empty() {
        return Err(BuildError::InvalidSpec("contextUrl is empty".to_string()));
    }
    if spec.output_image.trim().is_empty() {
        return Err(BuildError::InvalidSpec("outputImage is empty".to_string()));
    }

    let revision = non_empty_or(spec.revision.as_deref(), DEFAULT_REVISION);
    let dockerfile = non_empty_or(spec.dockerfile_path.as_deref(), DEFAULT_DOCKERFILE);
    let labels = format_labels(name);

    let workspace_mount = VolumeMount {
        name: WORKSPACE_VOLUME.to_string(),
        mount_path: WORKSPACE_PATH.to_string(),
        ..Default::default()
    };

    let fetch = Container {
        name: "fetch".to_string(),
        image: Some(template.fetch_image.clone()),
        command: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            FETCH_SCRIPT.to_string(),
        ]),
        env: Some(vec![
            env("CONTEXT_URL", &spec.context_url),
            env("REVISION", revision),
        ]),
        volume_mounts: Some(vec![workspace_mount.clone()]),
        ..Default::default()
    };

    let mut build_env = vec![
        env("CONTEXT_URL", &spec.context_url),
        env("DOCKERFILE", dockerfile),
        env("OUTPUT_IMAGE", &spec.output_image),
        env("STORAGE_DRIVER", "vfs"),
    ];
    let mut build_mounts = vec![
        workspace_mount,
        VolumeMount {
            name: STORAGE_VOLUME.to_string(),
            mount_path: STORAGE_PATH.to_string(),
            ..Default::default()
        },
    ];
    let mut volumes = vec![empty_dir(WORKSPACE_VOLUME), empty_dir(STORAGE_VOLUME)];

    if let Some(secret_name) = spec.push_credential_ref.as_deref().filter(|s| !s.is_empty()) {
        build_env.push(env("REGISTRY_AUTH_FILE", REGISTRY_AUTH_PATH));
        build_mounts.push(VolumeMount {
            name: REGISTRY_AUTH_VOLUME.to_string(),
            mount_path: REGISTRY_AUTH_PATH.to_string(),
            sub_path: Some(REGISTRY_AUTH_KEY.to_string()),
            read_only: Some(true),
            ..Default::default()
        });
        volumes.push(Volume {
            name: REGISTRY_AUTH_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret_name.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    let builder = Container {
        name: "build".to_string(),
        image: Some(template.build_image.clone()),
        command: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            BUILD_SCRIPT.to_string(),
        ]),
        env: Some(build_env),
        volume_mounts: Some(build_mounts),
        working_dir: Some(WORKSPACE_PATH.to_string()),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(format_job_name(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            // one attempt per build request, a failed pod fails the build
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    service_account_name: template.service_account_name.clone(),
                    init_containers: Some(vec![fetch]),
                    containers: vec![builder],
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn non_empty_or<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(default)
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

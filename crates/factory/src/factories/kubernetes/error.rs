use kube_client::config::{InClusterError, InferConfigError, KubeconfigError};
use thiserror::Error;

/// Everything that can go wrong while building a client, one variant per config source
#[derive(Error, Debug)]
pub enum KubernetesError {
    #[error("Failed to build kube client, {0}")]
    Client(#[from] kube::Error),
    #[error("Failed to read service account environment, {0}")]
    InCluster(#[from] InClusterError),
    #[error("Failed to load kubeconfig, {0}")]
    Kubeconfig(#[from] KubeconfigError),
    #[error("Failed to infer cluster config, {0}")]
    Infer(#[from] InferConfigError),
}

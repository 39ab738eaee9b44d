pub mod error;
pub mod implementation;

use kube::Client;
use serde::Deserialize;

#[derive(Deserialize, Clone, Debug, Default)]
pub struct KubernetesConfig {
    /// Use the service account mounted into the pod
    #[serde(default)]
    pub in_cluster: bool,
    /// Explicit kubeconfig, otherwise the usual inference (`KUBECONFIG`, `~/.kube/config`)
    pub kubeconfig: Option<String>,
}

#[derive(Clone)]
pub struct Kubernetes {
    pub client: Client,
}

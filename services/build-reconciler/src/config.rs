use std::{net::SocketAddr, path::PathBuf};

use build_core::configs::JobTemplateConfig;
use config::{ConfigBuilder, ConfigError, Environment, File, builder::AsyncState};
use factory::factories::{kubernetes::KubernetesConfig, observability::ObservabilityConfig};
use serde::Deserialize;

use crate::services::{callback::CallbackConfig, controller::ControllerConfig};

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server_address: SocketAddr,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub job: JobTemplateConfig,
}

impl Config {
    /// File first, then environment on top, e.g. `CONTROLLER__CONCURRENCY=16`
    pub async fn init(path: PathBuf) -> Result<Self, ConfigError> {
        let cfg = ConfigBuilder::<AsyncState>::default()
            .add_source(File::from(path))
            .add_source(Environment::default().separator("__"))
            .build()
            .await?;

        cfg.try_deserialize()
    }
}

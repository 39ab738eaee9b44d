use std::future::Future;

use build_core::crds::{BuildPhase, BuildRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::callback::error::CallbackError;

pub mod error;
pub mod implementations;

#[derive(Deserialize, Clone, Debug)]
pub struct CallbackConfig {
    #[serde(default = "timeout_secs_default")]
    pub timeout_secs: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout_secs: timeout_secs_default(),
        }
    }
}

fn timeout_secs_default() -> u64 {
    10
}

/// Body POSTed to the callback url once a build reaches a terminal phase
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CallbackPayload {
    pub name: String,
    pub namespace: String,
    pub phase: BuildPhase,
    pub image: String,
    pub timestamp: DateTime<Utc>,
}

/// Delivers completion notifications. One attempt per call, retries only happen
/// by the reconciler running again.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        build: &BuildRequest,
        phase: BuildPhase,
    ) -> impl Future<Output = Result<(), CallbackError>> + Send;
}

#[derive(Clone)]
pub struct CallbackService {
    pub client: reqwest::Client,
}

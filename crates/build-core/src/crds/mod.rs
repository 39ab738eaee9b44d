use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// BuildRequest Resource (submitted once, spec is never mutated afterwards)
// -----------------------------------------------------------------------------
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "build.poddle.io",
    version = "v1alpha1",
    kind = "BuildRequest",
    plural = "buildrequests",
    shortname = "br",
    namespaced,
    status = "BuildStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Job","type":"string","jsonPath":".status.jobRef"}"#,
    printcolumn = r#"{"name":"Callback","type":"string","jsonPath":".status.callbackStatus"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequestSpec {
    /// Git repository to build from
    pub context_url: String,
    /// Branch, tag or commit, `master` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Path of the Dockerfile inside the repository, `Dockerfile` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_path: Option<String>,
    /// Destination image, e.g. `registry.poddle.uz/team/app:tag`
    pub output_image: String,
    /// Name of a `kubernetes.io/dockerconfigjson` secret used for the push
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_credential_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackSpec>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallbackSpec {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    #[serde(default)]
    pub phase: BuildPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_ref: Option<String>,
    #[serde(default, skip_serializing_if = "CallbackStatus::is_unset")]
    pub callback_status: CallbackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

// -----------------------------------------------------------------------------
// Enums
// -----------------------------------------------------------------------------
#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, PartialEq, Eq, JsonSchema)]
pub enum BuildPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl BuildPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }

    /// Phases only move forward: `Pending -> Running -> {Succeeded, Failed}`.
    /// Terminal phases never change, not even into the other terminal phase.
    pub fn can_advance_to(&self, next: BuildPhase) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, PartialEq, Eq, JsonSchema)]
pub enum CallbackStatus {
    #[default]
    Unset,
    Success,
    Failed,
}

impl CallbackStatus {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl std::fmt::Display for CallbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => write!(f, "Unset"),
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl BuildRequest {
    /// Status as persisted, or the initial `Pending` status when none was written yet
    pub fn current_status(&self) -> BuildStatus {
        self.status.clone().unwrap_or_default()
    }

    pub fn has_callback(&self) -> bool {
        self.spec.callback.is_some()
    }
}

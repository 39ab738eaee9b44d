use serde::Deserialize;

/// Images and pod settings shared by every execution job
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct JobTemplateConfig {
    #[serde(default = "fetch_image_default")]
    pub fetch_image: String,
    #[serde(default = "build_image_default")]
    pub build_image: String,
    #[serde(default)]
    pub service_account_name: Option<String>,
}

impl Default for JobTemplateConfig {
    fn default() -> Self {
        Self {
            fetch_image: fetch_image_default(),
            build_image: build_image_default(),
            service_account_name: None,
        }
    }
}

fn fetch_image_default() -> String {
    String::from("alpine/git")
}

fn build_image_default() -> String {
    String::from("quay.io/buildah/stable")
}

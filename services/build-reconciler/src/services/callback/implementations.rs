use std::time::Duration;

use build_core::crds::{BuildPhase, BuildRequest};
use chrono::Utc;
use kube::ResourceExt;
use tracing::{Instrument, info, info_span};

use crate::services::callback::{
    CallbackPayload, CallbackService, Notifier, error::CallbackError,
};

impl CallbackService {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }
}

impl Notifier for CallbackService {
    /// Timeouts, connection errors and non-2xx answers all come back as errors,
    /// the caller doesn't get to tell transient from permanent.
    #[tracing::instrument(
        name = "callback_service.notify",
        skip_all,
        fields(namespace = ?build.namespace(), name = %build.name_any(), phase = %phase),
        err
    )]
    async fn notify(&self, build: &BuildRequest, phase: BuildPhase) -> Result<(), CallbackError> {
        let callback = build
            .spec
            .callback
            .as_ref()
            .ok_or(CallbackError::NotConfigured)?;

        let payload = CallbackPayload {
            name: build.name_any(),
            namespace: build.namespace().unwrap_or_default(),
            phase,
            image: build.spec.output_image.clone(),
            timestamp: Utc::now(),
        };

        let mut request = self.client.post(&callback.url).json(&payload);
        if let Some(token) = callback.auth_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .instrument(info_span!("callback.send"))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallbackError::UnexpectedStatus(status.as_u16()));
        }

        info!(status = status.as_u16(), "📨 Callback delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use build_core::crds::{BuildRequestSpec, CallbackSpec};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn build(url: String, auth_token: Option<&str>) -> BuildRequest {
        let mut build = BuildRequest::new(
            "app",
            BuildRequestSpec {
                context_url: "https://github.com/poddle/app.git".to_string(),
                output_image: "registry.poddle.uz/app:1".to_string(),
                callback: Some(CallbackSpec {
                    url,
                    auth_token: auth_token.map(str::to_string),
                }),
                ..Default::default()
            },
        );
        build.metadata.namespace = Some("team-a".to_string());
        build
    }

    fn service() -> CallbackService {
        CallbackService::new(Duration::from_secs(10)).unwrap()
    }

    #[tokio::test]
    async fn test_posts_payload_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/build"))
            .and(header("content-type", "application/json"))
            .and(header("authorization", "Bearer s3cret"))
            .and(body_partial_json(serde_json::json!({
                "name": "app",
                "namespace": "team-a",
                "phase": "Succeeded",
                "image": "registry.poddle.uz/app:1"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let build = build(format!("{}/hooks/build", server.uri()), Some("s3cret"));
        service()
            .notify(&build, BuildPhase::Succeeded)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let payload: CallbackPayload = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(payload.phase, BuildPhase::Succeeded);
        assert!(payload.timestamp <= Utc::now());
    }

    #[tokio::test]
    async fn test_no_authorization_header_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let build = build(server.uri(), None);
        service().notify(&build, BuildPhase::Failed).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let build = build(server.uri(), None);
        let result = service().notify(&build, BuildPhase::Succeeded).await;

        assert!(matches!(result, Err(CallbackError::UnexpectedStatus(500))));
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(307).insert_header("location", "http://127.0.0.1:1/"),
            )
            .mount(&server)
            .await;

        let build = build(server.uri(), None);
        let result = service().notify(&build, BuildPhase::Succeeded).await;

        assert!(matches!(result, Err(CallbackError::UnexpectedStatus(307))));
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let build = build(server.uri(), None);
        let result = CallbackService::new(Duration::from_millis(100))
            .unwrap()
            .notify(&build, BuildPhase::Succeeded)
            .await;

        assert!(matches!(result, Err(CallbackError::Request(e)) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_unreachable_is_failure() {
        let build = build("http://127.0.0.1:1/hooks".to_string(), None);
        let result = service().notify(&build, BuildPhase::Succeeded).await;

        assert!(matches!(result, Err(CallbackError::Request(_))));
    }

    #[tokio::test]
    async fn test_missing_callback_is_reported() {
        let mut build = build("http://unused".to_string(), None);
        build.spec.callback = None;

        let result = service().notify(&build, BuildPhase::Succeeded).await;

        assert!(matches!(result, Err(CallbackError::NotConfigured)));
    }
}

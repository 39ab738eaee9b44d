use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("Build request has no callback configured")]
    NotConfigured,
    #[error("Callback request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Callback failed with status code: {0}")]
    UnexpectedStatus(u16),
}

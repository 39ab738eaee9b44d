use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Build request has no {0}")]
    MissingIdentity(&'static str),
    #[error("Invalid build spec, {0}")]
    InvalidSpec(String),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObservabilityError {
    #[error("OTLP exporter error, {0}")]
    ExporterBuildError(#[from] opentelemetry_otlp::ExporterBuildError),
    #[error("Subscriber init error, {0}")]
    TryInitError(#[from] tracing_subscriber::util::TryInitError),
}

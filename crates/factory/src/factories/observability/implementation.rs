use std::time::Duration;

use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{
    Compression, MetricExporter, SpanExporter, WithExportConfig, WithTonicConfig,
};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{SCHEMA_URL, attribute::SERVICE_VERSION};
use time::macros::format_description;
use tonic::transport::ClientTlsConfig;
use tracing::Level;
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::{
    EnvFilter, Layer, fmt::time::LocalTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::factories::observability::{Observability, ObservabilityConfig, error::ObservabilityError};

const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

impl Drop for Observability {
    fn drop(&mut self) {
        if let Some(tracer_provider) = &self.tracer_provider
            && let Err(err) = tracer_provider.shutdown()
        {
            eprintln!("{err:?}");
        }
        if let Some(meter_provider) = &self.meter_provider
            && let Err(err) = meter_provider.shutdown()
        {
            eprintln!("{err:?}");
        }
    }
}

impl Observability {
    /// Initialize tracing-subscriber and return Observability for opentelemetry-related termination processing.
    /// Without an OTLP endpoint only the stdout layer is installed.
    pub fn init(
        cargo_crate_name: &str,
        cargo_pkg_version: &str,
        cfg: &ObservabilityConfig,
    ) -> Result<Observability, ObservabilityError> {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let (tracer_provider, meter_provider) = match cfg.otel_exporter_otlp_endpoint.as_deref() {
            Some(endpoint) => {
                let resource = Self::get_resource(cargo_crate_name, cargo_pkg_version);
                (
                    Some(Self::init_tracer_provider(resource.clone(), endpoint)?),
                    Some(Self::init_meter_provider(resource, endpoint)?),
                )
            }
            None => (None, None),
        };

        let open_telemetry_layer = tracer_provider
            .as_ref()
            .map(|provider| OpenTelemetryLayer::new(provider.tracer(cargo_crate_name.to_string())));
        let metrics_layer = meter_provider
            .as_ref()
            .map(|provider| MetricsLayer::new(provider.clone()));

        // `rust_log` wins, then RUST_LOG, then the plain level
        let level = cfg
            .tracing_level
            .as_deref()
            .and_then(|level| level.parse::<Level>().ok())
            .unwrap_or(Level::INFO);

        let env_filter = match cfg.rust_log.as_deref() {
            Some(rust_log) => EnvFilter::new(rust_log),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase())),
        };

        // Stdout, json unless asked for pretty
        let timer = LocalTime::new(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ));
        let with_file = cfg.with_file.unwrap_or(true);
        let with_line_number = cfg.with_line_number.unwrap_or(true);

        let fmt_layer = if cfg.log_format.as_deref() == Some("pretty") {
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_timer(timer)
                .with_target(false)
                .with_file(with_file)
                .with_line_number(with_line_number)
                .compact()
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_target(false)
                .with_file(with_file)
                .with_line_number(with_line_number)
                .json()
                .flatten_event(true)
                .with_span_list(false)
                .boxed()
        };

        // Registry
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(metrics_layer)
            .with(open_telemetry_layer)
            .try_init()?;

        Ok(Observability {
            tracer_provider,
            meter_provider,
        })
    }

    // Resource
    fn get_resource(cargo_crate_name: &str, cargo_pkg_version: &str) -> Resource {
        Resource::builder()
            .with_service_name(cargo_crate_name.to_string())
            .with_schema_url(
                [KeyValue::new(
                    SERVICE_VERSION,
                    cargo_pkg_version.to_string(),
                )],
                SCHEMA_URL,
            )
            .build()
    }

    // Plain http collectors (sidecars, local dev) get no TLS
    fn tls_config(endpoint: &str) -> Option<ClientTlsConfig> {
        endpoint
            .starts_with("https://")
            .then(|| ClientTlsConfig::new().with_native_roots())
    }

    // Construct TracerProvider for OpenTelemetryLayer
    fn init_tracer_provider(
        resource: Resource,
        otel_exporter_otlp_endpoint: &str,
    ) -> Result<SdkTracerProvider, ObservabilityError> {
        let mut exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(otel_exporter_otlp_endpoint)
            .with_compression(Compression::Gzip);

        if let Some(tls_config) = Self::tls_config(otel_exporter_otlp_endpoint) {
            exporter = exporter.with_tls_config(tls_config);
        }

        let trace_exporter = exporter.build()?;

        let tracer_provider = SdkTracerProvider::builder()
            .with_id_generator(RandomIdGenerator::default())
            .with_batch_exporter(trace_exporter)
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource)
            .build();

        global::set_tracer_provider(tracer_provider.clone());

        Ok(tracer_provider)
    }

    // Construct MeterProvider for MetricsLayer
    fn init_meter_provider(
        resource: Resource,
        otel_exporter_otlp_endpoint: &str,
    ) -> Result<SdkMeterProvider, ObservabilityError> {
        let mut exporter = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(otel_exporter_otlp_endpoint)
            .with_compression(Compression::Gzip);

        if let Some(tls_config) = Self::tls_config(otel_exporter_otlp_endpoint) {
            exporter = exporter.with_tls_config(tls_config);
        }

        let metric_exporter = exporter.build()?;

        let reader = PeriodicReader::builder(metric_exporter)
            .with_interval(METRICS_EXPORT_INTERVAL)
            .build();

        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(reader)
            .build();

        global::set_meter_provider(meter_provider.clone());

        Ok(meter_provider)
    }
}

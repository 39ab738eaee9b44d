pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod services;

use std::path::PathBuf;
use std::sync::{Arc, atomic::AtomicBool};
use std::time::Duration;
use std::{env, net::SocketAddr};

use factory::factories::{kubernetes::Kubernetes, observability::Observability};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use utility::{load_service_env::load_service_env, shutdown_signal::shutdown_signal};

use crate::{
    app::AppState,
    config::Config,
    error::AppError,
    services::{
        callback::CallbackService,
        controller::{Context, start_controller},
        kubernetes_store::KubernetesStore,
        reconciler::Reconciler,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // These are baked at COMPILE time
    let cargo_manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let cargo_crate_name = env!("CARGO_CRATE_NAME");
    let cargo_pkg_name = env!("CARGO_PKG_NAME");
    let cargo_pkg_version = env!("CARGO_PKG_VERSION");

    let env_file = load_service_env(&cargo_manifest_dir);

    let path = env::var("CONFIG").unwrap_or("config.json".to_string());
    let full_path = cargo_manifest_dir.join(path);
    let cfg = Config::init(full_path).await?;

    let _guard = Observability::init(cargo_crate_name, cargo_pkg_version, &cfg.observability)?;

    match env_file {
        Ok(path) => info!(path = %path.display(), "✅ Loaded service env file"),
        Err(e) => warn!(error = %e, "⚠️ No service env file, using process environment"),
    }

    let kubernetes = Kubernetes::new(&cfg.kubernetes).await?;
    let callback = CallbackService::new(Duration::from_secs(cfg.callback.timeout_secs))?;

    let reconciler = Reconciler::new(
        KubernetesStore::new(kubernetes.client.clone()),
        callback,
        cfg.job.clone(),
    );
    let ctx = Arc::new(Context::new(reconciler, cfg.controller.clone()));
    let ready = Arc::new(AtomicBool::new(false));

    let mut set = JoinSet::new();

    // Spawn tasks into the set
    set.spawn(start_controller(
        kubernetes.client.clone(),
        ctx,
        ready.clone(),
    ));
    set.spawn(start_health_server(
        AppState {
            cargo_pkg_name,
            cargo_pkg_version,
            ready,
        },
        cfg.server_address,
    ));

    info!("✅ All background tasks started");

    // Unified shutdown logic
    tokio::select! {
        _ = shutdown_signal() => {
            info!("🛑 Shutdown signal received");
            set.shutdown().await;
        }
        Some(result) = set.join_next() => {
            match result {
                Ok(Ok(())) => error!("A background task exited unexpectedly!"),
                Ok(Err(e)) => error!("Task failed: {}", e),
                Err(e) => error!("Task panic: {}", e),
            }
            set.shutdown().await;
        }
    }

    println!("👋 Shutting down gracefully...");

    Ok(())
}

// Health and readiness probes
async fn start_health_server(state: AppState, addr: SocketAddr) -> Result<(), AppError> {
    let cargo_pkg_name = state.cargo_pkg_name;
    let app = app::app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("🚀 {} health server running at {:#?}", cargo_pkg_name, addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub mod load_service_env;
pub mod shutdown_signal;

use std::path::{Path, PathBuf};

/// Loads `.env`, `.env.staging` or `.env.production` (picked by `APP_ENV`) from the service dir,
/// then the workspace `.env` as a fallback. Already set variables are never overridden.
///
/// Returns the service file that was loaded. In a container it usually doesn't exist,
/// the variables come from the pod spec instead.
pub fn load_service_env(manifest_dir: &Path) -> Result<PathBuf, dotenvy::Error> {
    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());

    let filename = match env.as_str() {
        "production" => ".env.production",
        "staging" => ".env.staging",
        _ => ".env",
    };

    let candidate = manifest_dir.join(filename);
    let loaded = dotenvy::from_path(&candidate);

    // Load workspace root .env as fallback
    dotenvy::dotenv().ok();

    loaded.map(|_| candidate)
}

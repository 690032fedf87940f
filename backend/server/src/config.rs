use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use anyhow::{Result, anyhow, bail};
use tracing::{info, warn};

/// Signing keys are derived from the secret, which needs at least this many bytes.
pub const MIN_SECRET_LEN: usize = 32;
pub const DEV_SECRET_KEY: &str = "dev-key-change-me-dev-key-change-me";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend {other:?}")),
        }
    }
}

pub struct Config {
    pub port: u16,
    /// Base of the join links encoded into QR codes, without a trailing slash.
    pub public_url: String,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub upload_dir: PathBuf,
    pub qr_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub secret_key: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let port: u16 = try_load("RUST_PORT", "5000")?;
        let public_url: String = try_load("PUBLIC_URL", &format!("http://localhost:{port}"))?;

        let secret_key = read_secret("SECRET_KEY").unwrap_or_else(|| {
            warn!("SECRET_KEY not set, using the development key");
            DEV_SECRET_KEY.to_string()
        });
        check_secret(&secret_key)?;

        Ok(Self {
            port,
            public_url: public_url.trim_end_matches('/').to_string(),
            store_backend: try_load("STORE_BACKEND", "redis")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            upload_dir: try_load("UPLOAD_DIR", "static/uploads")?,
            qr_dir: try_load("QR_DIR", "static/qrs")?,
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", "20971520")?,
            secret_key,
        })
    }

    pub fn join_url(&self, event_id: u64) -> String {
        format!("{}/e/{event_id}/join", self.public_url)
    }
}

fn check_secret(secret: &str) -> Result<()> {
    if secret.len() < MIN_SECRET_LEN {
        bail!("SECRET_KEY must be at least {MIN_SECRET_LEN} bytes long");
    }

    Ok(())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    resolve(key, env::var(key).ok(), default)
}

fn resolve<T: FromStr>(key: &str, value: Option<String>, default: &str) -> Result<T>
where
    T::Err: Display,
{
    value
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value: {e}"))
}

/// Docker secret file first, then the environment.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("No secret file for {secret_name}: {e}");
        })
        .ok()
        .or_else(|| env::var(secret_name).ok())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uses_default() {
        let port: u16 = resolve("RUST_PORT", None, "5000").unwrap();
        assert_eq!(port, 5000);
    }

    #[test]
    fn test_resolve_prefers_value() {
        let port: u16 = resolve("RUST_PORT", Some("8080".to_string()), "5000").unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        let err = resolve::<u16>("RUST_PORT", Some("eighty".to_string()), "5000").unwrap_err();
        assert!(err.to_string().contains("RUST_PORT"));
    }

    #[test]
    fn test_store_backend() {
        assert_eq!("redis".parse(), Ok(StoreBackend::Redis));
        assert_eq!(" Memory ".parse(), Ok(StoreBackend::Memory));
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_short_secret_is_rejected() {
        assert!(check_secret("short").is_err());
        assert!(check_secret(DEV_SECRET_KEY).is_ok());
    }
}

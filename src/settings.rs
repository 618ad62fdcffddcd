//! Runtime settings from the environment (a `.env` file is loaded first when present).

use crate::error::ConfigError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    /// PostgreSQL schema holding the catalog tables. `LIBRARY_SCHEMA`, default `catalog`.
    pub schema: String,
    pub bind_addr: SocketAddr,
    pub store: StoreBackend,
    pub storage: StorageBackend,
    pub media_root: PathBuf,
    pub s3_bucket: Option<String>,
    /// Transport limit for upload request bodies. Image fields have their own 2 MiB check.
    pub max_upload_bytes: usize,
}

impl Settings {
    pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        let store = match get("STORE_BACKEND").unwrap_or("postgres") {
            s if s.eq_ignore_ascii_case("postgres") => StoreBackend::Postgres,
            s if s.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };
        let storage = match get("STORAGE_BACKEND").unwrap_or("local") {
            s if s.eq_ignore_ascii_case("local") => StorageBackend::Local,
            s if s.eq_ignore_ascii_case("s3") => StorageBackend::S3,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };
        let s3_bucket = get("S3_BUCKET").map(str::to_string);
        if storage == StorageBackend::S3 && s3_bucket.is_none() {
            return Err(ConfigError::Missing("S3_BUCKET"));
        }

        let bind = get("BIND_ADDR").unwrap_or("0.0.0.0:3000");
        let bind_addr = bind.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind.to_string(),
        })?;

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            None => Self::DEFAULT_MAX_UPLOAD_BYTES,
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                name: "MAX_UPLOAD_BYTES",
                value: v.to_string(),
            })?,
        };

        let schema = get("LIBRARY_SCHEMA").unwrap_or("catalog").to_string();
        if !schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Invalid {
                name: "LIBRARY_SCHEMA",
                value: schema,
            });
        }

        Ok(Settings {
            database_url: get("DATABASE_URL")
                .unwrap_or("postgres://localhost/locallibrary")
                .to_string(),
            schema,
            bind_addr,
            store,
            storage,
            media_root: PathBuf::from(get("MEDIA_ROOT").unwrap_or("media")),
            s3_bucket,
            max_upload_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults() {
        let s = Settings::from_vars(&HashMap::new()).unwrap();
        assert_eq!(s.schema, "catalog");
        assert_eq!(s.store, StoreBackend::Postgres);
        assert_eq!(s.storage, StorageBackend::Local);
        assert_eq!(s.bind_addr.port(), 3000);
        assert_eq!(s.max_upload_bytes, Settings::DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn s3_needs_bucket() {
        let err = Settings::from_vars(&vars(&[("STORAGE_BACKEND", "s3")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("S3_BUCKET")));
        let s = Settings::from_vars(&vars(&[("STORAGE_BACKEND", "S3"), ("S3_BUCKET", "media")])).unwrap();
        assert_eq!(s.s3_bucket.as_deref(), Some("media"));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(Settings::from_vars(&vars(&[("STORE_BACKEND", "redis")])).is_err());
        assert!(Settings::from_vars(&vars(&[("BIND_ADDR", "nowhere")])).is_err());
        assert!(Settings::from_vars(&vars(&[("LIBRARY_SCHEMA", "a;drop")])).is_err());
        assert!(Settings::from_vars(&vars(&[("MAX_UPLOAD_BYTES", "lots")])).is_err());
    }
}

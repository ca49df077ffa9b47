use std::fmt;

use crate::config::{optional, require, ConfigResult};

pub const DEFAULT_BUCKET: &str = "documents";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for the S3-compatible document store (MinIO).
#[derive(Clone)]
pub struct StorageConfig {
    /// Full endpoint URL including scheme.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl StorageConfig {
    /// `MINIO_ENDPOINT`, `MINIO_ROOT_USER` and `MINIO_ROOT_PASSWORD` are
    /// required. An endpoint given as `host:port` is treated as plain HTTP.
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            endpoint: Some(normalize_endpoint(&require("MINIO_ENDPOINT")?)),
            region: optional("MINIO_REGION", DEFAULT_REGION),
            bucket: optional("MINIO_BUCKET", DEFAULT_BUCKET),
            access_key: require("MINIO_ROOT_USER")?,
            secret_key: require("MINIO_ROOT_PASSWORD")?,
            path_style: true,
        })
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(normalize_endpoint(&endpoint.into())),
            region: DEFAULT_REGION.to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("path_style", &self.path_style)
            .finish()
    }
}

fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use serial_test::serial;

    fn clear_minio_env() {
        for name in [
            "MINIO_ENDPOINT",
            "MINIO_ROOT_USER",
            "MINIO_ROOT_PASSWORD",
            "MINIO_BUCKET",
            "MINIO_REGION",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_for_minio() {
        let config = StorageConfig::for_minio("localhost:9000", "test-bucket");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.bucket, "test-bucket");
        assert!(config.path_style);
    }

    #[test]
    fn test_normalize_keeps_scheme() {
        assert_eq!(normalize_endpoint("https://s3.local/"), "https://s3.local");
        assert_eq!(normalize_endpoint("minio:9000"), "http://minio:9000");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_minio_env();
        std::env::set_var("MINIO_ENDPOINT", "minio:9000");
        std::env::set_var("MINIO_ROOT_USER", "paperless");
        std::env::set_var("MINIO_ROOT_PASSWORD", "paperless-secret");

        let config = StorageConfig::from_env().unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(config.bucket, "documents");
        assert_eq!(config.region, "us-east-1");
        assert!(!format!("{:?}", config).contains("paperless-secret"));

        clear_minio_env();
    }

    #[test]
    #[serial]
    fn test_from_env_missing_endpoint() {
        clear_minio_env();
        std::env::set_var("MINIO_ROOT_USER", "paperless");
        std::env::set_var("MINIO_ROOT_PASSWORD", "secret");

        assert!(matches!(
            StorageConfig::from_env(),
            Err(ConfigError::Missing("MINIO_ENDPOINT"))
        ));

        clear_minio_env();
    }
}

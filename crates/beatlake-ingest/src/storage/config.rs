use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Full endpoint URL; `None` targets AWS S3
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
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

fn required(names: &[&str]) -> Result<String, ConfigError> {
    names
        .iter()
        .find_map(|name| env::var(name).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| ConfigError::Missing(names[0].to_string()))
}

/// `host:port` endpoints get a scheme from `MINIO_SECURE`
fn normalize_endpoint(raw: &str, secure: bool) -> String {
    let raw = raw.trim().trim_end_matches('/');
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else if secure {
        format!("https://{}", raw)
    } else {
        format!("http://{}", raw)
    }
}

impl StorageConfig {
    /// Read `MINIO_*` variables.
    ///
    /// Access key, secret key and bucket are required. A configured endpoint
    /// defaults to path-style addressing, which MinIO needs.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secure = env::var("MINIO_SECURE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let endpoint = env::var("MINIO_ENDPOINT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| normalize_endpoint(&v, secure));

        let path_style = match env::var("MINIO_PATH_STYLE") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::invalid("MINIO_PATH_STYLE", format!("expected true or false, got '{}'", v)))?,
            Err(_) => endpoint.is_some(),
        };

        Ok(Self {
            endpoint,
            region: env::var("MINIO_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            bucket: required(&["MINIO_BUCKET", "BUCKET_NAME"])?,
            access_key: required(&["MINIO_ACCESS_KEY", "AWS_ACCESS_KEY_ID"])?,
            secret_key: required(&["MINIO_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"])?,
            path_style,
        })
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_REGION.to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "MINIO_ENDPOINT",
        "MINIO_SECURE",
        "MINIO_PATH_STYLE",
        "MINIO_REGION",
        "MINIO_BUCKET",
        "BUCKET_NAME",
        "MINIO_ACCESS_KEY",
        "MINIO_SECRET_KEY",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_for_minio() {
        let config = StorageConfig::for_minio("http://localhost:9000", "music");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.bucket, "music");
        assert!(config.path_style);
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("minio:9000", false), "http://minio:9000");
        assert_eq!(normalize_endpoint("minio:9000", true), "https://minio:9000");
        assert_eq!(normalize_endpoint("http://minio:9000/", true), "http://minio:9000");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear();
        env::set_var("MINIO_ENDPOINT", "localhost:9000");
        env::set_var("MINIO_BUCKET", "music");
        env::set_var("MINIO_ACCESS_KEY", "minio");
        env::set_var("MINIO_SECRET_KEY", "minio123");

        let config = StorageConfig::from_env().unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.region, "us-east-1");
        assert!(config.path_style);
        assert!(!format!("{:?}", config).contains("minio123"));
        clear();
    }

    #[test]
    #[serial]
    fn test_from_env_missing_bucket() {
        clear();
        env::set_var("MINIO_ACCESS_KEY", "minio");
        env::set_var("MINIO_SECRET_KEY", "minio123");

        match StorageConfig::from_env() {
            Err(ConfigError::Missing(var)) => assert_eq!(var, "MINIO_BUCKET"),
            other => panic!("expected missing bucket, got {:?}", other),
        }
        clear();
    }
}

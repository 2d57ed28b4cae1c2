/// `load_config` module: builds the run configuration from the process environment.
///
/// This is the only place environment variables are read. Everything downstream
/// receives an immutable [`LoaderConfig`].
///
/// # Responsibilities
/// - Read required settings (`S3_SOURCE_BUCKET`, `ELASTIC_INDEX`, `ELASTIC_ID`,
///   `ELASTIC_USERNAME`, `ELASTIC_PASSWORD`) and the optional tuning knobs
/// - Apply command-line overrides on top of the environment
/// - Report every missing value at once, before any network I/O happens
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary as a
/// fatal startup failure.
use anyhow::{bail, Context, Result};
use stac_loader_core::config::IngestConfig;
use stac_loader_core::fetch::DEFAULT_CONCURRENCY;
use std::fmt;
use tracing::{error, info};

use crate::elastic::DEFAULT_FLUSH_BYTES;
use crate::store::s3::{AwsCredentials, S3Config};

pub const SOURCE_VAR: &str = "S3_SOURCE_BUCKET";
pub const INDEX_VAR: &str = "ELASTIC_INDEX";
pub const ELASTIC_ID_VAR: &str = "ELASTIC_ID";
pub const ELASTIC_USERNAME_VAR: &str = "ELASTIC_USERNAME";
pub const ELASTIC_PASSWORD_VAR: &str = "ELASTIC_PASSWORD";
pub const ELASTIC_URL_VAR: &str = "ELASTIC_URL";
pub const FLUSH_BYTES_VAR: &str = "ELASTIC_FLUSH_BYTES";
pub const CONCURRENCY_VAR: &str = "STAC_CONCURRENCY";
pub const AWS_ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";
pub const AWS_REGION_VAR: &str = "AWS_REGION";
pub const AWS_ENDPOINT_VAR: &str = "AWS_ENDPOINT_URL";

const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for the Elasticsearch deployment.
#[derive(Clone)]
pub struct ElasticConfig {
    /// Elastic Cloud id, `name:base64(host$es_uuid$kibana_uuid)`.
    pub cloud_id: String,
    pub username: String,
    pub password: String,
    /// Explicit endpoint; takes precedence over the one encoded in `cloud_id`.
    pub url: Option<String>,
    pub flush_bytes: usize,
}

impl fmt::Debug for ElasticConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticConfig")
            .field("cloud_id", &self.cloud_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("url", &self.url)
            .field("flush_bytes", &self.flush_bytes)
            .finish()
    }
}

/// Everything a run needs, validated up front.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub ingest: IngestConfig,
    pub elastic: ElasticConfig,
    /// Present when the source root is an `s3://` location.
    pub s3: Option<S3Config>,
}

/// Values given on the command line; each one replaces its environment variable.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub source: Option<String>,
    pub index: Option<String>,
    pub concurrency: Option<usize>,
}

/// Load and validate configuration from the environment plus `overrides`.
pub fn load_config(overrides: &ConfigOverrides) -> Result<LoaderConfig> {
    info!("Loading configuration from environment");
    let mut missing: Vec<&str> = Vec::new();

    let source_root = overrides
        .source
        .clone()
        .or_else(|| env_value(SOURCE_VAR))
        .unwrap_or_else(|| {
            missing.push(SOURCE_VAR);
            String::new()
        });
    let target_index = overrides
        .index
        .clone()
        .or_else(|| env_value(INDEX_VAR))
        .unwrap_or_else(|| {
            missing.push(INDEX_VAR);
            String::new()
        });
    let mut required = |name: &'static str| {
        env_value(name).unwrap_or_else(|| {
            missing.push(name);
            String::new()
        })
    };
    let cloud_id = required(ELASTIC_ID_VAR);
    let username = required(ELASTIC_USERNAME_VAR);
    let password = required(ELASTIC_PASSWORD_VAR);

    let s3 = if source_root.starts_with("s3://") {
        let access_key_id = required(AWS_ACCESS_KEY_VAR);
        let secret_access_key = required(AWS_SECRET_KEY_VAR);
        Some(S3Config {
            region: env_value(AWS_REGION_VAR).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_url: env_value(AWS_ENDPOINT_VAR),
            credentials: AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: env_value(AWS_SESSION_TOKEN_VAR),
            },
        })
    } else {
        None
    };

    if !missing.is_empty() {
        error!(missing = ?missing, "Required configuration is missing");
        bail!(
            "Missing required environment variables: {}",
            missing.join(", ")
        );
    }

    let concurrency = match overrides.concurrency {
        Some(value) => value,
        None => parse_var(CONCURRENCY_VAR)?.unwrap_or(DEFAULT_CONCURRENCY),
    };
    if concurrency == 0 {
        bail!("Concurrency must be at least 1");
    }
    let flush_bytes = parse_var(FLUSH_BYTES_VAR)?.unwrap_or(DEFAULT_FLUSH_BYTES);

    let ingest = IngestConfig {
        source_root,
        target_index,
        concurrency,
    };
    ingest.trace_loaded();

    let elastic = ElasticConfig {
        cloud_id,
        username,
        password,
        url: env_value(ELASTIC_URL_VAR),
        flush_bytes,
    };
    info!(
        cloud_id = %elastic.cloud_id,
        url = ?elastic.url,
        flush_bytes = elastic.flush_bytes,
        s3_region = ?s3.as_ref().map(|s| s.region.as_str()),
        "Config loaded and validated successfully"
    );

    Ok(LoaderConfig { ingest, elastic, s3 })
}

/// A set, non-empty environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var(name: &str) -> Result<Option<usize>> {
    env_value(name)
        .map(|raw| {
            raw.trim()
                .parse::<usize>()
                .with_context(|| format!("{name} must be a positive integer, got {raw:?}"))
        })
        .transpose()
}

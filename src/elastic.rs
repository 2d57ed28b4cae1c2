#![doc = "Elasticsearch index client: implements the core `IndexClient` contract over the `_bulk` REST API."]
//
//! # Elasticsearch integration
//!
//! [`ElasticClient`] turns a list of [`BulkOperation`]s into NDJSON `_bulk`
//! requests and maps the response's `items` array back to one
//! [`BulkItemResult`] per operation.
//!
//! - The endpoint is decoded from the Elastic Cloud id unless an explicit
//!   `ELASTIC_URL` is configured.
//! - Authentication is HTTP basic auth with the configured username/password.
//! - Operations are split into chunks of at most `flush_bytes` serialized
//!   bytes; each chunk is one HTTP request. A single document larger than the
//!   limit is sent on its own.
//! - No retries: a rejected item is reported, a failed request is an error.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{Map, Value};

use stac_loader_core::contract::{BulkItemResult, BulkOperation, IndexClient, IndexError};

use crate::load_config::ElasticConfig;

/// Default upper bound on the serialized size of one bulk request.
pub const DEFAULT_FLUSH_BYTES: usize = 5_000_000;

pub struct ElasticClient {
    http: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
    flush_bytes: usize,
}

impl ElasticClient {
    pub fn new(config: &ElasticConfig) -> Result<Self> {
        let endpoint = match &config.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => endpoint_from_cloud_id(&config.cloud_id)?,
        };
        tracing::info!(
            endpoint = %endpoint,
            username = %config.username,
            flush_bytes = config.flush_bytes,
            "Initialized ElasticClient"
        );
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
            flush_bytes: config.flush_bytes.max(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn submit_chunk(
        &self,
        body: String,
        ids: &[String],
    ) -> Result<Vec<BulkItemResult>, IndexError> {
        let url = format!("{}/_bulk", self.endpoint);
        tracing::debug!(url = %url, documents = ids.len(), bytes = body.len(), "Sending bulk chunk");

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url = %url, "Bulk request could not be sent");
                IndexError::Transport(e.to_string())
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        if !status.is_success() {
            tracing::error!(status = %status, url = %url, "Bulk request returned error status");
            return Err(IndexError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        parse_bulk_response(&text, ids)
    }
}

#[async_trait]
impl IndexClient for ElasticClient {
    async fn bulk(&self, operations: Vec<BulkOperation>) -> Result<Vec<BulkItemResult>, IndexError> {
        let mut results = Vec::with_capacity(operations.len());
        for (body, ids) in encode_chunks(&operations, self.flush_bytes)? {
            results.extend(self.submit_chunk(body, &ids).await?);
        }
        tracing::info!(
            documents = operations.len(),
            rejected = results
                .iter()
                .filter(|r| matches!(r, BulkItemResult::Rejected { .. }))
                .count(),
            "Bulk submission finished"
        );
        Ok(results)
    }
}

/// Decode an Elastic Cloud id into the Elasticsearch HTTPS endpoint.
pub fn endpoint_from_cloud_id(cloud_id: &str) -> Result<String> {
    let (_name, encoded) = cloud_id
        .split_once(':')
        .context("Elastic cloud id must look like `name:base64data`")?;
    let decoded = STANDARD
        .decode(encoded.trim())
        .context("Elastic cloud id payload is not valid base64")?;
    let decoded = String::from_utf8(decoded).context("Elastic cloud id payload is not UTF-8")?;
    let mut parts = decoded.split('$');
    let host = parts.next().unwrap_or_default();
    let es_uuid = parts.next().unwrap_or_default();
    if host.is_empty() || es_uuid.is_empty() {
        bail!("Elastic cloud id does not contain a host and cluster id");
    }
    Ok(format!("https://{es_uuid}.{host}"))
}

/// Serialize operations into NDJSON bodies of at most `flush_bytes` each.
fn encode_chunks(
    operations: &[BulkOperation],
    flush_bytes: usize,
) -> Result<Vec<(String, Vec<String>)>, IndexError> {
    let mut chunks = Vec::new();
    let mut body = String::new();
    let mut ids = Vec::new();

    for op in operations {
        let action = serde_json::json!({ "index": { "_index": op.index, "_id": op.id } });
        let document = serde_json::to_string(&op.body)
            .map_err(|e| IndexError::Transport(format!("failed to encode {}: {e}", op.id)))?;
        let entry = format!("{action}\n{document}\n");

        if !body.is_empty() && body.len() + entry.len() > flush_bytes {
            chunks.push((std::mem::take(&mut body), std::mem::take(&mut ids)));
        }
        body.push_str(&entry);
        ids.push(op.id.clone());
    }
    if !body.is_empty() {
        chunks.push((body, ids));
    }
    Ok(chunks)
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct BulkResponseItem {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    error: Option<Value>,
}

/// Map a `_bulk` response to one result per request line, in request order.
fn parse_bulk_response(text: &str, ids: &[String]) -> Result<Vec<BulkItemResult>, IndexError> {
    let response: BulkResponse =
        serde_json::from_str(text).map_err(|e| IndexError::Response(e.to_string()))?;
    if response.items.len() != ids.len() {
        return Err(IndexError::Response(format!(
            "expected {} items, got {}",
            ids.len(),
            response.items.len()
        )));
    }

    response
        .items
        .into_iter()
        .zip(ids)
        .map(|(entry, requested_id)| {
            let (_action, value) = entry
                .into_iter()
                .next()
                .ok_or_else(|| IndexError::Response("empty bulk item".to_string()))?;
            let item: BulkResponseItem =
                serde_json::from_value(value).map_err(|e| IndexError::Response(e.to_string()))?;
            let id = item.id.unwrap_or_else(|| requested_id.clone());
            Ok(match item.error {
                Some(error) => BulkItemResult::Rejected {
                    id,
                    status: item.status,
                    reason: describe_error(&error),
                },
                None if item.status >= 300 => BulkItemResult::Rejected {
                    id,
                    status: item.status,
                    reason: format!("HTTP {}", item.status),
                },
                None => BulkItemResult::Accepted { id },
            })
        })
        .collect()
}

fn describe_error(error: &Value) -> String {
    let kind = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
        (Some(kind), None) => kind.to_string(),
        (None, Some(reason)) => reason.to_string(),
        (None, None) => error.to_string(),
    }
}

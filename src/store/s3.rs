//! Amazon S3 document store.
//!
//! Lists and reads objects through the S3 REST API with AWS Signature V4
//! authentication (`hmac` + `sha2`, no SDK). Listing follows `ListObjectsV2`
//! continuation tokens lazily, one page per poll of the key stream.
//!
//! Keys are full `s3://bucket/key` URIs, both on the way out of [`S3Store::list`]
//! and on the way into [`S3Store::read`].
//!
//! With `endpoint_url` set (MinIO, LocalStack) requests use path-style
//! addressing against that endpoint, keeping its scheme; otherwise they go to
//! `https://<bucket>.s3.<region>.amazonaws.com`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};

use stac_loader_core::contract::{DocumentStore, StoreError};

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials, normally from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub endpoint_url: Option<String>,
    pub credentials: AwsCredentials,
}

/// A parsed `s3://bucket/prefix` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn parse(uri: &str) -> Result<Self, StoreError> {
        let rest = uri.strip_prefix("s3://").ok_or_else(|| StoreError::Http {
            key: uri.to_string(),
            message: "not an s3:// location".to_string(),
        })?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(StoreError::Http {
                key: uri.to_string(),
                message: "missing bucket name".to_string(),
            });
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Clone)]
pub struct S3Store {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    config: S3Config,
}

/// One `ListObjectsV2` page.
struct ListPage {
    keys: Vec<String>,
    next_token: Option<String>,
}

impl S3Store {
    pub fn new(config: S3Config) -> Self {
        tracing::info!(
            region = %config.region,
            endpoint_url = ?config.endpoint_url,
            session_token = config.credentials.session_token.is_some(),
            "Initialized S3Store"
        );
        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                config,
            }),
        }
    }

    /// Base URL, `Host` header and canonical path prefix for `bucket`.
    fn target(&self, bucket: &str) -> (String, String, String) {
        match &self.inner.config.endpoint_url {
            Some(endpoint) => {
                let endpoint = endpoint.trim_end_matches('/');
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .to_string();
                (endpoint.to_string(), host, format!("/{bucket}"))
            }
            None => {
                let host = format!("{bucket}.s3.{}.amazonaws.com", self.inner.config.region);
                (format!("https://{host}"), host, String::new())
            }
        }
    }

    async fn list_page(
        &self,
        location: &S3Location,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let mut query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), "1000".to_string()),
        ];
        if !location.key.is_empty() {
            query.push(("prefix".to_string(), location.key.clone()));
        }
        if let Some(token) = continuation_token {
            query.push(("continuation-token".to_string(), token.to_string()));
        }
        query.sort();
        let canonical_query = query
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let (base, host, path_prefix) = self.target(&location.bucket);
        let canonical_uri = format!("{path_prefix}/");
        let url = format!("{base}{canonical_uri}?{canonical_query}");
        let headers = self.sign("GET", &host, &canonical_uri, &canonical_query, Utc::now());

        tracing::debug!(url = %url, "Listing S3 objects");
        let mut req = self.inner.http.get(&url);
        for (name, value) in &headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req.send().await.map_err(|e| StoreError::Http {
            key: location.uri(),
            message: e.to_string(),
        })?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| StoreError::Http {
            key: location.uri(),
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(StoreError::Http {
                key: location.uri(),
                message: format!(
                    "ListObjectsV2 failed (HTTP {status}): {}",
                    body.chars().take(500).collect::<String>()
                ),
            });
        }

        let (keys, is_truncated, next_token) =
            parse_list_objects_response(&body).map_err(|e| StoreError::Http {
                key: location.uri(),
                message: format!("unreadable ListObjectsV2 response: {e}"),
            })?;
        tracing::debug!(count = keys.len(), is_truncated, "Listed S3 page");
        Ok(ListPage {
            keys: keys
                .into_iter()
                .map(|key| format!("s3://{}/{key}", location.bucket))
                .collect(),
            next_token: if is_truncated { next_token } else { None },
        })
    }

    /// SigV4 headers for a request with an empty payload.
    fn sign(
        &self,
        method: &str,
        host: &str,
        canonical_uri: &str,
        canonical_query: &str,
        now: DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let creds = &self.inner.config.credentials;
        let region = &self.inner.config.region;
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(b"");

        let mut headers = vec![
            ("host".to_string(), host.to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = &creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort();

        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}\n"))
            .collect();
        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );

        let credential_scope = format!("{date_stamp}/{region}/s3/aws4_request");
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );
        let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3");
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        headers.retain(|(k, _)| k != "host");
        headers.push((
            "authorization".to_string(),
            format!(
                "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
                creds.access_key_id
            ),
        ));
        headers
    }
}

#[async_trait]
impl DocumentStore for S3Store {
    fn list(&self, root: &str) -> BoxStream<'static, Result<String, StoreError>> {
        let location = match S3Location::parse(root) {
            Ok(location) => location,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let store = self.clone();

        // State: Some(token) = fetch the next page with that token, None = done.
        stream::try_unfold(Some(None::<String>), move |state| {
            let store = store.clone();
            let location = location.clone();
            async move {
                let Some(token) = state else {
                    return Ok::<_, StoreError>(None);
                };
                let page = store.list_page(&location, token.as_deref()).await?;
                let next = page.next_token.map(Some);
                Ok(Some((page.keys, next)))
            }
        })
        .map_ok(|keys| stream::iter(keys.into_iter().map(Ok::<String, StoreError>)))
        .try_flatten()
        .boxed()
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let location = S3Location::parse(key)?;
        let (base, host, path_prefix) = self.target(&location.bucket);
        let encoded_key = location
            .key
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        let canonical_uri = format!("{path_prefix}/{encoded_key}");
        let headers = self.sign("GET", &host, &canonical_uri, "", Utc::now());

        let mut req = self.inner.http.get(format!("{base}{canonical_uri}"));
        for (name, value) in &headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req.send().await.map_err(|e| StoreError::Http {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(StoreError::Http {
                key: key.to_string(),
                message: format!("GetObject failed (HTTP {status})"),
            });
        }
        let bytes = resp.bytes().await.map_err(|e| StoreError::Http {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

// ============ AWS SigV4 Helpers ============

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// `kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything except `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char)
            }
            _ => result.push_str(&format!("%{byte:02X}")),
        }
    }
    result
}

// ============ ListObjectsV2 XML ============

/// Keys, truncation flag and continuation token of one listing page.
///
/// Prefix placeholders (keys ending in `/`) are skipped.
fn parse_list_objects_response(
    xml: &str,
) -> Result<(Vec<String>, bool, Option<String>), quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut keys = Vec::new();
    let mut is_truncated = false;
    let mut next_token = None;
    loop {
        let text = match reader.read_event()? {
            Event::Start(e) => {
                path.push(e.local_name().as_ref().to_vec());
                continue;
            }
            Event::End(_) => {
                path.pop();
                continue;
            }
            Event::Text(t) => t.unescape()?.into_owned(),
            Event::CData(c) => String::from_utf8_lossy(&c.into_inner()).into_owned(),
            Event::Eof => break,
            _ => continue,
        };

        let in_contents = path.len() >= 2 && path[path.len() - 2].as_slice() == b"Contents";
        match path.last().map(Vec::as_slice) {
            Some(b"Key") if in_contents => {
                if !text.is_empty() && !text.ends_with('/') {
                    keys.push(text);
                }
            }
            Some(b"IsTruncated") => is_truncated = text == "true",
            Some(b"NextContinuationToken") => next_token = Some(text),
            _ => {}
        }
    }
    Ok((keys, is_truncated, next_token))
}

//! STAC document model and key helpers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Asset hrefs starting with one of these are already absolute and left untouched.
pub const ABSOLUTE_SCHEMES: [&str; 2] = ["s3://", "https://"];

/// Only keys whose final segment ends with this are treated as documents.
pub const DOCUMENT_EXTENSION: &str = ".json";

/// A STAC item, collection or catalog.
///
/// Only the fields the normalizer touches are typed; everything else is kept
/// in `extra` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StacDocument {
    #[serde(rename = "@source", default, skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    #[serde(rename = "@timestamp", default, skip_serializing_if = "Option::is_none")]
    pub generated_timestamp: Option<String>,
    #[serde(rename = "@ingested", default, skip_serializing_if = "Option::is_none")]
    pub ingest_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stac_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<BTreeMap<String, Asset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Link {
    pub fn is_self(&self) -> bool {
        self.rel == "self"
    }
}

/// Collected fetch results: one slot per eligible key, `None` where the key was dropped.
#[derive(Debug, Default)]
pub struct Batch {
    pub slots: Vec<Option<StacDocument>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    pub fn into_documents(self) -> Vec<StacDocument> {
        self.slots.into_iter().flatten().collect()
    }
}

pub fn is_absolute_href(href: &str) -> bool {
    ABSOLUTE_SCHEMES.iter().any(|scheme| href.starts_with(scheme))
}

pub fn is_document_key(key: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.ends_with(DOCUMENT_EXTENSION)
}

/// The key with its final segment removed; empty when the key has no `/`.
pub fn parent_dir(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..idx],
        None => "",
    }
}

/// Join `relative` onto `dir` and collapse `.`/`..` segments.
///
/// A `scheme://authority` prefix on `dir` is kept as an opaque root: `..`
/// never climbs above it. Leading `/` on `dir` is preserved.
pub fn join_key(dir: &str, relative: &str) -> String {
    let (root, path) = split_root(dir);
    let absolute = root.is_empty() && path.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/').chain(relative.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().map_or(false, |last| *last != "..") {
                    segments.pop();
                } else if root.is_empty() && !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if !root.is_empty() {
        format!("{root}/{joined}")
    } else if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Split `scheme://authority` off the front of a key.
fn split_root(key: &str) -> (&str, &str) {
    if let Some(scheme_end) = key.find("://") {
        let after = scheme_end + 3;
        match key[after..].find('/') {
            Some(slash) => (&key[..after + slash], &key[after + slash..]),
            None => (key, ""),
        }
    } else {
        ("", key)
    }
}

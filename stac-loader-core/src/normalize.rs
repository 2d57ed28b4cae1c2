//! Per-document normalization: parse, derive `@timestamp`, repair links, tag the source.
//!
//! Every failure mode resolves to `None` plus a log event. Nothing here returns
//! an error to the caller.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::document::{is_absolute_href, parent_dir, StacDocument};

/// Summary key holding the generation history of a collection.
pub const GENERATED_SUMMARY: &str = "linz:generated";

/// Normalize one raw document read from `key`.
///
/// `join` resolves a relative asset href against the document's directory; it
/// is normally [`DocumentStore::join`](crate::contract::DocumentStore::join).
pub fn normalize<F>(raw: &[u8], key: &str, join: F) -> Option<StacDocument>
where
    F: Fn(&str, &str) -> String,
{
    let mut doc: StacDocument = match serde_json::from_slice(raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(key, error = %e, "File:Parse:Failed");
            return None;
        }
    };

    if doc.stac_version.is_none() {
        warn!(key, "File:StacVersion:Missing");
        return None;
    }
    debug!(key, file_id = ?doc.id, "StacFile");

    derive_timestamp(&mut doc);
    if doc.generated_timestamp.is_none() {
        error!(key, "File:Timestamp:Missing");
    }

    correct_self_link(&mut doc, key);
    resolve_asset_hrefs(&mut doc, key, join);

    doc.source_key = Some(key.to_string());
    doc.ingest_timestamp = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
    Some(doc)
}

/// Apply the timestamp precedence: generation summary, then properties.
///
/// A generation summary entry always decides, even when it carries neither
/// `date` nor `datetime`. With neither block present, any `@timestamp` the
/// input carried is kept.
pub fn derive_timestamp(doc: &mut StacDocument) {
    if let Some(entry) = doc.summaries.as_ref().and_then(first_generated_entry) {
        doc.generated_timestamp =
            string_field(entry, "date").or_else(|| string_field(entry, "datetime"));
    } else if let Some(properties) = &doc.properties {
        doc.generated_timestamp = string_field(properties, "datetime");
    }
}

fn first_generated_entry(summaries: &Map<String, Value>) -> Option<&Map<String, Value>> {
    summaries
        .get(GENERATED_SUMMARY)?
        .as_array()?
        .first()?
        .as_object()
}

fn string_field(object: &Map<String, Value>, field: &str) -> Option<String> {
    object.get(field).and_then(Value::as_str).map(str::to_owned)
}

/// Point the single `self` link at `key`. Zero or several self links are only reported.
pub fn correct_self_link(doc: &mut StacDocument, key: &str) {
    let self_links: Vec<usize> = doc
        .links
        .iter()
        .enumerate()
        .filter(|(_, link)| link.is_self())
        .map(|(idx, _)| idx)
        .collect();

    match self_links.as_slice() {
        [idx] => {
            let link = &mut doc.links[*idx];
            if link.href != key {
                info!(key, old_link = %link.href, "File:CorrectLinkSelf");
                link.href = key.to_string();
            }
        }
        _ => {
            let hrefs: Vec<&str> = self_links
                .iter()
                .map(|idx| doc.links[*idx].href.as_str())
                .collect();
            warn!(key, count = self_links.len(), links = ?hrefs, "File:LinkSelf:Unexpected");
        }
    }
}

/// Rewrite relative asset hrefs against the directory containing `key`.
pub fn resolve_asset_hrefs<F>(doc: &mut StacDocument, key: &str, join: F)
where
    F: Fn(&str, &str) -> String,
{
    let Some(assets) = doc.assets.as_mut() else {
        return;
    };
    let source_dir = parent_dir(key);
    for asset in assets.values_mut() {
        if is_absolute_href(&asset.href) {
            continue;
        }
        let new_link = join(source_dir, &asset.href);
        info!(key, old_link = %asset.href, new_link = %new_link, "File:CorrectAssetHref");
        asset.href = new_link;
    }
}

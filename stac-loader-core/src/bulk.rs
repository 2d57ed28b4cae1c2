//! Bulk index writer: one index operation per document, one submission, rejections reported.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::contract::{BulkItemResult, BulkOperation, IndexClient, IndexError};
use crate::document::StacDocument;

/// A document the index service refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IndexReport {
    pub submitted: usize,
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
}

/// Build the operation for one document. Identity is the key it was read from.
pub fn to_operation(index: &str, doc: &StacDocument) -> Result<BulkOperation, serde_json::Error> {
    let id = doc
        .source_key
        .clone()
        .or_else(|| doc.id.clone())
        .unwrap_or_default();
    Ok(BulkOperation {
        index: index.to_string(),
        id,
        body: serde_json::to_value(doc)?,
    })
}

/// Submit `documents` to `index` as a single bulk request.
///
/// Rejected documents are logged and collected; they never fail the call and
/// are not retried. Only a failure of the submission itself is returned.
pub async fn index_documents<C>(
    client: &C,
    index: &str,
    documents: Vec<StacDocument>,
) -> Result<IndexReport, IndexError>
where
    C: IndexClient + ?Sized,
{
    let mut report = IndexReport::default();
    let mut operations = Vec::with_capacity(documents.len());
    for doc in &documents {
        match to_operation(index, doc) {
            Ok(op) => operations.push(op),
            Err(e) => {
                let id = doc.source_key.clone().unwrap_or_default();
                error!(id = %id, error = %e, "FailedIndex:Serialize");
                report.rejected.push(Rejection {
                    id,
                    status: 0,
                    reason: format!("document could not be serialized: {e}"),
                });
            }
        }
    }

    if operations.is_empty() {
        warn!(index, "[INDEX] Nothing to submit");
        return Ok(report);
    }

    report.submitted = operations.len();
    info!(index, documents = operations.len(), "[INDEX] Submitting bulk request");
    let by_id: HashMap<&str, &StacDocument> = documents
        .iter()
        .filter_map(|doc| doc.source_key.as_deref().map(|key| (key, doc)))
        .collect();
    let results = client.bulk(operations).await.map_err(|e| {
        error!(index, error = %e, "[INDEX][ERROR] Bulk submission failed");
        e
    })?;

    for result in results {
        match result {
            BulkItemResult::Accepted { id } => {
                debug!(id = %id, "Indexed");
                report.accepted += 1;
            }
            BulkItemResult::Rejected { id, status, reason } => {
                let document = by_id
                    .get(id.as_str())
                    .and_then(|doc| serde_json::to_string(doc).ok())
                    .unwrap_or_default();
                error!(id = %id, status, error = %reason, log_message = %document, "FailedIndex");
                report.rejected.push(Rejection { id, status, reason });
            }
        }
    }

    info!(
        index,
        submitted = report.submitted,
        accepted = report.accepted,
        rejected = report.rejected.len(),
        "[INDEX] Bulk submission complete"
    );
    Ok(report)
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::json;

use stac_loader_core::contract::{DocumentStore, MockDocumentStore, StoreError};
use stac_loader_core::document::join_key;
use stac_loader_core::fetch::collect_documents;

/// In-memory store that tracks how many reads are outstanding at once.
struct MemoryStore {
    files: HashMap<String, Vec<u8>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    reads: AtomicUsize,
}

impl MemoryStore {
    fn new(files: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            files: files.into_iter().collect(),
            delay: Duration::from_millis(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn list(&self, root: &str) -> BoxStream<'static, Result<String, StoreError>> {
        let keys: Vec<Result<String, StoreError>> = self
            .files
            .keys()
            .filter(|key| key.starts_with(root))
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(keys).boxed()
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.reads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.files
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

fn item(key: &str) -> (String, Vec<u8>) {
    let doc = json!({
        "stac_version": "1.0.0",
        "id": key,
        "properties": { "datetime": "2020-01-01T00:00:00Z" },
        "links": [{ "rel": "self", "href": key }]
    });
    (key.to_string(), serde_json::to_vec(&doc).unwrap())
}

#[tokio::test]
async fn failed_parses_become_absent_slots() {
    let mut files: Vec<(String, Vec<u8>)> = (0..10).map(|i| item(&format!("a/{i}.json"))).collect();
    files.push(("a/broken-1.json".to_string(), b"{ nope".to_vec()));
    files.push(("a/broken-2.json".to_string(), b"[1, 2".to_vec()));
    files.push((
        "a/no-version.json".to_string(),
        serde_json::to_vec(&json!({ "id": "x", "links": [] })).unwrap(),
    ));
    let store = MemoryStore::new(files);

    let batch = collect_documents(&store, "a/", 4).await.expect("listing succeeds");

    assert_eq!(batch.len(), 13, "one slot per eligible key");
    assert_eq!(batch.dropped(), 3);
    let docs = batch.into_documents();
    assert_eq!(docs.len(), 10);
    assert!(docs.iter().all(|d| d.source_key.is_some()));
}

#[tokio::test]
async fn non_document_keys_are_never_read() {
    let mut files = vec![item("a/1.json"), item("a/2.json")];
    files.push(("a/tile.tif".to_string(), vec![0, 1, 2]));
    files.push(("a/readme.md".to_string(), b"# hello".to_vec()));
    let store = MemoryStore::new(files);

    let batch = collect_documents(&store, "a/", 25).await.unwrap();

    assert_eq!(batch.len(), 2);
    assert_eq!(store.reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn in_flight_fetches_never_exceed_ceiling() {
    let files: Vec<(String, Vec<u8>)> = (0..40).map(|i| item(&format!("a/{i}.json"))).collect();
    let store = MemoryStore::new(files).with_delay(Duration::from_millis(5));

    let batch = collect_documents(&store, "a/", 5).await.unwrap();

    assert_eq!(batch.len(), 40);
    assert_eq!(batch.dropped(), 0);
    let max = store.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 5, "saw {max} concurrent fetches with a ceiling of 5");
    assert!(max > 1, "fetches should overlap, saw {max}");
}

#[tokio::test]
async fn zero_concurrency_is_clamped_to_one() {
    let files: Vec<(String, Vec<u8>)> = (0..5).map(|i| item(&format!("a/{i}.json"))).collect();
    let store = MemoryStore::new(files).with_delay(Duration::from_millis(1));

    let batch = collect_documents(&store, "a/", 0).await.unwrap();

    assert_eq!(batch.len(), 5);
    assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn read_failures_do_not_cancel_siblings() {
    let mut store = MockDocumentStore::new();
    store.expect_list().returning(|_root| {
        stream::iter(vec![
            Ok("s3://bucket/a/1.json".to_string()),
            Ok("s3://bucket/a/missing.json".to_string()),
            Ok("s3://bucket/a/denied.json".to_string()),
        ])
        .boxed()
    });
    store.expect_read().returning(|key| match key {
        "s3://bucket/a/missing.json" => Err(StoreError::NotFound(key.to_string())),
        "s3://bucket/a/denied.json" => Err(StoreError::Http {
            key: key.to_string(),
            message: "HTTP 403".to_string(),
        }),
        _ => Ok(item(key).1),
    });
    store.expect_join().returning(|dir, relative| join_key(dir, relative));

    let batch = collect_documents(&store, "s3://bucket/a", 25).await.unwrap();

    assert_eq!(batch.len(), 3);
    let docs = batch.into_documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].source_key.as_deref(), Some("s3://bucket/a/1.json"));
}

#[tokio::test]
async fn listing_failure_is_an_error() {
    let mut store = MockDocumentStore::new();
    store.expect_list().returning(|_root| {
        stream::iter(vec![
            Ok("s3://bucket/a/1.json".to_string()),
            Err(StoreError::Http {
                key: "s3://bucket/a".to_string(),
                message: "HTTP 500".to_string(),
            }),
        ])
        .boxed()
    });
    store.expect_read().never();

    let result = collect_documents(&store, "s3://bucket/a", 25).await;
    assert!(matches!(result, Err(StoreError::Http { .. })));
}

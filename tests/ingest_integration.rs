use std::env;
use std::fs;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use serial_test::serial;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use stac_loader::{run, Cli, Commands, RunOutcome};

struct AcceptAll;

impl Respond for AcceptAll {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body);
        let items: Vec<Value> = body
            .lines()
            .step_by(2)
            .map(|line| {
                let action: Value = serde_json::from_str(line).unwrap();
                json!({ "index": { "_id": action["index"]["_id"], "status": 201 } })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "errors": false, "items": items }))
    }
}

fn set_elastic_env(url: &str) {
    for var in ["S3_SOURCE_BUCKET", "ELASTIC_INDEX", "STAC_CONCURRENCY", "ELASTIC_FLUSH_BYTES"] {
        env::remove_var(var);
    }
    env::set_var(
        "ELASTIC_ID",
        format!("deployment:{}", STANDARD.encode("example.com$abc$def")),
    );
    env::set_var("ELASTIC_USERNAME", "elastic");
    env::set_var("ELASTIC_PASSWORD", "changeme");
    env::set_var("ELASTIC_URL", url);
}

fn ingest(source: &str, strict: bool) -> Cli {
    Cli {
        command: Commands::Ingest {
            source: Some(source.to_string()),
            index: Some("stac".to_string()),
            concurrency: Some(4),
            strict,
        },
    }
}

#[tokio::test]
#[serial]
async fn ingests_local_catalog_into_elasticsearch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(AcceptAll)
        .expect(1)
        .mount(&server)
        .await;
    set_elastic_env(&server.uri());

    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    fs::write(
        dir.path().join("a/1.json"),
        json!({
            "stac_version": "1.0.0",
            "id": "1",
            "links": [{ "rel": "self", "href": "./old.json" }],
            "assets": { "visual": { "href": "img.tif" } },
            "properties": { "datetime": "2020-01-01T00:00:00Z" }
        })
        .to_string(),
    )
    .unwrap();
    fs::write(dir.path().join("a/broken.json"), "{ not json").unwrap();
    fs::write(dir.path().join("a/img.tif"), [0u8; 8]).unwrap();

    let root = dir.path().to_string_lossy().into_owned();
    let outcome = run(ingest(&root, false)).await.expect("ingest should succeed");

    let RunOutcome::Ingested { report, strict } = &outcome else {
        panic!("expected an ingest outcome, got {outcome:?}");
    };
    assert!(!strict);
    assert_eq!(report.discovered, 2);
    assert_eq!(report.normalized, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.indexed, 1);
    assert!(report.rejected.is_empty());
    assert_eq!(outcome.exit_code(), 0);

    let key = dir.path().join("a/1.json").to_string_lossy().into_owned();
    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let lines: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["index"]["_id"], key.as_str());
    let doc = &lines[1];
    assert_eq!(doc["@source"], key.as_str());
    assert_eq!(doc["@timestamp"], "2020-01-01T00:00:00Z");
    assert!(doc["@ingested"].is_string());
    assert_eq!(doc["links"][0]["href"], key.as_str());
    assert_eq!(
        doc["assets"]["visual"]["href"],
        dir.path().join("a/img.tif").to_string_lossy().as_ref()
    );
}

#[tokio::test]
#[serial]
async fn strict_run_with_dropped_documents_exits_incomplete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(AcceptAll)
        .mount(&server)
        .await;
    set_elastic_env(&server.uri());

    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("ok.json"),
        json!({ "stac_version": "1.0.0", "id": "ok", "links": [] }).to_string(),
    )
    .unwrap();
    fs::write(dir.path().join("versionless.json"), json!({ "id": "x" }).to_string()).unwrap();

    let root = dir.path().to_string_lossy().into_owned();
    let outcome = run(ingest(&root, true)).await.unwrap();

    assert_eq!(outcome.exit_code(), 2);
}

#[tokio::test]
#[serial]
async fn failed_bulk_submission_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    set_elastic_env(&server.uri());

    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("ok.json"),
        json!({ "stac_version": "1.0.0", "id": "ok" }).to_string(),
    )
    .unwrap();

    let root = dir.path().to_string_lossy().into_owned();
    assert!(run(ingest(&root, false)).await.is_err());
}

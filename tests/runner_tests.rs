use offsetlab::config::Config;
use offsetlab::es_http::EsHttp;
use offsetlab::es_ingest::Scenario;
use offsetlab::es_preflight::PreflightError;
use offsetlab::es_verify::Verdict;
use offsetlab::naming::DEFAULT_DATA_STREAM;
use offsetlab::runner::{run_reset, run_setup, run_status, run_verify, ResetReport};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIRST_INDEX: &str = ".ds-logs-filestream.generic-default-2024.03.07-000001";
const SECOND_INDEX: &str = ".ds-logs-filestream.generic-default-2024.03.07-000002";

fn test_cfg(url: String) -> Config {
    Config {
        es_url: url.into(),
        doc_pacing_ms: 0,
        rollover_settle_ms: 0,
        http_timeout_secs: 2,
        ..Config::default()
    }
}

fn ack() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({"acknowledged": true}))
}

fn stream_body(indices: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "data_streams": [{
            "name": DEFAULT_DATA_STREAM,
            "generation": indices.len(),
            "indices": indices
                .iter()
                .map(|i| serde_json::json!({ "index_name": i }))
                .collect::<Vec<_>>()
        }]
    })
}

fn mapping_body(offset_type: &str) -> serde_json::Value {
    serde_json::json!({
        "any-index": {
            "mappings": {
                "properties": {
                    "log": { "properties": { "offset": { "type": offset_type } } }
                }
            }
        }
    })
}

async fn mount_root(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "es-master-0",
            "cluster_name": "training",
            "version": { "number": "8.15.0" }
        })))
        .mount(server)
        .await;
}

/// Mocks for provision, explicit-mapping ingest and verification.
async fn mount_setup(server: &MockServer) {
    for p in [
        "/_ilm/policy/logs".to_string(),
        "/_component_template/logs@package".to_string(),
        format!("/_index_template/{DEFAULT_DATA_STREAM}"),
    ] {
        Mock::given(method("PUT"))
            .and(path(p))
            .respond_with(ack())
            .expect(1)
            .mount(server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path_regex(r"/_doc$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"result": "created"})))
        .expect(10)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/_data_stream/{DEFAULT_DATA_STREAM}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(stream_body(&[FIRST_INDEX])))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/_data_stream/{DEFAULT_DATA_STREAM}")))
        // Added backing indices are listed ahead of the write index.
        .respond_with(
            ResponseTemplate::new(200).set_body_json(stream_body(&[SECOND_INDEX, FIRST_INDEX])),
        )
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/\.ds-logs-filestream\.generic-default-.*-000002$"))
        .respond_with(ack())
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_data_stream/_modify"))
        .respond_with(ack())
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/{DEFAULT_DATA_STREAM}/_refresh")))
        .respond_with(ack())
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/{DEFAULT_DATA_STREAM}/_count")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 10})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{FIRST_INDEX}/_mapping")))
        .respond_with(ResponseTemplate::new(200).set_body_json(mapping_body("long")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{SECOND_INDEX}/_mapping")))
        .respond_with(ResponseTemplate::new(200).set_body_json(mapping_body("keyword")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{DEFAULT_DATA_STREAM}/_field_caps")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "indices": [FIRST_INDEX, SECOND_INDEX],
            "fields": {
                "log.offset": {
                    "long": { "type": "long", "indices": [FIRST_INDEX] },
                    "keyword": { "type": "keyword", "indices": [SECOND_INDEX] }
                }
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn setup_induces_and_detects_cross_index_conflict() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    mount_setup(&server).await;

    let cfg = test_cfg(server.uri());
    let http = EsHttp::from_config(&cfg).unwrap();
    let report = run_setup(&http, &cfg, Scenario::ExplicitMapping)
        .await
        .unwrap();

    assert_eq!(report.cluster.version, "8.15.0");
    assert!(report.provision.all_applied());
    assert_eq!(report.induce.docs_written, 10);
    assert_eq!(report.conflict.doc_count, 10);
    assert_eq!(report.conflict.generations(), 2);
    assert_eq!(
        report.conflict.verdict,
        Verdict::CrossIndexConflict {
            first: "long".to_string(),
            last: "keyword".to_string()
        }
    );
    assert_eq!(report.conflict.field_caps_types, vec!["keyword", "long"]);
}

#[tokio::test]
async fn unreachable_cluster_fails_before_any_mutation() {
    let cfg = test_cfg("http://127.0.0.1:1".to_string());
    let http = EsHttp::from_config(&cfg).unwrap();

    let err = run_setup(&http, &cfg, Scenario::ExplicitMapping)
        .await
        .unwrap_err();
    let preflight = err.downcast_ref::<PreflightError>().expect("preflight error");
    assert!(matches!(preflight, PreflightError::Unreachable { .. }));
    assert!(preflight.guidance().contains("ELASTICSEARCH_URL"));
}

#[tokio::test]
async fn rejected_credentials_stop_setup_after_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("security_exception"))
        .mount(&server)
        .await;

    let cfg = test_cfg(server.uri());
    let http = EsHttp::from_config(&cfg).unwrap();
    let err = run_setup(&http, &cfg, Scenario::StringOffsets)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PreflightError>(),
        Some(PreflightError::Rejected { status: 401, .. })
    ));

    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].method.as_str(), "GET");
    assert_eq!(received[0].url.path(), "/");
}

#[tokio::test]
async fn declined_reset_sends_nothing() {
    let server = MockServer::start().await;
    let cfg = test_cfg(server.uri());
    let http = EsHttp::from_config(&cfg).unwrap();

    let report = run_reset(&http, &cfg, Scenario::ExplicitMapping, false)
        .await
        .unwrap();
    assert!(matches!(report, ResetReport::Declined));
    assert!(server
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
}

#[tokio::test]
async fn confirmed_reset_tears_down_then_rebuilds() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("DELETE"))
        .and(path(format!("/_data_stream/{DEFAULT_DATA_STREAM}")))
        .respond_with(ack())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/_cat/indices/.ds-{DEFAULT_DATA_STREAM}-*")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_component_template"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "component_templates": []
        })))
        .mount(&server)
        .await;
    // Teardown recheck sees the stream gone; setup then recreates it.
    Mock::given(method("GET"))
        .and(path(format!("/_data_stream/{DEFAULT_DATA_STREAM}")))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_setup(&server).await;

    let cfg = test_cfg(server.uri());
    let http = EsHttp::from_config(&cfg).unwrap();
    let report = run_reset(&http, &cfg, Scenario::ExplicitMapping, true)
        .await
        .unwrap();

    match report {
        ResetReport::Completed { teardown, setup } => {
            assert!(teardown.is_clean());
            assert!(setup.conflict.verdict.is_conflict());
        }
        ResetReport::Declined => panic!("confirmed reset was declined"),
    }
}

#[tokio::test]
async fn verify_and_status_read_only() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/_data_stream/{DEFAULT_DATA_STREAM}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(stream_body(&[FIRST_INDEX])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{DEFAULT_DATA_STREAM}/_count")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 5})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{FIRST_INDEX}/_mapping")))
        .respond_with(ResponseTemplate::new(200).set_body_json(mapping_body("keyword")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_ilm/policy/logs"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_component_template/logs@package"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/_index_template/{DEFAULT_DATA_STREAM}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let cfg = test_cfg(server.uri());
    let http = EsHttp::from_config(&cfg).unwrap();

    let report = run_verify(&http, &cfg, Scenario::StringOffsets).await.unwrap();
    assert_eq!(
        report.verdict,
        Verdict::EcsMismatch {
            found: "keyword".to_string()
        }
    );

    let status = run_status(&http, &cfg).await.unwrap();
    assert!(!status.environment.is_provisioned());

    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.iter().all(|r| r.method.as_str() == "GET"));
}

#[tokio::test]
async fn reset_rebuilds_even_when_custom_template_is_in_use() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("DELETE"))
        .and(path(format!("/_data_stream/{DEFAULT_DATA_STREAM}")))
        .respond_with(ack())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/_cat/indices/.ds-{DEFAULT_DATA_STREAM}-*")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_component_template"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "component_templates": [{ "name": "logs@custom" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/_component_template/logs@custom"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            "component templates [logs@custom] cannot be removed as they are still in use by index templates",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/_data_stream/{DEFAULT_DATA_STREAM}")))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_setup(&server).await;

    let cfg = test_cfg(server.uri());
    let http = EsHttp::from_config(&cfg).unwrap();
    let report = run_reset(&http, &cfg, Scenario::ExplicitMapping, true)
        .await
        .unwrap();

    match report {
        ResetReport::Completed { teardown, setup } => {
            assert_eq!(teardown.failed_templates, vec!["logs@custom".to_string()]);
            assert!(!teardown.is_clean());
            assert_eq!(setup.conflict.doc_count, 10);
            assert!(setup.conflict.verdict.is_conflict());
        }
        ResetReport::Declined => panic!("confirmed reset was declined"),
    }
}

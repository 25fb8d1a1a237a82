mod common;

use common::{errors, memory_log};
use petrify_core::{DnsRecord, EdgeSettings, LogRetention};
use petrify_engine::{EdgeClient, EdgeErrorKind};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(worker_url: &str) -> EdgeSettings {
    EdgeSettings {
        worker_url: worker_url.to_string(),
        api_token: "token-123".to_string(),
    }
}

#[tokio::test]
async fn list_sends_bearer_token_and_returns_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dns/list"))
        .and(header("authorization", "Bearer token-123"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [
                {"id": "r1", "type": "A", "name": "www", "content": "192.0.2.1"},
                {"id": "r2", "type": "CNAME", "name": "blog", "content": "www"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = EdgeClient::new(settings(&server.uri()), memory_log(LogRetention::Accumulate)).unwrap();
    let records = client.list().await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], "r1");
}

#[tokio::test]
async fn trailing_slash_in_worker_url_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dns/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = EdgeClient::new(
        settings(&format!("{}/", server.uri())),
        memory_log(LogRetention::Accumulate),
    )
    .unwrap();
    assert!(client.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn add_posts_record_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dns/add"))
        .and(body_json(json!({
            "type": "A",
            "name": "www",
            "content": "192.0.2.1",
            "ttl": 3600,
            "proxied": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "id": "r9"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = EdgeClient::new(settings(&server.uri()), memory_log(LogRetention::Accumulate)).unwrap();
    let response = client.add(&DnsRecord::new("A", "www", "192.0.2.1")).await.unwrap();

    assert_eq!(response, json!({"success": true, "id": "r9"}));
}

#[tokio::test]
async fn add_with_missing_fields_is_rejected_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let log = memory_log(LogRetention::Accumulate);
    let client = EdgeClient::new(settings(&server.uri()), log.clone()).unwrap();
    let err = client.add(&DnsRecord::new("A", "", " ")).await.unwrap_err();

    assert_eq!(err.kind, EdgeErrorKind::InvalidInput);
    assert_eq!(err.message, "record name, content required");
    assert_eq!(errors(log.as_ref()).len(), 1);
}

#[tokio::test]
async fn delete_targets_record_path() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/dns/delete/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = EdgeClient::new(settings(&server.uri()), memory_log(LogRetention::Accumulate)).unwrap();
    assert_eq!(client.delete("r1").await.unwrap(), json!({"success": true}));
}

#[tokio::test]
async fn error_status_carries_decoded_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dns/add"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"errors": [{"message": "duplicate record"}]})),
        )
        .mount(&server)
        .await;

    let log = memory_log(LogRetention::Accumulate);
    let client = EdgeClient::new(settings(&server.uri()), log.clone()).unwrap();
    let err = client
        .add(&DnsRecord::new("A", "www", "192.0.2.1"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, EdgeErrorKind::Status(422));
    assert_eq!(err.message, "Worker returned error");
    assert_eq!(
        err.raw_body,
        Some(json!({"errors": [{"message": "duplicate record"}]}))
    );
    let errors = errors(log.as_ref());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("Failed to add DNS record"));
}

#[tokio::test]
async fn plain_text_error_body_is_kept_as_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dns/list"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let client = EdgeClient::new(settings(&server.uri()), memory_log(LogRetention::Accumulate)).unwrap();
    let err = client.list().await.unwrap_err();

    assert_eq!(err.kind, EdgeErrorKind::Status(401));
    assert_eq!(err.raw_body, Some(json!("Unauthorized")));
}

#[tokio::test]
async fn missing_worker_url_is_a_config_error() {
    let log = memory_log(LogRetention::Accumulate);
    let client = EdgeClient::new(settings("   "), log.clone()).unwrap();

    let err = client.list().await.unwrap_err();
    assert_eq!(err.kind, EdgeErrorKind::Config);
    assert_eq!(err.message, "Worker URL not configured");

    let err = client.delete("r1").await.unwrap_err();
    assert_eq!(err.kind, EdgeErrorKind::Config);
    assert_eq!(errors(log.as_ref()).len(), 2);
}

#[tokio::test]
async fn blank_record_id_is_rejected() {
    let client = EdgeClient::new(settings("http://127.0.0.1:9"), memory_log(LogRetention::Accumulate)).unwrap();
    let err = client.delete(" ").await.unwrap_err();
    assert_eq!(err.kind, EdgeErrorKind::InvalidInput);
}

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gpuops_client::{ClientError, JobClient};

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[tokio::test]
async fn test_pause_sends_comma_separated_ids() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/pause"))
        .and(query_param("ids", "job-1,job-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "succeeded": ["job-1"],
            "failed": ["job-2"],
            "message": "job-2 is not running"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = JobClient::new(server.uri()).unwrap();
    let resp = client.pause_jobs(&ids(&["job-1", "job-2"])).await.unwrap();

    assert_eq!(resp.succeeded, ["job-1"]);
    assert_eq!(resp.failed, ["job-2"]);
    assert!(!resp.all_succeeded());
}

#[tokio::test]
async fn test_resume() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/resume"))
        .and(query_param("ids", "job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "succeeded": ["job-9"]
        })))
        .mount(&server)
        .await;

    let client = JobClient::new(server.uri()).unwrap();
    let resp = client.resume_jobs(&ids(&["job-9"])).await.unwrap();

    assert!(resp.all_succeeded());
}

#[tokio::test]
async fn test_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/status"))
        .and(query_param("id", "job-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "job-3",
            "state": "RUNNING",
            "user": "alice",
            "vc": "nlp",
            "nodes": ["gpu-001", "gpu-002"]
        })))
        .mount(&server)
        .await;

    let client = JobClient::new(server.uri()).unwrap();
    let status = client.job_status("job-3").await.unwrap();

    assert_eq!(status.state, "RUNNING");
    assert_eq!(status.user.as_deref(), Some("alice"));
    assert_eq!(status.nodes, ["gpu-001", "gpu-002"]);
}

#[tokio::test]
async fn test_error_status_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/status"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such job"))
        .mount(&server)
        .await;

    let client = JobClient::new(server.uri()).unwrap();
    let err = client.job_status("job-404").await.unwrap_err();

    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such job");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = JobClient::new(server.uri()).unwrap();
    let err = client.job_status("job-1").await.unwrap_err();

    assert!(matches!(err, ClientError::Json(_)));
}

#[tokio::test]
async fn test_empty_id_list_makes_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = JobClient::new(server.uri()).unwrap();
    let err = client.pause_jobs(&[]).await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidRequest(_)));
}

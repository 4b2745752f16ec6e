//! HTTP client behavior against a stubbed control plane.

use chrono::Utc;
use converge_client::{ClientConfig, ClientError, ControlPlane, HttpControlPlane};
use converge_events::{
    ActualLrp, ActualLrpFilter, ActualLrpNetInfo, ActualLrpState, ErrorKind, Event, EventKind,
    ModificationTag, RunAction, Task, TaskDefinition, TaskState,
};
use converge_id::{Domain, ProcessGuid, TaskGuid};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpControlPlane {
    HttpControlPlane::new(&ClientConfig::new(server.uri())).unwrap()
}

fn sample_task(guid: &str) -> Task {
    Task {
        task_guid: TaskGuid::new(guid),
        domain: Domain::new("converge-test"),
        definition: TaskDefinition {
            root_fs: "docker:///busybox".to_string(),
            action: RunAction::shell("echo hello"),
            memory_mb: 128,
            disk_mb: 128,
            cpu_weight: 10,
            log_guid: String::new(),
            annotation: String::new(),
            completion_callback_url: None,
            privileged: false,
            result_file: String::new(),
        },
        state: TaskState::Completed,
        cell_id: None,
        failed: false,
        failure_reason: String::new(),
        result: String::new(),
        rejection_count: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        first_completed_at: Some(Utc::now()),
    }
}

fn sample_actual(index: i32) -> ActualLrp {
    ActualLrp {
        process_guid: ProcessGuid::new("pg-1"),
        index,
        domain: Domain::new("converge-test"),
        instance_guid: format!("ig-{index}"),
        cell_id: None,
        state: ActualLrpState::Running,
        crash_count: 0,
        crash_reason: String::new(),
        placement_error: String::new(),
        net_info: ActualLrpNetInfo::default(),
        since: Utc::now(),
        modification_tag: ModificationTag::new("epoch"),
    }
}

#[tokio::test]
async fn fetches_task_by_guid() {
    let server = MockServer::start().await;
    let task = sample_task("t-1");
    Mock::given(method("GET"))
        .and(path("/v1/tasks/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&task))
        .mount(&server)
        .await;

    let fetched = client_for(&server)
        .task_by_guid(&TaskGuid::new("t-1"))
        .await
        .unwrap();
    assert_eq!(fetched, task);
}

#[tokio::test]
async fn maps_typed_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/desired_lrps/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "code": "resource_not_found",
            "message": "desired LRP missing not found"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .desired_lrp_by_process_guid(&ProcessGuid::new("missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn untyped_404_is_not_absence() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .task_by_guid(&TaskGuid::new("gone"))
        .await
        .unwrap_err();
    assert!(!err.is_not_found(), "untyped 404 treated as absence: {err:?}");
    match err {
        ClientError::Api { status, kind, message, .. } => {
            assert_eq!(status, 404);
            assert_eq!(kind, ErrorKind::Unknown("unknown".to_string()));
            assert_eq!(message, "nope");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unmounted_route_is_not_absence() {
    // nothing mounted: wiremock answers every request with an empty 404
    let server = MockServer::start().await;

    let err = client_for(&server)
        .desired_lrp_by_process_guid(&ProcessGuid::new("live"))
        .await
        .unwrap_err();
    assert!(!err.is_not_found(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn maps_validation_error_with_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": "invalid_task",
            "message": "task_guid contains ' '",
            "field": "task_guid"
        })))
        .mount(&server)
        .await;

    let task = sample_task("bad guid");
    let request = converge_events::TaskRequest {
        task_guid: task.task_guid.clone(),
        domain: task.domain.clone(),
        definition: task.definition.clone(),
    };
    let err = client_for(&server).desire_task(&request).await.unwrap_err();
    match err {
        ClientError::Api {
            status,
            kind,
            field,
            ..
        } => {
            assert_eq!(status, 400);
            assert_eq!(kind, ErrorKind::InvalidTask);
            assert_eq!(field.as_deref(), Some("task_guid"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn sends_actual_lrp_filter_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/actual_lrps"))
        .and(query_param("process_guid", "pg-1"))
        .and(query_param("index", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "items": [sample_actual(1)] })),
        )
        .mount(&server)
        .await;

    let filter = ActualLrpFilter {
        index: Some(1),
        ..ActualLrpFilter::process_guid(&ProcessGuid::new("pg-1"))
    };
    let lrps = client_for(&server).actual_lrps(&filter).await.unwrap();
    assert_eq!(lrps.len(), 1);
    assert_eq!(lrps[0].index, 1);
}

#[tokio::test]
async fn streams_events_until_peer_closes() {
    let server = MockServer::start().await;
    let created = Event::ActualLrpCreated {
        actual_lrp: sample_actual(0),
    };
    let removed = Event::ActualLrpRemoved {
        actual_lrp: sample_actual(0),
    };
    let body = format!(
        ": connected\n\n{}{}",
        created.encode_frame().unwrap(),
        removed.encode_frame().unwrap()
    );
    Mock::given(method("GET"))
        .and(path("/v1/events"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let mut source = client_for(&server).subscribe_to_events().await.unwrap();
    assert_eq!(source.next().await.unwrap().kind(), EventKind::ActualLrpCreated);
    assert_eq!(source.next().await.unwrap().kind(), EventKind::ActualLrpRemoved);
    assert!(matches!(source.next().await, Err(ClientError::StreamClosed)));
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = HttpControlPlane::new(&ClientConfig::new(format!("http://127.0.0.1:{port}")))
        .unwrap();

    let err = client.ping().await.unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err:?}");
}

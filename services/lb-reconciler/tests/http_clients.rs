//! HTTP collaborator tests against a mock server.

use std::sync::Arc;
use std::time::Duration;

use corral_id::{JobId, LoadBalancerId, TaskId};
use corral_lb_reconciler::applier::BatchApplier;
use corral_lb_reconciler::batch::{Batch, BatchOutcome};
use corral_lb_reconciler::cloud::{HttpLoadBalancerClient, LoadBalancerClient};
use corral_lb_reconciler::jobs::{ControlPlaneJobOperations, JobOperations};
use corral_lb_reconciler::model::{
    Job, JobLoadBalancer, LoadBalancerTarget, TargetChange, TargetState, TaskState,
};
use corral_lb_reconciler::store::{InMemoryTargetStore, TargetStore};
use corral_lb_reconciler::{ApplyError, ClientError, JobOperationsError};
use serde_json::json;
use wiremock::matchers::{any, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn target(job_id: JobId, lb: &str, ip: &str) -> LoadBalancerTarget {
    LoadBalancerTarget::new(
        JobLoadBalancer::new(job_id, LoadBalancerId::parse(lb).unwrap()),
        TaskId::new(),
        ip.parse().unwrap(),
    )
}

#[tokio::test]
async fn test_get_job_found_and_missing() {
    let server = MockServer::start().await;
    let known = JobId::new();
    let missing = JobId::new();

    Mock::given(method("GET"))
        .and(path(format!("/v1/jobs/{known}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": known.to_string() })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/jobs/{missing}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let jobs = ControlPlaneJobOperations::new(&server.uri(), TIMEOUT).unwrap();

    assert_eq!(jobs.get_job(&known).await.unwrap(), Some(Job { id: known }));
    assert_eq!(jobs.get_job(&missing).await.unwrap(), None);
}

#[tokio::test]
async fn test_list_tasks_decodes_items() {
    let server = MockServer::start().await;
    let job_id = JobId::new();
    let task_id = TaskId::new();

    Mock::given(method("GET"))
        .and(path(format!("/v1/jobs/{job_id}/tasks")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": task_id.to_string(),
                "job_id": job_id.to_string(),
                "state": "started",
                "attributes": { "task.containerIp": "10.0.0.1" },
            }]
        })))
        .mount(&server)
        .await;

    let jobs = ControlPlaneJobOperations::new(&format!("{}/", server.uri()), TIMEOUT).unwrap();
    let tasks = jobs.list_tasks(&job_id).await.unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task_id);
    assert_eq!(tasks[0].state, TaskState::Started);
    assert_eq!(tasks[0].container_ip(), Some("10.0.0.1"));
}

#[tokio::test]
async fn test_list_tasks_errors() {
    let server = MockServer::start().await;
    let missing = JobId::new();
    let broken = JobId::new();

    Mock::given(method("GET"))
        .and(path(format!("/v1/jobs/{missing}/tasks")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/jobs/{broken}/tasks")))
        .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
        .mount(&server)
        .await;

    let jobs = ControlPlaneJobOperations::new(&server.uri(), TIMEOUT).unwrap();

    assert!(matches!(
        jobs.list_tasks(&missing).await,
        Err(JobOperationsError::JobNotFound(id)) if id == missing
    ));
    match jobs.list_tasks(&broken).await {
        Err(JobOperationsError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "database down");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_register_groups_by_load_balancer() {
    let server = MockServer::start().await;
    let job_id = JobId::new();
    let a = target(job_id, "lb-a", "10.0.0.1");
    let b = target(job_id, "lb-a", "10.0.0.2");
    let c = target(job_id, "lb-b", "10.0.0.3");

    Mock::given(method("POST"))
        .and(path("/v1/load-balancers/lb-a/targets/register"))
        .and(body_json(json!({
            "targets": [
                { "task_id": a.task_id.to_string(), "ip_address": "10.0.0.1" },
                { "task_id": b.task_id.to_string(), "ip_address": "10.0.0.2" },
            ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/load-balancers/lb-b/targets/register"))
        .and(body_json(json!({
            "targets": [{ "task_id": c.task_id.to_string(), "ip_address": "10.0.0.3" }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpLoadBalancerClient::new(&server.uri(), TIMEOUT).unwrap();
    client.register_all(&[a, b, c]).await.unwrap();
}

#[tokio::test]
async fn test_deregister_reports_rejecting_load_balancer() {
    let server = MockServer::start().await;
    let job_id = JobId::new();

    Mock::given(method("POST"))
        .and(path("/v1/load-balancers/lb-a/targets/deregister"))
        .respond_with(ResponseTemplate::new(503).set_body_string("throttled"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpLoadBalancerClient::new(&server.uri(), TIMEOUT).unwrap();
    let err = client
        .deregister_all(&[target(job_id, "lb-a", "10.0.0.1")])
        .await
        .unwrap_err();

    match err {
        ClientError::Status {
            load_balancer_id,
            status,
            body,
        } => {
            assert_eq!(load_balancer_id.as_str(), "lb-a");
            assert_eq!(status, 503);
            assert_eq!(body, "throttled");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_calls_skip_network() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = HttpLoadBalancerClient::new(&server.uri(), TIMEOUT).unwrap();
    client.register_all(&[]).await.unwrap();
    client.deregister_all(&[]).await.unwrap();
}

/// Mounts register endpoints for lb-a, lb-b and lb-c, with lb-b failing.
/// Each endpoint must be hit exactly once.
async fn mount_three_load_balancers(server: &MockServer) {
    for (lb, status) in [("lb-a", 200), ("lb-b", 500), ("lb-c", 200)] {
        Mock::given(method("POST"))
            .and(path(format!("/v1/load-balancers/{lb}/targets/register")))
            .respond_with(ResponseTemplate::new(status).set_body_string("status body"))
            .expect(1)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_rejected_load_balancer_does_not_stop_the_rest() {
    let server = MockServer::start().await;
    mount_three_load_balancers(&server).await;
    let job_id = JobId::new();

    let client = HttpLoadBalancerClient::new(&server.uri(), TIMEOUT).unwrap();
    let err = client
        .register_all(&[
            target(job_id, "lb-a", "10.0.0.1"),
            target(job_id, "lb-b", "10.0.0.2"),
            target(job_id, "lb-c", "10.0.0.3"),
        ])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Status { load_balancer_id, status: 500, .. } if load_balancer_id.as_str() == "lb-b"
    ));
}

#[tokio::test]
async fn test_applier_persists_only_accepted_load_balancers() {
    let server = MockServer::start().await;
    mount_three_load_balancers(&server).await;
    let job_id = JobId::new();
    let targets = [
        target(job_id, "lb-a", "10.0.0.1"),
        target(job_id, "lb-b", "10.0.0.2"),
        target(job_id, "lb-c", "10.0.0.3"),
    ];

    let store = Arc::new(InMemoryTargetStore::new());
    let client = Arc::new(HttpLoadBalancerClient::new(&server.uri(), TIMEOUT).unwrap());
    let applier = BatchApplier::new(client, store.clone());

    let err = applier
        .apply(&Batch::from_window(
            targets.iter().cloned().map(TargetChange::register).collect(),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.errors.len(), 1);
    assert!(matches!(
        &err.errors[0],
        ApplyError::Register { load_balancer_id, count: 1, .. } if load_balancer_id.as_str() == "lb-b"
    ));
    assert_eq!(err.applied, BatchOutcome { registered: 2, deregistered: 0 });

    // What the cloud accepted is recorded, so a later removal can find it.
    for (target, accepted) in targets.iter().zip([true, false, true]) {
        let recorded = store.list_targets(&target.association).await.unwrap();
        if accepted {
            assert_eq!(recorded, vec![(target.clone(), TargetState::Registered)]);
        } else {
            assert!(recorded.is_empty());
        }
    }
}

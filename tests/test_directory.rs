//! API directory client tests against a mock apiserver

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kpulse::errors::KpulseError;
use kpulse::kube::directory::{ApiDirectory, ClusterDirectory, PodPhase, ServiceSelector};

#[tokio::test]
async fn test_resolve_service_selector() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/dev/services/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": {"name": "api", "namespace": "dev"},
            "spec": {"selector": {"app": "api", "tier": "backend"}}
        })))
        .mount(&server)
        .await;

    let directory = ApiDirectory::with_server(&server.uri());
    let selector = directory.resolve_service("dev", "api").await.unwrap();
    assert_eq!(selector.to_label_selector(), "app=api,tier=backend");
}

#[tokio::test]
async fn test_missing_service_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/dev/services/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let directory = ApiDirectory::with_server(&server.uri());
    let result = directory.resolve_service("dev", "ghost").await;
    assert!(matches!(result, Err(KpulseError::NotFound { .. })));
}

#[tokio::test]
async fn test_forbidden_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/dev/services/api"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let directory = ApiDirectory::with_server(&server.uri());
    let result = directory.resolve_service("dev", "api").await;
    assert!(matches!(result, Err(KpulseError::Auth(_))));
}

#[tokio::test]
async fn test_list_pods_by_selector() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/dev/pods"))
        .and(query_param("labelSelector", "app=api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                {"metadata": {"name": "api-1", "namespace": "dev"},
                 "status": {"phase": "Running"}},
                {"metadata": {"name": "api-2", "namespace": "dev"},
                 "status": {"phase": "Pending"}}
            ]
        })))
        .mount(&server)
        .await;

    let directory = ApiDirectory::with_server(&server.uri());
    let selector = ServiceSelector {
        match_labels: [("app".to_string(), "api".to_string())].into_iter().collect(),
    };
    let pods = directory.list_pods("dev", &selector).await.unwrap();

    assert_eq!(pods.len(), 2);
    assert_eq!(pods[0].name, "api-1");
    assert_eq!(pods[0].phase, PodPhase::Running);
    assert!(pods[0].is_running());
    assert!(!pods[1].is_running());
}

#[tokio::test]
async fn test_apiserver_failure_listing_pods() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/dev/pods"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let directory = ApiDirectory::with_server(&server.uri());
    let result = directory.list_pods("dev", &ServiceSelector::default()).await;
    assert!(matches!(result, Err(KpulseError::TransportRead(_))));
}

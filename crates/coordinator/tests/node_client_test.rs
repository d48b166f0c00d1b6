mod support;

use sharegrid_common::config::EligibilityConfig;
use sharegrid_common::ShareGridError;
use sharegrid_coordinator::{
    ComputeNode, NodeClient, NodeExecutor, NodeRegistration, NodeRegistry, NodeStatus,
};
use sharegrid_proto::ChatMessage;
use std::sync::Arc;
use support::{dead_endpoint, fast_client_config, spawn_backend, Behavior};

fn setup(endpoint: String, credential: Option<&str>) -> (Arc<NodeRegistry>, NodeClient, ComputeNode) {
    let registry = Arc::new(NodeRegistry::new("local", EligibilityConfig::default()));
    let mut registration = NodeRegistration::new("node-1", "alice", "Alice's box", endpoint);
    if let Some(credential) = credential {
        registration = registration.with_credential(credential);
    }
    let node = registry.register(registration);
    let client = NodeClient::new(Arc::clone(&registry), fast_client_config()).unwrap();
    (registry, client, node)
}

fn prompt() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are terse."),
        ChatMessage::user("What is the capital of France?"),
    ]
}

#[tokio::test]
async fn test_execute_returns_message_content() {
    let backend = spawn_backend(Behavior::Message("Paris."), &[]).await;
    let (registry, client, node) = setup(backend.endpoint(), None);
    registry.mark_status("node-1", NodeStatus::Busy);

    let text = client.execute(&node, "llama3", &prompt()).await.unwrap();

    assert_eq!(text, "Paris.");
    assert_eq!(backend.chat_calls(), 1);
    let node = registry.get("node-1").unwrap();
    assert_eq!(node.status, NodeStatus::Online);
    assert!(node.last_response_time_ms > 0.0);
}

#[tokio::test]
async fn test_execute_falls_back_to_flat_response() {
    let backend = spawn_backend(Behavior::Flat("Paris, France."), &[]).await;
    let (_registry, client, node) = setup(backend.endpoint(), None);

    let text = client.execute(&node, "llama3", &prompt()).await.unwrap();
    assert_eq!(text, "Paris, France.");
}

#[tokio::test]
async fn test_execute_sends_non_streaming_chat_body() {
    let backend = spawn_backend(Behavior::Message("ok"), &[]).await;
    let (_registry, client, node) = setup(format!("{}/", backend.endpoint()), None);

    client.execute(&node, "mistral", &prompt()).await.unwrap();

    let body = backend.last_request().unwrap();
    assert_eq!(body["model"], "mistral");
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "What is the capital of France?");
}

#[tokio::test]
async fn test_execute_sends_bearer_credential() {
    let backend = spawn_backend(Behavior::Message("ok"), &[]).await;
    let (_registry, client, node) = setup(backend.endpoint(), Some("s3cret"));

    client.execute(&node, "llama3", &prompt()).await.unwrap();
    assert_eq!(backend.last_auth().as_deref(), Some("Bearer s3cret"));
}

#[tokio::test]
async fn test_execute_without_credential_sends_no_auth() {
    let backend = spawn_backend(Behavior::Message("ok"), &[]).await;
    let (_registry, client, node) = setup(backend.endpoint(), None);

    client.execute(&node, "llama3", &prompt()).await.unwrap();
    assert_eq!(backend.last_auth(), None);
}

#[tokio::test]
async fn test_error_status_marks_node_error_without_retry() {
    let backend = spawn_backend(Behavior::Status(500), &[]).await;
    let (registry, client, node) = setup(backend.endpoint(), None);

    let err = client.execute(&node, "llama3", &prompt()).await.unwrap_err();

    match err {
        ShareGridError::NodeProtocol {
            node_id, status, ..
        } => {
            assert_eq!(node_id, "node-1");
            assert_eq!(status, Some(500));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.chat_calls(), 1);
    assert_eq!(registry.get("node-1").unwrap().status, NodeStatus::Error);
}

#[tokio::test]
async fn test_malformed_body_is_protocol_error() {
    let backend = spawn_backend(Behavior::Garbage, &[]).await;
    let (registry, client, node) = setup(backend.endpoint(), None);

    let err = client.execute(&node, "llama3", &prompt()).await.unwrap_err();

    assert!(matches!(err, ShareGridError::NodeProtocol { .. }));
    assert_eq!(backend.chat_calls(), 1);
    assert_eq!(registry.get("node-1").unwrap().status, NodeStatus::Error);
}

#[tokio::test]
async fn test_connection_refused_is_retried_then_busy() {
    let (registry, client, node) = setup(dead_endpoint().await, None);
    let seen_before = registry.get("node-1").unwrap().last_seen;

    let err = client.execute(&node, "llama3", &prompt()).await.unwrap_err();

    assert!(matches!(err, ShareGridError::NodeConnection { .. }));
    assert!(err.is_transient());
    let node = registry.get("node-1").unwrap();
    assert_eq!(node.status, NodeStatus::Busy);
    // Failures never count as a heartbeat
    assert_eq!(node.last_seen, seen_before);
}

#[tokio::test]
async fn test_timeout_uses_all_attempts_then_busy() {
    let backend = spawn_backend(Behavior::Slow(2_000, "too late"), &[]).await;
    let (registry, client, node) = setup(backend.endpoint(), None);

    let err = client.execute(&node, "llama3", &prompt()).await.unwrap_err();

    assert!(matches!(err, ShareGridError::NodeTimeout { .. }));
    // One initial attempt plus max_retries
    assert_eq!(backend.chat_calls(), 3);
    assert_eq!(registry.get("node-1").unwrap().status, NodeStatus::Busy);
}

#[tokio::test]
async fn test_probe_reports_models() {
    let backend = spawn_backend(Behavior::Message("ok"), &["llama3:8b", "mistral"]).await;
    let (_registry, client, node) = setup(backend.endpoint(), None);

    let report = client.probe(&node).await.unwrap();

    assert_eq!(report.models, vec!["llama3:8b", "mistral"]);
    assert!(report.latency_ms >= 0.0);
}

#[tokio::test]
async fn test_probe_unreachable_node_fails() {
    let (_registry, client, node) = setup(dead_endpoint().await, None);
    let err = client.probe(&node).await.unwrap_err();
    assert!(err.is_transient());
}

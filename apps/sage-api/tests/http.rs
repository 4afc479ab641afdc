use std::sync::Arc;

use axum::{
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::json;
use tower::util::ServiceExt;

use sage_api::{routes, state::AppState};
use sage_testkit::{MemRegistry, RecordingTool, ScriptedCompletion, ScriptedIndex};

fn test_state() -> AppState {
	let service = sage_testkit::service(
		Arc::new(MemRegistry::new()),
		Arc::new(ScriptedIndex::new()),
		sage_testkit::providers(
			Arc::new(ScriptedCompletion::new()),
			Arc::new(RecordingTool::new()),
		),
	);

	AppState::with_service(Arc::new(service))
}

#[tokio::test]
async fn health_ok() {
	let app = routes::router(test_state());
	let response = app
		.oneshot(
			Request::builder()
				.uri("/health")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn chat_always_answers_even_when_everything_is_down() {
	let app = routes::router(test_state());
	let payload = json!({ "message": "如何重置密码？", "session_id": "sess_1" });
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/chat")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /v1/chat.");

	assert_eq!(response.status(), StatusCode::OK);

	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let body: serde_json::Value =
		serde_json::from_slice(&bytes).expect("Failed to parse response.");

	assert_eq!(body["meta"]["action_type"], "FALLBACK");
	assert_eq!(body["meta"]["selected_resource_id"], serde_json::Value::Null);
	assert!(!body["answer"].as_str().unwrap_or_default().is_empty());
	assert_eq!(body["candidates_count"], 0);
}

#[tokio::test]
async fn executing_an_unknown_workflow_is_a_404() {
	let app = routes::router(test_state());
	let payload = json!({ "workflow_id": "wf_ghost", "inputs": {} });
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/workflows/execute")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /v1/workflows/execute.");

	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let body: serde_json::Value =
		serde_json::from_slice(&bytes).expect("Failed to parse response.");

	assert_eq!(body["error_code"], "not_found");
}

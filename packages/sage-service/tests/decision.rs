use std::sync::Arc;

use serde_json::json;
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};

use sage_domain::{ActionType, Candidate, ResourceKind, ScoreBreakdown};
use sage_service::{RequestContext, SageService, plan::default_plan};
use sage_testkit::{MemRegistry, RecordingTool, ScriptedCompletion, ScriptedIndex};

fn build_service(completion: Arc<ScriptedCompletion>) -> SageService {
	sage_testkit::service(
		Arc::new(MemRegistry::new()),
		Arc::new(ScriptedIndex::new()),
		sage_testkit::providers(completion, Arc::new(RecordingTool::new())),
	)
}

fn candidate(id: &str, kind: ResourceKind, total: f32) -> Candidate {
	Candidate {
		resource_id: id.to_string(),
		resource_type: kind,
		title: id.to_string(),
		snippet: "snippet".to_string(),
		scores: ScoreBreakdown { total, ..Default::default() },
		metadata: json!({}),
	}
}

fn fresh_result_candidate(id: &str, total: f32, hours_ahead: i64) -> Candidate {
	let fresh_until = (OffsetDateTime::now_utc() + Duration::hours(hours_ahead))
		.format(&Rfc3339)
		.expect("format failed");
	let mut cand = candidate(id, ResourceKind::Result, total);

	cand.metadata = json!({ "fresh_until": fresh_until });

	cand
}

#[tokio::test]
async fn fresh_result_short_circuits_without_model_call() {
	let completion = Arc::new(ScriptedCompletion::new());
	let service = build_service(completion.clone());
	let pool = vec![
		candidate("res_doc", ResourceKind::Doc, 0.4),
		fresh_result_candidate("res_cached", 0.75, 4),
	];
	let plan = default_plan("question");
	let action = service.decide("question", &plan, &pool, &RequestContext::default()).await;

	assert_eq!(action.action_type, ActionType::ReturnResult);
	assert_eq!(action.selected.resource_id.as_deref(), Some("res_cached"));
	assert_eq!(action.selected.resource_type, Some(ResourceKind::Result));
	assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn high_confidence_doc_short_circuits_without_model_call() {
	let completion = Arc::new(ScriptedCompletion::new());
	let service = build_service(completion.clone());
	let pool = vec![
		candidate("res_doc", ResourceKind::Doc, 0.82),
		fresh_result_candidate("res_cached", 0.3, 4),
	];
	let plan = default_plan("question");
	let action = service.decide("question", &plan, &pool, &RequestContext::default()).await;

	assert_eq!(action.selected.resource_id.as_deref(), Some("res_doc"));
	assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn hallucinated_resource_id_is_rejected_and_falls_back_to_top_score() {
	let completion = Arc::new(ScriptedCompletion::new());
	let hallucinated = json!({
		"action_type": "RETURN_RESULT",
		"selected": { "resource_id": "res_ghost", "resource_type": "DOC", "confidence": 0.99 },
		"reason": { "why_best_fit": ["made up"], "tradeoffs": [] },
		"execution": { "required": false, "executor_resource_id": null, "input": {}, "idempotency_key": null },
		"clarify": { "required": false, "questions": [] }
	});

	completion.push_json(&hallucinated);
	completion.push_json(&hallucinated);

	let service = build_service(completion.clone());
	let pool = vec![
		candidate("res_low", ResourceKind::Doc, 0.2),
		candidate("res_high", ResourceKind::Workflow, 0.6),
	];
	let plan = default_plan("question");
	let action = service.decide("question", &plan, &pool, &RequestContext::default()).await;

	assert_eq!(completion.calls(), 2);
	assert_eq!(action.action_type, ActionType::ReturnResult);
	assert_eq!(action.selected.resource_id.as_deref(), Some("res_high"));
}

#[tokio::test]
async fn empty_pool_falls_back_with_null_selection() {
	let completion = Arc::new(ScriptedCompletion::new());
	let service = build_service(completion.clone());
	let plan = default_plan("question");
	let action = service.decide("question", &plan, &[], &RequestContext::default()).await;

	assert_eq!(action.action_type, ActionType::Fallback);
	assert_eq!(action.selected.resource_id, None);
	assert!(!action.execution.required);
	// The model path still runs (and fails over) for an empty pool.
	assert_eq!(completion.calls(), 2);
}

#[tokio::test]
async fn valid_execute_action_passes_validation() {
	let completion = Arc::new(ScriptedCompletion::new());

	completion.push_json(&json!({
		"action_type": "EXECUTE_WORKFLOW",
		"selected": { "resource_id": "res_wf", "resource_type": "WORKFLOW", "confidence": 0.8 },
		"reason": { "why_best_fit": ["matches the request"], "tradeoffs": [] },
		"execution": {
			"required": true,
			"executor_resource_id": "res_wf",
			"input": { "city": "Berlin" },
			"idempotency_key": null
		},
		"clarify": { "required": false, "questions": [] }
	}));

	let service = build_service(completion.clone());
	let pool = vec![candidate("res_wf", ResourceKind::Workflow, 0.6)];
	let plan = default_plan("generate the report");
	let action = service
		.decide("generate the report", &plan, &pool, &RequestContext::default())
		.await;

	assert_eq!(completion.calls(), 1);
	assert_eq!(action.action_type, ActionType::ExecuteWorkflow);
	assert_eq!(action.execution.executor_resource_id.as_deref(), Some("res_wf"));
	assert_eq!(action.execution.input["city"], "Berlin");
}

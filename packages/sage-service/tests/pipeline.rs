use std::sync::Arc;

use serde_json::json;

use sage_domain::{ActionType, candidate::ResourceKind};
use sage_service::{ChatRequest, SageService};
use sage_testkit::{
	IndexEntry, MemRegistry, RecordingTool, ScriptedCompletion, ScriptedIndex,
};

fn chat_request(message: &str) -> ChatRequest {
	ChatRequest {
		message: message.to_string(),
		conversation_context: None,
		session_id: Some("sess_1".to_string()),
		tenant_id: None,
		user_id: Some("u1".to_string()),
		entity_ids: Vec::new(),
	}
}

fn build_service(
	registry: Arc<MemRegistry>,
	index: Arc<ScriptedIndex>,
	completion: Arc<ScriptedCompletion>,
	tool: Arc<RecordingTool>,
) -> SageService {
	sage_testkit::service(registry, index, sage_testkit::providers(completion, tool))
}

#[tokio::test]
async fn unanswerable_question_falls_back_without_fabricated_citations() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());
	let completion = Arc::new(ScriptedCompletion::new());
	let service =
		build_service(registry, index, completion.clone(), Arc::new(RecordingTool::new()));
	let response = service.process(chat_request("如何重置密码？")).await;

	assert!(response.trace_id.starts_with("trace_"));
	assert_eq!(response.meta.action_type, ActionType::Fallback);
	assert_eq!(response.meta.selected_resource_id, None);
	assert_eq!(response.meta.run_id, None);
	assert!(response.meta.citations.is_empty());
	assert_eq!(response.candidates_count, 0);
	assert!(!response.answer.trim().is_empty());
	assert!(!response.answer.contains("doc://"));
	assert!(!response.answer.contains("result://"));
	assert!(!response.answer.contains("workflow://"));
	// Planner (2 attempts) + decider (2 attempts); the answerer is never
	// consulted for an ungrounded fallback.
	assert_eq!(completion.calls(), 4);
}

#[tokio::test]
async fn high_confidence_doc_answers_with_citation_and_skips_the_decider() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());
	let completion = Arc::new(ScriptedCompletion::new());

	registry.insert_resource(sage_testkit::resource(
		"res_doc_pw",
		ResourceKind::Doc,
		"Password manual",
	));

	let mut entry =
		IndexEntry::new("res_doc_pw", ResourceKind::Doc, 0.9, "How to reset your password");

	entry.chunk_id = Some("chunk_1".to_string());
	index.push(entry);

	completion.push_json(&json!({
		"intent": { "name": "KNOWLEDGE_QA", "confidence": 0.9, "entities": [] },
		"search_plan": [{ "target": "DOC", "query": "reset password", "top_k": 5 }],
		"decision_goal": { "primary": "best_fit" },
		"constraints": {}
	}));
	completion.push_ok("Open the settings page and follow the reset flow (doc://res_doc_pw#chunk).");

	let service =
		build_service(registry, index, completion.clone(), Arc::new(RecordingTool::new()));
	let response = service.process(chat_request("how do I reset my password?")).await;

	// Planner + answerer only; the hard rule bypassed the decision model.
	assert_eq!(completion.calls(), 2);
	assert_eq!(response.meta.action_type, ActionType::ReturnResult);
	assert_eq!(response.meta.selected_resource_id.as_deref(), Some("res_doc_pw"));
	assert_eq!(response.meta.citations.len(), 1);
	assert_eq!(response.meta.citations[0].source, "doc://res_doc_pw#chunk");
	assert!(response.answer.contains("doc://res_doc_pw#chunk"));
	assert_eq!(response.candidates_count, 1);
}

#[tokio::test]
async fn clarify_action_surfaces_the_questions_without_an_answer_model_call() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());
	let completion = Arc::new(ScriptedCompletion::new());

	completion.push_json(&json!({
		"intent": { "name": "KNOWLEDGE_QA", "confidence": 0.4, "entities": [] },
		"search_plan": [{ "target": "DOC", "query": "reset", "top_k": 5 }],
		"decision_goal": { "primary": "best_fit" },
		"constraints": {}
	}));
	completion.push_json(&json!({
		"action_type": "ASK_CLARIFY",
		"selected": { "resource_id": null, "resource_type": null, "confidence": 0.2 },
		"reason": { "why_best_fit": [], "tradeoffs": ["ambiguous request"] },
		"execution": { "required": false, "executor_resource_id": null, "input": {}, "idempotency_key": null },
		"clarify": { "required": true, "questions": ["Which account do you mean?"] }
	}));

	let service =
		build_service(registry, index, completion.clone(), Arc::new(RecordingTool::new()));
	let response = service.process(chat_request("reset it")).await;

	// Planner + decider only; the clarification answer is deterministic.
	assert_eq!(completion.calls(), 2);
	assert_eq!(response.meta.action_type, ActionType::AskClarify);
	assert_eq!(response.meta.selected_resource_id, None);
	assert!(response.answer.contains("Which account do you mean?"));
	assert!(response.meta.citations.is_empty());
}

#[tokio::test]
async fn execute_workflow_path_runs_the_workflow_and_cites_the_run() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());
	let completion = Arc::new(ScriptedCompletion::new());
	let tool = Arc::new(RecordingTool::new());
	let mut resource = sage_testkit::resource(
		"res_wf_report",
		ResourceKind::Workflow,
		"Generate report workflow",
	);

	resource.capabilities = vec!["report-generation".to_string()];
	registry.insert_resource(resource);
	registry.insert_workflow(sage_testkit::workflow_def(
		"wf_report",
		"res_wf_report",
		json!([{
			"type": "TOOL",
			"tool_id": "report",
			"args_template": { "city": "{{inputs.city}}" }
		}]),
	));
	index.push(IndexEntry::new("res_wf_report", ResourceKind::Workflow, 0.5, ""));

	completion.push_json(&json!({
		"intent": { "name": "EXECUTE_TASK", "confidence": 0.9, "entities": [] },
		"search_plan": [{ "target": "WORKFLOW", "query": "generate report", "top_k": 5 }],
		"decision_goal": { "primary": "best_fit" },
		"constraints": {}
	}));
	completion.push_json(&json!({
		"action_type": "EXECUTE_WORKFLOW",
		"selected": { "resource_id": "res_wf_report", "resource_type": "WORKFLOW", "confidence": 0.8 },
		"reason": { "why_best_fit": ["executable workflow matches"], "tradeoffs": [] },
		"execution": {
			"required": true,
			"executor_resource_id": "res_wf_report",
			"input": { "city": "Berlin" },
			"idempotency_key": null
		},
		"clarify": { "required": false, "questions": [] }
	}));
	completion.push_ok("The report has been generated.");

	let service = build_service(registry.clone(), index, completion.clone(), tool.clone());
	let response = service.process(chat_request("generate the usage report for Berlin")).await;

	assert_eq!(completion.calls(), 3);
	assert_eq!(response.meta.action_type, ActionType::ExecuteWorkflow);
	assert_eq!(tool.calls(), 1);

	let run_id = response.meta.run_id.clone().expect("run_id missing");

	assert_eq!(registry.runs().len(), 1);
	assert_eq!(registry.runs()[0].status, "success");
	assert_eq!(registry.results().len(), 1);
	assert_eq!(response.meta.citations.len(), 2);
	assert_eq!(response.meta.citations[0].source, "workflow://res_wf_report");
	assert_eq!(response.meta.citations[1].source, format!("result://{run_id}"));
	// The model text had no citations, so a references section was appended.
	assert!(response.answer.contains("## References"));
	assert!(response.answer.contains("workflow://res_wf_report"));
}

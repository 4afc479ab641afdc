use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::warn;

use sage_domain::{ActionType, Candidate, ResourceKind};

use crate::{RequestContext, SageService, SearchPlan};

const ACTION_CORRECTION: &str =
	"Your previous output did not match the schema, or selected.resource_id was not one of the \
	 supplied candidates. Output strict JSON with action_type, selected, reason, execution, and \
	 clarify, and only reference candidate resource ids.";

/// The single decision output: what to do with the retrieved candidates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
	pub action_type: ActionType,
	pub selected: Selection,
	pub reason: Reason,
	pub execution: ExecutionPlan,
	pub clarify: Clarify,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Selection {
	pub resource_id: Option<String>,
	pub resource_type: Option<ResourceKind>,
	#[serde(default)]
	pub confidence: f32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Reason {
	#[serde(default)]
	pub why_best_fit: Vec<String>,
	#[serde(default)]
	pub tradeoffs: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionPlan {
	#[serde(default)]
	pub required: bool,
	#[serde(default)]
	pub executor_resource_id: Option<String>,
	#[serde(default = "default_input")]
	pub input: Value,
	#[serde(default)]
	pub idempotency_key: Option<String>,
}
impl Default for ExecutionPlan {
	fn default() -> Self {
		Self {
			required: false,
			executor_resource_id: None,
			input: default_input(),
			idempotency_key: None,
		}
	}
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Clarify {
	#[serde(default)]
	pub required: bool,
	#[serde(default)]
	pub questions: Vec<String>,
}

impl SageService {
	/// Two-tier decision policy: deterministic hard rules first, then the
	/// decision model with schema validation and a score-based fallback.
	/// Never fails; always returns a structurally valid action.
	pub async fn decide(
		&self,
		message: &str,
		plan: &SearchPlan,
		candidates: &[Candidate],
		_ctx: &RequestContext,
	) -> Action {
		// Sort up front so "first match" in the hard rules means
		// "highest-scoring match" regardless of caller ordering.
		let mut ranked = candidates.to_vec();

		ranked.sort_by(|a, b| {
			b.scores.total.partial_cmp(&a.scores.total).unwrap_or(Ordering::Equal)
		});

		let now = OffsetDateTime::now_utc();

		if let Some(action) = apply_hard_rules(
			&ranked,
			self.cfg.decision.result_return_threshold,
			self.cfg.decision.doc_return_threshold,
			now,
		) {
			return action;
		}

		self.model_decide(message, plan, &ranked).await
	}

	async fn model_decide(
		&self,
		message: &str,
		plan: &SearchPlan,
		candidates: &[Candidate],
	) -> Action {
		let mut corrective: Option<&str> = None;
		let max_attempts = self.cfg.decision.max_attempts.max(1);

		for attempt in 1..=max_attempts {
			let messages = build_decider_messages(message, plan, candidates, corrective);
			let raw = match self
				.providers
				.completion
				.complete(&self.cfg.providers.decider, &messages, true)
				.await
			{
				Ok(raw) => raw,
				Err(err) => {
					warn!(error = %err, attempt, "Decider call failed.");

					continue;
				},
			};

			match serde_json::from_str::<Value>(&raw) {
				Ok(value) => match parse_action(&value, candidates) {
					Some(action) => return action,
					None => {
						warn!(attempt, "Decider output failed validation.");

						corrective = Some(ACTION_CORRECTION);
					},
				},
				Err(err) => {
					warn!(error = %err, attempt, "Decider output is not valid JSON.");

					corrective = Some(ACTION_CORRECTION);
				},
			}
		}

		fallback_decision(candidates)
	}
}

/// Deterministic pre-model shortcuts: a fresh high-scoring cached result, then
/// a high-scoring document. Candidates are expected pre-sorted by total.
fn apply_hard_rules(
	candidates: &[Candidate],
	result_threshold: f32,
	doc_threshold: f32,
	now: OffsetDateTime,
) -> Option<Action> {
	for candidate in candidates {
		if candidate.resource_type != ResourceKind::Result {
			continue;
		}
		if candidate.scores.total < result_threshold {
			continue;
		}
		if let Some(fresh_until) = candidate.fresh_until()
			&& fresh_until > now
		{
			return Some(return_result_action(
				candidate,
				vec![
					"A fresh cached result already covers the request.".to_string(),
					format!("Score {:.2}.", candidate.scores.total),
				],
			));
		}
	}

	for candidate in candidates {
		if candidate.resource_type == ResourceKind::Doc
			&& candidate.scores.total >= doc_threshold
		{
			return Some(return_result_action(
				candidate,
				vec![
					"A document matches with high confidence.".to_string(),
					format!("Score {:.2}.", candidate.scores.total),
				],
			));
		}
	}

	None
}

/// Validates raw decider output. The resource-id check is the injection
/// guard: the model may only reference candidates it was shown.
fn parse_action(raw: &Value, candidates: &[Candidate]) -> Option<Action> {
	let object = raw.as_object()?;

	for field in ["action_type", "selected", "reason", "execution", "clarify"] {
		if !object.contains_key(field) {
			return None;
		}
	}

	let action: Action = serde_json::from_value(raw.clone()).ok()?;
	let known_id = |id: &String| candidates.iter().any(|cand| &cand.resource_id == id);

	if let Some(selected_id) = action.selected.resource_id.as_ref()
		&& !known_id(selected_id)
	{
		return None;
	}
	if action.action_type == ActionType::ExecuteWorkflow {
		if !action.execution.required {
			return None;
		}

		let executor = action.execution.executor_resource_id.as_ref()?;

		if !known_id(executor) {
			return None;
		}
	}

	Some(action)
}

/// Deterministic degraded decision: highest total wins, or FALLBACK with an
/// empty selection when there is nothing to pick from.
fn fallback_decision(candidates: &[Candidate]) -> Action {
	let mut best: Option<&Candidate> = None;

	for candidate in candidates {
		if best.map(|current| candidate.scores.total > current.scores.total).unwrap_or(true) {
			best = Some(candidate);
		}
	}

	match best {
		Some(candidate) => return_result_action(
			candidate,
			vec!["Highest aggregate score among retrieved candidates.".to_string()],
		),
		None => Action {
			action_type: ActionType::Fallback,
			selected: Selection { resource_id: None, resource_type: None, confidence: 0.0 },
			reason: Reason {
				why_best_fit: vec!["No candidates were retrieved.".to_string()],
				tradeoffs: Vec::new(),
			},
			execution: ExecutionPlan::default(),
			clarify: Clarify::default(),
		},
	}
}

fn return_result_action(candidate: &Candidate, why_best_fit: Vec<String>) -> Action {
	Action {
		action_type: ActionType::ReturnResult,
		selected: Selection {
			resource_id: Some(candidate.resource_id.clone()),
			resource_type: Some(candidate.resource_type),
			confidence: candidate.scores.total,
		},
		reason: Reason { why_best_fit, tradeoffs: Vec::new() },
		execution: ExecutionPlan::default(),
		clarify: Clarify::default(),
	}
}

fn build_decider_messages(
	message: &str,
	plan: &SearchPlan,
	candidates: &[Candidate],
	corrective: Option<&str>,
) -> Vec<Value> {
	let schema = serde_json::json!({
		"action_type": "RETURN_RESULT | EXECUTE_WORKFLOW | ASK_CLARIFY | FALLBACK",
		"selected": { "resource_id": "string | null", "resource_type": "string | null", "confidence": 0.0 },
		"reason": { "why_best_fit": ["string"], "tradeoffs": ["string"] },
		"execution": {
			"required": false,
			"executor_resource_id": "string | null",
			"input": {},
			"idempotency_key": "string | null"
		},
		"clarify": { "required": false, "questions": ["string"] }
	});
	let schema_text =
		serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string());
	let system_prompt = format!(
		"You decide how a question answering system should act on retrieved candidates. Output \
		 strict JSON matching this exact schema:\n{schema_text}\nselected.resource_id must be \
		 null or the id of a supplied candidate. Never invent resource ids."
	);
	let plan_text = serde_json::to_string_pretty(plan).unwrap_or_default();
	let candidates_text = serde_json::to_string_pretty(candidates).unwrap_or_default();
	let mut user_prompt = format!(
		"User message: {message}\n\nRetrieval plan:\n{plan_text}\n\nCandidates:\n\
		 {candidates_text}\n\nOutput the decision (strict JSON)."
	);

	if let Some(corrective) = corrective {
		user_prompt.push_str("\n\n");
		user_prompt.push_str(corrective);
	}

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}

fn default_input() -> Value {
	Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use time::Duration;

	use sage_domain::ScoreBreakdown;

	use super::*;

	fn candidate(id: &str, kind: ResourceKind, total: f32, metadata: Value) -> Candidate {
		Candidate {
			resource_id: id.to_string(),
			resource_type: kind,
			title: id.to_string(),
			snippet: String::new(),
			scores: ScoreBreakdown { total, ..Default::default() },
			metadata,
		}
	}

	#[test]
	fn hard_rule_returns_fresh_result_over_doc() {
		let now = OffsetDateTime::now_utc();
		let fresh_until = crate::retrieve::rfc3339(now + Duration::hours(2));
		let pool = vec![
			candidate("doc_1", ResourceKind::Doc, 0.9, json!({})),
			candidate("res_1", ResourceKind::Result, 0.75, json!({ "fresh_until": fresh_until })),
		];
		let action = apply_hard_rules(&pool, 0.7, 0.7, now).expect("rule should fire");

		assert_eq!(action.action_type, ActionType::ReturnResult);
		assert_eq!(action.selected.resource_id.as_deref(), Some("res_1"));
	}

	#[test]
	fn hard_rule_skips_stale_result_but_takes_strong_doc() {
		let now = OffsetDateTime::now_utc();
		let stale = crate::retrieve::rfc3339(now - Duration::hours(1));
		let pool = vec![
			candidate("res_1", ResourceKind::Result, 0.9, json!({ "fresh_until": stale })),
			candidate("doc_1", ResourceKind::Doc, 0.8, json!({})),
		];
		let action = apply_hard_rules(&pool, 0.7, 0.7, now).expect("doc rule should fire");

		assert_eq!(action.selected.resource_id.as_deref(), Some("doc_1"));
	}

	#[test]
	fn hard_rules_stay_quiet_below_threshold() {
		let now = OffsetDateTime::now_utc();
		let pool = vec![
			candidate("doc_1", ResourceKind::Doc, 0.69, json!({})),
			candidate("wf_1", ResourceKind::Workflow, 0.95, json!({})),
		];

		assert!(apply_hard_rules(&pool, 0.7, 0.7, now).is_none());
	}

	#[test]
	fn parse_action_rejects_unknown_resource_id() {
		let pool = vec![candidate("res_a", ResourceKind::Doc, 0.4, json!({}))];
		let raw = json!({
			"action_type": "RETURN_RESULT",
			"selected": { "resource_id": "res_ghost", "resource_type": "DOC", "confidence": 0.9 },
			"reason": { "why_best_fit": [], "tradeoffs": [] },
			"execution": { "required": false, "executor_resource_id": null, "input": {}, "idempotency_key": null },
			"clarify": { "required": false, "questions": [] }
		});

		assert!(parse_action(&raw, &pool).is_none());
	}

	#[test]
	fn parse_action_requires_known_executor_for_execute() {
		let pool = vec![candidate("wf_1", ResourceKind::Workflow, 0.5, json!({}))];
		let mut raw = json!({
			"action_type": "EXECUTE_WORKFLOW",
			"selected": { "resource_id": "wf_1", "resource_type": "WORKFLOW", "confidence": 0.8 },
			"reason": { "why_best_fit": [], "tradeoffs": [] },
			"execution": { "required": true, "executor_resource_id": "wf_1", "input": {}, "idempotency_key": null },
			"clarify": { "required": false, "questions": [] }
		});

		assert!(parse_action(&raw, &pool).is_some());

		raw["execution"]["executor_resource_id"] = json!("wf_ghost");

		assert!(parse_action(&raw, &pool).is_none());

		raw["execution"]["executor_resource_id"] = json!("wf_1");
		raw["execution"]["required"] = json!(false);

		assert!(parse_action(&raw, &pool).is_none());
	}

	#[test]
	fn fallback_picks_highest_total_or_empty_fallback() {
		let pool = vec![
			candidate("a", ResourceKind::Doc, 0.2, json!({})),
			candidate("b", ResourceKind::Workflow, 0.6, json!({})),
		];
		let action = fallback_decision(&pool);

		assert_eq!(action.action_type, ActionType::ReturnResult);
		assert_eq!(action.selected.resource_id.as_deref(), Some("b"));

		let empty = fallback_decision(&[]);

		assert_eq!(empty.action_type, ActionType::Fallback);
		assert_eq!(empty.selected.resource_id, None);
	}
}

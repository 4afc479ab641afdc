use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use sage_domain::candidate::ResourceKind;

use crate::SageService;

const SCHEMA_CORRECTION: &str =
	"Your previous output did not match the schema. Output strict JSON with all required \
	 top-level fields: intent, search_plan, decision_goal, constraints. search_plan must be a \
	 non-empty array.";
const PARSE_CORRECTION: &str =
	"Your previous output was not valid JSON. Output a single strict JSON object and nothing \
	 else.";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchPlan {
	pub intent: IntentGuess,
	pub search_plan: Vec<PlanStep>,
	pub decision_goal: DecisionGoal,
	pub constraints: OutputConstraints,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntentGuess {
	pub name: String,
	#[serde(default)]
	pub confidence: f32,
	#[serde(default)]
	pub entities: Vec<Value>,
}

/// One retrieval instruction: exactly one retriever call per entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanStep {
	pub target: ResourceKind,
	pub query: String,
	#[serde(default)]
	pub filters: PlanFilters,
	#[serde(default = "default_step_top_k")]
	pub top_k: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlanFilters {
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub resource_status: Vec<String>,
	#[serde(default)]
	pub freshness_required: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionGoal {
	pub primary: String,
	#[serde(default)]
	pub ranking_rules: Vec<String>,
	#[serde(default)]
	pub must_return_single: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConstraints {
	#[serde(default = "default_true")]
	pub need_citations: bool,
	#[serde(default = "default_true")]
	pub no_fabrication: bool,
	#[serde(default)]
	pub output_format: OutputFormat,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
	Text,
	#[default]
	Steps,
	Json,
	Table,
}
impl OutputFormat {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Text => "text",
			Self::Steps => "steps",
			Self::Json => "json",
			Self::Table => "table",
		}
	}
}

#[derive(Clone, Debug)]
pub struct PlanRequest {
	pub message: String,
	pub conversation_context: Option<Value>,
	pub available_targets: Vec<ResourceKind>,
}

impl SageService {
	/// Turns a raw user message into a search plan. Never fails: after the
	/// configured attempts against the planner model, the deterministic
	/// default plan takes over so the pipeline cannot stall on a bad
	/// classifier.
	pub async fn plan(&self, req: &PlanRequest) -> SearchPlan {
		let mut corrective: Option<&str> = None;
		let max_attempts = self.cfg.planning.max_attempts.max(1);

		for attempt in 1..=max_attempts {
			let messages = build_planner_messages(req, corrective);
			let raw = match self
				.providers
				.completion
				.complete(&self.cfg.providers.planner, &messages, true)
				.await
			{
				Ok(raw) => raw,
				Err(err) => {
					warn!(error = %err, attempt, "Planner call failed.");

					continue;
				},
			};

			match serde_json::from_str::<Value>(&raw) {
				Ok(value) => match parse_plan(&value) {
					Some(plan) => return plan,
					None => {
						warn!(attempt, "Planner output failed schema validation.");

						corrective = Some(SCHEMA_CORRECTION);
					},
				},
				Err(err) => {
					warn!(error = %err, attempt, "Planner output is not valid JSON.");

					corrective = Some(PARSE_CORRECTION);
				},
			}
		}

		default_plan(&req.message)
	}
}

/// Structural validation of raw planner output. Entries with an unknown
/// target are dropped; a plan left without entries is invalid.
pub fn parse_plan(raw: &Value) -> Option<SearchPlan> {
	let object = raw.as_object()?;

	for field in ["intent", "search_plan", "decision_goal", "constraints"] {
		if !object.contains_key(field) {
			return None;
		}
	}

	let intent: IntentGuess = serde_json::from_value(object.get("intent")?.clone()).ok()?;

	if intent.name.trim().is_empty() {
		return None;
	}

	let entries = object.get("search_plan")?.as_array()?;
	let steps: Vec<PlanStep> = entries
		.iter()
		.filter_map(|entry| serde_json::from_value(entry.clone()).ok())
		.filter(|step: &PlanStep| step.top_k > 0 && !step.query.trim().is_empty())
		.collect();

	if steps.is_empty() {
		return None;
	}

	let decision_goal: DecisionGoal =
		serde_json::from_value(object.get("decision_goal")?.clone()).ok()?;
	let constraints: OutputConstraints =
		serde_json::from_value(object.get("constraints")?.clone()).ok()?;

	Some(SearchPlan { intent, search_plan: steps, decision_goal, constraints })
}

/// Deterministic degraded plan: broad DOC + RESULT lookup with the raw
/// message as query.
pub fn default_plan(message: &str) -> SearchPlan {
	let filters = PlanFilters {
		tags: Vec::new(),
		resource_status: vec!["active".to_string()],
		freshness_required: false,
	};

	SearchPlan {
		intent: IntentGuess { name: "OTHER".to_string(), confidence: 0.5, entities: Vec::new() },
		search_plan: vec![
			PlanStep {
				target: ResourceKind::Doc,
				query: message.to_string(),
				filters: filters.clone(),
				top_k: 10,
			},
			PlanStep {
				target: ResourceKind::Result,
				query: message.to_string(),
				filters,
				top_k: 10,
			},
		],
		decision_goal: DecisionGoal {
			primary: "best_fit".to_string(),
			ranking_rules: vec![
				"correctness".to_string(),
				"freshness".to_string(),
				"coverage".to_string(),
			],
			must_return_single: true,
		},
		constraints: OutputConstraints {
			need_citations: true,
			no_fabrication: true,
			output_format: OutputFormat::Steps,
		},
	}
}

fn build_planner_messages(req: &PlanRequest, corrective: Option<&str>) -> Vec<Value> {
	let targets: Vec<&str> = req.available_targets.iter().map(|kind| kind.as_str()).collect();
	let schema = serde_json::json!({
		"intent": { "name": "string", "confidence": 0.0, "entities": [] },
		"search_plan": [{
			"target": "DOC | WORKFLOW | RESULT | STRUCTURED",
			"query": "string",
			"filters": { "tags": [], "resource_status": ["active"], "freshness_required": false },
			"top_k": 10
		}],
		"decision_goal": {
			"primary": "string",
			"ranking_rules": ["string"],
			"must_return_single": true
		},
		"constraints": {
			"need_citations": true,
			"no_fabrication": true,
			"output_format": "text | steps | json | table"
		}
	});
	let schema_text =
		serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string());
	let system_prompt = format!(
		"You are the intent router of a question answering system. Given a user message, \
		 produce a retrieval plan as strict JSON matching this exact schema:\n{schema_text}\n\
		 Only use targets from the available list. Do not add explanations or extra fields."
	);
	let mut user_prompt = format!(
		"User message: {}\n\nAvailable search targets: {}\n\nProduce the retrieval plan \
		 (strict JSON).",
		req.message,
		targets.join(", ")
	);

	if let Some(context) = req.conversation_context.as_ref() {
		user_prompt.push_str(&format!("\n\nConversation context:\n{context}"));
	}
	if let Some(corrective) = corrective {
		user_prompt.push_str("\n\n");
		user_prompt.push_str(corrective);
	}

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}

fn default_step_top_k() -> u32 {
	10
}

fn default_true() -> bool {
	true
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use sage_domain::{ActionType, candidate::ResourceKind};

use crate::{
	Action, Citation, ExecuteRequest, ExecuteResponse, PlanRequest, RequestContext, SageService,
	SearchPlan, ServiceResult,
};

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
	pub message: String,
	#[serde(default)]
	pub conversation_context: Option<Value>,
	#[serde(default)]
	pub session_id: Option<String>,
	#[serde(default)]
	pub tenant_id: Option<String>,
	#[serde(default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub entity_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatResponse {
	pub session_id: Option<String>,
	pub trace_id: String,
	pub answer: String,
	pub meta: ChatMeta,
	pub plan: Option<SearchPlan>,
	pub action: Option<Action>,
	pub candidates_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatMeta {
	pub intent: String,
	pub action_type: ActionType,
	pub selected_resource_id: Option<String>,
	pub run_id: Option<String>,
	pub citations: Vec<Citation>,
}

impl SageService {
	/// The top-level control loop: plan, fan out retrieval, decide, optionally
	/// execute, assemble evidence, answer. Every failure is contained here;
	/// callers always receive a well-formed response and internal detail only
	/// reaches the logs.
	pub async fn process(&self, req: ChatRequest) -> ChatResponse {
		let trace_id = new_trace_id(OffsetDateTime::now_utc());

		match self.process_inner(&req, &trace_id).await {
			Ok(response) => response,
			Err(err) => {
				error!(error = %err, trace_id, "Chat pipeline failed.");

				ChatResponse {
					session_id: req.session_id.clone(),
					trace_id,
					answer: "Something went wrong while handling this request. Please try again."
						.to_string(),
					meta: ChatMeta {
						intent: "OTHER".to_string(),
						action_type: ActionType::Fallback,
						selected_resource_id: None,
						run_id: None,
						citations: Vec::new(),
					},
					plan: None,
					action: None,
					candidates_count: 0,
				}
			},
		}
	}

	async fn process_inner(
		&self,
		req: &ChatRequest,
		trace_id: &str,
	) -> ServiceResult<ChatResponse> {
		let ctx = RequestContext {
			tenant_id: req.tenant_id.clone(),
			user_id: req.user_id.clone(),
			entity_ids: req.entity_ids.clone(),
			inputs: None,
		};
		let plan_req = PlanRequest {
			message: req.message.clone(),
			conversation_context: req.conversation_context.clone(),
			available_targets: vec![
				ResourceKind::Doc,
				ResourceKind::Workflow,
				ResourceKind::Result,
				ResourceKind::Structured,
			],
		};
		let plan = self.plan(&plan_req).await;
		let candidates = self.aggregate(&plan, &ctx).await;

		info!(
			trace_id,
			intent = %plan.intent.name,
			candidates = candidates.len(),
			"Retrieval complete."
		);

		let action = self.decide(&req.message, &plan, &candidates, &ctx).await;
		let exec_result = if action.action_type == ActionType::ExecuteWorkflow {
			self.execute_selected(&action, req).await
		} else {
			None
		};
		let evidence =
			self.assemble_evidence(&action, &candidates, exec_result.as_ref(), &ctx).await;
		let answer = self.answer(&req.message, &plan, &action, &evidence).await;
		let citations = evidence
			.iter()
			.filter(|entry| !entry.citation.source.is_empty())
			.map(|entry| entry.citation.clone())
			.collect();

		Ok(ChatResponse {
			session_id: req.session_id.clone(),
			trace_id: trace_id.to_string(),
			answer,
			meta: ChatMeta {
				intent: plan.intent.name.clone(),
				action_type: action.action_type,
				selected_resource_id: action.selected.resource_id.clone(),
				run_id: exec_result.as_ref().map(|exec| exec.run_id.clone()),
				citations,
			},
			candidates_count: candidates.len(),
			plan: Some(plan),
			action: Some(action),
		})
	}

	/// Resolves the decided executor resource to its workflow definition and
	/// runs it. Lookup misses and execution failures degrade to "no execution
	/// output" rather than aborting the pipeline.
	async fn execute_selected(
		&self,
		action: &Action,
		req: &ChatRequest,
	) -> Option<ExecuteResponse> {
		let executor_id = action.execution.executor_resource_id.as_deref()?;
		let def = match self
			.registry
			.workflow_for_resource(executor_id, req.tenant_id.as_deref())
			.await
		{
			Ok(Some(def)) => def,
			Ok(None) => {
				warn!(executor_id, "No workflow definition behind the selected resource.");

				return None;
			},
			Err(err) => {
				warn!(error = %err, executor_id, "Workflow definition lookup failed.");

				return None;
			},
		};
		let exec_req = ExecuteRequest {
			workflow_id: def.workflow_id.clone(),
			inputs: action.execution.input.clone(),
			tenant_id: req.tenant_id.clone(),
			user_id: req.user_id.clone(),
			idempotency_key: action.execution.idempotency_key.clone(),
		};

		match self.execute(exec_req).await {
			Ok(result) => Some(result),
			Err(err) => {
				warn!(error = %err, executor_id, "Workflow execution failed.");

				None
			},
		}
	}
}

fn new_trace_id(now: OffsetDateTime) -> String {
	let format =
		time::macros::format_description!("[year][month][day]_[hour][minute][second]");
	let stamp = now.format(&format).unwrap_or_else(|_| "00000000_000000".to_string());
	let suffix = Uuid::new_v4().simple().to_string();

	format!("trace_{stamp}_{}", &suffix[..8])
}

mod steps;

use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use sage_domain::{ResourceKind, fingerprint};
use sage_storage::{
	RunInsert,
	models::{Resource, StepError, StoredResult, WorkflowDef, WorkflowRun, run_status},
};

use crate::{
	PlanFilters, PlanStep, RequestContext, SageService, ServiceError, ServiceResult,
};

const UNKNOWN_STEP_TYPE: &str = "UNKNOWN_STEP_TYPE";
const EXECUTION_ERROR: &str = "EXECUTION_ERROR";
const TIMEOUT: &str = "TIMEOUT";
const EXCEPTION: &str = "EXCEPTION";

#[derive(Clone, Debug, Deserialize)]
pub struct ExecuteRequest {
	pub workflow_id: String,
	#[serde(default)]
	pub inputs: Value,
	#[serde(default)]
	pub tenant_id: Option<String>,
	#[serde(default)]
	pub user_id: Option<String>,
	/// Caller-supplied key takes precedence over the computed fingerprint.
	#[serde(default)]
	pub idempotency_key: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExecuteResponse {
	pub run_id: String,
	pub workflow_id: String,
	pub status: String,
	pub outputs: Option<Value>,
	pub errors: Vec<StepError>,
	pub from_cache: bool,
}

impl SageService {
	/// Executes a workflow with idempotency guarantees: an identical request
	/// whose prior run succeeded replays that run instead of re-executing side
	/// effects, and concurrent identical requests cannot both run.
	pub async fn execute(&self, req: ExecuteRequest) -> ServiceResult<ExecuteResponse> {
		let tenant_id = req.tenant_id.as_deref();
		let def = self
			.registry
			.workflow(&req.workflow_id, tenant_id)
			.await?
			.ok_or_else(|| ServiceError::NotFound {
				message: format!("Workflow {} not found.", req.workflow_id),
			})?;
		let idempotency_key = req.idempotency_key.clone().unwrap_or_else(|| {
			fingerprint::idempotency_key(
				&req.workflow_id,
				&req.inputs,
				tenant_id,
				req.user_id.as_deref(),
			)
		});

		if let Some(prior) = self.registry.run_for_key(&idempotency_key, tenant_id).await?
			&& prior.status == run_status::SUCCESS
		{
			info!(run_id = %prior.run_id, "Idempotent replay of a completed run.");

			return Ok(cached_response(&req.workflow_id, prior));
		}

		let now = OffsetDateTime::now_utc();
		let run_id = new_run_id(now);
		let run = WorkflowRun {
			run_id: run_id.clone(),
			workflow_id: req.workflow_id.clone(),
			tenant_id: req.tenant_id.clone(),
			user_id: req.user_id.clone(),
			status: run_status::RUNNING.to_string(),
			inputs: req.inputs.clone(),
			outputs: None,
			errors: json!([]),
			idempotency_key: idempotency_key.clone(),
			created_at: now,
			updated_at: now,
		};

		match self.registry.create_run(&run).await? {
			RunInsert::Created => {},
			RunInsert::Existing(prior) if prior.status == run_status::SUCCESS => {
				info!(run_id = %prior.run_id, "Idempotent replay of a completed run.");

				return Ok(cached_response(&req.workflow_id, prior));
			},
			RunInsert::Existing(prior) => {
				return Err(ServiceError::Conflict {
					message: format!(
						"Run {} with the same idempotency key is still in progress.",
						prior.run_id
					),
				});
			},
		}

		let ctx = RequestContext {
			tenant_id: req.tenant_id.clone(),
			user_id: req.user_id.clone(),
			entity_ids: Vec::new(),
			inputs: Some(req.inputs.clone()),
		};
		let timeout_seconds = def
			.timeout_seconds
			.map(|value| value.max(0) as u64)
			.unwrap_or(self.cfg.execution.default_timeout_seconds);
		let executed = tokio::time::timeout(
			Duration::from_secs(timeout_seconds),
			self.run_steps(&def, &req.inputs, &ctx),
		)
		.await;
		let (raw_outputs, errors) = match executed {
			Ok(pair) => pair,
			Err(_) => {
				let errors = vec![StepError {
					step: None,
					code: TIMEOUT.to_string(),
					message: format!(
						"Workflow execution exceeded {timeout_seconds} seconds."
					),
				}];

				self.registry
					.finish_run(&run_id, run_status::FAILED, None, &errors)
					.await?;

				return Ok(ExecuteResponse {
					run_id,
					workflow_id: req.workflow_id,
					status: run_status::FAILED.to_string(),
					outputs: None,
					errors,
					from_cache: false,
				});
			},
		};
		let outputs = flatten_outputs(&raw_outputs);
		let status = if errors.is_empty() {
			run_status::SUCCESS
		} else if !outputs.is_empty() {
			run_status::PARTIAL
		} else {
			run_status::FAILED
		};
		let outputs_value = Value::Object(outputs.clone());

		if status == run_status::SUCCESS && !outputs.is_empty() {
			// Result materialization failing is an invariant violation, not a
			// step-local failure: mark the run failed and propagate. It runs
			// before the terminal transition so the run state changes once.
			if let Err(err) = self
				.store_execution_result(&def, &run_id, &req, &outputs_value)
				.await
			{
				let errors = vec![StepError {
					step: None,
					code: EXCEPTION.to_string(),
					message: err.to_string(),
				}];

				self.registry
					.finish_run(&run_id, run_status::FAILED, Some(&outputs_value), &errors)
					.await
					.ok();

				return Err(err);
			}
		}

		self.registry
			.finish_run(&run_id, status, Some(&outputs_value), &errors)
			.await?;

		Ok(ExecuteResponse {
			run_id,
			workflow_id: req.workflow_id,
			status: status.to_string(),
			outputs: Some(outputs_value),
			errors,
			from_cache: false,
		})
	}

	/// Runs the definition's steps in order. Step failures are recorded and do
	/// not abort siblings; only a false CONDITION gate halts the sequence.
	async fn run_steps(
		&self,
		def: &WorkflowDef,
		inputs: &Value,
		ctx: &RequestContext,
	) -> (Map<String, Value>, Vec<StepError>) {
		let step_defs = def
			.definition
			.get("steps")
			.and_then(Value::as_array)
			.cloned()
			.unwrap_or_default();
		let mut outputs: Map<String, Value> = Map::new();
		let mut errors = Vec::new();

		for (index, step) in step_defs.iter().enumerate() {
			let scope = json!({ "inputs": inputs, "outputs": Value::Object(outputs.clone()) });
			let kind = step.get("type").and_then(Value::as_str).unwrap_or_default();

			match kind {
				"CONDITION" => {
					let condition = step.get("condition").cloned().unwrap_or(Value::Null);

					match steps::eval_condition(&condition, &scope) {
						Ok(pass) => {
							outputs.insert(step_key(index), json!({ "result": pass }));

							if !pass {
								info!(step = index, "Condition gate is false; halting workflow.");

								break;
							}
						},
						Err(message) => errors.push(StepError {
							step: Some(index as u32),
							code: EXECUTION_ERROR.to_string(),
							message,
						}),
					}
				},
				"PARALLEL" => {
					let (value, sub_errors) =
						self.step_parallel(index, step, &scope, ctx).await;

					outputs.insert(step_key(index), value);
					errors.extend(sub_errors);
				},
				_ => match self.execute_leaf(index, step, &scope, ctx).await {
					Ok(value) => {
						outputs.insert(step_key(index), value);
					},
					Err(error) => errors.push(error),
				},
			}
		}

		(outputs, errors)
	}

	/// One non-structural step: TOOL, TRANSFORM, or RETRIEVE.
	async fn execute_leaf(
		&self,
		index: usize,
		step: &Value,
		scope: &Value,
		ctx: &RequestContext,
	) -> Result<Value, StepError> {
		let kind = step.get("type").and_then(Value::as_str).unwrap_or_default();

		match kind {
			"TOOL" => self.step_tool(index, step, scope).await,
			"TRANSFORM" => steps::apply_transform(step, scope).map_err(|message| StepError {
				step: Some(index as u32),
				code: EXECUTION_ERROR.to_string(),
				message,
			}),
			"RETRIEVE" => self.step_retrieve(index, step, scope, ctx).await,
			other => Err(StepError {
				step: Some(index as u32),
				code: UNKNOWN_STEP_TYPE.to_string(),
				message: format!("Unknown step type: {other}."),
			}),
		}
	}

	async fn step_tool(
		&self,
		index: usize,
		step: &Value,
		scope: &Value,
	) -> Result<Value, StepError> {
		let tool_id = step.get("tool_id").and_then(Value::as_str).unwrap_or_default();
		let template = step.get("args_template").cloned().unwrap_or_else(|| json!({}));
		let args = steps::render_template(&template, scope);

		match self.providers.tool.invoke(tool_id, &args).await {
			Ok(result) => Ok(json!({ "tool_id": tool_id, "args": args, "result": result })),
			Err(err) => Err(StepError {
				step: Some(index as u32),
				code: EXECUTION_ERROR.to_string(),
				message: format!("Tool {tool_id} failed: {err}."),
			}),
		}
	}

	async fn step_retrieve(
		&self,
		index: usize,
		step: &Value,
		scope: &Value,
		ctx: &RequestContext,
	) -> Result<Value, StepError> {
		let target = step
			.get("target")
			.and_then(Value::as_str)
			.and_then(ResourceKind::parse)
			.ok_or_else(|| StepError {
				step: Some(index as u32),
				code: EXECUTION_ERROR.to_string(),
				message: "Retrieve step has no valid target.".to_string(),
			})?;
		let query_template = step.get("query").cloned().unwrap_or(Value::Null);
		let query = match steps::render_template(&query_template, scope) {
			Value::String(text) => text,
			other => other.to_string(),
		};
		let top_k = step.get("top_k").and_then(Value::as_u64).unwrap_or(10) as u32;
		let plan_step = PlanStep {
			target,
			query,
			filters: PlanFilters::default(),
			top_k,
		};
		let candidates = self.retrieve_target(&plan_step, ctx).await;
		let items = serde_json::to_value(&candidates).unwrap_or_else(|_| json!([]));

		Ok(json!({ "count": candidates.len(), "result": items }))
	}

	/// Fans sub-steps out concurrently and collects every result before the
	/// step completes. Sub-steps must not depend on each other's outputs; no
	/// ordering is guaranteed between their side effects.
	async fn step_parallel(
		&self,
		index: usize,
		step: &Value,
		scope: &Value,
		ctx: &RequestContext,
	) -> (Value, Vec<StepError>) {
		let sub_steps = step.get("steps").and_then(Value::as_array).cloned().unwrap_or_default();
		let executions = sub_steps
			.iter()
			.map(|sub_step| self.execute_leaf(index, sub_step, scope, ctx));
		let mut results = Vec::with_capacity(sub_steps.len());
		let mut errors = Vec::new();

		for (sub_index, outcome) in join_all(executions).await.into_iter().enumerate() {
			match outcome {
				Ok(value) => results.push(value),
				Err(error) => {
					results.push(Value::Null);
					errors.push(StepError {
						message: format!("Sub-step {sub_index}: {}", error.message),
						..error
					});
				},
			}
		}

		(json!({ "results": results }), errors)
	}

	/// Materializes the cacheable result of a successful run, plus a registry
	/// resource entry so future retrieval can find it.
	async fn store_execution_result(
		&self,
		def: &WorkflowDef,
		run_id: &str,
		req: &ExecuteRequest,
		outputs: &Value,
	) -> ServiceResult<()> {
		let now = OffsetDateTime::now_utc();
		let inputs_hash = fingerprint::inputs_hash(&req.inputs);
		let ttl_seconds = def
			.ttl_seconds
			.filter(|value| *value > 0)
			.unwrap_or(self.cfg.execution.default_result_ttl_seconds);
		let fresh_until = now + time::Duration::seconds(ttl_seconds);
		let summary = format!("Execution result of workflow {}.", def.workflow_id);
		let result_id = format!("res_result_{run_id}");
		let stored = StoredResult {
			result_id: result_id.clone(),
			resource_id: result_id.clone(),
			tenant_id: req.tenant_id.clone(),
			derived_from: json!({
				"resource_id": def.resource_id,
				"run_id": run_id,
				"inputs_hash": inputs_hash,
			}),
			subject_keys: json!({
				"user_id": req.user_id,
				"entity_ids": [],
				"time_range": null,
			}),
			inputs_hash,
			fresh_until,
			summary: summary.clone(),
			payload: outputs.clone(),
			created_at: now,
		};
		let resource = Resource {
			resource_id: result_id.clone(),
			tenant_id: req.tenant_id.clone(),
			r#type: ResourceKind::Result.as_str().to_string(),
			title: summary,
			when_to_use: None,
			capabilities: Vec::new(),
			tags: vec!["execution_result".to_string()],
			version: "1.0.0".to_string(),
			status: "active".to_string(),
			pointers: json!({ "result_uri": result_id }),
			created_at: now,
			updated_at: now,
		};

		self.registry.store_result(&stored, &resource).await?;

		info!(result_id = %stored.result_id, run_id, "Materialized execution result.");

		Ok(())
	}
}

fn cached_response(workflow_id: &str, run: WorkflowRun) -> ExecuteResponse {
	ExecuteResponse {
		run_id: run.run_id.clone(),
		workflow_id: workflow_id.to_string(),
		status: run.status.clone(),
		outputs: run.outputs.clone(),
		errors: run.decoded_errors(),
		from_cache: true,
	}
}

/// Merges step outputs into the run's final output map: object results are
/// flattened into top-level keys, everything else keeps its step key.
fn flatten_outputs(outputs: &Map<String, Value>) -> Map<String, Value> {
	let mut merged = Map::new();

	for (key, value) in outputs {
		match value {
			Value::Object(map) => merged.extend(map.clone()),
			other => {
				merged.insert(key.clone(), other.clone());
			},
		}
	}

	merged
}

fn step_key(index: usize) -> String {
	format!("step_{index}")
}

fn new_run_id(now: OffsetDateTime) -> String {
	let format = time::macros::format_description!(
		"[year][month][day]_[hour][minute][second]"
	);
	let stamp = now.format(&format).unwrap_or_else(|_| "00000000_000000".to_string());
	let suffix = Uuid::new_v4().simple().to_string();

	format!("run_{stamp}_{}", &suffix[..8])
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

pub mod run_status {
	pub const RUNNING: &str = "running";
	pub const SUCCESS: &str = "success";
	pub const PARTIAL: &str = "partial";
	pub const FAILED: &str = "failed";
}

pub mod resource_status {
	pub const ACTIVE: &str = "active";
	pub const DEPRECATED: &str = "deprecated";
	pub const DISABLED: &str = "disabled";
}

/// Registry entry for any retrievable item: documents, workflows, and the
/// resource shells created for materialized results.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Resource {
	pub resource_id: String,
	pub tenant_id: Option<String>,
	pub r#type: String,
	pub title: String,
	pub when_to_use: Option<String>,
	pub capabilities: Vec<String>,
	pub tags: Vec<String>,
	pub version: String,
	pub status: String,
	pub pointers: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Executable workflow definition. `definition` holds a `{"steps": [...]}`
/// object; step records are validated at execution time, not here.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct WorkflowDef {
	pub workflow_id: String,
	pub resource_id: String,
	pub tenant_id: Option<String>,
	pub definition: Value,
	pub timeout_seconds: Option<i64>,
	pub ttl_seconds: Option<i64>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Durable cache entry materialized from a successful workflow run. Staleness
/// is a retrieval-time filter on `fresh_until`, never a deletion trigger.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct StoredResult {
	pub result_id: String,
	pub resource_id: String,
	pub tenant_id: Option<String>,
	pub derived_from: Value,
	pub subject_keys: Value,
	pub inputs_hash: String,
	pub fresh_until: OffsetDateTime,
	pub summary: String,
	pub payload: Value,
	pub created_at: OffsetDateTime,
}

/// One execution attempt. Created in `running` state, transitions exactly once
/// to a terminal state and is immutable afterwards.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct WorkflowRun {
	pub run_id: String,
	pub workflow_id: String,
	pub tenant_id: Option<String>,
	pub user_id: Option<String>,
	pub status: String,
	pub inputs: Value,
	pub outputs: Option<Value>,
	pub errors: Value,
	pub idempotency_key: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl WorkflowRun {
	pub fn decoded_errors(&self) -> Vec<StepError> {
		serde_json::from_value(self.errors.clone()).unwrap_or_default()
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepError {
	/// Zero-based step index, or `None` for run-level errors such as timeouts.
	pub step: Option<u32>,
	pub code: String,
	pub message: String,
}

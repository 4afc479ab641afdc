use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
	Doc,
	Workflow,
	Result,
	Structured,
}
impl ResourceKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Doc => "DOC",
			Self::Workflow => "WORKFLOW",
			Self::Result => "RESULT",
			Self::Structured => "STRUCTURED",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"DOC" => Some(Self::Doc),
			"WORKFLOW" => Some(Self::Workflow),
			"RESULT" => Some(Self::Result),
			"STRUCTURED" => Some(Self::Structured),
			_ => None,
		}
	}

	/// Citation URI scheme for this kind, e.g. `doc` in `doc://{resource_id}#chunk`.
	pub fn scheme(self) -> &'static str {
		match self {
			Self::Doc => "doc",
			Self::Workflow => "workflow",
			Self::Result => "result",
			Self::Structured => "structured",
		}
	}
}
impl std::fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
	ReturnResult,
	ExecuteWorkflow,
	AskClarify,
	Fallback,
}

/// Per-signal score breakdown. Every component stays in [0, 1]; `total` is the
/// retriever-specific weighted combination and stays in [0, 1] as long as the
/// configured weight group sums to at most 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
	pub semantic: f32,
	pub keyword: f32,
	pub freshness: f32,
	pub policy: f32,
	pub total: f32,
}

/// One retrievable item with its multi-signal score. Shared by every retriever
/// and consumed as-is by the decision stage; immutable once produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
	pub resource_id: String,
	pub resource_type: ResourceKind,
	pub title: String,
	pub snippet: String,
	pub scores: ScoreBreakdown,
	pub metadata: Value,
}
impl Candidate {
	/// Freshness deadline recorded by the producing retriever, if any.
	pub fn fresh_until(&self) -> Option<OffsetDateTime> {
		self.metadata
			.get("fresh_until")
			.and_then(Value::as_str)
			.and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
	}
}

/// Subject scoping recorded on a cached result: who and what it is about.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubjectKeys {
	#[serde(default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub entity_ids: Vec<String>,
	#[serde(default)]
	pub time_range: Option<Value>,
}
impl SubjectKeys {
	pub fn is_empty(&self) -> bool {
		self.user_id.is_none() && self.entity_ids.is_empty() && self.time_range.is_none()
	}
}

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub planning: Planning,
	#[serde(default)]
	pub decision: Decision,
	#[serde(default)]
	pub execution: Execution,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub planner: LlmProviderConfig,
	pub decider: LlmProviderConfig,
	pub answerer: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Retrieval {
	/// Candidates returned per search-plan entry when the plan does not say.
	#[serde(default = "default_top_k")]
	pub default_top_k: u32,
	/// Vector-search over-fetch factor, leaving headroom for re-ranking.
	#[serde(default = "default_candidate_multiplier")]
	pub candidate_multiplier: u32,
	/// Horizon against which remaining result validity is normalized.
	#[serde(default = "default_freshness_horizon")]
	pub freshness_horizon_seconds: i64,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			default_top_k: default_top_k(),
			candidate_multiplier: default_candidate_multiplier(),
			freshness_horizon_seconds: default_freshness_horizon(),
		}
	}
}

/// Per-retriever scoring weights. Each group should sum to at most 1.0 so
/// candidate totals stay comparable across retrievers; `validate` enforces it.
#[derive(Debug, Default, Deserialize)]
pub struct Ranking {
	#[serde(default)]
	pub doc: DocWeights,
	#[serde(default)]
	pub workflow: WorkflowWeights,
	#[serde(default)]
	pub result: ResultWeights,
}

#[derive(Debug, Deserialize)]
pub struct DocWeights {
	/// Weight of embedding cosine similarity.
	#[serde(default = "default_doc_semantic")]
	pub semantic: f32,
	/// Weight of token overlap between the query and the chunk snippet.
	#[serde(default = "default_doc_keyword")]
	pub keyword: f32,
}
impl Default for DocWeights {
	fn default() -> Self {
		Self { semantic: default_doc_semantic(), keyword: default_doc_keyword() }
	}
}

#[derive(Debug, Deserialize)]
pub struct WorkflowWeights {
	#[serde(default = "default_workflow_semantic")]
	pub semantic: f32,
	/// Weight of the capability/tag/title keyword match.
	#[serde(default = "default_workflow_keyword")]
	pub keyword: f32,
	/// Weight of the policy term. The policy signal itself is a constant 1.0:
	/// every surfaced workflow is presumed policy-eligible because tenant and
	/// status gating already happened as hard exclusions.
	#[serde(default = "default_workflow_policy")]
	pub policy: f32,
}
impl Default for WorkflowWeights {
	fn default() -> Self {
		Self {
			semantic: default_workflow_semantic(),
			keyword: default_workflow_keyword(),
			policy: default_workflow_policy(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct ResultWeights {
	#[serde(default = "default_result_semantic")]
	pub semantic: f32,
	/// Weight of remaining validity before `fresh_until`.
	#[serde(default = "default_result_freshness")]
	pub freshness: f32,
	/// Weight of subject-key affinity with the requesting user/entities.
	#[serde(default = "default_result_subject")]
	pub subject: f32,
	/// Weight of the inputs-hash flag: 1.0 on an exact cache hit, 0.5 otherwise.
	#[serde(default = "default_result_inputs")]
	pub inputs: f32,
}
impl Default for ResultWeights {
	fn default() -> Self {
		Self {
			semantic: default_result_semantic(),
			freshness: default_result_freshness(),
			subject: default_result_subject(),
			inputs: default_result_inputs(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Planning {
	/// Total attempts against the planner model before the deterministic
	/// default plan takes over.
	#[serde(default = "default_llm_attempts")]
	pub max_attempts: u32,
}
impl Default for Planning {
	fn default() -> Self {
		Self { max_attempts: default_llm_attempts() }
	}
}

#[derive(Debug, Deserialize)]
pub struct Decision {
	/// A fresh RESULT candidate at or above this total is returned without
	/// consulting the decision model.
	#[serde(default = "default_return_threshold")]
	pub result_return_threshold: f32,
	/// A DOC candidate at or above this total is returned without consulting
	/// the decision model.
	#[serde(default = "default_return_threshold")]
	pub doc_return_threshold: f32,
	#[serde(default = "default_llm_attempts")]
	pub max_attempts: u32,
}
impl Default for Decision {
	fn default() -> Self {
		Self {
			result_return_threshold: default_return_threshold(),
			doc_return_threshold: default_return_threshold(),
			max_attempts: default_llm_attempts(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Execution {
	/// Wall-clock bound for a run when the workflow definition has none.
	#[serde(default = "default_timeout_seconds")]
	pub default_timeout_seconds: u64,
	/// Freshness TTL for materialized results when the workflow has none.
	#[serde(default = "default_result_ttl")]
	pub default_result_ttl_seconds: i64,
}
impl Default for Execution {
	fn default() -> Self {
		Self {
			default_timeout_seconds: default_timeout_seconds(),
			default_result_ttl_seconds: default_result_ttl(),
		}
	}
}

fn default_top_k() -> u32 {
	10
}

fn default_candidate_multiplier() -> u32 {
	2
}

fn default_freshness_horizon() -> i64 {
	86_400
}

fn default_doc_semantic() -> f32 {
	0.5
}

fn default_doc_keyword() -> f32 {
	0.3
}

fn default_workflow_semantic() -> f32 {
	0.4
}

fn default_workflow_keyword() -> f32 {
	0.3
}

fn default_workflow_policy() -> f32 {
	0.3
}

fn default_result_semantic() -> f32 {
	0.3
}

fn default_result_freshness() -> f32 {
	0.4
}

fn default_result_subject() -> f32 {
	0.1
}

fn default_result_inputs() -> f32 {
	0.2
}

fn default_llm_attempts() -> u32 {
	2
}

fn default_return_threshold() -> f32 {
	0.7
}

fn default_timeout_seconds() -> u64 {
	30
}

fn default_result_ttl() -> i64 {
	86_400
}

pub mod aggregate;
pub mod answer;
pub mod decide;
pub mod evidence;
pub mod execute;
pub mod plan;
pub mod process;
pub mod retrieve;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use sage_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use sage_providers::{completion, embedding};
use sage_storage::{ResourceRegistry, VectorIndex};

pub use decide::{Action, Clarify, ExecutionPlan, Reason, Selection};
pub use evidence::{Citation, Evidence};
pub use execute::{ExecuteRequest, ExecuteResponse};
pub use plan::{
	DecisionGoal, IntentGuess, OutputConstraints, OutputFormat, PlanFilters, PlanRequest,
	PlanStep, SearchPlan,
};
pub use process::{ChatMeta, ChatRequest, ChatResponse};

pub type ServiceResult<T> = Result<T, ServiceError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait CompletionProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
		json_mode: bool,
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

/// Side-effecting adapter behind TOOL workflow steps.
pub trait ToolProvider
where
	Self: Send + Sync,
{
	fn invoke<'a>(
		&'a self,
		tool_id: &'a str,
		args: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<Value>>;
}

#[derive(Debug)]
pub enum ServiceError {
	InvalidRequest { message: String },
	NotFound { message: String },
	Conflict { message: String },
	Provider { message: String },
	Storage { message: String },
}
impl std::fmt::Display for ServiceError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::InvalidRequest { message } => write!(f, "Invalid request: {message}"),
			Self::NotFound { message } => write!(f, "Not found: {message}"),
			Self::Conflict { message } => write!(f, "Conflict: {message}"),
			Self::Provider { message } => write!(f, "Provider error: {message}"),
			Self::Storage { message } => write!(f, "Storage error: {message}"),
		}
	}
}
impl std::error::Error for ServiceError {}
impl From<sage_storage::Error> for ServiceError {
	fn from(err: sage_storage::Error) -> Self {
		match err {
			sage_storage::Error::NotFound(message) => Self::NotFound { message },
			sage_storage::Error::Conflict(message) => Self::Conflict { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
impl From<color_eyre::Report> for ServiceError {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub completion: Arc<dyn CompletionProvider>,
	pub tool: Arc<dyn ToolProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		completion: Arc<dyn CompletionProvider>,
		tool: Arc<dyn ToolProvider>,
	) -> Self {
		Self { embedding, completion, tool }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), completion: provider.clone(), tool: provider }
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}
impl CompletionProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
		json_mode: bool,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(completion::complete(cfg, messages, json_mode))
	}
}
impl ToolProvider for DefaultProviders {
	// Tool adapters are deployment-specific; the default provider echoes the
	// rendered call so workflows stay executable without a registered adapter.
	fn invoke<'a>(
		&'a self,
		tool_id: &'a str,
		args: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<Value>> {
		Box::pin(async move {
			Ok(serde_json::json!({
				"tool_id": tool_id,
				"args": args,
				"status": "ok",
			}))
		})
	}
}

/// Per-request identity and cache-affinity context threaded through retrieval
/// and execution.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
	pub tenant_id: Option<String>,
	pub user_id: Option<String>,
	pub entity_ids: Vec<String>,
	/// Workflow-style inputs carried by the request, used for the
	/// exact-cache-hit match against stored result input hashes.
	pub inputs: Option<Value>,
}

pub struct SageService {
	pub cfg: Config,
	pub registry: Arc<dyn ResourceRegistry>,
	pub index: Arc<dyn VectorIndex>,
	pub providers: Providers,
}
impl SageService {
	pub fn new(
		cfg: Config,
		registry: Arc<dyn ResourceRegistry>,
		index: Arc<dyn VectorIndex>,
	) -> Self {
		Self { cfg, registry, index, providers: Providers::default() }
	}

	pub fn with_providers(
		cfg: Config,
		registry: Arc<dyn ResourceRegistry>,
		index: Arc<dyn VectorIndex>,
		providers: Providers,
	) -> Self {
		Self { cfg, registry, index, providers }
	}

	pub(crate) async fn embed_query(&self, query: &str) -> ServiceResult<Vec<f32>> {
		let embeddings = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, std::slice::from_ref(&query.to_string()))
			.await?;
		let vector = embeddings.into_iter().next().ok_or_else(|| ServiceError::Provider {
			message: "Embedding provider returned no vectors.".to_string(),
		})?;

		if vector.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return Err(ServiceError::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vector)
	}
}

pub mod db;
pub mod models;
pub mod pg;
pub mod qdrant;
pub mod schema;

mod error;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin};

use serde_json::Value;

use sage_domain::candidate::ResourceKind;

use crate::models::{Resource, StepError, StoredResult, WorkflowDef, WorkflowRun};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Nearest-neighbor query against the brief/chunk index. `statuses` is an
/// allow-list; empty means no status filtering.
#[derive(Clone, Debug)]
pub struct IndexQuery {
	pub vector: Vec<f32>,
	pub top_k: u32,
	pub tenant_id: Option<String>,
	pub resource_type: Option<ResourceKind>,
	pub statuses: Vec<String>,
}

/// One scored index hit. `score` is similarity in [0, 1]; backends that report
/// distances convert before returning.
#[derive(Clone, Debug)]
pub struct IndexHit {
	pub resource_id: String,
	pub chunk_id: Option<String>,
	pub snippet: String,
	pub score: f32,
}

/// Outcome of the atomic run insert: either this caller holds the new run, or
/// another caller already holds an active run for the same idempotency key.
#[derive(Clone, Debug)]
pub enum RunInsert {
	Created,
	Existing(WorkflowRun),
}

/// Read/write surface of the resource registry. The pipeline only ever writes
/// runs and materialized results; everything else is read-only.
pub trait ResourceRegistry
where
	Self: Send + Sync,
{
	fn resource<'a>(
		&'a self,
		resource_id: &'a str,
		tenant_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<Option<Resource>>>;

	fn workflow<'a>(
		&'a self,
		workflow_id: &'a str,
		tenant_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<Option<WorkflowDef>>>;

	fn workflow_for_resource<'a>(
		&'a self,
		resource_id: &'a str,
		tenant_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<Option<WorkflowDef>>>;

	fn result<'a>(
		&'a self,
		result_id: &'a str,
		tenant_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<Option<StoredResult>>>;

	/// The active (`running` or `success`) run for an idempotency key, if any.
	fn run_for_key<'a>(
		&'a self,
		idempotency_key: &'a str,
		tenant_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<Option<WorkflowRun>>>;

	/// Insert-or-fetch on the idempotency key: at most one active run per key
	/// can exist, even across concurrent callers and process instances.
	fn create_run<'a>(&'a self, run: &'a WorkflowRun) -> BoxFuture<'a, Result<RunInsert>>;

	fn finish_run<'a>(
		&'a self,
		run_id: &'a str,
		status: &'a str,
		outputs: Option<&'a Value>,
		errors: &'a [StepError],
	) -> BoxFuture<'a, Result<()>>;

	/// Persists a materialized result together with its registry resource
	/// entry so future retrieval can find it.
	fn store_result<'a>(
		&'a self,
		result: &'a StoredResult,
		resource: &'a Resource,
	) -> BoxFuture<'a, Result<()>>;
}

pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<Vec<IndexHit>>>;
}

/// Similarity for backends that report a distance metric.
pub fn similarity_from_distance(distance: f32) -> f32 {
	(1.0 - distance).clamp(0.0, 1.0)
}

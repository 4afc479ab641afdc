pub mod doc;
pub mod result;
pub mod workflow;

use std::cmp::Ordering;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, warn};

use sage_domain::{Candidate, ResourceKind};
use sage_storage::{IndexHit, IndexQuery};

use crate::{PlanStep, RequestContext, SageService};

impl SageService {
	/// Dispatches one search-plan entry to the matching retriever. Targets
	/// without a retriever are skipped, not errors.
	pub async fn retrieve_target(&self, step: &PlanStep, ctx: &RequestContext) -> Vec<Candidate> {
		match step.target {
			ResourceKind::Doc =>
				self.retrieve_docs(&step.query, &step.filters, step.top_k, ctx).await,
			ResourceKind::Workflow =>
				self.retrieve_workflows(&step.query, &step.filters, step.top_k, ctx).await,
			ResourceKind::Result =>
				self.retrieve_results(&step.query, &step.filters, step.top_k, ctx).await,
			other => {
				debug!(target = %other, "No retriever for plan target; skipping entry.");

				Vec::new()
			},
		}
	}

	/// Shared first stage of every retriever: embed the query and over-fetch
	/// nearest neighbors. Backend failures degrade to an empty hit list; the
	/// log line tells them apart from a genuine zero-hit search.
	pub(crate) async fn semantic_hits(
		&self,
		query: &str,
		kind: ResourceKind,
		top_k: u32,
		ctx: &RequestContext,
		statuses: &[String],
	) -> Vec<IndexHit> {
		let vector = match self.embed_query(query).await {
			Ok(vector) => vector,
			Err(err) => {
				warn!(
					error = %err,
					kind = kind.as_str(),
					"Embedding backend failed; treating as no evidence."
				);

				return Vec::new();
			},
		};
		let fetch = top_k.max(1) * self.cfg.retrieval.candidate_multiplier.max(1);
		let index_query = IndexQuery {
			vector,
			top_k: fetch,
			tenant_id: ctx.tenant_id.clone(),
			resource_type: Some(kind),
			statuses: statuses.to_vec(),
		};

		match self.index.search(&index_query).await {
			Ok(hits) => hits,
			Err(err) => {
				warn!(
					error = %err,
					kind = kind.as_str(),
					"Vector index search failed; treating as no evidence."
				);

				Vec::new()
			},
		}
	}
}

/// Descending by total score; the sort is stable, so ties keep the insertion
/// order of the vector-search result.
pub(crate) fn sort_and_truncate(candidates: &mut Vec<Candidate>, top_k: u32) {
	candidates.sort_by(|a, b| {
		b.scores.total.partial_cmp(&a.scores.total).unwrap_or(Ordering::Equal)
	});
	candidates.truncate(top_k as usize);
}

pub(crate) fn rfc3339(ts: OffsetDateTime) -> String {
	ts.format(&Rfc3339).unwrap_or_default()
}

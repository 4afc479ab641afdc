use std::collections::HashSet;

use serde_json::json;
use tracing::warn;

use sage_domain::{Candidate, ResourceKind, ScoreBreakdown, scoring};

use crate::{
	PlanFilters, RequestContext, SageService,
	retrieve::{rfc3339, sort_and_truncate},
};

impl SageService {
	/// Hybrid document retrieval: vector similarity over chunk snippets plus a
	/// token-overlap keyword signal, merged per chunk.
	pub async fn retrieve_docs(
		&self,
		query: &str,
		filters: &PlanFilters,
		top_k: u32,
		ctx: &RequestContext,
	) -> Vec<Candidate> {
		let hits = self
			.semantic_hits(query, ResourceKind::Doc, top_k, ctx, &filters.resource_status)
			.await;
		let weights = &self.cfg.ranking.doc;
		let mut seen = HashSet::new();
		let mut out = Vec::new();

		for hit in hits {
			let key = hit.chunk_id.clone().unwrap_or_else(|| hit.resource_id.clone());

			if !seen.insert(key) {
				continue;
			}

			let resource =
				match self.registry.resource(&hit.resource_id, ctx.tenant_id.as_deref()).await {
					Ok(Some(resource)) => resource,
					Ok(None) => {
						warn!(
							resource_id = %hit.resource_id,
							"Doc candidate has no registry entry; dropping."
						);

						continue;
					},
					Err(err) => {
						warn!(
							error = %err,
							resource_id = %hit.resource_id,
							"Doc resource lookup failed; dropping candidate."
						);

						continue;
					},
				};

			if !filters.resource_status.is_empty()
				&& !filters.resource_status.contains(&resource.status)
			{
				continue;
			}

			let keyword = scoring::keyword_overlap_score(query, &hit.snippet);
			let total = weights.semantic * hit.score + weights.keyword * keyword;

			out.push(Candidate {
				resource_id: hit.resource_id.clone(),
				resource_type: ResourceKind::Doc,
				title: resource.title.clone(),
				snippet: hit.snippet.clone(),
				scores: ScoreBreakdown {
					semantic: hit.score,
					keyword,
					freshness: 0.0,
					policy: 1.0,
					total,
				},
				metadata: json!({
					"tags": resource.tags,
					"version": resource.version,
					"updated_at": rfc3339(resource.updated_at),
					"chunk_id": hit.chunk_id,
				}),
			});
		}

		sort_and_truncate(&mut out, top_k);

		out
	}
}

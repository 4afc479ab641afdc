use std::collections::HashSet;

use serde_json::json;
use tracing::warn;

use sage_domain::{Candidate, ResourceKind, ScoreBreakdown, scoring};
use sage_storage::models::resource_status;

use crate::{
	PlanFilters, RequestContext, SageService,
	retrieve::{rfc3339, sort_and_truncate},
};

impl SageService {
	/// Workflow retrieval over resource briefs. Tenant mismatch and
	/// deprecated/disabled status are hard exclusions, never ranking signals.
	pub async fn retrieve_workflows(
		&self,
		query: &str,
		filters: &PlanFilters,
		top_k: u32,
		ctx: &RequestContext,
	) -> Vec<Candidate> {
		let hits = self
			.semantic_hits(query, ResourceKind::Workflow, top_k, ctx, &filters.resource_status)
			.await;
		let weights = &self.cfg.ranking.workflow;
		let mut seen = HashSet::new();
		let mut out = Vec::new();

		for hit in hits {
			if !seen.insert(hit.resource_id.clone()) {
				continue;
			}

			let resource =
				match self.registry.resource(&hit.resource_id, ctx.tenant_id.as_deref()).await {
					Ok(Some(resource)) => resource,
					Ok(None) => continue,
					Err(err) => {
						warn!(
							error = %err,
							resource_id = %hit.resource_id,
							"Workflow resource lookup failed; dropping candidate."
						);

						continue;
					},
				};

			if let Some(request_tenant) = ctx.tenant_id.as_deref()
				&& let Some(resource_tenant) = resource.tenant_id.as_deref()
				&& resource_tenant != request_tenant
			{
				continue;
			}
			if matches!(
				resource.status.as_str(),
				resource_status::DEPRECATED | resource_status::DISABLED
			) {
				continue;
			}
			if !filters.resource_status.is_empty()
				&& !filters.resource_status.contains(&resource.status)
			{
				continue;
			}

			let keyword = scoring::workflow_keyword_score(
				query,
				&resource.title,
				&resource.capabilities,
				&resource.tags,
			);
			// The policy signal is a constant pass: tenant and status gating
			// already happened above as hard exclusions.
			let total =
				weights.semantic * hit.score + weights.keyword * keyword + weights.policy * 1.0;
			let snippet = match resource.when_to_use.as_deref() {
				Some(when_to_use) => format!("{}. {when_to_use}", resource.title),
				None => format!("{}.", resource.title),
			};

			out.push(Candidate {
				resource_id: resource.resource_id.clone(),
				resource_type: ResourceKind::Workflow,
				title: resource.title.clone(),
				snippet,
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
					"capabilities": resource.capabilities,
					"updated_at": rfc3339(resource.updated_at),
				}),
			});
		}

		sort_and_truncate(&mut out, top_k);

		out
	}
}

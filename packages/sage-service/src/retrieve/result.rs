use std::collections::HashSet;

use serde_json::json;
use time::OffsetDateTime;
use tracing::warn;

use sage_domain::{
	Candidate, ResourceKind, ScoreBreakdown, SubjectKeys, fingerprint, scoring,
};

use crate::{
	PlanFilters, RequestContext, SageService,
	retrieve::{rfc3339, sort_and_truncate},
};

impl SageService {
	/// Cached-result retrieval: vector similarity over result summaries plus
	/// freshness decay, subject-key affinity, and the exact inputs-hash cache
	/// hit. Expired results are excluded only when the plan entry demands
	/// freshness; otherwise they stay in with a zero freshness score.
	pub async fn retrieve_results(
		&self,
		query: &str,
		filters: &PlanFilters,
		top_k: u32,
		ctx: &RequestContext,
	) -> Vec<Candidate> {
		let hits = self
			.semantic_hits(query, ResourceKind::Result, top_k, ctx, &filters.resource_status)
			.await;
		let weights = &self.cfg.ranking.result;
		let horizon = self.cfg.retrieval.freshness_horizon_seconds;
		let request_hash = ctx.inputs.as_ref().map(fingerprint::inputs_hash);
		let now = OffsetDateTime::now_utc();
		let mut seen = HashSet::new();
		let mut out = Vec::new();

		for hit in hits {
			if !seen.insert(hit.resource_id.clone()) {
				continue;
			}

			let stored =
				match self.registry.result(&hit.resource_id, ctx.tenant_id.as_deref()).await {
					Ok(Some(stored)) => stored,
					Ok(None) => continue,
					Err(err) => {
						warn!(
							error = %err,
							result_id = %hit.resource_id,
							"Result lookup failed; dropping candidate."
						);

						continue;
					},
				};

			if filters.freshness_required && stored.fresh_until <= now {
				continue;
			}

			let freshness = scoring::freshness_score(stored.fresh_until, now, horizon);
			let subject_keys: SubjectKeys =
				serde_json::from_value(stored.subject_keys.clone()).unwrap_or_default();
			let inputs_match = request_hash.as_deref() == Some(stored.inputs_hash.as_str());
			let subject = if inputs_match {
				1.0
			} else {
				scoring::subject_key_score(
					&subject_keys,
					ctx.user_id.as_deref(),
					&ctx.entity_ids,
				)
			};
			let inputs_flag = if inputs_match { 1.0 } else { 0.5 };
			let total = weights.semantic * hit.score
				+ weights.freshness * freshness
				+ weights.subject * subject
				+ weights.inputs * inputs_flag;
			let title = match self
				.registry
				.resource(&stored.resource_id, ctx.tenant_id.as_deref())
				.await
			{
				Ok(Some(resource)) => resource.title,
				_ => stored.summary.clone(),
			};

			out.push(Candidate {
				resource_id: stored.result_id.clone(),
				resource_type: ResourceKind::Result,
				title,
				snippet: stored.summary.clone(),
				scores: ScoreBreakdown {
					semantic: hit.score,
					keyword: 0.0,
					freshness,
					policy: 1.0,
					total,
				},
				metadata: json!({
					"fresh_until": rfc3339(stored.fresh_until),
					"derived_from": stored.derived_from,
					"subject_keys": stored.subject_keys,
					"inputs_match": inputs_match,
				}),
			});
		}

		sort_and_truncate(&mut out, top_k);

		out
	}
}

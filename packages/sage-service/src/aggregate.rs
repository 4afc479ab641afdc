use futures_util::future::join_all;

use sage_domain::Candidate;

use crate::{RequestContext, SageService, SearchPlan};

impl SageService {
	/// Executes the search plan: every entry fans out to its retriever
	/// concurrently (entries have no data dependencies on each other), and the
	/// per-entry results are concatenated in plan order.
	pub async fn aggregate(&self, plan: &SearchPlan, ctx: &RequestContext) -> Vec<Candidate> {
		let retrievals = plan.search_plan.iter().map(|step| self.retrieve_target(step, ctx));

		join_all(retrievals).await.into_iter().flatten().collect()
	}
}

use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, Filter, Query, QueryPointsBuilder, Value, value::Kind,
};

use crate::{BoxFuture, IndexHit, IndexQuery, Result, VectorIndex};

/// Qdrant-backed brief/chunk index. Points carry `resource_id`, optional
/// `chunk_id`, `snippet`, `tenant_id`, `resource_type`, and `status` payload
/// fields; cosine similarity comes back as the point score.
pub struct QdrantIndex {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
}
impl QdrantIndex {
	pub fn new(cfg: &sage_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone() })
	}

	async fn run_search(&self, query: &IndexQuery) -> Result<Vec<IndexHit>> {
		let mut must = Vec::new();

		if let Some(tenant_id) = query.tenant_id.as_ref() {
			must.push(Condition::matches("tenant_id", tenant_id.clone()));
		}
		if let Some(kind) = query.resource_type {
			must.push(Condition::matches("resource_type", kind.as_str().to_string()));
		}
		if !query.statuses.is_empty() {
			must.push(Condition::matches("status", query.statuses.clone()));
		}

		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(query.vector.clone()))
			.filter(Filter { must, ..Default::default() })
			.with_payload(true)
			.limit(query.top_k as u64);
		let response = self.client.query(search).await?;
		let mut out = Vec::new();

		for point in response.result {
			let Some(resource_id) = payload_str(&point.payload, "resource_id") else {
				continue;
			};

			out.push(IndexHit {
				resource_id,
				chunk_id: payload_str(&point.payload, "chunk_id"),
				snippet: payload_str(&point.payload, "snippet").unwrap_or_default(),
				score: point.score.clamp(0.0, 1.0),
			});
		}

		Ok(out)
	}
}
impl VectorIndex for QdrantIndex {
	fn search<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<Vec<IndexHit>>> {
		Box::pin(self.run_search(query))
	}
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.clone()),
		_ => None,
	}
}

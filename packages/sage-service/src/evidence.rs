use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use sage_domain::{Candidate, ResourceKind, citation};

use crate::{Action, ExecuteResponse, RequestContext, SageService};

/// The minimal content+citation unit handed to answer generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evidence {
	pub resource_id: String,
	#[serde(rename = "type")]
	pub resource_type: ResourceKind,
	pub content: String,
	pub citation: Citation,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Citation {
	pub source: String,
	pub id: String,
	pub span: Option<Value>,
}

impl SageService {
	/// Extracts the evidence bundle for the chosen action: the selected
	/// candidate's type-specific content, plus a synthetic result entry when a
	/// workflow was executed. May legitimately be empty; answer generation
	/// must then disclaim instead of fabricate.
	pub async fn assemble_evidence(
		&self,
		action: &Action,
		candidates: &[Candidate],
		exec_result: Option<&ExecuteResponse>,
		ctx: &RequestContext,
	) -> Vec<Evidence> {
		let mut evidence = Vec::new();
		let selected = action
			.selected
			.resource_id
			.as_deref()
			.and_then(|id| candidates.iter().find(|cand| cand.resource_id == id));

		if let Some(candidate) = selected {
			match candidate.resource_type {
				ResourceKind::Doc => {
					let chunk_id = candidate
						.metadata
						.get("chunk_id")
						.and_then(Value::as_str)
						.unwrap_or_default();

					evidence.push(Evidence {
						resource_id: candidate.resource_id.clone(),
						resource_type: ResourceKind::Doc,
						content: candidate.snippet.clone(),
						citation: Citation {
							source: citation::citation_uri(
								ResourceKind::Doc,
								&candidate.resource_id,
								Some("chunk"),
							),
							id: chunk_id.to_string(),
							span: None,
						},
					});
				},
				ResourceKind::Result => {
					let content = match self
						.registry
						.result(&candidate.resource_id, ctx.tenant_id.as_deref())
						.await
					{
						Ok(Some(stored)) => stored.payload.to_string(),
						Ok(None) => candidate.snippet.clone(),
						Err(err) => {
							warn!(
								error = %err,
								result_id = %candidate.resource_id,
								"Result payload lookup failed; falling back to the snippet."
							);

							candidate.snippet.clone()
						},
					};

					evidence.push(Evidence {
						resource_id: candidate.resource_id.clone(),
						resource_type: ResourceKind::Result,
						content,
						citation: Citation {
							source: citation::citation_uri(
								ResourceKind::Result,
								&candidate.resource_id,
								None,
							),
							id: candidate.resource_id.clone(),
							span: None,
						},
					});
				},
				ResourceKind::Workflow => {
					evidence.push(Evidence {
						resource_id: candidate.resource_id.clone(),
						resource_type: ResourceKind::Workflow,
						content: candidate.snippet.clone(),
						citation: Citation {
							source: citation::citation_uri(
								ResourceKind::Workflow,
								&candidate.resource_id,
								None,
							),
							id: candidate.resource_id.clone(),
							span: None,
						},
					});
				},
				ResourceKind::Structured => {
					evidence.push(Evidence {
						resource_id: candidate.resource_id.clone(),
						resource_type: ResourceKind::Structured,
						content: candidate.snippet.clone(),
						citation: Citation {
							source: citation::citation_uri(
								ResourceKind::Structured,
								&candidate.resource_id,
								None,
							),
							id: candidate.resource_id.clone(),
							span: None,
						},
					});
				},
			}
		}

		if let Some(exec) = exec_result
			&& let Some(outputs) = exec.outputs.as_ref()
		{
			evidence.push(Evidence {
				resource_id: exec.run_id.clone(),
				resource_type: ResourceKind::Result,
				content: outputs.to_string(),
				citation: Citation {
					source: citation::citation_uri(ResourceKind::Result, &exec.run_id, None),
					id: exec.run_id.clone(),
					span: None,
				},
			});
		}

		evidence
	}
}

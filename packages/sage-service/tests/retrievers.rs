use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use sage_config::EmbeddingProviderConfig;
use sage_domain::candidate::ResourceKind;
use sage_service::{
	BoxFuture, EmbeddingProvider, PlanFilters, Providers, RequestContext, SageService,
};
use sage_testkit::{
	IndexEntry, MemRegistry, RecordingTool, ScriptedCompletion, ScriptedIndex,
};

fn build_service(registry: Arc<MemRegistry>, index: Arc<ScriptedIndex>) -> SageService {
	sage_testkit::service(
		registry,
		index,
		sage_testkit::providers(
			Arc::new(ScriptedCompletion::new()),
			Arc::new(RecordingTool::new()),
		),
	)
}

fn ctx() -> RequestContext {
	RequestContext::default()
}

#[tokio::test]
async fn doc_retriever_blends_semantic_and_keyword_signals() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());

	registry.insert_resource(sage_testkit::resource(
		"res_doc_1",
		ResourceKind::Doc,
		"Password manual",
	));

	let mut entry =
		IndexEntry::new("res_doc_1", ResourceKind::Doc, 0.9, "How to reset your password");

	entry.chunk_id = Some("chunk_7".to_string());
	index.push(entry);

	let service = build_service(registry, index);
	let out = service
		.retrieve_docs("reset password", &PlanFilters::default(), 10, &ctx())
		.await;

	assert_eq!(out.len(), 1);
	assert_eq!(out[0].resource_id, "res_doc_1");
	assert_eq!(out[0].resource_type, ResourceKind::Doc);
	assert!((out[0].scores.semantic - 0.9).abs() < 1e-6);
	assert!((out[0].scores.keyword - 1.0).abs() < 1e-6);
	assert!((out[0].scores.total - (0.5 * 0.9 + 0.3)).abs() < 1e-6);
	assert_eq!(out[0].metadata["chunk_id"], "chunk_7");
}

#[tokio::test]
async fn doc_retriever_drops_disallowed_status_and_missing_resources() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());
	let mut archived =
		sage_testkit::resource("res_doc_old", ResourceKind::Doc, "Old manual");

	archived.status = "archived".to_string();
	registry.insert_resource(archived);
	index.push(IndexEntry::new("res_doc_old", ResourceKind::Doc, 0.9, "old text"));
	index.push(IndexEntry::new("res_doc_ghost", ResourceKind::Doc, 0.9, "ghost text"));

	let service = build_service(registry, index);
	let filters = PlanFilters {
		resource_status: vec!["active".to_string()],
		..Default::default()
	};
	let out = service.retrieve_docs("anything", &filters, 10, &ctx()).await;

	assert!(out.is_empty());
}

#[tokio::test]
async fn doc_retriever_orders_by_total_and_truncates() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());

	for (id, score) in [("res_a", 0.2), ("res_b", 0.9), ("res_c", 0.5)] {
		registry.insert_resource(sage_testkit::resource(id, ResourceKind::Doc, id));
		index.push(IndexEntry::new(id, ResourceKind::Doc, score, "no overlap here"));
	}

	let service = build_service(registry, index);
	let out = service.retrieve_docs("unrelated query", &PlanFilters::default(), 2, &ctx()).await;

	assert_eq!(out.len(), 2);
	assert_eq!(out[0].resource_id, "res_b");
	assert_eq!(out[1].resource_id, "res_c");
}

#[tokio::test]
async fn workflow_retriever_excludes_tenant_mismatch_regardless_of_score() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());
	let mut foreign =
		sage_testkit::resource("res_wf_foreign", ResourceKind::Workflow, "Generate report");

	foreign.tenant_id = Some("t1".to_string());
	registry.insert_resource(foreign);
	index.push(IndexEntry::new("res_wf_foreign", ResourceKind::Workflow, 0.99, ""));

	let service = build_service(registry, index);
	let request_ctx = RequestContext { tenant_id: Some("t2".to_string()), ..Default::default() };
	let out = service
		.retrieve_workflows("generate report", &PlanFilters::default(), 10, &request_ctx)
		.await;

	assert!(out.is_empty());
}

#[tokio::test]
async fn workflow_retriever_excludes_deprecated_and_disabled() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());

	for (id, status) in [("res_wf_dep", "deprecated"), ("res_wf_dis", "disabled")] {
		let mut resource = sage_testkit::resource(id, ResourceKind::Workflow, "Report tool");

		resource.status = status.to_string();
		registry.insert_resource(resource);
		index.push(IndexEntry::new(id, ResourceKind::Workflow, 0.95, ""));
	}

	let service = build_service(registry, index);
	let out = service
		.retrieve_workflows("report", &PlanFilters::default(), 10, &ctx())
		.await;

	assert!(out.is_empty());
}

#[tokio::test]
async fn workflow_retriever_scores_capability_and_title_matches() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());
	let mut resource =
		sage_testkit::resource("res_wf_1", ResourceKind::Workflow, "Generate report workflow");

	resource.capabilities = vec!["report-generation".to_string()];
	resource.when_to_use = Some("Use to build usage reports.".to_string());
	registry.insert_resource(resource);
	index.push(IndexEntry::new("res_wf_1", ResourceKind::Workflow, 0.5, ""));

	let service = build_service(registry, index);
	let out = service
		.retrieve_workflows("generate report", &PlanFilters::default(), 10, &ctx())
		.await;

	assert_eq!(out.len(), 1);
	// title substring +0.5, capability term +0.3
	assert!((out[0].scores.keyword - 0.8).abs() < 1e-6);
	assert!((out[0].scores.total - (0.4 * 0.5 + 0.3 * 0.8 + 0.3)).abs() < 1e-6);
	assert_eq!(out[0].snippet, "Generate report workflow. Use to build usage reports.");
}

#[tokio::test]
async fn result_retriever_applies_freshness_gate_only_when_required() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());
	let now = OffsetDateTime::now_utc();

	registry.insert_resource(sage_testkit::resource(
		"res_result_1",
		ResourceKind::Result,
		"Usage report",
	));
	registry.insert_result(sage_testkit::stored_result(
		"res_result_1",
		now - Duration::seconds(1),
		"hash_a",
	));
	index.push(IndexEntry::new("res_result_1", ResourceKind::Result, 0.9, "summary"));

	let service = build_service(registry, index);
	let strict = PlanFilters { freshness_required: true, ..Default::default() };
	let out = service.retrieve_results("usage report", &strict, 10, &ctx()).await;

	assert!(out.is_empty());

	let lax = PlanFilters::default();
	let out = service.retrieve_results("usage report", &lax, 10, &ctx()).await;

	assert_eq!(out.len(), 1);
	assert_eq!(out[0].scores.freshness, 0.0);
}

#[tokio::test]
async fn result_retriever_boosts_exact_inputs_hash_match() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());
	let now = OffsetDateTime::now_utc();
	let inputs = serde_json::json!({ "city": "Berlin" });
	let hash = sage_domain::fingerprint::inputs_hash(&inputs);

	registry.insert_resource(sage_testkit::resource(
		"res_result_hit",
		ResourceKind::Result,
		"Berlin forecast",
	));
	registry.insert_result(sage_testkit::stored_result(
		"res_result_hit",
		now + Duration::days(2),
		&hash,
	));
	index.push(IndexEntry::new("res_result_hit", ResourceKind::Result, 0.5, "summary"));

	let service = build_service(registry, index);
	let request_ctx = RequestContext { inputs: Some(inputs), ..Default::default() };
	let out = service
		.retrieve_results("forecast", &PlanFilters::default(), 10, &request_ctx)
		.await;

	assert_eq!(out.len(), 1);
	assert_eq!(out[0].metadata["inputs_match"], true);
	// semantic 0.3*0.5 + freshness 0.4*1.0 + subject 0.1*1.0 + inputs 0.2*1.0
	assert!((out[0].scores.total - (0.3 * 0.5 + 0.4 + 0.1 + 0.2)).abs() < 1e-6);
}

struct FailingEmbedding;
impl EmbeddingProvider for FailingEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Err(color_eyre::eyre::eyre!("embedding backend down")) })
	}
}

#[tokio::test]
async fn backend_failure_degrades_to_empty_candidate_list() {
	let registry = Arc::new(MemRegistry::new());
	let index = Arc::new(ScriptedIndex::new());

	index.push(IndexEntry::new("res_doc_1", ResourceKind::Doc, 0.9, "text"));

	let providers = Providers::new(
		Arc::new(FailingEmbedding),
		Arc::new(ScriptedCompletion::new()),
		Arc::new(RecordingTool::new()),
	);
	let service = sage_testkit::service(registry, index, providers);
	let out = service.retrieve_docs("anything", &PlanFilters::default(), 10, &ctx()).await;

	assert!(out.is_empty());
}

mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Decision, DocWeights, EmbeddingProviderConfig, Execution, LlmProviderConfig, Planning,
	Postgres, Providers, Qdrant, Ranking, ResultWeights, Retrieval, Service, Storage,
	WorkflowWeights,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("planner", &cfg.providers.planner.api_key),
		("decider", &cfg.providers.decider.api_key),
		("answerer", &cfg.providers.answerer.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.retrieval.default_top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.default_top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.candidate_multiplier == 0 {
		return Err(Error::Validation {
			message: "retrieval.candidate_multiplier must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.freshness_horizon_seconds <= 0 {
		return Err(Error::Validation {
			message: "retrieval.freshness_horizon_seconds must be greater than zero.".to_string(),
		});
	}

	validate_weight_group(
		"ranking.doc",
		&[
			("semantic", cfg.ranking.doc.semantic),
			("keyword", cfg.ranking.doc.keyword),
		],
	)?;
	validate_weight_group(
		"ranking.workflow",
		&[
			("semantic", cfg.ranking.workflow.semantic),
			("keyword", cfg.ranking.workflow.keyword),
			("policy", cfg.ranking.workflow.policy),
		],
	)?;
	validate_weight_group(
		"ranking.result",
		&[
			("semantic", cfg.ranking.result.semantic),
			("freshness", cfg.ranking.result.freshness),
			("subject", cfg.ranking.result.subject),
			("inputs", cfg.ranking.result.inputs),
		],
	)?;

	if cfg.planning.max_attempts == 0 {
		return Err(Error::Validation {
			message: "planning.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.decision.max_attempts == 0 {
		return Err(Error::Validation {
			message: "decision.max_attempts must be greater than zero.".to_string(),
		});
	}

	for (label, threshold) in [
		("decision.result_return_threshold", cfg.decision.result_return_threshold),
		("decision.doc_return_threshold", cfg.decision.doc_return_threshold),
	] {
		if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if cfg.execution.default_result_ttl_seconds <= 0 {
		return Err(Error::Validation {
			message: "execution.default_result_ttl_seconds must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_weight_group(group: &str, weights: &[(&str, f32)]) -> Result<()> {
	let mut sum = 0.0;

	for (name, weight) in weights {
		if !weight.is_finite() || !(0.0..=1.0).contains(weight) {
			return Err(Error::Validation {
				message: format!("{group}.{name} must be in the range 0.0-1.0."),
			});
		}

		sum += weight;
	}

	if sum > 1.0 + f32::EPSILON {
		return Err(Error::Validation {
			message: format!("{group} weights must sum to at most 1.0."),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}

/// DDL for the registry tables. Statements are idempotent; `Db::ensure_schema`
/// executes them under an advisory lock at startup.
pub fn render_schema() -> String {
	r#"
CREATE TABLE IF NOT EXISTS resources (
	resource_id TEXT PRIMARY KEY,
	tenant_id   TEXT,
	type        TEXT NOT NULL,
	title       TEXT NOT NULL,
	when_to_use TEXT,
	capabilities TEXT[] NOT NULL DEFAULT '{}',
	tags        TEXT[] NOT NULL DEFAULT '{}',
	version     TEXT NOT NULL DEFAULT '1.0.0',
	status      TEXT NOT NULL DEFAULT 'active',
	pointers    JSONB NOT NULL DEFAULT '{}',
	created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
	updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_resources_tenant_type ON resources (tenant_id, type, status);

CREATE TABLE IF NOT EXISTS workflow_defs (
	workflow_id     TEXT PRIMARY KEY,
	resource_id     TEXT NOT NULL,
	tenant_id       TEXT,
	definition      JSONB NOT NULL DEFAULT '{}',
	timeout_seconds BIGINT,
	ttl_seconds     BIGINT,
	created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
	updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_workflow_defs_resource ON workflow_defs (resource_id);

CREATE TABLE IF NOT EXISTS results (
	result_id    TEXT PRIMARY KEY,
	resource_id  TEXT NOT NULL,
	tenant_id    TEXT,
	derived_from JSONB NOT NULL DEFAULT '{}',
	subject_keys JSONB NOT NULL DEFAULT '{}',
	inputs_hash  TEXT NOT NULL,
	fresh_until  TIMESTAMPTZ NOT NULL,
	summary      TEXT NOT NULL DEFAULT '',
	payload      JSONB NOT NULL DEFAULT '{}',
	created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_results_fresh_until ON results (fresh_until, tenant_id);
CREATE INDEX IF NOT EXISTS idx_results_inputs_hash ON results (inputs_hash, tenant_id);

CREATE TABLE IF NOT EXISTS workflow_runs (
	run_id          TEXT PRIMARY KEY,
	workflow_id     TEXT NOT NULL,
	tenant_id       TEXT,
	user_id         TEXT,
	status          TEXT NOT NULL,
	inputs          JSONB NOT NULL DEFAULT '{}',
	outputs         JSONB,
	errors          JSONB NOT NULL DEFAULT '[]',
	idempotency_key TEXT NOT NULL,
	created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
	updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uniq_workflow_runs_active_key
	ON workflow_runs (idempotency_key)
	WHERE status IN ('running', 'success');
CREATE INDEX IF NOT EXISTS idx_workflow_runs_key ON workflow_runs (idempotency_key);
"#
	.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_covers_all_registry_tables() {
		let sql = render_schema();

		for table in ["resources", "workflow_defs", "results", "workflow_runs"] {
			assert!(sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
		}

		assert!(sql.contains("uniq_workflow_runs_active_key"));
	}
}

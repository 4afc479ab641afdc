use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{
	BoxFuture, Error, Result, RunInsert,
	models::{Resource, StepError, StoredResult, WorkflowDef, WorkflowRun, run_status},
};

/// Postgres-backed registry. All statements are tenant-guarded: a row with a
/// tenant is only visible to that tenant, a row without one to everybody.
pub struct PgRegistry {
	pub pool: PgPool,
}
impl PgRegistry {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	async fn fetch_resource(
		&self,
		resource_id: &str,
		tenant_id: Option<&str>,
	) -> Result<Option<Resource>> {
		let row = sqlx::query_as::<_, Resource>(
			"SELECT * FROM resources \
			 WHERE resource_id = $1 \
			   AND (tenant_id IS NULL OR $2::text IS NULL OR tenant_id = $2)",
		)
		.bind(resource_id)
		.bind(tenant_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row)
	}

	async fn fetch_workflow(
		&self,
		workflow_id: &str,
		tenant_id: Option<&str>,
	) -> Result<Option<WorkflowDef>> {
		let row = sqlx::query_as::<_, WorkflowDef>(
			"SELECT * FROM workflow_defs \
			 WHERE workflow_id = $1 \
			   AND (tenant_id IS NULL OR $2::text IS NULL OR tenant_id = $2)",
		)
		.bind(workflow_id)
		.bind(tenant_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row)
	}

	async fn fetch_workflow_for_resource(
		&self,
		resource_id: &str,
		tenant_id: Option<&str>,
	) -> Result<Option<WorkflowDef>> {
		let row = sqlx::query_as::<_, WorkflowDef>(
			"SELECT * FROM workflow_defs \
			 WHERE resource_id = $1 \
			   AND (tenant_id IS NULL OR $2::text IS NULL OR tenant_id = $2) \
			 LIMIT 1",
		)
		.bind(resource_id)
		.bind(tenant_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row)
	}

	async fn fetch_result(
		&self,
		result_id: &str,
		tenant_id: Option<&str>,
	) -> Result<Option<StoredResult>> {
		let row = sqlx::query_as::<_, StoredResult>(
			"SELECT * FROM results \
			 WHERE result_id = $1 \
			   AND (tenant_id IS NULL OR $2::text IS NULL OR tenant_id = $2)",
		)
		.bind(result_id)
		.bind(tenant_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row)
	}

	async fn fetch_run_for_key(
		&self,
		idempotency_key: &str,
		tenant_id: Option<&str>,
	) -> Result<Option<WorkflowRun>> {
		let row = sqlx::query_as::<_, WorkflowRun>(
			"SELECT * FROM workflow_runs \
			 WHERE idempotency_key = $1 \
			   AND status IN ('running', 'success') \
			   AND (tenant_id IS NULL OR $2::text IS NULL OR tenant_id = $2) \
			 ORDER BY created_at DESC \
			 LIMIT 1",
		)
		.bind(idempotency_key)
		.bind(tenant_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row)
	}

	async fn insert_run(&self, run: &WorkflowRun) -> Result<RunInsert> {
		// The partial unique index on active runs makes this the atomic
		// check-and-create: the loser of a concurrent race inserts nothing and
		// re-reads the winner's row.
		let inserted = sqlx::query(
			"INSERT INTO workflow_runs (\
				run_id, workflow_id, tenant_id, user_id, status, inputs, outputs, errors, \
				idempotency_key, created_at, updated_at) \
			 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) \
			 ON CONFLICT (idempotency_key) WHERE status IN ('running', 'success') DO NOTHING",
		)
		.bind(&run.run_id)
		.bind(&run.workflow_id)
		.bind(&run.tenant_id)
		.bind(&run.user_id)
		.bind(&run.status)
		.bind(&run.inputs)
		.bind(&run.outputs)
		.bind(&run.errors)
		.bind(&run.idempotency_key)
		.bind(run.created_at)
		.bind(run.updated_at)
		.execute(&self.pool)
		.await?;

		if inserted.rows_affected() > 0 {
			return Ok(RunInsert::Created);
		}

		let existing = self
			.fetch_run_for_key(&run.idempotency_key, run.tenant_id.as_deref())
			.await?
			.ok_or_else(|| {
				Error::Conflict(format!(
					"Run insert for key {} conflicted but no active run is visible.",
					run.idempotency_key
				))
			})?;

		Ok(RunInsert::Existing(existing))
	}

	async fn update_run(
		&self,
		run_id: &str,
		status: &str,
		outputs: Option<&Value>,
		errors: &[StepError],
	) -> Result<()> {
		let errors_json = serde_json::to_value(errors)
			.map_err(|err| Error::InvalidRecord(format!("Failed to encode run errors: {err}.")))?;
		let updated = sqlx::query(
			"UPDATE workflow_runs \
			 SET status = $2, outputs = $3, errors = $4, updated_at = $5 \
			 WHERE run_id = $1 AND status = $6",
		)
		.bind(run_id)
		.bind(status)
		.bind(outputs)
		.bind(errors_json)
		.bind(OffsetDateTime::now_utc())
		.bind(run_status::RUNNING)
		.execute(&self.pool)
		.await?;

		if updated.rows_affected() == 0 {
			return Err(Error::NotFound(format!("No running workflow run with id {run_id}.")));
		}

		Ok(())
	}

	async fn insert_result(&self, result: &StoredResult, resource: &Resource) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		sqlx::query(
			"INSERT INTO results (\
				result_id, resource_id, tenant_id, derived_from, subject_keys, inputs_hash, \
				fresh_until, summary, payload, created_at) \
			 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
		)
		.bind(&result.result_id)
		.bind(&result.resource_id)
		.bind(&result.tenant_id)
		.bind(&result.derived_from)
		.bind(&result.subject_keys)
		.bind(&result.inputs_hash)
		.bind(result.fresh_until)
		.bind(&result.summary)
		.bind(&result.payload)
		.bind(result.created_at)
		.execute(&mut *tx)
		.await?;
		sqlx::query(
			"INSERT INTO resources (\
				resource_id, tenant_id, type, title, when_to_use, capabilities, tags, version, \
				status, pointers, created_at, updated_at) \
			 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12) \
			 ON CONFLICT (resource_id) DO NOTHING",
		)
		.bind(&resource.resource_id)
		.bind(&resource.tenant_id)
		.bind(&resource.r#type)
		.bind(&resource.title)
		.bind(&resource.when_to_use)
		.bind(&resource.capabilities)
		.bind(&resource.tags)
		.bind(&resource.version)
		.bind(&resource.status)
		.bind(&resource.pointers)
		.bind(resource.created_at)
		.bind(resource.updated_at)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;

		Ok(())
	}
}
impl crate::ResourceRegistry for PgRegistry {
	fn resource<'a>(
		&'a self,
		resource_id: &'a str,
		tenant_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<Option<Resource>>> {
		Box::pin(self.fetch_resource(resource_id, tenant_id))
	}

	fn workflow<'a>(
		&'a self,
		workflow_id: &'a str,
		tenant_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<Option<WorkflowDef>>> {
		Box::pin(self.fetch_workflow(workflow_id, tenant_id))
	}

	fn workflow_for_resource<'a>(
		&'a self,
		resource_id: &'a str,
		tenant_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<Option<WorkflowDef>>> {
		Box::pin(self.fetch_workflow_for_resource(resource_id, tenant_id))
	}

	fn result<'a>(
		&'a self,
		result_id: &'a str,
		tenant_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<Option<StoredResult>>> {
		Box::pin(self.fetch_result(result_id, tenant_id))
	}

	fn run_for_key<'a>(
		&'a self,
		idempotency_key: &'a str,
		tenant_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<Option<WorkflowRun>>> {
		Box::pin(self.fetch_run_for_key(idempotency_key, tenant_id))
	}

	fn create_run<'a>(&'a self, run: &'a WorkflowRun) -> BoxFuture<'a, Result<RunInsert>> {
		Box::pin(self.insert_run(run))
	}

	fn finish_run<'a>(
		&'a self,
		run_id: &'a str,
		status: &'a str,
		outputs: Option<&'a Value>,
		errors: &'a [StepError],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.update_run(run_id, status, outputs, errors))
	}

	fn store_result<'a>(
		&'a self,
		result: &'a StoredResult,
		resource: &'a Resource,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.insert_result(result, resource))
	}
}

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// Canonical JSON text: object keys sorted at every level, no insignificant
/// whitespace. Two values that differ only in key order render identically.
pub fn canonical_json(value: &Value) -> String {
	let mut out = String::new();

	write_canonical(value, &mut out);

	out
}

fn write_canonical(value: &Value, out: &mut String) {
	match value {
		Value::Object(map) => {
			let mut keys: Vec<&String> = map.keys().collect();

			keys.sort();
			out.push('{');

			for (i, key) in keys.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}

				out.push_str(&Value::String((*key).clone()).to_string());
				out.push(':');
				write_canonical(&map[*key], out);
			}

			out.push('}');
		},
		Value::Array(items) => {
			out.push('[');

			for (i, item) in items.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}

				write_canonical(item, out);
			}

			out.push(']');
		},
		scalar => out.push_str(&scalar.to_string()),
	}
}

pub fn sha256_hex(text: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(text.as_bytes());

	hex::encode(hasher.finalize())
}

/// Deterministic fingerprint of a workflow invocation, used to deduplicate
/// side-effecting execution: SHA-256 over the canonical JSON of the
/// (workflow_id, inputs, tenant_id, user_id) tuple.
pub fn idempotency_key(
	workflow_id: &str,
	inputs: &Value,
	tenant_id: Option<&str>,
	user_id: Option<&str>,
) -> String {
	let tuple = json!({
		"workflow_id": workflow_id,
		"inputs": inputs,
		"tenant_id": tenant_id,
		"user_id": user_id,
	});

	sha256_hex(&canonical_json(&tuple))
}

/// Fingerprint of workflow inputs alone, stored on cached results for the
/// exact-cache-hit fast path at retrieval time.
pub fn inputs_hash(inputs: &Value) -> String {
	sha256_hex(&canonical_json(inputs))
}

use serde_json::{Map, Value, json};

/// Renders `{{path.to.value}}` placeholders in a step argument template
/// against the execution scope (`{"inputs": ..., "outputs": ...}`). A string
/// that is exactly one placeholder resolves to the referenced value itself;
/// placeholders embedded in longer strings interpolate as text. Unresolvable
/// paths become null or the empty string respectively.
pub(crate) fn render_template(template: &Value, scope: &Value) -> Value {
	match template {
		Value::String(text) => render_string(text, scope),
		Value::Array(items) =>
			Value::Array(items.iter().map(|item| render_template(item, scope)).collect()),
		Value::Object(map) => Value::Object(
			map.iter().map(|(key, value)| (key.clone(), render_template(value, scope))).collect(),
		),
		other => other.clone(),
	}
}

fn render_string(text: &str, scope: &Value) -> Value {
	let trimmed = text.trim();

	if trimmed.starts_with("{{")
		&& trimmed.ends_with("}}")
		&& trimmed.matches("{{").count() == 1
	{
		let path = trimmed[2..trimmed.len() - 2].trim();

		return lookup_path(scope, path).cloned().unwrap_or(Value::Null);
	}

	let mut out = String::with_capacity(text.len());
	let mut rest = text;

	while let Some(start) = rest.find("{{") {
		out.push_str(&rest[..start]);

		let after = &rest[start + 2..];
		let Some(end) = after.find("}}") else {
			out.push_str(&rest[start..]);

			rest = "";

			break;
		};
		let path = after[..end].trim();

		match lookup_path(scope, path) {
			Some(Value::String(value)) => out.push_str(value),
			Some(value) => out.push_str(&value.to_string()),
			None => {},
		}

		rest = &after[end + 2..];
	}

	out.push_str(rest);

	Value::String(out)
}

/// Dot-separated lookup into the scope; numeric segments index into arrays.
pub(crate) fn lookup_path<'a>(scope: &'a Value, path: &str) -> Option<&'a Value> {
	let mut current = scope;

	for part in path.split('.') {
		let part = part.trim();

		current = match current {
			Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
			other => other.get(part)?,
		};
	}

	Some(current)
}

/// Evaluates a CONDITION step gate. Supported ops: `exists`, `non_empty`,
/// `eq`, `ne`. Operands are templates rendered against the scope.
pub(crate) fn eval_condition(condition: &Value, scope: &Value) -> Result<bool, String> {
	let object = condition.as_object().ok_or("Condition must be an object.")?;
	let op = object
		.get("op")
		.and_then(Value::as_str)
		.ok_or("Condition is missing the op field.")?;
	let left = render_template(object.get("left").unwrap_or(&Value::Null), scope);

	match op {
		"exists" => Ok(!left.is_null()),
		"non_empty" => Ok(match &left {
			Value::Null => false,
			Value::Bool(value) => *value,
			Value::Number(_) => true,
			Value::String(text) => !text.trim().is_empty(),
			Value::Array(items) => !items.is_empty(),
			Value::Object(map) => !map.is_empty(),
		}),
		"eq" | "ne" => {
			let right = render_template(object.get("right").unwrap_or(&Value::Null), scope);
			let equal = left == right;

			Ok(if op == "eq" { equal } else { !equal })
		},
		other => Err(format!("Unknown condition op: {other}.")),
	}
}

/// Applies a TRANSFORM step: pure data reshaping from prior step outputs.
/// Supported fns: `pick` (subset of keys from a scoped object), `merge`
/// (shallow-merge rendered objects), `template` (render an arbitrary shape).
pub(crate) fn apply_transform(step: &Value, scope: &Value) -> Result<Value, String> {
	let fn_name = step
		.get("fn")
		.and_then(Value::as_str)
		.ok_or("Transform step is missing the fn field.")?;
	let args = step.get("args").cloned().unwrap_or_else(|| json!({}));

	match fn_name {
		"pick" => {
			let from = args.get("from").and_then(Value::as_str).unwrap_or("outputs");
			let source = lookup_path(scope, from)
				.ok_or_else(|| format!("Pick source {from} does not exist."))?;
			let source = source
				.as_object()
				.ok_or_else(|| format!("Pick source {from} is not an object."))?;
			let keys: Vec<String> = args
				.get("keys")
				.and_then(Value::as_array)
				.map(|keys| {
					keys.iter().filter_map(Value::as_str).map(str::to_string).collect()
				})
				.unwrap_or_default();
			let mut out = Map::new();

			for key in keys {
				if let Some(value) = source.get(&key) {
					out.insert(key, value.clone());
				}
			}

			Ok(Value::Object(out))
		},
		"merge" => {
			let values = args
				.get("values")
				.and_then(Value::as_array)
				.ok_or("Merge transform requires an array of values.")?;
			let mut out = Map::new();

			for value in values {
				let rendered = render_template(value, scope);
				let Value::Object(map) = rendered else {
					return Err("Merge transform values must render to objects.".to_string());
				};

				out.extend(map);
			}

			Ok(Value::Object(out))
		},
		"template" => Ok(render_template(args.get("template").unwrap_or(&Value::Null), scope)),
		other => Err(format!("Unknown transform fn: {other}.")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scope() -> Value {
		json!({
			"inputs": { "city": "Berlin", "days": 3 },
			"outputs": { "step_0": { "result": { "temp": 21.5 }, "ids": ["a", "b"] } }
		})
	}

	#[test]
	fn whole_placeholder_resolves_to_raw_value() {
		let rendered = render_template(&json!("{{inputs.days}}"), &scope());

		assert_eq!(rendered, json!(3));
	}

	#[test]
	fn embedded_placeholder_interpolates_text() {
		let rendered =
			render_template(&json!("forecast for {{inputs.city}}, {{inputs.days}} days"), &scope());

		assert_eq!(rendered, json!("forecast for Berlin, 3 days"));
	}

	#[test]
	fn templates_render_recursively_and_missing_paths_become_null() {
		let rendered = render_template(
			&json!({ "city": "{{inputs.city}}", "nested": ["{{outputs.step_0.ids.1}}", "{{nope}}"] }),
			&scope(),
		);

		assert_eq!(rendered, json!({ "city": "Berlin", "nested": ["b", null] }));
	}

	#[test]
	fn condition_ops_cover_presence_and_equality() {
		let scope = scope();

		assert_eq!(eval_condition(&json!({ "op": "exists", "left": "{{inputs.city}}" }), &scope), Ok(true));
		assert_eq!(eval_condition(&json!({ "op": "exists", "left": "{{inputs.zip}}" }), &scope), Ok(false));
		assert_eq!(
			eval_condition(
				&json!({ "op": "eq", "left": "{{inputs.city}}", "right": "Berlin" }),
				&scope
			),
			Ok(true)
		);
		assert_eq!(
			eval_condition(
				&json!({ "op": "ne", "left": "{{inputs.days}}", "right": 3 }),
				&scope
			),
			Ok(false)
		);
		assert!(eval_condition(&json!({ "op": "between" }), &scope).is_err());
	}

	#[test]
	fn pick_transform_keeps_requested_keys() {
		let out = apply_transform(
			&json!({
				"type": "TRANSFORM",
				"fn": "pick",
				"args": { "from": "outputs.step_0", "keys": ["ids", "missing"] }
			}),
			&scope(),
		)
		.expect("pick failed");

		assert_eq!(out, json!({ "ids": ["a", "b"] }));
	}

	#[test]
	fn merge_transform_combines_rendered_objects() {
		let out = apply_transform(
			&json!({
				"type": "TRANSFORM",
				"fn": "merge",
				"args": { "values": [{ "city": "{{inputs.city}}" }, { "days": "{{inputs.days}}" }] }
			}),
			&scope(),
		)
		.expect("merge failed");

		assert_eq!(out, json!({ "city": "Berlin", "days": 3 }));
	}

	#[test]
	fn unknown_transform_is_an_error() {
		assert!(apply_transform(&json!({ "type": "TRANSFORM", "fn": "explode" }), &scope()).is_err());
	}
}

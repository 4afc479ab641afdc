use std::collections::HashSet;

use time::OffsetDateTime;

use crate::candidate::SubjectKeys;

/// Lower-cased alphanumeric word tokens, deduplicated, insertion order kept.
pub fn tokenize(text: &str) -> Vec<String> {
	let mut normalized = String::with_capacity(text.len());

	for ch in text.chars() {
		if ch.is_alphanumeric() {
			normalized.extend(ch.to_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for token in normalized.split_whitespace() {
		if seen.insert(token.to_string()) {
			out.push(token.to_string());
		}
	}

	out
}

/// Token-overlap keyword score: `|query_terms ∩ text_terms| / |query_terms|`,
/// with the divisor floored at 1 so an empty query scores 0.
pub fn keyword_overlap_score(query: &str, text: &str) -> f32 {
	let query_terms = tokenize(query);
	let text_terms: HashSet<String> = tokenize(text).into_iter().collect();
	let matched = query_terms.iter().filter(|term| text_terms.contains(*term)).count();

	matched as f32 / query_terms.len().max(1) as f32
}

/// Capability/tag/title keyword score for workflow candidates: +0.5 when the
/// query appears verbatim in the title, +0.3 when any query term appears among
/// the capability tags, +0.2 for the free tags, capped at 1.0.
pub fn workflow_keyword_score(
	query: &str,
	title: &str,
	capabilities: &[String],
	tags: &[String],
) -> f32 {
	let query_lower = query.trim().to_lowercase();
	let terms = tokenize(query);
	let mut score: f32 = 0.0;

	if !query_lower.is_empty() && title.to_lowercase().contains(&query_lower) {
		score += 0.5;
	}

	let capabilities_text = capabilities.join(" ").to_lowercase();
	if terms.iter().any(|term| capabilities_text.contains(term.as_str())) {
		score += 0.3;
	}

	let tags_text = tags.join(" ").to_lowercase();
	if terms.iter().any(|term| tags_text.contains(term.as_str())) {
		score += 0.2;
	}

	score.min(1.0)
}

/// Remaining-validity score for a cached result: the fraction of the horizon
/// still ahead of `now`, clamped to [0, 1]. An already-expired deadline is 0.
pub fn freshness_score(
	fresh_until: OffsetDateTime,
	now: OffsetDateTime,
	horizon_seconds: i64,
) -> f32 {
	let remaining = (fresh_until - now).whole_seconds();

	if remaining <= 0 {
		return 0.0;
	}

	(remaining as f32 / horizon_seconds.max(1) as f32).min(1.0)
}

/// Subject-key affinity between a stored result and the requesting context.
/// Each dimension recorded on both sides contributes equally; a result with no
/// recorded subject keys scores a neutral 0.5.
pub fn subject_key_score(
	keys: &SubjectKeys,
	user_id: Option<&str>,
	entity_ids: &[String],
) -> f32 {
	if keys.is_empty() {
		return 0.5;
	}

	let mut total = 0_u32;
	let mut matches = 0_u32;

	if let Some(stored) = keys.user_id.as_deref()
		&& let Some(requested) = user_id
	{
		total += 1;

		if stored == requested {
			matches += 1;
		}
	}
	if !keys.entity_ids.is_empty() && !entity_ids.is_empty() {
		total += 1;

		if keys.entity_ids.iter().any(|id| entity_ids.contains(id)) {
			matches += 1;
		}
	}

	if total == 0 {
		return 0.5;
	}

	matches as f32 / total as f32
}

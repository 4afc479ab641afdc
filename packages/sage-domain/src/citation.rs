use crate::candidate::ResourceKind;

/// Builds a citation URI: `{scheme}://{resource_id}` plus an optional
/// `#fragment`. The scheme is the lower-cased resource kind.
pub fn citation_uri(kind: ResourceKind, resource_id: &str, fragment: Option<&str>) -> String {
	match fragment {
		Some(fragment) => format!("{}://{resource_id}#{fragment}", kind.scheme()),
		None => format!("{}://{resource_id}", kind.scheme()),
	}
}

/// Recovers the originating resource id from a citation URI by stripping the
/// scheme and any fragment. Returns `None` for text that is not a citation URI.
pub fn resource_id_from_uri(uri: &str) -> Option<&str> {
	let (scheme, rest) = uri.split_once("://")?;

	if ResourceKind::parse(&scheme.to_uppercase()).is_none() {
		return None;
	}

	let id = rest.split('#').next().unwrap_or(rest);

	if id.is_empty() { None } else { Some(id) }
}

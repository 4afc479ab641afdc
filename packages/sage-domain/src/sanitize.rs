const IMPERATIVE_PREFIXES: [&str; 4] = ["execute", "run", "call", "invoke"];

/// Strips imperative lines from evidence content before it reaches answer
/// generation, so retrieved text cannot smuggle instructions into the prompt.
pub fn sanitize_evidence(content: &str) -> String {
	content
		.lines()
		.filter(|line| {
			let lowered = line.trim().to_lowercase();

			!IMPERATIVE_PREFIXES.iter().any(|prefix| lowered.starts_with(prefix))
		})
		.collect::<Vec<_>>()
		.join("\n")
}

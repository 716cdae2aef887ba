use std::collections::HashSet;

use tracing::{debug, warn};

use crate::{GenerationRequest, TextGenerator};
use recall_config::QueryExpansionConfig;

pub fn build_expansion_prompt(query: &str, num_expansions: u32) -> String {
	format!(
		"Rewrite the search query below into {num_expansions} alternative phrasings that keep \
its intent but vary wording, so a semantic search can find related passages.\n\
Reply with one phrasing per line. Do not number the lines, repeat the original query, \
or add commentary.\n\nQuery: {query}"
	)
}

/// Returns the queries to search with: the original first, then at most `num_expansions`
/// distinct phrasings. Never fails; any generator problem yields `[query]`.
pub async fn expand_query(
	generator: Option<&dyn TextGenerator>,
	cfg: &QueryExpansionConfig,
	query: &str,
) -> Vec<String> {
	if !cfg.enabled {
		return vec![query.to_string()];
	}

	let Some(generator) = generator else {
		warn!("Text generator not configured; skipping query expansion.");

		return vec![query.to_string()];
	};
	let request = GenerationRequest {
		model: cfg.model.clone(),
		max_tokens: cfg.max_tokens,
		prompt: build_expansion_prompt(query, cfg.num_expansions),
	};
	let raw = match generator.generate(&request).await {
		Ok(raw) => raw,
		Err(err) => {
			warn!(error = %err, "Query expansion failed; falling back to original query.");

			return vec![query.to_string()];
		},
	};
	let queries = parse_expansions(&raw, query, cfg.num_expansions);

	if queries.len() == 1 {
		warn!("Query expansion returned no usable phrasings; falling back to original query.");
	} else {
		debug!(expanded = ?queries, "Expanded query.");
	}

	queries
}

pub fn parse_expansions(raw: &str, original: &str, num_expansions: u32) -> Vec<String> {
	let mut out = Vec::new();
	let mut seen = HashSet::new();

	push_query(&mut out, &mut seen, original);

	for line in raw.lines() {
		if out.len() > num_expansions as usize {
			break;
		}

		push_query(&mut out, &mut seen, clean_line(line));
	}

	if out.is_empty() {
		out.push(original.to_string());
	}

	out
}

fn push_query(out: &mut Vec<String>, seen: &mut HashSet<String>, value: &str) {
	let trimmed = value.trim();

	if trimmed.is_empty() {
		return;
	}

	let key = trimmed.to_lowercase();

	if seen.insert(key) {
		out.push(trimmed.to_string());
	}
}

// Strips list markers and wrapping quotes.
fn clean_line(line: &str) -> &str {
	let mut text = line.trim();

	if let Some(rest) = text.strip_prefix(['-', '*', '•']) {
		text = rest.trim_start();
	} else {
		let digits = text.bytes().take_while(u8::is_ascii_digit).count();

		if digits > 0
			&& let Some(rest) = text[digits..].strip_prefix(['.', ')'])
		{
			text = rest.trim_start();
		}
	}

	text.trim_matches(['"', '\'', '“', '”', '`']).trim()
}

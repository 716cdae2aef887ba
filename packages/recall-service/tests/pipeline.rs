mod common;

use std::sync::Arc;

use recall_config::{QueryExpansionConfig, RankingConfig};
use recall_domain::{FragmentFilter, FragmentPosition, RankedResult, ScoreKind, channel_namespace};
use recall_service::{
	Capabilities, Error, RetrieveRequest,
	memory::{MemoryFragmentStore, MemoryKeywordIndex, MemoryVectorIndex},
};

use common::*;

fn python_store() -> MemoryFragmentStore {
	let store = MemoryFragmentStore::new();

	store.insert(fragment(1, "A: list comprehensions are concise."));
	store.insert(fragment(2, "B: build lists with [x for x in xs]."));

	store
}

#[tokio::test]
async fn consensus_across_expansions_beats_single_strong_hit() {
	let index = Arc::new(
		ScriptedIndex::new()
			.with_query("python list comprehension", vec![(id(1), 0.9), (id(2), 0.6)])
			.with_query("python list syntax", vec![(id(2), 0.8)]),
	);
	let generator = Arc::new(ScriptedGenerator::replying("python list syntax"));
	let capabilities =
		Capabilities::new(index, Arc::new(python_store())).with_generator(generator.clone());
	let engine = engine(quiet_ranking(), QueryExpansionConfig::default(), capabilities);
	let results = engine
		.retrieve(RetrieveRequest::new("python list comprehension", channel()))
		.await
		.expect("Retrieval should succeed.");

	assert_eq!(ids(&results), vec![id(2), id(1)]);
	assert!((results[0].score - 0.98).abs() < 1e-5);
	assert!((results[1].score - 0.63).abs() < 1e-5);
	assert!(results.iter().all(|result| result.score_kind == ScoreKind::Fused));
	assert_eq!(generator.count(), 1);
}

#[tokio::test]
async fn blank_query_makes_no_external_calls() {
	let index = Arc::new(ScriptedIndex::new());
	let generator = Arc::new(ScriptedGenerator::replying("anything"));
	let capabilities = Capabilities::new(index.clone(), Arc::new(python_store()))
		.with_generator(generator.clone());
	let engine = engine(RankingConfig::default(), QueryExpansionConfig::default(), capabilities);

	for query in ["", "   \n\t"] {
		let results = engine
			.retrieve(RetrieveRequest::new(query, channel()))
			.await
			.expect("Blank query should not error.");

		assert!(results.is_empty());
	}

	assert_eq!(index.calls(), 0);
	assert_eq!(generator.count(), 0);
}

#[tokio::test]
async fn searches_only_the_channel_namespace() {
	let index = Arc::new(ScriptedIndex::new().with_query("hooks", vec![(id(1), 0.5)]));
	let capabilities = Capabilities::new(index.clone(), Arc::new(python_store()));
	let engine = engine(quiet_ranking(), no_expansion(), capabilities);

	engine.retrieve(RetrieveRequest::new("hooks", channel())).await.expect("Retrieval failed.");

	let namespaces = index.namespaces.lock().expect("Lock poisoned.").clone();

	assert_eq!(namespaces, vec![channel_namespace(channel())]);
}

#[tokio::test]
async fn unresolvable_candidates_never_surface() {
	let index = Arc::new(
		ScriptedIndex::new().with_query("q", vec![(id(99), 0.99), (id(1), 0.5), (id(2), 0.4)]),
	);
	let capabilities = Capabilities::new(index, Arc::new(python_store()));
	let engine = engine(quiet_ranking(), no_expansion(), capabilities);
	let results =
		engine.retrieve(RetrieveRequest::new("q", channel())).await.expect("Retrieval failed.");

	assert_eq!(ids(&results), vec![id(1), id(2)]);
}

#[tokio::test]
async fn store_failure_yields_empty_results() {
	let index = Arc::new(ScriptedIndex::new().with_query("q", vec![(id(1), 0.5)]));
	let capabilities = Capabilities::new(index, Arc::new(FailingStore));
	let engine = engine(quiet_ranking(), no_expansion(), capabilities);
	let results =
		engine.retrieve(RetrieveRequest::new("q", channel())).await.expect("Retrieval failed.");

	assert!(results.is_empty());
}

#[tokio::test]
async fn one_failing_expansion_does_not_sink_the_rest() {
	let index = Arc::new(
		ScriptedIndex::new()
			.with_query("q", vec![(id(1), 0.5)])
			.with_query("q two", vec![(id(2), 0.9)])
			.with_failing_query("q three"),
	);
	let generator = Arc::new(ScriptedGenerator::replying("q two\nq three"));
	let capabilities =
		Capabilities::new(index, Arc::new(python_store())).with_generator(generator);
	let engine = engine(quiet_ranking(), QueryExpansionConfig::default(), capabilities);
	let results =
		engine.retrieve(RetrieveRequest::new("q", channel())).await.expect("Retrieval failed.");

	assert_eq!(ids(&results), vec![id(2), id(1)]);
}

#[tokio::test]
async fn expansion_failure_falls_back_to_original_query() {
	let index = Arc::new(ScriptedIndex::new().with_query("q", vec![(id(1), 0.5)]));
	let generator = Arc::new(ScriptedGenerator::failing("rate limited"));
	let capabilities =
		Capabilities::new(index.clone(), Arc::new(python_store())).with_generator(generator.clone());
	let engine = engine(quiet_ranking(), QueryExpansionConfig::default(), capabilities);
	let results =
		engine.retrieve(RetrieveRequest::new("q", channel())).await.expect("Retrieval failed.");

	assert_eq!(ids(&results), vec![id(1)]);
	assert_eq!(generator.count(), 1);
	assert_eq!(index.query_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expansion_request_uses_configured_model_and_budget() {
	let index = Arc::new(ScriptedIndex::new().with_query("q", vec![]));
	let generator = Arc::new(ScriptedGenerator::replying(""));
	let capabilities =
		Capabilities::new(index, Arc::new(python_store())).with_generator(generator.clone());
	let expansion = QueryExpansionConfig {
		num_expansions: 3,
		model: "small-model".to_string(),
		max_tokens: 64,
		..QueryExpansionConfig::default()
	};
	let engine = engine(quiet_ranking(), expansion, capabilities);

	engine.retrieve(RetrieveRequest::new("q", channel())).await.expect("Retrieval failed.");

	let requests = generator.requests.lock().expect("Lock poisoned.").clone();

	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].model, "small-model");
	assert_eq!(requests[0].max_tokens, 64);
	assert!(requests[0].prompt.contains("3 alternative phrasings"));
}

#[tokio::test]
async fn min_similarity_ignores_weak_hits() {
	let index = Arc::new(ScriptedIndex::new().with_query("q", vec![(id(1), 0.9), (id(2), 0.2)]));
	let capabilities = Capabilities::new(index, Arc::new(python_store()));
	let ranking = RankingConfig { min_similarity: 0.5, ..quiet_ranking() };
	let engine = engine(ranking, no_expansion(), capabilities);
	let results =
		engine.retrieve(RetrieveRequest::new("q", channel())).await.expect("Retrieval failed.");

	assert_eq!(ids(&results), vec![id(1)]);
}

#[tokio::test]
async fn top_k_bounds_every_stage() {
	let hits = (1..=8).map(|n| (id(n), 1.0 - n as f32 * 0.1)).collect();
	let index = Arc::new(ScriptedIndex::new().with_query("q", hits));
	let store = MemoryFragmentStore::new();

	for n in 1..=8 {
		store.insert(fragment(n, &format!("fragment {n}")));
	}

	let capabilities = Capabilities::new(index, Arc::new(store));
	let engine = engine(quiet_ranking(), no_expansion(), capabilities);
	let defaulted =
		engine.retrieve(RetrieveRequest::new("q", channel())).await.expect("Retrieval failed.");
	let explicit = engine
		.retrieve(RetrieveRequest { top_k: Some(2), ..RetrieveRequest::new("q", channel()) })
		.await
		.expect("Retrieval failed.");

	assert_eq!(defaulted.len(), 5);
	assert_eq!(ids(&explicit), vec![id(1), id(2)]);
}

#[tokio::test]
async fn filters_reach_the_store() {
	let index = Arc::new(ScriptedIndex::new().with_query("q", vec![(id(1), 0.9), (id(2), 0.8)]));
	let memory = MemoryFragmentStore::new();
	let mut hook = fragment(1, "Hook.");

	hook.position = FragmentPosition::Hook;
	hook.performance_score = Some(0.9);

	memory.insert(hook);
	memory.insert(fragment(2, "Body."));

	let store = Arc::new(RecordingStore::new(memory));
	let capabilities = Capabilities::new(index, store.clone());
	let engine = engine(quiet_ranking(), no_expansion(), capabilities);
	let request =
		RetrieveRequest { filter: FragmentFilter::hooks(0.5), ..RetrieveRequest::new("q", channel()) };
	let results = engine.retrieve(request).await.expect("Retrieval failed.");

	assert_eq!(ids(&results), vec![id(1)]);
	assert_eq!(store.last_filter(), Some(FragmentFilter::hooks(0.5)));
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
	let index = Arc::new(ScriptedIndex::new());
	let capabilities = Capabilities::new(index.clone(), Arc::new(python_store()));
	let engine = engine(quiet_ranking(), no_expansion(), capabilities);
	let base = || RetrieveRequest::new("q", channel());
	let requests = vec![
		RetrieveRequest { top_k: Some(0), ..base() },
		RetrieveRequest { filter: FragmentFilter::high_performers(1.5), ..base() },
		RetrieveRequest { filter: FragmentFilter::high_performers(f32::NAN), ..base() },
		RetrieveRequest {
			filter: FragmentFilter { content_types: Some(Vec::new()), ..FragmentFilter::default() },
			..base()
		},
		RetrieveRequest { mmr_lambda: Some(-0.1), ..base() },
	];

	for request in requests {
		let err = engine.retrieve(request).await.expect_err("Request should be rejected.");

		assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
	}

	assert_eq!(index.calls(), 0);
}

#[tokio::test]
async fn invalid_config_is_rejected_at_construction() {
	let capabilities = Capabilities::new(Arc::new(ScriptedIndex::new()), Arc::new(python_store()));
	let ranking = RankingConfig { mmr_lambda: 1.5, ..RankingConfig::default() };
	let err = recall_service::RetrievalEngine::new(
		ranking,
		QueryExpansionConfig::default(),
		recall_config::Facade::default(),
		capabilities,
	)
	.err()
	.expect("Out-of-range lambda must be rejected.");

	assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[tokio::test]
async fn keyword_channel_adds_weighted_scores() {
	let index = Arc::new(ScriptedIndex::new().with_query("list syntax", vec![(id(1), 0.5), (id(2), 0.5)]));
	let keywords = Arc::new(MemoryKeywordIndex::new());
	let store = python_store();

	keywords.insert(&fragment(2, "list syntax explained"));
	keywords.insert(&fragment(1, "nothing relevant"));

	let capabilities = Capabilities::new(index.clone(), Arc::new(store)).with_keywords(keywords.clone());
	let engine = engine(quiet_ranking(), no_expansion(), capabilities);
	let results = engine
		.retrieve(RetrieveRequest::new("list syntax", channel()))
		.await
		.expect("Retrieval failed.");

	assert_eq!(ids(&results), vec![id(2), id(1)]);
	assert!((results[0].fused_score - (0.7 * 0.5 + 0.3 * 1.0)).abs() < 1e-5);
	assert!((results[1].fused_score - 0.35).abs() < 1e-5);

	let disabled = engine_without_keyword_weight(index, keywords).await;

	assert!((disabled[0].fused_score - 0.35).abs() < 1e-5);
}

async fn engine_without_keyword_weight(
	index: Arc<ScriptedIndex>,
	keywords: Arc<MemoryKeywordIndex>,
) -> Vec<RankedResult> {
	let capabilities = Capabilities::new(index, Arc::new(python_store())).with_keywords(keywords);
	let ranking = RankingConfig { keyword_weight: 0.0, ..quiet_ranking() };

	engine(ranking, no_expansion(), capabilities)
		.retrieve(RetrieveRequest::new("list syntax", channel()))
		.await
		.expect("Retrieval failed.")
}

#[tokio::test]
async fn full_pipeline_with_memory_backends_reranks_and_diversifies() {
	let vectors = Arc::new(MemoryVectorIndex::new(4));
	let store = MemoryFragmentStore::new();
	let texts = [
		(1, "rust ownership explained", vec![1.0, 0.0, 0.0, 0.0]),
		(2, "rust ownership explained again", vec![1.0, 0.0, 0.0, 0.0]),
		(3, "borrow checker tour", vec![0.6, 0.8, 0.0, 0.0]),
	];

	vectors.pin_embedding("rust ownership", vec![1.0, 0.0, 0.0, 0.0]);

	for (n, text, embedding) in texts {
		let mut item = fragment(n, text);

		item.embedding = Some(embedding);
		vectors.upsert_fragment(&item);
		store.insert(item);
	}

	let encoder = Arc::new(TableEncoder {
		scores: [
			("rust ownership explained".to_string(), 0.9),
			("rust ownership explained again".to_string(), 0.85),
			("borrow checker tour".to_string(), 0.4),
		]
		.into_iter()
		.collect(),
	});
	let loader = Arc::new(CountingLoader::new(encoder));
	let capabilities =
		Capabilities::new(vectors, Arc::new(store)).with_cross_encoders(loader.clone());
	let ranking = RankingConfig { mmr_lambda: 0.3, ..RankingConfig::default() };
	let engine = engine(ranking, no_expansion(), capabilities);
	let results = engine
		.retrieve(RetrieveRequest::new("rust ownership", channel()))
		.await
		.expect("Retrieval failed.");

	// The near-duplicate of the best hit drops behind the distinct fragment once redundancy counts.
	assert_eq!(ids(&results), vec![id(1), id(3), id(2)]);
	assert!(results.iter().all(|result| result.score_kind == ScoreKind::Mmr));
	assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
	assert_eq!(loader.count(), 1);

	let json = serde_json::to_value(&results).expect("Results should serialize.");

	assert!(json[0]["fragment"].get("embedding").is_none());
}

fn unit(slot: usize) -> Vec<f32> {
	let mut vector = vec![0.0; 16];

	vector[slot] = 1.0;

	vector
}

struct StagedFixture {
	capabilities: Capabilities,
	loader: Arc<CountingLoader>,
}

// Three embedded fragments whose cross-encoder scores invert the fused order.
fn staged_fixture() -> StagedFixture {
	let index = Arc::new(
		ScriptedIndex::new()
			.with_query("ownership", vec![(id(1), 0.9), (id(2), 0.8), (id(3), 0.7)]),
	);
	let store = MemoryFragmentStore::new();

	for (n, slot) in [(1, 0), (2, 0), (3, 1)] {
		let mut item = fragment(n, &format!("fragment {n}"));

		item.embedding = Some(unit(slot));
		store.insert(item);
	}

	let encoder = Arc::new(TableEncoder {
		scores: [("fragment 1", 0.1), ("fragment 2", 0.5), ("fragment 3", 0.9)]
			.into_iter()
			.map(|(text, score)| (text.to_string(), score))
			.collect(),
	});
	let loader = Arc::new(CountingLoader::new(encoder));
	let capabilities = Capabilities::new(index, Arc::new(store)).with_cross_encoders(loader.clone());

	StagedFixture { capabilities, loader }
}

fn assert_fused_identity(results: &[RankedResult]) {
	assert_eq!(ids(results), vec![id(1), id(2), id(3)]);
	assert!(results.iter().all(|result| result.score_kind == ScoreKind::Fused));
	assert!(results.iter().all(|result| result.score == result.fused_score));
	assert!(results.iter().all(|result| result.mmr_score.is_none()));
	assert!((results[0].score - 0.63).abs() < 1e-5);
}

#[tokio::test]
async fn disabled_stages_leave_fused_order_untouched() {
	let fx = staged_fixture();
	let engine = engine(quiet_ranking(), no_expansion(), fx.capabilities);
	let results = engine
		.retrieve(RetrieveRequest::new("ownership", channel()))
		.await
		.expect("Retrieval failed.");

	assert_fused_identity(&results);
	assert_eq!(fx.loader.count(), 0);
	assert!(!engine.reranker().is_loaded());
}

#[tokio::test]
async fn per_call_opt_outs_skip_enabled_stages() {
	let fx = staged_fixture();
	let engine = engine(RankingConfig::default(), no_expansion(), fx.capabilities);
	let skipped = engine
		.retrieve(RetrieveRequest {
			rerank: false,
			diversify: false,
			..RetrieveRequest::new("ownership", channel())
		})
		.await
		.expect("Retrieval failed.");

	assert_fused_identity(&skipped);
	assert_eq!(fx.loader.count(), 0);

	let reranked = engine
		.retrieve(RetrieveRequest { diversify: false, ..RetrieveRequest::new("ownership", channel()) })
		.await
		.expect("Retrieval failed.");

	assert_eq!(ids(&reranked), vec![id(3), id(2), id(1)]);
	assert!(reranked.iter().all(|result| result.score_kind == ScoreKind::Rerank));
	assert_eq!(fx.loader.count(), 1);
}

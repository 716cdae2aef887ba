use std::sync::LazyLock;

use regex::Regex;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db, models::FragmentRow};
use recall_domain::{Fragment, FragmentFilter};

const FRAGMENT_COLUMNS: &str = "\
fragment_id, channel_id, text, content_type, position, is_opinion, is_example, is_analogy, \
performance_score, embedding, created_at";

static KEYWORD_TERM: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"[\p{Alphabetic}\p{Nd}_]+").ok());

/// Loads the fragments of `channel_id` among `ids` that satisfy `filter`. Order is unspecified;
/// unknown ids and rows that fail the filter are simply absent.
pub async fn load_fragments(
	db: &Db,
	channel_id: Uuid,
	ids: &[Uuid],
	filter: &FragmentFilter,
) -> Result<Vec<Fragment>> {
	if ids.is_empty() {
		return Ok(Vec::new());
	}

	let mut builder = QueryBuilder::<Postgres>::new(format!(
		"SELECT {FRAGMENT_COLUMNS} FROM content_fragments WHERE channel_id = "
	));

	builder.push_bind(channel_id);
	builder.push(" AND fragment_id = ANY(");
	builder.push_bind(ids.to_vec());
	builder.push(")");

	push_filter(&mut builder, filter);

	let rows: Vec<FragmentRow> = builder.build_query_as().fetch_all(&db.pool).await?;
	let mut out = Vec::with_capacity(rows.len());

	for row in rows {
		let fragment_id = row.fragment_id;

		match Fragment::try_from(row) {
			Ok(fragment) => out.push(fragment),
			Err(err) => {
				tracing::warn!(error = %err, fragment_id = %fragment_id, "Skipping invalid fragment row.");
			},
		}
	}

	Ok(out)
}

pub fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &FragmentFilter) {
	if let Some(types) = filter.content_types.as_ref() {
		builder.push(" AND content_type = ANY(");
		builder.push_bind(types.clone());
		builder.push(")");
	}
	if let Some(position) = filter.position {
		builder.push(" AND position = ");
		builder.push_bind(position.as_str());
	}
	if let Some(min) = filter.min_performance {
		builder.push(" AND performance_score >= ");
		builder.push_bind(min);
	}
	if let Some(flag) = filter.is_opinion {
		builder.push(" AND is_opinion = ");
		builder.push_bind(flag);
	}
	if let Some(flag) = filter.is_example {
		builder.push(" AND is_example = ");
		builder.push_bind(flag);
	}
}

/// Full-text search over fragment text, ranked by `ts_rank_cd`. Any term may match.
pub async fn keyword_search(
	db: &Db,
	channel_id: Uuid,
	query: &str,
	top_k: u32,
	since: Option<OffsetDateTime>,
) -> Result<Vec<(Uuid, f32)>> {
	let Some(tsquery) = keyword_tsquery(query) else {
		return Ok(Vec::new());
	};
	let rows: Vec<(Uuid, f32)> = sqlx::query_as(
		"\
SELECT
	fragment_id,
	ts_rank_cd(text_tsv, to_tsquery('simple', $1))::real AS score
FROM content_fragments
WHERE channel_id = $2
	AND text_tsv @@ to_tsquery('simple', $1)
	AND ($3::timestamptz IS NULL OR created_at >= $3)
ORDER BY score DESC, fragment_id
LIMIT $4",
	)
	.bind(tsquery.as_str())
	.bind(channel_id)
	.bind(since)
	.bind(i64::from(top_k))
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn insert_fragment(db: &Db, fragment: &Fragment) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO content_fragments (
	fragment_id,
	channel_id,
	text,
	content_type,
	position,
	is_opinion,
	is_example,
	is_analogy,
	performance_score,
	embedding,
	created_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
ON CONFLICT (fragment_id) DO UPDATE
SET
	text = EXCLUDED.text,
	content_type = EXCLUDED.content_type,
	position = EXCLUDED.position,
	is_opinion = EXCLUDED.is_opinion,
	is_example = EXCLUDED.is_example,
	is_analogy = EXCLUDED.is_analogy,
	performance_score = EXCLUDED.performance_score,
	embedding = EXCLUDED.embedding",
	)
	.bind(fragment.fragment_id)
	.bind(fragment.channel_id)
	.bind(fragment.text.as_str())
	.bind(fragment.content_type.as_str())
	.bind(fragment.position.as_str())
	.bind(fragment.is_opinion)
	.bind(fragment.is_example)
	.bind(fragment.is_analogy)
	.bind(fragment.performance_score)
	.bind(fragment.embedding.as_deref())
	.bind(fragment.created_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Turns free text into an OR query over its terms, or `None` when nothing searchable is left.
pub fn keyword_tsquery(query: &str) -> Option<String> {
	let pattern = KEYWORD_TERM.as_ref()?;
	let terms: Vec<String> =
		pattern.find_iter(query).map(|term| term.as_str().to_lowercase()).collect();

	if terms.is_empty() {
		return None;
	}

	Some(terms.join(" | "))
}

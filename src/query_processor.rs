//! # Query processor
//!
//! The core of the query pipeline: check the response cache, embed the
//! query, search the vector store, assemble a bounded context, call the
//! LLM, apply the confidence-gated citation filter, paginate, and cache
//! the result.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{query_response_key, Cache};
use crate::embedding::Embedder;
use crate::error::AppError;
use crate::llm::LlmClient;
use crate::vector_store::{SearchMatch, VectorStore};

/// Context assembled from retrieved matches is capped at 8000 tokens,
/// approximated as 4 characters per token.
pub const MAX_CONTEXT_CHARS: usize = 32_000;

/// Sources below this cosine score are never surfaced, regardless of
/// the confidence gate outcome.
pub const MIN_SIMILARITY_SCORE: f32 = 0.15;

const SEPARATOR: &str = "\n\n";
const MIN_TRUNCATION_CHARS: usize = 100;

/// A source annotated with whether the LLM cited it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub document_id: Uuid,
    pub score: f32,
    pub version: i64,
    pub cited: bool,
}

/// Pagination metadata, present only when there is more than one page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// The response returned to callers and cached verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub confidence: f32,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// A single incoming query request.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: usize,
    pub page: usize,
    pub page_size: usize,
}

pub struct QueryProcessor {
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LlmClient>,
    pub cache: Arc<dyn Cache>,
    pub cache_ttl: Duration,
}

impl QueryProcessor {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
        cache: Arc<dyn Cache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            vector_store,
            embedder,
            llm,
            cache,
            cache_ttl,
        }
    }

    pub async fn process_query(&self, request: &QueryRequest) -> Result<QueryResponse, AppError> {
        let cache_key = query_response_key(&request.query, request.top_k);
        if let Some(cached) = crate::cache::get_json::<QueryResponse>(&*self.cache, &cache_key).await
        {
            return Ok(cached);
        }

        let embedding = self.embedder.embed_one(&request.query).await?;
        let mut matches = self
            .vector_store
            .search(&embedding, request.top_k, None)
            .await?;

        if matches.is_empty() {
            return Ok(QueryResponse {
                answer: "I couldn't find relevant information to answer your question."
                    .to_string(),
                sources: Vec::new(),
                confidence: 0.0,
                is_complete: false,
                pagination: None,
            });
        }

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let used_matches = assemble_context(&matches, MAX_CONTEXT_CHARS);
        let context = used_matches
            .iter()
            .map(|(m, slice)| slice.unwrap_or(&m.content))
            .collect::<Vec<_>>()
            .join(SEPARATOR);

        let document_ids: Vec<Uuid> = used_matches.iter().map(|(m, _)| m.document_id).collect();
        let answer = self
            .llm
            .generate_structured(&request.query, &context, &document_ids)
            .await?;

        let sources: Vec<Source> = used_matches
            .iter()
            .map(|(m, _)| Source {
                document_id: m.document_id,
                score: m.score,
                version: m.version,
                cited: answer
                    .citations
                    .iter()
                    .any(|c| c == &m.document_id.to_string()),
            })
            .collect();

        let filtered = filter_sources(&sources, answer.confidence, answer.is_complete);
        let (page_sources, pagination) =
            paginate(&filtered, request.page, request.page_size);

        let response = QueryResponse {
            answer: answer.answer,
            sources: page_sources,
            confidence: answer.confidence,
            is_complete: answer.is_complete,
            pagination,
        };

        crate::cache::set_json(&*self.cache, &cache_key, &response, self.cache_ttl).await?;

        Ok(response)
    }
}

/// Walk `matches` in order, greedily packing content into at most
/// `max_chars` characters (including the 2-char separator between
/// entries). If the next match doesn't fit whole, include a prefix when
/// the remaining space exceeds [`MIN_TRUNCATION_CHARS`]; otherwise stop.
/// Returns the matches consumed, each paired with an optional truncated
/// slice (`None` means the full content was used).
fn assemble_context<'a>(
    matches: &'a [SearchMatch],
    max_chars: usize,
) -> Vec<(&'a SearchMatch, Option<&'a str>)> {
    let mut used = Vec::new();
    let mut total = 0usize;

    for m in matches {
        let sep_len = if used.is_empty() { 0 } else { SEPARATOR.len() };
        let content_len = m.content.chars().count();

        if total + sep_len + content_len <= max_chars {
            used.push((m, None));
            total += sep_len + content_len;
            continue;
        }

        let remaining = max_chars.saturating_sub(total + sep_len);
        if remaining > MIN_TRUNCATION_CHARS {
            let prefix_end = m
                .content
                .char_indices()
                .nth(remaining)
                .map(|(idx, _)| idx)
                .unwrap_or(m.content.len());
            used.push((m, Some(&m.content[..prefix_end])));
        }
        break;
    }

    used
}

/// The confidence-gated citation policy: low or incomplete answers keep
/// only cited, high-scoring sources; zero confidence keeps none; anything
/// else keeps every source above the similarity floor.
fn filter_sources(sources: &[Source], confidence: f32, is_complete: bool) -> Vec<Source> {
    if confidence == 0.0 {
        return Vec::new();
    }
    if confidence < 0.3 || !is_complete {
        return sources
            .iter()
            .filter(|s| s.cited && s.score >= MIN_SIMILARITY_SCORE)
            .cloned()
            .collect();
    }
    sources
        .iter()
        .filter(|s| s.score >= MIN_SIMILARITY_SCORE)
        .cloned()
        .collect()
}

/// Slice `sources` to page `page` (1-indexed) of `page_size`, returning
/// pagination metadata only when there's more than one page.
fn paginate(
    sources: &[Source],
    page: usize,
    page_size: usize,
) -> (Vec<Source>, Option<Pagination>) {
    let total = sources.len();
    let start = (page.saturating_sub(1)) * page_size;
    let end = (start + page_size).min(total);
    let page_sources = if start >= total {
        Vec::new()
    } else {
        sources[start..end].to_vec()
    };

    if total <= page_size {
        return (page_sources, None);
    }

    let total_pages = total.div_ceil(page_size);
    let pagination = Pagination {
        page,
        page_size,
        total,
        total_pages,
        has_next: page * page_size < total,
        has_prev: page > 1,
    };
    (page_sources, Some(pagination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fake::FakeCache;
    use crate::embedding::fake::FakeEmbedder;
    use crate::llm::fake::FakeLlmClient;
    use crate::llm::StructuredAnswer;
    use crate::vector_store::fake::FakeVectorStore;
    use crate::vector_store::VectorPoint;

    fn make_match(document_id: Uuid, content: &str, score: f32) -> SearchMatch {
        SearchMatch {
            id: Uuid::new_v4(),
            document_id,
            content: content.to_string(),
            score,
            version: 1,
        }
    }

    #[test]
    fn context_truncates_when_it_would_overflow() {
        let a = make_match(Uuid::new_v4(), &"a".repeat(120), 0.9);
        let b = make_match(Uuid::new_v4(), &"b".repeat(120), 0.8);
        let c = make_match(Uuid::new_v4(), &"c".repeat(120), 0.7);
        let d = make_match(Uuid::new_v4(), &"d".repeat(120), 0.6);
        let matches = vec![a, b, c, d];

        let used = assemble_context(&matches, 300);
        assert_eq!(used.len(), 2);
        assert!(used.iter().all(|(_, slice)| slice.is_none()));
    }

    #[test]
    fn context_includes_partial_prefix_when_space_remains() {
        let a = make_match(Uuid::new_v4(), &"a".repeat(50), 0.9);
        let b = make_match(Uuid::new_v4(), &"b".repeat(500), 0.8);
        let matches = vec![a, b];

        let used = assemble_context(&matches, 200);
        assert_eq!(used.len(), 2);
        assert!(used[0].1.is_none());
        let truncated = used[1].1.expect("second match should be truncated");
        assert!(truncated.len() < 500);
    }

    #[test]
    fn zero_confidence_drops_all_sources() {
        let sources = vec![Source {
            document_id: Uuid::new_v4(),
            score: 0.9,
            version: 1,
            cited: true,
        }];
        assert!(filter_sources(&sources, 0.0, true).is_empty());
    }

    #[test]
    fn low_confidence_keeps_only_cited_above_floor() {
        let d1 = Uuid::new_v4();
        let d2 = Uuid::new_v4();
        let d3 = Uuid::new_v4();
        let sources = vec![
            Source { document_id: d1, score: 0.5, version: 1, cited: true },
            Source { document_id: d2, score: 0.4, version: 1, cited: false },
            Source { document_id: d3, score: 0.1, version: 1, cited: true },
        ];
        let filtered = filter_sources(&sources, 0.2, true);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].document_id, d1);
    }

    #[test]
    fn incomplete_answer_is_treated_like_low_confidence() {
        let d1 = Uuid::new_v4();
        let sources = vec![Source { document_id: d1, score: 0.5, version: 1, cited: true }];
        let filtered = filter_sources(&sources, 0.9, false);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn high_confidence_keeps_all_above_floor_regardless_of_citation() {
        let d1 = Uuid::new_v4();
        let d2 = Uuid::new_v4();
        let sources = vec![
            Source { document_id: d1, score: 0.5, version: 1, cited: true },
            Source { document_id: d2, score: 0.4, version: 1, cited: false },
        ];
        let filtered = filter_sources(&sources, 0.9, true);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn pagination_omits_metadata_when_everything_fits_on_one_page() {
        let sources = vec![Source { document_id: Uuid::new_v4(), score: 0.9, version: 1, cited: true }];
        let (page, meta) = paginate(&sources, 1, 5);
        assert_eq!(page.len(), 1);
        assert!(meta.is_none());
    }

    #[test]
    fn pagination_computes_has_next_and_has_prev() {
        let sources: Vec<Source> = (0..7)
            .map(|_| Source { document_id: Uuid::new_v4(), score: 0.9, version: 1, cited: true })
            .collect();
        let (page, meta) = paginate(&sources, 2, 3);
        assert_eq!(page.len(), 3);
        let meta = meta.unwrap();
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_prev);
    }

    #[tokio::test]
    async fn empty_search_returns_canned_response_without_caching() {
        let cache = FakeCache::new();
        let processor = QueryProcessor::new(
            Arc::new(FakeVectorStore::new()),
            Arc::new(FakeEmbedder::default()),
            Arc::new(FakeLlmClient::default()),
            Arc::new(cache.clone()),
            Duration::from_secs(60),
        );
        let request = QueryRequest {
            query: "anything".to_string(),
            top_k: 5,
            page: 1,
            page_size: 10,
        };
        let response = processor.process_query(&request).await.unwrap();
        assert_eq!(response.confidence, 0.0);
        assert!(response.sources.is_empty());
        assert!(!cache.contains(&query_response_key("anything", 5)));
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_search_and_llm() {
        let cache = FakeCache::new();
        let cached = QueryResponse {
            answer: "cached answer".to_string(),
            sources: Vec::new(),
            confidence: 1.0,
            is_complete: true,
            pagination: None,
        };
        crate::cache::set_json(
            &cache,
            &query_response_key("cached query", 5),
            &cached,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        let processor = QueryProcessor::new(
            Arc::new(FakeVectorStore::new()),
            Arc::new(FakeEmbedder::default()),
            Arc::new(FakeLlmClient::default()),
            Arc::new(cache),
            Duration::from_secs(60),
        );
        let request = QueryRequest {
            query: "cached query".to_string(),
            top_k: 5,
            page: 1,
            page_size: 10,
        };
        let response = processor.process_query(&request).await.unwrap();
        assert_eq!(response, cached);
    }

    #[tokio::test]
    async fn full_pipeline_produces_cited_source_and_caches_result() {
        let doc_id = Uuid::new_v4();
        let vector_store = FakeVectorStore::new();
        vector_store.seed_matches(vec![VectorPoint {
            id: Uuid::new_v4(),
            embedding: vec![0.1, 0.2],
            document_id: doc_id,
            content: "RAG stands for Retrieval-Augmented Generation.".to_string(),
            chunk_index: 0,
            version: 1,
        }]);

        let llm = FakeLlmClient::with_answer(StructuredAnswer {
            answer: "RAG combines retrieval and generation.".to_string(),
            confidence: 0.9,
            citations: vec![doc_id.to_string()],
            is_complete: true,
        });

        let cache = FakeCache::new();
        let processor = QueryProcessor::new(
            Arc::new(vector_store),
            Arc::new(FakeEmbedder::default()),
            Arc::new(llm),
            Arc::new(cache.clone()),
            Duration::from_secs(60),
        );
        let request = QueryRequest {
            query: "What is RAG?".to_string(),
            top_k: 5,
            page: 1,
            page_size: 10,
        };
        let response = processor.process_query(&request).await.unwrap();
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].document_id, doc_id);
        assert!(cache.contains(&query_response_key("What is RAG?", 5)));
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::json;
use tracing::debug;

use super::sort_by_score_desc;
use crate::config::DEFAULT_RERANK_FACTOR;
use crate::models::RetrievalResult;
use crate::ports::{RetrieveOptions, Retriever, TokenEmbedder};
use crate::{Error, Result};

pub const SOURCE: &str = "late_interaction";

/// MaxSim late-interaction score: Σ_q max_t dot(Q[q], D[t])
///
/// Plain dot products, no normalisation. A document without tokens scores 0.
/// Every token row must have the same width, otherwise `InvalidQuery`.
pub fn maxsim(query_tokens: &[Vec<f32>], doc_tokens: &[Vec<f32>]) -> Result<f64> {
    if doc_tokens.is_empty() {
        return Ok(0.0);
    }

    let mut total = 0.0;
    for q in query_tokens {
        let mut best = f64::NEG_INFINITY;
        for d in doc_tokens {
            best = best.max(dot(q, d)?);
        }
        total += best;
    }
    Ok(total)
}

fn dot(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::InvalidQuery(format!(
            "token width mismatch: query {} vs document {}",
            a.len(),
            b.len()
        )));
    }

    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| *x as f64 * *y as f64)
        .sum())
}

/// Reranks over-retrieved candidates by token-level MaxSim.
pub struct LateInteractionRetriever {
    candidates: Arc<dyn Retriever>,
    token_embedder: Arc<dyn TokenEmbedder>,
    rerank_factor: usize,
}

impl LateInteractionRetriever {
    /// `candidates` is normally a [`super::VectorRetriever`].
    pub fn new(candidates: Arc<dyn Retriever>, token_embedder: Arc<dyn TokenEmbedder>) -> Self {
        Self {
            candidates,
            token_embedder,
            rerank_factor: DEFAULT_RERANK_FACTOR,
        }
    }

    /// How many candidates to fetch per requested result.
    pub fn with_rerank_factor(mut self, factor: usize) -> Self {
        self.rerank_factor = factor.max(1);
        self
    }
}

#[async_trait]
impl Retriever for LateInteractionRetriever {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        options: &RetrieveOptions,
    ) -> Result<Vec<RetrievalResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_tokens = self.token_embedder.embed_query_tokens(query).await?;

        let candidates = self
            .candidates
            .retrieve(query, limit.saturating_mul(self.rerank_factor), options)
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let doc_tokens = try_join_all(
            candidates
                .iter()
                .map(|c| self.token_embedder.embed_doc_tokens(&c.chunk.content)),
        )
        .await?;

        let mut reranked = Vec::with_capacity(candidates.len());
        for (candidate, tokens) in candidates.into_iter().zip(doc_tokens) {
            let score = maxsim(&query_tokens, &tokens)?;
            let mut metadata = candidate.metadata;
            metadata.insert("original_score".into(), json!(candidate.score));
            metadata.insert("maxsim_score".into(), json!(score));
            reranked.push(
                RetrievalResult::new(candidate.chunk, score, SOURCE).with_metadata(metadata),
            );
        }

        let candidate_count = reranked.len();
        sort_by_score_desc(&mut reranked);
        reranked.truncate(limit);

        debug!(
            "Reranked {} candidates into {} results",
            candidate_count,
            reranked.len()
        );
        Ok(reranked)
    }
}

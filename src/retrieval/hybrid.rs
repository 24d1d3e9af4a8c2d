use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::json;
use tracing::debug;

use super::sort_by_score_desc;
use crate::config::DEFAULT_FUSION_FACTOR;
use crate::metrics;
use crate::models::RetrievalResult;
use crate::ports::{RetrieveOptions, Retriever};
use crate::{Error, Result};

pub const SOURCE: &str = "hybrid";

/// Weighted additive fusion over several strategies.
///
/// A chunk's fused score is Σ wᵢ·sᵢ over the strategies that returned it,
/// with raw per-strategy scores on their own scales. Chunks found by several
/// strategies therefore rank above single-strategy hits of similar quality.
pub struct HybridRetriever {
    strategies: Vec<Arc<dyn Retriever>>,
    /// Normalised, one per strategy
    weights: Vec<f64>,
    fusion_factor: usize,
    timeout: Option<Duration>,
}

impl HybridRetriever {
    /// Weights default to uniform and are normalised by their sum.
    pub fn new(strategies: Vec<Arc<dyn Retriever>>, weights: Option<Vec<f64>>) -> Result<Self> {
        if strategies.is_empty() {
            return Err(Error::InvalidConfig(
                "hybrid retrieval needs at least one strategy".to_string(),
            ));
        }

        let weights = match weights {
            None => vec![1.0 / strategies.len() as f64; strategies.len()],
            Some(weights) => normalize_weights(weights, strategies.len())?,
        };

        Ok(Self {
            strategies,
            weights,
            fusion_factor: DEFAULT_FUSION_FACTOR,
            timeout: None,
        })
    }

    /// How many results each strategy fetches per requested result.
    pub fn with_fusion_factor(mut self, factor: usize) -> Self {
        self.fusion_factor = factor.max(1);
        self
    }

    /// Fail the retrieval when any single strategy takes longer than this.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    async fn run_strategy(
        &self,
        strategy: &Arc<dyn Retriever>,
        query: &str,
        limit: usize,
        options: &RetrieveOptions,
    ) -> Result<Vec<RetrievalResult>> {
        let started = Instant::now();
        let outcome = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, strategy.retrieve(query, limit, options))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::UpstreamFailure(format!(
                        "{} retrieval timed out after {:?}",
                        strategy.name(),
                        timeout
                    )))
                }),
            None => strategy.retrieve(query, limit, options).await,
        };

        metrics::record_strategy_result(strategy.name(), started.elapsed(), outcome.is_ok());
        if let Ok(results) = &outcome {
            debug!("{} returned {} results", strategy.name(), results.len());
        }
        outcome
    }
}

fn normalize_weights(weights: Vec<f64>, strategies: usize) -> Result<Vec<f64>> {
    if weights.len() != strategies {
        return Err(Error::InvalidConfig(format!(
            "got {} weights for {} strategies",
            weights.len(),
            strategies
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(Error::InvalidConfig(
            "weights must be finite and non-negative".to_string(),
        ));
    }

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(Error::InvalidConfig(
            "weights must have a positive sum".to_string(),
        ));
    }

    Ok(weights.into_iter().map(|w| w / total).collect())
}

/// Accumulate weighted scores per chunk id, first-seen order.
fn fuse(per_strategy: Vec<Vec<RetrievalResult>>, weights: &[f64]) -> Vec<RetrievalResult> {
    let mut fused: Vec<RetrievalResult> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (results, weight) in per_strategy.into_iter().zip(weights) {
        for result in results {
            let contribution = result.score * weight;
            let score_key = format!("{}_score", result.source);

            match positions.get(&result.chunk.id) {
                Some(&pos) => {
                    let entry = &mut fused[pos];
                    entry.score += contribution;
                    entry.metadata.insert(score_key, json!(result.score));
                }
                None => {
                    let raw_score = result.score;
                    let mut entry =
                        RetrievalResult::new(result.chunk, contribution, SOURCE)
                            .with_metadata(result.metadata);
                    entry.metadata.insert(score_key, json!(raw_score));
                    positions.insert(entry.chunk.id.clone(), fused.len());
                    fused.push(entry);
                }
            }
        }
    }

    fused
}

#[async_trait]
impl Retriever for HybridRetriever {
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

        let fetch = limit.saturating_mul(self.fusion_factor);
        let per_strategy = try_join_all(
            self.strategies
                .iter()
                .map(|strategy| self.run_strategy(strategy, query, fetch, options)),
        )
        .await?;

        let mut fused = fuse(per_strategy, &self.weights);
        let candidates = fused.len();
        sort_by_score_desc(&mut fused);
        fused.truncate(limit);

        debug!(
            "Fused {} strategies into {} of {} candidates",
            self.strategies.len(),
            fused.len(),
            candidates
        );
        Ok(fused)
    }
}

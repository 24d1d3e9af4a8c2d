//! Retrieval strategies
//!
//! - [`VectorRetriever`]: dense-vector nearest neighbours
//! - [`LateInteractionRetriever`]: MaxSim reranking over vector candidates
//! - [`GraphRetriever`]: graph matches expanded into textual context
//! - [`HybridRetriever`]: weighted additive fusion of several strategies

pub mod graph;
pub mod hybrid;
pub mod late_interaction;
pub mod vector;

pub use graph::{GraphRetriever, GraphRetrieverOptions};
pub use hybrid::HybridRetriever;
pub use late_interaction::{maxsim, LateInteractionRetriever};
pub use vector::VectorRetriever;

/// Stable descending sort by score. Equal scores keep their input order.
pub(crate) fn sort_by_score_desc(results: &mut [crate::models::RetrievalResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

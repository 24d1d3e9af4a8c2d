use async_trait::async_trait;

use super::vector_store::SearchFilter;
use crate::models::RetrievalResult;
use crate::Result;

/// Strategy-independent retrieval options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrieveOptions {
    /// Payload filter applied by strategies backed by a vector store.
    /// Graph retrieval ignores it.
    pub filter: Option<SearchFilter>,
}

impl RetrieveOptions {
    pub fn with_filter(filter: SearchFilter) -> Self {
        Self {
            filter: Some(filter),
        }
    }
}

/// The contract every retrieval strategy satisfies.
///
/// Results are ordered highest relevance first and never exceed `limit`.
/// An empty index yields an empty list, not an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Source tag written into every result this strategy produces.
    fn name(&self) -> &str;

    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        options: &RetrieveOptions,
    ) -> Result<Vec<RetrievalResult>>;
}

//! Pluggable query expansion strategies for the query engine.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::error::Result;

/// Expands a user's raw query string into one or more query strings to embed
/// and search with, before fusion. The default implementation is a no-op
/// (returns the query unchanged); richer strategies (synonym expansion,
/// acronym resolution) can be swapped in without touching the query engine.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Expand `query` into one or more queries to run in parallel.
    async fn expand(&self, query: &str) -> Result<Vec<String>>;
}

/// Shared, cloneable handle to a query expander.
pub type SharedQueryExpander = Arc<dyn QueryExpander>;

/// Identity expander: returns the input query unchanged. Used when no
/// expansion strategy is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopQueryExpander;

#[async_trait]
impl QueryExpander for NoopQueryExpander {
    async fn expand(&self, query: &str) -> Result<Vec<String>> {
        Ok(vec![query.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_expander_returns_input_unchanged() {
        let expander = NoopQueryExpander;
        let expanded = expander.expand("fn parse_header").await.unwrap();
        assert_eq!(expanded, vec!["fn parse_header".to_string()]);
    }
}

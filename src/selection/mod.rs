//! Proxy selection strategies
//!
//! A strategy narrows and orders a store query and remembers what it already
//! handed out, so one session never yields the same proxy twice.

mod random;
mod votes;

pub use random::RandomStrategy;
pub use votes::VotesStrategy;

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;

use crate::error::{ProxyDbError, Result};
use crate::models::Proxy;
use crate::repository::{ProxyQuery, ProxyRepository};

/// Strategy types for proxy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    Votes,
    Random,
}

impl StrategyKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "votes" | "vote" => Ok(Self::Votes),
            "random" | "rand" => Ok(Self::Random),
            other => Err(ProxyDbError::InvalidFilterArgument(format!(
                "unknown strategy {:?}, expected votes or random",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Votes => "votes",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for proxy selection strategies
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    fn strategy_name(&self) -> &'static str;

    /// Restrict the query to eligible proxies
    fn filter(&self, query: ProxyQuery) -> ProxyQuery;

    /// Order the candidates
    fn order(&self, query: ProxyQuery) -> ProxyQuery;

    fn seen(&self) -> &SeenProxies;

    fn seen_mut(&mut self) -> &mut SeenProxies;

    /// Next proxy not yet returned by this strategy
    ///
    /// `Ok(None)` when no unseen proxy matches.
    async fn select_next(
        &mut self,
        repo: &ProxyRepository,
        query: &ProxyQuery,
    ) -> Result<Option<Proxy>> {
        let mut query = self.order(self.filter(query.clone()));
        query.exclude = self.seen().ids();

        let proxy = repo.find_first(&query).await?;
        if let Some(ref proxy) = proxy {
            self.seen_mut().insert(&proxy.id);
        }

        Ok(proxy)
    }

    /// Forget the proxies returned so far
    fn reset(&mut self) {
        self.seen_mut().clear();
    }
}

/// Proxies already returned in a session
#[derive(Debug, Default, Clone)]
pub struct SeenProxies {
    ids: HashSet<String>,
}

impl SeenProxies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the id was already present
    pub fn insert(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// Create a selection strategy based on the strategy type
pub fn create_strategy(kind: StrategyKind, min_votes: i64) -> Box<dyn SelectionStrategy> {
    match kind {
        StrategyKind::Votes => Box::new(VotesStrategy::new(min_votes)),
        StrategyKind::Random => Box::new(RandomStrategy::new(min_votes)),
    }
}

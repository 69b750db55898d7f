//! Most-voted-first selection strategy

use super::{SeenProxies, SelectionStrategy};
use crate::repository::{ProxyOrder, ProxyQuery};

/// Selects the unseen proxy with the most votes
#[derive(Debug, Default)]
pub struct VotesStrategy {
    min_votes: i64,
    seen: SeenProxies,
}

impl VotesStrategy {
    pub fn new(min_votes: i64) -> Self {
        Self {
            min_votes,
            seen: SeenProxies::new(),
        }
    }
}

impl SelectionStrategy for VotesStrategy {
    fn strategy_name(&self) -> &'static str {
        "votes"
    }

    fn filter(&self, query: ProxyQuery) -> ProxyQuery {
        ProxyQuery {
            min_votes: Some(self.min_votes),
            ..query
        }
    }

    fn order(&self, query: ProxyQuery) -> ProxyQuery {
        ProxyQuery {
            order: ProxyOrder::VotesDesc,
            ..query
        }
    }

    fn seen(&self) -> &SeenProxies {
        &self.seen
    }

    fn seen_mut(&mut self) -> &mut SeenProxies {
        &mut self.seen
    }
}

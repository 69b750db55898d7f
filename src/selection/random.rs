//! Random selection strategy

use super::{SeenProxies, SelectionStrategy};
use crate::repository::{ProxyOrder, ProxyQuery};

/// Selects a random unseen proxy; the store must have a random-order function
#[derive(Debug, Default)]
pub struct RandomStrategy {
    min_votes: i64,
    seen: SeenProxies,
}

impl RandomStrategy {
    pub fn new(min_votes: i64) -> Self {
        Self {
            min_votes,
            seen: SeenProxies::new(),
        }
    }
}

impl SelectionStrategy for RandomStrategy {
    fn strategy_name(&self) -> &'static str {
        "random"
    }

    fn filter(&self, query: ProxyQuery) -> ProxyQuery {
        ProxyQuery {
            min_votes: Some(self.min_votes),
            ..query
        }
    }

    fn order(&self, query: ProxyQuery) -> ProxyQuery {
        ProxyQuery {
            order: ProxyOrder::Random,
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

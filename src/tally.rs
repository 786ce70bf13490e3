//! Technology tally.
//!
//! A derived `name -> count` mapping kept in the active store. Counts are
//! only adjusted by the reconciler as a side effect of adding and removing
//! repositories.

use std::sync::Arc;

use tracing::debug;

use crate::error::StoreResult;
use crate::models::TechnologyCount;
use crate::store::RepositoryStore;

#[derive(Clone)]
pub struct TechnologyTally {
    store: Arc<dyn RepositoryStore>,
}

impl TechnologyTally {
    pub fn new(store: Arc<dyn RepositoryStore>) -> Self {
        Self { store }
    }

    /// Records one more reference to `name`, creating it at 1.
    pub async fn increment(&self, name: &str) -> StoreResult<u64> {
        let count = self.store.upsert_tally_count(name, 1).await?;
        debug!(technology = name, count, "Incremented technology count");
        Ok(count)
    }

    /// Removes one reference to `name`. The entry disappears at zero; an
    /// unknown name is left alone.
    pub async fn decrement(&self, name: &str) -> StoreResult<u64> {
        let count = self.store.upsert_tally_count(name, -1).await?;
        debug!(technology = name, count, "Decremented technology count");
        Ok(count)
    }

    /// All counts, highest first.
    pub async fn snapshot(&self) -> StoreResult<Vec<TechnologyCount>> {
        Ok(rank(self.store.list_technologies().await?))
    }
}

/// Sorts by count descending. Equal counts keep their insertion order.
pub fn rank(mut counts: Vec<TechnologyCount>) -> Vec<TechnologyCount> {
    counts.retain(|entry| entry.count > 0);
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_is_stable_for_ties() {
        let ranked = rank(vec![
            TechnologyCount::new("Rust", 1),
            TechnologyCount::new("Go", 3),
            TechnologyCount::new("Docker", 1),
            TechnologyCount::new("Python", 2),
        ]);

        let names: Vec<&str> = ranked.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["Go", "Python", "Rust", "Docker"]);
    }

    #[test]
    fn test_rank_drops_empty_entries() {
        let ranked = rank(vec![TechnologyCount::new("Go", 0)]);
        assert!(ranked.is_empty());
    }
}

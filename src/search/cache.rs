//! Defines the `NodeCache`, which memoizes the cost of a variable given an exact parent set.
//!
//! Local moves change one or two parent sets per proposal, so nearly every cost the search asks
//! for has been computed before. Keys use the sorted parent list, so a parent set reached through
//! different move sequences always hits the same entry.

use crate::dataset::Dataset;
use crate::model::ModelLearner;
use crate::search::tom::Tom;

use tracing::warn;

use std::collections::HashMap;
use std::sync::Arc;

/// Number of model-fit failures reported before reporting is switched off
pub const MAX_FAILURE_WARNINGS: usize = 10;

struct Entry {
    cost: f64,
    last_used: u64
}

/// Memoized node costs for one learner on one dataset
pub struct NodeCache {

    learner: Box<dyn ModelLearner>,

    data: Arc<Dataset>,

    entries: HashMap<(usize, Vec<usize>), Entry>,

    /// Bound on the number of entries. `None` caches without limit
    capacity: Option<usize>,

    /// Logical clock, advanced on every lookup
    clock: u64,

    hits: u64,

    misses: u64,

    /// Number of failed fits seen so far
    failures: usize

}

impl NodeCache {

    pub fn new(learner: Box<dyn ModelLearner>, data: Arc<Dataset>) -> Self {
        NodeCache {
            learner,
            data,
            entries: HashMap::new(),
            capacity: None,
            clock: 0,
            hits: 0,
            misses: 0,
            failures: 0
        }
    }

    /// Bound the cache. When full, the least recently used half of the entries is evicted.
    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    /// The cost of `var` given `parents`.
    ///
    /// A cache miss fits the model through the learner. A failed fit costs ```+inf```; the first
    /// few failures are logged as warnings.
    ///
    /// # Args
    /// * `parents`: the parent set, sorted increasing
    pub fn cost(&mut self, var: usize, parents: &[usize]) -> f64 {
        self.clock += 1;
        let key = (var, parents.to_vec());

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_used = self.clock;
            self.hits += 1;
            return entry.cost;
        }

        self.misses += 1;
        let cost = match self.learner.parameterize_and_cost(&self.data, var, parents) {
            Ok(c) => c,
            Err(e) => {
                self.failures += 1;
                if self.failures <= MAX_FAILURE_WARNINGS {
                    warn!(var, ?parents, learner = %self.learner.name(), error = %e, "model fit failed, costing as infinite");
                }
                if self.failures == MAX_FAILURE_WARNINGS {
                    warn!("further model fit failures will not be reported");
                }
                f64::INFINITY
            }
        };

        self.evict_if_full();
        self.entries.insert(key, Entry { cost, last_used: self.clock });
        cost
    }

    /// Sum of node costs over every variable of `tom`
    pub fn tom_cost(&mut self, tom: &Tom) -> f64 {
        (0..tom.num_vars()).map(|v| self.cost(v, tom.parents(v))).sum()
    }

    fn evict_if_full(&mut self) {
        let capacity = match self.capacity {
            Some(c) => c,
            None => return
        };

        if self.entries.len() < capacity {
            return;
        }

        let mut ages: Vec<u64> = self.entries.values().map(|e| e.last_used).collect();
        ages.sort_unstable();
        let cutoff = ages[(ages.len() - 1) / 2];
        self.entries.retain(|_, e| e.last_used > cutoff);
    }

    pub fn data(&self) -> &Arc<Dataset> {
        &self.data
    }

    pub fn learner(&self) -> &dyn ModelLearner {
        self.learner.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

}

#[cfg(test)]
pub(crate) mod tests {

    use super::*;
    use crate::model::{AdaptiveCodeLearner, LocalModel, SufficientStats};
    use crate::util::{Result, TomSearchError};

    use ndarray::prelude as nd;

    use std::cell::Cell;
    use std::rc::Rc;

    /// Wraps a learner and counts how often it is asked to fit
    pub struct CountingLearner {
        pub inner: AdaptiveCodeLearner,
        pub calls: Rc<Cell<usize>>,
        pub fail: bool
    }

    impl ModelLearner for CountingLearner {

        fn name(&self) -> String {
            String::from("counting")
        }

        fn max_table_cells(&self) -> usize {
            self.inner.max_table_cells()
        }

        fn s_parameterize(&self, stats: SufficientStats) -> LocalModel {
            self.inner.s_parameterize(stats)
        }

        fn s_cost(&self, stats: &SufficientStats, params: &nd::Array2<f64>) -> f64 {
            self.inner.s_cost(stats, params)
        }

        fn parameterize_and_cost(&self, data: &Dataset, child: usize, parents: &[usize]) -> Result<f64> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(TomSearchError::ModelFit { var: child, message: String::from("forced") });
            }
            self.inner.parameterize_and_cost(data, child, parents)
        }

    }

    fn data() -> Arc<Dataset> {
        let values = nd::arr2(&[[0, 1, 1], [1, 0, 1], [1, 1, 0], [0, 0, 0]]);
        Arc::new(Dataset::from_codes(&["a", "b", "c"], vec![2, 2, 2], values).unwrap())
    }

    fn counting(fail: bool) -> (NodeCache, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let learner = CountingLearner { inner: AdaptiveCodeLearner::mml(), calls: calls.clone(), fail };
        (NodeCache::new(Box::new(learner), data()), calls)
    }

    #[test]
    /// Repeated lookups return the identical value and fit once
    fn idempotent() {
        let (mut cache, calls) = counting(false);
        let first = cache.cost(2, &[0, 1]);
        let second = cache.cost(2, &[0, 1]);
        assert_eq!(first.to_bits(), second.to_bits());
        assert_eq!(1, calls.get());
        assert_eq!(1, cache.hits());

        cache.cost(2, &[0]);
        assert_eq!(2, calls.get());
        assert_eq!(2, cache.len());
    }

    #[test]
    fn failure_is_infinite() {
        let (mut cache, calls) = counting(true);
        for v in 0..3 {
            assert_eq!(f64::INFINITY, cache.cost(v, &[]));
        }
        assert_eq!(f64::INFINITY, cache.cost(0, &[]));
        assert_eq!(3, calls.get());
        assert_eq!(3, cache.failures());
    }

    #[test]
    fn eviction() {
        let (cache, calls) = counting(false);
        let mut cache = cache.with_capacity(Some(2));
        cache.cost(0, &[]);
        cache.cost(1, &[]);
        cache.cost(2, &[]);
        assert!(cache.len() <= 2);

        // the most recent entry survives
        cache.cost(2, &[]);
        assert_eq!(3, calls.get());
    }

    #[test]
    fn tom_cost_is_sum() {
        let (mut cache, _) = counting(false);
        let mut tom = Tom::new(3, 2);
        tom.add_arc(0, 2);
        let expected = cache.cost(0, &[]) + cache.cost(1, &[]) + cache.cost(2, &[0]);
        assert_eq!(expected, cache.tom_cost(&tom));
    }
}

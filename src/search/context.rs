//! Defines `CaseInfo`, the mutable state of one search run.
//!
//! A `CaseInfo` is created per run and passed by reference to every move operator. It owns the
//! node cost cache, the structure prior and the random generator, so two runs never share state.

use crate::config::SearchConfig;
use crate::dataset::Dataset;
use crate::model::ModelLearner;
use crate::search::cache::NodeCache;
use crate::search::prior::{TomCoster, UniformTomCoster};
use crate::search::tom::Tom;

use ndarray::prelude as nd;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use std::sync::Arc;

/// Shared state of a single search run
pub struct CaseInfo {

    /// Memoized node costs
    pub cache: NodeCache,

    /// Structure prior
    pub coster: Box<dyn TomCoster>,

    pub rng: StdRng,

    pub temperature: f64,

    /// When set, only strictly improving proposals are accepted
    pub safe_mode: bool,

    /// Accumulate per-arc posterior weights on accepted toggles
    pub update_arc_weights: bool,

    /// ```arc_weights[[child, parent]]``` accumulates the weight of sampled structures containing
    /// ```parent -> child```
    pub arc_weights: nd::Array2<f64>,

    /// Total sampling weight seen so far
    pub total_weight: f64,

    /// Total cost of the current `Tom`: prior plus data
    current_cost: f64,

    accepted: u64,

    proposed: u64

}

impl CaseInfo {

    /// Build the context for a run over `data` with a uniform prior.
    pub fn new(data: Arc<Dataset>, learner: Box<dyn ModelLearner>, config: &SearchConfig) -> Self {
        let coster = Box::new(UniformTomCoster::new(config.initial_arc_prob));
        CaseInfo::with_prior(data, learner, coster, config)
    }

    /// Build the context for a run with an explicit structure prior
    pub fn with_prior(
        data: Arc<Dataset>,
        learner: Box<dyn ModelLearner>,
        coster: Box<dyn TomCoster>,
        config: &SearchConfig
    ) -> Self {
        let n = data.num_vars();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy()
        };

        CaseInfo {
            cache: NodeCache::new(learner, data).with_capacity(config.cache_capacity),
            coster,
            rng,
            temperature: config.temperature,
            safe_mode: false,
            update_arc_weights: config.update_arc_weights,
            arc_weights: nd::Array2::zeros((n, n)),
            total_weight: 0.0,
            current_cost: f64::INFINITY,
            accepted: 0,
            proposed: 0
        }
    }

    pub fn data(&self) -> &Dataset {
        self.cache.data()
    }

    /// Cost of `var` given `parents`, through the cache
    pub fn node_cost(&mut self, var: usize, parents: &[usize]) -> f64 {
        self.cache.cost(var, parents)
    }

    /// Prior plus data cost of `tom`
    pub fn full_cost(&mut self, tom: &Tom) -> f64 {
        self.coster.cost(tom) + self.cache.tom_cost(tom)
    }

    /// Recompute the cost of the current `Tom` from scratch
    pub fn reset_cost(&mut self, tom: &Tom) -> f64 {
        self.current_cost = self.full_cost(tom);
        self.current_cost
    }

    pub fn current_cost(&self) -> f64 {
        self.current_cost
    }

    /// Metropolis acceptance of a proposal changing the cost by `delta`.
    ///
    /// Improvements are always taken; otherwise the proposal is accepted with probability
    /// ```exp(-delta / temperature)```. In safe mode only strict improvements are accepted.
    pub fn accept(&mut self, delta: f64) -> bool {
        self.proposed += 1;
        let ok = if delta.is_nan() {
            false
        } else if self.safe_mode {
            delta < 0.0
        } else if delta <= 0.0 {
            true
        } else {
            self.rng.gen::<f64>() < (-delta / self.temperature).exp()
        };

        if ok {
            self.accepted += 1;
        }
        ok
    }

    /// Apply an accepted change of `delta` to the current cost. A non-finite delta forces a
    /// recomputation.
    pub fn commit(&mut self, tom: &Tom, delta: f64) {
        if delta.is_finite() && self.current_cost.is_finite() {
            self.current_cost += delta;
        } else {
            self.reset_cost(tom);
        }
    }

    /// Arc weight bookkeeping after an accepted toggle of ```parent -> child```.
    ///
    /// An arc that appears at total weight ```w``` is charged ```-w``` and credited ```+w``` when
    /// it disappears; `finalize_arc_weights` credits every arc still present.
    pub fn record_toggle(&mut self, child: usize, parent: usize, now_present: bool) {
        if !self.update_arc_weights {
            return;
        }
        if now_present {
            self.arc_weights[[child, parent]] -= self.total_weight;
        } else {
            self.arc_weights[[child, parent]] += self.total_weight;
        }
    }

    /// Close the arc weight accounting for the final `tom`
    pub fn finalize_arc_weights(&mut self, tom: &Tom) {
        if !self.update_arc_weights {
            return;
        }
        for (parent, child) in tom.arcs() {
            self.arc_weights[[child, parent]] += self.total_weight;
        }
    }

    /// Start arc weight accounting from `tom` at the current total weight
    pub fn open_arc_weights(&mut self, tom: &Tom) {
        if !self.update_arc_weights {
            return;
        }
        self.arc_weights.fill(0.0);
        for (parent, child) in tom.arcs() {
            self.arc_weights[[child, parent]] -= self.total_weight;
        }
    }

    /// Fraction of proposals accepted so far
    pub fn acceptance_rate(&self) -> f64 {
        if self.proposed == 0 { 0.0 } else { self.accepted as f64 / self.proposed as f64 }
    }

    /// Draw a uniform index in ```0..n```
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Draw a uniform float in ```[0, 1)```
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen()
    }

}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::model::AdaptiveCodeLearner;

    fn context(seed: u64) -> CaseInfo {
        let values = nd::arr2(&[[0, 1], [1, 0], [1, 1]]);
        let data = Arc::new(Dataset::from_codes(&["a", "b"], vec![2, 2], values).unwrap());
        let mut config = SearchConfig::default();
        config.seed = Some(seed);
        config.update_arc_weights = true;
        CaseInfo::new(data, Box::new(AdaptiveCodeLearner::mml()), &config)
    }

    #[test]
    fn acceptance() {
        let mut ctx = context(1);
        assert!(ctx.accept(-1.0));
        assert!(ctx.accept(0.0));
        assert!(!ctx.accept(f64::INFINITY));
        assert!(!ctx.accept(f64::NAN));

        ctx.safe_mode = true;
        assert!(!ctx.accept(0.0));
        assert!(ctx.accept(-1e-9));
        assert!(ctx.acceptance_rate() > 0.5);
    }

    #[test]
    /// Worse proposals are accepted at roughly exp(-delta)
    fn metropolis_rate() {
        let mut ctx = context(2);
        let accepted = (0..4000).filter(|_| ctx.accept(2f64.ln())).count();
        let rate = accepted as f64 / 4000.0;
        assert!((rate - 0.5).abs() < 0.05, "rate {}", rate);
    }

    #[test]
    fn same_seed_same_draws() {
        let mut a = context(9);
        let mut b = context(9);
        let xs: Vec<usize> = (0..20).map(|_| a.index(100)).collect();
        let ys: Vec<usize> = (0..20).map(|_| b.index(100)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    /// An arc present for the whole run is credited the full weight
    fn arc_weight_accounting() {
        let mut ctx = context(3);
        let mut tom = Tom::new(2, 1);
        ctx.open_arc_weights(&tom);

        ctx.total_weight = 2.0;
        tom.add_arc(0, 1);
        ctx.record_toggle(1, 0, true);

        ctx.total_weight = 5.0;
        ctx.finalize_arc_weights(&tom);
        assert_eq!(3.0, ctx.arc_weights[[1, 0]]);
        assert_eq!(0.0, ctx.arc_weights[[0, 1]]);
    }

    #[test]
    fn commit_tracks_cost() {
        let mut ctx = context(4);
        let mut tom = Tom::new(2, 1);
        let before = ctx.reset_cost(&tom);

        let old = ctx.node_cost(1, &[]);
        let prior = ctx.coster.cost_to_toggle_arc(&tom, 0, 1);
        tom.add_arc(0, 1);
        let delta = ctx.node_cost(1, &[0]) - old + prior;
        ctx.commit(&tom, delta);

        let expected = ctx.full_cost(&tom);
        assert!((expected - ctx.current_cost()).abs() < 1e-9);
        assert!((before + delta - expected).abs() < 1e-9);
    }
}

//! Defines the `MetropolisSearch`, a Metropolis sampler over `Tom`s.
//!
//! A run has two phases. Burn-in moves from the initial `Tom` towards the high posterior region
//! while tracking the cheapest structure seen. At the end of burn-in the arc probability is
//! re-estimated from that structure and the sampling phase begins; every sampling epoch tallies
//! the current structure's group, so visit frequency estimates the group posterior.
//!
//! The caller drives the run with `do_epoch` until `is_finished`, or calls `run`.

use crate::config::SearchConfig;
use crate::dataset::Dataset;
use crate::model::ModelLearner;
use crate::search::context::CaseInfo;
use crate::search::grouping::{MarkovGrouping, SearchResult, StructureGrouping, StructureTally};
use crate::search::moves::{DoubleSkeletalChange, MoveOperator, ParentSwapChange, SkeletalChange, TemporalChange};
use crate::search::prior::{TomCoster, UniformTomCoster};
use crate::search::tom::Tom;
use crate::util::{Result, TomSearchError};

use ndarray::prelude as nd;
use rand::distributions::{Distribution, WeightedIndex};
use tracing::{debug, info};

use std::sync::Arc;

/// Burn-in never runs for fewer epochs than this
pub const MIN_BURN_IN: u64 = 100;

/// Number of times the sampling phase may be extended to reach the posterior coverage target
pub const MAX_EXTENSIONS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    BurnIn,
    Sampling,
    Finished
}

/// Metropolis sampler over `Tom`s
pub struct MetropolisSearch<G: StructureGrouping = MarkovGrouping> {

    ctx: CaseInfo,

    config: SearchConfig,

    /// The current state of the chain
    tom: Tom,

    best_tom: Tom,

    best_cost: f64,

    operators: Vec<Box<dyn MoveOperator>>,

    /// Draws an index into `operators`
    chooser: WeightedIndex<f64>,

    tally: StructureTally<G>,

    phase: Phase,

    /// Epochs run in the current phase
    epoch: u64,

    burn_in_length: u64,

    /// Nominal length of the sampling phase
    sampling_length: u64,

    /// Sampling epochs to run before the next coverage check
    sampling_target: u64,

    extensions: u32

}

impl MetropolisSearch<MarkovGrouping> {

    /// A search over `data` with a uniform prior, grouping results by Markov equivalence.
    pub fn new(data: Arc<Dataset>, learner: Box<dyn ModelLearner>, config: SearchConfig) -> Result<Self> {
        let coster = Box::new(UniformTomCoster::new(config.initial_arc_prob));
        MetropolisSearch::with_grouping(data, learner, coster, config, MarkovGrouping)
    }

    /// A search with an explicit structure prior, grouping results by Markov equivalence.
    pub fn with_prior(
        data: Arc<Dataset>,
        learner: Box<dyn ModelLearner>,
        coster: Box<dyn TomCoster>,
        config: SearchConfig
    ) -> Result<Self> {
        MetropolisSearch::with_grouping(data, learner, coster, config, MarkovGrouping)
    }

}

impl<G: StructureGrouping> MetropolisSearch<G> {

    /// Construct a search. The configuration is validated before anything else happens.
    ///
    /// # Args
    /// * `data`: the (possibly weighted) data to learn from
    /// * `learner`: costs each node given its parents
    /// * `coster`: the structure prior
    /// * `config`: search parameters
    /// * `grouping`: how sampled structures are grouped into results
    pub fn with_grouping(
        data: Arc<Dataset>,
        learner: Box<dyn ModelLearner>,
        coster: Box<dyn TomCoster>,
        config: SearchConfig,
        grouping: G
    ) -> Result<Self> {
        config.validate()?;

        let w = &config.move_weights;
        let chooser = WeightedIndex::new(vec![w.skeletal, w.temporal, w.double_skeletal, w.parent_swap])
            .map_err(|e| TomSearchError::config("move_weights", e.to_string()))?;
        let operators: Vec<Box<dyn MoveOperator>> = vec![
            Box::new(SkeletalChange),
            Box::new(TemporalChange),
            Box::new(DoubleSkeletalChange),
            Box::new(ParentSwapChange)
        ];

        let n = data.num_vars();
        let sampling_length = (config.search_factor * 100.0 * (n * n) as f64).ceil().max(1.0) as u64;
        let burn_in_length = (sampling_length / 4).max(MIN_BURN_IN);

        let mut ctx = CaseInfo::with_prior(data, learner, coster, &config);
        let tom = Tom::new(n, config.max_num_parents);
        let best_cost = ctx.reset_cost(&tom);

        Ok(MetropolisSearch {
            ctx,
            best_tom: tom.clone(),
            tom,
            best_cost,
            operators,
            chooser,
            tally: StructureTally::new(grouping),
            phase: Phase::BurnIn,
            epoch: 0,
            burn_in_length,
            sampling_length,
            sampling_target: sampling_length,
            extensions: 0,
            config
        })
    }

    /// Start the chain from `tom` instead of the empty structure
    pub fn with_initial_tom(mut self, tom: Tom) -> Result<Self> {
        if tom.num_vars() != self.tom.num_vars() {
            return Err(TomSearchError::ShapeMismatch(
                format!("initial structure has {} variables, data has {}", tom.num_vars(), self.tom.num_vars())
            ));
        }
        if !tom.is_consistent() {
            return Err(TomSearchError::prior("initial structure is not a valid ordered DAG"));
        }

        self.tom = tom;
        self.best_cost = self.ctx.reset_cost(&self.tom);
        self.best_tom = self.tom.clone();
        Ok(self)
    }

    /// Perform one proposal.
    ///
    /// Does nothing once the search has finished.
    pub fn do_epoch(&mut self) {
        if self.phase == Phase::Finished {
            return;
        }

        let op = self.chooser.sample(&mut self.ctx.rng);
        self.operators[op].propose(&mut self.tom, &mut self.ctx);

        let current = self.ctx.current_cost();
        if current < self.best_cost {
            self.best_cost = current;
            self.best_tom = self.tom.clone();
        }
        self.ctx.safe_mode = current >= self.best_cost + self.config.safe_cap;
        self.epoch += 1;

        match self.phase {
            Phase::BurnIn => {
                if self.epoch >= self.burn_in_length {
                    self.end_burn_in();
                }
            },
            Phase::Sampling => {
                self.tally.record(&self.tom, current, 1.0);
                self.ctx.total_weight += 1.0;
                if self.epoch >= self.sampling_target {
                    self.check_coverage();
                }
            },
            Phase::Finished => ()
        }
    }

    fn end_burn_in(&mut self) {
        let n = self.tom.num_vars();
        let pairs = (n * n.saturating_sub(1) / 2) as f64;
        let arc_prob = (self.best_tom.num_arcs() as f64 + 0.5) / (pairs + 1.0);
        self.ctx.coster.set_arc_prob(arc_prob);

        // the prior changed, so every cost is recomputed
        self.best_cost = self.ctx.full_cost(&self.best_tom);
        let current = self.ctx.reset_cost(&self.tom);
        if current < self.best_cost {
            self.best_cost = current;
            self.best_tom = self.tom.clone();
        }

        self.ctx.open_arc_weights(&self.tom);
        self.phase = Phase::Sampling;
        self.epoch = 0;
        debug!(arc_prob, best_cost = self.best_cost, acceptance = self.ctx.acceptance_rate(), "burn-in finished");
    }

    fn check_coverage(&mut self) {
        let coverage = self.tally.coverage(self.config.max_num_secs);
        if coverage < self.config.min_total_posterior && self.extensions < MAX_EXTENSIONS {
            self.extensions += 1;
            self.sampling_target += (self.sampling_length + 1) / 2;
            debug!(coverage, extension = self.extensions, "posterior coverage below target, extending sampling");
            return;
        }

        self.ctx.finalize_arc_weights(&self.tom);
        self.phase = Phase::Finished;
        info!(
            best_cost = self.best_cost,
            groups = self.tally.num_groups(),
            coverage,
            cache_misses = self.ctx.cache.misses(),
            "search finished"
        );
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run epochs until the search finishes, then return the ranked results
    pub fn run(&mut self) -> Vec<SearchResult> {
        info!(
            vars = self.tom.num_vars(),
            rows = self.ctx.data().num_rows(),
            burn_in = self.burn_in_length,
            sampling = self.sampling_length,
            "starting structure search"
        );
        while !self.is_finished() {
            self.do_epoch();
        }
        self.results()
    }

    /// The retained groups, heaviest first
    pub fn results(&self) -> Vec<SearchResult> {
        self.tally.results(self.config.max_num_secs, self.config.min_total_posterior)
    }

    /// The cheapest structure seen so far
    pub fn best_tom(&self) -> &Tom {
        &self.best_tom
    }

    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    /// The current state of the chain
    pub fn current_tom(&self) -> &Tom {
        &self.tom
    }

    pub fn arc_prob(&self) -> f64 {
        self.ctx.coster.arc_prob()
    }

    pub fn context(&self) -> &CaseInfo {
        &self.ctx
    }

    /// Estimated posterior of each arc, ```[[child, parent]]```. `None` unless arc weights were
    /// tracked and the search has finished.
    pub fn arc_posteriors(&self) -> Option<nd::Array2<f64>> {
        if !self.ctx.update_arc_weights || !self.is_finished() || self.ctx.total_weight <= 0.0 {
            return None;
        }
        Some(&self.ctx.arc_weights / self.ctx.total_weight)
    }

}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::model::AdaptiveCodeLearner;
    use crate::search::grouping::DagGrouping;

    use ndarray::prelude as nd;

    /// x0 copies x1 most of the time; x2 is noise
    fn data() -> Arc<Dataset> {
        let rows: Vec<[usize; 3]> = (0..300)
            .map(|r| {
                let x1 = r % 2;
                let x0 = if r % 10 == 0 { 1 - x1 } else { x1 };
                [x0, x1, (r / 7) % 2]
            })
            .collect();
        Arc::new(Dataset::from_codes(&["x0", "x1", "x2"], vec![2, 2, 2], nd::arr2(&rows)).unwrap())
    }

    fn config(seed: u64) -> SearchConfig {
        let mut config = SearchConfig::default();
        config.seed = Some(seed);
        config.search_factor = 0.5;
        config
    }

    #[test]
    fn invalid_config() {
        let mut bad = config(1);
        bad.temperature = 0.0;
        assert!(MetropolisSearch::new(data(), Box::new(AdaptiveCodeLearner::mml()), bad).is_err());
    }

    #[test]
    /// The strong dependency is found and the phases advance in order
    fn finds_dependency() {
        let mut search = MetropolisSearch::new(data(), Box::new(AdaptiveCodeLearner::mml()), config(5)).unwrap();
        assert_eq!(Phase::BurnIn, search.phase());

        let results = search.run();
        assert!(search.is_finished());
        assert!(!results.is_empty());

        let best = search.best_tom();
        assert!(best.is_arc(0, 1));
        assert!(results[0].tom.is_arc(0, 1));

        let total: f64 = results.iter().map(|r| r.posterior).sum();
        assert!(total <= 1.0 + 1e-9);
        for w in results.windows(2) {
            assert!(w[0].posterior >= w[1].posterior);
        }
    }

    #[test]
    /// Two runs with the same seed produce identical results
    fn deterministic() {
        let run = |seed| {
            let mut search = MetropolisSearch::new(data(), Box::new(AdaptiveCodeLearner::mml()), config(seed)).unwrap();
            search.run().into_iter().map(|r| (r.tom, r.visits)).collect::<Vec<(Tom, u64)>>()
        };
        assert_eq!(run(17), run(17));
    }

    #[test]
    fn arc_posteriors() {
        let mut cfg = config(3);
        cfg.update_arc_weights = true;
        let mut search = MetropolisSearch::with_grouping(
            data(),
            Box::new(AdaptiveCodeLearner::mml()),
            Box::new(UniformTomCoster::new(0.5)),
            cfg,
            DagGrouping
        ).unwrap();
        assert!(search.arc_posteriors().is_none());

        search.run();
        let posteriors = search.arc_posteriors().unwrap();
        assert!(posteriors.iter().all(|&p| p >= -1e-9 && p <= 1.0 + 1e-9));
        // 0 and 1 are almost always joined, in one direction or the other
        assert!(posteriors[[0, 1]] + posteriors[[1, 0]] > 0.9);
    }

    #[test]
    fn initial_tom_size() {
        let search = MetropolisSearch::new(data(), Box::new(AdaptiveCodeLearner::mml()), config(1)).unwrap();
        assert!(search.with_initial_tom(Tom::new(4, 2)).is_err());

        let search = MetropolisSearch::new(data(), Box::new(AdaptiveCodeLearner::mml()), config(1)).unwrap();
        let mut tom = Tom::new(3, 2);
        tom.add_arc(0, 1);
        let search = search.with_initial_tom(tom.clone()).unwrap();
        assert_eq!(&tom, search.best_tom());
    }
}

//! Defines the `EmIntegrator`, which learns a structure with one hidden variable.
//!
//! The integrator alternates between re-estimating the hidden variable's soft assignment (E-step)
//! and re-running the structure search on the re-weighted augmented table, whose best structure
//! is then re-parameterized (M-step). Once the best cost settles, the latent model is compared
//! against a search over the observed data alone and kept only if it is cheaper.

use crate::config::LatentConfig;
use crate::dataset::Dataset;
use crate::em::init::{initial_structure, random_responsibilities};
use crate::em::table::{max_change, AugmentedTable};
use crate::latent::{Detection, LatentDetector};
use crate::model::{AdaptiveCodeLearner, ModelLearner, NetworkParams};
use crate::search::{ExpertTomCoster, MetropolisSearch, SearchResult, Tom, TomCoster, UniformTomCoster};
use crate::util::Result;

use ndarray::prelude as nd;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use std::sync::Arc;

/// The result of latent variable discovery
#[derive(Clone, Debug)]
pub struct LatentOutcome {

    /// The latent model was cheaper than the fully observed one
    pub retained: bool,

    /// Cost of the latent model without the hidden column's own data term
    pub latent_cost: f64,

    /// Cost of the best fully observed structure
    pub observed_cost: f64,

    /// EM iterations run
    pub iterations: usize,

    /// Best structure over the hidden node (index 0) and the observed nodes (shifted by one)
    pub tom: Tom,

    pub params: NetworkParams,

    /// ```[[i, h]]``` is the final share of observed row `i` in hidden state `h`
    pub responsibilities: nd::Array2<f64>,

    pub detection: Detection,

    /// Ranked results of the fully observed search
    pub observed_results: Vec<SearchResult>

}

/// Fixed-structure EM: alternate M and E steps on `tom` until no responsibility moves by
/// `threshold` or `iterations` rounds have run.
///
/// # Returns
/// the final parameters and responsibilities
pub fn standard_em(
    table: &AugmentedTable,
    tom: &Tom,
    responsibilities: nd::Array2<f64>,
    learner: &dyn ModelLearner,
    iterations: usize,
    threshold: f64
) -> Result<(NetworkParams, nd::Array2<f64>)> {
    let mut responsibilities = responsibilities;
    let mut params = NetworkParams::estimate(tom, &table.weighted(&responsibilities)?, learner)?;

    for iteration in 0..iterations {
        let next = table.e_step(&params);
        let change = max_change(&responsibilities, &next);
        responsibilities = next;
        params = NetworkParams::estimate(tom, &table.weighted(&responsibilities)?, learner)?;

        debug!(iteration, change, "fixed-structure EM");
        if change < threshold {
            break;
        }
    }

    Ok((params, responsibilities))
}

/// Learns whether a single hidden variable improves the model of a dataset
pub struct EmIntegrator {
    config: LatentConfig
}

impl EmIntegrator {

    /// Build an integrator; the configuration is validated up front
    pub fn new(config: LatentConfig) -> Result<Self> {
        config.validate()?;
        Ok(EmIntegrator { config })
    }

    pub fn config(&self) -> &LatentConfig {
        &self.config
    }

    /// Detect a trigger in `data`, then run EM-search from the structure it suggests.
    pub fn run(&self, data: &Dataset) -> Result<LatentOutcome> {
        let detection = LatentDetector::from_config(&self.config).detect(data)?;
        self.run_with_detection(data, detection)
    }

    /// Run EM-search on `data` from a given detection result.
    ///
    /// # Args
    /// * `data`: the observed data
    /// * `detection`: a trigger match fixes the structure around the hidden node; otherwise the
    ///   configured initialisation places it
    pub fn run_with_detection(&self, data: &Dataset, detection: Detection) -> Result<LatentOutcome> {
        let search = &self.config.search;
        let n = data.num_vars();
        let learner = AdaptiveCodeLearner::mml().with_max_cells(search.max_table_cells);
        let mut rng = match search.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy()
        };

        info!(
            vars = n,
            rows = data.num_rows(),
            matched = detection.is_matched(),
            latent_arity = self.config.latent_arity,
            "starting latent search"
        );

        ///////////////////////////////////////////////////////////////////////////////
        // 1. augmented table, initial weights and structure
        let table = AugmentedTable::new(data, self.config.latent_arity)?;
        let mut responsibilities = random_responsibilities(data, self.config.latent_arity, &mut rng);
        let mut tom = initial_structure(
            self.config.initialisation,
            &detection,
            search.max_num_parents,
            search.initial_arc_prob,
            &mut rng
        )?;

        // a matched trigger pins every pair among the hidden node and the matched subset
        let fixed = match &detection {
            Detection::Matched { subset, .. } => {
                let mut nodes = vec![0];
                nodes.extend(subset.iter().map(|v| v + 1));
                Some((nodes, tom.arcs()))
            },
            Detection::NotMatched { .. } => {
                let (_, refined) = standard_em(
                    &table,
                    &tom,
                    responsibilities,
                    &learner,
                    self.config.em_iterations,
                    self.config.em_threshold
                )?;
                responsibilities = refined;
                None
            }
        };

        ///////////////////////////////////////////////////////////////////////////////
        // 2. EM-search
        let mut weighted = table.weighted(&responsibilities)?;
        let mut params = NetworkParams::estimate(&tom, &weighted, &learner)?;
        let mut cost = f64::INFINITY;
        let mut iterations = 0;

        for i in 0..self.config.em_iterations {
            if i > 0 {
                responsibilities = table.e_step(&params);
                weighted = table.weighted(&responsibilities)?;
            }

            let coster: Box<dyn TomCoster> = match &fixed {
                Some((nodes, arcs)) => Box::new(ExpertTomCoster::fixing(n + 1, search.initial_arc_prob, nodes, arcs)?),
                None => Box::new(UniformTomCoster::new(search.initial_arc_prob))
            };
            let mut config = search.clone();
            config.seed = search.seed.map(|s| s.wrapping_add(i as u64 + 1));

            let mut sampler = MetropolisSearch::with_prior(Arc::new(weighted.clone()), Box::new(learner.clone()), coster, config)?
                .with_initial_tom(tom)?;
            sampler.run();
            tom = sampler.best_tom().clone();
            let new_cost = sampler.best_cost();

            params = NetworkParams::estimate(&tom, &weighted, &learner)?;
            iterations = i + 1;

            let converged = (new_cost - cost).abs() < cost.abs() * self.config.convergence_tolerance;
            debug!(iteration = i, cost = new_cost, previous = cost, converged, "EM iteration");
            cost = new_cost;
            if converged {
                break;
            }
        }

        ///////////////////////////////////////////////////////////////////////////////
        // 3. latent cost without the hidden column's data term
        let hidden = AdaptiveCodeLearner::plain()
            .with_max_cells(search.max_table_cells)
            .parameterize_and_cost(&weighted, 0, tom.parents(0))?;
        let latent_cost = cost - hidden;

        ///////////////////////////////////////////////////////////////////////////////
        // 4. fully observed baseline
        let mut baseline = MetropolisSearch::new(Arc::new(data.clone()), Box::new(learner.clone()), search.clone())?;
        let observed_results = baseline.run();
        let observed_cost = baseline.best_cost();

        let retained = latent_cost < observed_cost;
        info!(latent_cost, observed_cost, iterations, retained, "latent search finished");

        Ok(LatentOutcome {
            retained,
            latent_cost,
            observed_cost,
            iterations,
            tom,
            params,
            responsibilities,
            detection,
            observed_results
        })
    }

}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::config::LatentInitialisation;

    /// Four binary variables; 0 and 1 copy a shared coin most of the time, 2 and 3 are noise
    fn data() -> Dataset {
        let rows: Vec<[usize; 4]> = (0..120)
            .map(|r| {
                let coin = r % 2;
                let x1 = if r % 9 == 0 { 1 - coin } else { coin };
                [coin, x1, (r / 2) % 2, (r / 4) % 2]
            })
            .collect();
        Dataset::from_codes(&["a", "b", "c", "d"], vec![2; 4], nd::arr2(&rows)).unwrap()
    }

    fn config() -> LatentConfig {
        let mut config = LatentConfig::default();
        config.em_iterations = 2;
        config.search.seed = Some(5);
        config.search.search_factor = 0.05;
        config
    }

    #[test]
    /// Each observed row's weights over its hidden copies sum to one after every E-step
    fn standard_em_keeps_weights_normalized() {
        let data = data();
        let table = AugmentedTable::new(&data, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let q = random_responsibilities(&data, 2, &mut rng);
        let tom = Tom::from_parents(vec![vec![], vec![0], vec![0], vec![0], vec![0]], 3).unwrap();

        let (params, q) = standard_em(&table, &tom, q, &AdaptiveCodeLearner::mml(), 5, 1e-6).unwrap();
        assert_eq!(5, params.num_vars());
        for row in q.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn invalid_config() {
        let mut config = config();
        config.latent_arity = 1;
        assert!(EmIntegrator::new(config).is_err());
    }

    #[test]
    fn runs_without_trigger() {
        for init in [LatentInitialisation::LatentAsRoot, LatentInitialisation::UsingDependencies, LatentInitialisation::Random].iter() {
            let mut config = config();
            config.initialisation = *init;
            let integrator = EmIntegrator::new(config).unwrap();

            let data = data();
            let marginal = nd::Array2::ones((4, 4)) - nd::Array2::<u8>::eye(4);
            let detection = Detection::NotMatched { best_mismatches: 10, marginal };

            let outcome = integrator.run_with_detection(&data, detection).unwrap();
            assert!(outcome.iterations >= 1 && outcome.iterations <= 2);
            assert_eq!(5, outcome.tom.num_vars());
            assert!(outcome.tom.is_consistent());
            assert_eq!((120, 2), outcome.responsibilities.dim());
            for row in outcome.responsibilities.outer_iter() {
                assert!((row.sum() - 1.0).abs() < 1e-9);
            }
            assert!(outcome.observed_cost.is_finite());
            assert!(outcome.latent_cost.is_finite());
            assert_eq!(outcome.retained, outcome.latent_cost < outcome.observed_cost);
            assert!(!outcome.observed_results.is_empty());
        }
    }
}

//! Defines the `LatentDetector`, which looks for trigger patterns among observed variables.
//!
//! Every four-variable subset is fingerprinted with a chi-square test and matched against the
//! trigger signatures, in lexicographic subset order. The first subset that matches wins.

use crate::config::LatentConfig;
use crate::dataset::Dataset;
use crate::latent::dependency::{dependency_matrix, extract};
use crate::latent::independence::{ChiSquareTest, IndependenceTest};
use crate::latent::trigger::{TriggerMatcher, TriggerSignature, SIGNATURE_OBSERVED};
use crate::util::{Result, TomSearchError};

use itertools::Itertools;
use ndarray::prelude as nd;
use tracing::info;

/// Fewest observed variables latent detection supports
pub const MIN_VARIABLES: usize = 4;

/// Most observed variables latent detection supports
pub const MAX_VARIABLES: usize = 7;

/// The outcome of latent detection
#[derive(Clone, Debug)]
pub enum Detection {

    /// A subset matched a trigger
    Matched {

        /// The matching subset, in increasing order
        subset: Vec<usize>,

        /// Observed variables outside the subset
        remaining: Vec<usize>,

        mismatches: usize,

        /// The matched structure in local indices: hidden at 0, ```subset[i]``` at ```i + 1```
        local: TriggerSignature,

        /// The matched structure over all variables: hidden at 0, observed ```v``` at ```v + 1```
        global: nd::Array2<u8>

    },

    /// No subset matched
    NotMatched {

        /// Fewest mismatches seen over all subsets
        best_mismatches: usize,

        /// Marginal dependencies among all observed variables
        marginal: nd::Array2<u8>

    }

}

impl Detection {

    pub fn is_matched(&self) -> bool {
        match self {
            Detection::Matched { .. } => true,
            Detection::NotMatched { .. } => false
        }
    }

    /// Mismatches of the best candidate
    pub fn mismatches(&self) -> usize {
        match self {
            Detection::Matched { mismatches, .. } => *mismatches,
            Detection::NotMatched { best_mismatches, .. } => *best_mismatches
        }
    }

}

/// Trigger detection over four to seven observed variables
pub struct LatentDetector {

    matcher: TriggerMatcher,

    /// Significance level of the independence tests
    alpha: f64

}

impl LatentDetector {

    pub fn new(alpha: f64, error_rate: f64) -> Self {
        LatentDetector { matcher: TriggerMatcher::new(error_rate), alpha }
    }

    pub fn from_config(config: &LatentConfig) -> Self {
        LatentDetector::new(config.alpha, config.error_rate)
    }

    /// Run detection with chi-square tests on `data`
    pub fn detect(&self, data: &Dataset) -> Result<Detection> {
        let test = ChiSquareTest::new(data, self.alpha);
        self.detect_with(&test, data.num_vars())
    }

    /// Run detection over `num_vars` variables with an arbitrary test
    pub fn detect_with(&self, test: &dyn IndependenceTest, num_vars: usize) -> Result<Detection> {
        if !(MIN_VARIABLES..=MAX_VARIABLES).contains(&num_vars) {
            return Err(TomSearchError::UnsupportedVariableCount {
                found: num_vars,
                min: MIN_VARIABLES,
                max: MAX_VARIABLES
            });
        }

        let mut best_mismatches = usize::MAX;
        for subset in (0..num_vars).combinations(SIGNATURE_OBSERVED) {
            let fingerprint = extract(test, &subset);
            let result = self.matcher.match_fingerprint(&fingerprint)?;
            best_mismatches = best_mismatches.min(result.mismatches);

            if result.matched {
                let remaining: Vec<usize> = (0..num_vars).filter(|v| !subset.contains(v)).collect();
                let global = globalize(&result.structure, &subset, num_vars);
                info!(?subset, mismatches = result.mismatches, signature = result.signature, "trigger matched");
                return Ok(Detection::Matched {
                    subset,
                    remaining,
                    mismatches: result.mismatches,
                    local: result.structure,
                    global
                });
            }
        }

        let all: Vec<usize> = (0..num_vars).collect();
        let marginal = dependency_matrix(test, &all, &[]);
        info!(best_mismatches, "no trigger matched");
        Ok(Detection::NotMatched { best_mismatches, marginal })
    }

}

/// Map a structure over the hidden node and `subset` onto all `num_vars` observed variables
fn globalize(local: &TriggerSignature, subset: &[usize], num_vars: usize) -> nd::Array2<u8> {
    let map = |i: usize| if i == 0 { 0 } else { subset[i - 1] + 1 };
    let mut global = nd::Array2::zeros((num_vars + 1, num_vars + 1));
    for ((i, j), &a) in local.adjacency.indexed_iter() {
        if a != 0 {
            global[[map(i), map(j)]] = 1;
        }
    }
    global
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::latent::dsep::DSeparationOracle;

    /// Observed variables of a DAG with a hidden node at 0, seen as variables ```0..n```
    struct Observed(DSeparationOracle);

    impl IndependenceTest for Observed {
        fn is_dependent(&self, a: usize, b: usize, given: &[usize]) -> bool {
            let given: Vec<usize> = given.iter().map(|g| g + 1).collect();
            self.0.is_dependent(a + 1, b + 1, &given)
        }
    }

    #[test]
    fn unsupported_sizes() {
        let detector = LatentDetector::new(0.05, 0.005);
        let oracle = DSeparationOracle::new(vec![vec![]; 8]);
        assert!(detector.detect_with(&oracle, 3).is_err());
        assert!(detector.detect_with(&oracle, 8).is_err());
    }

    #[test]
    /// A trigger embedded among five observed variables is found with its global structure
    fn embedded_trigger() {
        // hidden 0; trigger 1 over observed 0, 1, 3, 4 (nodes 1, 2, 4, 5); observed 2 (node 3) isolated
        let mut parents = vec![Vec::new(); 6];
        parents[2] = vec![1];
        parents[4] = vec![0, 2];
        parents[5] = vec![0, 1];
        let oracle = Observed(DSeparationOracle::new(parents));

        let detection = LatentDetector::new(0.05, 0.005).detect_with(&oracle, 5).unwrap();
        match detection {
            Detection::Matched { subset, remaining, mismatches, global, .. } => {
                assert_eq!(vec![0, 1, 3, 4], subset);
                assert_eq!(vec![2], remaining);
                assert_eq!(0, mismatches);
                assert_eq!((6, 6), global.dim());
                assert_eq!(1, global[[0, 4]]);
                assert_eq!(1, global[[0, 5]]);
                assert_eq!(5, global.iter().filter(|&&a| a != 0).count());
            },
            Detection::NotMatched { .. } => panic!("the embedded trigger should match")
        }
    }

    #[test]
    fn no_trigger() {
        // a chain over five observed variables
        let oracle = DSeparationOracle::new(vec![vec![], vec![0], vec![1], vec![2], vec![3]]);
        let detection = LatentDetector::new(0.05, 0.005).detect_with(&oracle, 5).unwrap();
        assert!(!detection.is_matched());
        match detection {
            Detection::NotMatched { marginal, best_mismatches } => {
                assert!(best_mismatches > 0);
                assert_eq!(20, marginal.sum());
            },
            _ => unreachable!()
        }
    }
}

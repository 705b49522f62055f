//! Tunable parameters of a structure search and of latent variable discovery.
//!
//! The defaults are empirically tuned values. Every run validates its configuration before doing
//! any work, so a bad value is reported up front rather than discovered mid-search.

use crate::util::{Result, TomSearchError};

use serde::{Deserialize, Serialize};

/// Relative frequency with which the sampler draws each move operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveWeights {
    pub skeletal: f64,
    pub temporal: f64,
    pub double_skeletal: f64,
    pub parent_swap: f64,
}

impl Default for MoveWeights {
    fn default() -> Self {
        MoveWeights {
            skeletal: 0.4,
            temporal: 0.25,
            double_skeletal: 0.2,
            parent_swap: 0.15,
        }
    }
}

/// Configuration of a single Metropolis structure search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Seed for the run's random generator. `None` seeds from system entropy
    pub seed: Option<u64>,

    /// Scales the search length. 0.5 halves it, 2.0 doubles it
    pub search_factor: f64,

    /// Maximum number of equivalence classes retained in the results
    pub max_num_secs: usize,

    /// Minimal total posterior the retained classes should cover
    pub min_total_posterior: f64,

    /// Upper bound on the size of any parent set
    pub max_num_parents: usize,

    /// Arc probability used until it is re-estimated after burn-in
    pub initial_arc_prob: f64,

    /// Metropolis temperature
    pub temperature: f64,

    /// Safe mode is switched on while the current cost exceeds the best cost by this much
    pub safe_cap: f64,

    /// Accumulate per-arc posterior weights while sampling
    pub update_arc_weights: bool,

    /// Bound on cached node costs. `None` caches without limit
    pub cache_capacity: Option<usize>,

    /// Largest conditional table (parent configurations times child states) a learner may fit
    pub max_table_cells: usize,

    pub move_weights: MoveWeights,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            seed: None,
            search_factor: 1.0,
            max_num_secs: 30,
            min_total_posterior: 0.999,
            max_num_parents: 7,
            initial_arc_prob: 0.5,
            temperature: 1.0,
            safe_cap: 40.0,
            update_arc_weights: false,
            cache_capacity: None,
            max_table_cells: 1 << 22,
            move_weights: MoveWeights::default(),
        }
    }
}

impl SearchConfig {

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<()> {
        if !(0.05..=50.0).contains(&self.search_factor) {
            return Err(TomSearchError::config("search_factor", format!("{} not in [0.05, 50]", self.search_factor)));
        }

        if !(3..=1000).contains(&self.max_num_secs) {
            return Err(TomSearchError::config("max_num_secs", format!("{} not in [3, 1000]", self.max_num_secs)));
        }

        if !(0.30..=1.0).contains(&self.min_total_posterior) {
            return Err(TomSearchError::config(
                "min_total_posterior",
                format!("{} not in [0.3, 1]", self.min_total_posterior)
            ));
        }

        if !(self.initial_arc_prob > 0.0 && self.initial_arc_prob < 1.0) {
            return Err(TomSearchError::config("initial_arc_prob", "must lie strictly between 0 and 1"));
        }

        if !(self.temperature > 0.0 && self.temperature.is_finite()) {
            return Err(TomSearchError::config("temperature", "must be positive and finite"));
        }

        if self.safe_cap.is_nan() || self.safe_cap <= 0.0 {
            return Err(TomSearchError::config("safe_cap", "must be positive"));
        }

        if self.max_table_cells == 0 {
            return Err(TomSearchError::config("max_table_cells", "must be positive"));
        }

        if let Some(0) = self.cache_capacity {
            return Err(TomSearchError::config("cache_capacity", "must be positive when set"));
        }

        let w = &self.move_weights;
        let weights = [w.skeletal, w.temporal, w.double_skeletal, w.parent_swap];
        if weights.iter().any(|x| !(x.is_finite() && *x >= 0.0)) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(TomSearchError::config("move_weights", "weights must be non-negative with a positive sum"));
        }

        Ok(())
    }

}

/// How the hidden node is wired into the initial structure when no trigger matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatentInitialisation {
    /// The hidden node is a parent of every observed node
    LatentAsRoot,

    /// Marginally independent pairs become parents of the hidden node, the rest its children
    UsingDependencies,

    /// A random structure in which the hidden node has several parents or several children
    Random,
}

/// Configuration of trigger detection and the EM integrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatentConfig {
    /// Significance level of the conditional independence tests
    pub alpha: f64,

    /// Fraction of mismatched dependency entries tolerated by the trigger matcher
    pub error_rate: f64,

    /// Cap on EM iterations
    pub em_iterations: usize,

    /// Fixed-structure EM stops once no row weight moves by more than this
    pub em_threshold: f64,

    /// EM-search stops when the best cost changes by less than this fraction
    pub convergence_tolerance: f64,

    /// Number of states of the hidden variable
    pub latent_arity: usize,

    pub initialisation: LatentInitialisation,

    pub search: SearchConfig,
}

impl Default for LatentConfig {
    fn default() -> Self {
        LatentConfig {
            alpha: 0.05,
            error_rate: 0.005,
            em_iterations: 10,
            em_threshold: 1e-6,
            convergence_tolerance: 0.001,
            latent_arity: 2,
            initialisation: LatentInitialisation::LatentAsRoot,
            search: SearchConfig::default(),
        }
    }
}

impl LatentConfig {

    /// Load a configuration from JSON. Missing fields take their default values.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: LatentConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its allowed range, including the nested search configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.01..=0.99).contains(&self.alpha) {
            return Err(TomSearchError::config("alpha", format!("{} not in [0.01, 0.99]", self.alpha)));
        }

        if !(0.0..=1.0).contains(&self.error_rate) {
            return Err(TomSearchError::config("error_rate", format!("{} not in [0, 1]", self.error_rate)));
        }

        if !(1..=10_000).contains(&self.em_iterations) {
            return Err(TomSearchError::config("em_iterations", format!("{} not in [1, 10000]", self.em_iterations)));
        }

        if !(1e-11..=0.1).contains(&self.em_threshold) {
            return Err(TomSearchError::config("em_threshold", format!("{} not in [1e-11, 0.1]", self.em_threshold)));
        }

        if !(self.convergence_tolerance > 0.0 && self.convergence_tolerance < 1.0) {
            return Err(TomSearchError::config("convergence_tolerance", "must lie strictly between 0 and 1"));
        }

        if !(2..=6).contains(&self.latent_arity) {
            return Err(TomSearchError::config("latent_arity", format!("{} not in [2, 6]", self.latent_arity)));
        }

        self.search.validate()
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SearchConfig::default().validate().is_ok());
        assert!(LatentConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range() {
        let mut config = LatentConfig::default();
        config.alpha = 0.0;
        match config.validate() {
            Err(TomSearchError::InvalidConfig { field, .. }) => assert_eq!("alpha", field),
            _ => panic!("alpha = 0 should be rejected")
        }

        let mut config = LatentConfig::default();
        config.search.max_num_secs = 1;
        assert!(config.validate().is_err());

        let mut config = SearchConfig::default();
        config.move_weights = MoveWeights { skeletal: 0.0, temporal: 0.0, double_skeletal: 0.0, parent_swap: 0.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    /// Fields missing from the JSON fall back to their defaults
    fn partial_json() {
        let config = LatentConfig::from_json(r#"{ "alpha": 0.1, "search": { "seed": 7 } }"#).unwrap();
        assert_eq!(0.1, config.alpha);
        assert_eq!(Some(7), config.search.seed);
        assert_eq!(2, config.latent_arity);
        assert_eq!(30, config.search.max_num_secs);

        assert!(LatentConfig::from_json(r#"{ "latent_arity": 9 }"#).is_err());
        assert!(LatentConfig::from_json("not json").is_err());
    }
}

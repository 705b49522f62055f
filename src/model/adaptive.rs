//! Defines the `AdaptiveCodeLearner`, a multinomial learner that costs each parent configuration
//! with an adaptive code.
//!
//! For a parent configuration with child counts ```n_1 .. n_m``` summing to ```N```, the adaptive
//! code sends the child column in
//!
//! ```text
//!     lnΓ(N + m) - lnΓ(m) - Σ lnΓ(n_i + 1)
//! ```
//!
//! nits. The MML variant adds a constant ```(m - 1) * 0.17649``` per configuration, approximating
//! the difference between the adaptive and the MML multinomial code.

use super::{LocalModel, ModelLearner, SufficientStats};

use ndarray::prelude as nd;
use statrs::function::gamma::ln_gamma;

/// Per free parameter correction applied by the MML variant
pub const MML_CORRECTION: f64 = 0.17649;

/// Multinomial learner costing data with an adaptive code
#[derive(Clone, Debug)]
pub struct AdaptiveCodeLearner {

    /// Pseudo-count added to every cell when estimating parameters
    bias: f64,

    /// Add the MML correction to the cost
    mml_correction: bool,

    /// Largest conditional table that will be fit
    max_cells: usize

}

impl AdaptiveCodeLearner {

    /// The adaptive code with the MML correction, used to cost structures
    pub fn mml() -> Self {
        AdaptiveCodeLearner { bias: 0.5, mml_correction: true, max_cells: 1 << 22 }
    }

    /// The adaptive code without correction, used to cost the hidden column
    pub fn plain() -> Self {
        AdaptiveCodeLearner { bias: 0.5, mml_correction: false, max_cells: 1 << 22 }
    }

    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    pub fn with_bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }

    /// Cost of a single row of counts
    fn config_cost(&self, counts: nd::ArrayView1<f64>) -> f64 {
        let m = counts.len() as f64;
        let total: f64 = counts.sum();

        let mut cost = ln_gamma(total + m) - ln_gamma(m);
        for &n in counts.iter() {
            cost -= ln_gamma(n + 1.0);
        }

        if self.mml_correction {
            cost += (m - 1.0) * MML_CORRECTION;
        }

        cost
    }

}

impl ModelLearner for AdaptiveCodeLearner {

    fn name(&self) -> String {
        if self.mml_correction {
            String::from("adaptive code (MML)")
        } else {
            String::from("adaptive code")
        }
    }

    fn max_table_cells(&self) -> usize {
        self.max_cells
    }

    fn s_parameterize(&self, stats: SufficientStats) -> LocalModel {
        // theta x|u = (M[u, x] + bias) / (M[u] + m * bias)
        let m = stats.child_arity() as f64;
        let mut params = stats.counts.clone();

        for mut row in params.outer_iter_mut() {
            let denom = row.sum() + m * self.bias;
            row.mapv_inplace(|n| (n + self.bias) / denom);
        }

        LocalModel { stats, params }
    }

    /// The adaptive code does not depend on stated parameters; only the counts matter.
    fn s_cost(&self, stats: &SufficientStats, _params: &nd::Array2<f64>) -> f64 {
        stats.counts.outer_iter().map(|row| self.config_cost(row)).sum()
    }

}

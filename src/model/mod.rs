//! Defines the `ModelLearner` trait, which fits and costs the conditional distribution of one
//! variable given a set of parents.
//!
//! The structure search never fits a distribution itself; it only asks a `ModelLearner` for the
//! message length of a child given a parent set. Learners work from weighted `SufficientStats`,
//! so the same learner handles plain and EM-weighted data.

use crate::dataset::Dataset;
use crate::util::{Result, TomSearchError};

use ndarray::prelude as nd;

pub mod adaptive;
pub mod network;

pub use self::adaptive::AdaptiveCodeLearner;
pub use self::network::NetworkParams;

/// Weighted counts of a child variable for each configuration of its parents.
#[derive(Clone, Debug)]
pub struct SufficientStats {

    /// The child variable
    pub child: usize,

    /// The parent variables, in increasing order
    pub parents: Vec<usize>,

    /// The arity of each parent, in the order of `parents`
    pub parent_arities: Vec<usize>,

    /// ```counts[[u, x]]``` is the total weight of rows with parent configuration `u` and child
    /// state `x`
    pub counts: nd::Array2<f64>

}

impl SufficientStats {

    /// Count the weighted occurrences of `child` given `parents` in `data`.
    ///
    /// # Args
    /// * `max_cells`: the largest table that may be allocated
    ///
    /// # Returns
    /// the counts, or a `ModelFit` error when the table would exceed `max_cells`
    pub fn count(data: &Dataset, child: usize, parents: &[usize], max_cells: usize) -> Result<Self> {
        let parent_arities: Vec<usize> = parents.iter().map(|&p| data.arity(p)).collect();
        let child_arity = data.arity(child);

        let cells = parent_arities
            .iter()
            .try_fold(child_arity, |acc, &a| acc.checked_mul(a))
            .filter(|&c| c <= max_cells);

        if cells.is_none() {
            return Err(TomSearchError::ModelFit {
                var: child,
                message: format!("{} parents exceed the table limit of {} cells", parents.len(), max_cells)
            });
        }

        let num_configs = parent_arities.iter().product::<usize>();
        let mut counts = nd::Array2::zeros((num_configs, child_arity));

        for r in 0..data.num_rows() {
            let w = data.weight(r);
            if w == 0.0 {
                continue;
            }
            let row = data.row(r);
            let u = parent_config(parents, &parent_arities, |v| row[v]);
            counts[[u, row[child]]] += w;
        }

        Ok(SufficientStats { child, parents: parents.to_vec(), parent_arities, counts })
    }

    /// The number of child states
    pub fn child_arity(&self) -> usize {
        self.counts.ncols()
    }

    /// The number of parent configurations
    pub fn num_configs(&self) -> usize {
        self.counts.nrows()
    }

}

/// Index of the parent configuration of a row, with the first parent most significant.
///
/// # Args
/// * `parents`: the parent variables
/// * `arities`: the arity of each parent
/// * `value`: looks up the value of a variable in the row
pub fn parent_config<F: Fn(usize) -> usize>(parents: &[usize], arities: &[usize], value: F) -> usize {
    parents
        .iter()
        .zip(arities.iter())
        .fold(0, |acc, (&p, &a)| acc * a + value(p))
}

/// A fitted conditional distribution: the learner's sufficient statistics and parameters.
#[derive(Clone, Debug)]
pub struct LocalModel {

    pub stats: SufficientStats,

    /// ```params[[u, x]] = P(child = x | parents = u)```
    pub params: nd::Array2<f64>

}

impl LocalModel {

    pub fn child(&self) -> usize {
        self.stats.child
    }

    pub fn parents(&self) -> &[usize] {
        &self.stats.parents
    }

}

/// A `ModelLearner` fits and costs the distribution of a child variable given its parents.
pub trait ModelLearner {

    /// A short human readable name, used in log messages
    fn name(&self) -> String;

    /// The largest conditional table this learner will fit
    fn max_table_cells(&self) -> usize;

    /// Estimate parameters from sufficient statistics
    fn s_parameterize(&self, stats: SufficientStats) -> LocalModel;

    /// Message length of data summarized by `stats` under `params`
    fn s_cost(&self, stats: &SufficientStats, params: &nd::Array2<f64>) -> f64;

    /// Fit the distribution of `child` given `parents` to `data`
    fn parameterize(&self, data: &Dataset, child: usize, parents: &[usize]) -> Result<LocalModel> {
        let stats = SufficientStats::count(data, child, parents, self.max_table_cells())?;
        Ok(self.s_parameterize(stats))
    }

    /// Message length of `data` under an already fitted `model`
    fn cost(&self, model: &LocalModel, data: &Dataset) -> Result<f64> {
        let stats = SufficientStats::count(data, model.child(), model.parents(), self.max_table_cells())?;
        Ok(self.s_cost(&stats, &model.params))
    }

    /// Fit and cost in one step
    fn parameterize_and_cost(&self, data: &Dataset, child: usize, parents: &[usize]) -> Result<f64> {
        let model = self.parameterize(data, child, parents)?;
        Ok(self.s_cost(&model.stats, &model.params))
    }

}

//! Defines `NetworkParams`, the conditional probability tables of every node of a `Tom`.
//!
//! Parameters are estimated node by node; the likelihood decomposes over the nodes, so the joint
//! probability of a full row is the product of each node's conditional probability (chain rule).

use crate::dataset::Dataset;
use crate::model::{parent_config, ModelLearner};
use crate::search::tom::Tom;
use crate::util::{Result, TomSearchError};

use ndarray::prelude as nd;

/// Conditional probability tables for every node of a `Tom`
#[derive(Clone, Debug)]
pub struct NetworkParams {

    /// The parents of each variable
    parents: Vec<Vec<usize>>,

    /// The number of states of each variable
    arities: Vec<usize>,

    /// ```tables[v][[u, x]] = P(v = x | parents(v) = u)```
    tables: Vec<nd::Array2<f64>>,

    /// A topological order of the variables
    order: Vec<usize>

}

impl NetworkParams {

    /// Estimate every node's table from `data` with `learner`.
    pub fn estimate(tom: &Tom, data: &Dataset, learner: &dyn ModelLearner) -> Result<Self> {
        if tom.num_vars() != data.num_vars() {
            return Err(TomSearchError::ShapeMismatch(
                format!("structure has {} variables, data has {}", tom.num_vars(), data.num_vars())
            ));
        }

        let mut tables = Vec::with_capacity(tom.num_vars());
        for v in 0..tom.num_vars() {
            tables.push(learner.parameterize(data, v, tom.parents(v))?.params);
        }

        Ok(NetworkParams {
            parents: tom.parent_sets().to_vec(),
            arities: data.arities().to_vec(),
            tables,
            order: tom.order().to_vec()
        })
    }

    /// Build from explicit tables.
    ///
    /// # Args
    /// * `tom`: the structure
    /// * `arities`: the number of states of each variable
    /// * `tables`: one table per variable, ```parent configurations x states```, rows summing to 1
    pub fn from_tables(tom: &Tom, arities: Vec<usize>, tables: Vec<nd::Array2<f64>>) -> Result<Self> {
        if arities.len() != tom.num_vars() || tables.len() != tom.num_vars() {
            return Err(TomSearchError::ShapeMismatch(String::from("one arity and one table per variable")));
        }

        for (v, table) in tables.iter().enumerate() {
            let configs: usize = tom.parents(v).iter().map(|&p| arities[p]).product();
            if table.dim() != (configs, arities[v]) {
                return Err(TomSearchError::ShapeMismatch(
                    format!("table of variable {} is {:?}, expected {:?}", v, table.dim(), (configs, arities[v]))
                ));
            }
            let bad_row = table.outer_iter().any(|row| {
                row.iter().any(|&p| !(0.0..=1.0).contains(&p)) || (row.sum() - 1.0).abs() > 1e-6
            });
            if bad_row {
                return Err(TomSearchError::ModelFit {
                    var: v,
                    message: String::from("table rows must be probability distributions")
                });
            }
        }

        Ok(NetworkParams {
            parents: tom.parent_sets().to_vec(),
            arities,
            tables,
            order: tom.order().to_vec()
        })
    }

    pub fn num_vars(&self) -> usize {
        self.tables.len()
    }

    pub fn arity(&self, var: usize) -> usize {
        self.arities[var]
    }

    pub fn parents(&self, var: usize) -> &[usize] {
        &self.parents[var]
    }

    /// The conditional table of `var`
    pub fn table(&self, var: usize) -> &nd::Array2<f64> {
        &self.tables[var]
    }

    /// Variables in an order where parents come first
    pub fn topological_order(&self) -> &[usize] {
        &self.order
    }

    /// The row of `var`'s table selected by the parent values in `value`
    pub fn distribution<F: Fn(usize) -> usize>(&self, var: usize, value: F) -> nd::ArrayView1<f64> {
        let ps = &self.parents[var];
        let arities: Vec<usize> = ps.iter().map(|&p| self.arities[p]).collect();
        let u = parent_config(ps, &arities, value);
        self.tables[var].row(u)
    }

    /// ```P(var = row[var] | parents = row[parents])```
    pub fn probability(&self, var: usize, row: &[usize]) -> f64 {
        self.distribution(var, |v| row[v])[row[var]]
    }

    /// Natural log of the joint probability of a full row, by the chain rule
    pub fn log_probability(&self, row: &[usize]) -> f64 {
        (0..self.num_vars()).map(|v| self.probability(v, row).ln()).sum()
    }

}

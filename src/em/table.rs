//! Defines the `AugmentedTable`, the observed data with one copy of every row per hidden state.
//!
//! The hidden variable is column 0 and the observed columns shift right by one. Row
//! ```h * N + i``` is observed row `i` with the hidden variable set to `h`. The soft membership of
//! each observed row in each hidden state is held separately as a ```N x k``` matrix of
//! responsibilities and turned into row weights on demand, so the observed data is never mutated.

use crate::dataset::Dataset;
use crate::model::NetworkParams;
use crate::util::{Result, TomSearchError};

use ndarray::prelude as nd;

/// Name given to the hidden column unless an observed column already uses it
pub const LATENT_NAME: &str = "latent";

pub struct AugmentedTable {

    observed: Dataset,

    latent_arity: usize,

    /// The augmented rows, unweighted
    augmented: Dataset

}

impl AugmentedTable {

    /// Build the augmented table of `observed` for a hidden variable with `latent_arity` states
    pub fn new(observed: &Dataset, latent_arity: usize) -> Result<Self> {
        if latent_arity < 2 {
            return Err(TomSearchError::config("latent_arity", "the hidden variable needs at least two states"));
        }

        let (rows, n) = (observed.num_rows(), observed.num_vars());
        let mut values = nd::Array2::zeros((latent_arity * rows, n + 1));
        for h in 0..latent_arity {
            for i in 0..rows {
                let r = h * rows + i;
                values[[r, 0]] = h;
                values.slice_mut(nd::s![r, 1..]).assign(&observed.row(i));
            }
        }

        let observed_names = observed.names();
        let mut latent = String::from(LATENT_NAME);
        while observed_names.contains(&latent) {
            latent.push('_');
        }
        let mut names: Vec<&str> = vec![latent.as_str()];
        names.extend(observed_names.iter().map(|s| s.as_str()));

        let mut arities = vec![latent_arity];
        arities.extend_from_slice(observed.arities());

        Ok(AugmentedTable {
            observed: observed.clone(),
            latent_arity,
            augmented: Dataset::from_codes(&names, arities, values)?
        })
    }

    pub fn latent_arity(&self) -> usize {
        self.latent_arity
    }

    /// Number of rows of the observed data
    pub fn num_observed_rows(&self) -> usize {
        self.observed.num_rows()
    }

    /// Number of columns, hidden included
    pub fn num_vars(&self) -> usize {
        self.augmented.num_vars()
    }

    pub fn observed(&self) -> &Dataset {
        &self.observed
    }

    /// The augmented rows without weights
    pub fn augmented(&self) -> &Dataset {
        &self.augmented
    }

    /// The augmented table weighted by `responsibilities`.
    ///
    /// # Args
    /// * `responsibilities`: ```[[i, h]]``` is the share of observed row `i` assigned to hidden
    ///   state `h`
    ///
    /// # Returns
    /// a `Dataset` where row ```h * N + i``` weighs the observed row's own weight times
    /// ```responsibilities[[i, h]]```
    pub fn weighted(&self, responsibilities: &nd::Array2<f64>) -> Result<Dataset> {
        let rows = self.num_observed_rows();
        if responsibilities.dim() != (rows, self.latent_arity) {
            return Err(TomSearchError::ShapeMismatch(format!(
                "responsibilities are {:?}, expected {:?}",
                responsibilities.dim(),
                (rows, self.latent_arity)
            )));
        }

        let mut weights = nd::Array1::zeros(self.latent_arity * rows);
        for ((i, h), &q) in responsibilities.indexed_iter() {
            weights[h * rows + i] = self.observed.weight(i) * q;
        }
        self.augmented.with_weights(weights)
    }

    /// E-step: the posterior of the hidden state for every observed row under `params`.
    ///
    /// A row that every hidden state explains with probability zero is split evenly.
    pub fn e_step(&self, params: &NetworkParams) -> nd::Array2<f64> {
        let rows = self.num_observed_rows();
        let k = self.latent_arity;
        let mut posterior = nd::Array2::zeros((rows, k));
        let mut full = vec![0; self.num_vars()];

        for i in 0..rows {
            for (v, &x) in self.observed.row(i).iter().enumerate() {
                full[v + 1] = x;
            }

            let log_probs: Vec<f64> = (0..k)
                .map(|h| {
                    full[0] = h;
                    params.log_probability(&full)
                })
                .collect();

            // log-sum-exp
            let max = log_probs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            if !max.is_finite() {
                posterior.row_mut(i).fill(1.0 / k as f64);
                continue;
            }
            let z: f64 = log_probs.iter().map(|lp| (lp - max).exp()).sum();
            for (h, lp) in log_probs.iter().enumerate() {
                posterior[[i, h]] = (lp - max).exp() / z;
            }
        }

        posterior
    }

}

/// Largest absolute difference between two responsibility matrices
pub fn max_change(old: &nd::Array2<f64>, new: &nd::Array2<f64>) -> f64 {
    old.iter().zip(new.iter()).fold(0.0, |m, (a, b)| m.max((a - b).abs()))
}

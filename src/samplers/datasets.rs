//! Synthetic datasets drawn from small known networks.

use crate::dataset::Dataset;
use crate::model::NetworkParams;
use crate::search::Tom;
use crate::util::{Result, TomSearchError};
use super::Sampler;
use super::forward::ForwardSampler;

use ndarray::prelude as nd;
use rand::Rng;

/// Draw `rows` complete rows from `params` into a `Dataset` with the given column names.
pub fn sample<R: Rng>(params: &NetworkParams, names: &[&str], rows: usize, rng: &mut R) -> Result<Dataset> {
    let n = params.num_vars();
    if names.len() != n {
        return Err(TomSearchError::ShapeMismatch(format!("{} names for {} variables", names.len(), n)));
    }

    let mut sampler = ForwardSampler::new(params, rng);
    let mut values = nd::Array2::zeros((rows, n));
    for r in 0..rows {
        let row = sampler.sample();
        for (v, x) in row.into_iter().enumerate() {
            values[[r, v]] = x;
        }
    }

    let arities = (0..n).map(|v| params.arity(v)).collect();
    Dataset::from_codes(names, arities, values)
}

/// Binary common effect ```a -> b <- c```: `a` and `c` are fair coins and `b` is ```a OR c```,
/// flipped with probability `noise`.
///
/// # Returns
/// the network and the sampled data, columns ordered ```a, b, c```
pub fn common_effect<R: Rng>(rows: usize, noise: f64, rng: &mut R) -> Result<(NetworkParams, Dataset)> {
    let tom = Tom::from_parents(vec![vec![], vec![0, 2], vec![]], 2)?;
    let (on, off) = (1.0 - noise, noise);
    // parent configurations of b in (a, c) order: 00, 01, 10, 11
    let tables = vec![
        nd::arr2(&[[0.5, 0.5]]),
        nd::arr2(&[[on, off], [off, on], [off, on], [off, on]]),
        nd::arr2(&[[0.5, 0.5]])
    ];
    let params = NetworkParams::from_tables(&tom, vec![2, 2, 2], tables)?;
    let data = sample(&params, &["a", "b", "c"], rows, rng)?;
    Ok((params, data))
}

/// `num_vars` mutually independent fair binary variables named ```x0, x1, ...```
pub fn uncorrelated<R: Rng>(num_vars: usize, rows: usize, rng: &mut R) -> Result<Dataset> {
    let tom = Tom::new(num_vars, 0);
    let tables = vec![nd::arr2(&[[0.5, 0.5]]); num_vars];
    let params = NetworkParams::from_tables(&tom, vec![2; num_vars], tables)?;

    let names: Vec<String> = (0..num_vars).map(|v| format!("x{}", v)).collect();
    let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    sample(&params, &names, rows, rng)
}

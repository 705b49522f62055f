//! Defines a simple forward sampler for `NetworkParams`
//!
//! Variables are drawn in topological order, so every parent is assigned before its child's
//! conditional distribution is consulted.

use crate::model::NetworkParams;
use super::{IndependentSampler, Sampler};

use ndarray::prelude as nd;
use rand::Rng;

/// Draw a state from a categorical distribution
pub fn sample_categorical<R: Rng>(probs: nd::ArrayView1<f64>, rng: &mut R) -> usize {
    let u: f64 = rng.gen();
    let mut acc = 0.0;
    for (x, &p) in probs.iter().enumerate() {
        acc += p;
        if u < acc {
            return x;
        }
    }
    // rounding can leave u just above the total
    probs.len().saturating_sub(1)
}

/// A forward `Sampler` owning its random generator
pub struct ForwardSampler<'a, R: Rng> {

    /// The network to sample
    params: &'a NetworkParams,

    rng: R

}


impl<'a, R: Rng> ForwardSampler<'a, R> {

    pub fn new(params: &'a NetworkParams, rng: R) -> Self {
        ForwardSampler { params, rng }
    }

}

/// Forward sample one row of `params`
fn draw<R: Rng>(params: &NetworkParams, rng: &mut R) -> Vec<usize> {
    let mut row = vec![0; params.num_vars()];
    for &var in params.topological_order() {
        // every parent precedes var in the order, so its value is already set
        let x = sample_categorical(params.distribution(var, |v| row[v]), rng);
        row[var] = x;
    }
    row
}

impl<'a, R: Rng> Sampler for ForwardSampler<'a, R> {

    fn sample(&mut self) -> Vec<usize> {
        draw(self.params, &mut self.rng)
    }

}


impl<'a, R: Rng> IndependentSampler for ForwardSampler<'a, R> {

    fn ind_sample<S: Rng>(&self, rng: &mut S) -> Vec<usize> {
        draw(self.params, rng)
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::search::Tom;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn sample() {
        // I -> S
        let mut tom = Tom::new(2, 1);
        tom.add_arc(0, 1);
        let tables = vec![nd::arr2(&[[0.7, 0.3]]), nd::arr2(&[[0.95, 0.05], [0.2, 0.8]])];
        let params = NetworkParams::from_tables(&tom, vec![2, 2], tables).unwrap();

        let mut sampler = ForwardSampler::new(&params, StdRng::seed_from_u64(3));
        let rows: Vec<Vec<usize>> = (0..4000).map(|_| sampler.sample()).collect();
        assert!(rows.iter().all(|r| r.len() == 2 && r[0] <= 1 && r[1] <= 1));

        let high = rows.iter().filter(|r| r[0] == 1).count() as f64 / 4000.0;
        assert!((high - 0.3).abs() < 0.03, "P(I = 1) estimated as {}", high);

        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..100 {
            let r = sampler.ind_sample(&mut rng);
            assert!(r[0] <= 1 && r[1] <= 1);
        }
    }

    #[test]
    fn categorical_edges() {
        let mut rng = StdRng::seed_from_u64(1);
        let certain = nd::arr1(&[0.0, 1.0, 0.0]);
        for _ in 0..50 {
            assert_eq!(1, sample_categorical(certain.view(), &mut rng));
        }
    }
}

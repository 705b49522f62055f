//! Starting points for EM: random responsibilities and initial structures over the hidden node.
//!
//! Every structure here has the hidden variable at index 0 and observed variable `v` at
//! ```v + 1```, matching the column layout of the `AugmentedTable`.

use crate::config::LatentInitialisation;
use crate::dataset::Dataset;
use crate::latent::Detection;
use crate::search::Tom;
use crate::util::Result;

use indexmap::IndexMap;
use ndarray::prelude as nd;
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::Rng;
use tracing::debug;

/// Attempts at drawing a random structure before falling back to the hidden node as root
pub const RANDOM_RETRIES: usize = 100;

/// Random responsibilities, one categorical distribution per observed row.
///
/// Identical observed rows share the same distribution.
///
/// # Returns
/// a ```rows x latent_arity``` matrix whose rows sum to 1
pub fn random_responsibilities<R: Rng>(data: &Dataset, latent_arity: usize, rng: &mut R) -> nd::Array2<f64> {
    let mut patterns: IndexMap<Vec<usize>, usize> = IndexMap::new();
    let mut pattern_of = Vec::with_capacity(data.num_rows());
    for r in 0..data.num_rows() {
        let next = patterns.len();
        pattern_of.push(*patterns.entry(data.row(r).to_vec()).or_insert(next));
    }

    let draws = nd::Array2::random_using((patterns.len(), latent_arity), Uniform::new(1.0, 100.0), rng);
    let z = draws.sum_axis(nd::Axis(1)).insert_axis(nd::Axis(1));
    let draws = draws / &z;

    let mut responsibilities = nd::Array2::zeros((data.num_rows(), latent_arity));
    for (r, &p) in pattern_of.iter().enumerate() {
        responsibilities.row_mut(r).assign(&draws.row(p));
    }
    responsibilities
}

/// The hidden node as the parent of every observed node
pub fn latent_as_root(num_observed: usize, max_num_parents: usize) -> Result<Tom> {
    let mut parents = vec![Vec::new(); num_observed + 1];
    for ps in parents.iter_mut().skip(1) {
        ps.push(0);
    }
    Tom::from_parents(parents, max_num_parents)
}

/// Observed nodes that are marginally independent of some other observed node become parents of
/// the hidden node, up to `max_num_parents`; every other observed node becomes its child.
///
/// # Args
/// * `marginal`: ```marginal[[a, b]] == 1``` when observed `a` and `b` are marginally dependent
pub fn using_dependencies(marginal: &nd::Array2<u8>, max_num_parents: usize) -> Result<Tom> {
    let n = marginal.nrows();
    let independent: Vec<usize> = (0..n)
        .filter(|&a| (0..n).any(|b| a != b && marginal[[a, b]] == 0))
        .take(max_num_parents)
        .collect();

    let mut parents = vec![Vec::new(); n + 1];
    for v in 0..n {
        if independent.contains(&v) {
            parents[0].push(v + 1);
        } else {
            parents[v + 1].push(0);
        }
    }
    Tom::from_parents(parents, max_num_parents)
}

/// A random structure in which the hidden node has more than one parent or more than one child.
///
/// Falls back to `latent_as_root` after `RANDOM_RETRIES` draws without such a structure.
pub fn random_structure<R: Rng>(num_observed: usize, max_num_parents: usize, arc_prob: f64, rng: &mut R) -> Result<Tom> {
    let mut tom = Tom::new(num_observed + 1, max_num_parents);
    for _ in 0..RANDOM_RETRIES {
        tom.randomize(rng, arc_prob);
        let children = (1..=num_observed).filter(|&v| tom.is_parent(0, v)).count();
        if tom.num_parents(0) > 1 || children > 1 {
            return Ok(tom);
        }
    }
    debug!("no random structure connected the hidden node, using it as root");
    latent_as_root(num_observed, max_num_parents)
}

/// The structure implied by a global trigger match: ```global[[i, j]] == 1``` means ```i -> j```
pub fn trigger_structure(global: &nd::Array2<u8>, max_num_parents: usize) -> Result<Tom> {
    let n = global.nrows();
    let parents = (0..n).map(|j| (0..n).filter(|&i| global[[i, j]] != 0).collect()).collect();
    Tom::from_parents(parents, max_num_parents)
}

/// The initial structure for EM.
///
/// A matched trigger fixes the structure; otherwise `initialisation` decides how the hidden node
/// is wired in.
pub fn initial_structure<R: Rng>(
    initialisation: LatentInitialisation,
    detection: &Detection,
    max_num_parents: usize,
    arc_prob: f64,
    rng: &mut R
) -> Result<Tom> {
    match detection {
        Detection::Matched { global, .. } => trigger_structure(global, max_num_parents),
        Detection::NotMatched { marginal, .. } => {
            let n = marginal.nrows();
            match initialisation {
                LatentInitialisation::LatentAsRoot => latent_as_root(n, max_num_parents),
                LatentInitialisation::UsingDependencies => using_dependencies(marginal, max_num_parents),
                LatentInitialisation::Random => random_structure(n, max_num_parents, arc_prob, rng)
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    /// Rows sum to one and identical rows share their distribution
    fn responsibilities() {
        let rows: Vec<[usize; 2]> = (0..20).map(|r| [r % 2, r % 4 / 2]).collect();
        let data = Dataset::from_codes(&["a", "b"], vec![2, 2], nd::arr2(&rows)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let q = random_responsibilities(&data, 3, &mut rng);
        assert_eq!((20, 3), q.dim());
        for row in q.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|&p| p > 0.0));
        }
        // rows 0 and 4 hold the same pattern
        assert_eq!(q.row(0), q.row(4));
    }

    #[test]
    fn root() {
        let tom = latent_as_root(4, 3).unwrap();
        assert_eq!(0, tom.node_at(0));
        assert_eq!(4, tom.num_arcs());
        assert!((1..5).all(|v| tom.is_parent(0, v)));
    }

    #[test]
    /// 0 and 1 are independent of each other, 2 and 3 depend on everything else
    fn dependencies() {
        let marginal = nd::arr2(&[
            [0, 0, 1, 1],
            [0, 0, 1, 1],
            [1, 1, 0, 1],
            [1, 1, 1, 0]
        ]);
        let tom = using_dependencies(&marginal, 3).unwrap();
        assert_eq!(&[1, 2], tom.parents(0));
        assert_eq!(&[0], tom.parents(3));
        assert_eq!(&[0], tom.parents(4));
        assert!(tom.is_consistent());
    }

    #[test]
    fn random() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10 {
            let tom = random_structure(4, 3, 0.5, &mut rng).unwrap();
            let children = (1..5).filter(|&v| tom.is_parent(0, v)).count();
            assert!(tom.num_parents(0) > 1 || children > 1);
        }
    }

    #[test]
    fn trigger() {
        let mut global = nd::Array2::zeros((5, 5));
        global[[0, 3]] = 1;
        global[[0, 4]] = 1;
        global[[1, 2]] = 1;
        global[[1, 4]] = 1;
        global[[2, 3]] = 1;

        let tom = trigger_structure(&global, 3).unwrap();
        assert_eq!(5, tom.num_arcs());
        assert_eq!(&[0, 2], tom.parents(3));
        assert!(tom.is_consistent());
    }
}

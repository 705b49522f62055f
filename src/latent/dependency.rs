//! Dependency fingerprints of small variable subsets.
//!
//! For a subset of `k` variables, every conditioning set drawn from the subset that leaves at
//! least two variables untested yields one ```k x k``` symmetric 0/1 matrix: entry ```[i][j]```
//! is 1 when the `i`th and `j`th variables are dependent given that set. The list of matrices, in
//! conditioning-set enumeration order, is the subset's fingerprint.

use crate::latent::independence::IndependenceTest;

use itertools::Itertools;
use ndarray::prelude as nd;

/// Conditioning sets over local indices ```0..k```: the empty set first, then every combination
/// of sizes ```1, 2, ...``` in lexicographic order, keeping only sets that leave at least two
/// variables to test.
pub fn conditioning_sets(k: usize) -> Vec<Vec<usize>> {
    let mut sets = vec![Vec::new()];
    for size in 1..k.saturating_sub(1) {
        sets.extend((0..k).combinations(size));
    }
    sets
}

/// An ordered list of dependency matrices
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    pub matrices: Vec<nd::Array2<u8>>
}

impl Fingerprint {

    /// The number of variables each matrix covers
    pub fn size(&self) -> usize {
        self.matrices.first().map(|m| m.nrows()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Total number of entries over all matrices
    pub fn num_entries(&self) -> usize {
        self.matrices.iter().map(|m| m.len()).sum()
    }

    /// Number of entries that differ from `other`. Matrices are compared position by position;
    /// a missing or differently sized matrix counts all of its entries as mismatched.
    pub fn mismatches(&self, other: &Fingerprint) -> usize {
        let paired = self.matrices.iter().zip(other.matrices.iter()).map(|(a, b)| {
            if a.dim() == b.dim() {
                a.iter().zip(b.iter()).filter(|(x, y)| x != y).count()
            } else {
                a.len().max(b.len())
            }
        });
        let extra = if self.len() > other.len() {
            self.matrices[other.len()..].iter().map(|m| m.len()).sum::<usize>()
        } else {
            other.matrices[self.len()..].iter().map(|m| m.len()).sum::<usize>()
        };
        paired.sum::<usize>() + extra
    }

    /// Drop row and column 0 of every matrix
    pub fn project_out_first(&self) -> Fingerprint {
        let matrices = self.matrices
            .iter()
            .map(|m| m.slice(nd::s![1.., 1..]).to_owned())
            .collect();
        Fingerprint { matrices }
    }

    pub fn is_symmetric(&self) -> bool {
        self.matrices.iter().all(|m| m == &m.t())
    }

}

/// One dependency matrix over `vars` given `given` (global indices).
///
/// Pairs involving a conditioning variable are left at 0.
pub fn dependency_matrix(test: &dyn IndependenceTest, vars: &[usize], given: &[usize]) -> nd::Array2<u8> {
    let k = vars.len();
    let mut matrix = nd::Array2::zeros((k, k));
    for i in 0..k {
        if given.contains(&vars[i]) {
            continue;
        }
        for j in (i + 1)..k {
            if given.contains(&vars[j]) {
                continue;
            }
            if test.is_dependent(vars[i], vars[j], given) {
                matrix[[i, j]] = 1;
                matrix[[j, i]] = 1;
            }
        }
    }
    matrix
}

/// The fingerprint of the subset `vars`, conditioning on subsets of `vars` itself.
pub fn extract(test: &dyn IndependenceTest, vars: &[usize]) -> Fingerprint {
    let matrices = conditioning_sets(vars.len())
        .into_iter()
        .map(|set| {
            let given: Vec<usize> = set.iter().map(|&i| vars[i]).collect();
            dependency_matrix(test, vars, &given)
        })
        .collect();
    Fingerprint { matrices }
}

/// The fingerprint of a model with a hidden node 0 and observed nodes ```1..=k```.
///
/// Conditioning sets range over the observed nodes only, in the same order as `extract` uses for
/// `k` variables; each matrix is ```(k + 1) x (k + 1)``` and still includes the hidden node.
pub fn extract_with_hidden(test: &dyn IndependenceTest, k: usize) -> Fingerprint {
    let vars: Vec<usize> = (0..=k).collect();
    let matrices = conditioning_sets(k)
        .into_iter()
        .map(|set| {
            let given: Vec<usize> = set.iter().map(|&i| i + 1).collect();
            dependency_matrix(test, &vars, &given)
        })
        .collect();
    Fingerprint { matrices }
}

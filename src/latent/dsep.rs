//! Defines the `DSeparationOracle`, which answers independence queries from a known DAG.
//!
//! ```a``` and ```b``` are d-separated by ```Z``` exactly when they are disconnected in the moral
//! graph of the ancestral set of ```{a, b} ∪ Z``` once ```Z``` is removed.

use crate::latent::independence::IndependenceTest;
use crate::search::Tom;

use ndarray::prelude as nd;

use std::collections::VecDeque;

/// An `IndependenceTest` that reads dependencies off a DAG
#[derive(Clone, Debug)]
pub struct DSeparationOracle {

    /// The parents of every node
    parents: Vec<Vec<usize>>

}

impl DSeparationOracle {

    pub fn new(parents: Vec<Vec<usize>>) -> Self {
        DSeparationOracle { parents }
    }

    pub fn from_tom(tom: &Tom) -> Self {
        DSeparationOracle::new(tom.parent_sets().to_vec())
    }

    /// Build from an adjacency matrix where ```adj[[i, j]] == 1``` means ```i -> j```
    pub fn from_adjacency(adj: &nd::Array2<u8>) -> Self {
        let n = adj.nrows();
        let parents = (0..n).map(|j| (0..n).filter(|&i| adj[[i, j]] != 0).collect()).collect();
        DSeparationOracle::new(parents)
    }

    pub fn num_nodes(&self) -> usize {
        self.parents.len()
    }

    /// True if `a` and `b` are d-separated by `given`
    pub fn d_separated(&self, a: usize, b: usize, given: &[usize]) -> bool {
        let n = self.num_nodes();

        ///////////////////////////////////////////////////////////////////////////////
        // 1. ancestral set of {a, b} U given
        let mut ancestral = vec![false; n];
        let mut stack: Vec<usize> = given.iter().cloned().chain([a, b].iter().cloned()).collect();
        while let Some(v) = stack.pop() {
            if !ancestral[v] {
                ancestral[v] = true;
                stack.extend(self.parents[v].iter().cloned());
            }
        }

        ///////////////////////////////////////////////////////////////////////////////
        // 2. moralize: undirected parent-child edges plus edges between co-parents
        let mut adjacent = vec![vec![false; n]; n];
        for v in (0..n).filter(|&v| ancestral[v]) {
            let ps = &self.parents[v];
            for (x, &p) in ps.iter().enumerate() {
                adjacent[p][v] = true;
                adjacent[v][p] = true;
                for &q in ps.iter().skip(x + 1) {
                    adjacent[p][q] = true;
                    adjacent[q][p] = true;
                }
            }
        }

        ///////////////////////////////////////////////////////////////////////////////
        // 3. search from a to b avoiding the conditioning set
        let mut blocked = vec![false; n];
        for &g in given {
            blocked[g] = true;
        }
        if blocked[a] || blocked[b] {
            return true;
        }

        let mut seen = vec![false; n];
        let mut queue = VecDeque::new();
        seen[a] = true;
        queue.push_back(a);
        while let Some(v) = queue.pop_front() {
            if v == b {
                return false;
            }
            for w in 0..n {
                if adjacent[v][w] && ancestral[w] && !blocked[w] && !seen[w] {
                    seen[w] = true;
                    queue.push_back(w);
                }
            }
        }
        true
    }

}

impl IndependenceTest for DSeparationOracle {

    fn is_dependent(&self, a: usize, b: usize, given: &[usize]) -> bool {
        a != b && !self.d_separated(a, b, given)
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn chain() {
        // 0 -> 1 -> 2
        let oracle = DSeparationOracle::new(vec![vec![], vec![0], vec![1]]);
        assert!(oracle.is_dependent(0, 2, &[]));
        assert!(!oracle.is_dependent(0, 2, &[1]));
    }

    #[test]
    /// Conditioning on a collider, or on its descendant, connects its parents
    fn collider() {
        // 0 -> 2 <- 1, 2 -> 3
        let oracle = DSeparationOracle::new(vec![vec![], vec![], vec![0, 1], vec![2]]);
        assert!(!oracle.is_dependent(0, 1, &[]));
        assert!(oracle.is_dependent(0, 1, &[2]));
        assert!(oracle.is_dependent(0, 1, &[3]));
    }

    #[test]
    fn common_cause() {
        // 1 <- 0 -> 2
        let mut adj = nd::Array2::zeros((3, 3));
        adj[[0, 1]] = 1;
        adj[[0, 2]] = 1;
        let oracle = DSeparationOracle::from_adjacency(&adj);
        assert!(oracle.is_dependent(1, 2, &[]));
        assert!(!oracle.is_dependent(1, 2, &[0]));
    }

    #[test]
    fn empty_graph() {
        let oracle = DSeparationOracle::from_tom(&Tom::new(4, 2));
        for a in 0..4 {
            for b in 0..4 {
                assert!(!oracle.is_dependent(a, b, &[]));
            }
        }
    }
}

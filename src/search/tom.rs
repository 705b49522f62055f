//! Defines a `Tom`, a Totally Ordered Model.
//!
//! # Representation
//! A `Tom` is a DAG encoded as a permutation of the variables plus an explicit parent list per
//! variable. A parent always precedes its child in the total order, so every `Tom` is acyclic by
//! construction and no mutation ever needs a cycle check. The order is held as an array backed
//! permutation with its inverse, giving ```O(1)``` position lookups in both directions.

use crate::util::{Result, TomSearchError};

use rand::Rng;
use rand::seq::SliceRandom;

use std::collections::BTreeSet;

/// A DAG held as a total order plus sorted parent lists
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tom {

    /// ```order[p]``` is the variable at position `p`
    order: Vec<usize>,

    /// ```position[v]``` is the position of variable `v`. Inverse of `order`
    position: Vec<usize>,

    /// The parents of each variable, sorted increasing by variable index
    parents: Vec<Vec<usize>>,

    /// Upper bound on the size of any parent list
    max_num_parents: usize

}

impl Tom {

    /// An empty `Tom` over `num_vars` variables in index order
    pub fn new(num_vars: usize, max_num_parents: usize) -> Self {
        Tom {
            order: (0..num_vars).collect(),
            position: (0..num_vars).collect(),
            parents: vec![Vec::new(); num_vars],
            max_num_parents
        }
    }

    /// Build a `Tom` from explicit parent lists.
    ///
    /// The total order is a topological order of the DAG, preferring lower variable indices when
    /// several variables are ready.
    ///
    /// # Returns
    /// the `Tom`; a parent out of range, a self-loop or a parent list longer than
    /// `max_num_parents` is a `ShapeMismatch`, and a cycle is `Cyclic`
    pub fn from_parents(parents: Vec<Vec<usize>>, max_num_parents: usize) -> Result<Self> {
        let n = parents.len();
        let mut sorted = Vec::with_capacity(n);

        for (v, ps) in parents.into_iter().enumerate() {
            let set: BTreeSet<usize> = ps.into_iter().collect();
            if let Some(&p) = set.iter().find(|&&p| p >= n || p == v) {
                return Err(TomSearchError::ShapeMismatch(
                    format!("variable {} cannot have parent {} among {} variables", v, p, n)
                ));
            }
            if set.len() > max_num_parents {
                return Err(TomSearchError::ShapeMismatch(
                    format!("variable {} has {} parents, at most {} allowed", v, set.len(), max_num_parents)
                ));
            }
            sorted.push(set.into_iter().collect::<Vec<usize>>());
        }

        // Kahn's algorithm, smallest ready index first
        let mut remaining: Vec<usize> = sorted.iter().map(|ps| ps.len()).collect();
        let mut ready: BTreeSet<usize> = (0..n).filter(|&v| remaining[v] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(v) = ready.pop_first() {
            order.push(v);
            for c in 0..n {
                if sorted[c].binary_search(&v).is_ok() {
                    remaining[c] -= 1;
                    if remaining[c] == 0 {
                        ready.insert(c);
                    }
                }
            }
        }

        if order.len() < n {
            let stuck = (0..n).find(|&v| remaining[v] > 0).unwrap_or(0);
            return Err(TomSearchError::Cyclic(stuck));
        }

        let mut position = vec![0; n];
        for (p, &v) in order.iter().enumerate() {
            position[v] = p;
        }

        Ok(Tom { order, position, parents: sorted, max_num_parents })
    }

    /// Replace the total order, keeping the arcs.
    ///
    /// # Returns
    /// an error if `order` is not a permutation or if it puts a child before one of its parents
    pub fn set_order(&mut self, order: Vec<usize>) -> Result<()> {
        let n = self.num_vars();
        let mut position = vec![usize::MAX; n];
        for (p, &v) in order.iter().enumerate() {
            if v >= n || position[v] != usize::MAX {
                return Err(TomSearchError::ShapeMismatch(String::from("order is not a permutation")));
            }
            position[v] = p;
        }

        if order.len() != n {
            return Err(TomSearchError::ShapeMismatch(String::from("order is not a permutation")));
        }

        for (v, ps) in self.parents.iter().enumerate() {
            if ps.iter().any(|&p| position[p] > position[v]) {
                return Err(TomSearchError::Cyclic(v));
            }
        }

        self.order = order;
        self.position = position;
        Ok(())
    }

    /// Shuffle the total order and add each arc allowed by it with probability `arc_prob`.
    ///
    /// Any existing arcs are discarded.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R, arc_prob: f64) {
        self.clear_arcs();
        self.order.shuffle(rng);
        for (p, &v) in self.order.iter().enumerate() {
            self.position[v] = p;
        }

        for j in 1..self.num_vars() {
            for i in 0..j {
                if rng.gen::<f64>() < arc_prob {
                    self.add_arc(self.order[i], self.order[j]);
                }
            }
        }
    }

    pub fn num_vars(&self) -> usize {
        self.order.len()
    }

    pub fn max_num_parents(&self) -> usize {
        self.max_num_parents
    }

    /// The variable at `position` in the total order
    pub fn node_at(&self, position: usize) -> usize {
        self.order[position]
    }

    /// The position of `var` in the total order
    pub fn position_of(&self, var: usize) -> usize {
        self.position[var]
    }

    /// The total order, position by position
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// The sorted parents of `var`
    pub fn parents(&self, var: usize) -> &[usize] {
        &self.parents[var]
    }

    pub fn num_parents(&self, var: usize) -> usize {
        self.parents[var].len()
    }

    /// True if `parent -> child` is an arc
    pub fn is_parent(&self, parent: usize, child: usize) -> bool {
        self.parents[child].binary_search(&parent).is_ok()
    }

    /// True if `i` and `j` are joined by an arc in either direction
    pub fn is_arc(&self, i: usize, j: usize) -> bool {
        self.is_parent(i, j) || self.is_parent(j, i)
    }

    /// Orient the pair `{i, j}` along the total order.
    ///
    /// # Returns
    /// ```(parent, child)``` where the parent is the earlier of the two
    pub fn orient(&self, i: usize, j: usize) -> (usize, usize) {
        if self.position[i] < self.position[j] { (i, j) } else { (j, i) }
    }

    /// Add the arc between `i` and `j`, directed along the total order.
    ///
    /// # Returns
    /// false, leaving the `Tom` unchanged, if the arc already exists, `i == j`, or the child is
    /// already at its parent limit
    pub fn add_arc(&mut self, i: usize, j: usize) -> bool {
        if i == j {
            return false;
        }

        let (parent, child) = self.orient(i, j);
        match self.parents[child].binary_search(&parent) {
            Ok(_) => false,
            Err(_) if self.parents[child].len() >= self.max_num_parents => false,
            Err(idx) => {
                self.parents[child].insert(idx, parent);
                true
            }
        }
    }

    /// Remove the arc between `i` and `j`.
    ///
    /// # Returns
    /// false if there was no such arc
    pub fn remove_arc(&mut self, i: usize, j: usize) -> bool {
        if i == j {
            return false;
        }

        let (parent, child) = self.orient(i, j);
        match self.parents[child].binary_search(&parent) {
            Ok(idx) => {
                self.parents[child].remove(idx);
                true
            },
            Err(_) => false
        }
    }

    /// Add the arc between `i` and `j` if absent, otherwise remove it.
    ///
    /// # Returns
    /// true if the toggle happened; adding fails at the parent limit
    pub fn toggle_arc(&mut self, i: usize, j: usize) -> bool {
        if self.is_arc(i, j) {
            self.remove_arc(i, j)
        } else {
            self.add_arc(i, j)
        }
    }

    /// Overwrite the parents of `var`. Used to restore a snapshot after a rejected move.
    pub(crate) fn set_parents(&mut self, var: usize, parents: Vec<usize>) {
        self.parents[var] = parents;
    }

    /// Swap the nodes at `position` and ```position + 1```, reversing the arc between them if
    /// there is one.
    ///
    /// # Returns
    /// false, leaving the `Tom` unchanged, if `position` is the last position or the reversed arc
    /// would exceed the new child's parent limit
    pub fn swap_adjacent(&mut self, position: usize) -> bool {
        if position + 1 >= self.num_vars() {
            return false;
        }

        let a = self.order[position];
        let b = self.order[position + 1];

        if self.is_parent(a, b) {
            if self.parents[a].len() >= self.max_num_parents {
                return false;
            }
            self.remove_arc(a, b);
            self.swap_positions(position);
            self.add_arc(b, a);
        } else {
            self.swap_positions(position);
        }

        true
    }

    fn swap_positions(&mut self, position: usize) {
        self.order.swap(position, position + 1);
        self.position[self.order[position]] = position;
        self.position[self.order[position + 1]] = position + 1;
    }

    /// Remove every arc, keeping the order
    pub fn clear_arcs(&mut self) {
        for ps in self.parents.iter_mut() {
            ps.clear();
        }
    }

    pub fn num_arcs(&self) -> usize {
        self.parents.iter().map(|ps| ps.len()).sum()
    }

    /// Every arc as ```(parent, child)```, ordered by child then parent
    pub fn arcs(&self) -> Vec<(usize, usize)> {
        self.parents
            .iter()
            .enumerate()
            .flat_map(|(c, ps)| ps.iter().map(move |&p| (p, c)))
            .collect()
    }

    /// Parent lists of every variable, in variable order
    pub fn parent_sets(&self) -> &[Vec<usize>] {
        &self.parents
    }

    /// Check the internal invariants: a valid permutation, sorted parent lists within the parent
    /// limit, and every parent placed before its child.
    pub fn is_consistent(&self) -> bool {
        let n = self.num_vars();
        if self.position.len() != n || self.parents.len() != n {
            return false;
        }

        if (0..n).any(|p| self.order[p] >= n || self.position[self.order[p]] != p) {
            return false;
        }

        self.parents.iter().enumerate().all(|(v, ps)| {
            ps.len() <= self.max_num_parents
                && ps.windows(2).all(|w| w[0] < w[1])
                && ps.iter().all(|&p| p < n && self.position[p] < self.position[v])
        })
    }

}

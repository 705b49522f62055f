//! Structure priors over `Tom`s.
//!
//! A `TomCoster` gives the prior message length of a `Tom` and, more importantly for the search,
//! the change in that length caused by toggling or reversing specific arcs. Move operators only
//! ever ask for deltas, so a proposal never re-scores the whole graph.

use crate::search::tom::Tom;
use crate::util::{Result, TomSearchError};

use statrs::function::factorial::ln_factorial;

use std::collections::HashMap;

/// Difference between two costs that may be infinite. Equal costs, including two infinities,
/// differ by zero.
pub fn cost_delta(old: f64, new: f64) -> f64 {
    if old == new { 0.0 } else { new - old }
}

/// Prior over `Tom`s
pub trait TomCoster {

    /// Total prior cost of `tom`
    fn cost(&self, tom: &Tom) -> f64;

    /// Change in prior cost if the arc between `i` and `j` were toggled in `tom`
    fn cost_to_toggle_arc(&self, tom: &Tom, i: usize, j: usize) -> f64;

    /// Change in prior cost if every pair in `pairs` were toggled. The pairs must be distinct.
    fn cost_to_toggle_arcs(&self, tom: &Tom, pairs: &[(usize, usize)]) -> f64 {
        pairs.iter().map(|&(i, j)| self.cost_to_toggle_arc(tom, i, j)).sum()
    }

    /// Change in prior cost if the existing arc between `i` and `j` were reversed
    fn cost_to_reverse_arc(&self, tom: &Tom, i: usize, j: usize) -> f64;

    /// Reset the probability of an unconstrained arc
    fn set_arc_prob(&mut self, arc_prob: f64);

    fn arc_prob(&self) -> f64;

}

/// Every arc allowed by the order is present independently with probability `arc_prob`; every
/// total order is equally likely.
#[derive(Clone, Debug)]
pub struct UniformTomCoster {

    arc_prob: f64,

    /// ```-ln(arc_prob)```
    arc_cost: f64,

    /// ```-ln(1 - arc_prob)```
    no_arc_cost: f64

}

impl UniformTomCoster {

    pub fn new(arc_prob: f64) -> Self {
        let mut coster = UniformTomCoster { arc_prob, arc_cost: 0.0, no_arc_cost: 0.0 };
        coster.set_arc_prob(arc_prob);
        coster
    }

    /// Cost of one unconstrained pair being joined or not
    fn pair_cost(&self, joined: bool) -> f64 {
        if joined { self.arc_cost } else { self.no_arc_cost }
    }

}

impl TomCoster for UniformTomCoster {

    fn cost(&self, tom: &Tom) -> f64 {
        let n = tom.num_vars();
        let arcs = tom.num_arcs();
        let pairs = n * n.saturating_sub(1) / 2;

        ln_factorial(n as u64) + arcs as f64 * self.arc_cost + (pairs - arcs) as f64 * self.no_arc_cost
    }

    fn cost_to_toggle_arc(&self, tom: &Tom, i: usize, j: usize) -> f64 {
        // adding costs ln((1 - p) / p), removing the negation
        let add = self.arc_cost - self.no_arc_cost;
        if tom.is_arc(i, j) { -add } else { add }
    }

    fn cost_to_reverse_arc(&self, _tom: &Tom, _i: usize, _j: usize) -> f64 {
        0.0
    }

    fn set_arc_prob(&mut self, arc_prob: f64) {
        self.arc_prob = arc_prob;
        self.arc_cost = -arc_prob.ln();
        self.no_arc_cost = -(1.0 - arc_prob).ln();
    }

    fn arc_prob(&self) -> f64 {
        self.arc_prob
    }

}

/// An expert's belief that `from -> to` is an arc
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArcRelation {
    pub from: usize,
    pub to: usize,
    pub prob: f64
}

/// Uniform prior with expert beliefs about specific directed pairs.
///
/// For a constrained pair ```{a, b}``` with beliefs ```P(a -> b)``` and ```P(b -> a)```, the pair
/// costs ```-ln P(a -> b)```, ```-ln P(b -> a)``` or ```-ln(1 - P(a -> b) - P(b -> a))```
/// depending on its state. A probability of 1 therefore requires an arc and 0 forbids it.
#[derive(Clone, Debug)]
pub struct ExpertTomCoster {

    uniform: UniformTomCoster,

    /// Keyed by ```(low, high)``` variable index; holds ```(P(low -> high), P(high -> low))```
    relations: HashMap<(usize, usize), (f64, f64)>

}

impl ExpertTomCoster {

    /// Build and validate an expert prior.
    ///
    /// # Returns
    /// an `InvalidPrior` error if an index is out of range, a probability is outside ```[0, 1]```,
    /// the two directions of a pair sum to more than 1, or the required arcs form a cycle
    pub fn new(num_vars: usize, arc_prob: f64, beliefs: &[ArcRelation]) -> Result<Self> {
        let mut relations: HashMap<(usize, usize), (f64, f64)> = HashMap::new();

        for b in beliefs {
            if b.from >= num_vars || b.to >= num_vars || b.from == b.to {
                return Err(TomSearchError::prior(format!("invalid pair {} -> {}", b.from, b.to)));
            }
            if !(0.0..=1.0).contains(&b.prob) {
                return Err(TomSearchError::prior(format!("probability {} of {} -> {}", b.prob, b.from, b.to)));
            }

            let key = (b.from.min(b.to), b.from.max(b.to));
            let entry = relations.entry(key).or_insert((0.0, 0.0));
            if b.from < b.to { entry.0 = b.prob } else { entry.1 = b.prob }

            if entry.0 + entry.1 > 1.0 + 1e-12 {
                return Err(TomSearchError::prior(format!("beliefs for pair {:?} sum above 1", key)));
            }
        }

        // the required arcs must admit a total order
        let mut required = vec![Vec::new(); num_vars];
        for (&(lo, hi), &(fwd, back)) in relations.iter() {
            if fwd >= 1.0 {
                required[hi].push(lo);
            }
            if back >= 1.0 {
                required[lo].push(hi);
            }
        }
        if Tom::from_parents(required, num_vars).is_err() {
            return Err(TomSearchError::prior("required arcs form a cycle"));
        }

        Ok(ExpertTomCoster { uniform: UniformTomCoster::new(arc_prob), relations })
    }

    /// A prior fixing the structure among `nodes`: every arc of `arcs` is required and every
    /// other pair within `nodes` is forbidden. Pairs outside `nodes` stay uniform.
    pub fn fixing(num_vars: usize, arc_prob: f64, nodes: &[usize], arcs: &[(usize, usize)]) -> Result<Self> {
        let mut beliefs = Vec::new();
        for (x, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(x + 1) {
                let ab = if arcs.contains(&(a, b)) { 1.0 } else { 0.0 };
                let ba = if arcs.contains(&(b, a)) { 1.0 } else { 0.0 };
                beliefs.push(ArcRelation { from: a, to: b, prob: ab });
                beliefs.push(ArcRelation { from: b, to: a, prob: ba });
            }
        }
        ExpertTomCoster::new(num_vars, arc_prob, &beliefs)
    }

    /// Cost of the pair ```{a, b}``` in the state given by `tom`
    fn pair_cost(&self, tom: &Tom, a: usize, b: usize) -> f64 {
        let key = (a.min(b), a.max(b));
        match self.relations.get(&key) {
            None => self.uniform.pair_cost(tom.is_arc(a, b)),
            Some(&(fwd, back)) => {
                let p = if tom.is_parent(key.0, key.1) {
                    fwd
                } else if tom.is_parent(key.1, key.0) {
                    back
                } else {
                    1.0 - fwd - back
                };
                -p.max(0.0).ln()
            }
        }
    }

    /// Cost of the pair ```{a, b}``` with the arc present from `parent` to `child`, or absent
    fn pair_cost_as(&self, a: usize, b: usize, arc: Option<(usize, usize)>) -> f64 {
        let key = (a.min(b), a.max(b));
        match self.relations.get(&key) {
            None => self.uniform.pair_cost(arc.is_some()),
            Some(&(fwd, back)) => {
                let p = match arc {
                    Some((parent, _)) if parent == key.0 => fwd,
                    Some(_) => back,
                    None => 1.0 - fwd - back
                };
                -p.max(0.0).ln()
            }
        }
    }

}

impl TomCoster for ExpertTomCoster {

    fn cost(&self, tom: &Tom) -> f64 {
        let n = tom.num_vars();
        let mut cost = ln_factorial(n as u64);
        for b in 1..n {
            for a in 0..b {
                cost += self.pair_cost(tom, a, b);
            }
        }
        cost
    }

    fn cost_to_toggle_arc(&self, tom: &Tom, i: usize, j: usize) -> f64 {
        let old = self.pair_cost(tom, i, j);
        let new = if tom.is_arc(i, j) {
            self.pair_cost_as(i, j, None)
        } else {
            self.pair_cost_as(i, j, Some(tom.orient(i, j)))
        };
        cost_delta(old, new)
    }

    fn cost_to_reverse_arc(&self, tom: &Tom, i: usize, j: usize) -> f64 {
        let (parent, child) = tom.orient(i, j);
        if !tom.is_parent(parent, child) {
            return 0.0;
        }
        let old = self.pair_cost(tom, i, j);
        let new = self.pair_cost_as(i, j, Some((child, parent)));
        cost_delta(old, new)
    }

    fn set_arc_prob(&mut self, arc_prob: f64) {
        self.uniform.set_arc_prob(arc_prob);
    }

    fn arc_prob(&self) -> f64 {
        self.uniform.arc_prob()
    }

}

//! Stochastic local moves over `Tom`s.
//!
//! Every operator follows the same protocol: draw the nodes to change, snapshot their parent
//! sets, apply the change speculatively, cost it through the cache and the prior, then either
//! commit it or restore the snapshot. A rejected proposal leaves the `Tom` exactly as it was.

use crate::search::context::CaseInfo;
use crate::search::prior::cost_delta;
use crate::search::tom::Tom;

use tracing::trace;

/// A proposal scheme for the Metropolis sampler
pub trait MoveOperator {

    fn name(&self) -> &'static str;

    /// Propose a random change to `tom` and accept or reject it.
    ///
    /// # Returns
    /// true if the change was accepted. False means `tom` is unchanged, either because the
    /// proposal was rejected or because it was not applicable.
    fn propose(&self, tom: &mut Tom, ctx: &mut CaseInfo) -> bool;

}

/// Accept or roll back a proposal that changed the parent sets in `snapshot`
fn settle(tom: &mut Tom, ctx: &mut CaseInfo, name: &str, delta: f64, snapshot: Vec<(usize, Vec<usize>)>) -> bool {
    if ctx.accept(delta) {
        ctx.commit(tom, delta);
        trace!(operator = name, delta, "accepted");
        true
    } else {
        for (var, parents) in snapshot {
            tom.set_parents(var, parents);
        }
        trace!(operator = name, delta, "rejected");
        false
    }
}

/// Add or remove a single arc between two uniformly drawn nodes
pub struct SkeletalChange;

impl MoveOperator for SkeletalChange {

    fn name(&self) -> &'static str {
        "skeletal"
    }

    fn propose(&self, tom: &mut Tom, ctx: &mut CaseInfo) -> bool {
        let n = tom.num_vars();
        if n < 2 {
            return false;
        }

        let mut pi = ctx.index(n);
        let mut pj = ctx.index(n - 1);
        if pj >= pi {
            pj += 1;
        }
        if pi > pj {
            std::mem::swap(&mut pi, &mut pj);
        }

        let i = tom.node_at(pi);
        let j = tom.node_at(pj);
        let adding = !tom.is_parent(i, j);

        if adding && tom.num_parents(j) >= tom.max_num_parents() {
            return false;
        }

        let snapshot = tom.parents(j).to_vec();
        let old_cost = ctx.node_cost(j, &snapshot);
        let prior = ctx.coster.cost_to_toggle_arc(tom, i, j);

        tom.toggle_arc(i, j);
        let new_cost = ctx.node_cost(j, tom.parents(j));
        let delta = cost_delta(old_cost, new_cost) + prior;

        let accepted = settle(tom, ctx, self.name(), delta, vec![(j, snapshot)]);
        if accepted {
            ctx.record_toggle(j, i, adding);
        }
        accepted
    }

}

/// Swap two adjacent nodes in the total order, reversing the arc between them if present
pub struct TemporalChange;

impl MoveOperator for TemporalChange {

    fn name(&self) -> &'static str {
        "temporal"
    }

    fn propose(&self, tom: &mut Tom, ctx: &mut CaseInfo) -> bool {
        let n = tom.num_vars();
        if n < 2 {
            return false;
        }

        let pos = ctx.index(n - 1);
        let a = tom.node_at(pos);
        let b = tom.node_at(pos + 1);

        if !tom.is_parent(a, b) {
            // no arc: only the order changes, which costs nothing under any prior
            if ctx.accept(0.0) {
                tom.swap_adjacent(pos);
                return true;
            }
            return false;
        }

        if tom.num_parents(a) >= tom.max_num_parents() {
            return false;
        }

        let snapshot = vec![(a, tom.parents(a).to_vec()), (b, tom.parents(b).to_vec())];
        let old_cost = ctx.node_cost(a, &snapshot[0].1) + ctx.node_cost(b, &snapshot[1].1);
        let prior = ctx.coster.cost_to_reverse_arc(tom, a, b);

        tom.swap_adjacent(pos);
        let new_cost = ctx.node_cost(a, tom.parents(a)) + ctx.node_cost(b, tom.parents(b));
        let delta = cost_delta(old_cost, new_cost) + prior;

        if ctx.accept(delta) {
            ctx.commit(tom, delta);
            ctx.record_toggle(b, a, false);
            ctx.record_toggle(a, b, true);
            trace!(operator = self.name(), delta, "accepted");
            true
        } else {
            // swapping back restores the order and re-reverses the arc
            tom.swap_adjacent(pos);
            for (var, parents) in snapshot {
                tom.set_parents(var, parents);
            }
            trace!(operator = self.name(), delta, "rejected");
            false
        }
    }

}

/// Toggle the arcs from two earlier nodes into a later one
pub struct DoubleSkeletalChange;

impl MoveOperator for DoubleSkeletalChange {

    fn name(&self) -> &'static str {
        "double skeletal"
    }

    fn propose(&self, tom: &mut Tom, ctx: &mut CaseInfo) -> bool {
        let n = tom.num_vars();
        if n < 3 {
            return false;
        }

        // three distinct positions; the latest holds the child
        let mut positions = [ctx.index(n), ctx.index(n - 1), ctx.index(n - 2)];
        if positions[1] >= positions[0] {
            positions[1] += 1;
        }
        let (lo, hi) = (positions[0].min(positions[1]), positions[0].max(positions[1]));
        if positions[2] >= lo {
            positions[2] += 1;
        }
        if positions[2] >= hi {
            positions[2] += 1;
        }
        positions.sort_unstable();

        let child = tom.node_at(positions[2]);
        let p1 = tom.node_at(positions[0]);
        let p2 = tom.node_at(positions[1]);

        let add1 = !tom.is_parent(p1, child);
        let add2 = !tom.is_parent(p2, child);
        let step = |add: bool| if add { 1 } else { -1 };
        if tom.num_parents(child) as isize + step(add1) + step(add2) > tom.max_num_parents() as isize {
            return false;
        }

        let snapshot = tom.parents(child).to_vec();
        let old_cost = ctx.node_cost(child, &snapshot);
        let prior = ctx.coster.cost_to_toggle_arcs(tom, &[(p1, child), (p2, child)]);

        // removals first so additions never hit the parent limit
        if !add1 {
            tom.remove_arc(p1, child);
        }
        if !add2 {
            tom.remove_arc(p2, child);
        }
        if add1 {
            tom.add_arc(p1, child);
        }
        if add2 {
            tom.add_arc(p2, child);
        }

        let new_cost = ctx.node_cost(child, tom.parents(child));
        let delta = cost_delta(old_cost, new_cost) + prior;

        let accepted = settle(tom, ctx, self.name(), delta, vec![(child, snapshot)]);
        if accepted {
            ctx.record_toggle(child, p1, add1);
            ctx.record_toggle(child, p2, add2);
        }
        accepted
    }

}

/// Replace one parent of a node with a non-parent, keeping the arc count. Nodes late in the
/// order are favoured.
pub struct ParentSwapChange;

impl MoveOperator for ParentSwapChange {

    fn name(&self) -> &'static str {
        "parent swap"
    }

    fn propose(&self, tom: &mut Tom, ctx: &mut CaseInfo) -> bool {
        let n = tom.num_vars();
        if n < 3 {
            return false;
        }

        let r = ctx.uniform();
        let bias = 1.0 - r * r;
        // clamp: a draw near 1 must not index past the last position
        let nj = (((n - 2) as f64 * bias) as usize).min(n - 3);

        let j = tom.node_at(nj + 2);
        let num_parents = tom.num_parents(j);
        if num_parents == 0 || num_parents >= nj {
            return false;
        }

        let i = tom.parents(j)[ctx.index(num_parents)];

        // the k-th non-parent among positions 0..=nj
        let mut skip = ctx.index(nj - num_parents);
        let mut k = None;
        for pos in 0..=nj {
            let candidate = tom.node_at(pos);
            if !tom.is_parent(candidate, j) {
                if skip == 0 {
                    k = Some(candidate);
                    break;
                }
                skip -= 1;
            }
        }
        let k = match k {
            Some(k) => k,
            None => return false
        };

        let snapshot = tom.parents(j).to_vec();
        let old_cost = ctx.node_cost(j, &snapshot);
        let prior = ctx.coster.cost_to_toggle_arcs(tom, &[(i, j), (k, j)]);

        tom.remove_arc(i, j);
        tom.add_arc(k, j);

        let new_cost = ctx.node_cost(j, tom.parents(j));
        let delta = cost_delta(old_cost, new_cost) + prior;

        let accepted = settle(tom, ctx, self.name(), delta, vec![(j, snapshot)]);
        if accepted {
            ctx.record_toggle(j, i, false);
            ctx.record_toggle(j, k, true);
        }
        accepted
    }

}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::config::SearchConfig;
    use crate::dataset::Dataset;
    use crate::model::AdaptiveCodeLearner;

    use ndarray::prelude as nd;
    use proptest::prelude::*;

    use std::sync::Arc;

    fn context(n: usize, seed: u64) -> CaseInfo {
        let rows: Vec<Vec<usize>> = (0..40).map(|r| (0..n).map(|c| (r * (c + 1) / 3) % 2).collect()).collect();
        let flat: Vec<usize> = rows.into_iter().flatten().collect();
        let values = nd::Array2::from_shape_vec((40, n), flat).unwrap();
        let names: Vec<String> = (0..n).map(|i| format!("v{}", i)).collect();
        let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let data = Arc::new(Dataset::from_codes(&names, vec![2; n], values).unwrap());

        let mut config = SearchConfig::default();
        config.seed = Some(seed);
        CaseInfo::new(data, Box::new(AdaptiveCodeLearner::mml()), &config)
    }

    fn operators() -> Vec<Box<dyn MoveOperator>> {
        vec![Box::new(SkeletalChange), Box::new(TemporalChange), Box::new(DoubleSkeletalChange), Box::new(ParentSwapChange)]
    }

    #[test]
    fn too_few_nodes() {
        let mut ctx = context(2, 1);
        let mut tom = Tom::new(2, 2);
        assert!(!DoubleSkeletalChange.propose(&mut tom, &mut ctx));
        assert!(!ParentSwapChange.propose(&mut tom, &mut ctx));

        let mut ctx = context(1, 1);
        let mut tom = Tom::new(1, 2);
        assert!(!SkeletalChange.propose(&mut tom, &mut ctx));
        assert!(!TemporalChange.propose(&mut tom, &mut ctx));
    }

    #[test]
    /// In safe mode a move that does not strictly improve the cost leaves the Tom unchanged
    fn rejection_restores() {
        let mut ctx = context(5, 3);
        let mut tom = Tom::new(5, 3);
        tom.add_arc(0, 4);
        tom.add_arc(1, 4);
        tom.add_arc(2, 3);
        ctx.reset_cost(&tom);

        ctx.safe_mode = true;
        for _ in 0..200 {
            for op in operators() {
                let before = tom.clone();
                let cost = ctx.current_cost();
                if !op.propose(&mut tom, &mut ctx) {
                    assert_eq!(before, tom);
                    assert_eq!(cost, ctx.current_cost());
                }
            }
        }
    }

    #[test]
    /// The tracked cost follows the accepted moves
    fn cost_tracking() {
        let mut ctx = context(5, 7);
        let mut tom = Tom::new(5, 3);
        ctx.reset_cost(&tom);

        for _ in 0..300 {
            for op in operators() {
                op.propose(&mut tom, &mut ctx);
            }
        }

        let tracked = ctx.current_cost();
        let actual = ctx.full_cost(&tom);
        assert!((tracked - actual).abs() < 1e-6 * actual.abs().max(1.0), "{} vs {}", tracked, actual);
    }

    #[test]
    /// A parent swap keeps the number of parents of every node
    fn parent_swap_keeps_arc_count() {
        let mut ctx = context(6, 11);
        let mut tom = Tom::new(6, 4);
        tom.add_arc(0, 5);
        tom.add_arc(2, 5);
        tom.add_arc(1, 4);
        let counts: Vec<usize> = (0..6).map(|v| tom.num_parents(v)).collect();

        for _ in 0..200 {
            ParentSwapChange.propose(&mut tom, &mut ctx);
            assert_eq!(counts, (0..6).map(|v| tom.num_parents(v)).collect::<Vec<usize>>());
        }
    }

    proptest! {
        #[test]
        /// Accepted or not, every move keeps parents ahead of their children and within the limit
        fn moves_stay_acyclic(seed in any::<u64>(), steps in 1usize..150) {
            let mut ctx = context(5, seed);
            let mut tom = Tom::new(5, 2);
            ctx.reset_cost(&tom);
            let ops = operators();

            for s in 0..steps {
                let op = &ops[s % ops.len()];
                let before = tom.clone();
                if !op.propose(&mut tom, &mut ctx) {
                    prop_assert_eq!(&before, &tom);
                }
                prop_assert!(tom.is_consistent());
            }
        }
    }
}

//! Grouping of sampled `Tom`s into classes with the same statistical implications.
//!
//! The sampler tallies the visits of every group; visit frequency is the posterior estimate of a
//! group. Groups are kept in first-visit order so ties are broken deterministically.

use crate::search::tom::Tom;

use indexmap::IndexMap;

use std::hash::Hash;

/// Maps a `Tom` to the key of its group
pub trait StructureGrouping {

    type Key: Hash + Eq + Clone;

    fn key(&self, tom: &Tom) -> Self::Key;

}

/// Groups `Tom`s with identical parent sets. The total order is ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct DagGrouping;

impl StructureGrouping for DagGrouping {

    type Key = Vec<Vec<usize>>;

    fn key(&self, tom: &Tom) -> Self::Key {
        tom.parent_sets().to_vec()
    }

}

/// Groups `Tom`s by Markov equivalence: identical skeleton and identical v-structures.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkovGrouping;

/// Sorted undirected edges and sorted v-structures ```(a, child, b)``` with ```a < b```
pub type MarkovKey = (Vec<(usize, usize)>, Vec<(usize, usize, usize)>);

impl StructureGrouping for MarkovGrouping {

    type Key = MarkovKey;

    fn key(&self, tom: &Tom) -> Self::Key {
        let mut skeleton: Vec<(usize, usize)> = tom.arcs().into_iter().map(|(p, c)| (p.min(c), p.max(c))).collect();
        skeleton.sort_unstable();

        let mut v_structures = Vec::new();
        for child in 0..tom.num_vars() {
            let parents = tom.parents(child);
            for (x, &a) in parents.iter().enumerate() {
                for &b in parents.iter().skip(x + 1) {
                    if !tom.is_arc(a, b) {
                        v_structures.push((a, child, b));
                    }
                }
            }
        }

        (skeleton, v_structures)
    }

}

/// One retained group of sampled structures
#[derive(Clone, Debug)]
pub struct SearchResult {

    /// The cheapest `Tom` seen in the group
    pub tom: Tom,

    /// Total cost of `tom`
    pub cost: f64,

    /// Share of the sampling weight that landed in the group
    pub posterior: f64,

    /// Number of sampling epochs spent in the group
    pub visits: u64

}

struct Group {
    representative: Tom,
    cost: f64,
    weight: f64,
    visits: u64
}

/// Posterior tally of sampled structures
pub struct StructureTally<G: StructureGrouping> {

    grouping: G,

    groups: IndexMap<G::Key, Group>,

    total_weight: f64

}

impl<G: StructureGrouping> StructureTally<G> {

    pub fn new(grouping: G) -> Self {
        StructureTally { grouping, groups: IndexMap::new(), total_weight: 0.0 }
    }

    /// Add `weight` to the group of `tom`, keeping the cheapest member as representative
    pub fn record(&mut self, tom: &Tom, cost: f64, weight: f64) {
        let key = self.grouping.key(tom);
        self.total_weight += weight;

        match self.groups.get_mut(&key) {
            Some(group) => {
                group.weight += weight;
                group.visits += 1;
                if cost < group.cost {
                    group.cost = cost;
                    group.representative = tom.clone();
                }
            },
            None => {
                self.groups.insert(key, Group { representative: tom.clone(), cost, weight, visits: 1 });
            }
        }
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Group weights, heaviest first, ties in first-visit order
    fn ranked(&self) -> Vec<&Group> {
        let mut groups: Vec<&Group> = self.groups.values().collect();
        groups.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        groups
    }

    /// Share of the weight held by the `max_groups` heaviest groups
    pub fn coverage(&self, max_groups: usize) -> f64 {
        if self.total_weight <= 0.0 {
            return 0.0;
        }
        self.ranked().iter().take(max_groups).map(|g| g.weight).sum::<f64>() / self.total_weight
    }

    /// The heaviest groups: the shortest prefix whose posterior reaches `min_posterior`, at most
    /// `max_groups` long.
    pub fn results(&self, max_groups: usize, min_posterior: f64) -> Vec<SearchResult> {
        let mut results = Vec::new();
        if self.total_weight <= 0.0 {
            return results;
        }

        let mut covered = 0.0;
        for group in self.ranked().into_iter().take(max_groups) {
            let posterior = group.weight / self.total_weight;
            results.push(SearchResult {
                tom: group.representative.clone(),
                cost: group.cost,
                posterior,
                visits: group.visits
            });
            covered += posterior;
            if covered >= min_posterior {
                break;
            }
        }
        results
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    fn chain(order: &[usize]) -> Tom {
        // order[0] -> order[1] -> order[2]
        let mut parents = vec![Vec::new(); 3];
        parents[order[1]].push(order[0]);
        parents[order[2]].push(order[1]);
        Tom::from_parents(parents, 2).unwrap()
    }

    #[test]
    /// A chain and its reversal are Markov equivalent; a collider is not
    fn markov_equivalence() {
        let g = MarkovGrouping;
        let forward = chain(&[0, 1, 2]);
        let backward = chain(&[2, 1, 0]);
        assert_eq!(g.key(&forward), g.key(&backward));
        assert_ne!(DagGrouping.key(&forward), DagGrouping.key(&backward));

        let collider = Tom::from_parents(vec![vec![], vec![0, 2], vec![]], 2).unwrap();
        assert_ne!(g.key(&forward), g.key(&collider));
        assert_eq!(vec![(0, 1, 2)], g.key(&collider).1);
    }

    #[test]
    fn tally_ranks_by_weight() {
        let mut tally = StructureTally::new(MarkovGrouping);
        let empty = Tom::new(3, 2);
        let forward = chain(&[0, 1, 2]);
        let backward = chain(&[2, 1, 0]);

        tally.record(&empty, 10.0, 1.0);
        tally.record(&forward, 8.0, 1.0);
        tally.record(&backward, 7.0, 1.0);
        tally.record(&forward, 8.0, 1.0);

        assert_eq!(2, tally.num_groups());
        let results = tally.results(10, 1.0);
        assert_eq!(2, results.len());
        assert_eq!(0.75, results[0].posterior);
        assert_eq!(7.0, results[0].cost);
        assert_eq!(backward, results[0].tom);
        assert_eq!(3, results[0].visits);

        assert_eq!(0.75, tally.coverage(1));
        assert_eq!(1, tally.results(10, 0.7).len());
        assert_eq!(1, tally.results(1, 1.0).len());
    }

    #[test]
    fn empty_tally() {
        let tally = StructureTally::new(DagGrouping);
        assert!(tally.results(5, 0.9).is_empty());
        assert_eq!(0.0, tally.coverage(5));
    }
}

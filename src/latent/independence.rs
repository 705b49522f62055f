//! Conditional independence tests.
//!
//! The trigger machinery only ever asks whether two variables are dependent given a conditioning
//! set, so any test implementing `IndependenceTest` can drive it.

use crate::dataset::Dataset;
use crate::model::parent_config;

use ndarray::prelude as nd;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Answers ```a ⟂ b | given```
pub trait IndependenceTest {

    /// True if `a` and `b` are dependent given the variables in `given`
    fn is_dependent(&self, a: usize, b: usize, given: &[usize]) -> bool;

}

/// The statistic computed by a `ChiSquareTest`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Statistic {
    /// Pearson's ```X^2 = Σ (O - E)^2 / E```
    Pearson,

    /// The likelihood ratio ```G^2 = 2 Σ O ln(O / E)```
    GSquared
}

/// Stratified chi-square test of conditional independence over a dataset.
///
/// The conditioning variables split the data into strata; each stratum contributes its statistic
/// and its degrees of freedom, ```(r - 1)(c - 1)``` after dropping empty rows and columns. The
/// variables are judged dependent when the p-value of the summed statistic is below `alpha`.
pub struct ChiSquareTest<'a> {

    data: &'a Dataset,

    /// Significance level
    alpha: f64,

    statistic: Statistic

}

impl<'a> ChiSquareTest<'a> {

    pub fn new(data: &'a Dataset, alpha: f64) -> Self {
        ChiSquareTest { data, alpha, statistic: Statistic::Pearson }
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    /// Weighted contingency tables of `a` against `b`, one per configuration of `given`
    fn tables(&self, a: usize, b: usize, given: &[usize]) -> nd::Array3<f64> {
        let arities: Vec<usize> = given.iter().map(|&g| self.data.arity(g)).collect();
        let strata: usize = arities.iter().product();
        let mut counts = nd::Array3::zeros((strata, self.data.arity(a), self.data.arity(b)));

        for r in 0..self.data.num_rows() {
            let row = self.data.row(r);
            let s = parent_config(given, &arities, |v| row[v]);
            counts[[s, row[a], row[b]]] += self.data.weight(r);
        }
        counts
    }

    /// The statistic and degrees of freedom of one stratum
    fn stratum(&self, table: nd::ArrayView2<f64>) -> (f64, usize) {
        let rows = table.sum_axis(nd::Axis(1));
        let cols = table.sum_axis(nd::Axis(0));
        let total = rows.sum();
        if total <= 0.0 {
            return (0.0, 0);
        }

        let nonempty_rows = rows.iter().filter(|&&x| x > 0.0).count();
        let nonempty_cols = cols.iter().filter(|&&x| x > 0.0).count();
        let df = nonempty_rows.saturating_sub(1) * nonempty_cols.saturating_sub(1);

        let mut stat = 0.0;
        for ((i, j), &observed) in table.indexed_iter() {
            let expected = rows[i] * cols[j] / total;
            if expected <= 0.0 {
                continue;
            }
            stat += match self.statistic {
                Statistic::Pearson => (observed - expected).powi(2) / expected,
                Statistic::GSquared if observed > 0.0 => 2.0 * observed * (observed / expected).ln(),
                Statistic::GSquared => 0.0
            };
        }
        (stat, df)
    }

    /// The p-value of the test, or `None` when no stratum has a degree of freedom
    pub fn p_value(&self, a: usize, b: usize, given: &[usize]) -> Option<f64> {
        let counts = self.tables(a, b, given);
        let (stat, df) = counts
            .outer_iter()
            .map(|t| self.stratum(t))
            .fold((0.0, 0), |(s, d), (ts, td)| (s + ts, d + td));

        if df == 0 {
            return None;
        }

        let dist = ChiSquared::new(df as f64).ok()?;
        Some(1.0 - dist.cdf(stat))
    }

}

impl<'a> IndependenceTest for ChiSquareTest<'a> {

    fn is_dependent(&self, a: usize, b: usize, given: &[usize]) -> bool {
        match self.p_value(a, b, given) {
            Some(p) => p < self.alpha,
            None => false
        }
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    /// b copies a, c is independent of both
    fn data() -> Dataset {
        let rows: Vec<[usize; 3]> = (0..400).map(|r| [r % 2, r % 2, (r / 2) % 2]).collect();
        Dataset::from_codes(&["a", "b", "c"], vec![2, 2, 2], nd::arr2(&rows)).unwrap()
    }

    #[test]
    fn marginal() {
        let data = data();
        for statistic in [Statistic::Pearson, Statistic::GSquared].iter() {
            let test = ChiSquareTest::new(&data, 0.05).with_statistic(*statistic);
            assert!(test.is_dependent(0, 1, &[]));
            assert!(test.is_dependent(1, 0, &[]));
            assert!(!test.is_dependent(0, 2, &[]));
        }
    }

    #[test]
    /// Conditioning on a copy of a variable removes its dependence on everything
    fn conditional() {
        let data = data();
        let test = ChiSquareTest::new(&data, 0.05);
        assert!(test.is_dependent(0, 1, &[2]));
        // given b, a is constant in each stratum: no degrees of freedom, so independent
        assert!(!test.is_dependent(0, 2, &[1]));
        assert_eq!(None, test.p_value(0, 2, &[1]));
    }

    #[test]
    fn perfectly_independent() {
        // every combination of a and c equally often
        let rows: Vec<[usize; 2]> = (0..100).map(|r| [r % 2, (r / 2) % 2]).collect();
        let data = Dataset::from_codes(&["a", "c"], vec![2, 2], nd::arr2(&rows)).unwrap();
        let test = ChiSquareTest::new(&data, 0.05);
        let p = test.p_value(0, 1, &[]).unwrap();
        assert!(p > 0.9, "p = {}", p);
    }
}

//! Defines a `Dataset`, a column-oriented table of discrete observations.
//!
//! Every column has a finite state space. Values are stored as dense integer codes in
//! ```0..arity```; when a `Dataset` is built from string labels, codes are assigned in the order
//! in which labels are first discovered.

use crate::util::{Result, TomSearchError};

use bidir_map::BidirMap;
use indexmap::IndexMap;
use ndarray::prelude as nd;

/// An immutable table of discrete observations with optional per-row weights.
#[derive(Clone, Debug)]
pub struct Dataset {

    /// The coded values, one row per observation and one column per variable
    values: nd::Array2<usize>,

    /// The number of states of each variable
    arities: Vec<usize>,

    /// The state labels of each variable, indexed by code
    labels: Vec<Vec<String>>,

    /// Two way lookup ```(index -> name)``` and ```(name -> index)```
    names: BidirMap<usize, String>,

    /// Soft weight of each row. `None` means every row has weight 1
    weights: Option<nd::Array1<f64>>

}

impl Dataset {

    /// Build a `Dataset` from columns of string labels.
    ///
    /// # Args
    /// * `names`: the name of each column
    /// * `columns`: the observed labels, one `Vec` per column. All columns must have equal length.
    ///
    /// # Returns
    /// the coded `Dataset`. Each column's codes follow first-discovery order of its labels.
    pub fn from_labels<S: AsRef<str>>(names: &[&str], columns: &[Vec<S>]) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(TomSearchError::ShapeMismatch(
                format!("{} names for {} columns", names.len(), columns.len())
            ));
        }

        let num_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.iter().any(|c| c.len() != num_rows) {
            return Err(TomSearchError::ShapeMismatch(String::from("columns differ in length")));
        }

        let mut values = nd::Array2::zeros((num_rows, columns.len()));
        let mut labels = Vec::with_capacity(columns.len());

        for (c, column) in columns.iter().enumerate() {
            let mut codes: IndexMap<String, usize> = IndexMap::new();
            for (r, label) in column.iter().enumerate() {
                let next = codes.len();
                let code = *codes.entry(String::from(label.as_ref())).or_insert(next);
                values[[r, c]] = code;
            }
            labels.push(codes.into_iter().map(|(label, _)| label).collect::<Vec<String>>());
        }

        let arities = labels.iter().map(|l: &Vec<String>| l.len().max(1)).collect();

        Ok(Dataset { values, arities, labels, names: Dataset::name_map(names)?, weights: None })
    }

    /// Build a `Dataset` from already coded values.
    ///
    /// # Args
    /// * `names`: the name of each column
    /// * `arities`: the number of states of each column
    /// * `values`: a ```rows x columns``` table of codes, each below its column's arity
    pub fn from_codes(names: &[&str], arities: Vec<usize>, values: nd::Array2<usize>) -> Result<Self> {
        if names.len() != arities.len() || values.ncols() != arities.len() {
            return Err(TomSearchError::ShapeMismatch(
                format!("{} names, {} arities, {} columns", names.len(), arities.len(), values.ncols())
            ));
        }

        for ((_, var), &value) in values.indexed_iter() {
            if value >= arities[var] {
                return Err(TomSearchError::ValueOutOfRange { var, value, arity: arities[var] });
            }
        }

        let labels = arities.iter().map(|&a| (0..a).map(|s| s.to_string()).collect()).collect();

        Ok(Dataset { values, arities, labels, names: Dataset::name_map(names)?, weights: None })
    }

    fn name_map(names: &[&str]) -> Result<BidirMap<usize, String>> {
        let mut map = BidirMap::new();
        for (i, name) in names.iter().enumerate() {
            if map.contains_second_key(&String::from(*name)) {
                return Err(TomSearchError::ShapeMismatch(format!("duplicate column name '{}'", name)));
            }
            map.insert(i, String::from(*name));
        }
        Ok(map)
    }

    /// Attach soft row weights, returning a new `Dataset`.
    ///
    /// Weights must be finite, non-negative and one per row.
    pub fn with_weights(&self, weights: nd::Array1<f64>) -> Result<Self> {
        if weights.len() != self.num_rows() {
            return Err(TomSearchError::ShapeMismatch(
                format!("{} weights for {} rows", weights.len(), self.num_rows())
            ));
        }

        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(TomSearchError::ShapeMismatch(String::from("weights must be finite and non-negative")));
        }

        let mut data = self.clone();
        data.weights = Some(weights);
        Ok(data)
    }

    /// The number of observations
    pub fn num_rows(&self) -> usize {
        self.values.nrows()
    }

    /// The number of variables
    pub fn num_vars(&self) -> usize {
        self.values.ncols()
    }

    /// The number of states of variable `var`
    pub fn arity(&self, var: usize) -> usize {
        self.arities[var]
    }

    pub fn arities(&self) -> &[usize] {
        &self.arities
    }

    /// The coded value of `var` in `row`
    pub fn value(&self, row: usize, var: usize) -> usize {
        self.values[[row, var]]
    }

    /// A view of a single observation
    pub fn row(&self, row: usize) -> nd::ArrayView1<usize> {
        self.values.row(row)
    }

    pub fn values(&self) -> &nd::Array2<usize> {
        &self.values
    }

    /// The weight of `row`, 1 when the data is unweighted
    pub fn weight(&self, row: usize) -> f64 {
        match self.weights {
            Some(ref w) => w[row],
            None => 1.0
        }
    }

    pub fn weights(&self) -> Option<&nd::Array1<f64>> {
        self.weights.as_ref()
    }

    /// The sum of all row weights
    pub fn total_weight(&self) -> f64 {
        match self.weights {
            Some(ref w) => w.sum(),
            None => self.num_rows() as f64
        }
    }

    /// The label of state `code` of variable `var`
    pub fn label(&self, var: usize, code: usize) -> Option<&str> {
        self.labels.get(var).and_then(|l| l.get(code)).map(|s| s.as_str())
    }

    /// The name of variable `var`
    pub fn name(&self, var: usize) -> Option<&String> {
        self.names.get_by_first(&var)
    }

    /// Lookup a variable's index by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .get_by_second(&String::from(name))
            .cloned()
            .ok_or_else(|| TomSearchError::UnknownVariable(String::from(name)))
    }

    /// All variable names in column order
    pub fn names(&self) -> Vec<String> {
        (0..self.num_vars()).map(|v| self.name(v).cloned().unwrap_or_else(|| format!("var({})", v))).collect()
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    /// Labels are coded in first-discovery order and repeated labels reuse their code
    fn discovery_order() {
        let data = Dataset::from_labels(
            &["a", "b"],
            &[vec!["yes", "no", "yes", "maybe"], vec!["x", "x", "x", "x"]]
        ).unwrap();

        assert_eq!(4, data.num_rows());
        assert_eq!(2, data.num_vars());
        assert_eq!(3, data.arity(0));
        assert_eq!(1, data.arity(1));
        assert_eq!(vec![0, 1, 0, 2], data.values().column(0).to_vec());
        assert_eq!(Some("maybe"), data.label(0, 2));
        assert_eq!(1, data.index_of("b").unwrap());
        assert_eq!("a", data.name(0).unwrap());
    }

    #[test]
    fn ragged_columns() {
        let data = Dataset::from_labels(&["a", "b"], &[vec!["0", "1"], vec!["0"]]);
        assert!(data.is_err());
    }

    #[test]
    fn codes_out_of_range() {
        let values = nd::arr2(&[[0, 1], [1, 2]]);
        let data = Dataset::from_codes(&["a", "b"], vec![2, 2], values);
        match data {
            Err(TomSearchError::ValueOutOfRange { var, value, arity }) => {
                assert_eq!((1, 2, 2), (var, value, arity));
            },
            _ => panic!("expected an out of range error")
        }
    }

    #[test]
    fn weights() {
        let values = nd::arr2(&[[0, 1], [1, 0], [1, 1]]);
        let data = Dataset::from_codes(&["a", "b"], vec![2, 2], values).unwrap();
        assert_eq!(3.0, data.total_weight());
        assert_eq!(1.0, data.weight(2));

        let weighted = data.with_weights(nd::arr1(&[0.5, 0.25, 2.0])).unwrap();
        assert_eq!(2.75, weighted.total_weight());
        assert_eq!(0.25, weighted.weight(1));

        assert!(data.with_weights(nd::arr1(&[1.0])).is_err());
        assert!(data.with_weights(nd::arr1(&[1.0, -1.0, 1.0])).is_err());
    }

    #[test]
    fn unknown_name() {
        let data = Dataset::from_codes(&["a"], vec![2], nd::arr2(&[[0], [1]])).unwrap();
        assert!(data.index_of("z").is_err());
    }
}

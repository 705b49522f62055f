//! Trigger signatures and the matcher that compares them against observed fingerprints.
//!
//! A trigger is a small DAG over one hidden node (index 0) and four observed nodes whose
//! dependency fingerprint, with the hidden node projected out, no DAG over the observed nodes
//! alone can produce. Seeing that fingerprint in data is evidence for a hidden common cause.

use crate::latent::dependency::{extract_with_hidden, Fingerprint};
use crate::latent::dsep::DSeparationOracle;
use crate::util::{Result, TomSearchError};

use itertools::Itertools;
use ndarray::prelude as nd;
use tracing::debug;

use std::io::{BufRead, Write};

/// Separator line between matrices in a signature file
pub const SEPARATOR: &str = "***************";

/// Number of observed nodes in every signature
pub const SIGNATURE_OBSERVED: usize = 4;

/// A DAG with a hidden node at index 0. ```adjacency[[i, j]] == 1``` means ```i -> j```.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerSignature {
    pub adjacency: nd::Array2<u8>
}

impl TriggerSignature {

    /// Build from a list of arcs over `num_nodes` nodes
    pub fn from_arcs(num_nodes: usize, arcs: &[(usize, usize)]) -> Self {
        let mut adjacency = nd::Array2::zeros((num_nodes, num_nodes));
        for &(from, to) in arcs {
            adjacency[[from, to]] = 1;
        }
        TriggerSignature { adjacency }
    }

    /// The two built-in signatures
    pub fn builtin() -> Vec<TriggerSignature> {
        vec![
            TriggerSignature::from_arcs(5, &[(0, 3), (0, 4), (1, 2), (1, 4), (2, 3)]),
            TriggerSignature::from_arcs(5, &[(0, 3), (0, 4), (1, 4), (2, 3)])
        ]
    }

    pub fn num_nodes(&self) -> usize {
        self.adjacency.nrows()
    }

    /// Relabel the observed nodes: observed node ```i + 1``` becomes ```perm[i] + 1```. The
    /// hidden node stays at 0.
    pub fn relabel(&self, perm: &[usize]) -> TriggerSignature {
        let map = |v: usize| if v == 0 { 0 } else { perm[v - 1] + 1 };
        let n = self.num_nodes();
        let mut adjacency = nd::Array2::zeros((n, n));
        for ((i, j), &a) in self.adjacency.indexed_iter() {
            if a != 0 {
                adjacency[[map(i), map(j)]] = 1;
            }
        }
        TriggerSignature { adjacency }
    }

    /// The observed fingerprint this DAG implies: d-separation over every node, then the hidden
    /// node projected out.
    pub fn fingerprint(&self) -> Fingerprint {
        let oracle = DSeparationOracle::from_adjacency(&self.adjacency);
        extract_with_hidden(&oracle, self.num_nodes() - 1).project_out_first()
    }

}

/// One placement of a signature: which signature, which relabelling, and its fingerprint
struct Candidate {
    signature: usize,
    structure: TriggerSignature,
    fingerprint: Fingerprint
}

/// The outcome of matching one fingerprint
#[derive(Clone, Debug)]
pub struct MatchResult {

    /// The best candidate was within the error rate
    pub matched: bool,

    /// Mismatched entries of the best candidate
    pub mismatches: usize,

    /// Total entries compared
    pub total_entries: usize,

    /// Index of the best signature
    pub signature: usize,

    /// The best candidate in local indices: hidden at 0, subset variable ```i``` at ```i + 1```
    pub structure: TriggerSignature

}

/// Compares fingerprints of four-variable subsets against every placement of the signatures
pub struct TriggerMatcher {

    candidates: Vec<Candidate>,

    /// Fraction of mismatched entries tolerated
    error_rate: f64

}

impl TriggerMatcher {

    pub fn new(error_rate: f64) -> Self {
        TriggerMatcher::with_signatures(&TriggerSignature::builtin(), error_rate)
    }

    /// Enumerate every placement of every signature, in signature order then permutation order
    pub fn with_signatures(signatures: &[TriggerSignature], error_rate: f64) -> Self {
        let mut candidates = Vec::new();
        for (s, signature) in signatures.iter().enumerate() {
            let observed = signature.num_nodes() - 1;
            for perm in (0..observed).permutations(observed) {
                let structure = signature.relabel(&perm);
                let fingerprint = structure.fingerprint();
                candidates.push(Candidate { signature: s, structure, fingerprint });
            }
        }
        TriggerMatcher { candidates, error_rate }
    }

    pub fn num_candidates(&self) -> usize {
        self.candidates.len()
    }

    /// Find the candidate closest to `observed`. The first candidate with the fewest mismatches
    /// wins.
    ///
    /// # Returns
    /// the best candidate, matched when its mismatches are below
    /// ```k^2 * number of matrices * error_rate```, or an error when `observed` is not over the
    /// signatures' number of observed variables
    pub fn match_fingerprint(&self, observed: &Fingerprint) -> Result<MatchResult> {
        let k = observed.size();
        let mut best: Option<(usize, &Candidate)> = None;

        for candidate in self.candidates.iter() {
            if candidate.fingerprint.size() != k || candidate.fingerprint.len() != observed.len() {
                continue;
            }
            let m = candidate.fingerprint.mismatches(observed);
            if best.map_or(true, |(b, _)| m < b) {
                best = Some((m, candidate));
            }
        }

        let (mismatches, candidate) = best.ok_or_else(|| TomSearchError::UnsupportedVariableCount {
            found: k,
            min: SIGNATURE_OBSERVED,
            max: SIGNATURE_OBSERVED
        })?;

        let total_entries = k * k * observed.len();
        let matched = (mismatches as f64) < total_entries as f64 * self.error_rate;
        debug!(mismatches, total_entries, matched, signature = candidate.signature, "trigger match");

        Ok(MatchResult {
            matched,
            mismatches,
            total_entries,
            signature: candidate.signature,
            structure: candidate.structure.clone()
        })
    }

}

/// Write matrices as rows of 0/1 digits, each matrix followed by a separator line
pub fn write_matrices<W: Write>(out: &mut W, matrices: &[nd::Array2<u8>]) -> Result<()> {
    for m in matrices {
        for row in m.outer_iter() {
            let line: String = row.iter().map(|&x| if x != 0 { '1' } else { '0' }).collect();
            writeln!(out, "{}", line)?;
        }
        writeln!(out, "{}", SEPARATOR)?;
    }
    Ok(())
}

/// Read square matrices of `size` written by `write_matrices`
pub fn read_matrices<R: BufRead>(input: R, size: usize) -> Result<Vec<nd::Array2<u8>>> {
    let mut matrices = Vec::new();
    let mut rows: Vec<Vec<u8>> = Vec::new();

    for (n, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        let line_no = n + 1;

        if line.is_empty() {
            continue;
        }

        if line == SEPARATOR {
            if rows.len() != size {
                return Err(TomSearchError::TriggerFormat {
                    line: line_no,
                    message: format!("matrix has {} rows, expected {}", rows.len(), size)
                });
            }
            let flat: Vec<u8> = rows.drain(..).flatten().collect();
            let m = nd::Array2::from_shape_vec((size, size), flat)
                .map_err(|e| TomSearchError::TriggerFormat { line: line_no, message: e.to_string() })?;
            matrices.push(m);
            continue;
        }

        if line.len() != size || rows.len() >= size {
            return Err(TomSearchError::TriggerFormat {
                line: line_no,
                message: format!("expected {} digits per row and {} rows per matrix", size, size)
            });
        }

        let row = line
            .chars()
            .map(|c| match c {
                '0' => Ok(0),
                '1' => Ok(1),
                other => Err(TomSearchError::TriggerFormat { line: line_no, message: format!("unexpected '{}'", other) })
            })
            .collect::<Result<Vec<u8>>>()?;
        rows.push(row);
    }

    if !rows.is_empty() {
        return Err(TomSearchError::TriggerFormat { line: 0, message: String::from("missing final separator") });
    }
    Ok(matrices)
}

/// Read signatures stored with `write_matrices`
pub fn read_signatures<R: BufRead>(input: R, num_nodes: usize) -> Result<Vec<TriggerSignature>> {
    Ok(read_matrices(input, num_nodes)?
        .into_iter()
        .map(|adjacency| TriggerSignature { adjacency })
        .collect())
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::latent::dependency::extract;

    #[test]
    fn candidates() {
        let matcher = TriggerMatcher::new(0.005);
        assert_eq!(48, matcher.num_candidates());
    }

    #[test]
    /// A signature's own fingerprint matches with zero mismatches
    fn exact_match() {
        let matcher = TriggerMatcher::new(0.005);
        for signature in TriggerSignature::builtin() {
            let fp = signature.fingerprint();
            assert!(fp.is_symmetric());
            assert_eq!(11, fp.len());

            let result = matcher.match_fingerprint(&fp).unwrap();
            assert!(result.matched);
            assert_eq!(0, result.mismatches);
            assert_eq!(176, result.total_entries);
        }
    }

    #[test]
    fn relabelled_signature_matches() {
        let matcher = TriggerMatcher::new(0.005);
        let relabelled = TriggerSignature::builtin()[0].relabel(&[2, 0, 3, 1]);
        let result = matcher.match_fingerprint(&relabelled.fingerprint()).unwrap();
        assert!(result.matched);
        assert_eq!(0, result.mismatches);
        assert_eq!(relabelled.fingerprint(), result.structure.fingerprint());
    }

    #[test]
    /// A fully observed chain is not mistaken for a hidden cause
    fn observed_dag_does_not_match() {
        let oracle = DSeparationOracle::new(vec![vec![], vec![0], vec![1], vec![2]]);
        let fp = extract(&oracle, &[0, 1, 2, 3]);
        let result = TriggerMatcher::new(0.005).match_fingerprint(&fp).unwrap();
        assert!(!result.matched);
        assert!(result.mismatches > 0);
    }

    #[test]
    fn wrong_size() {
        let oracle = DSeparationOracle::new(vec![vec![]; 5]);
        let fp = extract(&oracle, &[0, 1, 2, 3, 4]);
        assert!(TriggerMatcher::new(0.005).match_fingerprint(&fp).is_err());
    }

    #[test]
    fn file_format() {
        let signatures = TriggerSignature::builtin();
        let matrices: Vec<nd::Array2<u8>> = signatures.iter().map(|s| s.adjacency.clone()).collect();

        let mut buffer = Vec::new();
        write_matrices(&mut buffer, &matrices).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("00011\n00101\n"));
        assert_eq!(2, text.matches(SEPARATOR).count());

        let read = read_signatures(&buffer[..], 5).unwrap();
        assert_eq!(signatures, read);
    }

    #[test]
    fn malformed_file() {
        let bad_digit = "0001x\n";
        match read_matrices(bad_digit.as_bytes(), 5) {
            Err(TomSearchError::TriggerFormat { line, .. }) => assert_eq!(1, line),
            _ => panic!("expected a format error")
        }

        let short = "00\n11\n***************\n";
        assert!(read_matrices(short.as_bytes(), 3).is_err());

        let unterminated = "01\n10\n";
        assert!(read_matrices(unterminated.as_bytes(), 2).is_err());
    }
}

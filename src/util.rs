//! Defines the `Error` type for the tomsearch library

use thiserror::Error;

use std::io;
use std::result;

pub type Result<T> = result::Result<T, TomSearchError>;

#[derive(Debug, Error)]
pub enum TomSearchError {

    /// Represents a table whose rows, columns or weights do not line up
    #[error("Dataset shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A data value was outside the state space of its variable
    #[error("Value {value} of variable {var} is outside its arity {arity}")]
    ValueOutOfRange { var: usize, value: usize, arity: usize },

    /// A variable name or index that is not part of the dataset
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// A configuration value outside its valid range
    #[error("Invalid configuration for '{field}': {message}")]
    InvalidConfig { field: &'static str, message: String },

    /// Malformed expert prior or structural constraint
    #[error("Invalid structural prior: {0}")]
    InvalidPrior(String),

    /// A structure that was supposed to be a DAG contains a cycle
    #[error("Structure contains a cycle through variable {0}")]
    Cyclic(usize),

    /// The model learner could not fit a conditional distribution
    #[error("Model fit failed for variable {var}: {message}")]
    ModelFit { var: usize, message: String },

    /// Latent detection was asked to work on an unsupported number of variables
    #[error("Latent detection requires between {min} and {max} variables, found {found}")]
    UnsupportedVariableCount { found: usize, min: usize, max: usize },

    /// A malformed trigger signature file
    #[error("Trigger file format error at line {line}: {message}")]
    TriggerFormat { line: usize, message: String },

    /// I/O failure while reading or writing signature files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration JSON could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

}

impl TomSearchError {

    /// Construct an `InvalidConfig` error for the named field
    pub fn config<S: Into<String>>(field: &'static str, message: S) -> Self {
        TomSearchError::InvalidConfig { field, message: message.into() }
    }

    /// Construct an `InvalidPrior` error
    pub fn prior<S: Into<String>>(message: S) -> Self {
        TomSearchError::InvalidPrior(message.into())
    }

}

//! Expectation-Maximization over structures with one hidden variable.

pub mod init;
pub mod integrator;
pub mod table;

pub use self::init::{initial_structure, random_responsibilities};
pub use self::integrator::{standard_em, EmIntegrator, LatentOutcome};
pub use self::table::AugmentedTable;

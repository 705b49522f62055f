//! Single latent variable discovery.
//!
//! Dependency fingerprints of four-variable subsets are compared against trigger signatures,
//! DAGs over one hidden and four observed nodes whose observed dependencies no DAG over the
//! observed nodes alone can reproduce.

pub mod dependency;
pub mod detect;
pub mod dsep;
pub mod independence;
pub mod trigger;

pub use self::dependency::{conditioning_sets, extract, Fingerprint};
pub use self::detect::{Detection, LatentDetector};
pub use self::dsep::DSeparationOracle;
pub use self::independence::{ChiSquareTest, IndependenceTest, Statistic};
pub use self::trigger::{MatchResult, TriggerMatcher, TriggerSignature};

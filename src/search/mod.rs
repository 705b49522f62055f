//! Metropolis search over Totally Ordered Models.
//!
//! A `MetropolisSearch` owns one `CaseInfo` per run: the node cost cache, the structure prior and
//! the random generator. Move operators mutate a `Tom` in place and either commit or roll back.

pub mod cache;
pub mod context;
pub mod grouping;
pub mod metropolis;
pub mod moves;
pub mod prior;
pub mod tom;

pub use self::cache::NodeCache;
pub use self::context::CaseInfo;
pub use self::grouping::{DagGrouping, MarkovGrouping, SearchResult, StructureGrouping, StructureTally};
pub use self::metropolis::{MetropolisSearch, Phase};
pub use self::moves::{DoubleSkeletalChange, MoveOperator, ParentSwapChange, SkeletalChange, TemporalChange};
pub use self::prior::{ArcRelation, ExpertTomCoster, TomCoster, UniformTomCoster};
pub use self::tom::Tom;

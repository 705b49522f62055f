pub mod util;
pub mod config;
pub mod dataset;
pub mod model;
pub mod samplers;
pub mod search;
pub mod latent;
pub mod em;
pub use util::{Result, TomSearchError};

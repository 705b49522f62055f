//! Defines the `Sampler` traits - objects that draw complete rows from a parameterized network.

use rand::Rng;

pub mod datasets;
pub mod forward;

pub use self::forward::ForwardSampler;

pub trait Sampler {

    /// Draw one complete row from the associated network.
    fn sample(&mut self) -> Vec<usize>;

}


pub trait IndependentSampler {

    /// Draw one complete row using the caller's random generator.
    fn ind_sample<R: Rng>(&self, rng: &mut R) -> Vec<usize>;

}

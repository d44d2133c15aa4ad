//! Collective operations between contraction workers.
pub mod communication;
pub mod serialization;
#[cfg(test)]
pub(crate) mod testing;

pub use communication::{Collective, SingleProcess};

pub mod config;
pub mod contraction;
pub mod contractor;
pub mod correlator;
pub mod diagram;
pub mod error;
pub mod io;
pub mod mesonfield;
pub mod mpi;
pub mod partitioning;
pub mod types;

pub use error::{Error, Result};

#[macro_use]
extern crate lazy_static;

pub mod config;
pub mod constants;
pub mod error;
pub mod pipeline;
pub mod relic;
pub mod theory;
pub mod utils;

pub use error::{PionError, Result};

// Every stage of the pipeline works in double precision. The F-hat caches written by
// `pre_scan` are stored with this type, so it has to stay fixed across setup and scans.
pub type FloatType = f64;

pub type Index = usize;
pub type Complex = num_complex::Complex64;
pub type ComplexMatrix = ndarray::Array2<Complex>;
pub type MassSquaredArray = ndarray::Array1<FloatType>;

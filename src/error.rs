//! Typed errors for the relic-abundance pipeline.
//!
//! Configuration errors (bad generation count, missing cache) and numerical contract
//! violations (zero masses, non-real eigenvalues, a stalled integration) are separate
//! variants so scan drivers can decide which parameter points to drop and which failures
//! should abort the whole run.

use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, PionError>;

#[derive(Debug)]
pub enum PionError {
    /// Only one and three generations are implemented.
    InvalidGenerations(usize),

    /// A cache file the pipeline needs has not been produced by the setup step yet.
    MissingCache(PathBuf),

    /// The setup step refuses to overwrite an existing cache file.
    CacheExists(PathBuf),

    /// Filesystem failure (path, underlying error message).
    Io(PathBuf, String),

    /// Encoding or decoding of a cached array failed.
    Serialization(String),

    /// A text asset (g* table, sparse transform) could not be parsed.
    MalformedAsset(PathBuf, String),

    /// A physical parameter is outside the domain the model accepts.
    InvalidParameter { name: &'static str, value: f64 },

    /// Arrays handed to a stage have inconsistent shapes.
    ShapeMismatch(String),

    /// A quantity that is divided by vanished (zero mass, zero s, zero m1, zero g_eff^2).
    VanishingDenominator(&'static str),

    /// The mass matrix produced an eigenvalue with a non-negligible imaginary part.
    ComplexEigenvalue { index: usize, imaginary: f64 },

    /// The stiff integrator could not continue (step size underflow, singular system, too many steps).
    IntegrationFailure(String),

    /// The caller-imposed wall-clock budget ran out mid-integration.
    Timeout { elapsed_secs: f64 },
}

impl fmt::Display for PionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGenerations(n) => {
                write!(f, "Invalid Ngen = {n}. Please use either Ngen=1 or Ngen=3.")
            }
            Self::MissingCache(path) => write!(
                f,
                "{} does not exist. Please run pre_scan before proceeding.",
                path.display()
            ),
            Self::CacheExists(path) => write!(
                f,
                "{} already exists. Please remove it before rerunning pre_scan.",
                path.display()
            ),
            Self::Io(path, msg) => write!(f, "I/O error on {}: {msg}", path.display()),
            Self::Serialization(msg) => write!(f, "Serialization failed: {msg}"),
            Self::MalformedAsset(path, msg) => {
                write!(f, "Malformed asset {}: {msg}", path.display())
            }
            Self::InvalidParameter { name, value } => {
                write!(f, "Invalid value {value} for parameter {name}")
            }
            Self::ShapeMismatch(msg) => write!(f, "Shape mismatch: {msg}"),
            Self::VanishingDenominator(what) => write!(f, "Vanishing denominator: {what}"),
            Self::ComplexEigenvalue { index, imaginary } => write!(
                f,
                "Mass matrix eigenvalue {index} has imaginary part {imaginary:e}, above tolerance"
            ),
            Self::IntegrationFailure(msg) => write!(f, "Integration failed: {msg}"),
            Self::Timeout { elapsed_secs } => {
                write!(f, "Integration exceeded its wall-clock budget after {elapsed_secs:.1}s")
            }
        }
    }
}

impl std::error::Error for PionError {}

impl From<bincode::Error> for PionError {
    fn from(err: bincode::Error) -> Self {
        PionError::Serialization(err.to_string())
    }
}

impl From<ndarray_npy::ReadNpyError> for PionError {
    fn from(err: ndarray_npy::ReadNpyError) -> Self {
        PionError::Serialization(err.to_string())
    }
}

impl From<ndarray_npy::WriteNpyError> for PionError {
    fn from(err: ndarray_npy::WriteNpyError) -> Self {
        PionError::Serialization(err.to_string())
    }
}

#[test]
fn display_invalid_generations() {
    let err = PionError::InvalidGenerations(2);
    assert_eq!(err.to_string(), "Invalid Ngen = 2. Please use either Ngen=1 or Ngen=3.");
}

#[test]
fn display_missing_cache_mentions_setup() {
    let err = PionError::MissingCache(PathBuf::from("npyFiles/Fmatrices_Ngen1.npy"));
    let msg = err.to_string();
    assert!(msg.contains("Fmatrices_Ngen1.npy"));
    assert!(msg.contains("pre_scan"));
}

#[test]
fn display_complex_eigenvalue() {
    let err = PionError::ComplexEigenvalue { index: 3, imaginary: 0.5 };
    assert!(err.to_string().contains("imaginary part 5e-1"));
}

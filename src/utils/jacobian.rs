//! Change of variables for posterior samples from a scan in (fpi_pow, bsmall_pow).
//!
//! The sampler works in log10 variables; plots are made in mD instead of bsmall and
//! optionally in linear units. `CASE` follows the plotting conventions:
//!
//! | CASE | axes                     | weight                         |
//! |------|--------------------------|--------------------------------|
//! | 0    | fpi_pow, bsmall_pow      | 1                              |
//! | 1    | fpi_pow, mD_pow          | 1                              |
//! | 2    | fpi [GeV], mD [GeV]      | 4π ln(10)² fpi² bsmall         |
//! | 3    | fpi [TeV], mD [GeV]      | 4π 10³ ln(10)² fpi_TeV² bsmall |
//! | 4    | fpi [TeV], mD [TeV]      | ln(10)² fpi_TeV mD_TeV         |

use ndarray::Array1;
use std::collections::HashMap;
use std::f64::consts::{LN_10, PI};

use crate::error::{PionError, Result};

pub type Columns = HashMap<String, Array1<f64>>;

const REQUIRED: [&str; 4] = ["posterior", "likelihood", "fpi_pow", "bsmall_pow"];

fn column<'a>(columns: &'a Columns, key: &'static str) -> Result<&'a Array1<f64>> {
    columns
        .get(key)
        .ok_or_else(|| PionError::ShapeMismatch(format!("missing column {key}")))
}

/// Converts posterior samples to the axes of `case`, multiplying posterior and likelihood
/// by the Jacobian |∂(new axes)/∂(fpi_pow, bsmall_pow)|.
pub fn jacobian_convert(columns: &Columns, case: usize) -> Result<Columns> {
    for key in REQUIRED {
        column(columns, key)?;
    }
    let posterior = column(columns, "posterior")?;
    let likelihood = column(columns, "likelihood")?;
    let fpi_pow = column(columns, "fpi_pow")?;
    let bsmall_pow = column(columns, "bsmall_pow")?;
    let len = posterior.len();
    if [likelihood, fpi_pow, bsmall_pow].iter().any(|c| c.len() != len) {
        return Err(PionError::ShapeMismatch("columns have different lengths".into()));
    }

    let mut converted = Columns::new();
    let mut insert = |key: &str, values: Array1<f64>| {
        converted.insert(key.to_string(), values);
    };
    let bsmall = bsmall_pow.mapv(|p| 10f64.powf(p));

    match case {
        0 => {
            for key in REQUIRED {
                insert(key, column(columns, key)?.clone());
            }
        }
        1 => {
            insert("posterior", posterior.clone());
            insert("likelihood", likelihood.clone());
            insert("fpi_pow", fpi_pow.clone());
            insert("mD_pow", fpi_pow + bsmall_pow + (4.0 * PI).log10());
        }
        2 => {
            let fpi_gev = fpi_pow.mapv(|p| 10f64.powf(p));
            let md_gev = 4.0 * PI * &fpi_gev * &bsmall;
            let jacobian = 4.0 * PI * LN_10.powi(2) * fpi_gev.mapv(|f| f * f) * &bsmall;
            insert("posterior", &jacobian * posterior);
            insert("likelihood", &jacobian * likelihood);
            insert("fpi_GeV", fpi_gev);
            insert("mD_GeV", md_gev);
        }
        3 => {
            let fpi_tev = fpi_pow.mapv(|p| 1e-3 * 10f64.powf(p));
            let md_gev = 4.0 * PI * 1e3 * &fpi_tev * &bsmall;
            let jacobian = 4.0 * PI * 1e3 * LN_10.powi(2) * fpi_tev.mapv(|f| f * f) * &bsmall;
            insert("posterior", &jacobian * posterior);
            insert("likelihood", &jacobian * likelihood);
            insert("fpi_TeV", fpi_tev);
            insert("mD_GeV", md_gev);
        }
        4 => {
            let fpi_tev = fpi_pow.mapv(|p| 1e-3 * 10f64.powf(p));
            let md_tev = 4.0 * PI * &fpi_tev * &bsmall;
            let jacobian = LN_10.powi(2) * &fpi_tev * &md_tev;
            insert("posterior", &jacobian * posterior);
            insert("likelihood", &jacobian * likelihood);
            insert("fpi_TeV", fpi_tev);
            insert("mD_TeV", md_tev);
        }
        _ => {
            return Err(PionError::InvalidParameter {
                name: "CASE",
                value: case as f64,
            })
        }
    }
    Ok(converted)
}

#[cfg(test)]
fn samples() -> Columns {
    use ndarray::array;
    let mut columns = Columns::new();
    columns.insert("posterior".into(), array![0.2, 0.5]);
    columns.insert("likelihood".into(), array![1.0, 2.0]);
    columns.insert("fpi_pow".into(), array![3.0, 5.0]);
    columns.insert("bsmall_pow".into(), array![-2.0, 0.0]);
    columns
}

#[test]
fn test_log_axes_keep_weights() {
    let columns = samples();
    let converted = jacobian_convert(&columns, 1).unwrap();
    assert_eq!(converted["posterior"], columns["posterior"]);
    let md_pow = &converted["mD_pow"];
    assert_approx_eq::assert_approx_eq!(md_pow[0], (4.0 * PI * 1e3 * 1e-2).log10(), 1e-12);
    assert_approx_eq::assert_approx_eq!(md_pow[1], (4.0 * PI * 1e5).log10(), 1e-12);

    assert_eq!(jacobian_convert(&columns, 0).unwrap(), columns);
}

#[test]
fn test_linear_axes_weights() {
    let columns = samples();
    let gev = jacobian_convert(&columns, 2).unwrap();
    let want = 4.0 * PI * LN_10 * LN_10 * 1e6 * 1e-2 * 0.2;
    assert_approx_eq::assert_approx_eq!(gev["posterior"][0] / want, 1.0, 1e-12);
    assert_approx_eq::assert_approx_eq!(gev["mD_GeV"][1], 4.0 * PI * 1e5, 1e-6);

    // fpi in TeV rescales the weight by 10^-3 relative to GeV
    let tev = jacobian_convert(&columns, 3).unwrap();
    assert_approx_eq::assert_approx_eq!(tev["posterior"][0] / gev["posterior"][0], 1e-3, 1e-12);
    assert_eq!(tev["mD_GeV"], gev["mD_GeV"]);

    let both_tev = jacobian_convert(&columns, 4).unwrap();
    let want = LN_10 * LN_10 * 100.0 * (4.0 * PI * 100.0) * 0.5;
    assert_approx_eq::assert_approx_eq!(both_tev["posterior"][1] / want, 1.0, 1e-12);
}

#[test]
fn test_rejects_bad_case_and_missing_columns() {
    let mut columns = samples();
    assert!(matches!(
        jacobian_convert(&columns, 5),
        Err(PionError::InvalidParameter { name: "CASE", .. })
    ));
    columns.remove("likelihood");
    assert!(matches!(jacobian_convert(&columns, 1), Err(PionError::ShapeMismatch(_))));
}

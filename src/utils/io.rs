use csv::{ReaderBuilder, Trim};
use ndarray::{stack, Array2, Array5, Axis};
use ndarray_npy::{read_npy, write_npy};
use serde_derive::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::error::{PionError, Result};
use crate::theory::form_factors::{FormFactors, SparseTensor4, Tensor4};
use crate::theory::Generations;
use crate::{Complex, ComplexMatrix};

/// Things the setup step writes once and scans read many times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// F1Hat, F2Hat. DM-charge basis for Ngen = 1, interaction basis for Ngen = 3.
    FormFactors,
    /// Mass-to-DM-charge rotation V
    DmTransform,
    /// Parameter-independent part of the interaction-to-mass matrix W
    MassTransformCore,
}

/// Write-once repository of precomputed matrices in a single directory.
pub struct MatrixCache {
    dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct SparseFormFactors {
    f1: SparseTensor4,
    f2: SparseTensor4,
}

impl MatrixCache {
    pub fn open(dir: impl AsRef<Path>) -> Self {
        MatrixCache {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, gens: Generations, kind: CacheKind) -> PathBuf {
        let file = match (kind, gens) {
            (CacheKind::FormFactors, Generations::One) => format!("Fmatrices_{gens}.npy"),
            (CacheKind::FormFactors, Generations::Three) => format!("Fmatrices_{gens}_intBasis.bin"),
            (CacheKind::DmTransform, _) => format!("Vmatrix_{gens}.npy"),
            (CacheKind::MassTransformCore, _) => format!("WcoreMatrix_{gens}.npy"),
        };
        self.dir.join(file)
    }

    pub fn exists(&self, gens: Generations, kind: CacheKind) -> bool {
        self.path(gens, kind).exists()
    }

    // Refuses to overwrite, and makes sure the directory is there.
    fn claim(&self, gens: Generations, kind: CacheKind) -> Result<PathBuf> {
        let path = self.path(gens, kind);
        if path.exists() {
            return Err(PionError::CacheExists(path));
        }
        create_dir_all(&self.dir).map_err(|e| PionError::Io(self.dir.clone(), e.to_string()))?;
        Ok(path)
    }

    fn existing(&self, gens: Generations, kind: CacheKind) -> Result<PathBuf> {
        let path = self.path(gens, kind);
        if !path.exists() {
            return Err(PionError::MissingCache(path));
        }
        Ok(path)
    }

    pub fn store_form_factors(&self, gens: Generations, form_factors: &FormFactors) -> Result<()> {
        let path = self.claim(gens, CacheKind::FormFactors)?;
        match (&form_factors.f1, &form_factors.f2) {
            (Tensor4::Dense(f1), Tensor4::Dense(f2)) => {
                let stacked: Array5<Complex> = stack(Axis(0), &[f1.view(), f2.view()])
                    .map_err(|e| PionError::ShapeMismatch(e.to_string()))?;
                write_npy(&path, &stacked)?;
            }
            (Tensor4::Sparse(f1), Tensor4::Sparse(f2)) => {
                let file = File::create(&path).map_err(|e| PionError::Io(path.clone(), e.to_string()))?;
                let sparse = SparseFormFactors {
                    f1: f1.clone(),
                    f2: f2.clone(),
                };
                bincode::serialize_into(BufWriter::new(file), &sparse)?;
            }
            _ => {
                return Err(PionError::ShapeMismatch(
                    "F1 and F2 must share a storage layout".into(),
                ))
            }
        }
        log::info!("Wrote {}", path.display());
        Ok(())
    }

    pub fn load_form_factors(&self, gens: Generations) -> Result<FormFactors> {
        let path = self.existing(gens, CacheKind::FormFactors)?;
        let form_factors = if gens.dense_tensors() {
            let stacked: Array5<Complex> = read_npy(&path)?;
            if stacked.shape()[0] != 2 {
                return Err(PionError::ShapeMismatch(format!(
                    "{} holds {} tensors, expected 2",
                    path.display(),
                    stacked.shape()[0]
                )));
            }
            FormFactors {
                f1: Tensor4::Dense(stacked.index_axis(Axis(0), 0).to_owned()),
                f2: Tensor4::Dense(stacked.index_axis(Axis(0), 1).to_owned()),
            }
        } else {
            let file = File::open(&path).map_err(|e| PionError::Io(path.clone(), e.to_string()))?;
            let sparse: SparseFormFactors = bincode::deserialize_from(BufReader::new(file))?;
            FormFactors {
                f1: Tensor4::Sparse(sparse.f1),
                f2: Tensor4::Sparse(sparse.f2),
            }
        };
        if form_factors.f1.dim() != gens.n_pions() {
            return Err(PionError::ShapeMismatch(format!(
                "{} has dimension {}, expected {}",
                path.display(),
                form_factors.f1.dim(),
                gens.n_pions()
            )));
        }
        Ok(form_factors)
    }

    pub fn store_matrix(&self, gens: Generations, kind: CacheKind, matrix: &ComplexMatrix) -> Result<()> {
        let path = self.claim(gens, kind)?;
        write_npy(&path, matrix)?;
        log::info!("Wrote {}", path.display());
        Ok(())
    }

    pub fn load_matrix(&self, gens: Generations, kind: CacheKind) -> Result<ComplexMatrix> {
        let path = self.existing(gens, kind)?;
        let matrix: Array2<Complex> = read_npy(&path)?;
        Ok(matrix)
    }
}

/// Reads a two-column (tab or space separated) numeric table.
pub fn load_two_column_table(path: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .trim(Trim::All)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(path)
        .map_err(|e| PionError::Io(path.to_path_buf(), e.to_string()))?;

    let mut first = vec![];
    let mut second = vec![];
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| PionError::MalformedAsset(path.to_path_buf(), e.to_string()))?;

        // Tolerate space separated rows as well
        let fields: Vec<&str> = record.iter().flat_map(|field| field.split_whitespace()).collect();
        let parsed: Vec<f64> = fields.iter().filter_map(|f| f.parse().ok()).collect();
        if fields.len() != 2 || parsed.len() != 2 {
            return Err(PionError::MalformedAsset(
                path.to_path_buf(),
                format!("line {}: expected two numbers, got {fields:?}", line + 1),
            ));
        }
        first.push(parsed[0]);
        second.push(parsed[1]);
    }
    Ok((first, second))
}

#[cfg(test)]
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dark_pion_relic_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn test_missing_cache_is_typed_error() {
    let cache = MatrixCache::open(scratch_dir("missing"));
    match cache.load_form_factors(Generations::One) {
        Err(PionError::MissingCache(path)) => assert!(path.ends_with("Fmatrices_Ngen1.npy")),
        other => panic!("expected MissingCache, got {other:?}"),
    }
}

#[test]
fn test_store_load_and_refuse_overwrite() {
    use crate::theory::{form_factors::build_form_factors, generators::build_generators};

    let dir = scratch_dir("dense");
    let cache = MatrixCache::open(&dir);
    let gens = Generations::One;
    let form_factors = build_form_factors(&build_generators(gens), gens).unwrap();

    cache.store_form_factors(gens, &form_factors).unwrap();
    let loaded = cache.load_form_factors(gens).unwrap();
    assert_eq!(loaded.f1.max_abs_diff(&form_factors.f1).unwrap(), 0.0);
    assert_eq!(loaded.f2.max_abs_diff(&form_factors.f2).unwrap(), 0.0);

    assert!(matches!(
        cache.store_form_factors(gens, &form_factors),
        Err(PionError::CacheExists(_))
    ));
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_sparse_store_and_load() {
    let dir = scratch_dir("sparse");
    let cache = MatrixCache::open(&dir);
    let f1 = SparseTensor4::new(91);
    f1.add([1, 2, 3, 4], Complex::new(0.5, -0.25));
    let f2 = SparseTensor4::new(91);
    f2.add([90, 0, 90, 0], Complex::new(0.0, 1.0));
    let form_factors = FormFactors {
        f1: Tensor4::Sparse(f1),
        f2: Tensor4::Sparse(f2),
    };

    cache.store_form_factors(Generations::Three, &form_factors).unwrap();
    let loaded = cache.load_form_factors(Generations::Three).unwrap();
    assert_eq!(loaded.f1.get(1, 2, 3, 4), Complex::new(0.5, -0.25));
    assert_eq!(loaded.f2.get(90, 0, 90, 0), Complex::new(0.0, 1.0));
    assert_eq!(loaded.f2.get(0, 0, 0, 0), Complex::new(0.0, 0.0));
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_gstar_tables_parse() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/gstar.dat");
    let (temperature, gstar) = load_two_column_table(&path).unwrap();
    assert_eq!(temperature.len(), gstar.len());
    assert!(temperature.windows(2).all(|w| w[1] > w[0]));
    assert!(gstar.iter().all(|&g| g > 3.0 && g < 110.0));
}

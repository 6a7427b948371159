//! Dense design matrix and the observational sample fed to the estimators.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Dense row-major matrix of finite covariates (n × p).
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n: usize,
    p: usize,
    data: Vec<f64>, // length n*p, row-major
}

impl Matrix {
    /// Build from a row-major buffer of length `n * p`.
    pub fn new(n: usize, p: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n * p {
            return Err(Error::InputShape(format!(
                "matrix buffer has wrong length: expected n*p={}, got {}",
                n * p,
                data.len()
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(Error::InputShape("matrix must contain only finite values".into()));
        }
        Ok(Self { n, p, data })
    }

    /// Build from rows; all rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = rows.len();
        let p = rows.first().map(|r| r.len()).unwrap_or(0);
        if n == 0 || p == 0 {
            return Err(Error::InputShape("X must be non-empty (n>0, p>0)".into()));
        }
        let mut data = Vec::with_capacity(n * p);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != p {
                return Err(Error::InputShape(format!(
                    "X must be rectangular: row {} has len {}, expected {}",
                    i,
                    row.len(),
                    p
                )));
            }
            data.extend(row);
        }
        Self::new(n, p, data)
    }

    /// Single-column matrix.
    pub fn from_column(col: &[f64]) -> Result<Self> {
        Self::new(col.len(), 1, col.to_vec())
    }

    /// Number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.n
    }

    /// Number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.p
    }

    /// Row-major buffer.
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Row `i` as a slice.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        let start = i * self.p;
        &self.data[start..start + self.p]
    }

    /// Element `(i, j)`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.p + j]
    }

    /// Column `j` copied out.
    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.n).map(|i| self.get(i, j)).collect()
    }

    /// Rows listed in `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.p);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Matrix { n: indices.len(), p: self.p, data }
    }

    /// Columns listed in `cols`, in that order.
    pub fn select_columns(&self, cols: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(self.n * cols.len());
        for i in 0..self.n {
            let row = self.row(i);
            data.extend(cols.iter().map(|&j| row[j]));
        }
        Matrix { n: self.n, p: cols.len(), data }
    }

    /// Copy with `col` appended as the last column.
    pub fn with_column(&self, col: &[f64]) -> Result<Matrix> {
        if col.len() != self.n {
            return Err(Error::InputShape(format!(
                "appended column has length {}, expected {}",
                col.len(),
                self.n
            )));
        }
        let p = self.p + 1;
        let mut data = Vec::with_capacity(self.n * p);
        for (i, &c) in col.iter().enumerate() {
            data.extend_from_slice(self.row(i));
            data.push(c);
        }
        Ok(Matrix { n: self.n, p, data })
    }

    /// Copy with a constant last column (used to evaluate a fitted surface at
    /// a fixed treatment / instrument value).
    pub fn with_constant_column(&self, value: f64) -> Matrix {
        let p = self.p + 1;
        let mut data = Vec::with_capacity(self.n * p);
        for i in 0..self.n {
            data.extend_from_slice(self.row(i));
            data.push(value);
        }
        Matrix { n: self.n, p, data }
    }
}

/// `true` when every value is exactly 0.0 or 1.0.
pub fn is_binary(v: &[f64]) -> bool {
    v.iter().all(|&x| x == 0.0 || x == 1.0)
}

/// Observational sample: outcome `y`, treatment `d`, optional instrument `z`
/// and covariates `x`.
#[derive(Debug, Clone)]
pub struct DmlData {
    x: Matrix,
    y: Vec<f64>,
    d: Vec<f64>,
    z: Option<Vec<f64>>,
    x_names: Vec<String>,
}

/// On-disk column layout (`{"y": [..], "d": [..], "z": [..], "x": [[..], ..]}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawData {
    y: Vec<f64>,
    d: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    z: Option<Vec<f64>>,
    x: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    x_names: Vec<String>,
}

impl DmlData {
    /// Validate and assemble a sample.
    pub fn new(x: Matrix, y: Vec<f64>, d: Vec<f64>, z: Option<Vec<f64>>) -> Result<Self> {
        let n = x.nrows();
        if n == 0 {
            return Err(Error::InputShape("sample must be non-empty".into()));
        }
        if x.ncols() == 0 {
            return Err(Error::InputShape("X must have at least one covariate column".into()));
        }
        if y.len() != n {
            return Err(Error::InputShape(format!("y length ({}) != n ({})", y.len(), n)));
        }
        if d.len() != n {
            return Err(Error::InputShape(format!("d length ({}) != n ({})", d.len(), n)));
        }
        if let Some(z) = &z {
            if z.len() != n {
                return Err(Error::InputShape(format!("z length ({}) != n ({})", z.len(), n)));
            }
        }
        let finite = |v: &[f64]| v.iter().all(|x| x.is_finite());
        if !finite(&y) || !finite(&d) || !z.as_deref().is_none_or(finite) {
            return Err(Error::InputShape("y, d and z must contain only finite values".into()));
        }
        let x_names = (0..x.ncols()).map(|j| format!("x{}", j + 1)).collect();
        Ok(Self { x, y, d, z, x_names })
    }

    /// Convenience constructor from row-wise covariates.
    pub fn from_rows(
        x: Vec<Vec<f64>>,
        y: Vec<f64>,
        d: Vec<f64>,
        z: Option<Vec<f64>>,
    ) -> Result<Self> {
        Self::new(Matrix::from_rows(x)?, y, d, z)
    }

    /// Attach covariate names (one per column).
    pub fn with_x_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.x.ncols() {
            return Err(Error::InputShape(format!(
                "x_names has {} entries, expected {}",
                names.len(),
                self.x.ncols()
            )));
        }
        self.x_names = names;
        Ok(self)
    }

    /// Parse the JSON column layout.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let raw: RawData = serde_json::from_str(s)?;
        let data = Self::from_rows(raw.x, raw.y, raw.d, raw.z)?;
        if raw.x_names.is_empty() { Ok(data) } else { data.with_x_names(raw.x_names) }
    }

    /// Read the JSON column layout from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    /// Serialize to the JSON column layout.
    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        let raw = RawData {
            y: self.y.clone(),
            d: self.d.clone(),
            z: self.z.clone(),
            x: (0..self.x.nrows()).map(|i| self.x.row(i).to_vec()).collect(),
            x_names: self.x_names.clone(),
        };
        Ok(serde_json::to_value(raw)?)
    }

    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    /// Number of covariates.
    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Covariates.
    pub fn x(&self) -> &Matrix {
        &self.x
    }

    /// Outcome.
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Treatment.
    pub fn d(&self) -> &[f64] {
        &self.d
    }

    /// Instrument, if present.
    pub fn z(&self) -> Option<&[f64]> {
        self.z.as_deref()
    }

    /// Instrument, or an [`Error::InputShape`] when the sample has none.
    pub fn instrument(&self) -> Result<&[f64]> {
        self.z().ok_or_else(|| Error::InputShape("model requires an instrument z".into()))
    }

    /// Covariate names.
    pub fn x_names(&self) -> &[String] {
        &self.x_names
    }
}

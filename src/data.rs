use nalgebra::{DMatrix, DVector};

use crate::error::{check_index, Result, SsfError};

/// Realized multivariate panel. Missing observations are NaN.
pub trait MSsfData {
    fn vars_count(&self) -> usize;

    /// Number of periods.
    fn count(&self) -> usize;

    fn get(&self, v: usize, pos: usize) -> Result<f64>;

    fn is_missing(&self, v: usize, pos: usize) -> Result<bool> {
        Ok(self.get(v, pos)?.is_nan())
    }

    /// Number of non-missing observations of variable `v`.
    fn obs_count(&self, v: usize) -> Result<usize>;

    fn initial_state(&self) -> Option<&DVector<f64>> {
        None
    }
}

impl<D: MSsfData + ?Sized> MSsfData for &D {
    fn vars_count(&self) -> usize {
        (**self).vars_count()
    }

    fn count(&self) -> usize {
        (**self).count()
    }

    fn get(&self, v: usize, pos: usize) -> Result<f64> {
        (**self).get(v, pos)
    }

    fn is_missing(&self, v: usize, pos: usize) -> Result<bool> {
        (**self).is_missing(v, pos)
    }

    fn obs_count(&self, v: usize) -> Result<usize> {
        (**self).obs_count(v)
    }

    fn initial_state(&self) -> Option<&DVector<f64>> {
        (**self).initial_state()
    }
}

/// Realized univariate series, as seen by a univariate filter.
pub trait SsfData {
    fn count(&self) -> usize;

    fn get(&self, pos: usize) -> Result<f64>;

    fn is_missing(&self, pos: usize) -> Result<bool> {
        Ok(self.get(pos)?.is_nan())
    }

    fn obs_count(&self) -> usize;

    fn initial_state(&self) -> Option<&DVector<f64>> {
        None
    }
}

/// Panel stored as a periods × variables matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct MultivariateSsfData {
    values: DMatrix<f64>,
    initial_state: Option<DVector<f64>>,
}

impl MultivariateSsfData {
    /// `values[(pos, v)]` is the observation of variable `v` at `pos`.
    pub fn new(values: DMatrix<f64>) -> Self {
        Self {
            values,
            initial_state: None,
        }
    }

    /// Builds the panel from one column per variable, all of equal length.
    pub fn from_columns(columns: &[Vec<f64>]) -> Result<Self> {
        let n = columns.first().map_or(0, Vec::len);
        if let Some(bad) = columns.iter().find(|c| c.len() != n) {
            return Err(SsfError::DataError(format!(
                "columns have unequal lengths: {} vs {}",
                n,
                bad.len()
            )));
        }
        let values = DMatrix::from_fn(n, columns.len(), |pos, v| columns[v][pos]);
        Ok(Self::new(values))
    }

    pub fn with_initial_state(mut self, a0: DVector<f64>) -> Self {
        self.initial_state = Some(a0);
        self
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Applies `f(pos, v, value)` to every non-missing cell.
    pub fn map_observed(&self, mut f: impl FnMut(usize, usize, f64) -> f64) -> Self {
        let values = DMatrix::from_fn(self.values.nrows(), self.values.ncols(), |pos, v| {
            let y = self.values[(pos, v)];
            if y.is_nan() {
                y
            } else {
                f(pos, v, y)
            }
        });
        Self {
            values,
            initial_state: self.initial_state.clone(),
        }
    }
}

impl MSsfData for MultivariateSsfData {
    fn vars_count(&self) -> usize {
        self.values.ncols()
    }

    fn count(&self) -> usize {
        self.values.nrows()
    }

    fn get(&self, v: usize, pos: usize) -> Result<f64> {
        check_index("variable", v, self.values.ncols())?;
        check_index("position", pos, self.values.nrows())?;
        Ok(self.values[(pos, v)])
    }

    fn obs_count(&self, v: usize) -> Result<usize> {
        check_index("variable", v, self.values.ncols())?;
        Ok(self.values.column(v).iter().filter(|y| !y.is_nan()).count())
    }

    fn initial_state(&self) -> Option<&DVector<f64>> {
        self.initial_state.as_ref()
    }
}

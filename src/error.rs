use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SsfError {
    #[error("{what} index {index} out of range (bound {bound})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        bound: usize,
    },

    #[error("{what} dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: String,
        got: String,
    },

    #[error("no loading defined for variable {var} at position {pos}")]
    UndefinedLoading { pos: usize, var: usize },

    #[error("{matrix} is unavailable at position {pos}")]
    Unavailable { matrix: &'static str, pos: usize },

    #[error("model is not time-invariant")]
    NotTimeInvariant,

    #[error("map is closed")]
    MapClosed,

    #[error("map must be closed before lookup")]
    MapNotClosed,

    #[error("entry (pos={pos}, var={var}) already present")]
    DuplicateEntry { pos: usize, var: usize },

    #[error("entry (pos={pos}, var={var}) is not in row-major order")]
    OutOfOrder { pos: usize, var: usize },

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("data error: {0}")]
    DataError(String),
}

impl SsfError {
    pub(crate) fn shape(what: &'static str, expected: (usize, usize), got: (usize, usize)) -> Self {
        SsfError::DimensionMismatch {
            what,
            expected: format!("{}×{}", expected.0, expected.1),
            got: format!("{}×{}", got.0, got.1),
        }
    }

    pub(crate) fn len(what: &'static str, expected: usize, got: usize) -> Self {
        SsfError::DimensionMismatch {
            what,
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// True for the index/dimension family of errors.
    pub fn is_index_error(&self) -> bool {
        matches!(
            self,
            SsfError::IndexOutOfRange { .. }
                | SsfError::DimensionMismatch { .. }
                | SsfError::UndefinedLoading { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SsfError>;

/// Fails with `IndexOutOfRange` unless `index < bound`.
pub(crate) fn check_index(what: &'static str, index: usize, bound: usize) -> Result<()> {
    if index < bound {
        Ok(())
    } else {
        Err(SsfError::IndexOutOfRange { what, index, bound })
    }
}

/// Fails with `DimensionMismatch` unless `m` is `rows × cols`.
pub(crate) fn check_matrix(
    what: &'static str,
    m: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> Result<()> {
    if m.nrows() == rows && m.ncols() == cols {
        Ok(())
    } else {
        Err(SsfError::shape(what, (rows, cols), (m.nrows(), m.ncols())))
    }
}

/// Fails with `DimensionMismatch` unless `x` has `len` entries.
pub(crate) fn check_vector(what: &'static str, x: &DVector<f64>, len: usize) -> Result<()> {
    if x.len() == len {
        Ok(())
    } else {
        Err(SsfError::len(what, len, x.len()))
    }
}

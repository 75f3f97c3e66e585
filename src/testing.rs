//! Small models shared by the unit tests.

use std::cell::Cell;

use nalgebra::{dmatrix, DMatrix, DVector};

use crate::error::{check_index, check_matrix, check_vector, Result, SsfError};
use crate::multivariate::MultivariateSsf;
use crate::state_space::{DefaultMultivariateSsf, SsfLoader};
use crate::types::{Load, SsfDims};

/// Model holding fixed matrices, implementing the contract directly.
#[derive(Debug, Clone)]
pub(crate) struct FixedSsf {
    t: DMatrix<f64>,
    z: DMatrix<f64>,
    q: DMatrix<f64>,
    r: Option<Vec<usize>>,
    w: Option<DMatrix<f64>>,
    pf0: DMatrix<f64>,
    b0: DMatrix<f64>,
    undefined: Vec<(usize, usize)>,
    undefined_vars: Vec<usize>,
}

impl FixedSsf {
    /// Local linear trend observed twice: y0 = level, y1 = level + slope.
    pub(crate) fn bivariate_local_level() -> Self {
        Self {
            t: dmatrix![1.0, 1.0; 0.0, 1.0],
            z: dmatrix![1.0, 0.0; 1.0, 1.0],
            q: dmatrix![0.1, 0.0; 0.0, 0.2],
            r: None,
            w: None,
            pf0: DMatrix::zeros(2, 2),
            b0: DMatrix::identity(2, 2),
            undefined: vec![],
            undefined_vars: vec![],
        }
    }

    /// Three stationary states, a scalar shock hitting states 0 and 2.
    pub(crate) fn selected_noise() -> Self {
        Self {
            t: dmatrix![0.5, 0.0, 0.0; 0.0, 0.3, 0.0; 0.0, 0.0, 0.2],
            z: dmatrix![1.0, 1.0, 1.0],
            q: dmatrix![0.5],
            r: Some(vec![0, 2]),
            w: Some(dmatrix![1.0; 2.0]),
            pf0: DMatrix::identity(3, 3),
            b0: DMatrix::zeros(3, 0),
            undefined: vec![],
            undefined_vars: vec![],
        }
    }

    /// Univariate AR(1) with coefficient `phi`.
    pub(crate) fn ar1(phi: f64) -> Self {
        Self {
            t: dmatrix![phi],
            z: dmatrix![1.0],
            q: dmatrix![1.0],
            r: None,
            w: None,
            pf0: dmatrix![1.0 / (1.0 - phi * phi)],
            b0: DMatrix::zeros(1, 0),
            undefined: vec![],
            undefined_vars: vec![],
        }
    }

    pub(crate) fn with_undefined(mut self, pos: usize, v: usize) -> Self {
        self.undefined.push((pos, v));
        self
    }

    pub(crate) fn with_undefined_var(mut self, v: usize) -> Self {
        self.undefined_vars.push(v);
        self
    }

    fn check_loading(&self, pos: usize, v: usize) -> Result<()> {
        check_index("variable", v, self.z.nrows())?;
        if self.has_z(pos, v) {
            Ok(())
        } else {
            Err(SsfError::UndefinedLoading { pos, var: v })
        }
    }
}

impl MultivariateSsf for FixedSsf {
    fn state_dim(&self) -> usize {
        self.t.nrows()
    }

    fn vars_count(&self) -> usize {
        self.z.nrows()
    }

    fn non_stationary_dim(&self) -> usize {
        self.b0.ncols()
    }

    fn transition_res_count(&self) -> usize {
        self.r.as_ref().map_or(self.t.nrows(), Vec::len)
    }

    fn transition_res_dim(&self) -> usize {
        self.q.nrows()
    }

    fn has_r(&self) -> bool {
        self.r.is_some()
    }

    fn has_w(&self) -> bool {
        self.w.is_some()
    }

    fn has_z(&self, pos: usize, v: usize) -> bool {
        v < self.z.nrows() && !self.undefined_vars.contains(&v) && !self.undefined.contains(&(pos, v))
    }

    fn is_time_invariant(&self) -> bool {
        self.undefined.is_empty()
    }

    fn validate(&self) -> Result<()> {
        let n = self.state_dim();
        check_matrix("T", &self.t, n, n)?;
        check_matrix("Z", &self.z, self.vars_count(), n)?;
        check_matrix("Pf0", &self.pf0, n, n)
    }

    fn z(&self, pos: usize, v: usize, z: &mut DVector<f64>) -> Result<()> {
        self.check_loading(pos, v)?;
        check_vector("z", z, self.state_dim())?;
        z.copy_from(&self.z.row(v).transpose());
        Ok(())
    }

    fn t(&self, _pos: usize, tr: &mut DMatrix<f64>) -> Result<()> {
        check_matrix("T", tr, self.t.nrows(), self.t.ncols())?;
        tr.copy_from(&self.t);
        Ok(())
    }

    fn q(&self, _pos: usize, qm: &mut DMatrix<f64>) -> Result<()> {
        check_matrix("Q", qm, self.q.nrows(), self.q.ncols())?;
        qm.copy_from(&self.q);
        Ok(())
    }

    fn r(&self, _pos: usize, rv: &mut [usize]) -> Result<()> {
        match &self.r {
            Some(sel) if sel.len() == rv.len() => {
                rv.copy_from_slice(sel);
                Ok(())
            }
            Some(sel) => Err(SsfError::len("R", sel.len(), rv.len())),
            None => Err(SsfError::Unavailable { matrix: "R", pos: 0 }),
        }
    }

    fn w(&self, _pos: usize, wm: &mut DMatrix<f64>) -> Result<()> {
        match &self.w {
            Some(w) => {
                check_matrix("W", wm, w.nrows(), w.ncols())?;
                wm.copy_from(w);
                Ok(())
            }
            None => Err(SsfError::Unavailable { matrix: "W", pos: 0 }),
        }
    }

    fn diffuse_constraints(&self, b: &mut DMatrix<f64>) -> Result<()> {
        check_matrix("B0", b, self.b0.nrows(), self.b0.ncols())?;
        b.copy_from(&self.b0);
        Ok(())
    }

    fn pf0(&self, pf0: &mut DMatrix<f64>) -> Result<()> {
        check_matrix("Pf0", pf0, self.pf0.nrows(), self.pf0.ncols())?;
        pf0.copy_from(&self.pf0);
        Ok(())
    }
}

/// Local linear trend whose slope loading drifts: T_t = [[1, 0.1 t], [0, 1]].
/// Variable 1 is unobserved at position 2.
#[derive(Debug, Default)]
pub(crate) struct DriftLoader<'a> {
    calls: Option<&'a Cell<usize>>,
}

impl<'a> DriftLoader<'a> {
    pub(crate) fn model(horizon: usize) -> DefaultMultivariateSsf<DriftLoader<'a>> {
        DefaultMultivariateSsf::new(DriftLoader::default(), SsfDims::full(2, 2)).with_horizon(horizon)
    }

    pub(crate) fn counting(calls: &'a Cell<usize>) -> Self {
        Self { calls: Some(calls) }
    }
}

impl SsfLoader for DriftLoader<'_> {
    fn load_t(&self, pos: usize, t: &mut DMatrix<f64>) -> Load {
        if let Some(calls) = self.calls {
            calls.set(calls.get() + 1);
        }
        *t = dmatrix![1.0, 0.1 * pos as f64; 0.0, 1.0];
        Load::Loaded
    }

    fn load_z(&self, _pos: usize, z: &mut DMatrix<f64>) -> Load {
        *z = dmatrix![1.0, 0.0; 1.0, 1.0];
        Load::Loaded
    }

    fn load_q(&self, _pos: usize, q: &mut DMatrix<f64>) -> Load {
        *q = dmatrix![0.1, 0.0; 0.0, 0.2];
        Load::Loaded
    }

    fn load_pf0(&self, pf0: &mut DMatrix<f64>) -> Load {
        *pf0 = dmatrix![0.0, 0.0; 0.0, 1.0];
        Load::Loaded
    }

    fn load_diffuse_constraints(&self, b: &mut DMatrix<f64>) -> Load {
        *b = dmatrix![1.0; 0.0];
        Load::Loaded
    }

    fn non_stationary_dim(&self) -> usize {
        1
    }

    fn has_z(&self, pos: usize, v: usize) -> bool {
        !(pos == 2 && v == 1)
    }
}

/// Scalar model whose transition is only available at even positions.
#[derive(Debug, Default)]
pub(crate) struct FlakyLoader;

impl SsfLoader for FlakyLoader {
    fn load_t(&self, pos: usize, t: &mut DMatrix<f64>) -> Load {
        if pos % 2 == 0 {
            t[(0, 0)] = pos as f64;
            Load::Loaded
        } else {
            Load::Unavailable
        }
    }

    fn load_z(&self, _pos: usize, z: &mut DMatrix<f64>) -> Load {
        z[(0, 0)] = 1.0;
        Load::Loaded
    }

    fn load_q(&self, _pos: usize, q: &mut DMatrix<f64>) -> Load {
        q[(0, 0)] = 1.0;
        Load::Loaded
    }

    fn load_pf0(&self, pf0: &mut DMatrix<f64>) -> Load {
        pf0[(0, 0)] = 1.0;
        Load::Loaded
    }
}

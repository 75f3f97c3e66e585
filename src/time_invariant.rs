use nalgebra::DMatrix;

use crate::error::{Result, SsfError};
use crate::multivariate::MultivariateSsf;
use crate::state_space::{DefaultMultivariateSsf, SsfLoader};
use crate::types::{Load, SsfDims};

/// Matrices captured once from a time-invariant model. Every hook ignores
/// the position and always loads.
#[derive(Debug, Clone)]
pub struct FrozenMatrices {
    t: DMatrix<f64>,
    z: DMatrix<f64>,
    defined: Vec<bool>,
    q: DMatrix<f64>,
    r: Option<Vec<usize>>,
    w: Option<DMatrix<f64>>,
    pf0: DMatrix<f64>,
    b0: DMatrix<f64>,
}

impl FrozenMatrices {
    pub fn transition(&self) -> &DMatrix<f64> {
        &self.t
    }

    pub fn measurement(&self) -> &DMatrix<f64> {
        &self.z
    }

    pub fn innovation_cov(&self) -> &DMatrix<f64> {
        &self.q
    }

    pub fn selection(&self) -> Option<&[usize]> {
        self.r.as_deref()
    }

    pub fn loading(&self) -> Option<&DMatrix<f64>> {
        self.w.as_ref()
    }

    pub fn pf0(&self) -> &DMatrix<f64> {
        &self.pf0
    }

    pub fn diffuse_directions(&self) -> &DMatrix<f64> {
        &self.b0
    }
}

impl SsfLoader for FrozenMatrices {
    fn load_t(&self, _pos: usize, t: &mut DMatrix<f64>) -> Load {
        t.copy_from(&self.t);
        Load::Loaded
    }

    fn load_z(&self, _pos: usize, z: &mut DMatrix<f64>) -> Load {
        z.copy_from(&self.z);
        Load::Loaded
    }

    fn load_q(&self, _pos: usize, q: &mut DMatrix<f64>) -> Load {
        q.copy_from(&self.q);
        Load::Loaded
    }

    fn load_r(&self, _pos: usize, r: &mut [usize]) -> Load {
        match &self.r {
            Some(sel) => {
                r.copy_from_slice(sel);
                Load::Loaded
            }
            None => Load::Unavailable,
        }
    }

    fn load_w(&self, _pos: usize, w: &mut DMatrix<f64>) -> Load {
        match &self.w {
            Some(wm) => {
                w.copy_from(wm);
                Load::Loaded
            }
            None => Load::Unavailable,
        }
    }

    fn load_pf0(&self, pf0: &mut DMatrix<f64>) -> Load {
        pf0.copy_from(&self.pf0);
        Load::Loaded
    }

    fn load_diffuse_constraints(&self, b: &mut DMatrix<f64>) -> Load {
        b.copy_from(&self.b0);
        Load::Loaded
    }

    fn non_stationary_dim(&self) -> usize {
        self.b0.ncols()
    }

    fn has_z(&self, _pos: usize, v: usize) -> bool {
        self.defined.get(v).copied().unwrap_or(false)
    }

    fn has_r(&self) -> bool {
        self.r.is_some()
    }

    fn has_w(&self) -> bool {
        self.w.is_some()
    }

    fn is_time_invariant(&self) -> bool {
        true
    }
}

/// Frozen snapshot of a time-invariant model.
pub type TimeInvariantMultivariateSsf = DefaultMultivariateSsf<FrozenMatrices>;

impl DefaultMultivariateSsf<FrozenMatrices> {
    /// Materializes every matrix of `ssf` exactly once, including its
    /// diffuse directions. Fails with `NotTimeInvariant` for models whose
    /// matrices depend on the position.
    pub fn of<S: MultivariateSsf + ?Sized>(ssf: &S) -> Result<Self> {
        if !ssf.is_time_invariant() {
            return Err(SsfError::NotTimeInvariant);
        }
        let dims = SsfDims::new(
            ssf.state_dim(),
            ssf.vars_count(),
            ssf.transition_res_count(),
            ssf.transition_res_dim(),
        );
        let SsfDims {
            state_dim: n,
            vars_count: p,
            res_count: rc,
            res_dim: rd,
        } = dims;

        let mut t = DMatrix::zeros(n, n);
        ssf.t(0, &mut t)?;

        let defined: Vec<bool> = (0..p).map(|v| ssf.has_z(0, v)).collect();
        let mut z = DMatrix::zeros(p, n);
        let mut row = nalgebra::DVector::zeros(n);
        for v in (0..p).filter(|&v| defined[v]) {
            ssf.z(0, v, &mut row)?;
            z.set_row(v, &row.transpose());
        }

        let mut q = DMatrix::zeros(rd, rd);
        ssf.q(0, &mut q)?;

        let r = if ssf.has_r() {
            let mut sel = vec![0; rc];
            ssf.r(0, &mut sel)?;
            Some(sel)
        } else {
            None
        };

        let w = if ssf.has_w() {
            let mut wm = DMatrix::zeros(rc, rd);
            ssf.w(0, &mut wm)?;
            Some(wm)
        } else {
            None
        };

        let mut pf0 = DMatrix::zeros(n, n);
        ssf.pf0(&mut pf0)?;

        let d = ssf.non_stationary_dim();
        let mut b0 = DMatrix::zeros(n, d);
        if d > 0 {
            ssf.diffuse_constraints(&mut b0)?;
        }

        tracing::debug!(n, p, rc, rd, d, "froze time-invariant model");

        let frozen = FrozenMatrices {
            t,
            z,
            defined,
            q,
            r,
            w,
            pf0,
            b0,
        };
        Ok(DefaultMultivariateSsf::new(frozen, dims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DriftLoader, FixedSsf};
    use approx::assert_abs_diff_eq;
    use nalgebra::DVector;

    fn assert_matrix_eq(a: &DMatrix<f64>, b: &DMatrix<f64>) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn snapshot_matches_source_everywhere() {
        let source = FixedSsf::selected_noise();
        let frozen = TimeInvariantMultivariateSsf::of(&source).unwrap();
        assert!(frozen.is_valid());
        assert!(frozen.is_time_invariant());
        assert!(frozen.has_r());
        assert!(frozen.has_w());

        let n = source.state_dim();
        for pos in [0, 1, 7, 100] {
            let (mut a, mut b) = (DMatrix::zeros(n, n), DMatrix::zeros(n, n));
            source.t(pos, &mut a).unwrap();
            frozen.t(pos, &mut b).unwrap();
            assert_matrix_eq(&a, &b);

            source.full_q(pos, &mut a).unwrap();
            frozen.full_q(pos, &mut b).unwrap();
            assert_matrix_eq(&a, &b);

            let (mut za, mut zb) = (DVector::zeros(n), DVector::zeros(n));
            source.z(pos, 0, &mut za).unwrap();
            frozen.z(pos, 0, &mut zb).unwrap();
            for i in 0..n {
                assert_abs_diff_eq!(za[i], zb[i], epsilon = 1e-12);
            }

            let (mut ra, mut rb) = (vec![0; 2], vec![0; 2]);
            source.r(pos, &mut ra).unwrap();
            frozen.r(pos, &mut rb).unwrap();
            assert_eq!(ra, rb);

            let (mut wa, mut wb) = (DMatrix::zeros(2, 1), DMatrix::zeros(2, 1));
            source.w(pos, &mut wa).unwrap();
            frozen.w(pos, &mut wb).unwrap();
            assert_matrix_eq(&wa, &wb);

            let (mut qa, mut qb) = (DMatrix::zeros(1, 1), DMatrix::zeros(1, 1));
            source.q(pos, &mut qa).unwrap();
            frozen.q(pos, &mut qb).unwrap();
            assert_matrix_eq(&qa, &qb);
        }

        let (mut a, mut b) = (DMatrix::zeros(n, n), DMatrix::zeros(n, n));
        source.pf0(&mut a).unwrap();
        frozen.pf0(&mut b).unwrap();
        assert_matrix_eq(&a, &b);
    }

    #[test]
    fn snapshot_keeps_diffuse_directions() {
        let source = FixedSsf::bivariate_local_level();
        let frozen = TimeInvariantMultivariateSsf::of(&source).unwrap();
        assert_eq!(frozen.non_stationary_dim(), 2);
        let (mut a, mut b) = (DMatrix::zeros(2, 2), DMatrix::zeros(2, 2));
        source.diffuse_constraints(&mut a).unwrap();
        frozen.diffuse_constraints(&mut b).unwrap();
        assert_matrix_eq(&a, &b);
        assert_matrix_eq(frozen.loader().diffuse_directions(), &a);
    }

    #[test]
    fn snapshot_keeps_undefined_loadings() {
        let source = FixedSsf::bivariate_local_level().with_undefined_var(1);
        let frozen = TimeInvariantMultivariateSsf::of(&source).unwrap();
        assert!(frozen.has_z(5, 0));
        assert!(!frozen.has_z(5, 1));
    }

    #[test]
    fn time_varying_source_is_rejected() {
        let source = DriftLoader::model(4);
        assert_eq!(
            TimeInvariantMultivariateSsf::of(&source).unwrap_err(),
            SsfError::NotTimeInvariant
        );
    }

    #[test]
    fn snapshot_of_snapshot() {
        let source = FixedSsf::bivariate_local_level();
        let once = TimeInvariantMultivariateSsf::of(&source).unwrap();
        let twice = TimeInvariantMultivariateSsf::of(&once).unwrap();
        assert_matrix_eq(once.loader().transition(), twice.loader().transition());
        assert_matrix_eq(once.loader().measurement(), twice.loader().measurement());
    }
}

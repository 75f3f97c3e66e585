use nalgebra::{DMatrix, DVector};

use crate::error::{check_matrix, check_vector, Result};

/// Time-indexed linear-Gaussian model with `p` observed variables and `n` states.
///
/// State equation:  a_{t+1} = T_t a_t + S_t eta_t,   eta_t ~ N(0, Q_t)
/// Observation:     y_{t,v} = Z_{t,v} a_t            (only where `has_z(t, v)`)
///
/// `S_t` is built from the selection indices `R_t` (which state slots
/// receive shocks) and the dense loading `W_t`; `full_q` gives the
/// resulting n×n covariance `S_t Q_t S_t'`.
///
/// Implementors provide the per-variable loading `z`, the transition `t`,
/// the noise blocks and the initial conditions; every other operation has
/// a default body derived from those. All positional methods check their
/// indices and return `SsfError` instead of reading outside the model.
pub trait MultivariateSsf {
    fn state_dim(&self) -> usize;

    fn vars_count(&self) -> usize;

    /// Number of diffuse directions `d` (columns of `B0`).
    fn non_stationary_dim(&self) -> usize;

    /// Number of state slots receiving shocks (length of `R`, rows of `W`).
    fn transition_res_count(&self) -> usize;

    /// Dimension of the innovation vector (order of `Q`).
    fn transition_res_dim(&self) -> usize;

    fn has_r(&self) -> bool;

    fn has_w(&self) -> bool;

    /// Whether the state receives any shock between `pos` and `pos + 1`.
    fn has_transition_res(&self, _pos: usize) -> bool {
        true
    }

    /// Whether variable `v` has a loading at `pos`. Loading queries for
    /// pairs where this is false fail with `UndefinedLoading`.
    fn has_z(&self, pos: usize, v: usize) -> bool;

    fn is_time_invariant(&self) -> bool;

    fn is_diffuse(&self) -> bool {
        self.non_stationary_dim() > 0
    }

    /// One-shot structural consistency check.
    fn validate(&self) -> Result<()>;

    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Writes the loading row of variable `v` at `pos` into `z` (length n).
    fn z(&self, pos: usize, v: usize, z: &mut DVector<f64>) -> Result<()>;

    /// Z_v · x
    fn zx(&self, pos: usize, v: usize, x: &DVector<f64>) -> Result<f64> {
        let z = self.loading(pos, v)?;
        check_vector("x", x, z.len())?;
        Ok(z.dot(x))
    }

    /// zm[j] = Z_v · m[:, j]
    fn zm(&self, pos: usize, v: usize, m: &DMatrix<f64>, zm: &mut DVector<f64>) -> Result<()> {
        let z = self.loading(pos, v)?;
        check_matrix("M", m, z.len(), m.ncols())?;
        check_vector("ZM", zm, m.ncols())?;
        zm.gemv_tr(1.0, m, &z, 0.0);
        Ok(())
    }

    /// Z_v V Z_w'
    fn zvz(&self, pos: usize, v: usize, w: usize, vm: &DMatrix<f64>) -> Result<f64> {
        let zv = self.loading(pos, v)?;
        let n = zv.len();
        check_matrix("V", vm, n, n)?;
        let zw = if v == w { zv.clone() } else { self.loading(pos, w)? };
        Ok(zv.dot(&(vm * zw)))
    }

    /// vm += d·Z_v'Z_w, plus the transposed term when v ≠ w so that `vm`
    /// stays symmetric.
    fn vpzdz(
        &self,
        pos: usize,
        v: usize,
        w: usize,
        vm: &mut DMatrix<f64>,
        d: f64,
    ) -> Result<()> {
        let zv = self.loading(pos, v)?;
        let n = zv.len();
        check_matrix("V", vm, n, n)?;
        if v == w {
            vm.ger(d, &zv, &zv, 1.0);
        } else {
            let zw = self.loading(pos, w)?;
            vm.ger(d, &zv, &zw, 1.0);
            vm.ger(d, &zw, &zv, 1.0);
        }
        Ok(())
    }

    /// x += d·Z_v
    fn xpzd(&self, pos: usize, v: usize, x: &mut DVector<f64>, d: f64) -> Result<()> {
        let z = self.loading(pos, v)?;
        check_vector("x", x, z.len())?;
        x.axpy(d, &z, 1.0);
        Ok(())
    }

    /// Writes T_pos (n×n) into `tr`.
    fn t(&self, pos: usize, tr: &mut DMatrix<f64>) -> Result<()>;

    /// x ← T x
    fn tx(&self, pos: usize, x: &mut DVector<f64>) -> Result<()> {
        let tr = self.transition(pos)?;
        check_vector("x", x, tr.nrows())?;
        let tx = &tr * &*x;
        x.copy_from(&tx);
        Ok(())
    }

    /// x ← x'T (stored as a column)
    fn xt(&self, pos: usize, x: &mut DVector<f64>) -> Result<()> {
        let tr = self.transition(pos)?;
        check_vector("x", x, tr.nrows())?;
        let xt = tr.tr_mul(x);
        x.copy_from(&xt);
        Ok(())
    }

    /// V ← T V T'
    fn tvt(&self, pos: usize, vm: &mut DMatrix<f64>) -> Result<()> {
        let tr = self.transition(pos)?;
        let n = tr.nrows();
        check_matrix("V", vm, n, n)?;
        let tv = &tr * &*vm;
        vm.gemm(1.0, &tv, &tr.transpose(), 0.0);
        Ok(())
    }

    /// Writes Q_pos (res_dim × res_dim) into `qm`.
    fn q(&self, pos: usize, qm: &mut DMatrix<f64>) -> Result<()>;

    /// Writes the selection indices R_pos (length res_count) into `rv`.
    /// Only meaningful when `has_r()`.
    fn r(&self, pos: usize, rv: &mut [usize]) -> Result<()>;

    /// Writes W_pos (res_count × res_dim) into `wm`. Only meaningful when
    /// `has_w()`.
    fn w(&self, pos: usize, wm: &mut DMatrix<f64>) -> Result<()>;

    /// Writes the n×n innovation covariance scatter_R(W Q W') into `qm`.
    fn full_q(&self, pos: usize, qm: &mut DMatrix<f64>) -> Result<()> {
        let n = self.state_dim();
        check_matrix("full Q", qm, n, n)?;
        let rc = self.transition_res_count();
        let rd = self.transition_res_dim();
        let mut q = DMatrix::zeros(rd, rd);
        self.q(pos, &mut q)?;
        let inner = if self.has_w() {
            let mut w = DMatrix::zeros(rc, rd);
            self.w(pos, &mut w)?;
            &w * q * w.transpose()
        } else {
            q
        };
        if self.has_r() {
            let mut rv = vec![0; rc];
            self.r(pos, &mut rv)?;
            scatter(&inner, &rv, qm);
        } else {
            check_matrix("W Q W'", &inner, n, n)?;
            qm.copy_from(&inner);
        }
        Ok(())
    }

    /// Writes the diffuse directions B0 (n × d) into `b`.
    fn diffuse_constraints(&self, b: &mut DMatrix<f64>) -> Result<()>;

    /// Writes the stationary initial covariance Pf0 (n×n) into `pf0`.
    fn pf0(&self, pf0: &mut DMatrix<f64>) -> Result<()>;

    /// Writes the diffuse initial covariance Pi0 = B0 B0' into `pi0`.
    fn pi0(&self, pi0: &mut DMatrix<f64>) -> Result<()> {
        let n = self.state_dim();
        check_matrix("Pi0", pi0, n, n)?;
        let d = self.non_stationary_dim();
        if d == 0 {
            pi0.fill(0.0);
            return Ok(());
        }
        let mut b = DMatrix::zeros(n, d);
        self.diffuse_constraints(&mut b)?;
        pi0.gemm(1.0, &b, &b.transpose(), 0.0);
        Ok(())
    }

    /// Freshly allocated loading row of `v` at `pos`.
    fn loading(&self, pos: usize, v: usize) -> Result<DVector<f64>> {
        let mut z = DVector::zeros(self.state_dim());
        self.z(pos, v, &mut z)?;
        Ok(z)
    }

    /// Freshly allocated transition matrix at `pos`.
    fn transition(&self, pos: usize) -> Result<DMatrix<f64>> {
        let n = self.state_dim();
        let mut tr = DMatrix::zeros(n, n);
        self.t(pos, &mut tr)?;
        Ok(tr)
    }
}

/// qm = 0, then qm[r_i, r_j] = inner[i, j].
pub(crate) fn scatter(inner: &DMatrix<f64>, rv: &[usize], qm: &mut DMatrix<f64>) {
    qm.fill(0.0);
    for (i, &ri) in rv.iter().enumerate() {
        for (j, &rj) in rv.iter().enumerate() {
            qm[(ri, rj)] = inner[(i, j)];
        }
    }
}

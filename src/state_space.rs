use std::cell::{Ref, RefCell};

use nalgebra::{DMatrix, DVector};

use crate::error::{check_index, check_matrix, check_vector, Result, SsfError};
use crate::multivariate::MultivariateSsf;
use crate::types::{Load, SsfDims};

/// Load hooks giving structural meaning to the generic matrices.
///
/// Each hook writes the matrix for `pos` into a buffer already sized by
/// [`DefaultMultivariateSsf`] and reports whether it did. The buffer still
/// holds whatever an earlier position left in it, so a hook must write
/// every entry. A hook returning [`Load::Unavailable`] makes the query
/// fail; the buffer is never read.
pub trait SsfLoader {
    fn load_t(&self, pos: usize, t: &mut DMatrix<f64>) -> Load;

    /// Full p×n measurement matrix. Rows of undefined variables are ignored.
    fn load_z(&self, pos: usize, z: &mut DMatrix<f64>) -> Load;

    fn load_q(&self, pos: usize, q: &mut DMatrix<f64>) -> Load;

    fn load_r(&self, _pos: usize, _r: &mut [usize]) -> Load {
        Load::Unavailable
    }

    fn load_w(&self, _pos: usize, _w: &mut DMatrix<f64>) -> Load {
        Load::Unavailable
    }

    fn load_pf0(&self, pf0: &mut DMatrix<f64>) -> Load;

    fn load_diffuse_constraints(&self, _b: &mut DMatrix<f64>) -> Load {
        Load::Unavailable
    }

    fn non_stationary_dim(&self) -> usize {
        0
    }

    fn has_z(&self, _pos: usize, _v: usize) -> bool {
        true
    }

    fn has_r(&self) -> bool {
        false
    }

    fn has_w(&self) -> bool {
        false
    }

    fn has_transition_res(&self, _pos: usize) -> bool {
        true
    }

    /// When true, every hook ignores `pos` and the model loads each matrix once.
    fn is_time_invariant(&self) -> bool {
        false
    }
}

/// Single-entry cache: the buffer plus the position it was loaded for.
#[derive(Debug, Clone)]
struct Slot<B> {
    pos: Option<usize>,
    buf: B,
}

impl<B> Slot<B> {
    fn new(buf: B) -> Self {
        Self { pos: None, buf }
    }
}

/// Storage-backed model: scratch buffers sized once from [`SsfDims`] and
/// refreshed through the loader's hooks.
///
/// The caches are `RefCell`s keyed by the last position loaded, so an
/// instance is `!Sync` and belongs to a single filter pass.
#[derive(Debug)]
pub struct DefaultMultivariateSsf<L> {
    loader: L,
    dims: SsfDims,
    horizon: Option<usize>,
    t: RefCell<Slot<DMatrix<f64>>>,
    z: RefCell<Slot<DMatrix<f64>>>,
    q: RefCell<Slot<DMatrix<f64>>>,
    r: RefCell<Slot<Vec<usize>>>,
    w: RefCell<Slot<DMatrix<f64>>>,
}

impl<L: SsfLoader> DefaultMultivariateSsf<L> {
    pub fn new(loader: L, dims: SsfDims) -> Self {
        let SsfDims {
            state_dim: n,
            vars_count: p,
            res_count: rc,
            res_dim: rd,
        } = dims;
        Self {
            loader,
            dims,
            horizon: None,
            t: RefCell::new(Slot::new(DMatrix::zeros(n, n))),
            z: RefCell::new(Slot::new(DMatrix::zeros(p, n))),
            q: RefCell::new(Slot::new(DMatrix::zeros(rd, rd))),
            r: RefCell::new(Slot::new(vec![0; rc])),
            w: RefCell::new(Slot::new(DMatrix::zeros(rc, rd))),
        }
    }

    /// Restricts valid positions to `0..horizon`.
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = Some(horizon);
        self
    }

    pub fn dims(&self) -> SsfDims {
        self.dims
    }

    pub fn horizon(&self) -> Option<usize> {
        self.horizon
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn into_loader(self) -> L {
        self.loader
    }

    fn check_pos(&self, pos: usize) -> Result<()> {
        match self.horizon {
            Some(h) => check_index("position", pos, h),
            None => Ok(()),
        }
    }

    fn check_loading(&self, pos: usize, v: usize) -> Result<()> {
        self.check_pos(pos)?;
        check_index("variable", v, self.dims.vars_count)?;
        if self.loader.has_z(pos, v) {
            Ok(())
        } else {
            Err(SsfError::UndefinedLoading { pos, var: v })
        }
    }

    /// Cache key: time-invariant loaders share one entry for all positions.
    fn key(&self, pos: usize) -> usize {
        if self.loader.is_time_invariant() {
            0
        } else {
            pos
        }
    }

    fn cached_t(&self, pos: usize) -> Result<Ref<'_, DMatrix<f64>>> {
        self.check_pos(pos)?;
        let n = self.dims.state_dim;
        refresh(&self.t, self.key(pos), pos, "T", |buf| {
            let load = self.loader.load_t(pos, buf);
            if load.is_loaded() {
                check_matrix("T", buf, n, n)?;
            }
            Ok(load)
        })
    }

    fn cached_z(&self, pos: usize) -> Result<Ref<'_, DMatrix<f64>>> {
        self.check_pos(pos)?;
        let (p, n) = self.dims.z_shape();
        refresh(&self.z, self.key(pos), pos, "Z", |buf| {
            let load = self.loader.load_z(pos, buf);
            if load.is_loaded() {
                check_matrix("Z", buf, p, n)?;
            }
            Ok(load)
        })
    }

    fn cached_q(&self, pos: usize) -> Result<Ref<'_, DMatrix<f64>>> {
        self.check_pos(pos)?;
        let rd = self.dims.res_dim;
        refresh(&self.q, self.key(pos), pos, "Q", |buf| {
            let load = self.loader.load_q(pos, buf);
            if load.is_loaded() {
                check_matrix("Q", buf, rd, rd)?;
            }
            Ok(load)
        })
    }

    fn cached_r(&self, pos: usize) -> Result<Ref<'_, Vec<usize>>> {
        self.check_pos(pos)?;
        let (rc, n) = (self.dims.res_count, self.dims.state_dim);
        refresh(&self.r, self.key(pos), pos, "R", |buf| {
            let load = self.loader.load_r(pos, buf);
            if load.is_loaded() {
                if buf.len() != rc {
                    return Err(SsfError::len("R", rc, buf.len()));
                }
                if let Some(&bad) = buf.iter().find(|&&i| i >= n) {
                    return Err(SsfError::IndexOutOfRange {
                        what: "R selection",
                        index: bad,
                        bound: n,
                    });
                }
            }
            Ok(load)
        })
    }

    fn cached_w(&self, pos: usize) -> Result<Ref<'_, DMatrix<f64>>> {
        self.check_pos(pos)?;
        let (rc, rd) = self.dims.w_shape();
        refresh(&self.w, self.key(pos), pos, "W", |buf| {
            let load = self.loader.load_w(pos, buf);
            if load.is_loaded() {
                check_matrix("W", buf, rc, rd)?;
            }
            Ok(load)
        })
    }

    fn structural_check(&self) -> Result<()> {
        let SsfDims {
            state_dim: n,
            vars_count: p,
            res_count: rc,
            res_dim: rd,
        } = self.dims;
        if n == 0 || p == 0 {
            return Err(SsfError::InvalidModel(format!(
                "empty model: state_dim={n}, vars_count={p}"
            )));
        }
        if rc > n {
            return Err(SsfError::InvalidModel(format!(
                "res_count={rc} exceeds state_dim={n}"
            )));
        }
        if rd > n {
            return Err(SsfError::InvalidModel(format!(
                "res_dim={rd} exceeds state_dim={n}"
            )));
        }
        if !self.loader.has_r() && rc != n {
            return Err(SsfError::InvalidModel(format!(
                "res_count={rc} differs from state_dim={n} without a selection R"
            )));
        }
        if !self.loader.has_w() && rc != rd {
            return Err(SsfError::InvalidModel(format!(
                "res_dim={rd} differs from res_count={rc} without a loading W"
            )));
        }
        let d = self.loader.non_stationary_dim();
        if d > n {
            return Err(SsfError::InvalidModel(format!(
                "non_stationary_dim={d} exceeds state_dim={n}"
            )));
        }
        if self.horizon == Some(0) {
            return Err(SsfError::InvalidModel("empty horizon".into()));
        }

        self.cached_t(0)?;
        self.cached_z(0)?;
        self.cached_q(0)?;
        if self.loader.has_r() {
            self.cached_r(0)?;
        }
        if self.loader.has_w() {
            self.cached_w(0)?;
        }
        let mut pf0 = DMatrix::zeros(n, n);
        self.pf0(&mut pf0)?;
        if d > 0 {
            let mut b = DMatrix::zeros(n, d);
            self.diffuse_constraints(&mut b)?;
        }
        Ok(())
    }
}

/// Reloads `slot` through `load` unless it already holds `key`, then hands
/// out a shared borrow of the buffer. A failed or unavailable load leaves
/// the slot empty so the next query retries.
fn refresh<'a, B>(
    slot: &'a RefCell<Slot<B>>,
    key: usize,
    pos: usize,
    matrix: &'static str,
    load: impl FnOnce(&mut B) -> Result<Load>,
) -> Result<Ref<'a, B>> {
    {
        let mut s = slot.borrow_mut();
        if s.pos != Some(key) {
            s.pos = None;
            match load(&mut s.buf)? {
                Load::Loaded => s.pos = Some(key),
                Load::Unavailable => {
                    tracing::trace!(matrix, pos, "load hook returned unavailable");
                    return Err(SsfError::Unavailable { matrix, pos });
                }
            }
        }
    }
    Ok(Ref::map(slot.borrow(), |s| &s.buf))
}

impl<L: SsfLoader> MultivariateSsf for DefaultMultivariateSsf<L> {
    fn state_dim(&self) -> usize {
        self.dims.state_dim
    }

    fn vars_count(&self) -> usize {
        self.dims.vars_count
    }

    fn non_stationary_dim(&self) -> usize {
        self.loader.non_stationary_dim()
    }

    fn transition_res_count(&self) -> usize {
        self.dims.res_count
    }

    fn transition_res_dim(&self) -> usize {
        self.dims.res_dim
    }

    fn has_r(&self) -> bool {
        self.loader.has_r()
    }

    fn has_w(&self) -> bool {
        self.loader.has_w()
    }

    fn has_transition_res(&self, pos: usize) -> bool {
        self.check_pos(pos).is_ok() && self.loader.has_transition_res(pos)
    }

    fn has_z(&self, pos: usize, v: usize) -> bool {
        self.check_loading(pos, v).is_ok()
    }

    fn is_time_invariant(&self) -> bool {
        self.loader.is_time_invariant()
    }

    fn validate(&self) -> Result<()> {
        self.structural_check().inspect_err(|e| {
            tracing::warn!(error = %e, "state-space model failed validation");
        })
    }

    fn z(&self, pos: usize, v: usize, z: &mut DVector<f64>) -> Result<()> {
        self.check_loading(pos, v)?;
        check_vector("z", z, self.dims.state_dim)?;
        let zm = self.cached_z(pos)?;
        z.copy_from(&zm.row(v).transpose());
        Ok(())
    }

    fn zx(&self, pos: usize, v: usize, x: &DVector<f64>) -> Result<f64> {
        self.check_loading(pos, v)?;
        check_vector("x", x, self.dims.state_dim)?;
        let zm = self.cached_z(pos)?;
        Ok(zm.row(v).iter().zip(x.iter()).map(|(a, b)| a * b).sum())
    }

    fn zvz(&self, pos: usize, v: usize, w: usize, vm: &DMatrix<f64>) -> Result<f64> {
        self.check_loading(pos, v)?;
        self.check_loading(pos, w)?;
        let n = self.dims.state_dim;
        check_matrix("V", vm, n, n)?;
        let zm = self.cached_z(pos)?;
        let zv = zm.row(v);
        let zw = zm.row(w);
        Ok((zv * vm).dot(&zw))
    }

    fn xpzd(&self, pos: usize, v: usize, x: &mut DVector<f64>, d: f64) -> Result<()> {
        self.check_loading(pos, v)?;
        check_vector("x", x, self.dims.state_dim)?;
        let zm = self.cached_z(pos)?;
        for (xi, zi) in x.iter_mut().zip(zm.row(v).iter()) {
            *xi += d * zi;
        }
        Ok(())
    }

    fn t(&self, pos: usize, tr: &mut DMatrix<f64>) -> Result<()> {
        let n = self.dims.state_dim;
        check_matrix("T", tr, n, n)?;
        tr.copy_from(&*self.cached_t(pos)?);
        Ok(())
    }

    fn tx(&self, pos: usize, x: &mut DVector<f64>) -> Result<()> {
        check_vector("x", x, self.dims.state_dim)?;
        let tr = self.cached_t(pos)?;
        let tx = &*tr * &*x;
        x.copy_from(&tx);
        Ok(())
    }

    fn xt(&self, pos: usize, x: &mut DVector<f64>) -> Result<()> {
        check_vector("x", x, self.dims.state_dim)?;
        let tr = self.cached_t(pos)?;
        let xt = tr.tr_mul(x);
        x.copy_from(&xt);
        Ok(())
    }

    fn tvt(&self, pos: usize, vm: &mut DMatrix<f64>) -> Result<()> {
        let n = self.dims.state_dim;
        check_matrix("V", vm, n, n)?;
        let tr = self.cached_t(pos)?;
        let tv = &*tr * &*vm;
        vm.gemm(1.0, &tv, &tr.transpose(), 0.0);
        Ok(())
    }

    fn q(&self, pos: usize, qm: &mut DMatrix<f64>) -> Result<()> {
        let rd = self.dims.res_dim;
        check_matrix("Q", qm, rd, rd)?;
        qm.copy_from(&*self.cached_q(pos)?);
        Ok(())
    }

    fn r(&self, pos: usize, rv: &mut [usize]) -> Result<()> {
        if rv.len() != self.dims.res_count {
            return Err(SsfError::len("R", self.dims.res_count, rv.len()));
        }
        rv.copy_from_slice(&self.cached_r(pos)?);
        Ok(())
    }

    fn w(&self, pos: usize, wm: &mut DMatrix<f64>) -> Result<()> {
        let (rc, rd) = self.dims.w_shape();
        check_matrix("W", wm, rc, rd)?;
        wm.copy_from(&*self.cached_w(pos)?);
        Ok(())
    }

    fn diffuse_constraints(&self, b: &mut DMatrix<f64>) -> Result<()> {
        let n = self.dims.state_dim;
        let d = self.loader.non_stationary_dim();
        check_matrix("B0", b, n, d)?;
        if d == 0 {
            return Ok(());
        }
        match self.loader.load_diffuse_constraints(b) {
            Load::Loaded => check_matrix("B0", b, n, d),
            Load::Unavailable => Err(SsfError::Unavailable { matrix: "B0", pos: 0 }),
        }
    }

    fn pf0(&self, pf0: &mut DMatrix<f64>) -> Result<()> {
        let n = self.dims.state_dim;
        check_matrix("Pf0", pf0, n, n)?;
        match self.loader.load_pf0(pf0) {
            Load::Loaded => check_matrix("Pf0", pf0, n, n),
            Load::Unavailable => Err(SsfError::Unavailable { matrix: "Pf0", pos: 0 }),
        }
    }
}

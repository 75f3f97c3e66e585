//! State augmentation: measurement noise and regression effects carried in
//! the state of a base model.
//!
//! The augmented state is `[a, e, b, c]`:
//!
//! - `a` base state (n)
//! - `e` measurement noise (p, when a [`NoiseProvider`] is set)
//! - `b` static regression coefficients (ks)
//! - `c` time-varying regression coefficients (kc)
//!
//! Time-varying regressors enter the base state equation through `W_t`.
//! Their cumulative effect on the observations is folded into the loading
//! by the forward recursion
//!
//! ```text
//! V_t = T_t V_{t-1} + W_t ;  Xc_t = Z_t V_t     (V_{-1} = 0)
//! l_t = T_t l_{t-1} + k_t ;  yc_t = Z_t l_t     (l_{-1} = 0)
//! ```
//!
//! which [`RichMultivariateSsf::prepare`] runs once over the horizon.

use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::data::{MSsfData, MultivariateSsfData};
use crate::error::{check_index, check_matrix, check_vector, Result, SsfError};
use crate::multivariate::MultivariateSsf;

/// Covariance of the measurement noise, one p×p matrix per position.
pub trait NoiseProvider {
    /// Writes H_pos into `hm`.
    fn h(&self, pos: usize, hm: &mut DMatrix<f64>) -> Result<()>;

    fn is_time_invariant(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ConstantNoise {
    h: DMatrix<f64>,
}

impl ConstantNoise {
    pub fn new(h: DMatrix<f64>) -> Self {
        Self { h }
    }

    /// Independent noise with the given variances.
    pub fn diagonal(variances: &[f64]) -> Self {
        Self::new(DMatrix::from_diagonal(&DVector::from_column_slice(variances)))
    }
}

impl NoiseProvider for ConstantNoise {
    fn h(&self, _pos: usize, hm: &mut DMatrix<f64>) -> Result<()> {
        check_matrix("H", hm, self.h.nrows(), self.h.ncols())?;
        hm.copy_from(&self.h);
        Ok(())
    }

    fn is_time_invariant(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct TimeVaryingNoise {
    h: Vec<DMatrix<f64>>,
}

impl TimeVaryingNoise {
    pub fn new(h: Vec<DMatrix<f64>>) -> Self {
        Self { h }
    }
}

impl NoiseProvider for TimeVaryingNoise {
    fn h(&self, pos: usize, hm: &mut DMatrix<f64>) -> Result<()> {
        check_index("noise position", pos, self.h.len())?;
        let h = &self.h[pos];
        check_matrix("H", hm, h.nrows(), h.ncols())?;
        hm.copy_from(h);
        Ok(())
    }

    fn is_time_invariant(&self) -> bool {
        false
    }
}

/// A value that is either fixed or given per position.
#[derive(Debug, Clone)]
enum Schedule<T> {
    Constant(T),
    Varying(Vec<T>),
}

impl<T> Schedule<T> {
    fn at(&self, what: &'static str, pos: usize) -> Result<&T> {
        match self {
            Schedule::Constant(x) => Ok(x),
            Schedule::Varying(xs) => {
                check_index(what, pos, xs.len())?;
                Ok(&xs[pos])
            }
        }
    }

    fn first(&self) -> Option<&T> {
        match self {
            Schedule::Constant(x) => Some(x),
            Schedule::Varying(xs) => xs.first(),
        }
    }
}

/// Regressors with fixed unknown coefficients: `x[v]` is horizon × ks.
#[derive(Debug, Clone)]
pub struct StaticRegression {
    x: Vec<DMatrix<f64>>,
}

impl StaticRegression {
    /// One regressor matrix per observed variable, all with the same width.
    pub fn new(x: Vec<DMatrix<f64>>) -> Result<Self> {
        let k = x.first().map_or(0, |m| m.ncols());
        if let Some(bad) = x.iter().find(|m| m.ncols() != k) {
            return Err(SsfError::len("regressor width", k, bad.ncols()));
        }
        Ok(Self { x })
    }

    pub fn width(&self) -> usize {
        self.x.first().map_or(0, |m| m.ncols())
    }

    pub fn regressors(&self, v: usize) -> Option<&DMatrix<f64>> {
        self.x.get(v)
    }
}

/// Regressors entering the state equation through `W_t` (n × kc), with
/// optional random-walk noise on the coefficients.
#[derive(Debug, Clone)]
pub struct TimeVaryingRegression {
    w: Schedule<DMatrix<f64>>,
    noise: Option<DMatrix<f64>>,
}

impl TimeVaryingRegression {
    pub fn constant(w: DMatrix<f64>) -> Self {
        Self {
            w: Schedule::Constant(w),
            noise: None,
        }
    }

    pub fn per_position(w: Vec<DMatrix<f64>>) -> Result<Self> {
        let shape = w.first().map(|m| m.shape());
        if let (Some(expected), Some(bad)) = (shape, w.iter().find(|m| Some(m.shape()) != shape)) {
            return Err(SsfError::shape("W", expected, bad.shape()));
        }
        Ok(Self {
            w: Schedule::Varying(w),
            noise: None,
        })
    }

    /// Covariance (kc × kc) of the coefficient innovations.
    pub fn with_noise(mut self, qc: DMatrix<f64>) -> Self {
        self.noise = Some(qc);
        self
    }

    pub fn width(&self) -> usize {
        self.w.first().map_or(0, |m| m.ncols())
    }

    pub fn loading(&self, pos: usize) -> Result<&DMatrix<f64>> {
        self.w.at("regression position", pos)
    }

    pub fn noise(&self) -> Option<&DMatrix<f64>> {
        self.noise.as_ref()
    }
}

/// Deterministic state offsets `k_t` (n-vectors).
#[derive(Debug, Clone)]
pub struct StateIntercept {
    k: Schedule<DVector<f64>>,
}

impl StateIntercept {
    pub fn constant(k: DVector<f64>) -> Self {
        Self {
            k: Schedule::Constant(k),
        }
    }

    pub fn per_position(k: Vec<DVector<f64>>) -> Self {
        Self {
            k: Schedule::Varying(k),
        }
    }

    pub fn offset(&self, pos: usize) -> Result<&DVector<f64>> {
        self.k.at("intercept position", pos)
    }
}

/// Block sizes of the augmented state `[a, e, b, c]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AugmentedDims {
    pub base: usize,
    pub noise: usize,
    pub fixed: usize,
    pub varying: usize,
}

impl AugmentedDims {
    pub fn total(&self) -> usize {
        self.base + self.noise + self.fixed + self.varying
    }

    fn noise_start(&self) -> usize {
        self.base
    }

    fn fixed_start(&self) -> usize {
        self.base + self.noise
    }

    fn varying_start(&self) -> usize {
        self.base + self.noise + self.fixed
    }
}

/// A base model plus optional noise and regression extensions.
pub struct RichMultivariateSsf<M> {
    base: M,
    noise: Option<Box<dyn NoiseProvider>>,
    fixed: Option<StaticRegression>,
    varying: Option<TimeVaryingRegression>,
    intercept: Option<StateIntercept>,
}

impl<M: MultivariateSsf> RichMultivariateSsf<M> {
    pub fn new(base: M) -> Self {
        Self {
            base,
            noise: None,
            fixed: None,
            varying: None,
            intercept: None,
        }
    }

    pub fn with_noise(mut self, noise: impl NoiseProvider + 'static) -> Self {
        self.noise = Some(Box::new(noise));
        self
    }

    pub fn with_static_regression(mut self, reg: StaticRegression) -> Self {
        self.fixed = Some(reg);
        self
    }

    pub fn with_time_varying_regression(mut self, reg: TimeVaryingRegression) -> Self {
        self.varying = Some(reg);
        self
    }

    pub fn with_intercept(mut self, intercept: StateIntercept) -> Self {
        self.intercept = Some(intercept);
        self
    }

    pub fn base(&self) -> &M {
        &self.base
    }

    pub fn dims(&self) -> AugmentedDims {
        AugmentedDims {
            base: self.base.state_dim(),
            noise: if self.noise.is_some() {
                self.base.vars_count()
            } else {
                0
            },
            fixed: self.fixed.as_ref().map_or(0, StaticRegression::width),
            varying: self.varying.as_ref().map_or(0, TimeVaryingRegression::width),
        }
    }

    /// Dimension of the augmented state.
    pub fn state_dim(&self) -> usize {
        self.dims().total()
    }

    /// Checks every extension over `0..horizon` and runs the cumulative
    /// recursions. The result borrows `self`, so the extensions cannot
    /// change while it is alive.
    #[tracing::instrument(skip(self), fields(state_dim = self.state_dim()))]
    pub fn prepare(&self, horizon: usize) -> Result<AugmentedSsf<'_, M>> {
        self.base.validate()?;
        let dims = self.dims();
        let n = dims.base;
        let p = self.base.vars_count();

        if let Some(noise) = &self.noise {
            let mut hm = DMatrix::zeros(p, p);
            for pos in 0..horizon {
                noise.h(pos, &mut hm)?;
            }
        }
        if let Some(fixed) = &self.fixed {
            if fixed.x.len() != p {
                return Err(SsfError::len("static regressors", p, fixed.x.len()));
            }
            if let Some(short) = fixed.x.iter().find(|x| x.nrows() < horizon) {
                return Err(SsfError::DimensionMismatch {
                    what: "static regressor rows",
                    expected: format!("at least {horizon}"),
                    got: short.nrows().to_string(),
                });
            }
        }
        if let Some(varying) = &self.varying {
            for pos in 0..horizon {
                check_matrix("W", varying.loading(pos)?, n, dims.varying)?;
            }
            if let Some(qc) = varying.noise() {
                check_matrix("coefficient noise", qc, dims.varying, dims.varying)?;
            }
        }
        if let Some(intercept) = &self.intercept {
            for pos in 0..horizon {
                check_vector("intercept", intercept.offset(pos)?, n)?;
            }
        }

        let rec = self.recursions(horizon)?;
        tracing::debug!(
            horizon,
            base = dims.base,
            noise = dims.noise,
            fixed = dims.fixed,
            varying = dims.varying,
            "prepared augmented model"
        );
        Ok(AugmentedSsf {
            rich: self,
            dims,
            horizon,
            rec,
        })
    }

    fn recursions(&self, horizon: usize) -> Result<Recursions> {
        let n = self.base.state_dim();
        let p = self.base.vars_count();
        let mut rec = Recursions::default();
        if self.varying.is_none() && self.intercept.is_none() {
            return Ok(rec);
        }

        let kc = self.varying.as_ref().map_or(0, TimeVaryingRegression::width);
        let mut v_prev = DMatrix::zeros(n, kc);
        let mut l_prev = DVector::zeros(n);
        for pos in 0..horizon {
            let tr = self.base.transition(pos)?;
            let rows: Vec<(usize, DVector<f64>)> = (0..p)
                .filter(|&v| self.base.has_z(pos, v))
                .map(|v| self.base.loading(pos, v).map(|z| (v, z)))
                .collect::<Result<_>>()?;

            if let Some(varying) = &self.varying {
                let v_t = &tr * &v_prev + varying.loading(pos)?;
                let mut xc = DMatrix::zeros(p, kc);
                for (v, z) in &rows {
                    xc.row_mut(*v).copy_from(&(z.transpose() * &v_t));
                }
                rec.v.push(v_t.clone());
                rec.xc.push(xc);
                v_prev = v_t;
            }
            if let Some(intercept) = &self.intercept {
                let l_t = &tr * &l_prev + intercept.offset(pos)?;
                let mut yc = DVector::zeros(p);
                for (v, z) in &rows {
                    yc[*v] = z.dot(&l_t);
                }
                rec.l.push(l_t.clone());
                rec.yc.push(yc);
                l_prev = l_t;
            }
        }
        Ok(rec)
    }
}

/// Output of the cumulative recursions, one entry per position. Series
/// whose extension is absent are empty.
#[derive(Debug, Clone, Default)]
pub struct Recursions {
    v: Vec<DMatrix<f64>>,
    xc: Vec<DMatrix<f64>>,
    l: Vec<DVector<f64>>,
    yc: Vec<DVector<f64>>,
}

impl Recursions {
    /// V_pos (n × kc)
    pub fn v(&self, pos: usize) -> Option<&DMatrix<f64>> {
        self.v.get(pos)
    }

    /// Xc_pos (p × kc)
    pub fn xc(&self, pos: usize) -> Option<&DMatrix<f64>> {
        self.xc.get(pos)
    }

    /// l_pos (n)
    pub fn l(&self, pos: usize) -> Option<&DVector<f64>> {
        self.l.get(pos)
    }

    /// yc_pos (p)
    pub fn yc(&self, pos: usize) -> Option<&DVector<f64>> {
        self.yc.get(pos)
    }
}

/// The augmented model over a fixed horizon.
pub struct AugmentedSsf<'a, M> {
    rich: &'a RichMultivariateSsf<M>,
    dims: AugmentedDims,
    horizon: usize,
    rec: Recursions,
}

impl<M> fmt::Debug for AugmentedSsf<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AugmentedSsf")
            .field("dims", &self.dims)
            .field("horizon", &self.horizon)
            .finish_non_exhaustive()
    }
}

impl<M: MultivariateSsf> AugmentedSsf<'_, M> {
    pub fn dims(&self) -> AugmentedDims {
        self.dims
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn precomputed(&self) -> &Recursions {
        &self.rec
    }

    /// Copy of `data` with the deterministic offsets `yc` removed. Missing
    /// cells stay missing.
    pub fn adapt(&self, data: &MultivariateSsfData) -> Result<MultivariateSsfData> {
        let p = self.rich.base.vars_count();
        if data.vars_count() != p {
            return Err(SsfError::len("data variables", p, data.vars_count()));
        }
        if data.count() > self.horizon {
            return Err(SsfError::DimensionMismatch {
                what: "data length",
                expected: format!("at most {}", self.horizon),
                got: data.count().to_string(),
            });
        }
        if self.rec.yc.is_empty() {
            return Ok(data.clone());
        }
        let yc = &self.rec.yc;
        Ok(data.map_observed(|pos, v, y| y - yc[pos][v]))
    }

    fn check_pos(&self, pos: usize) -> Result<()> {
        check_index("position", pos, self.horizon)
    }
}

impl<M: MultivariateSsf> MultivariateSsf for AugmentedSsf<'_, M> {
    fn state_dim(&self) -> usize {
        self.dims.total()
    }

    fn vars_count(&self) -> usize {
        self.rich.base.vars_count()
    }

    fn non_stationary_dim(&self) -> usize {
        self.rich.base.non_stationary_dim() + self.dims.fixed + self.dims.varying
    }

    fn transition_res_count(&self) -> usize {
        self.dims.total()
    }

    fn transition_res_dim(&self) -> usize {
        self.dims.total()
    }

    fn has_r(&self) -> bool {
        false
    }

    fn has_w(&self) -> bool {
        false
    }

    fn has_z(&self, pos: usize, v: usize) -> bool {
        pos < self.horizon && self.rich.base.has_z(pos, v)
    }

    /// The noise block of `q` drops to zero at the last position, so any
    /// noise extension makes the model position-dependent.
    fn is_time_invariant(&self) -> bool {
        self.rich.base.is_time_invariant()
            && self.rich.noise.is_none()
            && self.rich.fixed.is_none()
            && self.rich.varying.is_none()
    }

    fn validate(&self) -> Result<()> {
        self.rich.base.validate()
    }

    fn z(&self, pos: usize, v: usize, z: &mut DVector<f64>) -> Result<()> {
        self.check_pos(pos)?;
        let d = self.dims;
        check_vector("z", z, d.total())?;
        let zb = self.rich.base.loading(pos, v)?;
        z.fill(0.0);
        z.rows_mut(0, d.base).copy_from(&zb);
        if d.noise > 0 {
            z[d.noise_start() + v] = 1.0;
        }
        if let Some(x) = self.rich.fixed.as_ref().and_then(|f| f.regressors(v)) {
            z.rows_mut(d.fixed_start(), d.fixed)
                .copy_from(&x.row(pos).transpose());
        }
        if let Some(xc) = self.rec.xc(pos) {
            z.rows_mut(d.varying_start(), d.varying)
                .copy_from(&xc.row(v).transpose());
        }
        Ok(())
    }

    /// blockdiag(T_pos, 0, I, I)
    fn t(&self, pos: usize, tr: &mut DMatrix<f64>) -> Result<()> {
        self.check_pos(pos)?;
        let d = self.dims;
        let n = d.total();
        check_matrix("T", tr, n, n)?;
        let tb = self.rich.base.transition(pos)?;
        tr.fill(0.0);
        tr.view_mut((0, 0), (d.base, d.base)).copy_from(&tb);
        for i in d.fixed_start()..n {
            tr[(i, i)] = 1.0;
        }
        Ok(())
    }

    fn tx(&self, pos: usize, x: &mut DVector<f64>) -> Result<()> {
        self.check_pos(pos)?;
        let d = self.dims;
        check_vector("x", x, d.total())?;
        let mut a = x.rows(0, d.base).clone_owned();
        self.rich.base.tx(pos, &mut a)?;
        x.rows_mut(0, d.base).copy_from(&a);
        x.rows_mut(d.noise_start(), d.noise).fill(0.0);
        Ok(())
    }

    /// blockdiag(fullQ_pos, H_{pos+1}, 0, Qc). The noise block is zero past
    /// the last position.
    fn q(&self, pos: usize, qm: &mut DMatrix<f64>) -> Result<()> {
        self.check_pos(pos)?;
        let d = self.dims;
        let n = d.total();
        check_matrix("Q", qm, n, n)?;
        qm.fill(0.0);
        let base = &self.rich.base;
        if base.has_transition_res(pos) {
            let mut qb = DMatrix::zeros(d.base, d.base);
            base.full_q(pos, &mut qb)?;
            qm.view_mut((0, 0), (d.base, d.base)).copy_from(&qb);
        }
        if let Some(noise) = self.rich.noise.as_ref().filter(|_| pos + 1 < self.horizon) {
            let mut hm = DMatrix::zeros(d.noise, d.noise);
            noise.h(pos + 1, &mut hm)?;
            qm.view_mut((d.noise_start(), d.noise_start()), (d.noise, d.noise))
                .copy_from(&hm);
        }
        if let Some(qc) = self.rich.varying.as_ref().and_then(TimeVaryingRegression::noise) {
            let s = d.varying_start();
            qm.view_mut((s, s), (d.varying, d.varying)).copy_from(qc);
        }
        Ok(())
    }

    fn r(&self, pos: usize, _rv: &mut [usize]) -> Result<()> {
        Err(SsfError::Unavailable { matrix: "R", pos })
    }

    fn w(&self, pos: usize, _wm: &mut DMatrix<f64>) -> Result<()> {
        Err(SsfError::Unavailable { matrix: "W", pos })
    }

    fn full_q(&self, pos: usize, qm: &mut DMatrix<f64>) -> Result<()> {
        self.q(pos, qm)
    }

    /// [B0, 0, 0; 0, 0, 0; 0, I, 0; 0, 0, I]
    fn diffuse_constraints(&self, b: &mut DMatrix<f64>) -> Result<()> {
        let d = self.dims;
        let nd = self.rich.base.non_stationary_dim();
        check_matrix("B0", b, d.total(), self.non_stationary_dim())?;
        b.fill(0.0);
        if nd > 0 {
            let mut bb = DMatrix::zeros(d.base, nd);
            self.rich.base.diffuse_constraints(&mut bb)?;
            b.view_mut((0, 0), (d.base, nd)).copy_from(&bb);
        }
        for j in 0..d.fixed + d.varying {
            b[(d.fixed_start() + j, nd + j)] = 1.0;
        }
        Ok(())
    }

    /// blockdiag(Pf0, H_0, 0, 0)
    fn pf0(&self, pf0: &mut DMatrix<f64>) -> Result<()> {
        let d = self.dims;
        check_matrix("Pf0", pf0, d.total(), d.total())?;
        pf0.fill(0.0);
        let mut pb = DMatrix::zeros(d.base, d.base);
        self.rich.base.pf0(&mut pb)?;
        pf0.view_mut((0, 0), (d.base, d.base)).copy_from(&pb);
        if let Some(noise) = self.rich.noise.as_ref().filter(|_| self.horizon > 0) {
            let mut hm = DMatrix::zeros(d.noise, d.noise);
            noise.h(0, &mut hm)?;
            pf0.view_mut((d.noise_start(), d.noise_start()), (d.noise, d.noise))
                .copy_from(&hm);
        }
        Ok(())
    }
}

//! Univariate view of a multivariate model over pseudo-time.
//!
//! Each pseudo-time is one (possibly missing) scalar observation of the
//! panel. The state only moves when a period is complete:
//!
//! ```text
//! s:      0        1        2        3
//! entry:  (0,0)    (0,1)    (1,0)    (1,1)
//! phase:  within   boundary within   boundary
//! T:      I        T_0      I        T_1
//! ```
//!
//! Loading operations always delegate to the variable of the entry, so an
//! ordinary univariate filter can run over a ragged multivariate panel.
//! A gap pseudo-time has no loading (`has_z` is false, its value is
//! missing) and only carries its period's transition.

use std::cell::Cell;

use nalgebra::{DMatrix, DVector};

use crate::data::{MSsfData, SsfData};
use crate::error::{check_matrix, check_vector, Result, SsfError};
use crate::m2u::{M2uEntry, MuMap};
use crate::multivariate::MultivariateSsf;
use crate::types::StepPhase;
use crate::univariate::Ssf;

#[derive(Debug, Clone, Copy)]
struct Current {
    pos: usize,
    entry: M2uEntry,
    phase: StepPhase,
    gap: bool,
}

/// A multivariate model seen through an [`MuMap`] as a univariate model.
pub struct M2uSsfAdapter<S, M> {
    mssf: S,
    map: M,
    current: Cell<Option<Current>>,
}

impl<S: MultivariateSsf, M: MuMap> M2uSsfAdapter<S, M> {
    pub fn new(mssf: S, map: M) -> Result<Self> {
        if map.vars_count() != mssf.vars_count() {
            return Err(SsfError::len(
                "map variables",
                mssf.vars_count(),
                map.vars_count(),
            ));
        }
        Ok(Self {
            mssf,
            map,
            current: Cell::new(None),
        })
    }

    pub fn mssf(&self) -> &S {
        &self.mssf
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn into_parts(self) -> (S, M) {
        (self.mssf, self.map)
    }

    /// Entry and step phase of pseudo-time `pos`, looked up once per
    /// distinct `pos`.
    pub fn update_entry(&self, pos: usize) -> Result<(M2uEntry, StepPhase)> {
        let cur = self.current(pos)?;
        Ok((cur.entry, cur.phase))
    }

    fn current(&self, pos: usize) -> Result<Current> {
        if let Some(cur) = self.current.get().filter(|c| c.pos == pos) {
            return Ok(cur);
        }
        let entry = self.map.entry(pos)?;
        let phase = if self.map.is_step_end(pos)? {
            StepPhase::StepBoundary
        } else {
            StepPhase::WithinStep
        };
        let gap = self.map.is_gap(pos)?;
        let cur = Current {
            pos,
            entry,
            phase,
            gap,
        };
        self.current.set(Some(cur));
        Ok(cur)
    }

    /// Entry of `pos` for the per-variable operations; gaps have no loading.
    fn observation(&self, pos: usize) -> Result<M2uEntry> {
        let cur = self.current(pos)?;
        if cur.gap {
            return Err(SsfError::UndefinedLoading {
                pos: cur.entry.pos,
                var: cur.entry.var,
            });
        }
        Ok(cur.entry)
    }

    /// Number of pseudo-times.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<S: MultivariateSsf, M: MuMap> Ssf for M2uSsfAdapter<S, M> {
    fn state_dim(&self) -> usize {
        self.mssf.state_dim()
    }

    fn non_stationary_dim(&self) -> usize {
        self.mssf.non_stationary_dim()
    }

    fn transition_res_count(&self) -> usize {
        self.mssf.transition_res_count()
    }

    fn transition_res_dim(&self) -> usize {
        self.mssf.transition_res_dim()
    }

    fn has_r(&self) -> bool {
        self.mssf.has_r()
    }

    fn has_w(&self) -> bool {
        self.mssf.has_w()
    }

    fn has_transition_res(&self, pos: usize) -> bool {
        match self.update_entry(pos) {
            Ok((e, StepPhase::StepBoundary)) => self.mssf.has_transition_res(e.pos),
            _ => false,
        }
    }

    fn has_z(&self, pos: usize) -> bool {
        self.observation(pos).is_ok_and(|e| self.mssf.has_z(e.pos, e.var))
    }

    fn is_time_invariant(&self) -> bool {
        self.mssf.vars_count() == 1 && self.mssf.is_time_invariant()
    }

    fn validate(&self) -> Result<()> {
        self.mssf.validate()?;
        if self.map.vars_count() != self.mssf.vars_count() {
            return Err(SsfError::len(
                "map variables",
                self.mssf.vars_count(),
                self.map.vars_count(),
            ));
        }
        Ok(())
    }

    fn z(&self, pos: usize, z: &mut DVector<f64>) -> Result<()> {
        let e = self.observation(pos)?;
        self.mssf.z(e.pos, e.var, z)
    }

    fn zx(&self, pos: usize, x: &DVector<f64>) -> Result<f64> {
        let e = self.observation(pos)?;
        self.mssf.zx(e.pos, e.var, x)
    }

    fn zm(&self, pos: usize, m: &DMatrix<f64>, zm: &mut DVector<f64>) -> Result<()> {
        let e = self.observation(pos)?;
        self.mssf.zm(e.pos, e.var, m, zm)
    }

    fn zvz(&self, pos: usize, vm: &DMatrix<f64>) -> Result<f64> {
        let e = self.observation(pos)?;
        self.mssf.zvz(e.pos, e.var, e.var, vm)
    }

    fn vpzdz(&self, pos: usize, vm: &mut DMatrix<f64>, d: f64) -> Result<()> {
        let e = self.observation(pos)?;
        self.mssf.vpzdz(e.pos, e.var, e.var, vm, d)
    }

    fn xpzd(&self, pos: usize, x: &mut DVector<f64>, d: f64) -> Result<()> {
        let e = self.observation(pos)?;
        self.mssf.xpzd(e.pos, e.var, x, d)
    }

    fn t(&self, pos: usize, tr: &mut DMatrix<f64>) -> Result<()> {
        match self.update_entry(pos)? {
            (e, StepPhase::StepBoundary) => self.mssf.t(e.pos, tr),
            (_, StepPhase::WithinStep) => {
                let n = self.state_dim();
                check_matrix("T", tr, n, n)?;
                tr.fill_with_identity();
                Ok(())
            }
        }
    }

    fn tx(&self, pos: usize, x: &mut DVector<f64>) -> Result<()> {
        match self.update_entry(pos)? {
            (e, StepPhase::StepBoundary) => self.mssf.tx(e.pos, x),
            (_, StepPhase::WithinStep) => check_vector("x", x, self.state_dim()),
        }
    }

    fn xt(&self, pos: usize, x: &mut DVector<f64>) -> Result<()> {
        match self.update_entry(pos)? {
            (e, StepPhase::StepBoundary) => self.mssf.xt(e.pos, x),
            (_, StepPhase::WithinStep) => check_vector("x", x, self.state_dim()),
        }
    }

    fn tvt(&self, pos: usize, vm: &mut DMatrix<f64>) -> Result<()> {
        match self.update_entry(pos)? {
            (e, StepPhase::StepBoundary) => self.mssf.tvt(e.pos, vm),
            (_, StepPhase::WithinStep) => {
                let n = self.state_dim();
                check_matrix("V", vm, n, n)
            }
        }
    }

    fn l(&self, pos: usize, k: &DVector<f64>, lm: &mut DMatrix<f64>) -> Result<()> {
        let n = self.state_dim();
        check_vector("K", k, n)?;
        check_matrix("L", lm, n, n)?;
        self.t(pos, lm)?;
        if self.current(pos)?.gap {
            return Ok(());
        }
        let mut z = DVector::zeros(n);
        self.z(pos, &mut z)?;
        lm.ger(-1.0, k, &z, 1.0);
        Ok(())
    }

    fn q(&self, pos: usize, qm: &mut DMatrix<f64>) -> Result<()> {
        match self.update_entry(pos)? {
            (e, StepPhase::StepBoundary) => self.mssf.q(e.pos, qm),
            (_, StepPhase::WithinStep) => {
                let rd = self.transition_res_dim();
                check_matrix("Q", qm, rd, rd)?;
                qm.fill(0.0);
                Ok(())
            }
        }
    }

    /// Within a step there is no shock, so no selection either.
    fn r(&self, pos: usize, rv: &mut [usize]) -> Result<()> {
        match self.update_entry(pos)? {
            (e, StepPhase::StepBoundary) => self.mssf.r(e.pos, rv),
            (_, StepPhase::WithinStep) => Err(SsfError::Unavailable { matrix: "R", pos }),
        }
    }

    fn w(&self, pos: usize, wm: &mut DMatrix<f64>) -> Result<()> {
        match self.update_entry(pos)? {
            (e, StepPhase::StepBoundary) => self.mssf.w(e.pos, wm),
            (_, StepPhase::WithinStep) => {
                check_matrix(
                    "W",
                    wm,
                    self.transition_res_count(),
                    self.transition_res_dim(),
                )?;
                wm.fill(0.0);
                Ok(())
            }
        }
    }

    fn full_q(&self, pos: usize, qm: &mut DMatrix<f64>) -> Result<()> {
        match self.update_entry(pos)? {
            (e, StepPhase::StepBoundary) => self.mssf.full_q(e.pos, qm),
            (_, StepPhase::WithinStep) => {
                let n = self.state_dim();
                check_matrix("full Q", qm, n, n)?;
                qm.fill(0.0);
                Ok(())
            }
        }
    }

    fn diffuse_constraints(&self, b: &mut DMatrix<f64>) -> Result<()> {
        self.mssf.diffuse_constraints(b)
    }

    fn pf0(&self, pf0: &mut DMatrix<f64>) -> Result<()> {
        self.mssf.pf0(pf0)
    }

    fn pi0(&self, pi0: &mut DMatrix<f64>) -> Result<()> {
        self.mssf.pi0(pi0)
    }
}

/// A multivariate panel read through an [`MuMap`] as a univariate series.
#[derive(Debug, Clone)]
pub struct M2uData<D, M> {
    data: D,
    map: M,
}

impl<D: MSsfData, M: MuMap> M2uData<D, M> {
    /// Fails when the map addresses variables or periods the panel lacks.
    pub fn new(data: D, map: M) -> Result<Self> {
        if map.vars_count() != data.vars_count() {
            return Err(SsfError::len(
                "map variables",
                data.vars_count(),
                map.vars_count(),
            ));
        }
        if map.horizon() > data.count() {
            return Err(SsfError::DimensionMismatch {
                what: "map horizon",
                expected: format!("at most {}", data.count()),
                got: map.horizon().to_string(),
            });
        }
        Ok(Self { data, map })
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    /// Copies the pseudo-time series into a vector (NaN where missing).
    pub fn to_vec(&self) -> Result<Vec<f64>> {
        (0..self.map.len()).map(|s| self.get(s)).collect()
    }
}

impl<D: MSsfData, M: MuMap> SsfData for M2uData<D, M> {
    fn count(&self) -> usize {
        self.map.len()
    }

    fn get(&self, pos: usize) -> Result<f64> {
        let e = self.map.entry(pos)?;
        if self.map.is_gap(pos)? {
            return Ok(f64::NAN);
        }
        self.data.get(e.var, e.pos)
    }

    fn obs_count(&self) -> usize {
        (0..self.map.len())
            .filter(|&s| matches!(self.is_missing(s), Ok(false)))
            .count()
    }

    fn initial_state(&self) -> Option<&DVector<f64>> {
        self.data.initial_state()
    }
}

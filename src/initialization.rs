use nalgebra::{DMatrix, DVector};

use crate::data::MSsfData;
use crate::error::{check_vector, Result};
use crate::multivariate::MultivariateSsf;

/// Initial state and covariances read from a model at t = 0.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialConditions {
    /// Initial state a_0. Zeros from [`from_ssf`](Self::from_ssf); the
    /// panel's own state from [`from_data`](Self::from_data) when it has one.
    pub initial_state: DVector<f64>,
    /// Stationary part Pf0 (n × n).
    pub pf0: DMatrix<f64>,
    /// Diffuse directions B0 (n × d).
    pub b0: DMatrix<f64>,
}

impl InitialConditions {
    pub fn from_ssf<S: MultivariateSsf + ?Sized>(ssf: &S) -> Result<Self> {
        let n = ssf.state_dim();
        let mut pf0 = DMatrix::zeros(n, n);
        ssf.pf0(&mut pf0)?;
        let mut b0 = DMatrix::zeros(n, ssf.non_stationary_dim());
        if ssf.is_diffuse() {
            ssf.diffuse_constraints(&mut b0)?;
        }
        Ok(Self {
            initial_state: DVector::zeros(n),
            pf0,
            b0,
        })
    }

    /// Like [`from_ssf`](Self::from_ssf), taking a_0 from `data` when the
    /// panel carries one.
    pub fn from_data<S, D>(ssf: &S, data: &D) -> Result<Self>
    where
        S: MultivariateSsf + ?Sized,
        D: MSsfData + ?Sized,
    {
        let init = Self::from_ssf(ssf)?;
        match data.initial_state() {
            Some(a0) => {
                check_vector("a0", a0, ssf.state_dim())?;
                Ok(init.with_initial_state(a0.clone()))
            }
            None => Ok(init),
        }
    }

    pub fn with_initial_state(mut self, a0: DVector<f64>) -> Self {
        self.initial_state = a0;
        self
    }

    pub fn non_stationary_dim(&self) -> usize {
        self.b0.ncols()
    }

    /// Diffuse covariance Pi0 = B0 B0'.
    pub fn pi0(&self) -> DMatrix<f64> {
        &self.b0 * self.b0.transpose()
    }

    /// Approximate diffuse initialization: P_0 = Pf0 + kappa * Pi0.
    ///
    /// Replaces the exact diffuse treatment by a large finite variance on
    /// the non-stationary directions.
    pub fn approximate_diffuse(&self, kappa: f64) -> DMatrix<f64> {
        &self.pf0 + self.pi0() * kappa
    }

    /// Variance scale used for the diffuse directions when no exact diffuse
    /// treatment is available.
    pub fn default_kappa() -> f64 {
        1e6
    }
}

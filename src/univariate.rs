use nalgebra::{DMatrix, DVector};

use crate::error::Result;

/// Time-indexed linear-Gaussian model with a single observed variable.
///
/// Same conventions as [`MultivariateSsf`](crate::MultivariateSsf) with the
/// variable index dropped: `Z_pos` is one row, the gain of `l` is one
/// column.
pub trait Ssf {
    fn state_dim(&self) -> usize;

    fn non_stationary_dim(&self) -> usize;

    fn transition_res_count(&self) -> usize;

    fn transition_res_dim(&self) -> usize;

    fn has_r(&self) -> bool;

    fn has_w(&self) -> bool;

    fn has_transition_res(&self, pos: usize) -> bool;

    /// Whether the observation at `pos` has a loading.
    fn has_z(&self, _pos: usize) -> bool {
        true
    }

    fn is_time_invariant(&self) -> bool;

    fn is_diffuse(&self) -> bool {
        self.non_stationary_dim() > 0
    }

    fn validate(&self) -> Result<()>;

    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    fn z(&self, pos: usize, z: &mut DVector<f64>) -> Result<()>;

    fn zx(&self, pos: usize, x: &DVector<f64>) -> Result<f64>;

    fn zm(&self, pos: usize, m: &DMatrix<f64>, zm: &mut DVector<f64>) -> Result<()>;

    /// Z V Z'
    fn zvz(&self, pos: usize, vm: &DMatrix<f64>) -> Result<f64>;

    /// vm += d·Z'Z
    fn vpzdz(&self, pos: usize, vm: &mut DMatrix<f64>, d: f64) -> Result<()>;

    /// x += d·Z
    fn xpzd(&self, pos: usize, x: &mut DVector<f64>, d: f64) -> Result<()>;

    fn t(&self, pos: usize, tr: &mut DMatrix<f64>) -> Result<()>;

    fn tx(&self, pos: usize, x: &mut DVector<f64>) -> Result<()>;

    fn xt(&self, pos: usize, x: &mut DVector<f64>) -> Result<()>;

    fn tvt(&self, pos: usize, vm: &mut DMatrix<f64>) -> Result<()>;

    /// L = T − k Z
    fn l(&self, pos: usize, k: &DVector<f64>, lm: &mut DMatrix<f64>) -> Result<()>;

    fn q(&self, pos: usize, qm: &mut DMatrix<f64>) -> Result<()>;

    fn r(&self, pos: usize, rv: &mut [usize]) -> Result<()>;

    fn w(&self, pos: usize, wm: &mut DMatrix<f64>) -> Result<()>;

    fn full_q(&self, pos: usize, qm: &mut DMatrix<f64>) -> Result<()>;

    fn diffuse_constraints(&self, b: &mut DMatrix<f64>) -> Result<()>;

    fn pf0(&self, pf0: &mut DMatrix<f64>) -> Result<()>;

    fn pi0(&self, pi0: &mut DMatrix<f64>) -> Result<()>;
}

//! Matrix-wide operations derived from the per-variable primitives of
//! [`MultivariateSsf`]. Every model gets them through the blanket impl, so
//! concrete models only implement the single-variable forms.

use nalgebra::{DMatrix, DVector};

use crate::error::{check_matrix, Result};
use crate::multivariate::MultivariateSsf;

pub trait MultivariateSsfOps: MultivariateSsf {
    /// Variables with a defined loading at `pos`, in increasing order.
    fn defined_vars(&self, pos: usize) -> Vec<usize> {
        (0..self.vars_count()).filter(|&v| self.has_z(pos, v)).collect()
    }

    /// Writes the p×n loading matrix into `zm`; rows of undefined
    /// variables are zero.
    fn z_matrix(&self, pos: usize, zm: &mut DMatrix<f64>) -> Result<()> {
        let n = self.state_dim();
        let p = self.vars_count();
        check_matrix("Z", zm, p, n)?;
        zm.fill(0.0);
        let mut row = DVector::zeros(n);
        for v in self.defined_vars(pos) {
            self.z(pos, v, &mut row)?;
            zm.set_row(v, &row.transpose());
        }
        Ok(())
    }

    /// Writes Z m (p × m.ncols()) into `out`; rows of undefined variables
    /// are zero.
    fn zm_matrix(&self, pos: usize, m: &DMatrix<f64>, out: &mut DMatrix<f64>) -> Result<()> {
        let p = self.vars_count();
        check_matrix("ZM", out, p, m.ncols())?;
        out.fill(0.0);
        let mut row = DVector::zeros(m.ncols());
        for v in self.defined_vars(pos) {
            self.zm(pos, v, m, &mut row)?;
            out.set_row(v, &row.transpose());
        }
        Ok(())
    }

    /// Writes Z V Z' (p×p) into `out`, symmetric, over defined variables.
    fn zvz_matrix(&self, pos: usize, vm: &DMatrix<f64>, out: &mut DMatrix<f64>) -> Result<()> {
        let p = self.vars_count();
        check_matrix("ZVZ", out, p, p)?;
        out.fill(0.0);
        let vars = self.defined_vars(pos);
        for (i, &v) in vars.iter().enumerate() {
            for &w in &vars[..=i] {
                let value = self.zvz(pos, v, w, vm)?;
                out[(v, w)] = value;
                out[(w, v)] = value;
            }
        }
        Ok(())
    }

    /// Writes L = T − K Z into `lm`, with `k` the n×p gain.
    fn l_matrix(&self, pos: usize, k: &DMatrix<f64>, lm: &mut DMatrix<f64>) -> Result<()> {
        let n = self.state_dim();
        let p = self.vars_count();
        check_matrix("K", k, n, p)?;
        check_matrix("L", lm, n, n)?;
        self.t(pos, lm)?;
        let mut zm = DMatrix::zeros(p, n);
        self.z_matrix(pos, &mut zm)?;
        lm.gemm(-1.0, k, &zm, 1.0);
        Ok(())
    }
}

impl<S: MultivariateSsf + ?Sized> MultivariateSsfOps for S {}

//! Rayon-based parallel reduction of many panels.
//!
//! Models keep `RefCell` caches and are therefore `!Sync`; every task
//! builds its own instance from a shared factory.

use rayon::prelude::*;

use crate::adapter::M2uData;
use crate::data::MultivariateSsfData;
use crate::error::Result;
use crate::m2u::{M2uEntry, M2uMap};
use crate::multivariate::MultivariateSsf;

/// A panel flattened to pseudo-time.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatPanel {
    /// Values in pseudo-time order. NaN marks a period with nothing
    /// observed.
    pub values: Vec<f64>,
    /// `(pos, var)` of each value.
    pub entries: Vec<M2uEntry>,
}

impl FlatPanel {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of values that are not NaN.
    pub fn obs_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }
}

/// Flattens the cells of `panel` that are observed and have a loading in
/// `ssf`. Periods without such a cell keep one NaN value.
pub fn flatten<S>(ssf: &S, panel: &MultivariateSsfData) -> Result<FlatPanel>
where
    S: MultivariateSsf + ?Sized,
{
    let map = M2uMap::from_data(ssf, panel)?;
    let values = M2uData::new(panel, &map)?.to_vec()?;
    Ok(FlatPanel {
        values,
        entries: map.entries().to_vec(),
    })
}

/// Flattens every panel in parallel. Results keep the input order; a
/// failing panel does not stop the others.
#[tracing::instrument(skip_all, fields(panels = panels.len()))]
pub fn batch_flatten<S, F>(panels: &[MultivariateSsfData], factory: F) -> Vec<Result<FlatPanel>>
where
    S: MultivariateSsf,
    F: Fn() -> S + Sync,
{
    panels
        .par_iter()
        .map(|panel| flatten(&factory(), panel))
        .collect()
}

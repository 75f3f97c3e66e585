use nalgebra::DMatrix;
use numpy::PyReadonlyArray2;
use pyo3::prelude::*;

use crate::adapter::M2uData;
use crate::data::MultivariateSsfData;
use crate::m2u::M2uMap;

fn to_value_error(e: crate::error::SsfError) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(e.to_string())
}

/// Panel with rows = periods and columns = variables; NaN marks a missing cell.
fn to_panel(panel: &PyReadonlyArray2<'_, f64>) -> MultivariateSsfData {
    let view = panel.as_array();
    let (rows, cols) = view.dim();
    MultivariateSsfData::new(DMatrix::from_fn(rows, cols, |i, j| view[[i, j]]))
}

/// Smoke-test function: returns the version string.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Observed `(t, v)` cells of a panel in row-major order.
#[pyfunction]
fn sparse_entries<'py>(panel: PyReadonlyArray2<'py, f64>) -> PyResult<Vec<(usize, usize)>> {
    let data = to_panel(&panel);
    let map = M2uMap::from_observed(&data).map_err(to_value_error)?;
    Ok(map.observed().map(|e| (e.pos, e.var)).collect())
}

/// Flattens a panel to pseudo-time.
///
/// Returns `(values, entries)` where `entries[s]` is the `(t, v)` cell of
/// `values[s]`. A period with no observed cell appears once, as NaN.
#[pyfunction]
fn flatten_panel<'py>(
    panel: PyReadonlyArray2<'py, f64>,
) -> PyResult<(Vec<f64>, Vec<(usize, usize)>)> {
    let data = to_panel(&panel);
    let map = M2uMap::from_observed(&data).map_err(to_value_error)?;
    let values = M2uData::new(&data, &map)
        .and_then(|flat| flat.to_vec())
        .map_err(to_value_error)?;
    let entries = map.entries().iter().map(|e| (e.pos, e.var)).collect();
    Ok((values, entries))
}

/// Python module definition.
#[pymodule]
fn ssf_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(version, m)?)?;
    m.add_function(wrap_pyfunction!(sparse_entries, m)?)?;
    m.add_function(wrap_pyfunction!(flatten_panel, m)?)?;
    Ok(())
}

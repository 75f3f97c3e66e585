use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use ssf_rs::{
    ConstantNoise, DefaultMultivariateSsf, FullM2uMap, InitialConditions, Load, M2uData, M2uMap,
    M2uSsfAdapter, MSsfData, MultivariateSsf, MultivariateSsfData, MultivariateSsfOps, MuMap,
    RichMultivariateSsf, Ssf, SsfData, SsfDims, SsfLoader, StateIntercept,
    TimeInvariantMultivariateSsf,
};

fn load_fixtures() -> serde_json::Value {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/panels.json");
    let data = std::fs::read_to_string(path).expect("fixtures file not found");
    serde_json::from_str(&data).expect("invalid JSON")
}

fn matrix(value: &serde_json::Value) -> DMatrix<f64> {
    let rows: Vec<Vec<f64>> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|row| {
            row.as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_f64().unwrap_or(f64::NAN))
                .collect()
        })
        .collect();
    let ncols = rows.first().map_or(0, Vec::len);
    DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j])
}

/// Equal element-wise, NaN matching NaN.
fn assert_series_eq(got: &[f64], expected: &[f64], name: &serde_json::Value) {
    assert_eq!(got.len(), expected.len(), "panel {name}");
    for (g, e) in got.iter().zip(expected) {
        assert!(g == e || (g.is_nan() && e.is_nan()), "panel {name}: {got:?}");
    }
}

/// Time-invariant model read from the fixture file.
struct FixtureLoader {
    t: DMatrix<f64>,
    z: DMatrix<f64>,
    q: DMatrix<f64>,
}

impl FixtureLoader {
    fn model() -> DefaultMultivariateSsf<FixtureLoader> {
        let fixtures = load_fixtures();
        let trend = &fixtures["local_linear_trend"];
        let loader = FixtureLoader {
            t: matrix(&trend["transition"]),
            z: matrix(&trend["loadings"]),
            q: matrix(&trend["innovation"]),
        };
        let horizon = trend["horizon"].as_u64().unwrap() as usize;
        DefaultMultivariateSsf::new(loader, SsfDims::full(2, 2)).with_horizon(horizon)
    }
}

impl SsfLoader for FixtureLoader {
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

    fn load_pf0(&self, pf0: &mut DMatrix<f64>) -> Load {
        pf0.fill(0.0);
        Load::Loaded
    }

    fn load_diffuse_constraints(&self, b: &mut DMatrix<f64>) -> Load {
        b.fill_with_identity();
        Load::Loaded
    }

    fn non_stationary_dim(&self) -> usize {
        2
    }

    fn is_time_invariant(&self) -> bool {
        true
    }
}

#[test]
fn fixture_model_is_valid() {
    let ssf = FixtureLoader::model();
    ssf.validate().unwrap();
    assert!(ssf.is_diffuse());

    let init = InitialConditions::from_ssf(&ssf).unwrap();
    let p0 = init.approximate_diffuse(InitialConditions::default_kappa());
    assert_abs_diff_eq!(p0[(1, 1)], 1e6, epsilon = 1e-6);
}

#[test]
fn snapshot_matches_model() {
    let ssf = FixtureLoader::model();
    let frozen = TimeInvariantMultivariateSsf::of(&ssf).unwrap();
    for pos in 0..3 {
        assert_eq!(frozen.transition(pos).unwrap(), ssf.transition(pos).unwrap());
        let (mut a, mut b) = (DMatrix::zeros(2, 2), DMatrix::zeros(2, 2));
        frozen.z_matrix(pos, &mut a).unwrap();
        ssf.z_matrix(pos, &mut b).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn panels_reduce_to_fixture_series() {
    let fixtures = load_fixtures();
    for fixture in fixtures["bivariate"].as_array().unwrap() {
        let panel = MultivariateSsfData::new(matrix(&fixture["values"]));
        let ssf = FixtureLoader::model();
        let map = M2uMap::from_data(&ssf, &panel).unwrap();

        let flat = M2uData::new(&panel, &map).unwrap();
        let expected: Vec<f64> = fixture["flat"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap_or(f64::NAN))
            .collect();
        assert_series_eq(&flat.to_vec().unwrap(), &expected, &fixture["name"]);
        assert_eq!(flat.obs_count(), expected.iter().filter(|v| !v.is_nan()).count());

        let step_ends: Vec<bool> = fixture["step_ends"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_bool().unwrap())
            .collect();
        let observed: Vec<bool> = (0..map.len())
            .map(|s| map.is_step_end(s).unwrap())
            .collect();
        assert_eq!(observed, step_ends, "panel {}", fixture["name"]);
    }
}

#[test]
fn adapter_runs_a_univariate_pass() {
    // Predicted state after one full period equals the multivariate T a.
    let ssf = FixtureLoader::model();
    let panel = MultivariateSsfData::new(matrix(&load_fixtures()["bivariate"][0]["values"]));
    let horizon = panel.count();
    let adapter = M2uSsfAdapter::new(ssf, FullM2uMap::new(2, horizon)).unwrap();

    let mut a = DVector::from_vec(vec![1.0, 0.5]);
    let mut p = DMatrix::identity(2, 2);
    for s in 0..2 {
        adapter.tx(s, &mut a).unwrap();
        adapter.tvt(s, &mut p).unwrap();
        let mut q = DMatrix::zeros(2, 2);
        adapter.full_q(s, &mut q).unwrap();
        p += q;
    }
    assert_abs_diff_eq!(a[0], 1.5, epsilon = 1e-12);
    assert_abs_diff_eq!(a[1], 0.5, epsilon = 1e-12);
    // T I T' + Q
    assert_abs_diff_eq!(p[(0, 0)], 2.1, epsilon = 1e-12);
    assert_abs_diff_eq!(p[(0, 1)], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(p[(1, 1)], 1.2, epsilon = 1e-12);
}

#[test]
fn ragged_panel_tracks_the_multivariate_prediction() {
    // Every period advances the state once, observed or not.
    let ssf = FixtureLoader::model();
    let panel = MultivariateSsfData::new(matrix(&load_fixtures()["bivariate"][1]["values"]));
    let map = M2uMap::from_data(&ssf, &panel).unwrap();
    let adapter = M2uSsfAdapter::new(FixtureLoader::model(), &map).unwrap();

    let mut a = DVector::from_vec(vec![1.0, 0.5]);
    let mut expected = a.clone();
    for s in 0..map.len() {
        adapter.tx(s, &mut a).unwrap();
        if map.is_step_end(s).unwrap() {
            ssf.tx(map.entry(s).unwrap().pos, &mut expected).unwrap();
            assert_abs_diff_eq!(a[0], expected[0], epsilon = 1e-12);
            assert_abs_diff_eq!(a[1], expected[1], epsilon = 1e-12);
        }
    }
    // four periods of T = [[1, 1], [0, 1]]
    assert_abs_diff_eq!(a[0], 3.0, epsilon = 1e-12);
}

#[test]
fn rich_model_flows_through_reduction() {
    let ssf = FixtureLoader::model();
    let rich = RichMultivariateSsf::new(ssf)
        .with_noise(ConstantNoise::diagonal(&[0.5, 0.25]))
        .with_intercept(StateIntercept::constant(DVector::from_vec(vec![0.0, 1.0])));
    let aug = rich.prepare(3).unwrap();
    assert_eq!(aug.state_dim(), 4);

    let panel = MultivariateSsfData::new(matrix(&load_fixtures()["bivariate"][1]["values"]));
    let adapted = aug.adapt(&MultivariateSsfData::new(
        panel.values().rows(0, 3).clone_owned(),
    ))
    .unwrap();
    // l_2 = [3, 3] -> yc_2 = [3, 6]
    assert_abs_diff_eq!(adapted.get(0, 2).unwrap(), -0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(adapted.get(1, 2).unwrap(), -2.5, epsilon = 1e-12);
    assert!(adapted.is_missing(0, 1).unwrap());

    let map = M2uMap::from_data(&aug, &adapted).unwrap();
    assert_eq!(map.len(), 4);
    let adapter = M2uSsfAdapter::new(aug, map).unwrap();
    assert!(!adapter.is_time_invariant());
    // period 1 is entirely missing
    assert!(!adapter.has_z(1));
    let mut z = DVector::zeros(4);
    adapter.z(3, &mut z).unwrap();
    assert_abs_diff_eq!(z[1], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(z[3], 1.0, epsilon = 1e-12);
}

/// Static shape of a multivariate state-space model.
///
/// `res_count` is the number of state slots receiving shocks (the length
/// of `R`, or the row count of `W`); `res_dim` is the dimension of the
/// innovation vector itself (the order of `Q`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SsfDims {
    pub state_dim: usize,
    pub vars_count: usize,
    pub res_count: usize,
    pub res_dim: usize,
}

impl SsfDims {
    pub fn new(state_dim: usize, vars_count: usize, res_count: usize, res_dim: usize) -> Self {
        Self {
            state_dim,
            vars_count,
            res_count,
            res_dim,
        }
    }

    /// Shocks hit every state slot directly: `res_count == res_dim == state_dim`.
    pub fn full(state_dim: usize, vars_count: usize) -> Self {
        Self::new(state_dim, vars_count, state_dim, state_dim)
    }

    /// Shape of `W` (res_count × res_dim).
    pub fn w_shape(&self) -> (usize, usize) {
        (self.res_count, self.res_dim)
    }

    /// Shape of `Z` (vars_count × state_dim).
    pub fn z_shape(&self) -> (usize, usize) {
        (self.vars_count, self.state_dim)
    }
}

/// Outcome of a load hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Load {
    /// The buffer now holds the matrix for the requested position.
    Loaded,
    /// The hook has nothing for that position; the buffer must not be read.
    Unavailable,
}

impl Load {
    pub fn is_loaded(self) -> bool {
        self == Load::Loaded
    }
}

/// Where a pseudo-time sits inside its true time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// More observations of the same period follow; the state is frozen.
    WithinStep,
    /// Last observation of the period; the true transition applies next.
    StepBoundary,
}

impl StepPhase {
    pub fn is_boundary(self) -> bool {
        self == StepPhase::StepBoundary
    }
}

// src/state.rs
//
// Population <-> state coordinate transforms.
//
// Population lives in [0, var_bound] (physical abundance); the agent observes
// the affine image in [-1, 1].

/// Affine map between population space and normalized state space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMap {
    var_bound: f64,
}

impl CoordinateMap {
    /// `var_bound` must be positive; `EnvMetadata` validates this before any
    /// map is built from it.
    pub fn new(var_bound: f64) -> Self {
        debug_assert!(var_bound > 0.0);
        Self { var_bound }
    }

    pub fn var_bound(&self) -> f64 {
        self.var_bound
    }

    /// From pop-space [0, var_bound] to state-space [-1, 1].
    pub fn pop_to_state(&self, pop: &[f64]) -> Vec<f64> {
        pop.iter().map(|p| 2.0 * p / self.var_bound - 1.0).collect()
    }

    /// Inverse of `pop_to_state`.
    pub fn state_to_pop(&self, state: &[f64]) -> Vec<f64> {
        state
            .iter()
            .map(|s| (s + 1.0) * (self.var_bound / 2.0))
            .collect()
    }

    /// Clamp every component into [0, var_bound]. NaN becomes 0.
    pub fn clamp_pop(&self, pop: &mut [f64]) {
        for p in pop.iter_mut() {
            *p = if p.is_nan() {
                0.0
            } else {
                p.clamp(0.0, self.var_bound)
            };
        }
    }
}

/// Clamp every component into [-1, 1]. NaN becomes -1 (an empty population).
pub fn clamp_unit(values: &mut [f64]) {
    for v in values.iter_mut() {
        *v = if v.is_nan() { -1.0 } else { v.clamp(-1.0, 1.0) };
    }
}

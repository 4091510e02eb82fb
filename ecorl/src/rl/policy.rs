// src/rl/policy.rs
//
// Policy trait and fixed-action implementations.
//
// A policy maps the normalized state to an action in [-1, 1]^n_act. Learned
// policies live in the external trainer; the ones here are baselines for
// rollouts, smoke tests and telemetry.

/// Version string of the built-in fixed policies.
pub const FIXED_POLICY_VERSION: &str = "fixed-v1";

/// Decision-making interface driven by the episode runner.
pub trait Policy: Send {
    /// Unique version string for this policy implementation.
    fn version(&self) -> &str;

    /// Action for the current normalized state.
    fn act(&mut self, state: &[f64]) -> Vec<f64>;

    /// Called at the start of each episode.
    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {}
}

/// Always returns the same action vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPolicy {
    action: Vec<f64>,
}

impl ConstantPolicy {
    pub fn new(action: Vec<f64>) -> Self {
        Self { action }
    }

    pub fn action(&self) -> &[f64] {
        &self.action
    }
}

impl Policy for ConstantPolicy {
    fn version(&self) -> &str {
        FIXED_POLICY_VERSION
    }

    fn act(&mut self, _state: &[f64]) -> Vec<f64> {
        self.action.clone()
    }
}

/// Action -1 on every control, i.e. zero effort under the default filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoHarvestPolicy {
    n_act: usize,
}

impl NoHarvestPolicy {
    pub fn new(n_act: usize) -> Self {
        Self { n_act }
    }
}

impl Policy for NoHarvestPolicy {
    fn version(&self) -> &str {
        FIXED_POLICY_VERSION
    }

    fn act(&mut self, _state: &[f64]) -> Vec<f64> {
        vec![-1.0; self.n_act]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_policy_ignores_state() {
        let mut p = ConstantPolicy::new(vec![0.2, -0.4]);
        assert_eq!(p.act(&[0.0]), vec![0.2, -0.4]);
        assert_eq!(p.act(&[0.9, 0.1, -1.0]), vec![0.2, -0.4]);
        assert_eq!(p.version(), FIXED_POLICY_VERSION);
    }

    #[test]
    fn no_harvest_policy_emits_minus_one() {
        let mut p = NoHarvestPolicy::new(3);
        p.reset_episode(1, 1);
        assert_eq!(p.act(&[0.5]), vec![-1.0; 3]);
    }
}

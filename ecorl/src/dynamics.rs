// src/dynamics.rs
//
// Natural (uncontrolled) population dynamics.
//
// The update function is injected as a DynamicsFn strategy. DynamicalSystem
// pairs it with a ParameterEvolver and evaluates one step. No clamping or
// validation happens here: out-of-bound outputs are the environment's to
// handle.

use std::fmt;
use std::sync::Arc;

use rand::{Rng, RngCore};

use crate::params::{ParamSet, ParameterEvolver};

/// One draw from N(0, 1) (Box-Muller, cosine branch).
///
/// Consumes exactly two uniforms, so the number of draws per step is fixed
/// and trajectories stay aligned across seeds.
pub fn standard_normal<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// One-step population update.
///
/// `rng` is the environment's seeded generator; stochastic dynamics must draw
/// from it (and only from it) to stay reproducible.
pub trait DynamicsFn: Send + Sync {
    fn evolve(&self, pop: &[f64], params: &ParamSet, t: u64, rng: &mut dyn RngCore) -> Vec<f64>;

    /// Number of species the function expects, if it knows.
    fn arity(&self) -> Option<usize> {
        None
    }
}

impl<F> DynamicsFn for F
where
    F: Fn(&[f64], &ParamSet, u64, &mut dyn RngCore) -> Vec<f64> + Send + Sync,
{
    fn evolve(&self, pop: &[f64], params: &ParamSet, t: u64, rng: &mut dyn RngCore) -> Vec<f64> {
        self(pop, params, t, rng)
    }
}

/// Adapter for noise-free, time-independent update functions `f(pop, params)`.
pub struct Deterministic<F> {
    f: F,
    arity: Option<usize>,
}

impl<F> Deterministic<F>
where
    F: Fn(&[f64], &ParamSet) -> Vec<f64> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f, arity: None }
    }

    pub fn with_arity(mut self, n_sp: usize) -> Self {
        self.arity = Some(n_sp);
        self
    }
}

impl<F> DynamicsFn for Deterministic<F>
where
    F: Fn(&[f64], &ParamSet) -> Vec<f64> + Send + Sync,
{
    fn evolve(&self, pop: &[f64], params: &ParamSet, _t: u64, _rng: &mut dyn RngCore) -> Vec<f64> {
        (self.f)(pop, params)
    }

    fn arity(&self) -> Option<usize> {
        self.arity
    }
}

/// Update function plus its (possibly time-indexed) parameters.
#[derive(Clone)]
pub struct DynamicalSystem {
    dyn_fn: Arc<dyn DynamicsFn>,
    evolver: ParameterEvolver,
}

impl DynamicalSystem {
    pub fn new(dyn_fn: impl DynamicsFn + 'static, evolver: ParameterEvolver) -> Self {
        Self {
            dyn_fn: Arc::new(dyn_fn),
            evolver,
        }
    }

    /// Shorthand for a deterministic update function.
    pub fn from_fn<F>(f: F, evolver: ParameterEvolver) -> Self
    where
        F: Fn(&[f64], &ParamSet) -> Vec<f64> + Send + Sync + 'static,
    {
        Self::new(Deterministic::new(f), evolver)
    }

    /// Evaluate one natural-dynamics step at timestep `t`.
    pub fn advance(&self, pop: &[f64], t: u64, rng: &mut dyn RngCore) -> Vec<f64> {
        let params = self.evolver.resolve(t);
        self.dyn_fn.evolve(pop, &params, t, rng)
    }

    pub fn params_at(&self, t: u64) -> ParamSet {
        self.evolver.resolve(t)
    }

    pub fn arity(&self) -> Option<usize> {
        self.dyn_fn.arity()
    }

    pub fn evolver(&self) -> &ParameterEvolver {
        &self.evolver
    }
}

impl fmt::Debug for DynamicalSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicalSystem")
            .field("arity", &self.dyn_fn.arity())
            .field("evolver", &self.evolver)
            .finish()
    }
}

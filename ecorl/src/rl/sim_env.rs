// src/rl/sim_env.rs
//
// Gym-style harvest-control environment.
//
// This module provides:
// - EcoEnv: single environment (reset, step) over a DynamicalSystem
// - VecEnv: N independent environments for batched rollouts
// - Deterministic execution given seeds
//
// Step order: clamp action -> effort -> reward on pre-harvest population ->
// harvest -> natural dynamics -> termination check -> renormalize.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::EnvMetadata;
use crate::control::{apply_harvest, AffineEffort, EffortFilter, HarvestEffect, UtilityFn};
use crate::dynamics::{standard_normal, DynamicalSystem};
use crate::error::{BoundsWarning, ConfigurationError, EnvError, ShapeError};
use crate::state::clamp_unit;

/// Lifecycle of an environment instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Constructed, never reset.
    Uninitialized,
    /// Accepting steps.
    Ready,
    /// Episode ended; only reset() is accepted.
    Terminated,
}

/// Why a step ended the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationCause {
    /// Lowest-indexed species found below the extinction threshold.
    Extinction { species: usize },
    /// Timestep reached the horizon.
    Horizon,
}

/// Auxiliary information returned from a step.
///
/// Only `termination_reason` is always filled in; the rest is populated when
/// `EcoEnvConfig::diagnostics` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Termination cause if the episode ended on this step.
    pub termination_reason: Option<TerminationCause>,
    /// Action after clamping to [-1, 1].
    pub action: Option<Vec<f64>>,
    /// Effort the action mapped to.
    pub effort: Option<Vec<f64>>,
    /// Quantity removed per controlled species.
    pub effects: Option<Vec<HarvestEffect>>,
}

/// Auxiliary information returned from a reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResetInfo {
    /// Seed the episode was started from.
    pub seed: u64,
    /// Gaussian perturbation added to the initial population (diagnostics).
    pub init_perturbation: Option<Vec<f64>>,
}

/// Free-form reset options.
///
/// Accepted for Gym compatibility; no built-in option changes how the
/// environment resets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResetOptions(pub BTreeMap<String, serde_json::Value>);

impl ResetOptions {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Normalized state after the step, in [-1, 1].
    pub state: Vec<f64>,
    /// Utility of this step, plus the terminal penalty if it ended the episode.
    pub reward: f64,
    /// Whether the episode has ended.
    pub terminated: bool,
    /// Always false: only `terminated` carries episode-end semantics.
    pub truncated: bool,
    pub info: StepInfo,
    /// Set when the dynamics overflowed the declared bounds this step.
    pub bounds_warning: Option<BoundsWarning>,
}

/// Callback notified of every bounds overflow.
pub trait BoundsObserver: Send + Sync {
    fn on_bounds_warning(&self, warning: &BoundsWarning);
}

impl<F> BoundsObserver for F
where
    F: Fn(&BoundsWarning) + Send + Sync,
{
    fn on_bounds_warning(&self, warning: &BoundsWarning) {
        self(warning)
    }
}

/// Environment behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcoEnvConfig {
    /// Fill the optional fields of `StepInfo` / `ResetInfo`.
    pub diagnostics: bool,
}

impl EcoEnvConfig {
    pub fn with_diagnostics() -> Self {
        Self { diagnostics: true }
    }
}

/// Harvest-control environment.
///
/// - reset(seed) -> (state, info)
/// - step(action) -> StepResult
///
/// All randomness (reset noise and stochastic dynamics) comes from one
/// ChaCha8 generator reseeded on every reset, so a seed plus an action
/// sequence fully determines the trajectory.
///
/// After every successful step the population lies in [0, var_bound] and the
/// state in [-1, 1]. When the dynamics overshoot, the state is clamped and the
/// population resynchronized from it. That discards how far out of bounds the
/// dynamics went (only the `BoundsWarning` keeps it); it is a compatibility
/// policy, not a guarantee that the dynamics are well-behaved.
#[derive(Clone)]
pub struct EcoEnv {
    metadata: EnvMetadata,
    dynamics: DynamicalSystem,
    utility: Arc<dyn UtilityFn>,
    effort_filter: Arc<dyn EffortFilter>,
    bounds_observer: Option<Arc<dyn BoundsObserver>>,
    env_config: EcoEnvConfig,
    /// Source of all randomness for the current episode.
    rng: ChaCha8Rng,
    /// Physical abundances.
    pop: Vec<f64>,
    /// Normalized observation, always derived from `pop`.
    state: Vec<f64>,
    timestep: u64,
    phase: Phase,
    seed: u64,
}

impl EcoEnv {
    /// Create a new environment in the `Uninitialized` phase.
    ///
    /// Fails if the dynamics declare an arity different from `n_sp`, or if
    /// the utility declares controlled species other than the metadata's.
    pub fn new(
        metadata: EnvMetadata,
        dynamics: DynamicalSystem,
        utility: impl UtilityFn + 'static,
    ) -> Result<Self, ConfigurationError> {
        Self::with_shared_utility(metadata, dynamics, Arc::new(utility))
    }

    pub fn with_shared_utility(
        metadata: EnvMetadata,
        dynamics: DynamicalSystem,
        utility: Arc<dyn UtilityFn>,
    ) -> Result<Self, ConfigurationError> {
        if let Some(arity) = dynamics.arity() {
            if arity != metadata.n_sp() {
                return Err(ConfigurationError::DynamicsArity {
                    arity,
                    n_sp: metadata.n_sp(),
                });
            }
        }
        if let Some(species) = utility.ctrl_species() {
            if species != metadata.ctrl_species() {
                return Err(ConfigurationError::UtilitySpecies {
                    expected: metadata.ctrl_species().to_vec(),
                    got: species.to_vec(),
                });
            }
        }

        let pop = metadata.init_pop().to_vec();
        let state = metadata.coords().pop_to_state(&pop);

        Ok(Self {
            metadata,
            dynamics,
            utility,
            effort_filter: Arc::new(AffineEffort),
            bounds_observer: None,
            env_config: EcoEnvConfig::default(),
            rng: ChaCha8Rng::seed_from_u64(0),
            pop,
            state,
            timestep: 0,
            phase: Phase::Uninitialized,
            seed: 0,
        })
    }

    /// Replace the default `(a + 1) / 2` action-to-effort filter.
    pub fn with_effort_filter(mut self, filter: impl EffortFilter + 'static) -> Self {
        self.effort_filter = Arc::new(filter);
        self
    }

    pub fn with_bounds_observer(mut self, observer: impl BoundsObserver + 'static) -> Self {
        self.bounds_observer = Some(Arc::new(observer));
        self
    }

    pub fn with_config(mut self, env_config: EcoEnvConfig) -> Self {
        self.env_config = env_config;
        self
    }

    /// Reset the environment with an optional seed.
    ///
    /// Without a seed, one is drawn from the current generator.
    pub fn reset(&mut self, seed: Option<u64>) -> (Vec<f64>, ResetInfo) {
        self.reset_with_options(seed, None)
    }

    /// `reset` taking Gym-style options, which are currently ignored.
    pub fn reset_with_options(
        &mut self,
        seed: Option<u64>,
        options: Option<&ResetOptions>,
    ) -> (Vec<f64>, ResetInfo) {
        if let Some(options) = options.filter(|o| !o.is_empty()) {
            tracing::debug!(keys = ?options.0.keys().collect::<Vec<_>>(), "ignoring reset options");
        }

        let seed = seed.unwrap_or_else(|| self.rng.gen());
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.timestep = 0;

        // No clamping here: init_pop and reset_sigma are the caller's to keep sane.
        let sigma = self.metadata.reset_sigma();
        let perturbation: Vec<f64> = (0..self.metadata.n_sp())
            .map(|_| sigma * standard_normal(&mut self.rng))
            .collect();

        self.pop = self
            .metadata
            .init_pop()
            .iter()
            .zip(&perturbation)
            .map(|(p0, dp)| p0 + dp)
            .collect();
        self.state = self.pop_to_state(&self.pop);
        self.phase = Phase::Ready;

        tracing::debug!(seed, pop = ?self.pop, "environment reset");

        let info = ResetInfo {
            seed,
            init_perturbation: self.env_config.diagnostics.then_some(perturbation),
        };
        (self.state.clone(), info)
    }

    /// Take a step in the environment.
    ///
    /// A wrong-length action fails before anything is mutated. A dynamics
    /// function returning the wrong number of species fails the step and
    /// leaves the environment `Terminated`.
    pub fn step(&mut self, action: &[f64]) -> Result<StepResult, EnvError> {
        if self.phase != Phase::Ready {
            return Err(EnvError::NotReady { phase: self.phase });
        }

        let n_act = self.metadata.n_act();
        if action.len() != n_act {
            return Err(ShapeError::Action {
                expected: n_act,
                got: action.len(),
            }
            .into());
        }

        // 1-2) Regularize action, map to effort
        let action: Vec<f64> = action.iter().map(|a| a.clamp(-1.0, 1.0)).collect();
        let effort = self.action_to_effort(&action);

        // 3) Reward on the pre-harvest population
        let mut reward = self.utility.utility(&effort, &self.pop);

        // 4) Harvest
        let (effects, harvested) = apply_harvest(
            &self.pop,
            self.metadata.ctrl_species(),
            &effort,
            self.metadata.coords(),
        );

        // 5) Natural dynamics
        let next = self
            .dynamics
            .advance(&harvested, self.timestep, &mut self.rng);
        let n_sp = self.metadata.n_sp();
        if next.len() != n_sp {
            self.phase = Phase::Terminated;
            return Err(ShapeError::DynamicsOutput {
                expected: n_sp,
                got: next.len(),
            }
            .into());
        }
        self.pop = next;

        // 6) Termination, with the one-time penalty
        let termination_reason = self.check_termination();
        if termination_reason.is_some() {
            reward += self.metadata.penalty(self.timestep);
        }

        // 7-8) Renormalize; clamp and resync on overflow
        let mut state = self.pop_to_state(&self.pop);
        let bounds_warning = BoundsWarning::detect(self.timestep, &state);
        if let Some(warning) = &bounds_warning {
            tracing::warn!(
                timestep = warning.timestep,
                species = ?warning.species,
                raw_state = ?warning.raw_state,
                "state out of [-1, 1]; clamping. Check the dynamics or raise var_bound"
            );
            if let Some(observer) = &self.bounds_observer {
                observer.on_bounds_warning(warning);
            }
        }
        clamp_unit(&mut state);
        self.pop = self.state_to_pop(&state);
        self.state = state;

        // 9) Advance time
        self.timestep += 1;

        if let Some(cause) = termination_reason {
            self.phase = Phase::Terminated;
            tracing::debug!(timestep = self.timestep, ?cause, "episode terminated");
        }

        let info = if self.env_config.diagnostics {
            StepInfo {
                termination_reason,
                action: Some(action),
                effort: Some(effort),
                effects: Some(effects),
            }
        } else {
            StepInfo {
                termination_reason,
                ..StepInfo::default()
            }
        };

        Ok(StepResult {
            state: self.state.clone(),
            reward,
            terminated: termination_reason.is_some(),
            truncated: false,
            info,
            bounds_warning,
        })
    }

    /// From pop-space [0, var_bound] to state-space [-1, 1].
    pub fn pop_to_state(&self, pop: &[f64]) -> Vec<f64> {
        self.metadata.coords().pop_to_state(pop)
    }

    /// Inverse of `pop_to_state`.
    pub fn state_to_pop(&self, state: &[f64]) -> Vec<f64> {
        self.metadata.coords().state_to_pop(state)
    }

    /// Apply the effort filter componentwise. Does not clamp `action`.
    pub fn action_to_effort(&self, action: &[f64]) -> Vec<f64> {
        action.iter().map(|&a| self.effort_filter.effort(a)).collect()
    }

    /// Harvest `effort` from `pop` without touching the environment.
    pub fn perform_action(
        &self,
        pop: &[f64],
        effort: &[f64],
    ) -> Result<(Vec<HarvestEffect>, Vec<f64>), ShapeError> {
        if pop.len() != self.metadata.n_sp() {
            return Err(ShapeError::Population {
                expected: self.metadata.n_sp(),
                got: pop.len(),
            });
        }
        if effort.len() != self.metadata.n_act() {
            return Err(ShapeError::Action {
                expected: self.metadata.n_act(),
                got: effort.len(),
            });
        }
        Ok(apply_harvest(
            pop,
            self.metadata.ctrl_species(),
            effort,
            self.metadata.coords(),
        ))
    }

    /// Overwrite the current population (and derived state) mid-episode.
    ///
    /// Values are taken as given; nothing is clamped.
    pub fn set_population(&mut self, pop: Vec<f64>) -> Result<(), ShapeError> {
        if pop.len() != self.metadata.n_sp() {
            return Err(ShapeError::Population {
                expected: self.metadata.n_sp(),
                got: pop.len(),
            });
        }
        self.state = self.pop_to_state(&pop);
        self.pop = pop;
        Ok(())
    }

    pub fn population(&self) -> &[f64] {
        &self.pop
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Terminated
    }

    pub fn metadata(&self) -> &EnvMetadata {
        &self.metadata
    }

    pub fn dynamics(&self) -> &DynamicalSystem {
        &self.dynamics
    }

    pub fn observation_size(&self) -> usize {
        self.metadata.n_sp()
    }

    pub fn action_size(&self) -> usize {
        self.metadata.n_act()
    }

    fn check_termination(&self) -> Option<TerminationCause> {
        let thresh = self.metadata.extinct_thresh();
        // NaN counts as collapsed.
        if let Some(species) = self.pop.iter().position(|&p| p.is_nan() || p < thresh) {
            return Some(TerminationCause::Extinction { species });
        }
        if self.timestep >= self.metadata.tmax() {
            return Some(TerminationCause::Horizon);
        }
        None
    }
}

impl fmt::Debug for EcoEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcoEnv")
            .field("metadata", &self.metadata)
            .field("phase", &self.phase)
            .field("timestep", &self.timestep)
            .field("seed", &self.seed)
            .field("pop", &self.pop)
            .finish_non_exhaustive()
    }
}

/// Vectorised environment for batched rollouts.
///
/// Manages N independent EcoEnv instances that share strategy objects but
/// nothing mutable.
#[derive(Debug, Clone)]
pub struct VecEnv {
    envs: Vec<EcoEnv>,
}

impl VecEnv {
    /// N copies of `template` (its phase and episode state are copied too;
    /// call reset_all before stepping).
    ///
    /// Copy `i` gets a generator seeded with `i`, so unseeded resets differ
    /// across the batch but are reproducible.
    pub fn new(n: usize, template: &EcoEnv) -> Self {
        let envs = (0..n)
            .map(|i| {
                let mut env = template.clone();
                env.rng = ChaCha8Rng::seed_from_u64(i as u64);
                env
            })
            .collect();
        Self { envs }
    }

    pub fn from_envs(envs: Vec<EcoEnv>) -> Self {
        Self { envs }
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Reset all environments with optional per-environment seeds.
    ///
    /// Environments without a seed (None, or past the end of `seeds`) draw
    /// one from their own generator.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Vec<(Vec<f64>, ResetInfo)> {
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| {
                let seed = seeds.and_then(|s| s.get(i).copied());
                env.reset(seed)
            })
            .collect()
    }

    /// Reset every terminated environment from its own generator.
    ///
    /// Returns the indices that were reset.
    pub fn reset_done(&mut self) -> Vec<usize> {
        let mut reset = Vec::new();
        for (i, env) in self.envs.iter_mut().enumerate() {
            if env.is_done() {
                env.reset(None);
                reset.push(i);
            }
        }
        reset
    }

    /// Step all environments, one action per environment.
    ///
    /// Shapes and phases are checked for the whole batch before any
    /// environment moves, so a failed batch leaves every environment as it
    /// was.
    pub fn step(&mut self, actions: &[Vec<f64>]) -> Result<Vec<StepResult>, EnvError> {
        if actions.len() != self.envs.len() {
            return Err(ShapeError::Batch {
                expected: self.envs.len(),
                got: actions.len(),
            }
            .into());
        }
        for (index, (env, action)) in self.envs.iter().zip(actions).enumerate() {
            if env.phase() != Phase::Ready {
                return Err(EnvError::BatchNotReady {
                    index,
                    phase: env.phase(),
                });
            }
            if action.len() != env.action_size() {
                return Err(ShapeError::Action {
                    expected: env.action_size(),
                    got: action.len(),
                }
                .into());
            }
        }

        self.envs
            .iter_mut()
            .zip(actions)
            .map(|(env, action)| env.step(action))
            .collect()
    }

    /// Step every environment with the same action.
    pub fn step_uniform(&mut self, action: &[f64]) -> Result<Vec<StepResult>, EnvError> {
        let actions = vec![action.to_vec(); self.envs.len()];
        self.step(&actions)
    }

    pub fn envs(&self) -> &[EcoEnv] {
        &self.envs
    }

    pub fn seeds(&self) -> Vec<u64> {
        self.envs.iter().map(EcoEnv::seed).collect()
    }

    pub fn dones(&self) -> Vec<bool> {
        self.envs.iter().map(EcoEnv::is_done).collect()
    }
}

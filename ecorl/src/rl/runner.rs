// src/rl/runner.rs
//
// Episode runner: drive one environment with one policy from reset to
// termination (or a step cap), logging to telemetry along the way.

use serde::{Deserialize, Serialize};

use crate::error::EnvError;

use super::policy::Policy;
use super::sim_env::{EcoEnv, TerminationCause};
use super::telemetry::{EcoTelemetry, TickRecord};

/// Why an episode run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// A species fell below the extinction threshold.
    Extinction { species: usize },
    /// The environment horizon was reached.
    Horizon,
    /// The runner's step cap was hit before the environment terminated.
    StepLimit,
    /// A step failed; `run_episode` returned the error. Telemetry only.
    Aborted,
}

impl From<TerminationCause> for TerminationReason {
    fn from(cause: TerminationCause) -> Self {
        match cause {
            TerminationCause::Extinction { species } => TerminationReason::Extinction { species },
            TerminationCause::Horizon => TerminationReason::Horizon,
        }
    }
}

/// Configuration for one episode run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeConfig {
    /// Reset seed.
    pub seed: u64,
    /// Episode ID for logging.
    pub episode_id: u64,
    /// Maximum number of steps to run.
    pub max_steps: u64,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            episode_id: 0,
            max_steps: 10_000,
        }
    }
}

impl EpisodeConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_episode_id(mut self, episode_id: u64) -> Self {
        self.episode_id = episode_id;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Summary of a completed episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_id: u64,
    pub seed: u64,
    pub termination_reason: TerminationReason,
    pub total_steps: u64,
    /// Sum of step rewards, terminal penalty included.
    pub total_reward: f64,
    pub final_population: Vec<f64>,
    /// Number of steps that overflowed the bounds.
    pub bounds_warnings: u64,
}

/// Run one episode.
///
/// Resets `env` with `config.seed`, then steps with `policy` until the
/// environment terminates or `config.max_steps` steps have been taken.
///
/// A failed step still closes the episode in telemetry with an `Aborted`
/// end marker before the error is returned.
pub fn run_episode(
    env: &mut EcoEnv,
    policy: &mut dyn Policy,
    config: &EpisodeConfig,
    telemetry: &mut EcoTelemetry,
) -> Result<EpisodeSummary, EnvError> {
    policy.reset_episode(config.seed, config.episode_id);
    let (mut state, _) = env.reset(Some(config.seed));
    telemetry.log_episode_start(config.episode_id, config.seed, policy.version());

    let mut total_reward = 0.0;
    let mut total_steps = 0;
    let mut bounds_warnings = 0;
    let mut termination_reason = TerminationReason::StepLimit;

    while total_steps < config.max_steps {
        let action = policy.act(&state);
        let result = match env.step(&action) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(episode_id = config.episode_id, %err, "episode aborted");
                telemetry.log_episode_end(
                    config.episode_id,
                    config.seed,
                    policy.version(),
                    TerminationReason::Aborted,
                    total_reward,
                    total_steps,
                );
                telemetry.flush();
                return Err(err);
            }
        };

        total_steps += 1;
        total_reward += result.reward;
        if result.bounds_warning.is_some() {
            bounds_warnings += 1;
        }

        telemetry.log_tick(&TickRecord::new(
            config.episode_id,
            env.timestep(),
            &result,
            env.population(),
        ));

        if let Some(cause) = result.info.termination_reason {
            termination_reason = cause.into();
            break;
        }
        state = result.state;
    }

    telemetry.log_episode_end(
        config.episode_id,
        config.seed,
        policy.version(),
        termination_reason,
        total_reward,
        total_steps,
    );
    telemetry.flush();

    tracing::debug!(
        episode_id = config.episode_id,
        seed = config.seed,
        ?termination_reason,
        total_steps,
        total_reward,
        "episode finished"
    );

    Ok(EpisodeSummary {
        episode_id: config.episode_id,
        seed: config.seed,
        termination_reason,
        total_steps,
        total_reward,
        final_population: env.population().to_vec(),
        bounds_warnings,
    })
}

// src/rl/mod.rs
//
// Reinforcement-learning surface of the crate.
//
// Key components:
// - EcoEnv: Gym-style harvest-control environment
// - VecEnv: batch of independent environments
// - Policy: fixed-action baselines for rollouts
// - run_episode: reset-to-termination driver with summary
// - EcoTelemetry: JSONL episode and tick logging

pub mod policy;
pub mod runner;
pub mod sim_env;
pub mod telemetry;

pub use policy::{ConstantPolicy, NoHarvestPolicy, Policy, FIXED_POLICY_VERSION};
pub use runner::{run_episode, EpisodeConfig, EpisodeSummary, TerminationReason};
pub use sim_env::{
    BoundsObserver, EcoEnv, EcoEnvConfig, Phase, ResetInfo, ResetOptions, StepInfo, StepResult,
    TerminationCause, VecEnv,
};
pub use telemetry::{EcoTelemetry, EpisodeMarker, EpisodeMarkerType, TickRecord};

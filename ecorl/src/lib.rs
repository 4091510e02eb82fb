//! ecorl core library.
//!
//! Reinforcement-learning environments for controlling (harvesting) ecological
//! population models. An agent observes the normalized population state,
//! picks harvest efforts, and is rewarded by a utility function; episodes end
//! on extinction or at a fixed horizon.
//!
//! # Architecture
//!
//! - **Strategies** (`dynamics`, `control`, `params`): injected behaviour.
//!   Natural dynamics, action-to-effort filter, utility and terminal penalty
//!   are trait objects with blanket impls for closures, so simple models are
//!   plain functions.
//!
//! - **Metadata** (`config`): validated problem shape and thresholds,
//!   loadable from YAML/JSON with environment-variable overrides.
//!
//! - **Coordinates** (`state`): affine map between population space
//!   `[0, var_bound]` and the observation space `[-1, 1]`.
//!
//! - **Environment** (`rl`): `EcoEnv` (reset, step), `VecEnv` for batches,
//!   fixed policies, an episode runner and JSONL telemetry.
//!
//! Logging goes through `tracing`; the library never installs a subscriber.

pub mod config;
pub mod control;
pub mod dynamics;
pub mod error;
pub mod params;
pub mod rl;
pub mod state;

pub use config::{EnvMetadata, MetadataConfig, ParamsConfig};
pub use control::{
    apply_harvest, AffineEffort, ConstantPenalty, EffortFilter, HarvestEffect,
    InverseTimePenalty, LinearProfit, PenaltyFn, UtilityFn,
};
pub use dynamics::{standard_normal, Deterministic, DynamicalSystem, DynamicsFn};
pub use error::{BoundsWarning, ConfigurationError, EnvError, ShapeError};
pub use params::{ParamSchedule, ParamSet, ParamSource, ParameterEvolver, Schedule};
pub use rl::{
    run_episode, EcoEnv, EcoEnvConfig, EcoTelemetry, EpisodeConfig, EpisodeSummary, Phase,
    Policy, ResetInfo, ResetOptions, StepInfo, StepResult, TerminationCause, TerminationReason,
    VecEnv,
};
pub use state::CoordinateMap;

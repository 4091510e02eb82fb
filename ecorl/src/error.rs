// src/error.rs
//
// Error and diagnostic types for the environment core.
//
// - ConfigurationError: rejected at construction, never retried
// - ShapeError: vector length mismatch detected at call time
// - EnvError: what step() can return
// - BoundsWarning: non-fatal, the environment clamps and continues

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rl::sim_env::Phase;

/// Invalid metadata, parameter set, or strategy pairing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("invalid metadata field '{field}': {message}")]
    InvalidMetadata { field: &'static str, message: String },

    #[error("override for unknown parameter '{name}' (known parameters: {known:?})")]
    UnknownParameter { name: String, known: Vec<String> },

    #[error("invalid schedule for parameter '{name}': {message}")]
    InvalidSchedule { name: String, message: String },

    #[error("dynamics function expects {arity} species but metadata declares n_sp = {n_sp}")]
    DynamicsArity { arity: usize, n_sp: usize },

    #[error("{what} has length {got}, expected {expected}")]
    StrategyShape {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("utility reads controlled species {got:?} but metadata controls {expected:?}")]
    UtilitySpecies {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("failed to read config file '{path}': {message}")]
    Io { path: String, message: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl ConfigurationError {
    pub(crate) fn metadata(field: &'static str, message: impl Into<String>) -> Self {
        ConfigurationError::InvalidMetadata {
            field,
            message: message.into(),
        }
    }
}

/// Length mismatch between a supplied vector and the problem shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("action has length {got}, expected n_act = {expected}")]
    Action { expected: usize, got: usize },

    #[error("dynamics function returned {got} values, expected n_sp = {expected}")]
    DynamicsOutput { expected: usize, got: usize },

    #[error("population has length {got}, expected n_sp = {expected}")]
    Population { expected: usize, got: usize },

    #[error("batch has {got} entries, expected one per environment ({expected})")]
    Batch { expected: usize, got: usize },
}

/// Errors returned by `EcoEnv::step`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("step() called while environment is {phase:?}; call reset() first")]
    NotReady { phase: Phase },

    #[error("environment {index} of the batch is {phase:?}; reset it before stepping the batch")]
    BatchNotReady { index: usize, phase: Phase },
}

/// Emitted when the dynamics push the normalized state outside [-1, 1], or
/// return a non-finite value.
///
/// The environment clamps the state and resynchronizes the population from
/// it, so the overflow magnitude survives only in this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsWarning {
    /// Timestep of the step that overflowed (pre-increment).
    pub timestep: u64,
    /// Normalized state before clamping.
    pub raw_state: Vec<f64>,
    /// Indices of the components with |state| > 1 or NaN.
    pub species: Vec<usize>,
}

impl BoundsWarning {
    /// Returns `Some` if any component of `raw_state` lies outside [-1, 1]
    /// or is NaN.
    pub fn detect(timestep: u64, raw_state: &[f64]) -> Option<Self> {
        let species: Vec<usize> = raw_state
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_nan() || s.abs() > 1.0)
            .map(|(i, _)| i)
            .collect();

        if species.is_empty() {
            return None;
        }

        Some(Self {
            timestep,
            raw_state: raw_state.to_vec(),
            species,
        })
    }
}

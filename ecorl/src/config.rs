// src/config.rs
//
// Problem-instance configuration.
//
// - MetadataConfig: plain, serde-friendly description of the problem shape.
//   Loadable from YAML/JSON, overridable from ECORL_* environment variables.
// - EnvMetadata: the validated, frozen form the environment runs on.
// - ParamsConfig: dynamics parameters + optional schedules for config files.
//
// Callables (penalty, dynamics, utility) cannot live in a file; they are
// supplied in code when building.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::control::PenaltyFn;
use crate::error::ConfigurationError;
use crate::params::{ParamSchedule, ParameterEvolver, Schedule};
use crate::state::CoordinateMap;

/// Unvalidated problem description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Optional human-readable problem name.
    #[serde(default)]
    pub name: Option<String>,
    /// Number of species.
    pub n_sp: usize,
    /// Number of control (action) dimensions.
    pub n_act: usize,
    /// Species index controlled by each action dimension.
    pub ctrl_species: Vec<usize>,
    /// Mean initial population.
    pub init_pop: Vec<f64>,
    /// Std-dev of the Gaussian perturbation added to `init_pop` on reset.
    pub reset_sigma: f64,
    /// Episode horizon: the step taken at timestep >= tmax terminates.
    pub tmax: u64,
    /// A species below this level counts as extinct.
    pub extinct_thresh: f64,
    /// Upper bound of population space; state is normalized against it.
    pub var_bound: f64,
}

impl Default for MetadataConfig {
    /// Single harvested species with logistic-scale abundances.
    fn default() -> Self {
        Self {
            name: None,
            n_sp: 1,
            n_act: 1,
            ctrl_species: vec![0],
            init_pop: vec![0.5],
            reset_sigma: 0.01,
            tmax: 1000,
            extinct_thresh: 0.05,
            var_bound: 2.0,
        }
    }
}

impl MetadataConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let contents =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigurationError::Io {
                path: path.as_ref().display().to_string(),
                message: e.to_string(),
            })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    /// Apply ECORL_TMAX, ECORL_RESET_SIGMA, ECORL_EXTINCT_THRESH and
    /// ECORL_VAR_BOUND from the process environment.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Same as `with_env_overrides`, reading variables through `lookup`.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override::<u64>(&lookup, "ECORL_TMAX", self.tmax) {
            self.tmax = v;
        }
        if let Some(v) = parse_override::<f64>(&lookup, "ECORL_RESET_SIGMA", self.reset_sigma) {
            self.reset_sigma = v;
        }
        if let Some(v) =
            parse_override::<f64>(&lookup, "ECORL_EXTINCT_THRESH", self.extinct_thresh)
        {
            self.extinct_thresh = v;
        }
        if let Some(v) = parse_override::<f64>(&lookup, "ECORL_VAR_BOUND", self.var_bound) {
            self.var_bound = v;
        }
        self
    }

    /// Validate and freeze, attaching the terminal penalty.
    pub fn build(
        self,
        penalty: impl PenaltyFn + 'static,
    ) -> Result<EnvMetadata, ConfigurationError> {
        self.validate()?;
        Ok(EnvMetadata {
            coords: CoordinateMap::new(self.var_bound),
            config: self,
            penalty: Arc::new(penalty),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.n_sp == 0 {
            return Err(ConfigurationError::metadata("n_sp", "must be > 0"));
        }
        if self.n_act == 0 {
            return Err(ConfigurationError::metadata("n_act", "must be > 0"));
        }
        if self.n_act > self.n_sp {
            return Err(ConfigurationError::metadata(
                "n_act",
                format!("n_act = {} exceeds n_sp = {}", self.n_act, self.n_sp),
            ));
        }

        if !(self.var_bound.is_finite() && self.var_bound > 0.0) {
            return Err(ConfigurationError::metadata(
                "var_bound",
                format!("must be a positive finite number, got {}", self.var_bound),
            ));
        }

        if self.ctrl_species.len() != self.n_act {
            return Err(ConfigurationError::metadata(
                "ctrl_species",
                format!(
                    "has {} entries, expected n_act = {}",
                    self.ctrl_species.len(),
                    self.n_act
                ),
            ));
        }
        for (k, &sp) in self.ctrl_species.iter().enumerate() {
            if sp >= self.n_sp {
                return Err(ConfigurationError::metadata(
                    "ctrl_species",
                    format!("index {sp} out of range for n_sp = {}", self.n_sp),
                ));
            }
            if self.ctrl_species[..k].contains(&sp) {
                return Err(ConfigurationError::metadata(
                    "ctrl_species",
                    format!("species {sp} listed more than once"),
                ));
            }
        }

        if self.init_pop.len() != self.n_sp {
            return Err(ConfigurationError::metadata(
                "init_pop",
                format!(
                    "has {} entries, expected n_sp = {}",
                    self.init_pop.len(),
                    self.n_sp
                ),
            ));
        }
        if let Some(p) = self
            .init_pop
            .iter()
            .find(|p| !(0.0..=self.var_bound).contains(*p))
        {
            return Err(ConfigurationError::metadata(
                "init_pop",
                format!("entry {p} outside [0, {}]", self.var_bound),
            ));
        }

        if !(self.reset_sigma.is_finite() && self.reset_sigma >= 0.0) {
            return Err(ConfigurationError::metadata(
                "reset_sigma",
                format!("must be finite and >= 0, got {}", self.reset_sigma),
            ));
        }

        if self.tmax == 0 {
            return Err(ConfigurationError::metadata("tmax", "must be > 0"));
        }

        if !(0.0..self.var_bound).contains(&self.extinct_thresh) {
            return Err(ConfigurationError::metadata(
                "extinct_thresh",
                format!(
                    "{} outside [0, var_bound = {})",
                    self.extinct_thresh, self.var_bound
                ),
            ));
        }

        Ok(())
    }
}

fn parse_override<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> Option<T>
where
    T: std::str::FromStr + fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => {
            tracing::info!(key, value = %v, "config override applied");
            Some(v)
        }
        Err(_) => {
            tracing::warn!(
                key,
                raw = %raw,
                default = %current,
                "could not parse config override; keeping default"
            );
            None
        }
    }
}

/// Validated, immutable problem description.
#[derive(Clone)]
pub struct EnvMetadata {
    config: MetadataConfig,
    coords: CoordinateMap,
    penalty: Arc<dyn PenaltyFn>,
}

impl EnvMetadata {
    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    pub fn n_sp(&self) -> usize {
        self.config.n_sp
    }

    pub fn n_act(&self) -> usize {
        self.config.n_act
    }

    pub fn ctrl_species(&self) -> &[usize] {
        &self.config.ctrl_species
    }

    pub fn init_pop(&self) -> &[f64] {
        &self.config.init_pop
    }

    pub fn reset_sigma(&self) -> f64 {
        self.config.reset_sigma
    }

    pub fn tmax(&self) -> u64 {
        self.config.tmax
    }

    pub fn extinct_thresh(&self) -> f64 {
        self.config.extinct_thresh
    }

    pub fn var_bound(&self) -> f64 {
        self.config.var_bound
    }

    pub fn coords(&self) -> &CoordinateMap {
        &self.coords
    }

    pub fn penalty(&self, t: u64) -> f64 {
        self.penalty.penalty(t)
    }

    /// The validated fields, e.g. for logging alongside results.
    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }
}

impl fmt::Debug for EnvMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvMetadata")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Dynamics parameters as written in a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamsConfig {
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default)]
    pub non_stationary: bool,
    /// Per-parameter schedules; keys must appear in `params`.
    #[serde(default)]
    pub schedules: BTreeMap<String, Schedule>,
}

impl ParamsConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    pub fn build(self) -> Result<ParameterEvolver, ConfigurationError> {
        for (name, schedule) in &self.schedules {
            schedule.validate(name)?;
        }
        let overrides = self
            .schedules
            .into_iter()
            .map(|(name, s)| (name, Arc::new(s) as Arc<dyn ParamSchedule>))
            .collect();
        ParameterEvolver::new(self.params, self.non_stationary, overrides)
    }
}

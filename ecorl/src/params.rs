// src/params.rs
//
// Dynamics parameters and their (optional) time dependence.
//
// - ParamSchedule: anything that maps a timestep to a value
// - Schedule: serde-friendly built-in schedules for config files
// - ParameterEvolver: resolves every parameter at timestep t
//
// Resolution is a pure function of t and the configuration captured at
// construction; nothing here mutates after build().

use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// A time-varying parameter value.
pub trait ParamSchedule: Send + Sync {
    fn value_at(&self, t: u64) -> f64;
}

impl<F> ParamSchedule for F
where
    F: Fn(u64) -> f64 + Send + Sync,
{
    fn value_at(&self, t: u64) -> f64 {
        self(t)
    }
}

/// Built-in schedules that can be described in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Always `value`.
    Constant { value: f64 },
    /// `intercept + slope * t`.
    Linear { intercept: f64, slope: f64 },
    /// `before` for t < at, `after` from then on (regime shift).
    Step { before: f64, after: f64, at: u64 },
    /// `mean + amplitude * sin(2*pi*t / period)` (seasonal forcing).
    Periodic {
        mean: f64,
        amplitude: f64,
        period: f64,
    },
}

impl Schedule {
    pub fn validate(&self, name: &str) -> Result<(), ConfigurationError> {
        let finite = match *self {
            Schedule::Constant { value } => value.is_finite(),
            Schedule::Linear { intercept, slope } => intercept.is_finite() && slope.is_finite(),
            Schedule::Step { before, after, .. } => before.is_finite() && after.is_finite(),
            Schedule::Periodic {
                mean,
                amplitude,
                period,
            } => {
                if !(period > 0.0) {
                    return Err(ConfigurationError::InvalidSchedule {
                        name: name.to_string(),
                        message: format!("period must be > 0, got {period}"),
                    });
                }
                mean.is_finite() && amplitude.is_finite() && period.is_finite()
            }
        };

        if !finite {
            return Err(ConfigurationError::InvalidSchedule {
                name: name.to_string(),
                message: "schedule coefficients must be finite".to_string(),
            });
        }
        Ok(())
    }
}

impl ParamSchedule for Schedule {
    fn value_at(&self, t: u64) -> f64 {
        match *self {
            Schedule::Constant { value } => value,
            Schedule::Linear { intercept, slope } => intercept + slope * t as f64,
            Schedule::Step { before, after, at } => {
                if t < at {
                    before
                } else {
                    after
                }
            }
            Schedule::Periodic {
                mean,
                amplitude,
                period,
            } => mean + amplitude * (TAU * t as f64 / period).sin(),
        }
    }
}

/// Where a parameter's value comes from.
#[derive(Clone)]
pub enum ParamSource {
    Constant(f64),
    /// `base` is the configured constant; it is reported for inspection but
    /// the schedule alone determines the resolved value.
    TimeVarying {
        base: f64,
        schedule: Arc<dyn ParamSchedule>,
    },
}

impl ParamSource {
    pub fn value_at(&self, t: u64) -> f64 {
        match self {
            ParamSource::Constant(v) => *v,
            ParamSource::TimeVarying { schedule, .. } => schedule.value_at(t),
        }
    }

    pub fn is_time_varying(&self) -> bool {
        matches!(self, ParamSource::TimeVarying { .. })
    }
}

impl fmt::Debug for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSource::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            ParamSource::TimeVarying { base, .. } => f
                .debug_struct("TimeVarying")
                .field("base", base)
                .finish_non_exhaustive(),
        }
    }
}

/// Fully-resolved parameter values at one timestep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    values: BTreeMap<String, f64>,
}

impl ParamSet {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Index<&str> for ParamSet {
    type Output = f64;

    /// Panics if `name` is not a known parameter.
    fn index(&self, name: &str) -> &f64 {
        match self.values.get(name) {
            Some(v) => v,
            None => panic!("unknown dynamics parameter '{name}'"),
        }
    }
}

/// Resolves named dynamics parameters at a given timestep.
#[derive(Debug, Clone, Default)]
pub struct ParameterEvolver {
    sources: BTreeMap<String, ParamSource>,
    non_stationary: bool,
}

impl ParameterEvolver {
    /// All parameters constant.
    pub fn stationary<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            sources: params
                .into_iter()
                .map(|(k, v)| (k.into(), ParamSource::Constant(v)))
                .collect(),
            non_stationary: false,
        }
    }

    /// Build from a constant parameter mapping, the non-stationary flag, and
    /// per-parameter overrides.
    ///
    /// Every override key must name a parameter in `params`. With
    /// `non_stationary == false` the overrides are checked and then ignored.
    pub fn new(
        params: BTreeMap<String, f64>,
        non_stationary: bool,
        overrides: BTreeMap<String, Arc<dyn ParamSchedule>>,
    ) -> Result<Self, ConfigurationError> {
        if let Some(name) = overrides.keys().find(|k| !params.contains_key(*k)) {
            return Err(ConfigurationError::UnknownParameter {
                name: name.clone(),
                known: params.keys().cloned().collect(),
            });
        }

        if !non_stationary && !overrides.is_empty() {
            tracing::warn!(
                overrides = ?overrides.keys().collect::<Vec<_>>(),
                "parameter overrides supplied with non_stationary = false; ignoring them"
            );
        }

        let mut overrides = overrides;
        let sources = params
            .into_iter()
            .map(|(name, base)| {
                let source = match overrides.remove(&name) {
                    Some(schedule) if non_stationary => {
                        ParamSource::TimeVarying { base, schedule }
                    }
                    _ => ParamSource::Constant(base),
                };
                (name, source)
            })
            .collect();

        Ok(Self {
            sources,
            non_stationary,
        })
    }

    pub fn builder() -> ParameterEvolverBuilder {
        ParameterEvolverBuilder::default()
    }

    /// Resolve every parameter at timestep `t`.
    pub fn resolve(&self, t: u64) -> ParamSet {
        ParamSet {
            values: self
                .sources
                .iter()
                .map(|(name, source)| (name.clone(), source.value_at(t)))
                .collect(),
        }
    }

    pub fn is_non_stationary(&self) -> bool {
        self.non_stationary
    }

    pub fn source(&self, name: &str) -> Option<&ParamSource> {
        self.sources.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}

/// Incremental construction of a `ParameterEvolver`.
#[derive(Default)]
pub struct ParameterEvolverBuilder {
    params: BTreeMap<String, f64>,
    overrides: BTreeMap<String, Arc<dyn ParamSchedule>>,
    non_stationary: bool,
}

impl ParameterEvolverBuilder {
    pub fn param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn non_stationary(mut self, enabled: bool) -> Self {
        self.non_stationary = enabled;
        self
    }

    /// Attach a time-varying override. Does not flip the non-stationary flag
    /// on its own.
    pub fn schedule(
        mut self,
        name: impl Into<String>,
        schedule: impl ParamSchedule + 'static,
    ) -> Self {
        self.overrides.insert(name.into(), Arc::new(schedule));
        self
    }

    pub fn build(self) -> Result<ParameterEvolver, ConfigurationError> {
        ParameterEvolver::new(self.params, self.non_stationary, self.overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stationary_resolution_is_identity() {
        let ev = ParameterEvolver::stationary([("r", 2.0), ("K", 1.0)]);
        assert!(!ev.is_non_stationary());
        for t in [0, 10, 10_000] {
            let p = ev.resolve(t);
            assert_eq!(p["r"], 2.0);
            assert_eq!(p["K"], 1.0);
            assert_eq!(p.len(), 2);
        }
    }

    #[test]
    fn override_is_evaluated_at_t() {
        let ev = ParameterEvolver::builder()
            .param("r", 2.0)
            .param("K", 1.0)
            .non_stationary(true)
            .schedule("r", |t: u64| 1.0 + t as f64 / 1000.0)
            .build()
            .unwrap();

        assert_eq!(ev.resolve(0)["r"], 1.0);
        assert!((ev.resolve(500)["r"] - 1.5).abs() < 1e-12);
        assert_eq!(ev.resolve(500)["K"], 1.0);
        assert!(ev.source("r").unwrap().is_time_varying());
        assert!(!ev.source("K").unwrap().is_time_varying());
    }

    #[test]
    fn unknown_override_key_is_rejected() {
        let err = ParameterEvolver::builder()
            .param("r", 2.0)
            .non_stationary(true)
            .schedule("q", |_t: u64| 0.0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnknownParameter { ref name, .. } if name == "q"
        ));
    }

    #[test]
    fn overrides_ignored_when_stationary() {
        let ev = ParameterEvolver::builder()
            .param("r", 2.0)
            .schedule("r", |_t: u64| 9.0)
            .build()
            .unwrap();
        assert_eq!(ev.resolve(3)["r"], 2.0);
    }

    #[test]
    fn resolved_key_set_matches_input() {
        let ev = ParameterEvolver::builder()
            .param("a", 1.0)
            .param("b", 2.0)
            .param("c", 3.0)
            .non_stationary(true)
            .schedule("b", Schedule::Step { before: 2.0, after: 4.0, at: 10 })
            .build()
            .unwrap();
        let names: Vec<_> = ev.resolve(11).iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(ev.resolve(9)["b"], 2.0);
        assert_eq!(ev.resolve(10)["b"], 4.0);
    }

    #[test]
    fn builtin_schedules() {
        let lin = Schedule::Linear { intercept: 1.0, slope: 0.5 };
        assert_eq!(lin.value_at(4), 3.0);

        let per = Schedule::Periodic { mean: 1.0, amplitude: 0.5, period: 4.0 };
        assert!((per.value_at(0) - 1.0).abs() < 1e-12);
        assert!((per.value_at(1) - 1.5).abs() < 1e-12);

        assert!(Schedule::Periodic { mean: 1.0, amplitude: 0.5, period: 0.0 }
            .validate("r")
            .is_err());
        assert!(Schedule::Linear { intercept: f64::NAN, slope: 0.0 }
            .validate("r")
            .is_err());
    }

    #[test]
    fn schedule_yaml_tagging() {
        let s: Schedule =
            serde_yaml::from_str("type: linear\nintercept: 1.0\nslope: 0.001\n").unwrap();
        assert_eq!(s, Schedule::Linear { intercept: 1.0, slope: 0.001 });
    }

    #[test]
    #[should_panic(expected = "unknown dynamics parameter")]
    fn indexing_unknown_parameter_panics() {
        let ev = ParameterEvolver::stationary([("r", 2.0)]);
        let v: f64 = ev.resolve(0)["nope"];
        assert!(v.is_nan());
    }
}

// src/control.rs
//
// Control-side strategies injected into the environment:
// - EffortFilter: action in [-1, 1] -> effort in [0, 1]
// - UtilityFn: (effort, pre-harvest population) -> reward
// - PenaltyFn: terminal timestep -> one-time reward delta
//
// plus the harvest step itself.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::state::CoordinateMap;

/// Maps one action component to one effort component.
pub trait EffortFilter: Send + Sync {
    fn effort(&self, action: f64) -> f64;
}

impl<F> EffortFilter for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn effort(&self, action: f64) -> f64 {
        self(action)
    }
}

/// Default filter: `(a + 1) / 2`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AffineEffort;

impl EffortFilter for AffineEffort {
    fn effort(&self, action: f64) -> f64 {
        (action + 1.0) / 2.0
    }
}

/// Per-step reward from the applied effort and the pre-harvest population.
pub trait UtilityFn: Send + Sync {
    fn utility(&self, effort: &[f64], pop: &[f64]) -> f64;

    /// Population indices the utility reads, aligned with the effort vector.
    /// `None` means undeclared and skips the construction-time check.
    fn ctrl_species(&self) -> Option<&[usize]> {
        None
    }
}

impl<F> UtilityFn for F
where
    F: Fn(&[f64], &[f64]) -> f64 + Send + Sync,
{
    fn utility(&self, effort: &[f64], pop: &[f64]) -> f64 {
        self(effort, pop)
    }
}

/// Revenue from harvested biomass minus a linear effort cost:
///
/// `sum_k price_k * pop[ctrl_k] * effort_k - cost_k * effort_k`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearProfit {
    ctrl_species: Vec<usize>,
    prices: Vec<f64>,
    costs: Vec<f64>,
}

impl LinearProfit {
    pub fn new(
        ctrl_species: Vec<usize>,
        prices: Vec<f64>,
        costs: Vec<f64>,
    ) -> Result<Self, ConfigurationError> {
        let n = ctrl_species.len();
        if prices.len() != n {
            return Err(ConfigurationError::StrategyShape {
                what: "prices",
                expected: n,
                got: prices.len(),
            });
        }
        if costs.len() != n {
            return Err(ConfigurationError::StrategyShape {
                what: "costs",
                expected: n,
                got: costs.len(),
            });
        }
        Ok(Self {
            ctrl_species,
            prices,
            costs,
        })
    }

    /// Unit prices, zero costs.
    pub fn unit_prices(ctrl_species: Vec<usize>) -> Self {
        let n = ctrl_species.len();
        Self {
            ctrl_species,
            prices: vec![1.0; n],
            costs: vec![0.0; n],
        }
    }
}

impl UtilityFn for LinearProfit {
    fn utility(&self, effort: &[f64], pop: &[f64]) -> f64 {
        self.ctrl_species
            .iter()
            .zip(effort)
            .zip(self.prices.iter().zip(&self.costs))
            .map(|((&sp, &e), (&price, &cost))| price * pop[sp] * e - cost * e)
            .sum()
    }

    fn ctrl_species(&self) -> Option<&[usize]> {
        Some(&self.ctrl_species)
    }
}

/// Reward delta applied once, on the step that ends the episode.
pub trait PenaltyFn: Send + Sync {
    fn penalty(&self, t: u64) -> f64;
}

impl<F> PenaltyFn for F
where
    F: Fn(u64) -> f64 + Send + Sync,
{
    fn penalty(&self, t: u64) -> f64 {
        self(t)
    }
}

/// Same delta regardless of when the episode ends.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConstantPenalty(pub f64);

impl PenaltyFn for ConstantPenalty {
    fn penalty(&self, _t: u64) -> f64 {
        self.0
    }
}

/// `-scale / (t + 1)`: ending early costs more than ending late.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseTimePenalty {
    pub scale: f64,
}

impl PenaltyFn for InverseTimePenalty {
    fn penalty(&self, t: u64) -> f64 {
        -self.scale / (t as f64 + 1.0)
    }
}

/// Quantity removed from one controlled species in one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarvestEffect {
    pub species: usize,
    pub removed: f64,
}

/// Remove `pop[i] * effort[k]` from each controlled species `i = ctrl[k]`,
/// then clamp the result into [0, var_bound].
///
/// Callers guarantee `effort.len() == ctrl_species.len()` and that every
/// controlled index is in range.
pub fn apply_harvest(
    pop: &[f64],
    ctrl_species: &[usize],
    effort: &[f64],
    coords: &CoordinateMap,
) -> (Vec<HarvestEffect>, Vec<f64>) {
    let mut new_pop = pop.to_vec();
    let effects: Vec<HarvestEffect> = ctrl_species
        .iter()
        .zip(effort)
        .map(|(&sp, &e)| {
            let removed = pop[sp] * e;
            new_pop[sp] -= removed;
            HarvestEffect {
                species: sp,
                removed,
            }
        })
        .collect();

    coords.clamp_pop(&mut new_pop);
    (effects, new_pop)
}

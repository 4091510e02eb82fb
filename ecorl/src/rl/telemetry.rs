// src/rl/telemetry.rs
//
// JSONL telemetry for episode rollouts.
//
// One line per record:
// - episode boundary markers (start/end, seed, termination reason)
// - per-step tick records (state, population, effort, reward)
//
// Telemetry never fails a simulation: write errors disable the sink.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::runner::TerminationReason;
use super::sim_env::StepResult;

pub const TELEMETRY_MODE_ENV: &str = "ECORL_TELEMETRY_MODE";
pub const TELEMETRY_PATH_ENV: &str = "ECORL_TELEMETRY_PATH";

/// Per-step record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub episode_id: u64,
    /// Environment timestep after the step.
    pub timestep: u64,
    /// Normalized state after the step.
    pub state: Vec<f64>,
    /// Population after the step.
    pub population: Vec<f64>,
    /// Applied effort (only with environment diagnostics on).
    pub effort: Option<Vec<f64>>,
    pub reward: f64,
    pub terminated: bool,
    /// The dynamics overflowed the bounds on this step.
    pub bounds_warning: bool,
}

impl TickRecord {
    pub fn new(episode_id: u64, timestep: u64, result: &StepResult, population: &[f64]) -> Self {
        Self {
            episode_id,
            timestep,
            state: result.state.clone(),
            population: population.to_vec(),
            effort: result.info.effort.clone(),
            reward: result.reward,
            terminated: result.terminated,
            bounds_warning: result.bounds_warning.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeMarkerType {
    Start,
    End,
}

/// Episode boundary marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMarker {
    pub episode_id: u64,
    /// Seed the episode was reset with.
    pub seed: u64,
    pub marker_type: EpisodeMarkerType,
    pub policy_version: String,
    /// End markers only.
    pub termination_reason: Option<TerminationReason>,
    /// End markers only.
    pub total_reward: Option<f64>,
    /// End markers only.
    pub total_steps: Option<u64>,
}

/// Rollout telemetry sink.
///
/// Disabled by default. Controlled by environment variables:
/// - ECORL_TELEMETRY_MODE: "off" (default) or "jsonl"
/// - ECORL_TELEMETRY_PATH: path to the JSONL file
pub struct EcoTelemetry {
    enabled: bool,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl Default for EcoTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl EcoTelemetry {
    /// Disabled sink.
    pub fn new() -> Self {
        Self {
            enabled: false,
            path: None,
            writer: None,
        }
    }

    /// Enable telemetry with a specific path.
    pub fn enable(path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            path: Some(path.into()),
            writer: None,
        }
    }

    /// Create from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup(TELEMETRY_MODE_ENV)
            .map(|s| s.trim().eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false);
        let path = lookup(TELEMETRY_PATH_ENV).map(PathBuf::from);

        if enabled && path.is_none() {
            tracing::warn!(
                "{TELEMETRY_MODE_ENV}=jsonl but {TELEMETRY_PATH_ENV} is unset; telemetry disabled"
            );
        }

        Self {
            enabled: enabled && path.is_some(),
            path,
            writer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if !self.enabled {
            return None;
        }

        if self.writer.is_none() {
            let path = self.path.as_ref()?;

            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }

            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        %err,
                        "cannot open telemetry file; disabling"
                    );
                    self.enabled = false;
                    return None;
                }
            }
        }

        self.writer.as_mut()
    }

    fn write_record<T: Serialize>(&mut self, record: &T) {
        let line = match serde_json::to_string(record) {
            Ok(s) => s,
            Err(_) => return,
        };

        let Some(writer) = self.ensure_writer() else {
            return;
        };

        if let Err(err) = writeln!(writer, "{}", line) {
            tracing::warn!(%err, "telemetry write failed; disabling");
            self.enabled = false;
            self.writer = None;
        }
    }

    pub fn log_episode_start(&mut self, episode_id: u64, seed: u64, policy_version: &str) {
        let marker = EpisodeMarker {
            episode_id,
            seed,
            marker_type: EpisodeMarkerType::Start,
            policy_version: policy_version.to_string(),
            termination_reason: None,
            total_reward: None,
            total_steps: None,
        };
        self.write_record(&marker);
    }

    pub fn log_episode_end(
        &mut self,
        episode_id: u64,
        seed: u64,
        policy_version: &str,
        reason: TerminationReason,
        total_reward: f64,
        total_steps: u64,
    ) {
        let marker = EpisodeMarker {
            episode_id,
            seed,
            marker_type: EpisodeMarkerType::End,
            policy_version: policy_version.to_string(),
            termination_reason: Some(reason),
            total_reward: Some(total_reward),
            total_steps: Some(total_steps),
        };
        self.write_record(&marker);
    }

    pub fn log_tick(&mut self, record: &TickRecord) {
        if !self.enabled {
            return;
        }
        self.write_record(record);
    }

    pub fn flush(&mut self) {
        if let Some(writer) = &mut self.writer {
            let _ = writer.flush();
        }
    }
}

impl Drop for EcoTelemetry {
    fn drop(&mut self) {
        self.flush();
    }
}

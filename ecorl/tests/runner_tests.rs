// tests/runner_tests.rs
//
// Episode runner tests: termination reasons, reward accounting, telemetry
// output.

use ecorl::rl::{ConstantPolicy, NoHarvestPolicy};
use ecorl::{
    run_episode, ConstantPenalty, DynamicalSystem, EcoEnv, EcoEnvConfig, EcoTelemetry,
    EpisodeConfig, MetadataConfig, ParamSet, ParameterEvolver, TerminationReason,
};

fn logistic_env(tmax: u64, penalty: f64) -> EcoEnv {
    let meta = MetadataConfig {
        reset_sigma: 0.0,
        tmax,
        ..MetadataConfig::default()
    }
    .build(ConstantPenalty(penalty))
    .unwrap();
    let dynamics = DynamicalSystem::from_fn(
        |x: &[f64], p: &ParamSet| vec![p["r"] * x[0] * (1.0 - x[0])],
        ParameterEvolver::stationary([("r", 2.0)]),
    );
    EcoEnv::new(meta, dynamics, |e: &[f64], p: &[f64]| e[0] * p[0]).unwrap()
}

#[test]
fn test_run_episode_to_horizon() {
    let mut env = logistic_env(20, -1.0);
    let mut policy = NoHarvestPolicy::new(1);
    let config = EpisodeConfig::default().with_seed(3).with_episode_id(9);

    let summary = run_episode(&mut env, &mut policy, &config, &mut EcoTelemetry::new()).unwrap();

    assert_eq!(summary.termination_reason, TerminationReason::Horizon);
    // Steps at t = 0..=20; the one at t = tmax terminates.
    assert_eq!(summary.total_steps, 21);
    // Zero effort earns nothing; only the terminal penalty counts.
    assert!((summary.total_reward + 1.0).abs() < 1e-12);
    assert_eq!(summary.episode_id, 9);
    assert_eq!(summary.seed, 3);
    assert_eq!(summary.bounds_warnings, 0);
    assert!((summary.final_population[0] - 0.5).abs() < 1e-12);
}

#[test]
fn test_run_episode_extinction() {
    let mut env = logistic_env(100, -5.0);
    let mut policy = ConstantPolicy::new(vec![1.0]);
    let config = EpisodeConfig::default();

    let summary = run_episode(&mut env, &mut policy, &config, &mut EcoTelemetry::new()).unwrap();

    assert_eq!(
        summary.termination_reason,
        TerminationReason::Extinction { species: 0 }
    );
    assert_eq!(summary.total_steps, 1);
    // Full harvest of 0.5 then the penalty.
    assert!((summary.total_reward - (0.5 - 5.0)).abs() < 1e-12);
}

#[test]
fn test_run_episode_step_limit() {
    let mut env = logistic_env(100, -1.0);
    let mut policy = ConstantPolicy::new(vec![-0.8]);
    let config = EpisodeConfig::default().with_max_steps(5);

    let summary = run_episode(&mut env, &mut policy, &config, &mut EcoTelemetry::new()).unwrap();

    assert_eq!(summary.termination_reason, TerminationReason::StepLimit);
    assert_eq!(summary.total_steps, 5);
    assert!(!env.is_done());
}

#[test]
fn test_run_episode_is_reproducible() {
    let config = EpisodeConfig::default().with_seed(77).with_max_steps(50);
    let mut policy = ConstantPolicy::new(vec![-0.5]);

    let mut run = || {
        let mut env = logistic_env(30, -1.0);
        run_episode(&mut env, &mut policy, &config, &mut EcoTelemetry::new()).unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a, b);
}

#[test]
fn test_run_episode_propagates_shape_errors() {
    let mut env = logistic_env(10, 0.0);
    let mut policy = ConstantPolicy::new(vec![0.0, 0.0]);
    let result = run_episode(
        &mut env,
        &mut policy,
        &EpisodeConfig::default(),
        &mut EcoTelemetry::new(),
    );
    assert!(result.is_err());
}

#[test]
fn test_failed_episode_closes_telemetry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aborted.jsonl");

    let mut env = logistic_env(10, 0.0);
    let mut policy = ConstantPolicy::new(vec![0.0, 0.0]);
    let mut telemetry = EcoTelemetry::enable(&path);
    let result = run_episode(
        &mut env,
        &mut policy,
        &EpisodeConfig::default().with_episode_id(4),
        &mut telemetry,
    );
    assert!(result.is_err());

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["marker_type"], "Start");
    assert_eq!(lines[1]["marker_type"], "End");
    assert_eq!(lines[1]["episode_id"], 4);
    assert_eq!(lines[1]["termination_reason"], "Aborted");
    assert_eq!(lines[1]["total_steps"], 0);
}

#[test]
fn test_run_episode_writes_telemetry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry").join("episodes.jsonl");

    let mut env = logistic_env(4, -1.0).with_config(EcoEnvConfig::with_diagnostics());
    let mut policy = ConstantPolicy::new(vec![-0.5]);
    let mut telemetry = EcoTelemetry::enable(&path);

    let summary = run_episode(
        &mut env,
        &mut policy,
        &EpisodeConfig::default().with_episode_id(1).with_seed(5),
        &mut telemetry,
    )
    .unwrap();
    drop(telemetry);

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len() as u64, summary.total_steps + 2);
    assert_eq!(lines[0]["marker_type"], "Start");
    assert_eq!(lines[0]["policy_version"], "fixed-v1");

    let ticks = &lines[1..lines.len() - 1];
    for (i, tick) in ticks.iter().enumerate() {
        assert_eq!(tick["episode_id"], 1);
        assert_eq!(tick["timestep"], i as u64 + 1);
        assert_eq!(tick["effort"][0], 0.25);
    }
    assert_eq!(ticks.last().unwrap()["terminated"], true);

    let end = lines.last().unwrap();
    assert_eq!(end["marker_type"], "End");
    assert_eq!(end["termination_reason"], "Horizon");
    assert_eq!(end["total_steps"], summary.total_steps);
}

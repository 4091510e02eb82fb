// tests/env_determinism_tests.rs
//
// Determinism tests for EcoEnv and VecEnv:
// - same seed + same action sequence => identical trajectories
// - stochastic dynamics draw only from the environment generator
// - VecEnv matches standalone environments
// - one environment per thread reproduces the sequential run

use std::thread;

use ecorl::{
    standard_normal, DynamicalSystem, EcoEnv, InverseTimePenalty, LinearProfit, MetadataConfig,
    ParamSet, ParameterEvolver, StepResult, VecEnv,
};
use rand::RngCore;

fn make_env() -> EcoEnv {
    let meta = MetadataConfig {
        n_sp: 2,
        n_act: 1,
        ctrl_species: vec![0],
        init_pop: vec![0.6, 0.3],
        reset_sigma: 0.05,
        tmax: 200,
        extinct_thresh: 0.001,
        var_bound: 2.0,
        ..MetadataConfig::default()
    }
    .build(InverseTimePenalty { scale: 100.0 })
    .unwrap();

    // Noisy two-species logistic with weak competition.
    let dynamics = DynamicalSystem::new(
        |x: &[f64], p: &ParamSet, _t: u64, rng: &mut dyn RngCore| -> Vec<f64> {
            let sigma = p["sigma"];
            vec![
                x[0] + p["r"] * x[0] * (1.0 - x[0] - 0.1 * x[1]) + sigma * standard_normal(rng),
                x[1] + p["r"] * x[1] * (1.0 - x[1] - 0.1 * x[0]) + sigma * standard_normal(rng),
            ]
        },
        ParameterEvolver::stationary([("r", 0.8), ("sigma", 0.02)]),
    );

    EcoEnv::new(meta, dynamics, LinearProfit::unit_prices(vec![0])).unwrap()
}

fn action_at(i: usize) -> Vec<f64> {
    vec![((i as f64) * 0.37).sin()]
}

fn rollout(env: &mut EcoEnv, seed: u64, steps: usize) -> (Vec<f64>, Vec<StepResult>) {
    let (state, _) = env.reset(Some(seed));
    let mut results = Vec::new();
    for i in 0..steps {
        let r = env.step(&action_at(i)).unwrap();
        let done = r.terminated;
        results.push(r);
        if done {
            break;
        }
    }
    (state, results)
}

/// Same seed + same actions => identical states, rewards, terminations.
#[test]
fn test_eco_env_determinism_same_seed_same_actions() {
    let seed = 12345u64;

    let (s1, r1) = rollout(&mut make_env(), seed, 100);
    let (s2, r2) = rollout(&mut make_env(), seed, 100);

    assert_eq!(s1, s2, "initial states must be identical");
    assert_eq!(r1.len(), r2.len());
    for (i, (a, b)) in r1.iter().zip(&r2).enumerate() {
        assert_eq!(a, b, "step {i} must be identical");
    }
}

#[test]
fn test_reset_same_seed_twice() {
    let mut env = make_env();
    let (a, _) = env.reset(Some(42));
    let (b, _) = env.reset(Some(42));
    assert_eq!(a, b);
}

#[test]
fn test_different_seeds_diverge() {
    let (s1, r1) = rollout(&mut make_env(), 1, 20);
    let (s2, r2) = rollout(&mut make_env(), 2, 20);
    assert_ne!(s1, s2);
    assert_ne!(r1.last().map(|r| r.state.clone()), r2.last().map(|r| r.state.clone()));
}

/// Reusing an instance across episodes must not leak generator state.
#[test]
fn test_reset_reseeds_generator() {
    let mut env = make_env();
    let first = rollout(&mut env, 7, 50);
    rollout(&mut env, 8, 50);
    let again = rollout(&mut env, 7, 50);
    assert_eq!(first, again);
}

#[test]
fn test_vec_env_matches_standalone_envs() {
    let seeds = [10u64, 20, 30, 40];
    let template = make_env();
    let mut vec_env = VecEnv::new(seeds.len(), &template);

    let initial = vec_env.reset_all(Some(&seeds));
    assert_eq!(vec_env.seeds(), seeds.to_vec());

    let mut singles: Vec<EcoEnv> = seeds.iter().map(|_| make_env()).collect();
    for ((env, seed), (state, _)) in singles.iter_mut().zip(seeds).zip(&initial) {
        let (s, _) = env.reset(Some(seed));
        assert_eq!(&s, state);
    }

    for i in 0..30 {
        if vec_env.dones().iter().any(|d| *d) {
            break;
        }
        let actions: Vec<Vec<f64>> = (0..seeds.len()).map(|k| action_at(i + k)).collect();
        let batch = vec_env.step(&actions).unwrap();
        for ((env, action), expected) in singles.iter_mut().zip(&actions).zip(&batch) {
            assert_eq!(&env.step(action).unwrap(), expected);
        }
    }
}

#[test]
fn test_vec_env_reset_without_seeds_is_reproducible() {
    let template = make_env();
    let mut a = VecEnv::new(3, &template);
    let mut b = VecEnv::new(3, &template);
    a.reset_all(None);
    b.reset_all(None);
    assert_eq!(a.seeds(), b.seeds());

    let seeds = a.seeds();
    assert_ne!(seeds[0], seeds[1]);
    assert_ne!(seeds[1], seeds[2]);
}

#[test]
fn test_one_env_per_thread_matches_sequential() {
    let seeds: Vec<u64> = (0..4).collect();
    let sequential: Vec<_> = seeds
        .iter()
        .map(|&seed| rollout(&mut make_env(), seed, 60))
        .collect();

    let handles: Vec<_> = seeds
        .iter()
        .map(|&seed| {
            let mut env = make_env();
            thread::spawn(move || rollout(&mut env, seed, 60))
        })
        .collect();
    let threaded: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("worker panicked"))
        .collect();

    assert_eq!(sequential, threaded);
}

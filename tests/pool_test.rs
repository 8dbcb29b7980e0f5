mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::{reply, spawn_engine, state, Engine, Framing};
use dodger_gym::adapter::protocol::ClientMessage;
use dodger_gym::adapter::EnvConfig;
use dodger_gym::pool::{EnvPool, PoolConfig, PoolError};

/// Every connection's episode ends on its second step.
fn two_step_engine() -> Engine {
    spawn_engine(Framing::Lines, |msg, conn| match msg {
        ClientMessage::Restart { .. } => reply(&state(370.0, &[], false)),
        ClientMessage::Step { .. } => {
            let over = conn.steps_since_restart >= 2;
            reply(&state(380.0, &[(400.0, 100.0)], over))
        }
        ClientMessage::BecomeSharedOwner => vec![],
    })
}

fn pool_config(engine: &Engine, num_envs: usize) -> PoolConfig {
    PoolConfig {
        num_envs,
        env: EnvConfig {
            uri: engine.uri.clone(),
            max_blocks: 3,
            frame_stack: 2,
            ..EnvConfig::default()
        },
        reply_timeout: Duration::from_secs(10),
        worker_binary: Some(PathBuf::from(env!("CARGO_BIN_EXE_dodger-worker"))),
        ..PoolConfig::default()
    }
}

fn run_two_step_episode(pool: &mut EnvPool, engine: &Engine) {
    let n = pool.num_envs();
    let obs_len = (1 + 3 * 3) * 2;
    assert_eq!(pool.observation_len(), obs_len);

    let first = pool.reset_all().unwrap();
    assert_eq!(first.len(), n);
    assert!(first.iter().all(|o| o.len() == obs_len));

    let batch = pool.step_all(&vec![0; n]).unwrap();
    assert_eq!(batch.len(), n);
    assert!(batch.terminated.iter().all(|t| !t));
    assert!(batch.terminal_observations.iter().all(Option::is_none));

    let batch = pool.step_all(&vec![1; n]).unwrap();
    assert!(batch.terminated.iter().all(|t| *t));
    for slot in 0..n {
        let terminal = batch.terminal_observations[slot].as_ref().unwrap();
        assert_eq!(terminal.len(), obs_len);
        // Auto-reset: the returned observation is the fresh episode's.
        assert_eq!(batch.observations[slot], first[slot]);
    }

    assert!(matches!(
        pool.step_all(&[0]),
        Err(PoolError::ActionCount { .. })
    ));

    pool.close();

    // Each slot had its own connection and restarted twice on it.
    let received = engine.received();
    let connections: std::collections::BTreeSet<usize> =
        received.iter().map(|(conn, _)| *conn).collect();
    assert_eq!(connections.len(), n);
    for conn in connections {
        let restarts = received
            .iter()
            .filter(|(c, m)| *c == conn && matches!(m, ClientMessage::Restart { .. }))
            .count();
        assert_eq!(restarts, 2);
    }
}

#[test]
fn process_pool_auto_resets_finished_slots() {
    let engine = two_step_engine();
    let mut pool = EnvPool::spawn_processes(pool_config(&engine, 2)).unwrap();
    run_two_step_episode(&mut pool, &engine);
}

#[test]
fn thread_pool_auto_resets_finished_slots() {
    let engine = two_step_engine();
    let mut pool = EnvPool::spawn_threads(pool_config(&engine, 3)).unwrap();
    run_two_step_episode(&mut pool, &engine);
}

#[test]
fn unreachable_engine_is_a_worker_failure() {
    let config = PoolConfig {
        num_envs: 2,
        env: EnvConfig {
            uri: "tcp://127.0.0.1:1".to_string(),
            connect_timeout_ms: 200,
            ..EnvConfig::default()
        },
        reply_timeout: Duration::from_secs(10),
        ..PoolConfig::default()
    };
    let mut pool = EnvPool::spawn_threads(config).unwrap();
    match pool.reset_all() {
        Err(PoolError::WorkerFailed { slot: 0, kind, .. }) => assert_eq!(kind, "connection"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn slow_reply_fails_the_pool_instead_of_lagging_a_step() {
    let engine = spawn_engine(Framing::Lines, |msg, conn| match msg {
        ClientMessage::Restart { .. } => reply(&state(100.0, &[], false)),
        ClientMessage::Step { .. } if conn.steps_since_restart == 1 => {
            std::thread::sleep(Duration::from_millis(600));
            reply(&state(111.0, &[], false))
        }
        ClientMessage::Step { .. } => reply(&state(102.0, &[], false)),
        ClientMessage::BecomeSharedOwner => vec![],
    });
    let mut pool = EnvPool::spawn_threads(PoolConfig {
        reply_timeout: Duration::from_millis(200),
        ..pool_config(&engine, 1)
    })
    .unwrap();

    pool.reset_all().unwrap();
    assert!(matches!(
        pool.step_all(&[0]),
        Err(PoolError::Timeout { slot: 0, .. })
    ));

    // Give the late reply time to land in the slot's channel.
    std::thread::sleep(Duration::from_millis(800));
    assert!(matches!(
        pool.step_all(&[0]),
        Err(PoolError::OutOfSync { slot: 0 })
    ));
    assert!(matches!(
        pool.reset_all(),
        Err(PoolError::OutOfSync { slot: 0 })
    ));
    pool.close();
}

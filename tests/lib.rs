//! End-to-end scenarios spanning hashing, the worker pool and persistence,
//! per spec.md §8's literal scenarios. The Stratum handshake itself (no
//! reachable pool in CI) is covered in-crate by `coordinator::tests`.
use {
    soloctl::{config::Config, job::Job, pool::Pool, stats::Stats},
    std::{sync::mpsc, time::Duration},
};

fn maximal_target_job(id: &str) -> Job {
    Job {
        id: id.into(),
        prev_hash: "00".repeat(32),
        coinbase_prefix: "01020304".into(),
        coinbase_suffix: "05060708".into(),
        merkle_branch: Vec::new(),
        version: "00000002".into(),
        nbits: "207fffff".into(),
        ntime: "504e86b9".into(),
        clean_jobs: true,
    }
}

/// Scenario: a pool of workers against a trivially-satisfiable (regtest-like)
/// target must emit at least one share within a single batch, and the
/// aggregated pool hash count must advance.
#[test]
fn pool_emits_shares_against_a_maximal_target() {
    let pool = Pool::new();
    pool.set_stratum(vec![0xde, 0xad, 0xbe, 0xef], 4);

    let (tx, rx) = mpsc::channel();
    pool.set_share_callback(std::sync::Arc::new(move |share| {
        let _ = tx.send(share);
    }));

    pool.add(Some("w1".into()));
    pool.add(Some("w2".into()));
    pool.broadcast(maximal_target_job("job-regtest"));

    let share = rx.recv_timeout(Duration::from_secs(5)).expect("expected a share");
    assert_eq!(share.job_id, "job-regtest");
    assert_eq!(share.extranonce2.len(), 8);

    assert!(pool.total_hash_count() >= 1);
    pool.stop_all();
}

/// Scenario: replacing the current job (clean_jobs) is observed by every
/// worker on its next drain, without requiring the old job to complete.
#[test]
fn broadcasting_a_new_job_overwrites_every_worker_mailbox() {
    let pool = Pool::new();
    pool.set_stratum(vec![], 4);
    pool.add(None);
    pool.add(None);

    pool.broadcast(maximal_target_job("first"));
    pool.broadcast(maximal_target_job("second"));

    std::thread::sleep(Duration::from_millis(200));
    for worker in pool.list() {
        assert_eq!(worker.current_job_id(), Some("second".to_string()));
    }
    pool.stop_all();
}

/// Scenario: a worker added to a pool that already knows its stratum
/// session auto-starts and replays the last broadcast job.
#[test]
fn late_joining_worker_replays_the_last_job() {
    let pool = Pool::new();
    pool.set_stratum(vec![0x01], 4);
    pool.broadcast(maximal_target_job("existing"));

    let id = pool.add(None);
    std::thread::sleep(Duration::from_millis(200));

    let worker = pool.get(id).unwrap();
    assert!(worker.is_running());
    assert_eq!(worker.current_job_id(), Some("existing".to_string()));
    pool.stop_all();
}

/// Scenario: `stats.json` and `config.json` persist independently and
/// survive a reload of both, matching §6's persisted-document shape.
#[test]
fn stats_and_config_persist_independently_across_reload() {
    let dir = tempfile::tempdir().unwrap();

    let stats = Stats::new();
    stats.add_share(1, "job1".into(), 8.0, true);
    stats.add_block("job1".into(), 8.0);
    stats.save(dir.path(), 4_096).unwrap();

    let mut config = Config::load(dir.path());
    config.wallet_address = "bc1qexampleexampleexample".into();
    config.num_workers = 3;
    config.save(dir.path()).unwrap();

    let reloaded_stats = Stats::load(dir.path()).unwrap();
    assert_eq!(reloaded_stats.total_shares(), 1);
    assert_eq!(reloaded_stats.block_history(10).len(), 1);

    let reloaded_config = Config::load(dir.path());
    assert_eq!(reloaded_config.wallet_address, "bc1qexampleexampleexample");
    assert_eq!(reloaded_config.num_workers, 3);
}

/// Scenario: a malformed `stats.json` must never be silently replaced with
/// defaults (it would clobber recoverable data on the next save), whereas a
/// malformed `config.json` safely falls back since every field has a
/// default.
#[test]
fn malformed_stats_errors_but_malformed_config_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("stats.json"), "{ not valid json").unwrap();
    std::fs::write(dir.path().join("config.json"), "{ not valid json").unwrap();

    assert!(Stats::load(dir.path()).is_err());
    let config = Config::load(dir.path());
    assert_eq!(config.pool_port, 3333);
}

//! Coordinator (C6): wires the Stratum client to the worker pool and the
//! statistics collector under shared mutable state.
use {
    crate::{config::Config, job::Job, pool::Pool, stats::Stats},
    snafu::{ResultExt, Snafu},
    std::{
        str::FromStr,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    },
    stratum::{Client, ClientConfig, ClientError, ConnectionState, Event as StratumEvent, Extranonce, Nonce, Ntime},
    tokio::sync::broadcast,
    tracing::{info, warn},
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Snafu)]
pub enum CoordinatorError {
    #[snafu(display("wallet address is not configured"))]
    MissingWallet,
    #[snafu(display("stratum transport error: {source}"))]
    Transport { source: ClientError },
    #[snafu(display("timed out waiting for the pool to {step}"))]
    HandshakeTimeout { step: &'static str },
}

type Result<T, E = CoordinatorError> = std::result::Result<T, E>;

/// Observability events forwarded to the REST/WebSocket layer (C10).
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    Job(Job),
    Share {
        worker_id: u64,
        job_id: String,
        difficulty: f64,
        accepted: bool,
    },
    /// Solo mining has no pool-assigned vardiff layer (an explicit
    /// Non-goal): every emitted share already meets the network target, so
    /// every share is also a block solution, per the Glossary.
    Block {
        job_id: String,
        difficulty: f64,
    },
}

pub struct Coordinator {
    client: Client,
    pool: Arc<Pool>,
    stats: Arc<Stats>,
    config: Arc<parking_lot::Mutex<Config>>,
    running: Arc<AtomicBool>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl Coordinator {
    pub fn new(config: Config, stats: Arc<Stats>) -> Self {
        let client_config = ClientConfig {
            pool_url: config.pool_url.clone(),
            pool_port: config.pool_port,
            ..Default::default()
        };
        let (client, stratum_events) = Client::new(client_config);

        let pool = Arc::new(Pool::new());
        pool.set_cpu_percent(config.max_cpu_percent);

        let (events_tx, _) = broadcast::channel(256);
        let running = Arc::new(AtomicBool::new(false));

        spawn_job_forwarder(stratum_events, pool.clone(), events_tx.clone());

        Self {
            client,
            pool,
            stats,
            config: Arc::new(parking_lot::Mutex::new(config)),
            running,
            events: events_tx,
        }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn config(&self) -> Config {
        self.config.lock().clone()
    }

    pub fn update_config(&self, f: impl FnOnce(&mut Config)) {
        f(&mut self.config.lock());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn stratum_state(&self) -> ConnectionState {
        self.client.state().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    /// Connect, handshake and start the worker fleet, per §4.6.
    pub async fn start_mining(&self) -> Result<()> {
        let wallet = self.config().wallet_address;
        if wallet.is_empty() {
            return Err(CoordinatorError::MissingWallet);
        }

        let mut stratum_events = self.client.subscribe_events();

        if self.client.state().await == ConnectionState::Disconnected {
            self.client.connect().await.context(TransportSnafu)?;
        }

        self.client.subscribe().await.context(TransportSnafu)?;
        await_event(&mut stratum_events, HANDSHAKE_TIMEOUT, "subscribe", |event| {
            matches!(event, StratumEvent::Subscribed { .. })
        })
        .await?;

        self.client.authorize(&wallet, "x").await.context(TransportSnafu)?;
        await_event(&mut stratum_events, HANDSHAKE_TIMEOUT, "authorize", |event| {
            matches!(event, StratumEvent::Authorized(true))
        })
        .await?;

        let (extranonce1, extranonce2_size) = self
            .client
            .extranonce()
            .await
            .expect("extranonce is set once Subscribed has been observed");
        self.pool.set_stratum(extranonce1.as_bytes().to_vec(), extranonce2_size);

        self.wire_share_callback(wallet);

        if self.pool.count() == 0 {
            let num_workers = self.config().num_workers.max(1);
            for _ in 0..num_workers {
                self.pool.add(None);
            }
        }

        self.pool.start_all();

        if let Some(job) = self.client.current_job().await {
            self.pool.broadcast(Job::from(job));
        }

        self.stats.begin_session();
        self.running.store(true, Ordering::Release);
        info!("mining started");
        Ok(())
    }

    pub async fn stop_mining(&self) -> Result<()> {
        self.pool.stop_all();
        self.client.close().await.context(TransportSnafu)?;
        self.stats.end_session();
        self.running.store(false, Ordering::Release);
        info!("mining stopped");
        Ok(())
    }

    fn wire_share_callback(&self, wallet: String) {
        let client = self.client.clone();
        let stats = self.stats.clone();
        let events = self.events.clone();
        let handle = tokio::runtime::Handle::current();

        self.pool.set_share_callback(Arc::new(move |share| {
            stats.add_share(share.worker_id, share.job_id.clone(), share.difficulty, true);
            stats.add_block(share.job_id.clone(), share.difficulty);

            let _ = events.send(CoordinatorEvent::Share {
                worker_id: share.worker_id,
                job_id: share.job_id.clone(),
                difficulty: share.difficulty,
                accepted: true,
            });
            let _ = events.send(CoordinatorEvent::Block {
                job_id: share.job_id.clone(),
                difficulty: share.difficulty,
            });

            let client = client.clone();
            let wallet = wallet.clone();
            handle.spawn(async move {
                let Ok(extranonce2) = Extranonce::from_hex(&share.extranonce2) else {
                    warn!(extranonce2 = share.extranonce2, "malformed share extranonce2");
                    return;
                };
                let Ok(ntime) = Ntime::from_str(&share.ntime) else {
                    warn!(ntime = share.ntime, "malformed share ntime");
                    return;
                };
                let Ok(nonce) = Nonce::from_str(&share.nonce) else {
                    warn!(nonce = share.nonce, "malformed share nonce");
                    return;
                };

                if let Err(error) = client
                    .submit(&wallet, &share.job_id, &extranonce2, ntime, nonce)
                    .await
                {
                    warn!(%error, "failed to submit share");
                }
            });
        }));
    }
}

fn spawn_job_forwarder(
    mut stratum_events: stratum::EventReceiver,
    pool: Arc<Pool>,
    events: broadcast::Sender<CoordinatorEvent>,
) {
    tokio::spawn(async move {
        loop {
            match stratum_events.recv().await {
                Ok(StratumEvent::Job(notify)) => {
                    let job = Job::from(notify);
                    pool.broadcast(job.clone());
                    let _ = events.send(CoordinatorEvent::Job(job));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn await_event(
    events: &mut stratum::EventReceiver,
    timeout: Duration,
    step: &'static str,
    matches: impl Fn(&StratumEvent) -> bool,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(CoordinatorError::HandshakeTimeout { step });
        }

        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) if matches(&event) => return Ok(()),
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                return Err(CoordinatorError::HandshakeTimeout { step });
            }
            Err(_) => return Err(CoordinatorError::HandshakeTimeout { step }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_mining_without_wallet_is_an_error() {
        let config = Config {
            wallet_address: String::new(),
            ..Config::default()
        };
        let coordinator = Coordinator::new(config, Arc::new(Stats::new()));
        let result = coordinator.start_mining().await;
        assert!(matches!(result, Err(CoordinatorError::MissingWallet)));
    }

    #[tokio::test]
    async fn start_mining_without_a_reachable_pool_times_out_or_errors() {
        let config = Config {
            wallet_address: "bc1qexample".into(),
            pool_url: "127.0.0.1".into(),
            pool_port: 1, // nothing listens here
            ..Config::default()
        };
        let coordinator = Coordinator::new(config, Arc::new(Stats::new()));
        let result = coordinator.start_mining().await;
        assert!(result.is_err());
    }
}

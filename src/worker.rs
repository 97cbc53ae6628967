//! Worker (C3): one hashing thread. Owns a current job snapshot and an
//! extranonce2, searches nonces, and emits shares through a callback.
use {
    crate::{
        hash,
        header::{self, HeaderPrefix},
        job::Job,
    },
    rand::Rng,
    std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        },
        thread::{self, JoinHandle},
        time::{Duration, Instant},
    },
    tracing::{debug, trace},
};

/// Attempts per batch, per §4.3's `B ≈ 1000`.
const BATCH_SIZE: u32 = 1000;

/// Produced when a candidate header hash meets the network target.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareEvent {
    pub worker_id: u64,
    pub job_id: String,
    pub extranonce2: String,
    pub ntime: String,
    pub nonce: String,
    pub difficulty: f64,
}

pub type ShareCallback = Arc<dyn Fn(ShareEvent) + Send + Sync>;

struct Inner {
    id: u64,
    name: Mutex<String>,
    running: AtomicBool,
    hash_count: AtomicU64,
    start_instant: Mutex<Option<Instant>>,
    cpu_percent: AtomicU8,
    extranonce1: Mutex<Vec<u8>>,
    extranonce2_size: Mutex<usize>,
    extranonce2: Mutex<Vec<u8>>,
    mailbox: Mutex<Option<Job>>,
    current_job: Mutex<Option<Job>>,
    share_callback: Mutex<Option<ShareCallback>>,
}

/// A single hashing worker. Cheap to clone; clones share the same
/// background thread and counters.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Worker {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                name: Mutex::new(name.into()),
                running: AtomicBool::new(false),
                hash_count: AtomicU64::new(0),
                start_instant: Mutex::new(None),
                cpu_percent: AtomicU8::new(100),
                extranonce1: Mutex::new(Vec::new()),
                extranonce2_size: Mutex::new(0),
                extranonce2: Mutex::new(Vec::new()),
                mailbox: Mutex::new(None),
                current_job: Mutex::new(None),
                share_callback: Mutex::new(None),
            }),
            thread: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> String {
        self.inner.name.lock().unwrap().clone()
    }

    pub fn set_share_callback(&self, callback: ShareCallback) {
        *self.inner.share_callback.lock().unwrap() = Some(callback);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Transitions stopped -> running. Idempotent: a second call while
    /// already running is a no-op.
    pub fn start(&self, extranonce1: &[u8], extranonce2_size: usize) {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        *self.inner.extranonce1.lock().unwrap() = extranonce1.to_vec();
        *self.inner.extranonce2_size.lock().unwrap() = extranonce2_size;
        *self.inner.extranonce2.lock().unwrap() = random_bytes(extranonce2_size);
        *self.inner.start_instant.lock().unwrap() = Some(Instant::now());

        let inner = self.inner.clone();
        let handle = thread::Builder::new()
            .name(format!("worker-{}", inner.id))
            .spawn(move || run(inner))
            .expect("failed to spawn worker thread");

        *self.thread.lock().unwrap() = Some(handle);
        debug!(worker_id = self.inner.id, "worker started");
    }

    /// Cooperative termination: the worker completes at most one more
    /// batch. Idempotent.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
    }

    /// Lossy-latest delivery: this single-slot mailbox (capacity 1, which
    /// satisfies the spec's "depth >= 1") is overwritten unconditionally,
    /// so the next drain always observes the most recently delivered job.
    pub fn update_job(&self, job: Job) {
        *self.inner.mailbox.lock().unwrap() = Some(job);
    }

    pub fn set_cpu_percent(&self, percent: u8) {
        self.inner.cpu_percent.store(percent.clamp(1, 100), Ordering::Relaxed);
    }

    pub fn cpu_percent(&self) -> u8 {
        self.inner.cpu_percent.load(Ordering::Relaxed)
    }

    pub fn hash_count(&self) -> u64 {
        self.inner.hash_count.load(Ordering::Relaxed)
    }

    pub fn hashrate(&self) -> f64 {
        let Some(start) = *self.inner.start_instant.lock().unwrap() else {
            return 0.0;
        };
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            self.hash_count() as f64 / elapsed
        }
    }

    pub fn current_job_id(&self) -> Option<String> {
        self.inner.current_job.lock().unwrap().as_ref().map(|j| j.id.clone())
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(bytes.as_mut_slice());
    bytes
}

fn run(inner: Arc<Inner>) {
    while inner.running.load(Ordering::Acquire) {
        if let Some(job) = inner.mailbox.lock().unwrap().take() {
            let size = *inner.extranonce2_size.lock().unwrap();
            *inner.extranonce2.lock().unwrap() = random_bytes(size);
            *inner.current_job.lock().unwrap() = Some(job);
        }

        let job = inner.current_job.lock().unwrap().clone();
        let Some(job) = job else {
            thread::sleep(Duration::from_millis(100));
            continue;
        };

        let extranonce1 = inner.extranonce1.lock().unwrap().clone();
        let extranonce2 = inner.extranonce2.lock().unwrap().clone();

        let prefix = match header::build_header(&job, &extranonce1, &extranonce2) {
            Ok(prefix) => prefix,
            Err(error) => {
                trace!(worker_id = inner.id, %error, "failed to build header, retrying");
                thread::sleep(Duration::from_millis(100));
                continue;
            }
        };

        let Ok(nbits_bytes) = hex::decode(&job.nbits) else {
            thread::sleep(Duration::from_millis(100));
            continue;
        };
        let target = hash::decode_compact_target(&nbits_bytes);

        if let Some(share) = search_batch(&inner, &prefix, target, &job.id, &job.ntime, &extranonce2) {
            if let Some(callback) = inner.share_callback.lock().unwrap().as_ref() {
                callback(share);
            }
        }

        throttle(inner.cpu_percent.load(Ordering::Relaxed));
    }
}

fn search_batch(
    inner: &Inner,
    prefix: &HeaderPrefix,
    target: primitive_types::U256,
    job_id: &str,
    ntime: &str,
    extranonce2: &[u8],
) -> Option<ShareEvent> {
    let mut rng = rand::rng();

    for _ in 0..BATCH_SIZE {
        let nonce: u32 = rng.random();
        let header = prefix.with_nonce(nonce);
        let digest = hash::double_sha256(&header);
        inner.hash_count.fetch_add(1, Ordering::Relaxed);

        let int_hash = hash::hash_to_target_int(&digest);

        if int_hash <= target {
            let difficulty = hash::difficulty(int_hash);
            return Some(ShareEvent {
                worker_id: inner.id,
                job_id: job_id.to_string(),
                extranonce2: hex::encode(extranonce2),
                ntime: ntime.to_string(),
                nonce: format!("{nonce:08x}"),
                difficulty,
            });
        }
    }

    None
}

fn throttle(cpu_percent: u8) {
    let cpu_percent = cpu_percent.clamp(1, 100) as u64;
    let sleep_us = (100u64.saturating_sub(cpu_percent)) * 10;
    if sleep_us > 0 {
        thread::sleep(Duration::from_micros(sleep_us));
    }
}

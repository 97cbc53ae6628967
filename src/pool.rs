//! Worker pool (C4): owns the set of hashing workers, fans jobs out to them,
//! and aggregates their hashrate/hash-count.
use {
    crate::{
        job::Job,
        worker::{ShareCallback, Worker},
    },
    dashmap::DashMap,
    parking_lot::Mutex,
    std::sync::{
        Arc,
        atomic::{AtomicU64, AtomicU8, Ordering},
    },
    tracing::info,
};

struct StratumInfo {
    extranonce1: Vec<u8>,
    extranonce2_size: usize,
}

/// The set of hashing workers for a single mining session.
pub struct Pool {
    workers: DashMap<u64, Worker>,
    next_id: AtomicU64,
    cpu_percent: AtomicU8,
    stratum: Mutex<Option<StratumInfo>>,
    share_callback: Mutex<Option<ShareCallback>>,
    last_job: Mutex<Option<Job>>,
}

impl Pool {
    pub fn new() -> Self {
        Self {
            workers: DashMap::new(),
            next_id: AtomicU64::new(1),
            cpu_percent: AtomicU8::new(100),
            stratum: Mutex::new(None),
            share_callback: Mutex::new(None),
            last_job: Mutex::new(None),
        }
    }

    /// Adds a worker, auto-starting it if the extranonce pair is already
    /// known. Returns the new worker's id.
    pub fn add(&self, name: Option<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::new(id, name.unwrap_or_else(|| format!("worker-{id}")));
        worker.set_cpu_percent(self.cpu_percent.load(Ordering::Relaxed));

        if let Some(callback) = self.share_callback.lock().clone() {
            worker.set_share_callback(callback);
        }

        if let Some(stratum) = self.stratum.lock().as_ref() {
            worker.start(&stratum.extranonce1, stratum.extranonce2_size);
            if let Some(job) = self.last_job.lock().clone() {
                worker.update_job(job);
            }
        }

        self.workers.insert(id, worker);
        info!(worker_id = id, "worker added");
        id
    }

    /// Stops and removes a worker. Returns `false` if it did not exist.
    pub fn remove(&self, id: u64) -> bool {
        if let Some((_, worker)) = self.workers.remove(&id) {
            worker.stop();
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: u64) -> Option<Worker> {
        self.workers.get(&id).map(|entry| entry.clone())
    }

    pub fn list(&self) -> Vec<Worker> {
        self.workers.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.workers.len()
    }

    /// Records the extranonce pair assigned by the pool so that workers
    /// added afterward auto-start with it.
    pub fn set_stratum(&self, extranonce1: Vec<u8>, extranonce2_size: usize) {
        *self.stratum.lock() = Some(StratumInfo {
            extranonce1,
            extranonce2_size,
        });
    }

    pub fn set_share_callback(&self, callback: ShareCallback) {
        *self.share_callback.lock() = Some(callback.clone());
        for worker in self.list() {
            worker.set_share_callback(callback.clone());
        }
    }

    pub fn start_all(&self) {
        let Some(stratum) = self.stratum.lock().as_ref().map(|s| (s.extranonce1.clone(), s.extranonce2_size)) else {
            return;
        };
        for worker in self.list() {
            worker.start(&stratum.0, stratum.1);
        }
    }

    pub fn stop_all(&self) {
        for worker in self.list() {
            worker.stop();
        }
    }

    /// Non-blocking fan-out of a new job to every worker.
    pub fn broadcast(&self, job: Job) {
        *self.last_job.lock() = Some(job.clone());
        for worker in self.list() {
            worker.update_job(job.clone());
        }
    }

    pub fn set_cpu_percent(&self, percent: u8) {
        let percent = percent.clamp(1, 100);
        self.cpu_percent.store(percent, Ordering::Relaxed);
        for worker in self.list() {
            worker.set_cpu_percent(percent);
        }
    }

    pub fn total_hashrate(&self) -> f64 {
        self.list().iter().map(Worker::hashrate).sum()
    }

    pub fn total_hash_count(&self) -> u64 {
        self.list().iter().map(Worker::hash_count).sum()
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn add_allocates_sequential_ids_starting_at_one() {
        let pool = Pool::new();
        assert_eq!(pool.add(None), 1);
        assert_eq!(pool.add(None), 2);
        assert_eq!(pool.count(), 2);
    }

    #[test]
    fn remove_stops_and_drops_the_worker() {
        let pool = Pool::new();
        let id = pool.add(None);
        assert!(pool.remove(id));
        assert!(pool.get(id).is_none());
        assert!(!pool.remove(id));
    }

    #[test]
    fn new_workers_do_not_auto_start_without_stratum_info() {
        let pool = Pool::new();
        let id = pool.add(None);
        assert!(!pool.get(id).unwrap().is_running());
    }

    #[test]
    fn new_workers_auto_start_once_stratum_is_known() {
        let pool = Pool::new();
        pool.set_stratum(vec![0xaa, 0xbb], 4);
        let id = pool.add(None);
        assert!(pool.get(id).unwrap().is_running());
        pool.stop_all();
    }

    #[test]
    fn set_cpu_percent_forwards_to_existing_workers() {
        let pool = Pool::new();
        let id = pool.add(None);
        pool.set_cpu_percent(42);
        assert_eq!(pool.get(id).unwrap().cpu_percent(), 42);
    }

    #[test]
    fn broadcast_reaches_every_worker() {
        let pool = Pool::new();
        pool.set_stratum(vec![], 4);
        pool.add(None);
        pool.add(None);

        let job = Job {
            id: "j1".into(),
            prev_hash: "00".repeat(32),
            coinbase_prefix: "".into(),
            coinbase_suffix: "".into(),
            merkle_branch: Vec::new(),
            version: "00000002".into(),
            nbits: "1d00ffff".into(),
            ntime: "504e86b9".into(),
            clean_jobs: false,
        };
        pool.broadcast(job.clone());

        for worker in pool.list() {
            assert_eq!(worker.current_job_id(), None); // not yet drained by the worker thread
        }
        pool.stop_all();
    }

    #[test]
    fn share_callback_is_forwarded_to_new_and_existing_workers() {
        let pool = Pool::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = pool.add(None);

        let count_clone = count.clone();
        pool.set_share_callback(Arc::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(pool.get(id).is_some());
        let id2 = pool.add(None);
        assert!(pool.get(id2).is_some());
    }
}

//! Statistics collector (C7): counters, bounded histories and `stats.json`
//! persistence, per §3/§8 and SPEC_FULL.md §4.7.
use {
    parking_lot::Mutex,
    serde::{Deserialize, Serialize},
    snafu::{ResultExt, Snafu},
    std::{
        collections::VecDeque,
        path::Path,
        time::{Instant, SystemTime, UNIX_EPOCH},
    },
};

const DEFAULT_HISTORY_CAP: usize = 1000;
const DEFAULT_SESSION_CAP: usize = 50;
const STATS_FILE: &str = "stats.json";

#[derive(Debug, Snafu)]
pub enum StatsError {
    #[snafu(display("failed to read {path}: {source}"))]
    Read { path: String, source: std::io::Error },
    #[snafu(display("failed to parse {path}: {source}"))]
    Parse { path: String, source: serde_json::Error },
    #[snafu(display("failed to write {path}: {source}"))]
    Write { path: String, source: std::io::Error },
    #[snafu(display("failed to serialize stats: {source}"))]
    Serialize { source: serde_json::Error },
}

type Result<T, E = StatsError> = std::result::Result<T, E>;

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShareEntry {
    pub timestamp: u64,
    pub worker_id: u64,
    pub job_id: String,
    pub difficulty: f64,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockEntry {
    pub timestamp: u64,
    pub job_id: String,
    pub difficulty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEntry {
    pub started_at: u64,
    pub ended_at: Option<u64>,
}

/// The document persisted to `stats.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub total_hashes: u64,
    pub total_shares: u64,
    pub accepted_shares: u64,
    pub rejected_shares: u64,
    pub best_difficulty: f64,
    pub total_mining_seconds: u64,
    pub share_history: Vec<ShareEntry>,
    pub block_history: Vec<BlockEntry>,
    pub session_history: Vec<SessionEntry>,
    pub last_saved: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            total_hashes: 0,
            total_shares: 0,
            accepted_shares: 0,
            rejected_shares: 0,
            best_difficulty: 0.0,
            total_mining_seconds: 0,
            share_history: Vec::new(),
            block_history: Vec::new(),
            session_history: Vec::new(),
            last_saved: 0,
        }
    }
}

struct State {
    total_shares: u64,
    accepted_shares: u64,
    rejected_shares: u64,
    best_difficulty: f64,
    total_mining_seconds: u64,
    mining_since: Option<Instant>,
    share_history: VecDeque<ShareEntry>,
    block_history: VecDeque<BlockEntry>,
    session_history: VecDeque<SessionEntry>,
}

/// Counters and bounded histories accumulated across the coordinator's
/// lifetime. `total_hashes` is not tracked here: it is derived from the
/// worker pool at snapshot time, since the pool's per-worker atomics are the
/// authoritative source.
pub struct Stats {
    state: Mutex<State>,
    history_cap: usize,
    session_cap: usize,
}

impl Stats {
    pub fn new() -> Self {
        Self::with_caps(DEFAULT_HISTORY_CAP, DEFAULT_SESSION_CAP)
    }

    pub fn with_caps(history_cap: usize, session_cap: usize) -> Self {
        Self {
            state: Mutex::new(State {
                total_shares: 0,
                accepted_shares: 0,
                rejected_shares: 0,
                best_difficulty: 0.0,
                total_mining_seconds: 0,
                mining_since: None,
                share_history: VecDeque::new(),
                block_history: VecDeque::new(),
                session_history: VecDeque::new(),
            }),
            history_cap,
            session_cap,
        }
    }

    /// Best-effort load: a missing file yields defaults; a malformed file is
    /// an error surfaced to the caller so the on-disk data is never
    /// clobbered by a silently-reset `Stats`.
    pub fn load(stats_dir: &Path) -> Result<Self> {
        let path = stats_dir.join(STATS_FILE);
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<Snapshot>(&contents).context(ParseSnafu {
                path: path.display().to_string(),
            })?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(source) => {
                return Err(StatsError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let stats = Self::with_caps(DEFAULT_HISTORY_CAP, DEFAULT_SESSION_CAP);
        {
            let mut state = stats.state.lock();
            state.total_shares = snapshot.total_shares;
            state.accepted_shares = snapshot.accepted_shares;
            state.rejected_shares = snapshot.rejected_shares;
            state.best_difficulty = snapshot.best_difficulty;
            state.total_mining_seconds = snapshot.total_mining_seconds;
            state.share_history = snapshot.share_history.into();
            state.block_history = snapshot.block_history.into();
            state.session_history = snapshot.session_history.into();
        }
        Ok(stats)
    }

    /// Writes `stats.json` atomically (temp file + rename).
    pub fn save(&self, stats_dir: &Path, total_hashes: u64) -> Result<()> {
        let snapshot = self.snapshot(total_hashes);
        let contents = serde_json::to_string_pretty(&snapshot).context(SerializeSnafu)?;

        std::fs::create_dir_all(stats_dir).context(WriteSnafu {
            path: stats_dir.display().to_string(),
        })?;

        let path = stats_dir.join(STATS_FILE);
        let tmp_path = stats_dir.join(format!("{STATS_FILE}.tmp"));
        std::fs::write(&tmp_path, contents).context(WriteSnafu {
            path: tmp_path.display().to_string(),
        })?;
        std::fs::rename(&tmp_path, &path).context(WriteSnafu {
            path: path.display().to_string(),
        })?;
        Ok(())
    }

    pub fn snapshot(&self, total_hashes: u64) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            total_hashes,
            total_shares: state.total_shares,
            accepted_shares: state.accepted_shares,
            rejected_shares: state.rejected_shares,
            best_difficulty: state.best_difficulty,
            total_mining_seconds: state.total_mining_seconds + mining_elapsed(&state),
            share_history: state.share_history.iter().cloned().collect(),
            block_history: state.block_history.iter().cloned().collect(),
            session_history: state.session_history.iter().cloned().collect(),
            last_saved: unix_timestamp(),
        }
    }

    /// Records an emitted share. `accepted` is provisional at emission time
    /// per spec.md §9's resolved Open Question (see DESIGN.md); the
    /// coordinator does not await the pool's submit acknowledgement before
    /// calling this.
    pub fn add_share(&self, worker_id: u64, job_id: String, difficulty: f64, accepted: bool) {
        let mut state = self.state.lock();
        state.total_shares += 1;
        if accepted {
            state.accepted_shares += 1;
        } else {
            state.rejected_shares += 1;
        }
        if difficulty > state.best_difficulty {
            state.best_difficulty = difficulty;
        }

        push_bounded(
            &mut state.share_history,
            ShareEntry {
                timestamp: unix_timestamp(),
                worker_id,
                job_id,
                difficulty,
                accepted,
            },
            self.history_cap,
        );
    }

    pub fn add_block(&self, job_id: String, difficulty: f64) {
        let mut state = self.state.lock();
        push_bounded(
            &mut state.block_history,
            BlockEntry {
                timestamp: unix_timestamp(),
                job_id,
                difficulty,
            },
            self.history_cap,
        );
    }

    /// Opens a new mining session; call on `start_mining`.
    pub fn begin_session(&self) {
        let mut state = self.state.lock();
        state.mining_since = Some(Instant::now());
        push_bounded(
            &mut state.session_history,
            SessionEntry {
                started_at: unix_timestamp(),
                ended_at: None,
            },
            self.session_cap,
        );
    }

    /// Closes the current session and folds its elapsed time into the
    /// accumulated total; call on `stop_mining`.
    pub fn end_session(&self) {
        let mut state = self.state.lock();
        let elapsed = mining_elapsed(&state);
        state.total_mining_seconds += elapsed;
        state.mining_since = None;
        if let Some(last) = state.session_history.back_mut() {
            if last.ended_at.is_none() {
                last.ended_at = Some(unix_timestamp());
            }
        }
    }

    pub fn total_shares(&self) -> u64 {
        self.state.lock().total_shares
    }

    pub fn accepted_shares(&self) -> u64 {
        self.state.lock().accepted_shares
    }

    pub fn rejected_shares(&self) -> u64 {
        self.state.lock().rejected_shares
    }

    pub fn best_difficulty(&self) -> f64 {
        self.state.lock().best_difficulty
    }

    pub fn share_history(&self, limit: usize) -> Vec<ShareEntry> {
        let state = self.state.lock();
        state.share_history.iter().rev().take(limit).cloned().collect()
    }

    pub fn block_history(&self, limit: usize) -> Vec<BlockEntry> {
        let state = self.state.lock();
        state.block_history.iter().rev().take(limit).cloned().collect()
    }

    pub fn session_history(&self, limit: usize) -> Vec<SessionEntry> {
        let state = self.state.lock();
        state.session_history.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

fn mining_elapsed(state: &State) -> u64 {
    state
        .mining_since
        .map(|since| since.elapsed().as_secs())
        .unwrap_or(0)
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, cap: usize) {
    if queue.len() >= cap {
        queue.pop_front();
    }
    queue.push_back(item);
}

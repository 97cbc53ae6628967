//! The domain `Job` (C2 data model): the normalized form of a pool's
//! `mining.notify`, decoupled from the wire codec in the `stratum` crate.
use stratum::Notify;

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub prev_hash: String,
    pub coinbase_prefix: String,
    pub coinbase_suffix: String,
    pub merkle_branch: Vec<String>,
    pub version: String,
    pub nbits: String,
    pub ntime: String,
    pub clean_jobs: bool,
}

impl From<Notify> for Job {
    fn from(notify: Notify) -> Self {
        Self {
            id: notify.job_id,
            prev_hash: notify.prevhash,
            coinbase_prefix: notify.coinb1,
            coinbase_suffix: notify.coinb2,
            merkle_branch: notify.merkle_branch,
            version: notify.version,
            nbits: notify.nbits.to_string(),
            ntime: notify.ntime.to_string(),
            clean_jobs: notify.clean_jobs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_notify_preserves_fields() {
        let notify = Notify {
            job_id: "jobA".into(),
            prevhash: "ab".repeat(32),
            coinb1: "01".into(),
            coinb2: "02".into(),
            merkle_branch: vec!["cd".repeat(32)],
            version: "00000002".into(),
            nbits: "1d00ffff".parse().unwrap(),
            ntime: "504e86b9".parse().unwrap(),
            clean_jobs: true,
        };

        let job: Job = notify.into();
        assert_eq!(job.id, "jobA");
        assert_eq!(job.nbits, "1d00ffff");
        assert_eq!(job.ntime, "504e86b9");
        assert!(job.clean_jobs);
        assert_eq!(job.merkle_branch.len(), 1);
    }
}

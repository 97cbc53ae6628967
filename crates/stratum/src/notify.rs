use super::*;

/// The wire shape of `mining.notify`'s `params`: a 9-element JSON array.
/// Hex-blob fields (`prevhash`, `coinb1`, `coinb2`, `version`, the Merkle
/// branch) are kept as plain strings here — they pass through the wire
/// codec verbatim and are only decoded once, in the header builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Notify {
    pub job_id: String,
    pub prevhash: String,
    pub coinb1: String,
    pub coinb2: String,
    pub merkle_branch: Vec<String>,
    pub version: String,
    pub nbits: Nbits,
    pub ntime: Ntime,
    pub clean_jobs: bool,
}

impl Serialize for Notify {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(9))?;
        seq.serialize_element(&self.job_id)?;
        seq.serialize_element(&self.prevhash)?;
        seq.serialize_element(&self.coinb1)?;
        seq.serialize_element(&self.coinb2)?;
        seq.serialize_element(&self.merkle_branch)?;
        seq.serialize_element(&self.version)?;
        seq.serialize_element(&self.nbits)?;
        seq.serialize_element(&self.ntime)?;
        seq.serialize_element(&self.clean_jobs)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Notify {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (job_id, prevhash, coinb1, coinb2, merkle_branch, version, nbits, ntime, clean_jobs) =
            <(
                String,
                String,
                String,
                String,
                Vec<String>,
                String,
                Nbits,
                Ntime,
                bool,
            )>::deserialize(deserializer)?;

        Ok(Notify {
            job_id,
            prevhash,
            coinb1,
            coinb2,
            merkle_branch,
            version,
            nbits,
            ntime,
            clean_jobs,
        })
    }
}

impl Notify {
    /// Parses `mining.notify`'s `params` array; returns `None` if it has
    /// fewer than 9 elements, per the spec's "drop silently" rule.
    pub fn from_params(params: &Value) -> Option<Self> {
        if params.as_array().map(|a| a.len()).unwrap_or(0) < 9 {
            return None;
        }
        serde_json::from_value(params.clone()).ok()
    }
}

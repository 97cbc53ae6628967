//! Configuration (C8, added): a small JSON blob loaded at startup and
//! updated on mutation, per SPEC_FULL.md §4.8.
use {
    serde::{Deserialize, Serialize},
    snafu::{ResultExt, Snafu},
    std::path::{Path, PathBuf},
    tracing::warn,
};

const CONFIG_FILE: &str = "config.json";
const DEFAULT_POOL_URL: &str = "solo.ckpool.org";
const DEFAULT_POOL_PORT: u16 = 3333;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("failed to write {path}: {source}"))]
    Write { path: String, source: std::io::Error },
    #[snafu(display("failed to serialize config: {source}"))]
    Serialize { source: serde_json::Error },
}

type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub pool_url: String,
    pub pool_port: u16,
    pub wallet_address: String,
    pub max_cpu_percent: u8,
    pub num_workers: usize,
    pub stats_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_url: DEFAULT_POOL_URL.to_string(),
            pool_port: DEFAULT_POOL_PORT,
            wallet_address: String::new(),
            max_cpu_percent: 100,
            num_workers: default_num_workers(),
            stats_dir: default_stats_dir(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Best-effort load: a missing file yields defaults, and a malformed
    /// file logs a warning and falls back to defaults rather than failing
    /// startup, since every field has a safe default.
    pub fn load(stats_dir: &Path) -> Self {
        let path = stats_dir.join(CONFIG_FILE);

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(error) => {
                    warn!(path = %path.display(), %error, "malformed config, falling back to defaults");
                    Self::default_with_stats_dir(stats_dir)
                }
            },
            Err(_) => Self::default_with_stats_dir(stats_dir),
        }
    }

    fn default_with_stats_dir(stats_dir: &Path) -> Self {
        Self {
            stats_dir: stats_dir.to_path_buf(),
            ..Default::default()
        }
    }

    /// Writes `config.json` atomically (temp file + rename).
    pub fn save(&self, stats_dir: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context(SerializeSnafu)?;

        std::fs::create_dir_all(stats_dir).context(WriteSnafu {
            path: stats_dir.display().to_string(),
        })?;

        let path = stats_dir.join(CONFIG_FILE);
        let tmp_path = stats_dir.join(format!("{CONFIG_FILE}.tmp"));
        std::fs::write(&tmp_path, contents).context(WriteSnafu {
            path: tmp_path.display().to_string(),
        })?;
        std::fs::rename(&tmp_path, &path).context(WriteSnafu {
            path: path.display().to_string(),
        })?;
        Ok(())
    }
}

fn default_num_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn default_stats_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(std::env::temp_dir).join("soloctl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path());
        assert_eq!(config.pool_url, DEFAULT_POOL_URL);
        assert_eq!(config.pool_port, DEFAULT_POOL_PORT);
        assert_eq!(config.stats_dir, dir.path());
    }

    #[test]
    fn load_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        let config = Config::load(dir.path());
        assert_eq!(config.pool_url, DEFAULT_POOL_URL);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load(dir.path());
        config.wallet_address = "bc1qexample".to_string();
        config.max_cpu_percent = 42;
        config.save(dir.path()).unwrap();

        let reloaded = Config::load(dir.path());
        assert_eq!(reloaded.wallet_address, "bc1qexample");
        assert_eq!(reloaded.max_cpu_percent, 42);
    }
}

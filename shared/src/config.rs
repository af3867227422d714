use tracing::warn;

pub struct Config {
    pub data_dir: String,
    pub deploy_version: String,
    pub memory_max_entries: u64,
}

impl Config {
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_DEPLOY_VERSION: &str = "dev";
    const DEFAULT_MEMORY_MAX_ENTRIES: u64 = 10_000;

    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("STRATA_DATA_DIR")
                .unwrap_or_else(|_| Self::DEFAULT_DATA_DIR.to_string()),
            deploy_version: std::env::var("STRATA_DEPLOY_VERSION").unwrap_or_else(|_| {
                warn!(
                    "STRATA_DEPLOY_VERSION not set, namespacing cache entries under '{}'",
                    Self::DEFAULT_DEPLOY_VERSION
                );
                Self::DEFAULT_DEPLOY_VERSION.to_string()
            }),
            memory_max_entries: std::env::var("STRATA_MEMORY_MAX_ENTRIES")
                .unwrap_or_else(|_| Self::DEFAULT_MEMORY_MAX_ENTRIES.to_string())
                .parse::<u64>()
                .unwrap_or(Self::DEFAULT_MEMORY_MAX_ENTRIES),
        }
    }
}

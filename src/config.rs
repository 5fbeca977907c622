use std::path::PathBuf;

use anyhow::bail;

pub const DEFAULT_LOG_FILTER: &str = "campus_attendance=info";

/// Where records are read from and written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    File(PathBuf),
    Postgres { url: String, max_connections: u32 },
}

impl StoreConfig {
    /// A snapshot file takes precedence over a database URL.
    pub fn resolve(
        snapshot: Option<PathBuf>,
        database_url: Option<String>,
        max_connections: u32,
    ) -> anyhow::Result<Self> {
        if let Some(path) = snapshot {
            return Ok(StoreConfig::File(path));
        }
        match database_url.filter(|url| !url.trim().is_empty()) {
            Some(url) => Ok(StoreConfig::Postgres {
                url,
                max_connections: max_connections.max(1),
            }),
            None => bail!("set --snapshot/CAMPUS_SNAPSHOT or --database-url/DATABASE_URL"),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            StoreConfig::File(path) => format!("snapshot file {}", path.display()),
            StoreConfig::Postgres { .. } => "postgres".to_string(),
        }
    }
}

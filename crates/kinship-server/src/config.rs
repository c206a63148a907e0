use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use kinship_core::IdPolicy;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub id_policy: IdPolicy,
    /// Directory for daily-rolling log files; stdout when unset.
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let raw = lookup("KINSHIP_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen: SocketAddr = raw
            .parse()
            .with_context(|| format!("invalid KINSHIP_LISTEN '{raw}'"))?;

        let id_policy = match lookup("KINSHIP_ID_POLICY") {
            Some(v) => v
                .parse::<IdPolicy>()
                .with_context(|| format!("invalid KINSHIP_ID_POLICY '{v}'"))?,
            None => IdPolicy::default(),
        };

        let log_dir = lookup("KINSHIP_LOG_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            listen,
            id_policy,
            log_dir,
        })
    }
}

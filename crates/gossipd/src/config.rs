//! Configuration for gossipd

use clap::Parser;
use scuttle_core::{DeltaOrdering, HistoryRetention, HostConfig, Value};
use std::net::SocketAddr;
use std::time::Duration;

/// gossipd - Scuttlebutt anti-entropy gossip daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "gossipd")]
#[command(about = "Scuttlebutt reconciliation daemon for a small key/value state")]
pub struct Config {
    /// Participant id of this node
    #[arg(long, env = "GOSSIPD_ID")]
    pub id: String,

    /// Listen address for inbound gossip connections
    #[arg(short, long, default_value = "0.0.0.0:9200")]
    pub listen: SocketAddr,

    /// Peers to gossip with (comma-separated addresses)
    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<SocketAddr>,

    /// Delta ordering (breadth or depth)
    #[arg(long, default_value = "depth")]
    pub ordering: DeltaOrdering,

    /// Seconds between digest rounds on each peer connection
    #[arg(long, default_value = "5")]
    pub round_interval_secs: u64,

    /// Seconds between compaction passes
    #[arg(long, default_value = "60")]
    pub compact_interval_secs: u64,

    /// Namespaces whose local writes drop older entries (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub no_history: Vec<String>,

    /// Seed for the delta shuffle (entropy when absent)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Initial local writes, `key=value`; values parse as JSON, else as strings
    #[arg(long = "set")]
    pub writes: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.trim().is_empty() {
            anyhow::bail!("Participant id cannot be empty");
        }
        if self.round_interval_secs == 0 {
            anyhow::bail!("Round interval must be at least one second");
        }
        if self.compact_interval_secs == 0 {
            anyhow::bail!("Compaction interval must be at least one second");
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!("Unknown log format: {}", self.log_format);
        }
        if self.peers.contains(&self.listen) {
            anyhow::bail!("Peer list contains our own listen address {}", self.listen);
        }
        self.initial_writes()?;
        Ok(())
    }

    /// Host configuration derived from the command line
    pub fn host_config(&self) -> HostConfig {
        let retention = self
            .no_history
            .iter()
            .fold(HistoryRetention::default(), |retention, namespace| {
                retention.with_namespace(namespace.as_str(), false)
            });

        let config = HostConfig::default()
            .with_ordering(self.ordering)
            .with_retention(retention);
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }

    /// Parsed `--set` writes, in command-line order
    pub fn initial_writes(&self) -> anyhow::Result<Vec<(String, Value)>> {
        self.writes.iter().map(|write| parse_write(write)).collect()
    }

    pub fn round_interval(&self) -> Duration {
        Duration::from_secs(self.round_interval_secs)
    }

    pub fn compact_interval(&self) -> Duration {
        Duration::from_secs(self.compact_interval_secs)
    }
}

fn parse_write(write: &str) -> anyhow::Result<(String, Value)> {
    let Some((key, raw)) = write.split_once('=') else {
        anyhow::bail!("Expected key=value, got {:?}", write);
    };
    if key.is_empty() {
        anyhow::bail!("Empty key in {:?}", write);
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scuttle_core::DEFAULT_NAMESPACE;
    use serde_json::json;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("gossipd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--id", "A"]);
        assert_eq!(config.ordering, DeltaOrdering::Depth);
        assert_eq!(config.round_interval(), Duration::from_secs(5));
        assert!(config.peers.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_peers_and_ordering() {
        let config = parse(&[
            "--id",
            "A",
            "--peers",
            "127.0.0.1:9201,127.0.0.1:9202",
            "--ordering",
            "breadth",
        ]);
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.host_config().ordering, DeltaOrdering::Breadth);
    }

    #[test]
    fn test_initial_writes() {
        let config = parse(&["--id", "A", "--set", "n=3", "--set", "s=hello", "--set", "o={\"x\":1}"]);
        assert_eq!(
            config.initial_writes().unwrap(),
            vec![
                ("n".to_string(), json!(3)),
                ("s".to_string(), json!("hello")),
                ("o".to_string(), json!({"x": 1})),
            ]
        );
    }

    #[test]
    fn test_no_history() {
        let config = parse(&["--id", "A", "--no-history", "~", "--seed", "7"]);
        let host = config.host_config();
        assert!(!host.retention.retains(DEFAULT_NAMESPACE));
        assert_eq!(host.seed, Some(7));
    }

    #[test]
    fn test_validation() {
        assert!(parse(&["--id", " "]).validate().is_err());
        assert!(parse(&["--id", "A", "--round-interval-secs", "0"]).validate().is_err());
        assert!(parse(&["--id", "A", "--set", "novalue"]).validate().is_err());
        assert!(parse(&["--id", "A", "--log-format", "xml"]).validate().is_err());
    }
}

//! gossipd server - main service loop

use crate::config::Config;
use crate::sync::{SyncManager, SyncStats};
use scuttle_core::{ExchangeOptions, Host};
use scuttle_net::{drive_sink, drive_source, SinkStats, SourceStats, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info, warn};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Gossip error: {0}")]
    Gossip(#[from] scuttle_core::Error),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Bind failed: {0}")]
    BindFailed(SocketAddr),
}

/// Server state
#[derive(Debug)]
pub struct Server {
    config: Config,
    host: Arc<Host>,
    sync_manager: Arc<SyncManager>,
    /// Shutdown signal
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new server instance and apply the configured initial writes
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let writes = config
            .initial_writes()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let host = Arc::new(Host::new(config.id.as_str(), config.host_config()));
        for (key, value) in writes {
            let delta = host.set(&key, value)?;
            debug!(key = %key, version = delta.version, "Initial write");
        }

        let sync_manager = Arc::new(SyncManager::new(config.round_interval()));
        for addr in &config.peers {
            sync_manager.register_peer(*addr);
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            host,
            sync_manager,
            shutdown_tx,
        })
    }

    /// Host this server gossips for
    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// Bind the configured listen address and serve until shutdown
    pub async fn run(self: Arc<Self>) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.listen)
            .await
            .map_err(|e| {
                error!("Cannot bind {}: {}", self.config.listen, e);
                ServerError::BindFailed(self.config.listen)
            })?;
        self.serve(listener).await
    }

    /// Serve gossip on an already bound listener until shutdown.
    ///
    /// Every accepted connection is answered by a streaming sink. Every
    /// configured peer gets a task holding a streaming source open to it,
    /// reconnecting with backoff when the session ends.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        info!(
            "Starting gossipd as {} on {} ({} peers, {} ordering)",
            self.host.id(),
            listener.local_addr()?,
            self.config.peers.len(),
            self.config.ordering
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let mut handles: Vec<JoinHandle<()>> = self
            .config
            .peers
            .iter()
            .map(|addr| self.spawn_peer_task(*addr))
            .collect();
        handles.push(self.spawn_compaction_task());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("Accepted connection from {}", addr);
                            self.spawn_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutting down...");
                    break;
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Background task failed: {}", e);
            }
        }

        let stats = self.stats()?;
        info!(
            participants = stats.participant_count,
            syncs = stats.sync_stats.total_syncs,
            applied = stats.sync_stats.deltas_applied,
            served = stats.sync_stats.deltas_served,
            "gossipd stopped"
        );
        Ok(())
    }

    /// Answer one inbound connection with a streaming sink
    fn spawn_connection(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let server = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                result = server.handle_connection(stream) => match result {
                    Ok(stats) => debug!(
                        peer = %addr,
                        batches = stats.batches,
                        sent = stats.deltas_sent,
                        "Inbound session finished"
                    ),
                    Err(e) => warn!("Connection error from {}: {}", addr, e),
                },
                _ = shutdown_rx.recv() => {}
            }
        });
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<SinkStats, ServerError> {
        stream.set_nodelay(true)?;
        let sink = self.host.create_sink(ExchangeOptions::streaming());
        let stats = drive_sink(sink, stream).await?;
        self.sync_manager.record_served(stats);
        Ok(stats)
    }

    /// Keep a gossip session open to `addr`, reconnecting until shutdown
    fn spawn_peer_task(self: &Arc<Self>, addr: SocketAddr) -> JoinHandle<()> {
        let server = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = server.gossip_with(addr) => match result {
                        Ok(stats) => {
                            server.sync_manager.record_session(addr, stats);
                            info!(
                                peer = %addr,
                                rounds = stats.batches,
                                applied = stats.deltas_applied,
                                "Peer closed gossip session"
                            );
                        }
                        Err(e) => {
                            server.sync_manager.mark_failure(addr);
                            warn!("Gossip with {} failed: {}", addr, e);
                        }
                    },
                    _ = shutdown_rx.recv() => break,
                }

                let delay = server.sync_manager.backoff(&addr);
                debug!("Reconnecting to {} in {:?}", addr, delay);
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    async fn gossip_with(&self, addr: SocketAddr) -> Result<SourceStats, ServerError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        self.sync_manager.mark_connected(addr);
        info!("Gossiping with {}", addr);

        let source = self.host.create_source(ExchangeOptions::streaming());
        Ok(drive_source(source, stream, self.config.round_interval()).await?)
    }

    /// Spawn background compaction task
    fn spawn_compaction_task(&self) -> JoinHandle<()> {
        let host = Arc::clone(&self.host);
        let period = self.config.compact_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => match host.compact() {
                        Ok(report) => debug!(
                            acknowledged = report.acknowledged,
                            compacted = report.compacted,
                            skipped = report.skipped,
                            pruned = report.pruned,
                            "Compaction pass"
                        ),
                        Err(e) => warn!("Compaction failed: {}", e),
                    },
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        })
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get server statistics
    pub fn stats(&self) -> Result<ServerStats, ServerError> {
        Ok(ServerStats {
            participant_count: self.host.participants()?.len(),
            peer_count: self.config.peers.len(),
            sync_stats: self.sync_manager.stats(),
        })
    }
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub participant_count: usize,
    pub peer_count: usize,
    pub sync_stats: SyncStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;
    use std::time::Duration;

    fn test_config(id: &str, extra: &[&str]) -> Config {
        let args = ["gossipd", "--id", id, "--listen", "127.0.0.1:0", "--seed", "1"];
        Config::try_parse_from(args.iter().chain(extra.iter()).copied()).unwrap()
    }

    #[test]
    fn test_server_creation() {
        let server = Server::new(test_config("A", &["--set", "a=1", "--set", "a=2"])).unwrap();

        assert_eq!(server.host().get("a").unwrap(), Some(json!(2)));
        let stats = server.stats().unwrap();
        assert_eq!(stats.participant_count, 1);
        assert_eq!(stats.peer_count, 0);
    }

    #[test]
    fn test_invalid_write_rejected() {
        let result = Server::new(test_config("A", &["--set", "broken"]));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_gossip_over_tcp() {
        let b_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let b_addr = b_listener.local_addr().unwrap();
        let b = Arc::new(Server::new(test_config("B", &["--set", "b=\"x\""])).unwrap());

        let a_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peers = b_addr.to_string();
        let a = Arc::new(
            Server::new(test_config(
                "A",
                &["--peers", peers.as_str(), "--round-interval-secs", "1"],
            ))
            .unwrap(),
        );

        let b_task = tokio::spawn(Arc::clone(&b).serve(b_listener));
        let a_task = tokio::spawn(Arc::clone(&a).serve(a_listener));

        let learned = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if a.host().lookup(&"B".into(), "b").unwrap().is_some() {
                    break;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(learned.is_ok(), "A never learned B's state");
        assert_eq!(a.host().lookup(&"B".into(), "b").unwrap(), Some(json!("x")));
        assert_eq!(a.stats().unwrap().participant_count, 2);
        assert_eq!(a.stats().unwrap().sync_stats.connected, 1);

        a.shutdown();
        b.shutdown();
        a_task.await.unwrap().unwrap();
        b_task.await.unwrap().unwrap();
    }
}

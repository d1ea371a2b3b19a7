//! Per-chain block watcher

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{BlockHeader, ChainClient, ChainConnector, HeaderStream};
use super::stats::{WatcherStats, WatcherStatsSnapshot};
use crate::domain::fees::observation_from_block;
use crate::shared::config::NetworkConfig;
use crate::shared::errors::FeedError;
use crate::shared::types::{
    ConnectionStatus, EventOutcome, FeedEvent, FeedSource, FeeObservation, NetworkId,
};
use crate::shared::utils::{format_gwei, mask_url, now_millis};

#[derive(Default)]
struct Session {
    generation: u64,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    client: Option<Arc<dyn ChainClient>>,
}

impl Session {
    /// Tear down whatever is running; true if something was
    fn shutdown(&mut self) -> bool {
        let was_active = self.client.is_some() || self.cancel.is_some();
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.client = None;
        was_active
    }
}

/// Watches new blocks on one chain and emits fee observations.
///
/// There is no automatic reconnect: when the subscription dies a
/// `Disconnected` status is emitted and the owner decides what to do.
pub struct ChainFeedWatcher {
    network: NetworkConfig,
    connector: Arc<dyn ChainConnector>,
    sink: mpsc::Sender<FeedEvent>,
    session: Arc<Mutex<Session>>,
    stats: Arc<WatcherStats>,
}

impl ChainFeedWatcher {
    pub fn new(
        network: NetworkConfig,
        connector: Arc<dyn ChainConnector>,
        sink: mpsc::Sender<FeedEvent>,
    ) -> Self {
        Self {
            network,
            connector,
            sink,
            session: Arc::new(Mutex::new(Session::default())),
            stats: Arc::new(WatcherStats::default()),
        }
    }

    pub fn network(&self) -> &NetworkId {
        &self.network.id
    }

    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.client.is_some()
    }

    /// Connect and read the latest block, then hand the seed observation and
    /// the head subscription to a follower task that emits the seed first.
    ///
    /// Fails with `Connection` when the endpoint or the seed fetch fails; no
    /// subscription is left behind in that case. A `disconnect` racing this
    /// call wins and the result is `Cancelled`.
    pub async fn connect(&self) -> Result<(), FeedError> {
        let (generation, token) = {
            let mut session = self.session.lock().await;
            session.shutdown();
            session.generation += 1;
            let token = CancellationToken::new();
            session.cancel = Some(token.clone());
            (session.generation, token)
        };

        info!(
            network = %self.network.id,
            url = %mask_url(&self.network.rpc_url),
            "🔌 Connecting chain feed"
        );
        self.emit_status(ConnectionStatus::Connecting).await;

        let opened = tokio::select! {
            _ = token.cancelled() => Err(FeedError::Cancelled),
            opened = tokio::time::timeout(self.network.connect_timeout(), self.open()) => {
                opened.unwrap_or_else(|_| {
                    Err(FeedError::connection(format!(
                        "{} connect timed out after {:?}",
                        self.network.id,
                        self.network.connect_timeout()
                    )))
                })
            }
        };

        let (client, seed, blocks) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                let mut session = self.session.lock().await;
                if session.generation == generation {
                    session.cancel = None;
                }
                drop(session);
                if err != FeedError::Cancelled {
                    error!(network = %self.network.id, error = %err, "Chain feed connect failed");
                    self.emit_status(ConnectionStatus::Disconnected).await;
                }
                return Err(err);
            }
        };

        let mut session = self.session.lock().await;
        if session.generation != generation || token.is_cancelled() {
            debug!(network = %self.network.id, "Connect superseded, dropping connection");
            return Err(FeedError::Cancelled);
        }

        info!(
            network = %self.network.id,
            block = seed.block_height(),
            base_fee_gwei = %format_gwei(seed.base_fee()),
            "✅ Chain feed connected"
        );
        let follower = Follower {
            network: self.network.id.clone(),
            generation,
            session: Arc::clone(&self.session),
            token,
            sink: self.sink.clone(),
            stats: Arc::clone(&self.stats),
        };
        session.client = Some(client);
        session.task = Some(tokio::spawn(follower.run(seed, blocks)));
        Ok(())
    }

    /// Stop following blocks and release the connection. Safe in any state.
    pub async fn disconnect(&self) {
        let was_active = {
            let mut session = self.session.lock().await;
            session.generation += 1;
            session.shutdown()
        };
        if was_active {
            info!(network = %self.network.id, "Chain feed disconnected");
            self.emit_status(ConnectionStatus::Disconnected).await;
        }
    }

    async fn open(&self) -> Result<(Arc<dyn ChainClient>, FeeObservation, HeaderStream), FeedError> {
        let client = self.connector.connect_chain(&self.network.rpc_url).await?;
        let latest = client.latest_block().await.map_err(|e| {
            FeedError::connection(format!("{} seed fetch failed: {}", self.network.id, e))
        })?;
        let seed = observation_for(&self.network.id, &latest);
        let blocks = client.subscribe_blocks().await?;
        Ok((client, seed, blocks))
    }

    fn source(&self) -> FeedSource {
        FeedSource::Chain(self.network.id.clone())
    }

    async fn emit_status(&self, status: ConnectionStatus) {
        let _ = self
            .sink
            .send(FeedEvent::Status {
                source: self.source(),
                status,
            })
            .await;
    }
}

fn observation_for(network: &NetworkId, header: &BlockHeader) -> FeeObservation {
    observation_from_block(
        network.clone(),
        header.number,
        header.base_fee_per_gas,
        now_millis(),
    )
}

/// Owns the block subscription of one session.
///
/// The seed goes out first, so the hub never sees a head before it.
struct Follower {
    network: NetworkId,
    generation: u64,
    session: Arc<Mutex<Session>>,
    token: CancellationToken,
    sink: mpsc::Sender<FeedEvent>,
    stats: Arc<WatcherStats>,
}

impl Follower {
    async fn run(self, seed: FeeObservation, mut blocks: HeaderStream) {
        let announced = tokio::select! {
            biased;
            _ = self.token.cancelled() => return,
            outcome = self.announce(seed) => outcome,
        };
        self.stats.record(&announced);
        if let EventOutcome::Fatal(err) = announced {
            error!(network = %self.network, error = %err, "Chain feed stopped");
            self.release().await;
            return;
        }

        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                item = blocks.recv() => match item {
                    Some(Ok(header)) => self.deliver(&header).await,
                    Some(Err(err)) => EventOutcome::Recovered(err),
                    None => {
                        warn!(network = %self.network, "Block subscription ended");
                        self.release().await;
                        self.emit_status(ConnectionStatus::Disconnected).await;
                        return;
                    }
                }
            };

            self.stats.record(&outcome);
            match outcome {
                EventOutcome::Delivered => {}
                EventOutcome::Recovered(err) => {
                    warn!(network = %self.network, error = %err, "Skipping block");
                }
                EventOutcome::Fatal(err) => {
                    error!(network = %self.network, error = %err, "Chain feed stopped");
                    self.release().await;
                    return;
                }
            }
        }
    }

    async fn announce(&self, seed: FeeObservation) -> EventOutcome {
        let event = FeedEvent::Fee {
            network: self.network.clone(),
            observation: seed,
        };
        if self.sink.send(event).await.is_err() {
            return EventOutcome::Fatal(FeedError::connection("feed hub is gone"));
        }
        self.emit_status(ConnectionStatus::Connected).await;
        EventOutcome::Delivered
    }

    async fn deliver(&self, header: &BlockHeader) -> EventOutcome {
        let observation = observation_for(&self.network, header);
        debug!(
            network = %self.network,
            block = header.number,
            total_fee_gwei = %format_gwei(observation.total_fee()),
            "New block"
        );
        let event = FeedEvent::Fee {
            network: self.network.clone(),
            observation,
        };
        match self.sink.send(event).await {
            Ok(()) => EventOutcome::Delivered,
            Err(_) => EventOutcome::Fatal(FeedError::connection("feed hub is gone")),
        }
    }

    /// Drop the session's client unless a newer session replaced it
    async fn release(&self) {
        let mut session = self.session.lock().await;
        if session.generation == self.generation {
            session.client = None;
            session.cancel = None;
            // this task; dropping the handle detaches it
            session.task = None;
        }
    }

    async fn emit_status(&self, status: ConnectionStatus) {
        let _ = self
            .sink
            .send(FeedEvent::Status {
                source: FeedSource::Chain(self.network.clone()),
                status,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::GWEI;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Scripted chain: a latest block plus a sender to push heads by hand
    struct FakeChain {
        latest: Result<BlockHeader, FeedError>,
        latest_delay: Duration,
        heads: StdMutex<Option<HeaderStream>>,
    }

    #[async_trait]
    impl ChainClient for FakeChain {
        async fn latest_block(&self) -> Result<BlockHeader, FeedError> {
            if !self.latest_delay.is_zero() {
                tokio::time::sleep(self.latest_delay).await;
            }
            self.latest.clone()
        }

        async fn subscribe_blocks(&self) -> Result<HeaderStream, FeedError> {
            self.heads
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| FeedError::connection("already subscribed"))
        }
    }

    struct FakeConnector {
        clients: StdMutex<VecDeque<Result<Arc<dyn ChainClient>, FeedError>>>,
    }

    #[async_trait]
    impl ChainConnector for FakeConnector {
        async fn connect_chain(&self, _rpc_url: &str) -> Result<Arc<dyn ChainClient>, FeedError> {
            self.clients
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FeedError::connection("no endpoint")))
        }
    }

    fn header(number: u64, base_gwei: u128) -> BlockHeader {
        BlockHeader {
            number,
            base_fee_per_gas: Some(base_gwei * GWEI),
        }
    }

    fn watcher_with(
        latest: Result<BlockHeader, FeedError>,
    ) -> (
        ChainFeedWatcher,
        mpsc::Sender<Result<BlockHeader, FeedError>>,
        mpsc::Receiver<FeedEvent>,
    ) {
        slow_watcher_with(latest, Duration::ZERO)
    }

    fn slow_watcher_with(
        latest: Result<BlockHeader, FeedError>,
        latest_delay: Duration,
    ) -> (
        ChainFeedWatcher,
        mpsc::Sender<Result<BlockHeader, FeedError>>,
        mpsc::Receiver<FeedEvent>,
    ) {
        let (heads_tx, heads_rx) = mpsc::channel(16);
        let chain: Arc<dyn ChainClient> = Arc::new(FakeChain {
            latest,
            latest_delay,
            heads: StdMutex::new(Some(heads_rx)),
        });
        let connector = Arc::new(FakeConnector {
            clients: StdMutex::new(VecDeque::from(vec![Ok(chain)])),
        });
        let (sink, events) = mpsc::channel(64);
        let watcher = ChainFeedWatcher::new(
            NetworkConfig::new("ethereum", "wss://example.invalid/key"),
            connector,
            sink,
        );
        (watcher, heads_tx, events)
    }

    async fn next_fee(events: &mut mpsc::Receiver<FeedEvent>) -> FeeObservation {
        loop {
            match events.recv().await {
                Some(FeedEvent::Fee { observation, .. }) => return observation,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    }

    async fn next_status(events: &mut mpsc::Receiver<FeedEvent>) -> ConnectionStatus {
        loop {
            match events.recv().await {
                Some(FeedEvent::Status { status, .. }) => return status,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_connect_emits_seed_then_follows_blocks() {
        let (watcher, heads, mut events) = watcher_with(Ok(header(100, 30)));
        watcher.connect().await.unwrap();
        assert!(watcher.is_connected().await);

        let seed = next_fee(&mut events).await;
        assert_eq!(seed.block_height(), 100);
        assert_eq!(seed.base_fee(), 30 * GWEI);
        assert_eq!(seed.priority_fee(), 3 * GWEI);

        heads.send(Ok(header(101, 5))).await.unwrap();
        let next = next_fee(&mut events).await;
        assert_eq!(next.block_height(), 101);
        assert_eq!(next.priority_fee(), GWEI);
        assert_eq!(next.total_fee(), 6 * GWEI);
    }

    #[tokio::test]
    async fn test_block_without_base_fee_counts_as_zero() {
        let (watcher, heads, mut events) = watcher_with(Ok(header(1, 10)));
        watcher.connect().await.unwrap();
        next_fee(&mut events).await;

        heads
            .send(Ok(BlockHeader { number: 2, base_fee_per_gas: None }))
            .await
            .unwrap();
        let obs = next_fee(&mut events).await;
        assert_eq!(obs.base_fee(), 0);
        assert_eq!(obs.priority_fee(), GWEI);
    }

    #[tokio::test]
    async fn test_bad_block_is_skipped() {
        let (watcher, heads, mut events) = watcher_with(Ok(header(1, 10)));
        watcher.connect().await.unwrap();
        next_fee(&mut events).await;

        heads.send(Err(FeedError::transient("boom"))).await.unwrap();
        heads.send(Ok(header(3, 10))).await.unwrap();
        assert_eq!(next_fee(&mut events).await.block_height(), 3);

        let stats = watcher.stats();
        assert_eq!(stats.recovered, 1);
        assert!(stats.delivered >= 1);
    }

    #[tokio::test]
    async fn test_seed_failure_fails_connect() {
        let (watcher, heads, _events) = watcher_with(Err(FeedError::transient("no block")));
        let err = watcher.connect().await.unwrap_err();
        assert!(matches!(err, FeedError::Connection(_)));
        assert!(!watcher.is_connected().await);
        // the failed client was released along with its subscription
        assert!(heads.is_closed());
    }

    #[tokio::test]
    async fn test_stream_end_reports_disconnected() {
        let (watcher, heads, mut events) = watcher_with(Ok(header(1, 10)));
        watcher.connect().await.unwrap();
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connected);

        drop(heads);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_stream_end_clears_connection() {
        let (watcher, heads, mut events) = watcher_with(Ok(header(1, 10)));
        watcher.connect().await.unwrap();
        assert!(watcher.is_connected().await);
        next_fee(&mut events).await;

        drop(heads);
        loop {
            if next_status(&mut events).await == ConnectionStatus::Disconnected {
                break;
            }
        }
        assert!(!watcher.is_connected().await);

        // nothing left to tear down, so no second Disconnected
        watcher.disconnect().await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_hub_does_not_block_queries() {
        let (_heads, heads_rx) = mpsc::channel(16);
        let chain: Arc<dyn ChainClient> = Arc::new(FakeChain {
            latest: Ok(header(7, 10)),
            latest_delay: Duration::ZERO,
            heads: StdMutex::new(Some(heads_rx)),
        });
        let connector = Arc::new(FakeConnector {
            clients: StdMutex::new(VecDeque::from(vec![Ok(chain)])),
        });
        let (sink, mut events) = mpsc::channel(1);
        let watcher = ChainFeedWatcher::new(
            NetworkConfig::new("ethereum", "wss://example.invalid"),
            connector,
            sink,
        );

        // Connecting fills the channel, the seed waits behind it
        watcher.connect().await.unwrap();
        let connected = tokio::time::timeout(Duration::from_secs(1), watcher.is_connected())
            .await
            .unwrap();
        assert!(connected);

        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);
        assert_eq!(next_fee(&mut events).await.block_height(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_connect_wins() {
        let (watcher, heads, mut events) =
            slow_watcher_with(Ok(header(1, 10)), Duration::from_secs(5));
        let watcher = Arc::new(watcher);

        let connecting = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.connect().await })
        };
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);

        watcher.disconnect().await;
        assert_eq!(connecting.await.unwrap(), Err(FeedError::Cancelled));
        assert!(!watcher.is_connected().await);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Disconnected);

        // well past the slow seed fetch
        tokio::time::sleep(Duration::from_secs(60)).await;
        let _ = heads.send(Ok(header(2, 10))).await;
        assert!(!watcher.is_connected().await);
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, FeedEvent::Fee { .. }), "fee after disconnect: {event:?}");
        }
    }

    #[tokio::test]
    async fn test_disconnect_stops_delivery() {
        let (watcher, heads, mut events) = watcher_with(Ok(header(1, 10)));
        watcher.connect().await.unwrap();
        next_fee(&mut events).await;

        watcher.disconnect().await;
        assert!(!watcher.is_connected().await);
        let _ = heads.send(Ok(header(2, 10))).await;

        watcher.disconnect().await;
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, FeedEvent::Fee { .. }));
        }
    }
}

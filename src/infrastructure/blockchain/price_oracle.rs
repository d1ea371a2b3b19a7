//! Quote price watcher for a Uniswap V3 pool
//!
//! Reads `slot0` once on connect and then follows `Swap` events. Endpoints
//! are tried in order with wrap-around; a lost subscription triggers a
//! linear-backoff reconnect that gives up after the configured attempts.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{PoolClient, PoolConnector, SwapStream};
use super::failover::{EndpointRing, ReconnectPolicy};
use super::stats::{WatcherStats, WatcherStatsSnapshot};
use crate::domain::price::{
    resolve_orientation, DerivedPrice, Orientation, OrientationInput, PriceDerivation,
};
use crate::shared::config::OracleConfig;
use crate::shared::errors::FeedError;
use crate::shared::types::{ConnectionStatus, EventOutcome, FeedEvent, FeedSource, PriceObservation};
use crate::shared::utils::{mask_url, now_millis};

/// Lifecycle of the oracle connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OracleState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted; only an explicit `connect` leaves this
    Failed,
}

#[derive(Clone)]
struct ActivePool {
    client: Arc<dyn PoolClient>,
    orientation: Orientation,
    endpoint: String,
}

/// A freshly opened endpoint, not yet adopted
struct PoolSession {
    active: ActivePool,
    seed: DerivedPrice,
    swaps: SwapStream,
}

/// What the supervisor needs from an adopted session
struct Adopted {
    seed: DerivedPrice,
    swaps: SwapStream,
    orientation: Orientation,
}

struct OracleShared {
    state: OracleState,
    ring: EndpointRing,
    attempts: u32,
    generation: u64,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    active: Option<ActivePool>,
}

impl OracleShared {
    fn teardown(&mut self) -> bool {
        let was_active = self.cancel.is_some() || self.active.is_some();
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.active = None;
        was_active
    }
}

enum PumpExit {
    Cancelled,
    StreamLost,
    SinkClosed,
}

struct OracleCore {
    config: OracleConfig,
    derivation: PriceDerivation,
    policy: ReconnectPolicy,
    connector: Arc<dyn PoolConnector>,
    sink: mpsc::Sender<FeedEvent>,
    shared: Mutex<OracleShared>,
    stats: WatcherStats,
}

/// Watches one pool and emits quote prices
pub struct PriceOracleWatcher {
    core: Arc<OracleCore>,
}

impl PriceOracleWatcher {
    pub fn new(
        config: OracleConfig,
        connector: Arc<dyn PoolConnector>,
        sink: mpsc::Sender<FeedEvent>,
    ) -> Self {
        let derivation = PriceDerivation::from(&config);
        let policy = ReconnectPolicy::new(
            config.reconnect_base_delay(),
            config.max_reconnect_attempts,
        );
        let shared = OracleShared {
            state: OracleState::Idle,
            ring: EndpointRing::new(config.endpoints.clone()),
            attempts: 0,
            generation: 0,
            cancel: None,
            task: None,
            active: None,
        };

        Self {
            core: Arc::new(OracleCore {
                config,
                derivation,
                policy,
                connector,
                sink,
                shared: Mutex::new(shared),
                stats: WatcherStats::default(),
            }),
        }
    }

    pub async fn state(&self) -> OracleState {
        self.core.shared.lock().await.state
    }

    /// Reconnect attempts since the last successful connection
    pub async fn reconnect_attempts(&self) -> u32 {
        self.core.shared.lock().await.attempts
    }

    pub async fn current_endpoint(&self) -> Option<String> {
        let shared = self.core.shared.lock().await;
        shared.active.as_ref().map(|active| active.endpoint.clone())
    }

    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.core.stats.snapshot()
    }

    /// Connect to the first working endpoint, emit the seed price and start
    /// following swaps.
    ///
    /// Each endpoint is tried once starting from the last one that worked.
    /// Resets the reconnect counter, so this also revives a `Failed` watcher.
    pub async fn connect(&self) -> Result<(), FeedError> {
        let core = &self.core;
        if core.config.endpoints.is_empty() {
            return Err(FeedError::connection("no RPC endpoints configured"));
        }

        let (generation, token) = {
            let mut shared = core.shared.lock().await;
            shared.teardown();
            shared.generation += 1;
            shared.attempts = 0;
            shared.state = OracleState::Connecting;
            let token = CancellationToken::new();
            shared.cancel = Some(token.clone());
            (shared.generation, token)
        };
        core.emit_status(ConnectionStatus::Connecting).await;

        match core.connect_pass(&token).await {
            Ok(session) => {
                let mut shared = core.shared.lock().await;
                if shared.generation != generation || token.is_cancelled() {
                    debug!("Oracle connect superseded, dropping connection");
                    return Err(FeedError::Cancelled);
                }
                let adopted = core.adopt(&mut shared, session);
                let task = tokio::spawn(Arc::clone(core).supervise(generation, token, adopted));
                shared.task = Some(task);
                Ok(())
            }
            Err(err) => {
                {
                    let mut shared = core.shared.lock().await;
                    if shared.generation == generation {
                        shared.state = OracleState::Disconnected;
                        shared.cancel = None;
                    }
                }
                if err != FeedError::Cancelled {
                    error!(error = %err, "Price oracle connect failed");
                    core.emit_status(ConnectionStatus::Disconnected).await;
                }
                Err(err)
            }
        }
    }

    /// Stop everything, including a pending reconnect. Safe in any state.
    pub async fn disconnect(&self) {
        let was_active = {
            let mut shared = self.core.shared.lock().await;
            shared.generation += 1;
            let was_active = shared.teardown();
            if shared.state != OracleState::Idle {
                shared.state = OracleState::Disconnected;
            }
            was_active
        };
        if was_active {
            info!("Price oracle disconnected");
            self.core.emit_status(ConnectionStatus::Disconnected).await;
        }
    }

    /// Read `slot0` now and emit the result.
    ///
    /// A failed read yields the fallback price, like a rejected one does.
    pub async fn refresh(&self) -> Result<PriceObservation, FeedError> {
        let core = &self.core;
        let (active, state) = {
            let shared = core.shared.lock().await;
            (shared.active.clone(), shared.state)
        };
        let active = match active {
            Some(active) => active,
            None if state == OracleState::Failed => {
                return Err(FeedError::ReconnectExhausted(core.policy.max_attempts))
            }
            None => return Err(FeedError::connection("price oracle is not connected")),
        };

        let derived = match timeout(core.config.connect_timeout(), active.client.sqrt_price_x96()).await {
            Ok(Ok(sqrt_price_x96)) => core.derivation.derive(sqrt_price_x96, active.orientation),
            Ok(Err(err)) => core.fetch_failed(err),
            Err(_) => core.fetch_failed(FeedError::transient("slot0() timed out")),
        };

        let (observation, outcome) = core.publish(derived).await;
        core.stats.record(&outcome);
        match outcome {
            EventOutcome::Fatal(err) => Err(err),
            _ => Ok(observation),
        }
    }
}

impl OracleCore {
    /// Try each endpoint once from the cursor; the first that fully opens wins
    async fn connect_pass(&self, token: &CancellationToken) -> Result<PoolSession, FeedError> {
        let candidates = self.shared.lock().await.ring.pass();
        let tried = candidates.len();

        for (index, url) in candidates {
            let attempt = tokio::select! {
                _ = token.cancelled() => return Err(FeedError::Cancelled),
                attempt = timeout(self.config.connect_timeout(), self.open_endpoint(&url)) => attempt,
            };
            match attempt {
                Ok(Ok(session)) => {
                    self.shared.lock().await.ring.settle(index);
                    return Ok(session);
                }
                Ok(Err(err)) => {
                    warn!(url = %mask_url(&url), error = %err, "Endpoint failed, trying next");
                }
                Err(_) => {
                    warn!(url = %mask_url(&url), "Endpoint timed out, trying next");
                }
            }
        }

        Err(FeedError::connection(format!(
            "all {} RPC endpoints failed",
            tried
        )))
    }

    async fn open_endpoint(&self, url: &str) -> Result<PoolSession, FeedError> {
        info!(url = %mask_url(url), pool = %self.config.pool_address, "🔌 Connecting price oracle");
        let client = self
            .connector
            .connect_pool(url, &self.config.pool_address)
            .await?;
        let chain_id = client.chain_id().await?;
        let token0 = client.token0().await?;

        let orientation = resolve_orientation(OrientationInput {
            pool_address: &self.config.pool_address,
            default_pool_address: &self.config.default_pool_address,
            token0_address: &token0,
            base_asset_address: &self.config.base_asset_address,
            advertised_base_is_token0: self.config.base_is_token0,
        });
        debug!(chain_id, token0 = %token0, ?orientation, "Pool bound");

        let seed = match client.sqrt_price_x96().await {
            Ok(sqrt_price_x96) => self.derivation.derive(sqrt_price_x96, orientation),
            Err(err) => self.fetch_failed(err),
        };
        let swaps = client.subscribe_swaps().await?;

        Ok(PoolSession {
            active: ActivePool {
                client,
                orientation,
                endpoint: url.to_string(),
            },
            seed,
            swaps,
        })
    }

    /// Make a freshly opened session the current one; the supervisor announces it
    fn adopt(&self, shared: &mut OracleShared, session: PoolSession) -> Adopted {
        let PoolSession { active, seed, swaps } = session;
        let orientation = active.orientation;
        info!(
            url = %mask_url(&active.endpoint),
            price = seed.price,
            "✅ Price oracle connected"
        );
        shared.state = OracleState::Connected;
        shared.attempts = 0;
        shared.active = Some(active);
        Adopted {
            seed,
            swaps,
            orientation,
        }
    }

    /// Seed price, then the `Connected` status
    async fn announce(&self, token: &CancellationToken, seed: DerivedPrice) -> Result<(), PumpExit> {
        let (_, outcome) = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(PumpExit::Cancelled),
            published = self.publish(seed) => published,
        };
        self.stats.record(&outcome);
        if let EventOutcome::Fatal(_) = outcome {
            return Err(PumpExit::SinkClosed);
        }
        self.emit_status(ConnectionStatus::Connected).await;
        Ok(())
    }

    async fn supervise(self: Arc<Self>, generation: u64, token: CancellationToken, adopted: Adopted) {
        let Adopted {
            mut seed,
            mut swaps,
            mut orientation,
        } = adopted;
        loop {
            let exit = match self.announce(&token, seed).await {
                Ok(()) => self.pump(&token, &mut swaps, orientation).await,
                Err(exit) => exit,
            };
            match exit {
                PumpExit::Cancelled => return,
                PumpExit::SinkClosed => {
                    error!("Feed hub is gone, stopping price oracle");
                    let mut shared = self.shared.lock().await;
                    if shared.generation == generation {
                        shared.state = OracleState::Disconnected;
                        shared.active = None;
                    }
                    return;
                }
                PumpExit::StreamLost => {
                    warn!("Swap subscription lost");
                    {
                        let mut shared = self.shared.lock().await;
                        if shared.generation != generation {
                            return;
                        }
                        shared.active = None;
                    }
                    match self.reconnect(generation, &token).await {
                        Some(next) => {
                            seed = next.seed;
                            swaps = next.swaps;
                            orientation = next.orientation;
                        }
                        None => return,
                    }
                }
            }
        }
    }

    async fn pump(
        &self,
        token: &CancellationToken,
        swaps: &mut SwapStream,
        orientation: Orientation,
    ) -> PumpExit {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return PumpExit::Cancelled,
                item = swaps.recv() => match item {
                    Some(Ok(update)) => {
                        debug!(block = ?update.block_number, sqrt_price_x96 = %update.sqrt_price_x96, "Swap");
                        let derived = self.derivation.derive(update.sqrt_price_x96, orientation);
                        self.publish(derived).await.1
                    }
                    Some(Err(err)) => EventOutcome::Recovered(err),
                    None => return PumpExit::StreamLost,
                }
            };

            self.stats.record(&outcome);
            match outcome {
                EventOutcome::Delivered => {}
                EventOutcome::Recovered(err) => warn!(error = %err, "Skipping swap event"),
                EventOutcome::Fatal(_) => return PumpExit::SinkClosed,
            }
        }
    }

    /// Backoff loop; `None` when cancelled, superseded or exhausted
    async fn reconnect(&self, generation: u64, token: &CancellationToken) -> Option<Adopted> {
        loop {
            let (attempt, delay) = {
                let mut shared = self.shared.lock().await;
                if shared.generation != generation {
                    return None;
                }
                let attempt = shared.attempts + 1;
                let delay = self.policy.delay_for(attempt);
                match delay {
                    Some(_) => {
                        shared.attempts = attempt;
                        shared.state = OracleState::Reconnecting { attempt };
                    }
                    None => {
                        shared.state = OracleState::Failed;
                        shared.cancel = None;
                    }
                }
                (attempt, delay)
            };

            let Some(delay) = delay else {
                let err = FeedError::ReconnectExhausted(self.policy.max_attempts);
                error!(error = %err, "Price oracle gave up");
                self.emit_status(ConnectionStatus::ReconnectExhausted).await;
                return None;
            };

            info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting price oracle");
            self.emit_status(ConnectionStatus::Reconnecting { attempt }).await;
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = sleep(delay) => {}
            }

            match self.connect_pass(token).await {
                Ok(session) => {
                    let mut shared = self.shared.lock().await;
                    if shared.generation != generation || token.is_cancelled() {
                        return None;
                    }
                    return Some(self.adopt(&mut shared, session));
                }
                Err(FeedError::Cancelled) => return None,
                Err(err) => warn!(attempt, error = %err, "Reconnect attempt failed"),
            }
        }
    }

    fn fetch_failed(&self, err: FeedError) -> DerivedPrice {
        warn!(error = %err, fallback = self.derivation.fallback_price, "Price fetch failed, using fallback");
        self.stats.record(&EventOutcome::Recovered(err));
        self.stats.record_fallback();
        self.derivation.fallback()
    }

    async fn publish(&self, derived: DerivedPrice) -> (PriceObservation, EventOutcome) {
        if let Some(reason) = derived.rejected {
            let err = FeedError::from(reason);
            warn!(error = %err, fallback = derived.price, "Price rejected, using fallback");
            self.stats.record(&EventOutcome::Recovered(err));
            self.stats.record_fallback();
        }
        let observation = PriceObservation::new(derived.price, now_millis());
        let outcome = match self.sink.send(FeedEvent::Price(observation)).await {
            Ok(()) => EventOutcome::Delivered,
            Err(_) => EventOutcome::Fatal(FeedError::connection("feed hub is gone")),
        };
        (observation, outcome)
    }

    async fn emit_status(&self, status: ConnectionStatus) {
        let _ = self
            .sink
            .send(FeedEvent::Status {
                source: FeedSource::PriceOracle,
                status,
            })
            .await;
    }
}

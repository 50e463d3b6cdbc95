//! UDP gateway lifecycle: socket ownership, pipeline tasks, TTL sweep and
//! the rate-limited graceful drain.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blacklist::SharedBlacklist;
use crate::cdr::CdrHandle;
use crate::config::Config;
use crate::control::ControlHandle;
use crate::pipeline::{Decider, DecisionProcessor, IngressProcessor, ResponseProcessor};
use crate::session::SharedSessionRegistry;
use crate::telemetry::counters;

use super::state::LifecycleState;

/// Gateway errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind UDP socket on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to read UDP socket address: {0}")]
    LocalAddr(#[source] io::Error),
}

/// Settings the gateway needs from [`Config`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub address: SocketAddr,
    pub queue_capacity: usize,
    pub recv_buffer: usize,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub drain_rate: usize,
    pub drain_interval: Duration,
}

impl From<&Config> for GatewayConfig {
    fn from(config: &Config) -> Self {
        Self {
            address: config.udp.address,
            queue_capacity: config.udp.queue_capacity,
            recv_buffer: config.udp.recv_buffer,
            session_ttl: config.session.ttl,
            sweep_interval: config.session.sweep_interval,
            drain_rate: config.shutdown.drain_rate,
            drain_interval: config.shutdown.drain_interval,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Resources owned while the gateway is running.
struct Running {
    local_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

struct DrainTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// The UDP attach gateway.
///
/// All lifecycle operations take `&self`, so the gateway can be shared in an
/// `Arc` between the process run loop and the control plane.
pub struct Gateway {
    config: GatewayConfig,
    decider: Decider,
    registry: SharedSessionRegistry,
    state: watch::Sender<LifecycleState>,
    /// Serializes start/stop
    lifecycle: tokio::sync::Mutex<()>,
    running: Mutex<Option<Running>>,
    drain_started: AtomicBool,
    drain: Mutex<Option<DrainTask>>,
    drained: CancellationToken,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        blacklist: SharedBlacklist,
        registry: SharedSessionRegistry,
        cdr: CdrHandle,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Stopped);

        Self {
            config,
            decider: Decider::new(blacklist, registry.clone(), cdr),
            registry,
            state,
            lifecycle: tokio::sync::Mutex::new(()),
            running: Mutex::new(None),
            drain_started: AtomicBool::new(false),
            drain: Mutex::new(None),
            drained: CancellationToken::new(),
        }
    }

    /// Bind the socket and spawn the pipeline and sweep tasks.
    ///
    /// Returns the bound address. Calling it while running returns the
    /// existing address without side effects.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let _guard = self.lifecycle.lock().await;

        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let address = self.config.address;
        let socket = UdpSocket::bind(address)
            .await
            .map_err(|source| ServerError::Bind { address, source })?;
        let local_addr = socket.local_addr().map_err(ServerError::LocalAddr)?;
        let socket = Arc::new(socket);

        let cancel = CancellationToken::new();
        let capacity = self.config.queue_capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);

        let ingress = IngressProcessor::new(
            socket.clone(),
            inbound_tx,
            self.config.recv_buffer,
            cancel.clone(),
        );
        let decision =
            DecisionProcessor::new(self.decider.clone(), inbound_rx, outbound_tx, cancel.clone());
        let response = ResponseProcessor::new(socket.clone(), outbound_rx, cancel.clone());

        let tasks = vec![
            ("ingress", tokio::spawn(ingress.run())),
            ("decision", tokio::spawn(decision.run())),
            ("response", tokio::spawn(response.run())),
            (
                "sweep",
                tokio::spawn(sweep_sessions(
                    self.registry.clone(),
                    self.config.session_ttl,
                    self.config.sweep_interval,
                    cancel.clone(),
                )),
            ),
        ];

        *lock(&self.running) = Some(Running {
            local_addr,
            socket,
            cancel,
            tasks,
        });
        self.state.send_replace(LifecycleState::Running);

        info!(
            address = %local_addr,
            queue_capacity = capacity,
            session_ttl = ?self.config.session_ttl,
            "UDP gateway started"
        );

        Ok(local_addr)
    }

    /// Begin offloading sessions at the configured rate.
    ///
    /// Only the first call has an effect. When a drain batch comes back
    /// empty the pipeline is cancelled and [`wait_drained`](Self::wait_drained)
    /// resolves.
    pub fn initiate_graceful_shutdown(&self) {
        if self
            .drain_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("graceful shutdown already in progress");
            return;
        }

        let cancel = {
            let running = lock(&self.running);
            match running.as_ref() {
                Some(running) => running.cancel.clone(),
                None => CancellationToken::new(),
            }
        };

        self.state.send_if_modified(|state| {
            if *state == LifecycleState::Running {
                *state = LifecycleState::Draining;
                true
            } else {
                false
            }
        });

        info!(
            sessions = self.registry.count(),
            rate = self.config.drain_rate,
            interval = ?self.config.drain_interval,
            "starting graceful drain"
        );

        let handle = tokio::spawn(drain_sessions(
            self.registry.clone(),
            self.config.drain_rate.max(1),
            self.config.drain_interval,
            cancel.clone(),
            self.drained.clone(),
        ));

        *lock(&self.drain) = Some(DrainTask { cancel, handle });
    }

    /// Wait until the graceful drain has finished.
    pub async fn wait_drained(&self) {
        self.drained.cancelled().await;
    }

    /// Cancel every task, join them and release the socket.
    ///
    /// An in-flight drain is interrupted and joined. Safe to call repeatedly
    /// and from any task.
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;

        let running = lock(&self.running).take();
        let drain = lock(&self.drain).take();

        if running.is_none() && drain.is_none() {
            return;
        }

        if let Some(running) = &running {
            running.cancel.cancel();
        }

        if let Some(drain) = drain {
            drain.cancel.cancel();
            if let Err(e) = drain.handle.await {
                warn!(error = %e, "drain task failed");
            }
        }

        if let Some(running) = running {
            for (name, handle) in running.tasks {
                if let Err(e) = handle.await {
                    warn!(task = name, error = %e, "gateway task failed");
                }
            }

            drop(running.socket);
            info!(address = %running.local_addr, "UDP gateway stopped");
        }

        self.state.send_replace(LifecycleState::Stopped);
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Bound UDP address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.running).as_ref().map(|running| running.local_addr)
    }

    pub fn registry(&self) -> &SharedSessionRegistry {
        &self.registry
    }
}

impl ControlHandle for Gateway {
    fn subscriber_active(&self, imsi: &str) -> bool {
        self.registry.exists(imsi)
    }

    fn session_count(&self) -> usize {
        self.registry.count()
    }

    fn state(&self) -> LifecycleState {
        Gateway::state(self)
    }

    fn request_shutdown(&self) {
        self.initiate_graceful_shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn sweep_sessions(
    registry: SharedSessionRegistry,
    ttl: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let expired = registry.sweep_expired(Instant::now(), ttl);
                if expired > 0 {
                    debug!(expired, remaining = registry.count(), "expired sessions swept");
                }
                counters::sessions_active_set(registry.count());
            }
        }
    }

    info!("session sweeper stopped");
}

async fn drain_sessions(
    registry: SharedSessionRegistry,
    rate: usize,
    interval: Duration,
    cancel: CancellationToken,
    drained: CancellationToken,
) {
    let mut total = 0usize;

    loop {
        let batch = (0..rate)
            .map_while(|_| registry.pop_one())
            .count();

        total += batch;
        counters::drain_batch(batch);
        counters::sessions_active_set(registry.count());

        if batch == 0 {
            break;
        }

        info!(batch, remaining = registry.count(), "drain batch offloaded");

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(offloaded = total, remaining = registry.count(), "drain interrupted");
                drained.cancel();
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(offloaded = total, "graceful drain complete");

    cancel.cancel();
    drained.cancel();
}

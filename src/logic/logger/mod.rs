//! Event Logger
//!
//! Ingestion pipeline for telemetry events.
//!
//! ## Structure
//! - `event.rs` - `Event` and `LogLevel`, plus their remote record mapping
//! - `mod.rs` - `EventLogger`: hot path, batching, periodic flush, retry
//!
//! ## Lifecycle
//! ```text
//! initializing --activate(true)-->  ready(true)    bootstrap runs
//! initializing --activate(false)--> ready(false)   buffer discarded
//! ready(x)     --set_enabled(y)-->  ready(y)
//! any          --shutdown-->        terminal
//! ```
//!
//! `log_event` never awaits: it reads a small mutex-guarded snapshot
//! (phase, scenario states, client id) and either drops the event, parks it
//! in the pre-activation buffer, or hands it to the consumer task through an
//! unbounded channel. Everything else (pending batch, delivery, retry) is
//! owned by the pipeline behind the channel.

pub mod event;


pub use event::{Event, LogLevel};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::logic::backoff::ExponentialBackoff;
use crate::logic::config::LoggerConfig;
use crate::logic::device::DeviceInfo;
use crate::logic::remote::records::{RawRecord, Record, RecordKind};
use crate::logic::remote::RecordStore;
use crate::logic::settings::ScenarioStates;

/// Events kept while waiting for `activate`
const MAX_PRE_ACTIVATION_EVENTS: usize = 1000;

/// Shortest period the flush timer runs at
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// HOT-PATH STATE
// ============================================================================

enum Phase {
    Initializing { buffer: VecDeque<Event> },
    Ready { enabled: bool },
}

struct HotState {
    phase: Phase,
    scenarios: ScenarioStates,
    client_id: Option<String>,
    session_id: String,
    sender: Option<mpsc::UnboundedSender<Event>>,
}

// ============================================================================
// DELIVERY PIPELINE
// ============================================================================

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    discarded: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Logger statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoggerStats {
    /// Events admitted by `log_event`
    pub accepted: u64,
    /// Events refused at the call site (disabled, scenario off, shut down)
    pub discarded: u64,
    /// Events confirmed written to the remote store
    pub delivered: u64,
    /// Accepted events lost to offline mode or exhausted retries
    pub dropped: u64,
    /// Events waiting for the next flush
    pub pending: usize,
}

struct Pipeline {
    config: LoggerConfig,
    store: Arc<dyn RecordStore>,
    pending: Mutex<Vec<Event>>,
    offline: AtomicBool,
    counters: Counters,
    /// One delivery at a time so batches leave in order
    delivery: tokio::sync::Mutex<()>,
}

impl Pipeline {
    async fn consume(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Event>) {
        if let Err(e) = self.store.ensure_schema(RecordKind::Event).await {
            log::warn!("Event collection unavailable, logger going offline: {}", e);
            self.offline.store(true, Ordering::SeqCst);
        }

        while let Some(event) = rx.recv().await {
            if self.offline.load(Ordering::SeqCst) {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let batch_full = {
                let mut pending = self.pending.lock();
                pending.push(event);
                pending.len() >= self.config.batch_size
            };

            if batch_full {
                self.flush().await;
            }
        }

        log::debug!("Event consumer stopped");
    }

    async fn run_timer(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        let period = self.config.flush_interval.max(MIN_FLUSH_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
            }
        }

        log::debug!("Flush timer stopped");
    }

    /// Swap out the pending batch and deliver it, returning how many events
    /// reached the store
    async fn flush(&self) -> usize {
        let _gate = self.delivery.lock().await;

        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        let records: Vec<RawRecord> = batch.iter().map(Record::to_raw).collect();
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff =
            ExponentialBackoff::new(self.config.initial_backoff, self.config.max_backoff);

        for attempt in 1..=max_attempts {
            match self.store.create_batch(records.clone()).await {
                Ok(()) => {
                    self.counters
                        .delivered
                        .fetch_add(count as u64, Ordering::Relaxed);
                    log::debug!("Delivered {} telemetry events", count);
                    return count;
                }
                Err(e) => {
                    log::warn!(
                        "Telemetry delivery attempt {}/{} failed: {}",
                        attempt,
                        max_attempts,
                        e
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff.next_wait()).await;
                    }
                }
            }
        }

        log::error!(
            "Dropping batch of {} telemetry events after {} attempts",
            count,
            max_attempts
        );
        self.counters.dropped.fetch_add(count as u64, Ordering::Relaxed);
        0
    }
}

// ============================================================================
// EVENT LOGGER
// ============================================================================

pub struct EventLogger {
    device: DeviceInfo,
    hot: Mutex<HotState>,
    shut_down: AtomicBool,
    bootstrapped: AtomicBool,
    pipeline: Arc<Pipeline>,
    cancel: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventLogger {
    pub fn new(config: LoggerConfig, store: Arc<dyn RecordStore>, device: DeviceInfo) -> Self {
        let (cancel, _) = watch::channel(false);

        Self {
            device,
            hot: Mutex::new(HotState {
                phase: Phase::Initializing { buffer: VecDeque::new() },
                scenarios: ScenarioStates::new(),
                client_id: None,
                session_id: Uuid::new_v4().to_string(),
                sender: None,
            }),
            shut_down: AtomicBool::new(false),
            bootstrapped: AtomicBool::new(false),
            pipeline: Arc::new(Pipeline {
                config,
                store,
                pending: Mutex::new(Vec::new()),
                offline: AtomicBool::new(false),
                counters: Counters::default(),
                delivery: tokio::sync::Mutex::new(()),
            }),
            cancel,
            tasks: Mutex::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Hot path
    // ------------------------------------------------------------------

    /// Record an event without blocking. Returns whether it was accepted.
    ///
    /// Events tagged with a scenario that is not currently enabled are
    /// dropped before an `Event` is even built.
    pub fn log_event(
        &self,
        name: &str,
        scenario: Option<&str>,
        level: LogLevel,
        property1: Option<&str>,
    ) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            return self.discard();
        }

        let mut guard = self.hot.lock();
        let hot = &mut *guard;

        if let Some(scenario_name) = scenario {
            if !hot.scenarios.get(scenario_name).copied().unwrap_or(false) {
                return self.discard();
            }
        }

        if let Phase::Ready { enabled: false } = hot.phase {
            return self.discard();
        }

        let event = Event::new(
            name,
            &hot.session_id,
            hot.client_id.clone(),
            self.device.clone(),
            scenario,
            level,
            property1,
        );

        let accepted = match &mut hot.phase {
            Phase::Initializing { buffer } => {
                if buffer.len() >= MAX_PRE_ACTIVATION_EVENTS {
                    buffer.pop_front();
                    self.pipeline.counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
                buffer.push_back(event);
                true
            }
            Phase::Ready { .. } => match &hot.sender {
                Some(tx) => tx.send(event).is_ok(),
                None => false,
            },
        };

        if accepted {
            self.pipeline.counters.accepted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.discard()
        }
    }

    fn discard(&self) -> bool {
        self.pipeline.counters.discarded.fetch_add(1, Ordering::Relaxed);
        false
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    /// Leave `initializing`. Only the first call has any effect.
    ///
    /// Must be called from within a Tokio runtime when `enabled` is true.
    pub fn activate(&self, enabled: bool) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }

        let mut hot = self.hot.lock();
        let buffer = match &mut hot.phase {
            Phase::Initializing { buffer } => std::mem::take(buffer),
            Phase::Ready { .. } => {
                log::debug!("Event logger already activated");
                return;
            }
        };

        hot.phase = Phase::Ready { enabled };
        log::info!(
            "Event logger activated (enabled: {}, buffered: {})",
            enabled,
            buffer.len()
        );

        if enabled {
            self.bootstrap(&mut hot, buffer);
        } else if !buffer.is_empty() {
            self.pipeline
                .counters
                .discarded
                .fetch_add(buffer.len() as u64, Ordering::Relaxed);
        }
    }

    /// Gate admission of new events. Before activation this behaves like
    /// [`activate`](Self::activate); afterwards it never re-bootstraps, except
    /// that a logger activated disabled bootstraps the first time it is enabled.
    pub fn set_enabled(&self, enabled: bool) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }

        let mut hot = self.hot.lock();
        if let Phase::Initializing { .. } = hot.phase {
            drop(hot);
            self.activate(enabled);
            return;
        }

        hot.phase = Phase::Ready { enabled };
        if enabled && !self.bootstrapped.load(Ordering::Acquire) {
            self.bootstrap(&mut hot, VecDeque::new());
        }
    }

    fn bootstrap(&self, hot: &mut HotState, replay: VecDeque<Event>) {
        if self.bootstrapped.swap(true, Ordering::AcqRel) {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for mut event in replay {
            // Buffered before the client id was known
            if event.client_id.is_none() {
                event.client_id = hot.client_id.clone();
            }
            // Receiver is alive, send cannot fail here
            let _ = tx.send(event);
        }
        hot.sender = Some(tx);

        let consumer = tokio::spawn(self.pipeline.clone().consume(rx));
        let timer = tokio::spawn(self.pipeline.clone().run_timer(self.cancel.subscribe()));
        self.tasks.lock().extend([consumer, timer]);

        log::debug!("Event logger pipeline started");
    }

    // ------------------------------------------------------------------
    // State pushed by the lifecycle service
    // ------------------------------------------------------------------

    pub fn set_scenario_states(&self, states: ScenarioStates) {
        self.hot.lock().scenarios = states;
    }

    pub fn set_client_id(&self, client_id: Option<String>) {
        self.hot.lock().client_id = client_id;
    }

    /// Start a new logging session, returning its id
    pub fn start_new_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.hot.lock().session_id = session_id.clone();
        session_id
    }

    // ------------------------------------------------------------------
    // Delivery & teardown
    // ------------------------------------------------------------------

    /// Deliver everything pending now
    pub async fn flush(&self) -> usize {
        self.pipeline.flush().await
    }

    /// Refuse new events, stop background tasks, deliver what is left
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.cancel.send(true);
        {
            let mut hot = self.hot.lock();
            // Dropping the sender closes the channel once it is drained
            hot.sender.take();
            if let Phase::Initializing { buffer } = &mut hot.phase {
                buffer.clear();
            }
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                log::warn!("Event logger task ended abnormally: {}", e);
            }
        }

        let flushed = self.pipeline.flush().await;
        log::info!("Event logger shut down ({} events in final flush)", flushed);
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn is_activated(&self) -> bool {
        matches!(self.hot.lock().phase, Phase::Ready { .. })
    }

    pub fn is_enabled(&self) -> bool {
        !self.is_shut_down() && matches!(self.hot.lock().phase, Phase::Ready { enabled: true })
    }

    pub fn is_offline(&self) -> bool {
        self.pipeline.offline.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn session_id(&self) -> String {
        self.hot.lock().session_id.clone()
    }

    pub fn scenario_states(&self) -> ScenarioStates {
        self.hot.lock().scenarios.clone()
    }

    pub fn stats(&self) -> LoggerStats {
        let counters = &self.pipeline.counters;
        LoggerStats {
            accepted: counters.accepted.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            pending: self.pipeline.pending.lock().len(),
        }
    }
}

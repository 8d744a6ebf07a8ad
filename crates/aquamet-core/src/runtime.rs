use crate::config::EngineConfig;
use crate::controller::Controller;
use crate::engine::{HandoverEngine, Telemetry};
use crate::stats::{EngineEvent, EngineSnapshot};
use crate::types::NodeId;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use quanta::Instant;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const TELEMETRY_CAPACITY: usize = 4096;
const EVENT_CAPACITY: usize = 1024;

/// Control messages sent via crossbeam channel (infrequent).
enum ControlMessage {
    Monitor(NodeId),
    Shutdown,
}

/// Thread-safe handle to the handover engine worker.
///
/// Owns a background thread that drains telemetry into a [`HandoverEngine`]
/// and runs a decision tick every `config.tick`. After each tick the engine
/// snapshot is published for external polling, and any engine events are
/// forwarded on a bounded channel.
///
/// Dropping the runtime triggers a graceful shutdown of the worker thread.
pub struct EngineRuntime {
    telemetry_tx: Sender<Telemetry>,
    control_tx: Sender<ControlMessage>,
    events_rx: Receiver<EngineEvent>,
    shutdown: Arc<AtomicBool>,
    snapshot: Arc<Mutex<EngineSnapshot>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl EngineRuntime {
    /// Spawns the worker, which takes ownership of `controller`.
    pub fn start<C>(config: EngineConfig, controller: C) -> anyhow::Result<Self>
    where
        C: Controller + 'static,
    {
        let (telemetry_tx, telemetry_rx) = bounded(TELEMETRY_CAPACITY);
        let (control_tx, control_rx) = bounded(64);
        let (events_tx, events_rx) = bounded(EVENT_CAPACITY);
        let snapshot = Arc::new(Mutex::new(EngineSnapshot::default()));
        let snapshot_clone = snapshot.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let engine = HandoverEngine::new(config, controller);
        let handle = thread::Builder::new()
            .name("aquamet-worker".into())
            .spawn(move || {
                runtime_worker(
                    engine,
                    telemetry_rx,
                    control_rx,
                    events_tx,
                    snapshot_clone,
                    shutdown_clone,
                )
            })
            .map_err(|e| anyhow::anyhow!("Failed to spawn engine worker: {}", e))?;

        Ok(Self {
            telemetry_tx,
            control_tx,
            events_rx,
            shutdown,
            snapshot,
            handle: Some(handle),
        })
    }

    /// Enqueues a telemetry record. Returns immediately.
    pub fn send(&self, telemetry: Telemetry) -> anyhow::Result<()> {
        if self.shutdown.load(Ordering::Relaxed) {
            anyhow::bail!("Engine runtime is shut down");
        }
        match self.telemetry_tx.try_send(telemetry) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow::anyhow!("Telemetry queue is full")),
            Err(TrySendError::Disconnected(_)) => {
                Err(anyhow::anyhow!("Engine worker has exited"))
            }
        }
    }

    /// Starts QoS tracking for another station.
    pub fn monitor(&self, sta: NodeId) -> anyhow::Result<()> {
        self.control_tx
            .send(ControlMessage::Monitor(sta))
            .map_err(|e| anyhow::anyhow!("Failed to monitor {}: {}", sta, e))
    }

    /// Returns the snapshot published after the most recent tick.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns a shared handle to the snapshot for external polling.
    pub fn snapshot_handle(&self) -> Arc<Mutex<EngineSnapshot>> {
        self.snapshot.clone()
    }

    /// Receiver of engine events. Events are dropped while the queue is full.
    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events_rx
    }

    /// Gracefully shuts down the worker thread. Idempotent.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.control_tx.send(ControlMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn runtime_worker<C: Controller>(
    mut engine: HandoverEngine<C>,
    telemetry_rx: Receiver<Telemetry>,
    control_rx: Receiver<ControlMessage>,
    events_tx: Sender<EngineEvent>,
    snapshot: Arc<Mutex<EngineSnapshot>>,
    shutdown: Arc<AtomicBool>,
) {
    let tick_interval = engine.config().tick;
    let mut last_tick = Instant::now();

    loop {
        // Ingest phase: bounded so a busy producer cannot hold off the tick
        let mut drained = 0usize;
        while drained < TELEMETRY_CAPACITY {
            let Ok(t) = telemetry_rx.try_recv() else {
                break;
            };
            for ev in engine.ingest(t) {
                forward(&events_tx, ev);
            }
            drained += 1;
            if last_tick.elapsed() >= tick_interval {
                break;
            }
        }

        match control_rx.try_recv() {
            Ok(ControlMessage::Monitor(sta)) => engine.monitor(sta),
            Ok(ControlMessage::Shutdown) => break,
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        // Commit phase
        if last_tick.elapsed() >= tick_interval {
            last_tick = Instant::now();
            let report = engine.tick();
            debug!(tick = report.tick, events = report.events.len(), "tick complete");
            for ev in report.events {
                forward(&events_tx, ev);
            }
            if let Ok(mut s) = snapshot.lock() {
                *s = engine.snapshot();
            }
        }

        // Brief yield when idle to avoid burning CPU
        if drained == 0 {
            thread::sleep(Duration::from_micros(200));
        }
    }
}

fn forward(events_tx: &Sender<EngineEvent>, ev: EngineEvent) {
    if let Err(TrySendError::Full(ev)) = events_tx.try_send(ev) {
        warn!(?ev, "event queue full, dropping event");
    }
}

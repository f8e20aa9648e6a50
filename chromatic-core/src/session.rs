//! # Tuner Session Module
//!
//! Orchestrates estimator, note mapper, stability filter and state machine.
//!
//! ## Threads
//! - **Estimator context**: the estimator pushes samples into a bounded
//!   channel and never blocks.
//! - **Pipeline thread**: one per `start()`. Maps, filters and classifies
//!   samples, then queues changed readings for publication.
//! - **Observer context**: whoever calls [`TunerSession::dispatch_pending`]
//!   (typically the UI thread). Observers always run there, in FIFO order.
//!
//! The publication queue holds [`PUBLISH_QUEUE_CAPACITY`] readings. When a
//! slow observer context lets it fill up, the oldest queued reading is
//! dropped so the display catches up with the newest state.

use crate::config::TunerConfig;
use crate::error::{Result, TunerError};
use crate::estimator::{FrequencyEstimator, FrequencySample, SAMPLE_QUEUE_CAPACITY, SampleSink, Worker};
use crate::filter::{Observation, StabilityFilter, StabilityParams};
use crate::state::{SessionState, TuningReading, TuningStateMachine};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Maximum number of readings waiting for [`TunerSession::dispatch_pending`].
pub const PUBLISH_QUEUE_CAPACITY: usize = 32;

/// Receives every published [`TuningReading`].
pub trait ReadingObserver: Send + Sync {
    fn on_reading(&self, reading: &TuningReading);
}

impl<F> ReadingObserver for F
where
    F: Fn(&TuningReading) + Send + Sync,
{
    fn on_reading(&self, reading: &TuningReading) {
        self(reading)
    }
}

/// Handle returned by [`TunerSession::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy)]
struct Published {
    epoch: u64,
    reading: TuningReading,
}

/// State shared with the pipeline thread.
struct Shared {
    machine: Mutex<TuningStateMachine>,
    /// Only the pipeline thread touches this while listening.
    filter: Mutex<StabilityFilter>,
    config: ArcSwap<TunerConfig>,
    /// Incremented on every successful start; stale readings carry an old value.
    epoch: AtomicU64,
    publish_tx: Sender<Published>,
    publish_rx: Receiver<Published>,
}

impl Shared {
    fn publish(&self, epoch: u64, reading: TuningReading) {
        let item = Published { epoch, reading };
        if let Err(TrySendError::Full(item)) = self.publish_tx.try_send(item) {
            // Single producer: after dropping the oldest there is room again.
            let _ = self.publish_rx.try_recv();
            debug!(target: "session", "publication queue full, dropped oldest reading");
            let _ = self.publish_tx.try_send(item);
        }
    }

    fn is_live(&self, epoch: u64) -> bool {
        epoch == self.epoch.load(Ordering::Acquire)
            && self.machine.lock().state() == SessionState::Listening
    }
}

struct Lifecycle {
    estimator: Box<dyn FrequencyEstimator>,
    worker: Option<Worker>,
}

type ObserverList = Vec<(SubscriptionId, Arc<dyn ReadingObserver>)>;

/// A tuner: start it, read or observe the current reading, stop it.
pub struct TunerSession {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    observers: Mutex<ObserverList>,
    next_subscription: AtomicU64,
}

impl TunerSession {
    /// Creates an idle session with the default config.
    pub fn new<E>(estimator: E) -> Self
    where
        E: FrequencyEstimator + 'static,
    {
        Self::from_boxed(Box::new(estimator))
    }

    /// Creates an idle session around an already boxed estimator.
    pub fn from_boxed(estimator: Box<dyn FrequencyEstimator>) -> Self {
        let (publish_tx, publish_rx) = crossbeam_channel::bounded(PUBLISH_QUEUE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                machine: Mutex::new(TuningStateMachine::new()),
                filter: Mutex::new(StabilityFilter::default()),
                config: ArcSwap::from_pointee(TunerConfig::default()),
                epoch: AtomicU64::new(0),
                publish_tx,
                publish_rx,
            }),
            lifecycle: Mutex::new(Lifecycle {
                estimator,
                worker: None,
            }),
            observers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Creates an idle session with a validated config.
    pub fn with_config<E>(estimator: E, config: TunerConfig) -> Result<Self>
    where
        E: FrequencyEstimator + 'static,
    {
        let session = Self::new(estimator);
        session.set_config(config)?;
        Ok(session)
    }

    /// Acquires the estimator and starts listening.
    ///
    /// Calling `start` while already listening does nothing. If the estimator
    /// cannot be acquired the session stays idle and the error is returned.
    pub fn start(&self) -> Result<()> {
        let mut life = self.lifecycle.lock();
        if self.state() == SessionState::Listening {
            debug!(target: "session", "start ignored, already listening");
            return Ok(());
        }

        let (sink, samples_rx) = SampleSink::bounded(SAMPLE_QUEUE_CAPACITY);
        if let Err(e) = life.estimator.acquire(sink) {
            warn!(target: "session", estimator = life.estimator.name(), "capture unavailable: {e}");
            return Err(e);
        }

        self.shared.filter.lock().reset();
        let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.machine.lock().start();

        let shared = Arc::clone(&self.shared);
        let spawned = Worker::spawn("tuner-pipeline", move |shutdown_rx| {
            run_pipeline(&shared, &samples_rx, &shutdown_rx, epoch)
        });
        match spawned {
            Ok(worker) => life.worker = Some(worker),
            Err(e) => {
                self.shared.machine.lock().stop();
                life.estimator.release();
                return Err(TunerError::CaptureUnavailable(format!(
                    "could not start pipeline thread: {e}"
                )));
            }
        }

        info!(target: "session", estimator = life.estimator.name(), "listening");
        Ok(())
    }

    /// Stops listening and releases the estimator.
    ///
    /// The last reading stays visible. Calling `stop` while idle does nothing.
    pub fn stop(&self) {
        let mut life = self.lifecycle.lock();
        if !self.shared.machine.lock().stop() {
            return;
        }
        life.estimator.release();
        if let Some(worker) = life.worker.take() {
            worker.stop();
        }
        while self.shared.publish_rx.try_recv().is_ok() {}
        info!(target: "session", estimator = life.estimator.name(), "stopped");
    }

    pub fn state(&self) -> SessionState {
        self.shared.machine.lock().state()
    }

    pub fn is_listening(&self) -> bool {
        self.state() == SessionState::Listening
    }

    /// The latest reading. Before any detection this is the silent `"--"` reading.
    pub fn current_reading(&self) -> TuningReading {
        self.shared.machine.lock().reading()
    }

    /// Registers an observer for every published reading.
    pub fn subscribe<O>(&self, observer: O) -> SubscriptionId
    where
        O: ReadingObserver + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let observer: Arc<dyn ReadingObserver> = Arc::new(observer);
        self.observers.lock().push((id, observer));
        id
    }

    /// Removes an observer. Safe to call from inside an observer callback.
    ///
    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    /// Delivers queued readings to observers on the calling thread.
    ///
    /// Returns the number of readings delivered. Readings queued before a
    /// `stop()` are discarded.
    pub fn dispatch_pending(&self) -> usize {
        let mut delivered = 0;
        for _ in 0..self.shared.publish_rx.len() {
            let Ok(item) = self.shared.publish_rx.try_recv() else {
                break;
            };
            if !self.shared.is_live(item.epoch) {
                continue;
            }
            let snapshot: ObserverList = self.observers.lock().clone();
            for (id, observer) in snapshot {
                if self.is_subscribed(id) {
                    observer.on_reading(&item.reading);
                }
            }
            delivered += 1;
        }
        delivered
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.observers.lock().iter().any(|(sub, _)| *sub == id)
    }

    /// A copy of the active config.
    pub fn config(&self) -> TunerConfig {
        TunerConfig::clone(&self.shared.config.load())
    }

    /// Replaces the config. Takes effect on the next processed sample.
    ///
    /// An invalid config is rejected and the previous one stays active.
    pub fn set_config(&self, config: TunerConfig) -> Result<()> {
        config.validate()?;
        debug!(target: "session", ?config, "config updated");
        self.shared.config.store(Arc::new(config));
        Ok(())
    }

    /// Edits a copy of the active config and applies it if valid.
    pub fn update_config<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut TunerConfig),
    {
        let mut config = self.config();
        edit(&mut config);
        self.set_config(config)
    }

    pub fn set_detection_threshold(&self, cents: f64) -> Result<()> {
        self.update_config(|c| c.detection_threshold_cents = cents)
    }
}

impl Drop for TunerSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pipeline loop: mapper -> filter -> state machine -> publication queue.
fn run_pipeline(
    shared: &Shared,
    samples: &Receiver<FrequencySample>,
    shutdown: &Receiver<()>,
    epoch: u64,
) {
    loop {
        crossbeam_channel::select! {
            recv(samples) -> msg => match msg {
                Ok(sample) => {
                    let config = shared.config.load();
                    let output = {
                        let mut filter = shared.filter.lock();
                        filter.set_params(StabilityParams::from(&**config));
                        filter.push(Observation::from_sample(&sample))
                    };
                    let published = shared
                        .machine
                        .lock()
                        .apply(output, config.detection_threshold_cents);
                    if let Some(reading) = published {
                        shared.publish(epoch, reading);
                    }
                }
                Err(_) => {
                    debug!(target: "session", "estimator closed its sample stream");
                    break;
                }
            },
            recv(shutdown) -> _ => break,
        }
    }
}

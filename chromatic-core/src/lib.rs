// chromatic-core/src/lib.rs

//! The core logic for the chromatic tuner.
//! This crate estimates the pitch of incoming audio, maps it to the nearest
//! equal-tempered note and publishes a debounced tuning readout. It is
//! completely headless and contains no GUI code.
//!
//! Data flows `FrequencyEstimator -> note mapping -> StabilityFilter ->
//! TuningStateMachine -> TunerSession -> observers`.

pub mod audio;
pub mod config;
pub mod error;
pub mod estimator;
pub mod fft;
pub mod filter;
pub mod note;
pub mod pitch;
pub mod session;
pub mod simulation;
pub mod state;

pub use audio::{CaptureSettings, MicrophoneEstimator};
pub use config::TunerConfig;
pub use error::{Result, TunerError};
pub use estimator::{FrequencyEstimator, FrequencySample, ReplayEstimator, SampleSink};
pub use filter::{FilterOutput, StabilityFilter, StabilityParams};
pub use note::{NoteMapping, NoteName, map_frequency};
pub use session::{ReadingObserver, SubscriptionId, TunerSession};
pub use simulation::SimulatedEstimator;
pub use state::{Classification, SessionState, TuningReading, TuningStateMachine};

//! # Chromatic Tuner - GUI
//!
//! A small front-end over `chromatic-core`.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Session**: `TunerSession` runs capture and analysis on its own threads
//! - **Communication**: an observer forwards readings over a crossbeam channel
//! - **Updates**: ~60 FPS ticks dispatch pending readings on the GUI thread
//!
//! Run with `--simulate` (or `CHROMATIC_SIMULATE=1`) to use the built-in pitch
//! simulation instead of the microphone.

mod ui;

use anyhow::Context;
use chromatic_core::{
    FrequencyEstimator, MicrophoneEstimator, SimulatedEstimator, TunerConfig, TunerSession,
    TuningReading,
};
use crossbeam_channel::Receiver;
use iced::{Element, Subscription, Theme};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ui::main_display::create_main_view;

/// Optional config file looked up in the working directory.
const CONFIG_PATH: &str = "tuner_config.json";

/// Readings buffered between two ticks before new ones are dropped.
const READING_BUFFER: usize = 64;

/// Main entry point for the tuner application.
pub fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(target: "main", "starting chromatic tuner");
    iced::application("Chromatic Tuner", TunerApp::update, TunerApp::view)
        .subscription(TunerApp::subscription)
        .theme(TunerApp::theme)
        .run()
}

/// Application message types for the Iced GUI framework.
#[derive(Debug, Clone)]
pub enum Message {
    /// Start or stop listening.
    ToggleListening,
    /// Widen or narrow the in-tune band by the given number of cents.
    AdjustThreshold(f64),
    /// Timer tick for real-time updates.
    Tick,
}

/// Data the view needs to render a frame.
#[derive(Debug, Clone)]
pub struct AppDisplayData {
    pub reading: TuningReading,
    pub listening: bool,
    pub threshold_cents: f64,
    pub source: &'static str,
    pub status: Option<String>,
}

struct TunerApp {
    session: TunerSession,
    readings: Receiver<TuningReading>,
    display_data: AppDisplayData,
}

impl Default for TunerApp {
    fn default() -> Self {
        let simulate = std::env::args().any(|a| a == "--simulate")
            || std::env::var_os("CHROMATIC_SIMULATE").is_some();
        let (estimator, source): (Box<dyn FrequencyEstimator>, &'static str) = if simulate {
            (Box::new(SimulatedEstimator::default()), "simulation")
        } else {
            (Box::new(MicrophoneEstimator::default()), "microphone")
        };

        let session = TunerSession::from_boxed(estimator);
        let mut status = None;

        if Path::new(CONFIG_PATH).exists() {
            match load_config(CONFIG_PATH).and_then(|c| session.set_config(c).map_err(Into::into)) {
                Ok(()) => info!(target: "main", "loaded {CONFIG_PATH}"),
                Err(e) => {
                    warn!(target: "main", "ignoring {CONFIG_PATH}: {e:#}");
                    status = Some(format!("Config ignored: {e:#}"));
                }
            }
        }

        let (tx, readings) = crossbeam_channel::bounded(READING_BUFFER);
        session.subscribe(move |reading: &TuningReading| {
            let _ = tx.try_send(*reading);
        });

        let mut app = Self {
            display_data: AppDisplayData {
                reading: session.current_reading(),
                listening: false,
                threshold_cents: session.config().detection_threshold_cents,
                source,
                status,
            },
            session,
            readings,
        };
        app.start_listening();
        app
    }
}

impl TunerApp {
    fn start_listening(&mut self) {
        match self.session.start() {
            Ok(()) => self.display_data.status = None,
            Err(e) => {
                warn!(target: "main", "could not start tuner: {e}");
                self.display_data.status = Some(e.to_string());
            }
        }
        self.display_data.listening = self.session.is_listening();
    }

    fn update(&mut self, message: Message) {
        match message {
            Message::ToggleListening => {
                if self.session.is_listening() {
                    self.session.stop();
                    self.display_data.listening = false;
                } else {
                    self.start_listening();
                }
            }
            Message::AdjustThreshold(delta) => {
                let next = (self.display_data.threshold_cents + delta).clamp(1.0, 50.0);
                match self.session.set_detection_threshold(next) {
                    Ok(()) => self.display_data.threshold_cents = next,
                    Err(e) => self.display_data.status = Some(e.to_string()),
                }
            }
            Message::Tick => {
                self.session.dispatch_pending();
                while let Ok(reading) = self.readings.try_recv() {
                    self.display_data.reading = reading;
                }
            }
        }
    }

    fn view(&self) -> Element<'_, Message> {
        create_main_view(&self.display_data)
    }

    /// Fires every 16ms (60 FPS) so readings show up promptly.
    fn subscription(&self) -> Subscription<Message> {
        iced::time::every(std::time::Duration::from_millis(16)).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Loads a tuner config from a JSON file.
fn load_config(path: &str) -> anyhow::Result<TunerConfig> {
    let data = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    Ok(TunerConfig::from_json(&data)?)
}

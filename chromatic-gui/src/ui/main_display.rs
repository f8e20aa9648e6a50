//! # Main Display Module
//!
//! Layout of the tuner window: note, deviation, classification, meter and
//! controls.

use chromatic_core::Classification;
use iced::widget::{Space, button, column, container, row, text};
use iced::{Alignment, Color, Element, Length};

use super::cent_meter::{self, CentMeter};
use crate::{AppDisplayData, Message};

fn classification_color(classification: Classification, cents: f32, threshold: f32) -> Color {
    match classification {
        Classification::Silent => Color::from_rgb8(0x90, 0x90, 0x90),
        _ => cent_meter::needle_color(cents, threshold),
    }
}

/// Creates the complete main application view
pub fn create_main_view(data: &AppDisplayData) -> Element<'static, Message> {
    let reading = data.reading;
    let silent = reading.classification == Classification::Silent;
    let cents = reading.cents_off as f32;
    let threshold = data.threshold_cents as f32;

    let octave = reading
        .octave
        .filter(|_| !silent)
        .map(|o| o.to_string())
        .unwrap_or_default();
    let note = row![
        text(reading.note_label()).size(120),
        text(octave).size(40),
    ]
    .align_y(Alignment::End);

    let details = if silent {
        text("Play a note").size(20)
    } else {
        text(format!("{:.2} Hz   {:+.1} cents", reading.frequency_hz, reading.cents_off)).size(20)
    };

    let classification = text(reading.classification.to_string())
        .size(28)
        .color(classification_color(reading.classification, cents, threshold));

    let meter = CentMeter::new((!silent).then_some(cents), threshold).view();

    let toggle = button(text(if data.listening { "Stop" } else { "Start" }))
        .on_press(Message::ToggleListening)
        .padding([8, 24]);

    let threshold_controls = row![
        button(text("-")).on_press(Message::AdjustThreshold(-1.0)),
        text(format!("In tune within ±{:.0} cents", data.threshold_cents)).size(16),
        button(text("+")).on_press(Message::AdjustThreshold(1.0)),
    ]
    .spacing(10)
    .align_y(Alignment::Center);

    let status = text(
        data.status
            .clone()
            .unwrap_or_else(|| format!("Source: {}", data.source)),
    )
    .size(14);

    let content = column![
        note,
        details,
        classification,
        Space::with_height(10),
        meter,
        Space::with_height(10),
        toggle,
        threshold_controls,
        status,
    ]
    .spacing(10)
    .padding(20)
    .align_x(Alignment::Center);

    container(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x(Length::Fill)
        .center_y(Length::Fill)
        .into()
}

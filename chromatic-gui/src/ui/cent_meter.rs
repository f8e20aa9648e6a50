//! # Cent Meter Widget
//!
//! A horizontal needle showing how far the current pitch is from the
//! nearest note, with the in-tune band drawn around the centre line.

use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::widget::container;
use iced::{Color, Element, Point, Rectangle, Renderer, Size, Theme, mouse};

/// The meter shows deviations from -50 to +50 cents.
const METER_RANGE: f32 = 50.0;

/// Needle color for a deviation, given the in-tune band.
pub fn needle_color(cents: f32, threshold: f32) -> Color {
    if cents.abs() < threshold {
        Color::from_rgb8(0x34, 0xDB, 0x98) // Green
    } else if cents.abs() < threshold * 2.0 {
        Color::from_rgb8(0xFF, 0xC3, 0x00) // Yellow
    } else {
        Color::from_rgb8(0xFF, 0x33, 0x33) // Red
    }
}

pub struct CentMeter {
    /// Current deviation, `None` while silent.
    cents: Option<f32>,
    threshold: f32,
}

impl CentMeter {
    pub fn new(cents: Option<f32>, threshold: f32) -> Self {
        Self { cents, threshold }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fixed(80.0)),
        )
        .into()
    }
}

impl<Message> canvas::Program<Message> for CentMeter {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        let to_x = |cents: f32| {
            (cents.clamp(-METER_RANGE, METER_RANGE) + METER_RANGE) / (2.0 * METER_RANGE)
                * bounds.width
        };

        let background = Path::rectangle(Point::ORIGIN, bounds.size());
        frame.fill(&background, Color::from_rgb8(0x40, 0x40, 0x40));

        // In-tune band
        let band_left = to_x(-self.threshold);
        let band = Path::rectangle(
            Point::new(band_left, 0.0),
            Size::new(to_x(self.threshold) - band_left, bounds.height),
        );
        frame.fill(&band, Color::from_rgb8(0x2A, 0x4A, 0x3A));

        let center_x = bounds.width / 2.0;
        let center_line = Path::line(
            Point::new(center_x, 0.0),
            Point::new(center_x, bounds.height),
        );
        frame.stroke(
            &center_line,
            Stroke::default().with_width(2.0).with_color(Color::WHITE),
        );

        if let Some(c) = self.cents {
            let needle_pos = to_x(c);
            let needle =
                Path::rectangle(Point::new(needle_pos - 2.0, 0.0), Size::new(4.0, bounds.height));
            frame.fill(&needle, needle_color(c, self.threshold));
        }

        vec![frame.into_geometry()]
    }
}

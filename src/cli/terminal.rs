//! Colour and width of the output terminal.

use bomlogic::Status;
use owo_colors::{OwoColorize, colors::css};

/// How a piece of output should stand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Accepted, active, done.
    Success,
    /// Needs attention but nothing failed.
    Warning,
    /// Rejected or failed.
    Error,
    /// Identifiers.
    Info,
    /// Secondary detail.
    Dim,
}

impl From<Status> for Tone {
    fn from(status: Status) -> Self {
        match status {
            Status::Enabled => Self::Success,
            Status::Testing => Self::Warning,
            Status::Disabled => Self::Dim,
        }
    }
}

fn supports_color() -> bool {
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

/// Terminal width in columns, if stdout is a terminal.
pub fn terminal_width() -> Option<u16> {
    terminal_size::terminal_size().map(|(w, _)| w.0)
}

/// Below 60 columns tables collapse to one value per line.
pub fn is_narrow() -> bool {
    terminal_width().is_some_and(|w| w < 60)
}

/// Paints text in a [`Tone`], or leaves it plain when colour is off.
pub trait Colorize {
    /// The text in `tone`.
    fn tone(&self, tone: Tone) -> String;

    fn success(&self) -> String {
        self.tone(Tone::Success)
    }

    fn warning(&self) -> String {
        self.tone(Tone::Warning)
    }

    fn error(&self) -> String {
        self.tone(Tone::Error)
    }

    fn info(&self) -> String {
        self.tone(Tone::Info)
    }

    fn dim(&self) -> String {
        self.tone(Tone::Dim)
    }
}

impl<T: AsRef<str> + ?Sized> Colorize for T {
    fn tone(&self, tone: Tone) -> String {
        let text = self.as_ref();
        if !supports_color() {
            return text.to_string();
        }
        match tone {
            Tone::Success => text.fg::<css::Green>().to_string(),
            Tone::Warning => text.fg::<css::Orange>().to_string(),
            Tone::Error => text.fg::<css::Red>().to_string(),
            Tone::Info => text.fg::<css::LightBlue>().to_string(),
            Tone::Dim => text.dimmed().to_string(),
        }
    }
}

/// The status name in the tone of how active it is.
pub fn status_label(status: Status) -> String {
    status.as_str().tone(status.into())
}

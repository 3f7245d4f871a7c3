//! Terminal styling helpers
//!
//! Output goes through `anstream`, which strips the escape codes when stdout
//! is not a terminal.

use owo_colors::OwoColorize;
use std::fmt::Display;

/// Semantic styles for CLI output
pub trait Stylize {
    /// Names, numbers and other values the reader is looking for
    fn emphasis(&self) -> String;
    /// Secondary detail
    fn muted(&self) -> String;
    /// Something went well
    fn success(&self) -> String;
    /// Needs attention
    fn warn(&self) -> String;
}

impl<T: Display + ?Sized> Stylize for T {
    fn emphasis(&self) -> String {
        self.bold().to_string()
    }

    fn muted(&self) -> String {
        self.dimmed().to_string()
    }

    fn success(&self) -> String {
        self.green().to_string()
    }

    fn warn(&self) -> String {
        self.yellow().to_string()
    }
}

/// Green check mark
pub fn check() -> String {
    "✓".green().to_string()
}

/// Arrow used for "next" items
pub fn arrow() -> String {
    "→".cyan().to_string()
}

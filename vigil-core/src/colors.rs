//! Catppuccin-flavoured terminal palette.
//!
//! Maps the handful of accents the formatters use onto plain ANSI colors so
//! output stays readable on any terminal.

use colored::{ColoredString, Colorize};

pub trait CatppuccinExt {
    fn ctp_red(&self) -> ColoredString;
    fn ctp_yellow(&self) -> ColoredString;
    fn ctp_green(&self) -> ColoredString;
    fn sky(&self) -> ColoredString;
    fn lavender(&self) -> ColoredString;
    fn ctp_white(&self) -> ColoredString;
    fn subtext0(&self) -> ColoredString;
}

impl<S: AsRef<str>> CatppuccinExt for S {
    fn ctp_red(&self) -> ColoredString {
        self.as_ref().bright_red()
    }

    fn ctp_yellow(&self) -> ColoredString {
        self.as_ref().bright_yellow()
    }

    fn ctp_green(&self) -> ColoredString {
        self.as_ref().bright_green()
    }

    fn sky(&self) -> ColoredString {
        self.as_ref().bright_cyan()
    }

    // closest ANSI match to lavender
    fn lavender(&self) -> ColoredString {
        self.as_ref().bright_purple()
    }

    fn ctp_white(&self) -> ColoredString {
        self.as_ref().bright_white()
    }

    // muted text, used for rules and skipped checks
    fn subtext0(&self) -> ColoredString {
        self.as_ref().white()
    }
}

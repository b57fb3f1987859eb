//! Everything around the numeric core: settings, logging, and the artifacts read and written by
//! the command line.

#![deny(clippy::missing_inline_in_public_items)]

pub mod artifacts;
pub mod config;
pub mod errors;
pub mod logger;

use std::time::Duration;

/// Format a duration as `HH:MM:SS.mmm`, hours are omitted when zero.
#[must_use]
#[inline]
pub fn format_duration(duration: &Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
    } else {
        format!("{minutes:02}:{seconds:02}.{millis:03}")
    }
}

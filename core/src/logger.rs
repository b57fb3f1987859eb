//----------------------------------------------------------------------------------------- std lib
use std::io::Write;
use std::time::Instant;
//--------------------------------------------------------------------------------- other libraries
use env_logger::fmt::style::{AnsiColor, Style};
use log::info;
use once_cell::sync::Lazy;

use crate::format_duration;

// This will get initialized below.
/// Returns the init [`Instant`]
pub static INIT_INSTANT: Lazy<Instant> = Lazy::new(Instant::now);

/// Returns the seconds since [`INIT_INSTANT`].
#[cfg(not(tarpaulin_include))]
#[must_use]
#[inline]
pub fn uptime() -> u64 {
    INIT_INSTANT.elapsed().as_secs()
}

/// The filter used when `RUST_LOG` is not set: everything off except the qfcluster crates.
#[must_use]
#[inline]
pub fn default_filter(filter: log::LevelFilter) -> String {
    format!("off,qfcluster={filter}")
}

//---------------------------------------------------------------------------------------------------- Logger init function
#[allow(clippy::module_name_repetitions)]
/// Initializes the logger.
///
/// This enables console logging on all the internals of `qfcluster`.
///
/// Functionality is provided by [`log`].
///
/// The levels are:
/// - ERROR
/// - WARN
/// - INFO
/// - DEBUG
/// - TRACE
///
/// # Panics
/// This must only be called _once_.
#[cfg(not(tarpaulin_include))]
#[inline]
pub fn init_logger(filter: log::LevelFilter) {
    // Initialize timer.
    let now = Lazy::force(&INIT_INSTANT);

    // `RUST_LOG` wins over the flag when it is set.
    let env = std::env::var("RUST_LOG").unwrap_or_default();
    let filters = if env.is_empty() {
        default_filter(filter)
    } else {
        env.clone()
    };

    env_logger::Builder::new()
        .parse_filters(&filters)
        .format(move |buf, record| {
            let (color, level) = match record.level() {
                log::Level::Debug => (AnsiColor::Blue, "D"),
                log::Level::Trace => (AnsiColor::Magenta, "T"),
                log::Level::Info => (AnsiColor::White, "I"),
                log::Level::Warn => (AnsiColor::Yellow, "W"),
                log::Level::Error => (AnsiColor::Red, "E"),
            };
            let level_style = Style::new().fg_color(Some(color.into())).bold();
            let dimmed = Style::new().dimmed();
            writeln!(
                buf,
                // Longest PATH in the repo: `analysis/src/clustering/agglomerative.rs` - `41` characters
                // Longest file in the repo: `analysis/src/clustering/density.rs`       - `4` digits
                //
                //      Longest PATH ---|        |--- Longest file
                //                      |        |
                //                      v        v
                "| {level_style}{}{level_style:#} | {dimmed}{}{dimmed:#} | {dimmed}{: >41}{dimmed:#} @ {dimmed}{: <4}{dimmed:#} | {}",
                level,
                format_duration(&now.elapsed()),
                record.file_static().unwrap_or("???"),
                record.line().unwrap_or(0),
                record.args(),
            )
        })
        .write_style(env_logger::WriteStyle::Always)
        .init();

    if env.is_empty() {
        info!("Log Level (Flag) ... {}", filter);
    } else {
        info!("Log Level (RUST_LOG) ... {}", env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_filter() {
        assert_eq!(
            default_filter(log::LevelFilter::Debug),
            "off,qfcluster=DEBUG"
        );
    }

    #[test]
    fn test_uptime_counts_from_init() {
        Lazy::force(&INIT_INSTANT);
        assert!(uptime() < 60);
    }
}

//! Diagnostic logging setup
//!
//! The library only emits `tracing` events; binaries and tests opt into a
//! subscriber through [`init_logging`]. `COURIER_LOG` takes precedence over
//! the preset level and accepts any `EnvFilter` directive.

use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable read for a filter directive
pub const LOG_ENV: &str = "COURIER_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One line per event, span fields inline
    Compact,
    /// Span context on its own, with file and line
    Full,
}

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for this crate's targets; everything else stays at WARN
    pub level: Level,
    pub format: LogFormat,
    /// Emit an event when a flush cycle span closes, with its busy/idle time
    pub cycle_timings: bool,
    /// Colors only when stderr is a terminal
    pub colors: bool,
    /// Used instead of `COURIER_LOG` and `level` when set
    pub directive: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            cycle_timings: false,
            colors: true,
            directive: None,
        }
    }
}

impl LoggingConfig {
    /// Debug level with cycle timings, for `courier -v`
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Full,
            cycle_timings: true,
            ..Self::default()
        }
    }

    /// Warnings and errors only
    pub fn production() -> Self {
        Self {
            level: Level::WARN,
            colors: false,
            ..Self::default()
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(ref directive) = self.directive {
            return Ok(EnvFilter::try_new(directive)?);
        }
        if let Ok(directive) = std::env::var(LOG_ENV) {
            return Ok(EnvFilter::try_new(directive)?);
        }

        let mut filter = EnvFilter::new(Level::WARN.to_string());
        for target in ["telemetry_courier", "courier"] {
            filter = filter.add_directive(format!("{target}={}", self.level).parse()?);
        }
        Ok(filter)
    }
}

/// Install a global fmt subscriber writing to stderr.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let colors = config.colors && std::io::stderr().is_terminal();
    let span_events = if config.cycle_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(colors)
        .with_span_events(span_events);

    let layer = match config.format {
        LogFormat::Compact => layer.compact().with_target(false).boxed(),
        LogFormat::Full => layer
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .boxed(),
    };

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(config.filter()?)
            .with(layer),
    )?;
    Ok(())
}

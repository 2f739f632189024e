// Tue Jan 13 2026 - Alex

use colored::*;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;
use std::time::Instant;

use super::format_duration;

pub struct LoggingUtils;

impl LoggingUtils {
    pub fn init_logger(level: LevelFilter) {
        let _ = Self::builder(level).try_init();
    }

    /// Honors `RUST_LOG` when set, otherwise falls back to `level`.
    pub fn init_from_env(level: LevelFilter) {
        let mut builder = Self::builder(level);
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        let _ = builder.try_init();
    }

    pub fn init_test_logger() {
        let _ = Self::builder(LevelFilter::Debug).is_test(true).try_init();
    }

    /// Case-insensitive level name; `None` for anything unrecognized.
    pub fn level_from_str(s: &str) -> Option<LevelFilter> {
        match s.to_lowercase().as_str() {
            "error" => Some(LevelFilter::Error),
            "warn" | "warning" => Some(LevelFilter::Warn),
            "info" => Some(LevelFilter::Info),
            "debug" => Some(LevelFilter::Debug),
            "trace" => Some(LevelFilter::Trace),
            "off" => Some(LevelFilter::Off),
            _ => None,
        }
    }

    pub fn level_from_verbosity(verbosity: usize) -> LevelFilter {
        match verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn builder(level: LevelFilter) -> Builder {
        let mut builder = Builder::new();
        builder.filter_level(level).format(|buf, record| {
            let target = if !record.target().is_empty() {
                format!("[{}]", record.target())
            } else {
                String::new()
            };

            writeln!(
                buf,
                "{} {} {}",
                format_level(record.level()),
                target.dimmed(),
                record.args()
            )
        });
        builder
    }
}

fn format_level(level: Level) -> ColoredString {
    match level {
        Level::Error => "ERROR".red().bold(),
        Level::Warn => "WARN ".yellow().bold(),
        Level::Info => "INFO ".green().bold(),
        Level::Debug => "DEBUG".blue().bold(),
        Level::Trace => "TRACE".magenta().bold(),
    }
}

pub struct ScopedTimer {
    name: String,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(name: &str) -> Self {
        log::trace!("[TIMER] {} started", name);
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        log::debug!("[TIMER] {} took {}", self.name, format_duration(self.start.elapsed()));
    }
}

pub fn scoped_timer(name: &str) -> ScopedTimer {
    ScopedTimer::new(name)
}

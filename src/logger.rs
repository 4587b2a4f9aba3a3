use crate::error::{Error, Result};
use slog::{Discard, Logger};
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Build a logger that writes to stderr at the given level.
pub fn terminal_logger(level: Severity) -> Result<Logger> {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(level);
    builder.destination(Destination::Stderr);
    builder.build().map_err(|e| Error::Logger(e.to_string()))
}

/// Use the given logger, or one that throws everything away
pub fn or_discard(logger: Option<Logger>) -> Logger {
    logger.unwrap_or_else(|| Logger::root(Discard, o!()))
}

//! Structured logging engine for multi-process, multi-threaded hosts:
//! per-name loggers with independent console and file thresholds,
//! call-site attribution, and a single-consumer pipeline aggregating
//! records from many producers into one session log file.

mod caller;
mod config;
mod format;
mod level;
mod logger;
mod queue;
mod record;
mod sink;
mod term;
mod writer;

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use thiserror::Error;

pub use caller::{CallerInfo, MODULE_ID_WIDTH, call_stack_dump};
pub use config::{BackpressurePolicy, DEFAULT_QUEUE_CAPACITY, LogConfig, QueueInfo};
pub use format::{FmtArgs, FormatError, TIME_FORMAT, render_message};
pub use level::{
    ALL_LEVELS, Level, LevelLookupError, LevelParseError, level_name, parse_level_name,
};
pub use logger::Logger;
pub use record::{Dispatch, LogRecord};
pub use term::{TermFlavor, detect, level_color, paint_level};

pub(crate) const SOURCE_FILE: &str = file!();

/// Lifecycle misuse and init-time I/O failures.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("logging system is already initialized")]
    AlreadyInitialized,
    #[error("logging system is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// State shared by every logger of one system: resolved configuration,
/// the pipeline back end, the logger registry, and the running flag.
pub(crate) struct Shared {
    config: LogConfig,
    writer: writer::Writer,
    registry: RwLock<HashMap<String, Arc<Logger>>>,
    running: AtomicBool,
}

impl Shared {
    pub(crate) fn config(&self) -> &LogConfig {
        &self.config
    }

    pub(crate) fn writer(&self) -> &writer::Writer {
        &self.writer
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// One logging session: an explicit context object owning the registry,
/// queue handles and sinks. Tests inject a fresh instance each; processes
/// that want ambient access use the [`init_logger_system`] layer over one
/// global slot instead.
pub struct LoggerSystem {
    shared: Arc<Shared>,
}

impl LoggerSystem {
    /// Set up a session from resolved configuration: opens the session
    /// file, and in queue mode starts the consumer (and socket acceptor
    /// or worker connection).
    pub fn init(config: LogConfig) -> Result<LoggerSystem, LifecycleError> {
        let writer = writer::Writer::new(&config)?;
        Ok(LoggerSystem {
            shared: Arc::new(Shared {
                config,
                writer,
                registry: RwLock::new(HashMap::new()),
                running: AtomicBool::new(true),
            }),
        })
    }

    /// Logger for `name`; repeated lookups return the same shared
    /// instance.
    pub fn get_logger(&self, name: &str) -> Arc<Logger> {
        if let Some(logger) = self.shared.registry.read().get(name) {
            return Arc::clone(logger);
        }
        let mut registry = self.shared.registry.write();
        Arc::clone(
            registry
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Logger::new(name, Arc::clone(&self.shared)))),
        )
    }

    pub fn config(&self) -> &LogConfig {
        self.shared.config()
    }

    /// Stop the session: new emissions are rejected from here on, the
    /// queue drains (bounded by `drain_timeout`), sinks flush and close.
    /// Idempotent; loggers still held by callers become inert.
    pub fn tear_down(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.writer.shutdown(self.shared.config.drain_timeout);
        self.shared.registry.write().clear();
    }
}

impl Drop for LoggerSystem {
    fn drop(&mut self) {
        self.tear_down();
    }
}

static GLOBAL: RwLock<Option<LoggerSystem>> = RwLock::new(None);

/// Initialize the process-wide logging system. Fails with
/// [`LifecycleError::AlreadyInitialized`] when called again without an
/// intervening teardown.
pub fn init_logger_system(config: LogConfig) -> Result<(), LifecycleError> {
    let mut slot = GLOBAL.write();
    if slot.is_some() {
        return Err(LifecycleError::AlreadyInitialized);
    }
    *slot = Some(LoggerSystem::init(config)?);
    Ok(())
}

/// Shared logger per name from the process-wide system.
pub fn get_logger(name: &str) -> Result<Arc<Logger>, LifecycleError> {
    GLOBAL
        .read()
        .as_ref()
        .map(|system| system.get_logger(name))
        .ok_or(LifecycleError::NotInitialized)
}

/// Tear down the process-wide system: drains the queue, flushes and
/// closes the sinks, and clears the slot so a subsequent init starts
/// clean. Safe to call before init or repeatedly.
pub fn tear_down_logger_system() {
    let taken = GLOBAL.write().take();
    if let Some(system) = taken {
        system.tear_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_reuses_instances() {
        let system = LoggerSystem::init(LogConfig::default()).unwrap();
        let a = system.get_logger("shared");
        let b = system.get_logger("shared");
        let other = system.get_logger("other");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
        system.tear_down();
    }

    #[test]
    fn test_tear_down_is_idempotent() {
        let system = LoggerSystem::init(LogConfig::default()).unwrap();
        system.tear_down();
        system.tear_down();
    }

    // The global slot is process state, so every global-layer assertion
    // lives in this one test to keep it race-free under the parallel
    // test runner.
    #[test]
    fn test_global_lifecycle() {
        assert!(matches!(
            get_logger("early"),
            Err(LifecycleError::NotInitialized)
        ));

        // Teardown before init: tolerated no-op.
        tear_down_logger_system();

        init_logger_system(
            LogConfig::default()
                .with_console_level(Level::Exception)
                .with_file_level(Level::Exception),
        )
        .unwrap();
        assert!(matches!(
            init_logger_system(LogConfig::default()),
            Err(LifecycleError::AlreadyInitialized)
        ));

        let logger = get_logger("app").unwrap();
        assert_eq!(logger.name(), "app");

        tear_down_logger_system();
        tear_down_logger_system();

        // A fresh init starts clean after teardown.
        init_logger_system(
            LogConfig::default()
                .with_console_level(Level::Exception)
                .with_file_level(Level::Exception),
        )
        .unwrap();
        tear_down_logger_system();
    }
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::level::Level;

pub(crate) const SOURCE_FILE: &str = file!();

/// Default bounded wait before a full queue drops a record.
const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Default file flush cadence, in records.
const DEFAULT_FLUSH_EVERY: usize = 16;

/// Default bound on queue drain at teardown.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the record queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// How records travel from loggers to the writer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum QueueInfo {
    /// Queue mode off: synchronous writes under per-sink locks. Single
    /// process, any number of threads.
    #[default]
    Direct,
    /// Bounded in-process queue drained by a dedicated consumer thread.
    Local { capacity: usize },
    /// This process hosts the writer for a multi-process session: bind
    /// the socket, accept worker connections, drain everything in
    /// arrival order.
    #[cfg(unix)]
    SocketServe { path: PathBuf, capacity: usize },
    /// This process is a worker: forward records over one connection to
    /// the session's writer process.
    #[cfg(unix)]
    SocketConnect { path: PathBuf },
}

/// What a logger does when the record queue is full. Both variants are
/// bounded; a log call can never deadlock here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Block up to the timeout, then drop the record with a one-time
    /// console warning.
    Block(Duration),
    /// Drop immediately with a one-time console warning.
    Drop,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        BackpressurePolicy::Block(DEFAULT_BLOCK_TIMEOUT)
    }
}

/// Resolved configuration the core consumes. External representations
/// (files, CLI flags) are translated into this struct once, at init,
/// before the engine sees them.
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Global console threshold, unless overridden per module or per
    /// logger instance.
    pub console_level: Level,
    /// Global file threshold, resolved independently of the console.
    pub file_level: Level,
    /// Per-logger-name threshold overrides, applied to both sinks.
    pub module_levels: HashMap<String, Level>,
    /// Emit full frame dumps on demand and attach backtraces to
    /// exception records.
    pub show_debug_call_stack: bool,
    /// Record transport for this process.
    pub queue: QueueInfo,
    /// Resolved log file for the current session. `None` means console
    /// only.
    pub log_file: Option<PathBuf>,
    pub backpressure: BackpressurePolicy,
    /// Flush the file sink every N records (idle flushes happen anyway
    /// in queue mode).
    pub flush_every: usize,
    /// Bound on waiting for the queue to drain at teardown.
    pub drain_timeout: Duration,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            console_level: Level::Info,
            file_level: Level::Debug,
            module_levels: HashMap::new(),
            show_debug_call_stack: false,
            queue: QueueInfo::Direct,
            log_file: None,
            backpressure: BackpressurePolicy::default(),
            flush_every: DEFAULT_FLUSH_EVERY,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl LogConfig {
    pub fn new() -> LogConfig {
        LogConfig::default()
    }

    #[must_use]
    pub fn with_console_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }

    #[must_use]
    pub fn with_file_level(mut self, level: Level) -> Self {
        self.file_level = level;
        self
    }

    #[must_use]
    pub fn with_module_level(mut self, name: &str, level: Level) -> Self {
        self.module_levels.insert(name.to_string(), level);
        self
    }

    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue: QueueInfo) -> Self {
        self.queue = queue;
        self
    }

    #[must_use]
    pub fn with_backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.backpressure = policy;
        self
    }

    #[must_use]
    pub fn with_flush_every(mut self, records: usize) -> Self {
        self.flush_every = records.max(1);
        self
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_debug_call_stack(mut self, enabled: bool) -> Self {
        self.show_debug_call_stack = enabled;
        self
    }

    /// Threshold for the console sink for a given logger name: module
    /// override first, then the global default.
    pub fn console_level_for(&self, name: &str) -> Level {
        self.module_levels
            .get(name)
            .copied()
            .unwrap_or(self.console_level)
    }

    /// Threshold for the file sink for a given logger name.
    pub fn file_level_for(&self, name: &str) -> Level {
        self.module_levels
            .get(name)
            .copied()
            .unwrap_or(self.file_level)
    }
}

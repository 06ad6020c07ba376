use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::Shared;
use crate::caller::{self, CallerInfo};
use crate::format::{self, FmtArgs, FormatError};
use crate::level::Level;
use crate::record::{Dispatch, LogRecord};

pub(crate) const SOURCE_FILE: &str = file!();

/// Per-name logger front end. Obtained from the system registry, which
/// hands out one shared instance per name; holds optional per-instance
/// threshold overrides and resolves everything else from the process-wide
/// configuration at each call.
pub struct Logger {
    name: String,
    /// Level value, 0 = no override. Levels start at 3 so 0 is free.
    console_override: AtomicU8,
    file_override: AtomicU8,
    shared: Arc<Shared>,
}

impl Logger {
    pub(crate) fn new(name: &str, shared: Arc<Shared>) -> Logger {
        Logger {
            name: name.to_string(),
            console_override: AtomicU8::new(0),
            file_override: AtomicU8::new(0),
            shared,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-instance console threshold; `None` restores dynamic
    /// resolution from configuration.
    pub fn set_console_level(&self, level: Option<Level>) {
        self.console_override
            .store(level.map_or(0, Level::value), Ordering::Relaxed);
    }

    /// Per-instance file threshold; `None` restores dynamic resolution.
    pub fn set_file_level(&self, level: Option<Level>) {
        self.file_override
            .store(level.map_or(0, Level::value), Ordering::Relaxed);
    }

    fn stored_override(cell: &AtomicU8) -> Option<Level> {
        match cell.load(Ordering::Relaxed) {
            0 => None,
            value => Level::from_value(value).ok(),
        }
    }

    /// Effective console threshold: explicit override, else the module
    /// entry for this name, else the global console level.
    pub fn effective_console_level(&self) -> Level {
        Self::stored_override(&self.console_override)
            .unwrap_or_else(|| self.shared.config().console_level_for(&self.name))
    }

    /// Effective file threshold, resolved independently of the console.
    pub fn effective_file_level(&self) -> Level {
        Self::stored_override(&self.file_override)
            .unwrap_or_else(|| self.shared.config().file_level_for(&self.name))
    }

    pub fn should_log_console(&self, level: Level) -> bool {
        level >= self.effective_console_level()
    }

    pub fn should_log_file(&self, level: Level) -> bool {
        level >= self.effective_file_level()
    }

    #[track_caller]
    pub fn worker_detail(&self, message: &str, args: FmtArgs<'_>) {
        self.emit(Level::WorkerDetail, message, args);
    }

    #[track_caller]
    pub fn worker_summary(&self, message: &str, args: FmtArgs<'_>) {
        self.emit(Level::WorkerSummary, message, args);
    }

    #[track_caller]
    pub fn detail(&self, message: &str, args: FmtArgs<'_>) {
        self.emit(Level::Detail, message, args);
    }

    #[track_caller]
    pub fn debug(&self, message: &str, args: FmtArgs<'_>) {
        self.emit(Level::Debug, message, args);
    }

    #[track_caller]
    pub fn info(&self, message: &str, args: FmtArgs<'_>) {
        self.emit(Level::Info, message, args);
    }

    #[track_caller]
    pub fn warning(&self, message: &str, args: FmtArgs<'_>) {
        self.emit(Level::Warning, message, args);
    }

    #[track_caller]
    pub fn error(&self, message: &str, args: FmtArgs<'_>) {
        self.emit(Level::Error, message, args);
    }

    #[track_caller]
    pub fn critical(&self, message: &str, args: FmtArgs<'_>) {
        self.emit(Level::Critical, message, args);
    }

    /// Log at `exception` level, capturing the error's type, message and
    /// cause chain as traceback text (plus a backtrace when
    /// `show_debug_call_stack` is on).
    #[track_caller]
    pub fn exception<E>(&self, message: &str, args: FmtArgs<'_>, error: &E)
    where
        E: std::error::Error + ?Sized,
    {
        let level = Level::Exception;
        let (console, file) = match self.route(level) {
            Some(route) => route,
            None => return,
        };
        let caller = CallerInfo::capture();
        let Some(message) = self.render(&caller, message, &args) else {
            return;
        };
        let record =
            LogRecord::new(level, &self.name, caller, message).with_traceback(self.traceback(error));
        self.shared.writer().dispatch(Dispatch {
            record,
            console,
            file,
        });
    }

    /// Log at an arbitrary level.
    #[track_caller]
    pub fn log(&self, level: Level, message: &str, args: FmtArgs<'_>) {
        self.emit(level, message, args);
    }

    /// Emit the current call stack as a debug record. Only active when
    /// `show_debug_call_stack` is configured; gated by the usual
    /// thresholds.
    #[track_caller]
    pub fn dump_call_stack(&self) {
        if !self.shared.config().show_debug_call_stack {
            return;
        }
        let level = Level::Debug;
        let (console, file) = match self.route(level) {
            Some(route) => route,
            None => return,
        };
        let caller = CallerInfo::capture();
        let message = format!("call stack dump:\n{}", caller::call_stack_dump());
        let record = LogRecord::new(level, &self.name, caller, message);
        self.shared.writer().dispatch(Dispatch {
            record,
            console,
            file,
        });
    }

    #[track_caller]
    fn emit(&self, level: Level, template: &str, args: FmtArgs<'_>) {
        // Threshold check first: below both sinks this call does no
        // formatting, no caller resolution, and no allocation.
        let (console, file) = match self.route(level) {
            Some(route) => route,
            None => return,
        };
        let caller = CallerInfo::capture();
        let Some(message) = self.render(&caller, template, &args) else {
            return;
        };
        let record = LogRecord::new(level, &self.name, caller, message);
        self.shared.writer().dispatch(Dispatch {
            record,
            console,
            file,
        });
    }

    fn route(&self, level: Level) -> Option<(bool, bool)> {
        let console = self.should_log_console(level);
        let file = self.should_log_file(level);
        if (!console && !file) || !self.shared.is_running() {
            return None;
        }
        Some((console, file))
    }

    /// Render the message template. A malformed template or argument set
    /// is reported on the console sink and swallowed — a bad log call
    /// must never crash the host.
    fn render(&self, caller: &CallerInfo, template: &str, args: &FmtArgs<'_>) -> Option<String> {
        match format::render_message(template, args) {
            Ok(message) => Some(message),
            Err(error) => {
                self.report_format_error(caller, &error);
                None
            }
        }
    }

    fn report_format_error(&self, caller: &CallerInfo, error: &FormatError) {
        let record = LogRecord::new(
            Level::Error,
            &self.name,
            caller.clone(),
            format!("bad log call from logger {:?}: {error}", self.name),
        );
        let line = format::render_line(&record, true);
        self.shared.writer().report_internal(&line);
    }

    fn traceback<E>(&self, error: &E) -> String
    where
        E: std::error::Error + ?Sized,
    {
        let mut text = format!("{}: {}", std::any::type_name::<E>(), error);
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = write!(text, "\ncaused by: {cause}");
            source = cause.source();
        }
        if self.shared.config().show_debug_call_stack {
            let _ = write!(text, "\nstack backtrace:\n{}", caller::call_stack_dump());
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::LogConfig;
    use crate::fmt_args;
    use crate::{Level, LoggerSystem};

    /// Display impl that counts how often it is actually rendered.
    struct Counting<'a>(&'a AtomicUsize);

    impl fmt::Display for Counting<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            self.0.fetch_add(1, Ordering::Relaxed);
            f.write_str("counted")
        }
    }

    fn quiet_system() -> LoggerSystem {
        // Both thresholds pinned above everything these tests emit, so
        // nothing prints and nothing passes the routing check.
        LoggerSystem::init(
            LogConfig::default()
                .with_console_level(Level::Exception)
                .with_file_level(Level::Exception),
        )
        .unwrap()
    }

    #[test]
    fn test_should_log_console_matrix() {
        let system = quiet_system();
        let logger = system.get_logger("matrix");
        logger.set_console_level(Some(Level::Warning));

        assert!(!logger.should_log_console(Level::Debug));
        assert!(logger.should_log_console(Level::Warning));
        assert!(logger.should_log_console(Level::Critical));
        system.tear_down();
    }

    #[test]
    fn test_threshold_resolution_order() {
        let system = LoggerSystem::init(
            LogConfig::default()
                .with_console_level(Level::Warning)
                .with_module_level("tuned", Level::Detail),
        )
        .unwrap();

        // Global default only.
        let plain = system.get_logger("plain");
        assert_eq!(plain.effective_console_level(), Level::Warning);

        // module_levels entry beats the global.
        let tuned = system.get_logger("tuned");
        assert_eq!(tuned.effective_console_level(), Level::Detail);

        // Explicit override beats both; clearing restores resolution.
        tuned.set_console_level(Some(Level::Critical));
        assert_eq!(tuned.effective_console_level(), Level::Critical);
        tuned.set_console_level(None);
        assert_eq!(tuned.effective_console_level(), Level::Detail);
        system.tear_down();
    }

    #[test]
    fn test_file_threshold_resolves_independently() {
        let system = LoggerSystem::init(
            LogConfig::default()
                .with_console_level(Level::Critical)
                .with_file_level(Level::Debug),
        )
        .unwrap();
        let logger = system.get_logger("split");
        assert!(!logger.should_log_console(Level::Info));
        assert!(logger.should_log_file(Level::Info));
        system.tear_down();
    }

    #[test]
    fn test_suppressed_call_formats_nothing() {
        let system = quiet_system();
        let logger = system.get_logger("lazy");
        let count = AtomicUsize::new(0);

        logger.debug("value is {}", fmt_args!(Counting(&count)));
        assert_eq!(count.load(Ordering::Relaxed), 0);
        system.tear_down();
    }

    #[test]
    fn test_passing_call_formats_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let system = LoggerSystem::init(
            LogConfig::default()
                .with_console_level(Level::Exception)
                .with_file_level(Level::Debug)
                .with_log_file(&path),
        )
        .unwrap();
        let logger = system.get_logger("lazy");
        let count = AtomicUsize::new(0);

        logger.error("value is {}", fmt_args!(Counting(&count)));
        assert_eq!(count.load(Ordering::Relaxed), 1);
        system.tear_down();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("value is counted"));
    }

    #[test]
    fn test_bad_template_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let system = LoggerSystem::init(
            LogConfig::default()
                .with_console_level(Level::Exception)
                .with_log_file(&path),
        )
        .unwrap();
        let logger = system.get_logger("bad");

        // Missing argument: reported on the console sink, never raised,
        // and nothing reaches the session file.
        logger.error("wanted {} and {}", fmt_args!(1));
        system.tear_down();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.is_empty());
    }

    #[test]
    fn test_exception_captures_cause_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let system = LoggerSystem::init(
            LogConfig::default()
                .with_console_level(Level::Exception)
                .with_file_level(Level::Debug)
                .with_log_file(&path),
        )
        .unwrap();
        let logger = system.get_logger("exc");

        let error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        logger.exception("saving state failed", FmtArgs::EMPTY, &error);
        system.tear_down();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[EXCEPTION]"));
        assert!(contents.contains("saving state failed"));
        assert!(contents.contains("denied"));
    }

    #[test]
    fn test_emission_stops_after_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let system = LoggerSystem::init(
            LogConfig::default()
                .with_console_level(Level::Exception)
                .with_log_file(&path),
        )
        .unwrap();
        let logger = system.get_logger("late");

        logger.error("before teardown", FmtArgs::EMPTY);
        system.tear_down();
        logger.error("after teardown", FmtArgs::EMPTY);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("before teardown"));
        assert!(!contents.contains("after teardown"));
    }
}

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::caller::CallerInfo;
use crate::level::Level;

pub(crate) const SOURCE_FILE: &str = file!();

/// One finished log record. Built by the logger at the moment of emission
/// and never mutated afterwards; ownership moves logger → queue → writer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: Level,
    pub timestamp: DateTime<Local>,
    pub logger_name: String,
    pub module_id: String,
    pub line: u32,
    pub thread_id: u64,
    pub process_id: u32,
    pub message: String,
    pub is_exception: bool,
    pub traceback: Option<String>,
}

impl LogRecord {
    pub fn new(level: Level, logger_name: &str, caller: CallerInfo, message: String) -> LogRecord {
        LogRecord {
            level,
            timestamp: Local::now(),
            logger_name: logger_name.to_string(),
            module_id: caller.module_id,
            line: caller.line,
            thread_id: current_thread_id(),
            process_id: std::process::id(),
            message,
            is_exception: false,
            traceback: None,
        }
    }

    pub fn with_traceback(mut self, traceback: String) -> LogRecord {
        self.is_exception = true;
        self.traceback = Some(traceback);
        self
    }
}

/// Routing envelope: thresholds are resolved by the producing logger (the
/// writer cannot see a remote logger's overrides), so the sink mask
/// travels with the record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    pub record: LogRecord,
    pub console: bool,
    pub file: bool,
}

#[cfg(unix)]
pub(crate) fn current_thread_id() -> u64 {
    // SAFETY: pthread_self has no preconditions.
    unsafe { libc::pthread_self() as u64 }
}

#[cfg(windows)]
pub(crate) fn current_thread_id() -> u64 {
    // SAFETY: GetCurrentThreadId has no preconditions.
    unsafe { windows_sys::Win32::System::Threading::GetCurrentThreadId() as u64 }
}

#[cfg(not(any(unix, windows)))]
pub(crate) fn current_thread_id() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller() -> CallerInfo {
        CallerInfo {
            module_id: "app     ".to_string(),
            line: 7,
        }
    }

    #[test]
    fn test_new_record_captures_identity() {
        let record = LogRecord::new(Level::Info, "main", caller(), "started".to_string());
        assert_eq!(record.logger_name, "main");
        assert_eq!(record.module_id, "app     ");
        assert_eq!(record.line, 7);
        assert_eq!(record.process_id, std::process::id());
        assert!(!record.is_exception);
        assert!(record.traceback.is_none());
    }

    #[test]
    fn test_with_traceback_marks_exception() {
        let record = LogRecord::new(Level::Exception, "main", caller(), "boom".to_string())
            .with_traceback("io::Error: denied".to_string());
        assert!(record.is_exception);
        assert_eq!(record.traceback.as_deref(), Some("io::Error: denied"));
    }

    #[test]
    fn test_dispatch_wire_roundtrip() {
        let dispatch = Dispatch {
            record: LogRecord::new(Level::Error, "w1", caller(), "failed".to_string()),
            console: true,
            file: true,
        };
        let json = serde_json::to_string(&dispatch).unwrap();
        let back: Dispatch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dispatch);
    }

    #[test]
    fn test_thread_ids_differ_across_threads() {
        let here = current_thread_id();
        let there = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
    }
}

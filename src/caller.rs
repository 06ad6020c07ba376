use std::backtrace::Backtrace;
use std::panic::Location;

use serde::{Deserialize, Serialize};

pub(crate) const SOURCE_FILE: &str = file!();

/// Display width of the module identifier column.
pub const MODULE_ID_WIDTH: usize = 8;

/// Source files that make up the engine's own call chain. Attribution that
/// resolves to one of these came from inside the engine (for example the
/// writer reporting its own I/O failure) rather than from user code. Keep
/// this list in sync with the module tree.
const ENGINE_SOURCES: [&str; 11] = [
    crate::SOURCE_FILE,
    crate::caller::SOURCE_FILE,
    crate::config::SOURCE_FILE,
    crate::format::SOURCE_FILE,
    crate::level::SOURCE_FILE,
    crate::logger::SOURCE_FILE,
    crate::queue::SOURCE_FILE,
    crate::record::SOURCE_FILE,
    crate::sink::SOURCE_FILE,
    crate::term::SOURCE_FILE,
    crate::writer::SOURCE_FILE,
];

/// Attribution of a log call to its source: a fixed-width module id derived
/// from the source file name, plus the line of the call. Computed fresh per
/// call; the call site changes every time, so nothing here is cached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    pub module_id: String,
    pub line: u32,
}

impl CallerInfo {
    /// Resolve the call site. Every public logging entry point carries
    /// `#[track_caller]`, so the location seen here is the first frame
    /// outside the engine's own call chain — engine-internal frames are
    /// skipped by attribute propagation rather than a runtime stack walk.
    #[track_caller]
    pub fn capture() -> CallerInfo {
        CallerInfo::from_location(Location::caller())
    }

    pub fn from_location(location: &Location<'_>) -> CallerInfo {
        CallerInfo {
            module_id: module_id_from_path(location.file()),
            line: location.line(),
        }
    }

    /// True when attribution landed inside the engine or on runtime
    /// scaffolding (the narrow window inside thread startup before user
    /// code owns a frame). A recognized fallback, not an error; the
    /// module id stays recognizable but is not a user frame.
    pub fn is_fallback(location: &Location<'_>) -> bool {
        is_engine_source(location.file()) || is_runtime_source(location.file())
    }
}

pub(crate) fn is_engine_source(path: &str) -> bool {
    ENGINE_SOURCES.contains(&path)
}

/// Standard-library and toolchain paths: what a log call attributes to when
/// it fires from a spawned thread's entry trampoline.
pub(crate) fn is_runtime_source(path: &str) -> bool {
    path.starts_with("/rustc/")
        || path.contains("library/std")
        || path.contains("library\\std")
        || path.contains("library/core")
}

/// Derive the module id from a source path: file stem, truncated or padded
/// to the fixed column width. `mod.rs` files take the parent directory's
/// name, which is the module name in Rust layouts.
pub(crate) fn module_id_from_path(path: &str) -> String {
    let mut parts = path.rsplit(['/', '\\']);
    let file_name = parts.next().unwrap_or(path);
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    let name = if stem == "mod" {
        parts.next().unwrap_or(stem)
    } else {
        stem
    };
    fixed_width(name)
}

fn fixed_width(name: &str) -> String {
    let mut id: String = name.chars().take(MODULE_ID_WIDTH).collect();
    while id.chars().count() < MODULE_ID_WIDTH {
        id.push(' ');
    }
    id
}

/// Render the full frame dump for `show_debug_call_stack`.
pub fn call_stack_dump() -> String {
    Backtrace::force_capture().to_string()
}

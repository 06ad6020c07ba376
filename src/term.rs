use std::env;
use std::sync::OnceLock;

use colored::Color;

use crate::level::Level;

pub(crate) const SOURCE_FILE: &str = file!();

/// ANSI reset sequence
pub const RESET: &str = "\x1b[0m";

/// Classification of the hosting terminal, probed once per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TermFlavor {
    /// Plain ANSI-capable terminal
    Ansi,
    /// IDE-hosted console; uses a brighter palette
    Ide,
    /// No color support detected, or color explicitly disabled
    NoColor,
}

static FLAVOR: OnceLock<TermFlavor> = OnceLock::new();

/// Detect the terminal flavor. The probe runs once; repeated calls return
/// the memoized classification.
pub fn detect() -> TermFlavor {
    *FLAVOR.get_or_init(|| classify(&EnvProbe::current()))
}

/// Snapshot of the environment facts the classifier needs.
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvProbe {
    pub no_color: bool,
    pub term: Option<String>,
    pub term_program: Option<String>,
    pub terminal_emulator: Option<String>,
    pub stdout_is_tty: bool,
    pub vt_enabled: bool,
}

impl EnvProbe {
    fn current() -> EnvProbe {
        EnvProbe {
            no_color: env::var_os("NO_COLOR").is_some(),
            term: env::var("TERM").ok(),
            term_program: env::var("TERM_PROGRAM").ok(),
            terminal_emulator: env::var("TERMINAL_EMULATOR").ok(),
            stdout_is_tty: stdout_is_tty(),
            vt_enabled: enable_vt(),
        }
    }
}

/// Pure decision table over the probe snapshot. Anything undetectable
/// degrades to no-color output.
pub(crate) fn classify(probe: &EnvProbe) -> TermFlavor {
    if probe.no_color {
        return TermFlavor::NoColor;
    }
    if probe.term.as_deref() == Some("dumb") {
        return TermFlavor::NoColor;
    }
    if !probe.stdout_is_tty || !probe.vt_enabled {
        return TermFlavor::NoColor;
    }
    let jetbrains = probe
        .terminal_emulator
        .as_deref()
        .is_some_and(|v| v.contains("JetBrains"));
    let vscode = probe.term_program.as_deref() == Some("vscode");
    if jetbrains || vscode {
        return TermFlavor::Ide;
    }
    TermFlavor::Ansi
}

#[cfg(unix)]
fn stdout_is_tty() -> bool {
    // SAFETY: isatty only inspects the descriptor.
    unsafe { libc::isatty(libc::STDOUT_FILENO) == 1 }
}

#[cfg(windows)]
fn stdout_is_tty() -> bool {
    use windows_sys::Win32::System::Console::{GetConsoleMode, GetStdHandle, STD_OUTPUT_HANDLE};
    unsafe {
        let handle = GetStdHandle(STD_OUTPUT_HANDLE);
        if handle.is_null() {
            return false;
        }
        let mut mode = 0;
        GetConsoleMode(handle, &mut mode) != 0
    }
}

#[cfg(not(any(unix, windows)))]
fn stdout_is_tty() -> bool {
    false
}

/// Windows consoles need virtual terminal processing switched on before
/// they accept ANSI escapes. Elsewhere this is a given.
#[cfg(windows)]
fn enable_vt() -> bool {
    use windows_sys::Win32::System::Console::{
        ENABLE_VIRTUAL_TERMINAL_PROCESSING, GetConsoleMode, GetStdHandle, SetConsoleMode,
        STD_OUTPUT_HANDLE,
    };
    unsafe {
        let handle = GetStdHandle(STD_OUTPUT_HANDLE);
        if handle.is_null() {
            return false;
        }
        let mut mode = 0;
        if GetConsoleMode(handle, &mut mode) == 0 {
            return false;
        }
        if mode & ENABLE_VIRTUAL_TERMINAL_PROCESSING != 0 {
            return true;
        }
        SetConsoleMode(handle, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING) != 0
    }
}

#[cfg(not(windows))]
fn enable_vt() -> bool {
    true
}

/// Bold ANSI escape for a base color (static to keep the hot path
/// allocation-free).
fn bold_code(color: Color) -> &'static str {
    match color {
        Color::Black => "\x1b[1;30m",
        Color::Red => "\x1b[1;31m",
        Color::Green => "\x1b[1;32m",
        Color::Yellow => "\x1b[1;33m",
        Color::Blue => "\x1b[1;34m",
        Color::Magenta => "\x1b[1;35m",
        Color::Cyan => "\x1b[1;36m",
        Color::White => "\x1b[1;37m",
        Color::BrightBlack => "\x1b[1;90m",
        Color::BrightRed => "\x1b[1;91m",
        Color::BrightGreen => "\x1b[1;92m",
        Color::BrightYellow => "\x1b[1;93m",
        Color::BrightBlue => "\x1b[1;94m",
        Color::BrightMagenta => "\x1b[1;95m",
        Color::BrightCyan => "\x1b[1;96m",
        Color::BrightWhite => "\x1b[1;97m",
        _ => "\x1b[1m",
    }
}

/// IDE consoles render the standard palette poorly; shift to the bright
/// variants there.
fn brighten(color: Color) -> Color {
    match color {
        Color::Black => Color::BrightBlack,
        Color::Red => Color::BrightRed,
        Color::Green => Color::BrightGreen,
        Color::Yellow => Color::BrightYellow,
        Color::Blue => Color::BrightBlue,
        Color::Magenta => Color::BrightMagenta,
        Color::Cyan => Color::BrightCyan,
        Color::White => Color::BrightWhite,
        other => other,
    }
}

pub(crate) fn escape_for(flavor: TermFlavor, level: Level) -> &'static str {
    match flavor {
        TermFlavor::NoColor => "",
        TermFlavor::Ansi => bold_code(level.color()),
        TermFlavor::Ide => bold_code(brighten(level.color())),
    }
}

/// Escape sequence for a level under the detected flavor. Empty when the
/// terminal cannot take color.
pub fn level_color(level: Level) -> &'static str {
    escape_for(detect(), level)
}

/// Wrap `text` in the level's color for console output.
pub fn paint_level(level: Level, text: &str) -> String {
    let escape = level_color(level);
    if escape.is_empty() {
        text.to_string()
    } else {
        format!("{escape}{text}{RESET}")
    }
}

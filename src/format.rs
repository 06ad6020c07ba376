use std::fmt::{self, Write};

use thiserror::Error;

use crate::record::LogRecord;
use crate::term;

pub(crate) const SOURCE_FILE: &str = file!();

/// Time format with milliseconds, shared by console and file lines.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Initial capacity hint for formatted result strings
const FORMAT_RESULT_CAPACITY: usize = 64;

/// Borrowed substitution values for a log call. Nothing is rendered at
/// construction; values are only formatted once the call has passed the
/// threshold check. Build inline at the call site, most easily with
/// [`fmt_args!`](crate::fmt_args).
#[derive(Clone, Copy)]
pub struct FmtArgs<'a> {
    positional: &'a [&'a dyn fmt::Display],
    named: &'a [(&'a str, &'a dyn fmt::Display)],
}

impl<'a> FmtArgs<'a> {
    /// No substitution values.
    pub const EMPTY: FmtArgs<'static> = FmtArgs {
        positional: &[],
        named: &[],
    };

    pub fn new(
        positional: &'a [&'a dyn fmt::Display],
        named: &'a [(&'a str, &'a dyn fmt::Display)],
    ) -> FmtArgs<'a> {
        FmtArgs { positional, named }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

impl fmt::Debug for FmtArgs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FmtArgs")
            .field("positional", &self.positional.len())
            .field("named", &self.named.len())
            .finish()
    }
}

/// Build a [`FmtArgs`] from positional values and `name = value` pairs:
///
/// ```
/// # use runlog::fmt_args;
/// # let (logger_count, elapsed) = (4, 1.25);
/// let _ = fmt_args!(logger_count; secs = elapsed);
/// ```
#[macro_export]
macro_rules! fmt_args {
    () => {
        $crate::FmtArgs::EMPTY
    };
    ($($pos:expr),+ $(,)?) => {
        $crate::FmtArgs::new(&[$(&$pos as &dyn ::std::fmt::Display),+], &[])
    };
    ($($pos:expr),* ; $($name:ident = $val:expr),+ $(,)?) => {
        $crate::FmtArgs::new(
            &[$(&$pos as &dyn ::std::fmt::Display),*],
            &[$((stringify!($name), &$val as &dyn ::std::fmt::Display)),+],
        )
    };
}

/// Error for a template that does not match its supplied arguments. Never
/// raised through a log call; the logger reports it on the console sink
/// and returns normally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("template references positional argument {index} but {supplied} supplied")]
    MissingPositional { index: usize, supplied: usize },
    #[error("template references unknown named argument {name:?}")]
    MissingNamed { name: String },
    #[error("unbalanced brace in template at byte {at}")]
    UnbalancedBrace { at: usize },
    #[error("argument failed to render")]
    Render,
}

/// Render a message template with `{}` positional and `{name}` named
/// substitution. `{0}` addresses a positional argument explicitly and
/// `{{`/`}}` emit literal braces.
pub fn render_message(template: &str, args: &FmtArgs<'_>) -> Result<String, FormatError> {
    if args.is_empty() && !template.contains(['{', '}']) {
        return Ok(template.to_string());
    }

    let mut result = String::with_capacity(template.len() + FORMAT_RESULT_CAPACITY);
    let mut chars = template.char_indices().peekable();
    let mut auto_index = 0usize;

    while let Some((at, c)) = chars.next() {
        match c {
            '{' => {
                if chars.peek().is_some_and(|&(_, next)| next == '{') {
                    chars.next();
                    result.push('{');
                    continue;
                }
                let mut placeholder = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == '}' {
                        closed = true;
                        break;
                    }
                    placeholder.push(ch);
                }
                if !closed {
                    return Err(FormatError::UnbalancedBrace { at });
                }
                let value = lookup(args, &placeholder, &mut auto_index)?;
                write!(result, "{value}").map_err(|_| FormatError::Render)?;
            }
            '}' => {
                if chars.peek().is_some_and(|&(_, next)| next == '}') {
                    chars.next();
                    result.push('}');
                } else {
                    return Err(FormatError::UnbalancedBrace { at });
                }
            }
            _ => result.push(c),
        }
    }

    Ok(result)
}

fn lookup<'a>(
    args: &'a FmtArgs<'a>,
    placeholder: &str,
    auto_index: &mut usize,
) -> Result<&'a dyn fmt::Display, FormatError> {
    let positional_at = |index: usize| {
        args.positional
            .get(index)
            .copied()
            .ok_or(FormatError::MissingPositional {
                index,
                supplied: args.positional.len(),
            })
    };

    if placeholder.is_empty() {
        let index = *auto_index;
        *auto_index += 1;
        return positional_at(index);
    }
    if placeholder.bytes().all(|b| b.is_ascii_digit()) {
        // Explicit index; does not advance the auto counter.
        let index: usize = placeholder.parse().map_err(|_| FormatError::MissingNamed {
            name: placeholder.to_string(),
        })?;
        return positional_at(index);
    }
    args.named
        .iter()
        .find(|(name, _)| *name == placeholder)
        .map(|(_, value)| *value)
        .ok_or_else(|| FormatError::MissingNamed {
            name: placeholder.to_string(),
        })
}

/// Render the one-line output form shared by both sinks:
/// `TIMESTAMP [LEVELNAME] module_id:line - message`. Color wraps the level
/// token only, and only when `colorize` is set (console sinks). Traceback
/// text follows on its own lines.
pub fn render_line(record: &LogRecord, colorize: bool) -> String {
    let token = format!("[{}]", record.level.upper_name());
    let token = if colorize {
        term::paint_level(record.level, &token)
    } else {
        token
    };

    let mut line = String::with_capacity(record.message.len() + FORMAT_RESULT_CAPACITY);
    let _ = write!(
        line,
        "{} {} {}:{} - {}",
        record.timestamp.format(TIME_FORMAT),
        token,
        record.module_id,
        record.line,
        record.message,
    );
    if let Some(traceback) = &record.traceback {
        line.push('\n');
        line.push_str(traceback);
    }
    line
}

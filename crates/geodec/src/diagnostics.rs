//! Diagnostic reporting for the Geode compiler.
//!
//! Lightweight rustc-style error reporting to stderr. Lowering code
//! returns [`Diagnostic`] values; the driver decides when to print them
//! via [`emit_diagnostic`] and converts them to `anyhow::Error` for
//! propagation. All user-facing compile errors carry the byte offset of
//! the token they originate from so the renderer can point a caret at
//! the exact source location.

use std::sync::atomic::{AtomicBool, Ordering};

const RED: &str = "\x1b[31m";
const BLUE: &str = "\x1b[34m";
const RESET: &str = "\x1b[0m";

/// Converts a byte offset into a 1-based line number and 0-based
/// column: the line is one more than the number of newlines in the
/// prefix, the column is the distance from the last of them. Offsets
/// past the end clamp to the final position.
fn locate(source: &str, offset: usize) -> (usize, usize) {
    let cut = offset.min(source.len());
    let prefix = &source.as_bytes()[..cut];
    let line = 1 + prefix.iter().filter(|&&b| b == b'\n').count();
    let line_start = prefix
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |newline| newline + 1);
    (line, cut - line_start)
}

/// Prints a compact diagnostic message to stderr.
///
/// Emits an `error:` header in red, an optional `--> file` line, and up
/// to six lines of source context when available.
pub fn report_error(file: Option<&str>, source: Option<&str>, message: &str, note: Option<&str>) {
    eprintln!("{}error{}: {}", RED, RESET, message);
    if let Some(path) = file {
        eprintln!("  --> {}", path);
    }

    if let Some(src) = source {
        for (number, text) in (1..=6).zip(src.lines()) {
            eprintln!("{:4} | {}", number, text);
        }
    }

    if let Some(note) = note {
        eprintln!("{}note{}: {}", BLUE, RESET, note);
    }
}

/// Prints a span-aware diagnostic with a caret at the error column.
///
/// `span_start` is a zero-based byte index into `source`; the header
/// shows it as `file:line:col` and the offending line is rendered with
/// one line of context on either side.
pub fn report_error_span(
    file: Option<&str>,
    source: &str,
    span_start: usize,
    message: &str,
    note: Option<&str>,
) {
    let (line, col) = locate(source, span_start);

    eprintln!("{}error{}: {}", RED, RESET, message);
    if let Some(path) = file {
        eprintln!("  --> {}:{}:{}", path, line, col + 1);
    }

    for (number, text) in (1usize..).zip(source.lines()) {
        if number + 1 < line {
            continue;
        }
        if number > line + 1 {
            break;
        }
        eprintln!("{:4} | {}", number, text);
        if number == line {
            eprintln!("     | {}^", " ".repeat(col));
        }
    }

    if let Some(note) = note {
        eprintln!("{}note{}: {}", BLUE, RESET, note);
    }
}

/// Structured diagnostic carried through the lowering pipeline.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary error message describing the issue
    pub message: String,
    /// File the error originated in, when known
    pub file: Option<String>,
    /// Optional additional context or suggestion
    pub note: Option<String>,
    /// Byte offset of the originating token into the file's source
    pub span_start: Option<usize>,
}

impl Diagnostic {
    /// A diagnostic with only a message.
    pub fn simple(msg: impl Into<String>) -> Self {
        Diagnostic {
            message: msg.into(),
            file: None,
            note: None,
            span_start: None,
        }
    }

    /// A diagnostic anchored at a byte offset into its file.
    pub fn located(msg: impl Into<String>, file: Option<String>, span_start: usize) -> Self {
        Diagnostic {
            message: msg.into(),
            file,
            note: None,
            span_start: Some(span_start),
        }
    }
}

/// Builder failures surface as diagnostics so lowering code can use `?`
/// on every `build_*` call.
impl From<inkwell::builder::BuilderError> for Diagnostic {
    fn from(err: inkwell::builder::BuilderError) -> Self {
        Diagnostic::simple(format!("llvm builder error: {}", err))
    }
}

/// Result alias used throughout lowering.
pub type DiagnosticResult<T> = Result<T, Diagnostic>;

/// Emits a diagnostic, choosing span-aware rendering when both a span
/// and the source text are available.
pub fn emit_diagnostic(d: &Diagnostic, source: Option<&str>) {
    if !DIAGNOSTICS_ENABLED.load(Ordering::SeqCst) {
        return;
    }
    match (d.span_start, source) {
        (Some(span), Some(src)) => {
            report_error_span(d.file.as_deref(), src, span, &d.message, d.note.as_deref());
        }
        _ => report_error(d.file.as_deref(), source, &d.message, d.note.as_deref()),
    }
}

static DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Temporarily silences diagnostic printing; used by tests that assert
/// on returned errors without cluttering stderr. The returned guard
/// restores the previous state on drop.
pub fn suppress() -> SuppressGuard {
    let prev = DIAGNOSTICS_ENABLED.swap(false, Ordering::SeqCst);
    SuppressGuard { prev }
}

/// RAII guard restoring the diagnostics-enabled state.
pub struct SuppressGuard {
    prev: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        DIAGNOSTICS_ENABLED.store(self.prev, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::locate;

    #[test]
    fn locate_maps_offsets_to_lines_and_columns() {
        let src = "is m\nfunc f() int {\n}\n";
        assert_eq!(locate(src, 0), (1, 0));
        assert_eq!(locate(src, 3), (1, 3));
        assert_eq!(locate(src, 5), (2, 0));
        assert_eq!(locate(src, 10), (2, 5));
    }

    #[test]
    fn locate_clamps_past_the_end() {
        let src = "is m\n";
        let (line, col) = locate(src, 999);
        assert_eq!((line, col), (2, 0));
    }
}

use core::fmt;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::sync::Arc;

/// Symbol prefixes of this crate's modules.
///
/// Matched per module rather than on the bare crate name, since a binary
/// sharing the crate's name must still show up as a caller.
const OWN_PREFIXES: &[&str] = &[
    concat!(env!("CARGO_CRATE_NAME"), "::context::"),
    concat!(env!("CARGO_CRATE_NAME"), "::error::"),
    concat!(env!("CARGO_CRATE_NAME"), "::invoker::"),
    concat!(env!("CARGO_CRATE_NAME"), "::merge::"),
    concat!(env!("CARGO_CRATE_NAME"), "::pool::"),
    concat!(env!("CARGO_CRATE_NAME"), "::request::"),
    concat!(env!("CARGO_CRATE_NAME"), "::response::"),
    concat!(env!("CARGO_CRATE_NAME"), "::split::"),
];

/// Runtime and plumbing frames that say nothing about where a call came from.
const RUNTIME_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "test::",
    "backtrace::",
    "crossbeam_channel::",
    "parking_lot::",
];

/// One resolved frame of a [`CausalTrace`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Frame {
    symbol: String,
    file: Option<String>,
    line: Option<u32>,
}

impl Frame {
    pub fn new(symbol: impl Into<String>, file: Option<String>, line: Option<u32>) -> Self {
        Self {
            symbol: symbol.into(),
            file,
            line,
        }
    }

    /// Fully qualified function path, e.g. `billing::client::fetch_accounts`.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub const fn line(&self) -> Option<u32> {
        self.line
    }

    fn is_relevant(&self) -> bool {
        let path = self.symbol.trim_start_matches('<');
        !(is_own(path) || is_synthetic(path) || is_runtime(path))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) if line > 0 => write!(f, "{}({file}:{line})", self.symbol),
            _ => write!(f, "{}(?:?)", self.symbol),
        }
    }
}

fn is_own(path: &str) -> bool {
    OWN_PREFIXES.iter().any(|p| path.starts_with(p))
}

fn is_synthetic(path: &str) -> bool {
    // `<fn() -> T as FnOnce<()>>::call_once` and `<F as Fn<A>>::call` shims
    // have no path of their own.
    path.starts_with("__rust")
        || path.starts_with("fn(")
        || path.starts_with("F as ")
        || path.contains(" as core::ops::function::Fn")
        || path.contains("{{closure}}")
        || path.contains("{{vtable.shim}}")
        || path.contains("{{vtable-shim}}")
        || path.contains("{{constant}}")
}

fn is_runtime(path: &str) -> bool {
    // Foreign frames (libc start-up, thread trampolines) carry no `::` path.
    !path.contains("::") || RUNTIME_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Where a logical invocation originated, as seen from the caller's stack.
///
/// Captured once per invocation and only ever rendered for diagnostics,
/// for instance when a chunk-call running on a worker thread logs a failure
/// and wants to point at the code that asked for it. Frames of this crate,
/// compiler-generated frames (closures, shims), and runtime frames are left
/// out so the first frame is normally the caller's own function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CausalTrace {
    frames: Vec<Frame>,
}

impl CausalTrace {
    /// Walks the current stack.
    ///
    /// Symbol resolution depends on available debug info; a binary without it
    /// yields an empty trace.
    pub fn capture() -> Self {
        let backtrace = Backtrace::force_capture();
        if backtrace.status() != BacktraceStatus::Captured {
            return Self::empty();
        }
        Self::from_frames(parse_backtrace(&backtrace.to_string()))
    }

    /// The trace of the invocation the current thread is serving, if it is
    /// running a chunk task right now.
    pub fn current() -> Option<Arc<Self>> {
        super::INSTALLED_TRACE.with(|slot| slot.borrow().clone())
    }

    pub const fn empty() -> Self {
        Self { frames: Vec::new() }
    }

    /// Builds a trace from raw frames, applying the usual filtering.
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().filter(Frame::is_relevant).collect(),
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The innermost caller frame, if any survived filtering.
    pub fn origin(&self) -> Option<&Frame> {
        self.frames.first()
    }

    /// Renders the trace as `frame <- frame <- ...`, or `None` when empty.
    pub fn render(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.to_string())
    }
}

impl fmt::Display for CausalTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                f.write_str(" <- ")?;
            }
            fmt::Display::fmt(frame, f)?;
        }
        Ok(())
    }
}

/// Parses the textual form of [`std::backtrace::Backtrace`].
///
/// Each frame is printed as `  N: symbol`, optionally followed by an
/// `at file:line:column` line. Inlined symbols share a frame index and are
/// printed without one; they are treated as frames of their own.
fn parse_backtrace(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }

        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                let (file, line) = parse_location(location);
                frame.file = Some(file.to_string());
                frame.line = line;
            }
            continue;
        }

        let symbol = match line.split_once(": ") {
            Some((index, symbol)) if index.bytes().all(|b| b.is_ascii_digit()) => symbol,
            _ => line,
        };
        frames.push(Frame::new(strip_hash(symbol), None, None));
    }

    frames
}

/// Splits `path:line:column` into the path and the line number.
fn parse_location(location: &str) -> (&str, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let column = parts.next();
    let line = parts.next();
    match (parts.next(), line, column) {
        (Some(file), Some(line), Some(_)) => (file, line.parse().ok()),
        _ => (location, None),
    }
}

/// Drops a trailing `::h0123456789abcdef` symbol hash.
fn strip_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((path, hash)) if hash.len() == 16 && hash.bytes().all(|b| b.is_ascii_hexdigit()) => {
            path
        }
        _ => symbol,
    }
}

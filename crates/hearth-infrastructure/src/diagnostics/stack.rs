//! Bounded call-stack rendering.
//!
//! `std::backtrace::Backtrace` only exposes frames through its `Display`
//! output, so frames are recovered from that text: each frame starts with
//! `N: symbol`, followed by optional `at file:line` lines.

use std::backtrace::{Backtrace, BacktraceStatus};

/// Capture machinery that sits above the logger in every trace.
const CAPTURE_PREFIXES: &[&str] = &["std::backtrace", "std::backtrace_rs", "backtrace::"];

/// Recorder frames between the capture and the real caller. Calls through
/// `DiagnosticSink` add a trait shim named
/// `<...DiagnosticRecorder as ...DiagnosticSink>::log_with_stack`.
const RECORDER_FRAMES: &[&str] = &[
    "hearth_infrastructure::diagnostics::stack::",
    "DiagnosticRecorder::log_with_stack",
    "DiagnosticSink>::log_with_stack",
];

/// Captures the current stack and renders at most `limit` frames.
pub fn capture(limit: usize) -> Vec<String> {
    let backtrace = Backtrace::force_capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return vec!["  <stack unavailable>".to_string()];
    }
    render(&backtrace.to_string(), limit)
}

/// Renders the frames of a backtrace dump.
///
/// Capture machinery and the leading recorder frames are removed, then
/// everything past `limit` is folded into one `... N more frames` line.
pub fn render(dump: &str, limit: usize) -> Vec<String> {
    let frames: Vec<&str> = frame_symbols(dump)
        .filter(|symbol| !CAPTURE_PREFIXES.iter().any(|p| symbol.starts_with(p)))
        .skip_while(|symbol| RECORDER_FRAMES.iter().any(|r| symbol.contains(r)))
        .collect();

    let mut lines: Vec<String> = frames
        .iter()
        .take(limit)
        .enumerate()
        .map(|(index, symbol)| format!("  #{index} {symbol}"))
        .collect();

    if frames.len() > limit {
        lines.push(format!("  ... {} more frames", frames.len() - limit));
    }
    lines
}

fn frame_symbols(dump: &str) -> impl Iterator<Item = &str> {
    dump.lines().filter_map(|line| {
        let (index, symbol) = line.trim_start().split_once(": ")?;
        if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(symbol.trim())
    })
}

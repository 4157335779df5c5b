//! Last-gasp handlers for fatal signals and uncaught panics.
//!
//! Signal handlers run where almost nothing is safe: no allocation, no locks,
//! no `log`. They format a fixed-size message into a stack buffer, `write(2)`
//! it to stderr and to the diagnostic log descriptor, `fsync` the log, then
//! restore the default disposition and re-raise so the process still dies the
//! way the platform intends.
//!
//! Panics are not signal-restricted, so the panic hook goes through the full
//! recorder (`log_with_stack`) before chaining to the previous hook.
//!
//! Handlers reach the recorder through statics because they cannot capture
//! state.

use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;

use super::recorder::DiagnosticRecorder;

static RECORDER: OnceCell<Arc<DiagnosticRecorder>> = OnceCell::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Capacity of the signal-handler message buffer.
pub const FATAL_MESSAGE_CAPACITY: usize = 96;

const FATAL_PREFIX: &[u8] = b"[FATAL] Received signal ";

/// Installs signal handlers and the panic hook, once per process.
///
/// Returns `false` if handlers were already installed; the first recorder
/// stays in charge.
pub fn install(recorder: &Arc<DiagnosticRecorder>) -> bool {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }
    let _ = RECORDER.set(Arc::clone(recorder));

    #[cfg(unix)]
    {
        unix::set_log_fd(recorder.raw_log_fd());
        unix::install_signal_handlers(recorder);
    }

    install_panic_hook();
    recorder.log("[Fatal] Crash handlers installed");
    true
}

pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        record_panic(info);
        original_hook(info);
    }));
}

fn record_panic(info: &PanicHookInfo<'_>) {
    let Some(recorder) = RECORDER.get() else {
        return;
    };

    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "<unknown>".to_string());
    let reason = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string payload>".to_string()
    };

    recorder.log_with_stack(&format!(
        "[Fatal] Uncaught panic in thread '{}' at {}: {}",
        thread_name, location, reason
    ));
}

/// Signal names, indexed alongside their numbers.
#[cfg(unix)]
const FATAL_SIGNALS: &[(libc::c_int, &[u8])] = &[
    (libc::SIGABRT, b"SIGABRT"),
    (libc::SIGSEGV, b"SIGSEGV"),
    (libc::SIGBUS, b"SIGBUS"),
    (libc::SIGILL, b"SIGILL"),
    (libc::SIGFPE, b"SIGFPE"),
];

#[cfg(unix)]
fn signal_name(signal: i32) -> &'static [u8] {
    FATAL_SIGNALS
        .iter()
        .find(|(number, _)| *number == signal)
        .map(|(_, name)| *name)
        .unwrap_or(b"UNKNOWN")
}

#[cfg(not(unix))]
fn signal_name(_signal: i32) -> &'static [u8] {
    b"UNKNOWN"
}

/// Formats `[FATAL] Received signal NAME (N)\n` into `buf` without allocating.
///
/// Returns the number of bytes written; output is truncated to fit.
pub fn format_fatal_message(signal: i32, buf: &mut [u8; FATAL_MESSAGE_CAPACITY]) -> usize {
    let mut len = 0;
    len = push_bytes(buf, len, FATAL_PREFIX);
    len = push_bytes(buf, len, signal_name(signal));
    len = push_bytes(buf, len, b" (");

    let mut digits = [0u8; 12];
    let mut value = signal.unsigned_abs();
    let mut start = digits.len();
    loop {
        start -= 1;
        digits[start] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    if signal < 0 {
        len = push_bytes(buf, len, b"-");
    }
    len = push_bytes(buf, len, &digits[start..]);
    push_bytes(buf, len, b")\n")
}

fn push_bytes(buf: &mut [u8; FATAL_MESSAGE_CAPACITY], at: usize, bytes: &[u8]) -> usize {
    let end = (at + bytes.len()).min(buf.len());
    buf[at..end].copy_from_slice(&bytes[..end - at]);
    end
}

#[cfg(unix)]
mod unix {
    use std::sync::atomic::{AtomicI32, Ordering};

    use super::{FATAL_MESSAGE_CAPACITY, FATAL_SIGNALS, format_fatal_message};
    use crate::diagnostics::recorder::DiagnosticRecorder;

    static LOG_FD: AtomicI32 = AtomicI32::new(-1);

    pub(super) fn set_log_fd(fd: libc::c_int) {
        LOG_FD.store(fd, Ordering::SeqCst);
    }

    pub(super) fn install_signal_handlers(recorder: &DiagnosticRecorder) {
        let handler = handle_fatal_signal as extern "C" fn(libc::c_int);

        for (signal, name) in FATAL_SIGNALS {
            // SAFETY: `action` is fully initialized before use and the handler
            // only performs async-signal-safe calls.
            let installed = unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = handler as libc::sighandler_t;
                action.sa_flags = libc::SA_ONSTACK;
                libc::sigemptyset(&mut action.sa_mask);
                libc::sigaction(*signal, &action, std::ptr::null_mut()) == 0
            };

            if !installed {
                recorder.log(&format!(
                    "[Fatal] Could not install handler for {}",
                    String::from_utf8_lossy(name)
                ));
            }
        }
    }

    extern "C" fn handle_fatal_signal(signal: libc::c_int) {
        let mut buf = [0u8; FATAL_MESSAGE_CAPACITY];
        let len = format_fatal_message(signal, &mut buf);

        // SAFETY: write, fsync, signal and raise are async-signal-safe; `buf`
        // outlives every call.
        unsafe {
            libc::write(libc::STDERR_FILENO, buf.as_ptr().cast(), len);

            let fd = LOG_FD.load(Ordering::Relaxed);
            if fd >= 0 {
                libc::write(fd, buf.as_ptr().cast(), len);
                libc::fsync(fd);
            }

            libc::signal(signal, libc::SIG_DFL);
            libc::raise(signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatted(signal: i32) -> String {
        let mut buf = [0u8; FATAL_MESSAGE_CAPACITY];
        let len = format_fatal_message(signal, &mut buf);
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_formats_known_signals() {
        assert_eq!(
            formatted(libc::SIGSEGV),
            format!("[FATAL] Received signal SIGSEGV ({})\n", libc::SIGSEGV)
        );
        assert_eq!(
            formatted(libc::SIGABRT),
            format!("[FATAL] Received signal SIGABRT ({})\n", libc::SIGABRT)
        );
        assert!(formatted(libc::SIGBUS).contains("SIGBUS"));
        assert!(formatted(libc::SIGILL).contains("SIGILL"));
        assert!(formatted(libc::SIGFPE).contains("SIGFPE"));
    }

    #[test]
    fn test_formats_unknown_and_multi_digit() {
        assert_eq!(formatted(123), "[FATAL] Received signal UNKNOWN (123)\n");
        assert_eq!(formatted(0), "[FATAL] Received signal UNKNOWN (0)\n");
        assert_eq!(formatted(-7), "[FATAL] Received signal UNKNOWN (-7)\n");
    }

    #[test]
    fn test_message_fits_buffer() {
        let mut buf = [0u8; FATAL_MESSAGE_CAPACITY];
        let len = format_fatal_message(i32::MIN, &mut buf);
        assert!(len <= FATAL_MESSAGE_CAPACITY);
        assert!(buf[..len].ends_with(b")\n"));
    }
}

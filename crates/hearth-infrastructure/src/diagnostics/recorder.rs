//! Durable, synchronous diagnostic log.
//!
//! Every line is written and synced to disk before `log` returns, so the last
//! line in the file after a crash marks where execution stopped. All writers
//! share one file handle behind a mutex; lines from concurrent callers never
//! interleave. The fatal-signal path bypasses the mutex and appends with a raw
//! `write(2)` on the same descriptor (see `fatal`).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use hearth_core::config::DiagnosticsSettings;
use hearth_core::diagnostics::DiagnosticSink;
use hearth_core::error::Result;

use super::memory::MemorySampler;
use super::signpost::SignpostTracker;
use super::stack;

/// Suffix given to the previous launch's log when a new one is opened.
const PREVIOUS_LOG_SUFFIX: &str = "previous";

/// `tracing` target mirroring every durable line.
pub const DIAGNOSTICS_TARGET: &str = "hearth::diagnostics";
/// `tracing` target for signpost spans.
pub const SIGNPOST_TARGET: &str = "hearth::signpost";

pub struct DiagnosticRecorder {
    path: PathBuf,
    writer: Mutex<File>,
    settings: DiagnosticsSettings,
    signposts: SignpostTracker,
    memory: MemorySampler,
}

impl DiagnosticRecorder {
    /// Opens the fixed-name log in `logs_dir` (or `settings.log_dir`).
    ///
    /// An existing log from the last launch is renamed to
    /// `<stem>.previous.<ext>` first, replacing any older one, so a crashed
    /// run's tail is still readable after restart.
    pub fn open(settings: DiagnosticsSettings, logs_dir: &Path) -> Result<Self> {
        let dir = settings.log_dir.clone().unwrap_or_else(|| logs_dir.to_path_buf());
        fs::create_dir_all(&dir)?;

        let path = dir.join(&settings.file_name);
        if path.exists() {
            let previous = previous_log_path(&path);
            if let Err(e) = fs::rename(&path, &previous) {
                tracing::warn!(
                    "[Recorder] Could not preserve previous log {:?}: {}",
                    path,
                    e
                );
            }
        }

        // Truncate, then reopen in append mode so raw writes from the signal
        // handler land at the end of the file.
        File::create(&path)?;
        let file = OpenOptions::new().append(true).open(&path)?;

        let recorder = Self {
            path,
            writer: Mutex::new(file),
            settings,
            signposts: SignpostTracker::new(),
            memory: MemorySampler::new(),
        };
        recorder.log(&format!(
            "[Recorder] Log opened at {} (pid {})",
            recorder.path.display(),
            std::process::id()
        ));
        Ok(recorder)
    }

    /// Where the current log lives, for export or inspection.
    pub fn log_file_path(&self) -> &Path {
        &self.path
    }

    pub fn previous_log_file_path(&self) -> PathBuf {
        previous_log_path(&self.path)
    }

    pub fn log(&self, message: &str) {
        let line = format_line(Local::now(), message);
        self.append(&line);
        tracing::info!(target: DIAGNOSTICS_TARGET, "{}", message);
        self.mirror_to_console(&line);
    }

    pub fn log_with_memory(&self, message: &str) {
        self.log(&format!("{} [memory: {}]", message, self.memory.sample_label()));
    }

    pub fn log_with_stack(&self, message: &str) {
        let mut block = format_line(Local::now(), message);
        for frame in stack::capture(self.settings.max_stack_frames) {
            block.push_str(&frame);
            block.push('\n');
        }
        self.append(&block);
        tracing::info!(target: DIAGNOSTICS_TARGET, stack = true, "{}", message);
        self.mirror_to_console(&block);
    }

    pub fn begin_signpost(&self, name: &str, metadata: &str) {
        match self.signposts.begin(name) {
            Some(outcome) => {
                if let Some(abandoned) = outcome.replaced {
                    self.log(&format!(
                        "[Signpost] {} reopened; span {} abandoned",
                        name, abandoned.id
                    ));
                }
                tracing::info!(
                    target: SIGNPOST_TARGET,
                    phase = "begin",
                    name,
                    id = %outcome.id,
                    metadata,
                );
            }
            None => tracing::warn!("[Recorder] Signpost lane unavailable for '{}'", name),
        }
        self.log(&format!("[Signpost] BEGIN {} {}", name, metadata));
    }

    pub fn end_signpost(&self, name: &str, metadata: &str) {
        match self.signposts.end(name) {
            Some(closed) => {
                let elapsed_ms = closed.elapsed.as_secs_f64() * 1000.0;
                tracing::info!(
                    target: SIGNPOST_TARGET,
                    phase = "end",
                    name,
                    id = %closed.id,
                    elapsed_ms,
                    metadata,
                );
                self.log(&format!(
                    "[Signpost] END {} {} ({:.1} ms)",
                    name, metadata, elapsed_ms
                ));
            }
            None => self.log(&format!(
                "[Signpost] END {} {} (no matching begin)",
                name, metadata
            )),
        }
    }

    pub fn event_signpost(&self, name: &str, metadata: &str) {
        tracing::info!(target: SIGNPOST_TARGET, phase = "event", name, metadata);
        self.log(&format!("[Signpost] EVENT {} {}", name, metadata));
    }

    pub fn signposts(&self) -> &SignpostTracker {
        &self.signposts
    }

    pub fn memory(&self) -> &MemorySampler {
        &self.memory
    }

    /// Writes a closing line and syncs the file.
    pub fn shutdown(&self) {
        self.log("[Recorder] Shutting down");
        let file = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = file.sync_all() {
            tracing::warn!("[Recorder] Final sync failed: {}", e);
        }
    }

    #[cfg(unix)]
    pub(crate) fn raw_log_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_raw_fd()
    }

    fn append(&self, text: &str) {
        let mut file = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = write_synced(&mut file, text) {
            tracing::warn!("[Recorder] Write to {:?} failed: {}", self.path, e);
        }
    }

    /// Echoes `text` to stderr unless a global `tracing` subscriber is
    /// installed; that subscriber already prints the mirrored event.
    fn mirror_to_console(&self, text: &str) {
        if self.settings.console_mirror && !tracing::dispatcher::has_been_set() {
            let mut stderr = io::stderr().lock();
            let _ = stderr.write_all(text.as_bytes());
            let _ = stderr.flush();
        }
    }
}

impl DiagnosticSink for DiagnosticRecorder {
    fn log(&self, message: &str) {
        DiagnosticRecorder::log(self, message)
    }

    fn log_with_memory(&self, message: &str) {
        DiagnosticRecorder::log_with_memory(self, message)
    }

    fn log_with_stack(&self, message: &str) {
        DiagnosticRecorder::log_with_stack(self, message)
    }

    fn begin_signpost(&self, name: &str, metadata: &str) {
        DiagnosticRecorder::begin_signpost(self, name, metadata)
    }

    fn end_signpost(&self, name: &str, metadata: &str) {
        DiagnosticRecorder::end_signpost(self, name, metadata)
    }

    fn event_signpost(&self, name: &str, metadata: &str) {
        DiagnosticRecorder::event_signpost(self, name, metadata)
    }
}

/// `[HH:MM:SS.mmm] message\n`
pub fn format_line(at: DateTime<Local>, message: &str) -> String {
    format!("[{}] {}\n", at.format("%H:%M:%S%.3f"), message)
}

fn write_synced(file: &mut File, text: &str) -> io::Result<()> {
    file.write_all(text.as_bytes())?;
    file.sync_data()
}

fn previous_log_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, PREVIOUS_LOG_SUFFIX, ext.to_string_lossy()),
        None => format!("{}.{}", stem, PREVIOUS_LOG_SUFFIX),
    };
    path.with_file_name(name)
}

#[cfg(test)]
#[path = "recorder_test.rs"]
mod tests;

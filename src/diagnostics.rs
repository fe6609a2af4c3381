//! Non-fatal problem reporting.
//!
//! The original linker wrote warnings and debug traces to global
//! `Linker::Debug`/`Linker::Warning`/`Linker::Error` output streams. This
//! crate threads a [`Diagnostics`] sink through the pipeline instead, so an
//! embedder can collect warnings (for example to annotate a `--dump`
//! listing) rather than have them go straight to stderr.

/// Severity of a non-fatal diagnostic. Fatal problems are `Error`s, not this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
}

/// Receives non-fatal diagnostics raised while merging, laying out, or
/// resolving relocations against a [`crate::module::Module`].
pub trait Diagnostics {
    fn report(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.report(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.report(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.report(Level::Warn, message);
    }
}

/// Forwards every diagnostic to the `log` crate at the matching level.
///
/// This is the default sink used when a caller does not supply their own;
/// it requires the `alloc` feature, the same one that pulls in `log` for
/// the rest of the crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn report(&self, level: Level, message: &str) {
        #[cfg(feature = "log")]
        match level {
            Level::Debug => log::debug!("{message}"),
            Level::Info => log::info!("{message}"),
            Level::Warn => log::warn!("{message}"),
        }
        #[cfg(not(feature = "log"))]
        let _ = (level, message);
    }
}

/// Discards every diagnostic. Useful for tests that assert on warning-free
/// behavior only incidentally, or for embedders who collect diagnostics some
/// other way.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {
    fn report(&self, _level: Level, _message: &str) {}
}

/// Accumulates every diagnostic in memory, in emission order. Handy in
/// tests that want to assert a warning *was* raised.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    pub messages: std::sync::Mutex<Vec<(Level, String)>>,
}

impl Diagnostics for CollectingDiagnostics {
    fn report(&self, level: Level, message: &str) {
        self.messages
            .lock()
            .expect("diagnostics mutex poisoned")
            .push((level, message.to_string()));
    }
}

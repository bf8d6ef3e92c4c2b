use std::error::Error;

/// Side channel for per-item failures that must not stop the run.
///
/// Malformed input lines and failed measurements are reported here and then
/// dropped. Implementations must be cheap to call from many tasks at once.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn report(&self, error: &(dyn Error + 'static));
}

/// Emits every diagnostic as a `warn` event on the `tsbench::diagnostics` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, error: &(dyn Error + 'static)) {
        tracing::warn!(target: "tsbench::diagnostics", "{error}");
    }
}
